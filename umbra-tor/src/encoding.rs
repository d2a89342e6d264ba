//! Charset detection and transcoding to UTF-8
//!
//! Resolution order: byte-order mark, `Content-Type` charset, `<meta charset>`
//! in the first 1 KiB, valid UTF-8, then a chardetng guess.
//!
//! Malformed sequences are replaced with U+FFFD. Only a body that is mostly
//! replacement characters is rejected.

use chardetng::EncodingDetector;
use encoding_rs::{Encoding, UTF_8};
use regex::bytes::Regex;
use std::sync::LazyLock;
use tracing::{debug, warn};

static META_CHARSET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<meta[^>]+charset\s*=\s*["']?([a-z0-9_.:\-]+)"#).unwrap()
});

const META_SCAN_BYTES: usize = 1024;

/// Body decoded to UTF-8 together with the encoding that was applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded {
    pub text: String,
    pub encoding: &'static str,
}

/// The body is mostly undecodable in the encoding that was resolved for it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodingMismatch(pub &'static str);

/// Charset label from a `Content-Type` header value
pub fn charset_from_content_type(content_type: &str) -> Option<&str> {
    content_type.split(';').skip(1).find_map(|param| {
        let (key, value) = param.split_once('=')?;
        key.trim()
            .eq_ignore_ascii_case("charset")
            .then(|| value.trim().trim_matches('"'))
    })
}

fn charset_from_meta(body: &[u8]) -> Option<&'static Encoding> {
    let head = &body[..body.len().min(META_SCAN_BYTES)];
    let label = META_CHARSET.captures(head)?.get(1)?;
    Encoding::for_label(label.as_bytes())
}

/// Decode `body` to UTF-8
pub fn decode_body(body: &[u8], content_type: &str) -> Result<Decoded, EncodingMismatch> {
    let declared = Encoding::for_bom(body)
        .or_else(|| {
            charset_from_content_type(content_type)
                .and_then(|label| Encoding::for_label(label.as_bytes()))
                .map(|encoding| (encoding, 0))
        })
        .or_else(|| charset_from_meta(body).map(|encoding| (encoding, 0)));

    if let Some((encoding, skip)) = declared {
        debug!("Declared encoding: {}", encoding.name());
        let (text, had_errors) = encoding.decode_without_bom_handling(&body[skip..]);
        return finish(text.into_owned(), encoding, had_errors);
    }

    if let Ok(text) = std::str::from_utf8(body) {
        return Ok(Decoded {
            text: text.to_string(),
            encoding: UTF_8.name(),
        });
    }

    let mut detector = EncodingDetector::new();
    detector.feed(body, true);
    let encoding = detector.guess(None, true);
    debug!("Detected encoding: {}", encoding.name());

    let (text, _, had_errors) = encoding.decode(body);
    finish(text.into_owned(), encoding, had_errors)
}

fn finish(
    text: String,
    encoding: &'static Encoding,
    had_errors: bool,
) -> Result<Decoded, EncodingMismatch> {
    if had_errors {
        if mostly_replaced(&text) {
            return Err(EncodingMismatch(encoding.name()));
        }
        warn!("Malformed {} sequences replaced while decoding body", encoding.name());
    }

    Ok(Decoded {
        text,
        encoding: encoding.name(),
    })
}

/// More than half of the characters are U+FFFD
fn mostly_replaced(text: &str) -> bool {
    let (total, replaced) = text.chars().fold((0usize, 0usize), |(total, replaced), c| {
        (total + 1, replaced + usize::from(c == char::REPLACEMENT_CHARACTER))
    });
    replaced * 2 > total
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_charset_from_content_type() {
        assert_eq!(charset_from_content_type("text/html; charset=ISO-8859-1"), Some("ISO-8859-1"));
        assert_eq!(charset_from_content_type("text/html;charset=\"utf-8\""), Some("utf-8"));
        assert_eq!(charset_from_content_type("text/html"), None);
    }

    #[test]
    fn test_header_charset_transcodes() {
        let decoded = decode_body(b"caf\xe9", "text/html; charset=windows-1252").unwrap();
        assert_eq!(decoded.text, "café");
        assert_eq!(decoded.encoding, "windows-1252");
    }

    #[test]
    fn test_meta_charset() {
        let body = b"<html><head><meta charset=\"iso-8859-1\"></head><body>na\xefve</body></html>";
        let decoded = decode_body(body, "text/html").unwrap();
        assert!(decoded.text.contains("naïve"));
    }

    #[test]
    fn test_bom_wins() {
        let decoded = decode_body(b"\xef\xbb\xbfhello", "text/html; charset=windows-1252").unwrap();
        assert_eq!(decoded.text, "hello");
        assert_eq!(decoded.encoding, "UTF-8");
    }

    #[test]
    fn test_declared_utf8_with_bad_bytes_is_lossy() {
        let body = b"<html><body><p>ransomware dump for sale \xff here</p></body></html>";
        let decoded = decode_body(body, "text/html; charset=utf-8").unwrap();
        assert_eq!(decoded.encoding, "UTF-8");
        assert!(decoded.text.contains("dump for sale \u{FFFD} here"));
    }

    #[test]
    fn test_meta_declared_utf8_with_bad_bytes_is_lossy() {
        let body = b"<html><head><meta charset=\"utf-8\"></head><body>leak \xff list</body></html>";
        let decoded = decode_body(body, "text/html").unwrap();
        assert!(decoded.text.contains("leak \u{FFFD} list"));
    }

    #[test]
    fn test_mostly_undecodable_body_rejected() {
        let body = b"<p>\xff\xff\xff\xff\xff\xff\xff\xff\xff\xff</p>";
        let err = decode_body(body, "text/html; charset=utf-8").unwrap_err();
        assert_eq!(err, EncodingMismatch("UTF-8"));
    }

    #[test]
    fn test_undeclared_falls_back_to_detection() {
        let decoded = decode_body(b"plain ascii", "").unwrap();
        assert_eq!(decoded.text, "plain ascii");

        let guessed = decode_body("Très célèbre café à Paris".as_bytes(), "").unwrap();
        assert_eq!(guessed.text, "Très célèbre café à Paris");

        let latin = decode_body(b"Tr\xe8s c\xe9l\xe8bre caf\xe9", "").unwrap();
        assert!(latin.text.starts_with("Tr"));
        assert!(!latin.text.contains('\u{FFFD}'));
    }
}
