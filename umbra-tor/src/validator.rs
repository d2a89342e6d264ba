//! Response validation
//!
//! Checks, in order: 2xx status, HTML content type (missing header allowed),
//! declared content length, actual body size, charset. The body is read with
//! a hard cap so an oversized response is never buffered in full.

use reqwest::header::CONTENT_TYPE;
use reqwest::Response;
use thiserror::Error;
use tracing::debug;

use crate::encoding::decode_body;

pub const MAX_BODY_SIZE: usize = 5 * 1024 * 1024;
pub const MIN_BODY_SIZE: usize = 100;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("validation error: invalid status - HTTP status {0} is not acceptable")]
    InvalidStatus(u16),

    #[error("validation error: invalid content type - '{0}' is not HTML")]
    InvalidContentType(String),

    #[error("validation error: body too large - {0} bytes exceeds the limit")]
    BodyTooLarge(u64),

    #[error("validation error: body empty - {0} bytes is below the minimum")]
    BodyEmpty(usize),

    #[error("validation error: invalid encoding - body does not conform to {0}")]
    InvalidEncoding(String),

    #[error("validation error: read failed - {0}")]
    Read(String),
}

impl ValidationError {
    /// Short machine-friendly reason
    pub fn reason(&self) -> &'static str {
        match self {
            ValidationError::InvalidStatus(_) => "invalid_status",
            ValidationError::InvalidContentType(_) => "invalid_content_type",
            ValidationError::BodyTooLarge(_) => "body_too_large",
            ValidationError::BodyEmpty(_) => "body_empty",
            ValidationError::InvalidEncoding(_) => "invalid_encoding",
            ValidationError::Read(_) => "read_failed",
        }
    }
}

/// A response that passed every check, body transcoded to UTF-8
#[derive(Debug, Clone)]
pub struct ValidatedResponse {
    pub url: String,
    pub status: u16,
    pub content_type: String,
    /// Encoding the body was decoded from
    pub encoding: &'static str,
    pub body: String,
}

#[derive(Debug, Clone)]
pub struct Validator {
    max_body_size: usize,
    min_body_size: usize,
}

impl Default for Validator {
    fn default() -> Self {
        Self {
            max_body_size: MAX_BODY_SIZE,
            min_body_size: MIN_BODY_SIZE,
        }
    }
}

impl Validator {
    pub fn new(min_body_size: usize, max_body_size: usize) -> Self {
        Self {
            max_body_size,
            min_body_size,
        }
    }

    pub async fn validate(&self, mut response: Response) -> Result<ValidatedResponse, ValidationError> {
        let status = response.status().as_u16();
        check_status(status)?;

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        check_content_type(&content_type)?;

        if let Some(length) = response.content_length() {
            if length > self.max_body_size as u64 {
                return Err(ValidationError::BodyTooLarge(length));
            }
        }

        let url = response.url().to_string();

        // read at most max + 1 bytes
        let mut body: Vec<u8> = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| ValidationError::Read(e.to_string()))?
        {
            body.extend_from_slice(&chunk);
            if body.len() > self.max_body_size {
                return Err(ValidationError::BodyTooLarge(body.len() as u64));
            }
        }

        self.check_body_size(body.len())?;

        let decoded = decode_body(&body, &content_type)
            .map_err(|mismatch| ValidationError::InvalidEncoding(mismatch.0.to_string()))?;

        debug!(
            "Validated {} ({} bytes, {})",
            url,
            body.len(),
            decoded.encoding
        );

        Ok(ValidatedResponse {
            url,
            status,
            content_type,
            encoding: decoded.encoding,
            body: decoded.text,
        })
    }

    pub fn check_body_size(&self, size: usize) -> Result<(), ValidationError> {
        if size < self.min_body_size {
            return Err(ValidationError::BodyEmpty(size));
        }
        if size > self.max_body_size {
            return Err(ValidationError::BodyTooLarge(size as u64));
        }
        Ok(())
    }
}

pub fn check_status(status: u16) -> Result<(), ValidationError> {
    if !(200..300).contains(&status) {
        return Err(ValidationError::InvalidStatus(status));
    }
    Ok(())
}

/// Empty content type is accepted
pub fn check_content_type(content_type: &str) -> Result<(), ValidationError> {
    if content_type.is_empty() || content_type.to_lowercase().contains("text/html") {
        return Ok(());
    }
    Err(ValidationError::InvalidContentType(content_type.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn serve(template: ResponseTemplate) -> (MockServer, Response) {
        let server = MockServer::start().await;
        Mock::given(method("GET")).respond_with(template).mount(&server).await;
        let response = reqwest::get(server.uri()).await.unwrap();
        (server, response)
    }

    fn html_of_len(len: usize) -> Vec<u8> {
        let mut body = b"<html><body>".to_vec();
        body.resize(len, b'a');
        body
    }

    #[test]
    fn test_status_and_content_type_checks() {
        assert!(check_status(200).is_ok());
        assert!(check_status(204).is_ok());
        assert_eq!(check_status(301), Err(ValidationError::InvalidStatus(301)));

        assert!(check_content_type("").is_ok());
        assert!(check_content_type("Text/HTML; charset=utf-8").is_ok());
        assert_eq!(
            check_content_type("application/json").unwrap_err().reason(),
            "invalid_content_type"
        );
    }

    #[test]
    fn test_body_size_bounds() {
        let validator = Validator::default();
        assert_eq!(validator.check_body_size(50), Err(ValidationError::BodyEmpty(50)));
        assert!(validator.check_body_size(100).is_ok());
        assert!(validator.check_body_size(MAX_BODY_SIZE).is_ok());
        assert!(matches!(
            validator.check_body_size(MAX_BODY_SIZE + 1),
            Err(ValidationError::BodyTooLarge(_))
        ));
    }

    #[tokio::test]
    async fn test_accepts_small_html() {
        let body = html_of_len(100);
        let (_server, response) =
            serve(ResponseTemplate::new(200).set_body_raw(body, "text/html")).await;

        let validated = Validator::default().validate(response).await.unwrap();
        assert_eq!(validated.body.len(), 100);
        assert_eq!(validated.status, 200);
    }

    #[tokio::test]
    async fn test_rejects_tiny_body() {
        let (_server, response) =
            serve(ResponseTemplate::new(200).set_body_raw(html_of_len(50), "text/html")).await;

        let err = Validator::default().validate(response).await.unwrap_err();
        assert_eq!(err, ValidationError::BodyEmpty(50));
    }

    #[tokio::test]
    async fn test_rejects_oversized_body() {
        let body = html_of_len(6 * 1024 * 1024);
        let (_server, response) =
            serve(ResponseTemplate::new(200).set_body_raw(body, "text/html")).await;

        let err = Validator::default().validate(response).await.unwrap_err();
        assert_eq!(err.reason(), "body_too_large");
    }

    #[tokio::test]
    async fn test_rejects_non_html() {
        let (_server, response) = serve(
            ResponseTemplate::new(200).set_body_raw(html_of_len(200), "application/json"),
        )
        .await;

        let err = Validator::default().validate(response).await.unwrap_err();
        assert_eq!(err, ValidationError::InvalidContentType("application/json".into()));
    }

    #[tokio::test]
    async fn test_rejects_error_status() {
        let (_server, response) = serve(ResponseTemplate::new(500)).await;
        let err = Validator::default().validate(response).await.unwrap_err();
        assert_eq!(err, ValidationError::InvalidStatus(500));
    }

    #[tokio::test]
    async fn test_transcodes_declared_charset() {
        let mut body = html_of_len(120);
        body.extend_from_slice(b" caf\xe9");
        let (_server, response) = serve(
            ResponseTemplate::new(200).set_body_raw(body, "text/html; charset=windows-1252"),
        )
        .await;

        let validated = Validator::default().validate(response).await.unwrap();
        assert!(validated.body.ends_with("café"));
        assert_eq!(validated.encoding, "windows-1252");
    }
}
