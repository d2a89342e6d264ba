//! Shape checks for cryptocurrency addresses
//!
//! These are heuristics (length, prefix, alphabet). No checksum is verified.

/// Base58 alphabet: no `0`, `O`, `I` or `l`
const BASE58_ALPHABET: &str = "123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

fn is_base58(c: char) -> bool {
    BASE58_ALPHABET.contains(c)
}

/// Bitcoin: 26..=90 chars, prefix `1`, `3` or `bc1`, base58 characters
pub fn validate_bitcoin(addr: &str) -> bool {
    let len = addr.chars().count();
    if !(26..=90).contains(&len) {
        return false;
    }

    if !(addr.starts_with('1') || addr.starts_with('3') || addr.starts_with("bc1")) {
        return false;
    }

    addr.chars().all(is_base58)
}

/// Ethereum: `0x` followed by exactly 40 hex digits
pub fn validate_ethereum(addr: &str) -> bool {
    match addr.strip_prefix("0x") {
        Some(hex) => addr.len() == 42 && hex.chars().all(|c| c.is_ascii_hexdigit()),
        None => false,
    }
}

/// Monero: exactly 95 base58 characters starting with `4` or `8`
pub fn validate_monero(addr: &str) -> bool {
    if addr.chars().count() != 95 {
        return false;
    }

    if !(addr.starts_with('4') || addr.starts_with('8')) {
        return false;
    }

    addr.chars().all(is_base58)
}
