//! Base64 helpers for subscription bodies and Base64-wrapped links
//!
//! Providers are loose about the alphabet, padding and line breaks, so
//! decoding tries the common variants in turn.

use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE, URL_SAFE_NO_PAD};
use tracing::trace;

use crate::error::{Error, Result};

// ============================================================================
// Base64 Decoding
// ============================================================================

/// Decodes Base64 content, trying multiple variants
///
/// Whitespace is removed first. Standard, URL-safe and URL-safe without
/// padding are attempted before re-padding the input.
pub fn decode_base64(content: &str) -> Result<Vec<u8>> {
    let cleaned: String = content.chars().filter(|c| !c.is_whitespace()).collect();
    trace!(
        "Attempting Base64 decode, cleaned length: {} bytes",
        cleaned.len()
    );

    for engine in [&STANDARD, &URL_SAFE] {
        if let Ok(decoded) = engine.decode(&cleaned) {
            return Ok(decoded);
        }
    }

    if let Ok(decoded) = URL_SAFE_NO_PAD.decode(&cleaned) {
        trace!("Decoded using URL-safe Base64 without padding");
        return Ok(decoded);
    }

    let padded = add_base64_padding(&cleaned);
    for engine in [&STANDARD, &URL_SAFE] {
        if let Ok(decoded) = engine.decode(&padded) {
            trace!("Decoded Base64 after adding padding");
            return Ok(decoded);
        }
    }

    Err(Error::codec("base64", "content is not valid Base64"))
}

/// Decodes Base64 content into a UTF-8 string
pub fn decode_base64_string(content: &str) -> Result<String> {
    let bytes = decode_base64(content)?;
    String::from_utf8(bytes).map_err(|e| Error::codec("base64", e))
}

/// Adds `=` padding until the length is a multiple of 4
pub fn add_base64_padding(s: &str) -> String {
    let mut result = s.to_string();
    while !result.len().is_multiple_of(4) {
        result.push('=');
    }
    result
}

/// Encodes a list of links as a standard Base64 subscription body
pub fn encode_link_list<S: AsRef<str>>(links: &[S]) -> String {
    let joined = links
        .iter()
        .map(|l| l.as_ref())
        .collect::<Vec<_>>()
        .join("\n");
    STANDARD.encode(joined)
}
