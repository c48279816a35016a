//! Display name ("ps") coding
//!
//! The obfuscated display name carries both the node's obfuscation token and
//! its real name, so a rendered entry can be traced back to the node that
//! produced it.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;

use crate::error::{Error, Result};

/// Encodes a plain display name with a token and decodes it back
pub trait DisplayNameCodec: Send + Sync {
    /// Combines a plain name and an obfuscation token into one opaque name
    fn encode(&self, name: &str, token: &str) -> String;

    /// Splits an opaque name into `(token, plain name)`
    fn split(&self, opaque: &str) -> Result<(String, String)>;

    /// Recovers the plain name from an opaque name
    fn decode(&self, opaque: &str) -> Result<String> {
        self.split(opaque).map(|(_, name)| name)
    }
}

/// Separator between token and payload. Tokens never contain it.
pub const PS_SEPARATOR: char = '|';

/// Codec producing `<token>|<base64url(name)>`
#[derive(Debug, Default, Clone, Copy)]
pub struct PsCodec;

impl DisplayNameCodec for PsCodec {
    fn encode(&self, name: &str, token: &str) -> String {
        format!(
            "{}{}{}",
            token,
            PS_SEPARATOR,
            URL_SAFE_NO_PAD.encode(name.as_bytes())
        )
    }

    fn split(&self, opaque: &str) -> Result<(String, String)> {
        let (token, payload) = opaque
            .split_once(PS_SEPARATOR)
            .ok_or_else(|| Error::codec(format!("ps '{}'", opaque), "missing separator"))?;

        if token.is_empty() {
            return Err(Error::codec(format!("ps '{}'", opaque), "empty token"));
        }

        let bytes = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|e| Error::codec(format!("ps '{}'", opaque), e))?;
        let name =
            String::from_utf8(bytes).map_err(|e| Error::codec(format!("ps '{}'", opaque), e))?;

        Ok((token.to_string(), name))
    }
}

/// Normalizes a link fragment into a display name: strips a leading `#`
/// and percent-decodes it
pub fn format_ps(fragment: &str) -> Result<String> {
    let raw = fragment.strip_prefix('#').unwrap_or(fragment);
    urlencoding::decode(raw)
        .map(|s| s.into_owned())
        .map_err(|e| Error::codec(format!("ps '{}'", raw), e))
}
