//! Error types for link parsing, display-name coding, merging and restoring
//!
//! Every variant carries the offending link, name or config index so the
//! caller can tell which input broke the operation.

use thiserror::Error;

/// Result type used by the core modules
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the core transformations
#[derive(Error, Debug)]
pub enum Error {
    /// The link could not be parsed or lacks a required field
    #[error("Malformed {scheme} link '{link}': {reason}")]
    MalformedLink {
        scheme: String,
        link: String,
        reason: String,
    },

    /// No parser is registered for the link's scheme
    #[error("No parser registered for scheme: {0}")]
    UnsupportedScheme(String),

    /// Display name, Base64, percent-encoding or structured text failed to decode
    #[error("Codec error ({context}): {reason}")]
    Codec { context: String, reason: String },

    /// A config tree is structurally invalid for merging
    #[error("Failed to merge config #{config}: {reason}")]
    Merge { config: usize, reason: String },

    /// A rendered entry references a token no parser owns
    #[error("No node owns obfuscation token: {0}")]
    UnknownNode(String),
}

impl Error {
    /// Create a new malformed link error
    pub fn malformed<S: Into<String>>(scheme: &str, link: &str, reason: S) -> Self {
        Error::MalformedLink {
            scheme: scheme.to_string(),
            link: link.to_string(),
            reason: reason.into(),
        }
    }

    /// Create a new codec error
    pub fn codec<C: Into<String>, R: ToString>(context: C, reason: R) -> Self {
        Error::Codec {
            context: context.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a new merge error
    pub fn merge<S: Into<String>>(config: usize, reason: S) -> Self {
        Error::Merge {
            config,
            reason: reason.into(),
        }
    }

    /// Whether the error comes from a malformed link
    pub fn is_malformed_link(&self) -> bool {
        matches!(self, Error::MalformedLink { .. })
    }

    /// Whether the error comes from a decode/encode step
    pub fn is_codec(&self) -> bool {
        matches!(self, Error::Codec { .. })
    }

    /// Whether the error comes from merging
    pub fn is_merge(&self) -> bool {
        matches!(self, Error::Merge { .. })
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(e: serde_yaml::Error) -> Self {
        Error::codec("yaml", e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::codec("json", e)
    }
}
