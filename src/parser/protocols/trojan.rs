//! Trojan protocol parser
//!
//! This module provides parsing for Trojan (trojan://) links.
//! Format: trojan://password@host:port?params#tag

use tracing::trace;

use crate::error::Result;
use crate::parser::node::NodeConfig;

use super::{FieldMap, ProtocolParser, format_url_link, parse_url_link};

// ============================================================================
// Trojan Parser
// ============================================================================

static TROJAN_FIELDS: FieldMap = FieldMap {
    clash_type: "trojan",
    singbox_type: "trojan",
    credential: "password",
};

/// Parser for Trojan (trojan://) links
///
/// The password is percent-decoded on parse and re-encoded on format.
pub struct TrojanParser;

impl ProtocolParser for TrojanParser {
    fn scheme(&self) -> &str {
        "trojan"
    }

    fn parse(&self, link: &str) -> Result<NodeConfig> {
        trace!("Parsing Trojan link");
        parse_url_link("trojan", link)
    }

    fn to_link(&self, config: &NodeConfig) -> Result<String> {
        Ok(format_url_link(config, &urlencoding::encode(&config.credential)))
    }

    fn fields(&self) -> &'static FieldMap {
        &TROJAN_FIELDS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trojan_basic() {
        let link = "trojan://password@example.com:443?sni=example.com#test-node";
        let config = TrojanParser.parse(link).unwrap();

        assert_eq!(config.credential, "password");
        assert_eq!(config.hostname, "example.com");
        assert_eq!(config.port, 443);
        assert_eq!(config.ps, "test-node");
        assert_eq!(config.param("sni"), Some("example.com"));
    }

    #[test]
    fn test_trojan_encoded_password_round_trip() {
        let link = "trojan://p%40ss%3Aword@example.com:443#node";
        let config = TrojanParser.parse(link).unwrap();
        assert_eq!(config.credential, "p@ss:word");

        let formatted = TrojanParser.to_link(&config).unwrap();
        assert_eq!(TrojanParser.parse(&formatted).unwrap(), config);
    }

    #[test]
    fn test_trojan_missing_password() {
        assert!(TrojanParser.parse("trojan://@example.com:443").is_err());
    }

    #[test]
    fn test_trojan_missing_port() {
        assert!(TrojanParser.parse("trojan://pw@example.com").is_err());
    }

    #[test]
    fn test_fields() {
        assert_eq!(TrojanParser.fields().credential, "password");
        assert_eq!(TrojanParser.fields().singbox_type, "trojan");
    }
}
