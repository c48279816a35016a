//! VLESS protocol parser
//!
//! This module provides parsing for VLESS (vless://) links.
//! Format: vless://uuid@host:port?params#tag

use tracing::trace;

use crate::error::Result;
use crate::parser::node::NodeConfig;

use super::{FieldMap, ProtocolParser, format_url_link, parse_url_link};

// ============================================================================
// VLESS Parser
// ============================================================================

static VLESS_FIELDS: FieldMap = FieldMap {
    clash_type: "vless",
    singbox_type: "vless",
    credential: "uuid",
};

/// Parser for VLESS (vless://) links
pub struct VLessParser;

impl ProtocolParser for VLessParser {
    fn scheme(&self) -> &str {
        "vless"
    }

    fn parse(&self, link: &str) -> Result<NodeConfig> {
        trace!("Parsing VLESS link");
        parse_url_link("vless", link)
    }

    fn to_link(&self, config: &NodeConfig) -> Result<String> {
        Ok(format_url_link(config, &config.credential))
    }

    fn fields(&self) -> &'static FieldMap {
        &VLESS_FIELDS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vless_basic() {
        let link = "vless://uuid-here@example.com:443?security=tls&sni=example.com#test-node";
        let config = VLessParser.parse(link).unwrap();

        assert_eq!(config.scheme, "vless");
        assert_eq!(config.credential, "uuid-here");
        assert_eq!(config.hostname, "example.com");
        assert_eq!(config.port, 443);
        assert_eq!(config.ps, "test-node");
        assert_eq!(config.param("security"), Some("tls"));
        assert_eq!(config.param("sni"), Some("example.com"));
    }

    #[test]
    fn test_vless_with_websocket() {
        let link = "vless://uuid@example.com:443?type=ws&path=%2Fws%3Fed%3D2048&host=cdn.example.com#ws-node";
        let config = VLessParser.parse(link).unwrap();

        assert_eq!(config.param("type"), Some("ws"));
        assert_eq!(config.param("path"), Some("/ws?ed=2048"));
        assert_eq!(config.param("host"), Some("cdn.example.com"));
    }

    #[test]
    fn test_vless_no_tag() {
        let config = VLessParser.parse("vless://uuid@example.com:443").unwrap();
        assert_eq!(config.ps, "example.com:443");
    }

    #[test]
    fn test_vless_url_encoded_tag() {
        let link = "vless://uuid@example.com:443#%F0%9F%87%BA%F0%9F%87%B8%20US%20Server";
        let config = VLessParser.parse(link).unwrap();
        assert_eq!(config.ps, "🇺🇸 US Server");
    }

    #[test]
    fn test_vless_ipv6_host() {
        let config = VLessParser.parse("vless://uuid@[::1]:443#ipv6-node").unwrap();
        assert_eq!(config.hostname, "::1");
        assert_eq!(config.host(), "[::1]:443");
    }

    #[test]
    fn test_vless_missing_uuid() {
        let err = VLessParser.parse("vless://@example.com:443").unwrap_err();
        assert!(err.is_malformed_link());
    }

    #[test]
    fn test_vless_missing_host() {
        assert!(VLessParser.parse("vless://uuid@:443").is_err());
    }

    #[test]
    fn test_vless_missing_port() {
        let err = VLessParser.parse("vless://uuid@example.com").unwrap_err();
        assert!(err.to_string().contains("missing port"));
    }

    #[test]
    fn test_vless_invalid_link() {
        assert!(VLessParser.parse("vless://").is_err());
        assert!(VLessParser.parse("not-a-link").is_err());
        assert!(VLessParser.parse("trojan://pw@example.com:443").is_err());
    }

    #[test]
    fn test_vless_to_link_keeps_params() {
        let link = "vless://uuid@example.com:443?security=reality&pbk=key&sid=ab#node";
        let config = VLessParser.parse(link).unwrap();
        let formatted = VLessParser.to_link(&config).unwrap();
        assert_eq!(formatted, link);
    }

    #[test]
    fn test_scheme_and_can_parse() {
        assert_eq!(VLessParser.scheme(), "vless");
        assert!(VLessParser.can_parse("vless://uuid@host:443"));
        assert!(!VLessParser.can_parse("vmess://abc"));
    }

    #[test]
    fn test_fields() {
        assert_eq!(VLessParser.fields().credential, "uuid");
        assert_eq!(VLessParser.fields().clash_type, "vless");
    }
}
