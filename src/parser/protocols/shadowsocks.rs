//! Shadowsocks protocol parser
//!
//! This module provides parsing for Shadowsocks (ss://) links in SIP002 and
//! legacy form. Formatting always produces SIP002.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use tracing::trace;

use crate::error::{Error, Result};
use crate::parser::base64::decode_base64_string;
use crate::parser::node::NodeConfig;
use crate::ps::format_ps;

use super::{FieldMap, ProtocolParser, format_host_port, parse_host_port};

// ============================================================================
// Shadowsocks Parser
// ============================================================================

static SHADOWSOCKS_FIELDS: FieldMap = FieldMap {
    clash_type: "ss",
    singbox_type: "shadowsocks",
    credential: "password",
};

/// Parser for Shadowsocks (ss://) links
///
/// - SIP002: ss://BASE64(method:password)@host:port#tag
/// - SIP002 with plain userinfo: ss://method:password@host:port#tag
/// - SIP002 with SIP003 plugin: ss://userinfo@host:port/?plugin=name;opts#tag
/// - Legacy: ss://BASE64(method:password@host:port)#tag
pub struct ShadowsocksParser;

impl ProtocolParser for ShadowsocksParser {
    fn scheme(&self) -> &str {
        "ss"
    }

    fn parse(&self, link: &str) -> Result<NodeConfig> {
        trace!("Parsing Shadowsocks link");
        let without_scheme = link
            .trim()
            .strip_prefix("ss://")
            .ok_or_else(|| Error::malformed("ss", link, "missing ss:// prefix"))?;

        let (main_part, fragment) = match without_scheme.rfind('#') {
            Some(pos) => (&without_scheme[..pos], Some(&without_scheme[pos + 1..])),
            None => (without_scheme, None),
        };

        let mut config = if let Some(at_pos) = main_part.rfind('@') {
            trace!("Parsing as SIP002 format (found @ separator)");
            self.parse_sip002(link, main_part, at_pos)?
        } else {
            trace!("Parsing as legacy Base64 format");
            self.parse_legacy(link, main_part)?
        };

        config.ps = match fragment {
            Some(fragment) => format_ps(fragment)?,
            None => format_host_port(&config.hostname, config.port),
        };
        Ok(config)
    }

    fn to_link(&self, config: &NodeConfig) -> Result<String> {
        let method = config.method.as_deref().unwrap_or_default();
        let userinfo = URL_SAFE_NO_PAD.encode(format!("{}:{}", method, config.credential));

        let mut link = format!("ss://{}@{}", userinfo, config.host());
        if !config.params.is_empty() {
            let query = url::form_urlencoded::Serializer::new(String::new())
                .extend_pairs(config.params.iter())
                .finish();
            link.push_str(if config.path.is_empty() { "?" } else { "/?" });
            link.push_str(&query);
        }
        if !config.ps.is_empty() {
            link.push('#');
            link.push_str(&urlencoding::encode(&config.ps));
        }
        Ok(link)
    }

    fn fields(&self) -> &'static FieldMap {
        &SHADOWSOCKS_FIELDS
    }
}

impl ShadowsocksParser {
    /// Parses `userinfo@host:port[/][?query]`
    fn parse_sip002(&self, link: &str, main_part: &str, at_pos: usize) -> Result<NodeConfig> {
        let userinfo = &main_part[..at_pos];
        let hostport_and_query = &main_part[at_pos + 1..];

        let (hostport_raw, query) = match hostport_and_query.find('?') {
            Some(q_pos) => (
                &hostport_and_query[..q_pos],
                Some(&hostport_and_query[q_pos + 1..]),
            ),
            None => (hostport_and_query, None),
        };
        let hostport = hostport_raw.trim_end_matches('/');
        let path = if hostport_raw.ends_with('/') { "/" } else { "" };

        let (hostname, port) =
            parse_host_port(hostport).map_err(|reason| Error::malformed("ss", link, reason))?;
        let (method, password) = self.parse_userinfo(link, userinfo)?;

        let params = query
            .map(|q| url::form_urlencoded::parse(q.as_bytes()).into_owned().collect())
            .unwrap_or_default();

        Ok(NodeConfig {
            scheme: "ss".to_string(),
            credential: password,
            method: Some(method),
            hostname,
            port,
            path: path.to_string(),
            params,
            ps: String::new(),
        })
    }

    /// Parses legacy format: BASE64(method:password@host:port)
    fn parse_legacy(&self, link: &str, main_part: &str) -> Result<NodeConfig> {
        let decoded =
            decode_base64_string(main_part).map_err(|e| Error::malformed("ss", link, e.to_string()))?;

        let at_pos = decoded
            .rfind('@')
            .ok_or_else(|| Error::malformed("ss", link, "missing @ in legacy format"))?;
        let (method, password) = split_method_password(&decoded[..at_pos])
            .ok_or_else(|| Error::malformed("ss", link, "missing method:password"))?;
        let (hostname, port) = parse_host_port(&decoded[at_pos + 1..])
            .map_err(|reason| Error::malformed("ss", link, reason))?;

        Ok(NodeConfig {
            scheme: "ss".to_string(),
            credential: password,
            method: Some(method),
            hostname,
            port,
            path: String::new(),
            params: Vec::new(),
            ps: String::new(),
        })
    }

    /// Decodes userinfo, which may be Base64 or percent-encoded `method:password`
    fn parse_userinfo(&self, link: &str, userinfo: &str) -> Result<(String, String)> {
        let decoded = urlencoding::decode(userinfo)
            .map_err(|e| Error::malformed("ss", link, e.to_string()))?;

        if let Some(pair) = split_method_password(&decoded) {
            return Ok(pair);
        }

        let from_base64 = decode_base64_string(userinfo)
            .map_err(|e| Error::malformed("ss", link, e.to_string()))?;
        split_method_password(&from_base64)
            .ok_or_else(|| Error::malformed("ss", link, "missing method:password"))
    }
}

fn split_method_password(s: &str) -> Option<(String, String)> {
    let (method, password) = s.split_once(':')?;
    if method.is_empty() || password.is_empty() {
        return None;
    }
    Some((method.to_string(), password.to_string()))
}
