//! Protocol parsers module
//!
//! Each supported link scheme implements `ProtocolParser`: it turns a link
//! into a `NodeConfig`, formats a `NodeConfig` back into a link, and names the
//! client-format fields that carry its identity.

mod shadowsocks;
mod trojan;
mod vless;
mod vmess;

pub use shadowsocks::ShadowsocksParser;
pub use trojan::TrojanParser;
pub use vless::VLessParser;
pub use vmess::VMessParser;

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;
use url::{Host, Url};

use crate::error::{Error, Result};
use crate::faker::{IdentityFaker, RandomFaker};
use crate::ps::{DisplayNameCodec, PsCodec, format_ps};

use super::node::{NodeConfig, ProxyNode};

// ============================================================================
// Protocol Parser Trait
// ============================================================================

/// Client-format field names and type names for one protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldMap {
    /// `type` of the proxy in Clash configs
    pub clash_type: &'static str,
    /// `type` of the outbound in sing-box configs
    pub singbox_type: &'static str,
    /// Key holding the credential (same in both formats)
    pub credential: &'static str,
}

/// Trait for parsing and formatting one protocol's links
pub trait ProtocolParser: Send + Sync {
    /// Returns the scheme this parser handles (e.g., "vless", "ss")
    fn scheme(&self) -> &str;

    /// Parses a link into its connection identity
    fn parse(&self, link: &str) -> Result<NodeConfig>;

    /// Formats a connection identity as a link of this scheme
    fn to_link(&self, config: &NodeConfig) -> Result<String>;

    /// Field mapping used when restoring rendered entries
    fn fields(&self) -> &'static FieldMap;

    /// Checks if this parser can handle the given link
    fn can_parse(&self, link: &str) -> bool {
        link.starts_with(&format!("{}://", self.scheme()))
    }
}

// ============================================================================
// Protocol Registry
// ============================================================================

/// Registry of protocol parsers keyed by scheme, plus the collaborators
/// every node needs
pub struct ProtocolRegistry {
    parsers: HashMap<String, Arc<dyn ProtocolParser>>,
    faker: Arc<dyn IdentityFaker>,
    codec: Arc<dyn DisplayNameCodec>,
}

impl ProtocolRegistry {
    /// Creates an empty registry with the given collaborators
    pub fn new(faker: Arc<dyn IdentityFaker>, codec: Arc<dyn DisplayNameCodec>) -> Self {
        Self {
            parsers: HashMap::new(),
            faker,
            codec,
        }
    }

    /// Creates a registry with all built-in parsers, a random faker and the
    /// default display name codec
    pub fn with_builtin_parsers() -> Self {
        let mut registry = Self::new(Arc::new(RandomFaker), Arc::new(PsCodec));
        registry.register(Arc::new(VLessParser));
        registry.register(Arc::new(VMessParser));
        registry.register(Arc::new(TrojanParser));
        registry.register(Arc::new(ShadowsocksParser));
        registry
    }

    /// Registers a protocol parser
    pub fn register(&mut self, parser: Arc<dyn ProtocolParser>) {
        self.parsers.insert(parser.scheme().to_string(), parser);
    }

    /// Gets a parser for the given scheme
    pub fn get(&self, scheme: &str) -> Option<&Arc<dyn ProtocolParser>> {
        self.parsers.get(scheme)
    }

    /// The display name codec shared by all nodes of this registry
    pub fn codec(&self) -> &Arc<dyn DisplayNameCodec> {
        &self.codec
    }

    /// Whether any registered parser renders as this sing-box outbound type
    pub fn is_singbox_node_type(&self, outbound_type: &str) -> bool {
        self.parsers
            .values()
            .any(|p| p.fields().singbox_type == outbound_type)
    }

    /// Parses a link into an obfuscating node using the matching parser
    pub fn parse_link(&self, link: &str) -> Result<ProxyNode> {
        let scheme = extract_scheme(link)?;
        debug!("Parsing link with scheme '{}'", scheme);

        let parser = self
            .parsers
            .get(scheme)
            .ok_or_else(|| Error::UnsupportedScheme(scheme.to_string()))?;

        let node = ProxyNode::new(
            link,
            Arc::clone(parser),
            self.faker.as_ref(),
            Arc::clone(&self.codec),
        )?;
        debug!(
            "Parsed {} link -> node '{}' (token {})",
            scheme,
            node.origin_ps(),
            node.confuse_ps()
        );
        Ok(node)
    }

    /// Parses every link in the content (one per line)
    ///
    /// Blank lines and `#` comments are skipped. The first malformed link
    /// aborts the whole list.
    pub fn parse_link_list(&self, content: &str) -> Result<Vec<ProxyNode>> {
        let lines: Vec<&str> = content
            .lines()
            .map(|line| line.trim())
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .collect();

        debug!("Parsing {} link lines from content", lines.len());

        lines.into_iter().map(|line| self.parse_link(line)).collect()
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Parses host:port string, handling IPv6 addresses in brackets
pub fn parse_host_port(hostport: &str) -> std::result::Result<(String, u16), String> {
    if hostport.starts_with('[') {
        let bracket_end = hostport
            .find(']')
            .ok_or("invalid IPv6 address: missing closing bracket")?;

        let host = hostport[1..bracket_end].to_string();
        let port_str = hostport[bracket_end + 1..]
            .strip_prefix(':')
            .ok_or("missing port after IPv6 address")?;
        let port: u16 = port_str
            .parse()
            .map_err(|_| format!("invalid port number: {}", port_str))?;
        return Ok((host, port));
    }

    let colon_pos = hostport.rfind(':').ok_or("missing port")?;
    let host = hostport[..colon_pos].to_string();
    if host.is_empty() {
        return Err("missing host".to_string());
    }
    let port_str = &hostport[colon_pos + 1..];
    let port: u16 = port_str
        .parse()
        .map_err(|_| format!("invalid port number: {}", port_str))?;

    Ok((host, port))
}

/// Extracts the scheme from a link
pub fn extract_scheme(link: &str) -> Result<&str> {
    let (scheme, _) = link
        .split_once("://")
        .ok_or_else(|| Error::malformed("proxy", link, "missing scheme separator ://"))?;
    if scheme.is_empty() {
        return Err(Error::malformed("proxy", link, "missing scheme"));
    }
    Ok(scheme)
}

/// Formats `host:port`, bracketing IPv6 addresses
pub fn format_host_port(hostname: &str, port: u16) -> String {
    if hostname.contains(':') {
        format!("[{}]:{}", hostname, port)
    } else {
        format!("{}:{}", hostname, port)
    }
}

/// Parses `scheme://credential@host:port/path?query#ps` links
pub(crate) fn parse_url_link(scheme: &str, link: &str) -> Result<NodeConfig> {
    let url = Url::parse(link).map_err(|e| Error::malformed(scheme, link, e.to_string()))?;
    if url.scheme() != scheme {
        return Err(Error::malformed(
            scheme,
            link,
            format!("unexpected scheme '{}'", url.scheme()),
        ));
    }

    let credential = urlencoding::decode(url.username())
        .map_err(|e| Error::malformed(scheme, link, e.to_string()))?
        .into_owned();
    if credential.is_empty() {
        return Err(Error::malformed(scheme, link, "missing credential"));
    }

    let hostname = match url.host() {
        Some(Host::Domain(domain)) if !domain.is_empty() => domain.to_string(),
        Some(Host::Ipv4(addr)) => addr.to_string(),
        Some(Host::Ipv6(addr)) => addr.to_string(),
        _ => return Err(Error::malformed(scheme, link, "missing host")),
    };

    let port = url
        .port()
        .ok_or_else(|| Error::malformed(scheme, link, "missing port"))?;

    let ps = match url.fragment() {
        Some(fragment) => format_ps(fragment)?,
        None => format_host_port(&hostname, port),
    };

    Ok(NodeConfig {
        scheme: scheme.to_string(),
        credential,
        method: None,
        hostname,
        port,
        path: url.path().to_string(),
        params: url.query_pairs().into_owned().collect(),
        ps,
    })
}

/// Formats a `NodeConfig` as `scheme://userinfo@host:port/path?query#ps`
pub(crate) fn format_url_link(config: &NodeConfig, userinfo: &str) -> String {
    let mut link = format!(
        "{}://{}@{}{}",
        config.scheme,
        userinfo,
        config.host(),
        config.path
    );
    if !config.params.is_empty() {
        let query = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(config.params.iter())
            .finish();
        link.push('?');
        link.push_str(&query);
    }
    if !config.ps.is_empty() {
        link.push('#');
        link.push_str(&urlencoding::encode(&config.ps));
    }
    link
}
