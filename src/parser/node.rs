//! Obfuscating proxy node
//!
//! A `ProxyNode` owns the real identity of one node (origin) and a decoy
//! identity with the same shape (confuse). The decoy's display name carries
//! the node's obfuscation token, so an entry rendered from the decoy link can
//! be matched back to the node and restored with the real values.

use std::sync::Arc;

use serde_json::{Map as JsonMap, Value as JsonValue};
use serde_yaml::{Mapping, Value as YamlValue};
use tracing::trace;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::faker::{FakeIdentity, IdentityFaker};
use crate::ps::DisplayNameCodec;

use super::protocols::{FieldMap, ProtocolParser, format_host_port};

// ============================================================================
// Node Config
// ============================================================================

/// Connection identity of one node, shared by the origin and confuse sides
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NodeConfig {
    /// Link scheme (e.g. "vless")
    pub scheme: String,
    /// uuid or password
    pub credential: String,
    /// Cipher, for protocols whose credential is a method/password pair
    pub method: Option<String>,
    /// Server address without brackets
    pub hostname: String,
    pub port: u16,
    /// Link path, usually "" or "/"
    pub path: String,
    /// Query parameters (or the extra JSON keys of VMess links), in link order
    pub params: Vec<(String, String)>,
    /// Display name
    pub ps: String,
}

impl NodeConfig {
    /// `hostname:port`, bracketing IPv6 addresses
    pub fn host(&self) -> String {
        format_host_port(&self.hostname, self.port)
    }

    /// First value of a parameter
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Parameter value, ignoring empty strings
    fn non_empty_param(&self, key: &str) -> Option<&str> {
        self.param(key).filter(|v| !v.is_empty())
    }
}

// ============================================================================
// Proxy Node
// ============================================================================

/// Lifecycle state of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    /// Freshly parsed
    Constructed,
    /// The origin display name was replaced at least once
    Updated,
}

/// One parsed link with its origin and decoy identities
pub struct ProxyNode {
    parser: Arc<dyn ProtocolParser>,
    codec: Arc<dyn DisplayNameCodec>,
    identity: FakeIdentity,
    token: String,
    state: NodeState,

    origin_link: String,
    origin_config: NodeConfig,
    confuse_link: String,
    confuse_config: NodeConfig,
}

impl std::fmt::Debug for ProxyNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyNode")
            .field("scheme", &self.parser.scheme())
            .field("token", &self.token)
            .field("state", &self.state)
            .field("origin_ps", &self.origin_config.ps)
            .finish_non_exhaustive()
    }
}

impl ProxyNode {
    /// Parses `link` and derives its decoy identity
    ///
    /// The obfuscation token is minted here and never changes afterwards.
    pub fn new(
        link: &str,
        parser: Arc<dyn ProtocolParser>,
        faker: &dyn IdentityFaker,
        codec: Arc<dyn DisplayNameCodec>,
    ) -> Result<Self> {
        let origin_config = parser.parse(link)?;
        let identity = FakeIdentity::generate(faker);
        let token = Uuid::new_v4().to_string();

        let mut node = Self {
            parser,
            codec,
            identity,
            token,
            state: NodeState::Constructed,
            origin_link: link.to_string(),
            origin_config,
            confuse_link: String::new(),
            confuse_config: NodeConfig::default(),
        };
        node.set_confuse_config()?;
        Ok(node)
    }

    /// Replaces the origin display name and re-derives both links
    ///
    /// The decoy host, port and credential stay the same; only the display
    /// name (and so the links) change.
    pub fn update_origin_config(&mut self, ps: &str) -> Result<()> {
        let mut origin_config = self.origin_config.clone();
        origin_config.ps = ps.to_string();
        let origin_link = self.parser.to_link(&origin_config)?;

        self.origin_config = origin_config;
        self.origin_link = origin_link;
        self.set_confuse_config()?;
        self.state = NodeState::Updated;
        Ok(())
    }

    fn set_confuse_config(&mut self) -> Result<()> {
        let mut confuse = self.origin_config.clone();
        confuse.credential = self.identity.credential.clone();
        confuse.hostname = self.identity.hostname.clone();
        confuse.port = self.identity.port;
        confuse.ps = self.codec.encode(&self.origin_config.ps, &self.token);

        self.confuse_link = self.parser.to_link(&confuse)?;
        self.confuse_config = confuse;
        trace!("Derived confuse link for token {}", self.token);
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Restore
    // ------------------------------------------------------------------------

    /// Rewrites a rendered Clash proxy with the real identity
    ///
    /// Takes the entry by value and returns the restored entry; keep a copy
    /// if the rendered entry is still needed.
    pub fn restore_clash(&self, mut proxy: Mapping, ps: &str) -> Result<Mapping> {
        let origin = &self.origin_config;
        let fields = self.parser.fields();

        if proxy.get("network").and_then(YamlValue::as_str) == Some("ws") {
            let path = percent_decode(origin.param("path").unwrap_or("/"), "ws path")?;
            let host = self.ws_host();
            with_yaml_mapping(&mut proxy, "ws-opts", |ws_opts| {
                ws_opts.insert("path".into(), path.into());
                with_yaml_mapping(ws_opts, "headers", |headers| {
                    headers.insert("Host".into(), host.into());
                });
            });
        }

        proxy.insert("name".into(), ps.into());
        proxy.insert("server".into(), origin.hostname.as_str().into());
        proxy.insert("port".into(), origin.port.into());
        proxy.insert(fields.credential.into(), origin.credential.as_str().into());

        for key in ["servername", "sni"] {
            if let Some(value) = proxy.get_mut(key)
                && value.is_string()
            {
                *value = self.server_name().into();
            }
        }

        if let Some(YamlValue::Sequence(alpn)) = proxy.get_mut("alpn") {
            for item in alpn.iter_mut() {
                if let YamlValue::String(s) = item {
                    *s = percent_decode(s, "alpn")?;
                }
            }
        }

        trace!("Restored clash proxy '{}'", ps);
        Ok(proxy)
    }

    /// Rewrites a rendered sing-box outbound with the real identity
    ///
    /// Takes the entry by value and returns the restored entry.
    pub fn restore_singbox(
        &self,
        mut outbound: JsonMap<String, JsonValue>,
        ps: &str,
    ) -> Result<JsonMap<String, JsonValue>> {
        let origin = &self.origin_config;
        let fields = self.parser.fields();

        outbound.insert("tag".to_string(), ps.into());
        outbound.insert("server".to_string(), origin.hostname.as_str().into());
        outbound.insert("server_port".to_string(), origin.port.into());
        outbound.insert(fields.credential.to_string(), origin.credential.as_str().into());

        if let Some(JsonValue::Object(tls)) = outbound.get_mut("tls") {
            if let Some(server_name) = tls.get_mut("server_name")
                && server_name.as_str().is_some_and(|s| !s.is_empty())
            {
                *server_name = self.server_name().into();
            }
            if let Some(JsonValue::Array(alpn)) = tls.get_mut("alpn") {
                for item in alpn.iter_mut() {
                    if let JsonValue::String(s) = item {
                        *s = percent_decode(s, "alpn")?;
                    }
                }
            }
        }

        if let Some(JsonValue::Object(transport)) = outbound.get_mut("transport")
            && transport.get("type").and_then(JsonValue::as_str) == Some("ws")
        {
            let path = percent_decode(origin.param("path").unwrap_or("/"), "ws path")?;
            transport.insert("path".to_string(), path.into());
            let host = self.ws_host();
            match transport.get_mut("headers") {
                Some(JsonValue::Object(headers)) => {
                    headers.insert("Host".to_string(), host.into());
                }
                _ => {
                    let mut headers = JsonMap::new();
                    headers.insert("Host".to_string(), host.into());
                    transport.insert("headers".to_string(), headers.into());
                }
            }
        }

        trace!("Restored sing-box outbound '{}'", ps);
        Ok(outbound)
    }

    /// Real TLS server name: the link's `sni`, else the server host
    fn server_name(&self) -> &str {
        self.origin_config
            .non_empty_param("sni")
            .unwrap_or(&self.origin_config.hostname)
    }

    /// Real websocket Host header: the link's `host`, else the server host
    fn ws_host(&self) -> &str {
        self.origin_config
            .non_empty_param("host")
            .unwrap_or(&self.origin_config.hostname)
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    /// Original display name
    pub fn origin_ps(&self) -> &str {
        &self.origin_config.ps
    }

    /// Original link
    pub fn origin_link(&self) -> &str {
        &self.origin_link
    }

    /// Original connection identity
    pub fn origin_config(&self) -> &NodeConfig {
        &self.origin_config
    }

    /// Obfuscation token
    pub fn confuse_ps(&self) -> &str {
        &self.token
    }

    /// Decoy link, safe to hand to a third party
    pub fn confuse_link(&self) -> &str {
        &self.confuse_link
    }

    /// Decoy connection identity
    pub fn confuse_config(&self) -> &NodeConfig {
        &self.confuse_config
    }

    pub fn state(&self) -> NodeState {
        self.state
    }

    pub fn scheme(&self) -> &str {
        self.parser.scheme()
    }

    pub fn fields(&self) -> &'static FieldMap {
        self.parser.fields()
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn percent_decode(value: &str, context: &str) -> Result<String> {
    urlencoding::decode(value)
        .map(|s| s.into_owned())
        .map_err(|e| Error::codec(format!("{} '{}'", context, value), e))
}

/// Runs `f` on the child mapping at `key`, creating it if absent or not a
/// mapping. Existing keys keep their position.
fn with_yaml_mapping(parent: &mut Mapping, key: &str, f: impl FnOnce(&mut Mapping)) {
    if let Some(YamlValue::Mapping(child)) = parent.get_mut(key) {
        f(child);
        return;
    }
    let mut child = Mapping::new();
    f(&mut child);
    parent.insert(key.into(), YamlValue::Mapping(child));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::protocols::{ShadowsocksParser, TrojanParser, VLessParser};
    use crate::ps::PsCodec;

    struct FixedFaker;

    impl IdentityFaker for FixedFaker {
        fn generate_host(&self) -> String {
            "decoy.example.net".to_string()
        }
        fn generate_port(&self) -> u16 {
            10086
        }
        fn generate_credential(&self) -> String {
            "00000000-0000-4000-8000-000000000000".to_string()
        }
    }

    const VLESS_WS: &str = "vless://real-uuid@real.host:443?type=ws&security=tls&path=%2Fray&host=cdn.real.host&sni=sni.real.host&alpn=h2%2Chttp%2F1.1#HK%2001";

    fn vless_node(link: &str) -> ProxyNode {
        ProxyNode::new(link, Arc::new(VLessParser), &FixedFaker, Arc::new(PsCodec)).unwrap()
    }

    fn yaml(s: &str) -> Mapping {
        serde_yaml::from_str(s).unwrap()
    }

    #[test]
    fn test_construct_derives_confuse_config() {
        let node = vless_node(VLESS_WS);

        assert_eq!(node.state(), NodeState::Constructed);
        assert_eq!(node.origin_link(), VLESS_WS);
        assert_eq!(node.origin_ps(), "HK 01");
        assert_eq!(node.origin_config().hostname, "real.host");

        let confuse = node.confuse_config();
        assert_eq!(confuse.hostname, "decoy.example.net");
        assert_eq!(confuse.port, 10086);
        assert_eq!(confuse.credential, "00000000-0000-4000-8000-000000000000");
        assert_eq!(confuse.params, node.origin_config().params);
        assert_eq!(PsCodec.decode(&confuse.ps).unwrap(), "HK 01");

        assert!(!node.confuse_link().contains("real.host:443"));
        assert!(!node.confuse_link().contains("real-uuid"));
        assert!(node.confuse_link().starts_with("vless://00000000-0000-4000-8000-000000000000@decoy.example.net:10086"));
    }

    #[test]
    fn test_token_is_unique_per_node() {
        let a = vless_node(VLESS_WS);
        let b = vless_node(VLESS_WS);
        assert_ne!(a.confuse_ps(), b.confuse_ps());
        assert!(Uuid::parse_str(a.confuse_ps()).is_ok());
    }

    #[test]
    fn test_confuse_ps_embeds_token() {
        let node = vless_node(VLESS_WS);
        let (token, name) = PsCodec.split(&node.confuse_config().ps).unwrap();
        assert_eq!(token, node.confuse_ps());
        assert_eq!(name, "HK 01");
    }

    #[test]
    fn test_construct_malformed_link() {
        let result = ProxyNode::new(
            "vless://uuid@real.host",
            Arc::new(VLessParser),
            &FixedFaker,
            Arc::new(PsCodec),
        );
        assert!(result.unwrap_err().is_malformed_link());
    }

    #[test]
    fn test_update_origin_config() {
        let mut node = vless_node(VLESS_WS);
        let token = node.confuse_ps().to_string();
        let old_confuse_link = node.confuse_link().to_string();

        node.update_origin_config("US 02").unwrap();

        assert_eq!(node.state(), NodeState::Updated);
        assert_eq!(node.origin_ps(), "US 02");
        assert!(node.origin_link().ends_with("#US%2002"));
        assert_ne!(node.confuse_link(), old_confuse_link);
        assert_eq!(node.confuse_ps(), token);

        let (ps_token, name) = PsCodec.split(&node.confuse_config().ps).unwrap();
        assert_eq!(ps_token, token);
        assert_eq!(name, "US 02");
        assert_eq!(node.confuse_config().hostname, "decoy.example.net");
    }

    #[test]
    fn test_restore_clash_identity() {
        let node = vless_node("vless://real-uuid@real.host:443?security=tls#name");
        let proxy = yaml(
            "name: opaque\ntype: vless\nserver: decoy.example.net\nport: 10086\nuuid: fake\nudp: true\ntls: true\n",
        );

        let restored = node.restore_clash(proxy, "Real Name").unwrap();

        assert_eq!(restored.get("name").and_then(YamlValue::as_str), Some("Real Name"));
        assert_eq!(restored.get("server").and_then(YamlValue::as_str), Some("real.host"));
        assert_eq!(restored.get("port").and_then(YamlValue::as_u64), Some(443));
        assert_eq!(restored.get("uuid").and_then(YamlValue::as_str), Some("real-uuid"));
        assert_eq!(restored.get("udp").and_then(YamlValue::as_bool), Some(true));
        assert_eq!(restored.get("tls").and_then(YamlValue::as_bool), Some(true));
    }

    #[test]
    fn test_restore_clash_ws_and_alpn() {
        let node = vless_node(VLESS_WS);
        let proxy = yaml(
            "name: opaque\nserver: decoy.example.net\nport: 10086\nuuid: fake\nnetwork: ws\nservername: decoy.example.net\nalpn:\n  - h2\n  - http%2F1.1\nws-opts:\n  path: /fake\n  headers:\n    Host: decoy.example.net\n    User-Agent: test\n",
        );

        let restored = node.restore_clash(proxy, "HK 01").unwrap();

        let ws_opts = restored.get("ws-opts").and_then(YamlValue::as_mapping).unwrap();
        assert_eq!(ws_opts.get("path").and_then(YamlValue::as_str), Some("/ray"));
        let headers = ws_opts.get("headers").and_then(YamlValue::as_mapping).unwrap();
        assert_eq!(headers.get("Host").and_then(YamlValue::as_str), Some("cdn.real.host"));
        assert_eq!(headers.get("User-Agent").and_then(YamlValue::as_str), Some("test"));

        assert_eq!(
            restored.get("servername").and_then(YamlValue::as_str),
            Some("sni.real.host")
        );
        let alpn: Vec<&str> = restored
            .get("alpn")
            .and_then(YamlValue::as_sequence)
            .unwrap()
            .iter()
            .filter_map(YamlValue::as_str)
            .collect();
        assert_eq!(alpn, vec!["h2", "http/1.1"]);
    }

    #[test]
    fn test_restore_clash_ws_without_opts() {
        let node = vless_node("vless://real-uuid@real.host:443?type=ws#name");
        let proxy = yaml("name: opaque\nnetwork: ws\n");

        let restored = node.restore_clash(proxy, "name").unwrap();

        let ws_opts = restored.get("ws-opts").and_then(YamlValue::as_mapping).unwrap();
        assert_eq!(ws_opts.get("path").and_then(YamlValue::as_str), Some("/"));
        let headers = ws_opts.get("headers").and_then(YamlValue::as_mapping).unwrap();
        assert_eq!(headers.get("Host").and_then(YamlValue::as_str), Some("real.host"));
    }

    #[test]
    fn test_restore_clash_keeps_key_order() {
        let node = vless_node("vless://real-uuid@real.host:443#name");
        let proxy = yaml("name: a\ntype: vless\nserver: b\nport: 1\nuuid: c\n");

        let restored = node.restore_clash(proxy, "name").unwrap();
        let keys: Vec<&str> = restored.keys().filter_map(YamlValue::as_str).collect();
        assert_eq!(keys, vec!["name", "type", "server", "port", "uuid"]);
    }

    #[test]
    fn test_restore_clash_trojan_password() {
        let node = ProxyNode::new(
            "trojan://real-pass@real.host:443#t",
            Arc::new(TrojanParser),
            &FixedFaker,
            Arc::new(PsCodec),
        )
        .unwrap();
        let proxy = yaml("name: opaque\ntype: trojan\npassword: fake\nsni: decoy.example.net\n");

        let restored = node.restore_clash(proxy, "t").unwrap();
        assert_eq!(restored.get("password").and_then(YamlValue::as_str), Some("real-pass"));
        assert_eq!(restored.get("sni").and_then(YamlValue::as_str), Some("real.host"));
        assert!(restored.get("uuid").is_none());
    }

    #[test]
    fn test_restore_clash_invalid_alpn_is_reported() {
        let node = vless_node("vless://real-uuid@real.host:443#name");
        let proxy = yaml("name: opaque\nalpn:\n  - \"%FF\"\n");
        let err = node.restore_clash(proxy, "name").unwrap_err();
        assert!(err.is_codec());
    }

    #[test]
    fn test_restore_is_pure() {
        let node = vless_node(VLESS_WS);
        let before = node.origin_config().clone();
        let proxy = yaml("name: opaque\nnetwork: ws\nalpn: [h2]\n");

        let first = node.restore_clash(proxy.clone(), "HK 01").unwrap();
        let second = node.restore_clash(proxy, "HK 01").unwrap();

        assert_eq!(first, second);
        assert_eq!(node.origin_config(), &before);
    }

    #[test]
    fn test_restore_singbox() {
        let node = vless_node(VLESS_WS);
        let outbound: JsonMap<String, JsonValue> = serde_json::from_str(
            r#"{
                "type": "vless",
                "tag": "opaque",
                "server": "decoy.example.net",
                "server_port": 10086,
                "uuid": "fake",
                "tls": {"enabled": true, "server_name": "decoy.example.net", "alpn": ["h2", "http%2F1.1"]},
                "transport": {"type": "ws", "path": "/fake"}
            }"#,
        )
        .unwrap();

        let restored = node.restore_singbox(outbound, "HK 01").unwrap();

        assert_eq!(restored["tag"], "HK 01");
        assert_eq!(restored["server"], "real.host");
        assert_eq!(restored["server_port"], 443);
        assert_eq!(restored["uuid"], "real-uuid");
        assert_eq!(restored["tls"]["server_name"], "sni.real.host");
        assert_eq!(restored["tls"]["alpn"][1], "http/1.1");
        assert_eq!(restored["tls"]["enabled"], true);
        assert_eq!(restored["transport"]["path"], "/ray");
        assert_eq!(restored["transport"]["headers"]["Host"], "cdn.real.host");
    }

    #[test]
    fn test_restore_singbox_without_tls() {
        let node = ProxyNode::new(
            "ss://YWVzLTI1Ni1nY206cGFzc3dvcmQ@real.host:8388#ss",
            Arc::new(ShadowsocksParser),
            &FixedFaker,
            Arc::new(PsCodec),
        )
        .unwrap();
        let outbound: JsonMap<String, JsonValue> = serde_json::from_str(
            r#"{"type": "shadowsocks", "tag": "opaque", "method": "aes-256-gcm", "password": "fake"}"#,
        )
        .unwrap();

        let restored = node.restore_singbox(outbound, "ss").unwrap();
        assert_eq!(restored["password"], "password");
        assert_eq!(restored["method"], "aes-256-gcm");
        assert!(restored.get("tls").is_none());
    }

    #[test]
    fn test_vless_restore_round_trip_property() {
        let node = vless_node("vless://the-uuid@real.host:443?security=tls#name");
        assert!(!node.confuse_link().contains("real.host"));

        let rendered = yaml(&format!(
            "name: '{}'\ntype: vless\nserver: {}\nport: {}\nuuid: {}\n",
            node.confuse_config().ps,
            node.confuse_config().hostname,
            node.confuse_config().port,
            node.confuse_config().credential
        ));
        let restored = node.restore_clash(rendered, "supplied").unwrap();

        assert_eq!(restored.get("server").and_then(YamlValue::as_str), Some("real.host"));
        assert_eq!(restored.get("port").and_then(YamlValue::as_u64), Some(443));
        assert_eq!(restored.get("uuid").and_then(YamlValue::as_str), Some("the-uuid"));
        assert_eq!(restored.get("name").and_then(YamlValue::as_str), Some("supplied"));
    }
}
