//! VMess protocol parser
//!
//! This module provides parsing for VMess (vmess://) links.
//! VMess links are Base64 encoded JSON:
//! vmess://BASE64({ "v": "2", "ps": "name", "add": "host", "port": 443, "id": "uuid", ... })

use serde_json::{Map, Value};
use tracing::trace;

use crate::error::{Error, Result};
use crate::parser::base64::decode_base64_string;
use crate::parser::node::NodeConfig;

use super::{FieldMap, ProtocolParser};

// ============================================================================
// VMess Parser
// ============================================================================

static VMESS_FIELDS: FieldMap = FieldMap {
    clash_type: "vmess",
    singbox_type: "vmess",
    credential: "uuid",
};

/// Keys of the VMess JSON that map onto `NodeConfig` identity fields
const IDENTITY_KEYS: [&str; 4] = ["ps", "add", "port", "id"];

/// Parser for VMess (vmess://) links
///
/// Every JSON key besides the identity keys is kept as a string parameter.
pub struct VMessParser;

impl ProtocolParser for VMessParser {
    fn scheme(&self) -> &str {
        "vmess"
    }

    fn parse(&self, link: &str) -> Result<NodeConfig> {
        trace!("Parsing VMess link");
        let malformed = |reason: String| Error::malformed("vmess", link, reason);

        let encoded = link
            .trim()
            .strip_prefix("vmess://")
            .ok_or_else(|| malformed("missing vmess:// prefix".to_string()))?;

        let decoded = decode_base64_string(encoded).map_err(|e| malformed(e.to_string()))?;
        let json: Map<String, Value> =
            serde_json::from_str(&decoded).map_err(|e| malformed(e.to_string()))?;

        let hostname = json
            .get("add")
            .and_then(value_as_string)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| malformed("missing host".to_string()))?;

        let port = json
            .get("port")
            .and_then(value_as_string)
            .ok_or_else(|| malformed("missing port".to_string()))?;
        let port: u16 = port
            .parse()
            .map_err(|_| malformed(format!("invalid port number: {}", port)))?;

        let credential = json
            .get("id")
            .and_then(value_as_string)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| malformed("missing id".to_string()))?;

        let ps = json
            .get("ps")
            .and_then(value_as_string)
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| super::format_host_port(&hostname, port));

        let params = json
            .iter()
            .filter(|(key, _)| !IDENTITY_KEYS.contains(&key.as_str()))
            .filter_map(|(key, value)| value_as_string(value).map(|v| (key.clone(), v)))
            .collect();

        trace!("VMess config: server={}:{}, ps={}", hostname, port, ps);

        Ok(NodeConfig {
            scheme: "vmess".to_string(),
            credential,
            method: None,
            hostname,
            port,
            path: String::new(),
            params,
            ps,
        })
    }

    fn to_link(&self, config: &NodeConfig) -> Result<String> {
        let mut json = Map::new();
        json.insert(
            "v".to_string(),
            Value::String(config.param("v").unwrap_or("2").to_string()),
        );
        json.insert("ps".to_string(), Value::String(config.ps.clone()));
        json.insert("add".to_string(), Value::String(config.hostname.clone()));
        json.insert("port".to_string(), Value::String(config.port.to_string()));
        json.insert("id".to_string(), Value::String(config.credential.clone()));
        for (key, value) in &config.params {
            if key != "v" {
                json.insert(key.clone(), Value::String(value.clone()));
            }
        }

        let body = serde_json::to_string(&json)?;
        Ok(format!(
            "vmess://{}",
            base64::Engine::encode(&base64::engine::general_purpose::STANDARD, body)
        ))
    }

    fn fields(&self) -> &'static FieldMap {
        &VMESS_FIELDS
    }
}

/// Reads strings and numbers as strings; providers use both for most keys
fn value_as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
