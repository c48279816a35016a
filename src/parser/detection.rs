//! Content format detection
//!
//! Subscription sources may be plain or Base64 link lists; converter backends
//! answer with Clash YAML or sing-box JSON.

use tracing::debug;

use super::base64::decode_base64_string;
use crate::error::Result;

// ============================================================================
// Content Type Detection
// ============================================================================

/// Detected content type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    /// Sing-box JSON (contains an "outbounds" array)
    SingBoxJson,
    /// Clash YAML
    ClashYaml,
    /// Plain link list, one link per line
    PlainLinkList,
    /// Base64 encoded link list
    Base64LinkList,
    /// Unknown format
    Unknown,
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContentType::SingBoxJson => write!(f, "Sing-box JSON"),
            ContentType::ClashYaml => write!(f, "Clash YAML"),
            ContentType::PlainLinkList => write!(f, "Plain Link List"),
            ContentType::Base64LinkList => write!(f, "Base64 Link List"),
            ContentType::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Detects the type of fetched content
pub fn detect_content_type(content: &str) -> ContentType {
    let trimmed = content.trim();
    debug!(
        "Detecting content type, length: {} bytes",
        content.len()
    );

    if is_singbox_json(trimmed) {
        return ContentType::SingBoxJson;
    }
    if is_clash_yaml(trimmed) {
        return ContentType::ClashYaml;
    }
    if is_plain_link_list(trimmed) {
        return ContentType::PlainLinkList;
    }
    if is_base64_content(trimmed) {
        return ContentType::Base64LinkList;
    }

    debug!("Unable to detect content type");
    ContentType::Unknown
}

/// Checks if content is sing-box JSON
pub fn is_singbox_json(content: &str) -> bool {
    let trimmed = content.trim();
    trimmed.starts_with('{') && trimmed.contains("\"outbounds\"")
}

/// Checks if content is Clash YAML
pub fn is_clash_yaml(content: &str) -> bool {
    let trimmed = content.trim();
    trimmed.starts_with("proxies:")
        || trimmed.starts_with("proxy-groups:")
        || trimmed.starts_with("port:")
        || trimmed.starts_with("mixed-port:")
        || (trimmed.contains("proxies:") && trimmed.contains("- name:"))
}

/// Checks if the first line of content is a proxy link
pub fn is_plain_link_list(content: &str) -> bool {
    let first_line = content.lines().next().unwrap_or("").trim();
    is_proxy_link(first_line)
}

/// Checks if a string starts with a supported proxy scheme
pub fn is_proxy_link(s: &str) -> bool {
    ["ss://", "vmess://", "vless://", "trojan://"]
        .iter()
        .any(|p| s.starts_with(p))
}

/// Checks if content is Base64 that decodes to proxy links
pub fn is_base64_content(content: &str) -> bool {
    let cleaned: String = content.chars().filter(|c| !c.is_whitespace()).collect();
    if cleaned.len() < 4 {
        return false;
    }

    let is_valid_base64 = cleaned.chars().all(|c| {
        c.is_ascii_alphanumeric() || c == '+' || c == '/' || c == '=' || c == '-' || c == '_'
    });
    if !is_valid_base64 {
        return false;
    }

    decode_base64_string(&cleaned)
        .map(|decoded| decoded.lines().any(|line| is_proxy_link(line.trim())))
        .unwrap_or(false)
}

/// Returns the link list carried by a subscription body, decoding Base64 if needed
pub fn decode_link_list(content: &str) -> Result<String> {
    match detect_content_type(content) {
        ContentType::Base64LinkList => decode_base64_string(content.trim()),
        _ => Ok(content.to_string()),
    }
}
