use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::parser::{ContentType, decode_link_list, detect_content_type};

use super::helpers::fetch_with_retry;

// ============================================================================
// Subscription Types
// ============================================================================

/// Remote link list to pull proxy links from
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Subscription {
    /// Name/identifier for this subscription
    pub name: String,

    /// URL to fetch the subscription from
    pub url: String,
}

impl Subscription {
    /// Fetch the subscription and return its links
    pub async fn fetch_links(&self, retries: u32) -> Result<Vec<String>> {
        let content = fetch_with_retry(&self.url, retries).await?;
        split_links(&content)
            .with_context(|| format!("Failed to read subscription '{}'", self.name))
    }
}

/// Decodes a plain or Base64 link list into individual links
///
/// Blank lines and `#` comments are dropped. Rendered configs (Clash YAML,
/// sing-box JSON) are rejected.
pub fn split_links(content: &str) -> Result<Vec<String>> {
    let content_type = detect_content_type(content);
    debug!("Detected subscription content: {}", content_type);

    match content_type {
        ContentType::PlainLinkList | ContentType::Base64LinkList => {}
        other => anyhow::bail!("Expected a link list, got {}", other),
    }

    let decoded = decode_link_list(content)?;
    Ok(decoded
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}
