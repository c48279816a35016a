use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::client::Target;

use super::helpers::{expand_tilde, fetch_text, is_remote};
use super::subscription::Subscription;

// ============================================================================
// Generator Config Types
// ============================================================================

/// Generator configuration parsed from TOML file
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct GeneratorConfig {
    /// Subscription converter backend URL (required)
    pub backend: String,

    /// Client format to render, default "clash"
    #[serde(default)]
    pub target: Target,

    /// Output file path, default "./out/config.yaml"
    #[serde(default = "default_output")]
    pub output: String,

    /// Extra attempts for every fetch
    #[serde(default = "default_retries")]
    pub retries: u32,

    /// Number of links sent to the backend per request
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Inline proxy links
    #[serde(default)]
    pub links: Vec<String>,

    /// Remote link lists
    #[serde(default)]
    pub subscriptions: Vec<Subscription>,

    /// Extra query parameters forwarded to the backend (e.g. a remote rules config)
    #[serde(default)]
    pub backend_params: BTreeMap<String, String>,
}

// ============================================================================
// Generator Implementation
// ============================================================================

impl GeneratorConfig {
    /// Parse generator config from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: GeneratorConfig =
            toml::from_str(content).context("Failed to parse generator config TOML")?;

        if config.links.is_empty() && config.subscriptions.is_empty() {
            anyhow::bail!("At least one link or subscription is required");
        }

        if !is_remote(&config.backend) {
            anyhow::bail!("Backend must be an http(s) URL: {}", config.backend);
        }
        url::Url::parse(&config.backend)
            .with_context(|| format!("Invalid backend URL: {}", config.backend))?;

        if config.chunk_size == 0 {
            anyhow::bail!("chunk_size must be greater than 0");
        }

        Ok(config)
    }

    /// Load generator config from file path
    pub async fn from_file(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read generator config from {:?}", path))?;
        Self::from_toml(&content)
    }

    /// Load generator config from file path or URL
    pub async fn load(path_or_url: &str) -> Result<Self> {
        if is_remote(path_or_url) {
            Self::from_url(path_or_url).await
        } else {
            let expanded = expand_tilde(path_or_url);
            Self::from_file(Path::new(&expanded)).await
        }
    }

    /// Load generator config from URL
    pub async fn from_url(url: &str) -> Result<Self> {
        let content = fetch_text(url).await?;
        Self::from_toml(&content)
    }
}

fn default_output() -> String {
    "./out/config.yaml".to_string()
}

fn default_retries() -> u32 {
    3
}

fn default_chunk_size() -> usize {
    20
}
