//! Configuration generator module
//!
//! This module orchestrates the whole pipeline: links are obfuscated, rendered
//! by a converter backend, merged and restored to their real identities
//! before the final config is written.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::client::{ClashConfig, ClientConfig, SingBoxConfig, Target, fetch_configs};
use crate::parser::ProtocolRegistry;
use crate::parser::base64::encode_link_list;
use crate::store::NodeStore;

// Sub-modules
pub mod backend;
pub mod generator_config;
pub mod helpers;
pub mod subscription;

// Re-exports
pub use backend::build_backend_urls;
pub use generator_config::GeneratorConfig;
pub use helpers::{expand_tilde, fetch_text, fetch_with_retry, read_source};
pub use subscription::{Subscription, split_links};

// ============================================================================
// Generator
// ============================================================================

/// Generator that orchestrates the config generation process
pub struct Generator {
    config: GeneratorConfig,
    registry: ProtocolRegistry,
}

impl Generator {
    /// Create a new generator with the given config and the builtin parsers
    pub fn new(config: GeneratorConfig) -> Self {
        Self::with_registry(config, ProtocolRegistry::with_builtin_parsers())
    }

    pub fn with_registry(config: GeneratorConfig, registry: ProtocolRegistry) -> Self {
        Self { config, registry }
    }

    /// Load generator from path or URL
    pub async fn load(path_or_url: &str) -> Result<Self> {
        let config = GeneratorConfig::load(path_or_url).await?;
        Ok(Self::new(config))
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Run the generation process and return the encoded config
    pub async fn generate(&self) -> Result<String> {
        info!("Starting config generation for {}", self.config.target);

        // 1. Collect links from the profile and its subscriptions
        let links = self.gather_links().await?;
        info!("Collected {} link(s)", links.len());

        // 2. Obfuscate every link
        let store = self.build_store(&links)?;

        // 3. Render, merge and restore
        let text = match self.config.target {
            Target::Clash => self.render::<ClashConfig>(&store).await?.to_text()?,
            Target::Singbox => self.render::<SingBoxConfig>(&store).await?.to_text()?,
        };

        info!("Generated config for {} node(s)", store.len());
        Ok(text)
    }

    /// Generate and write to output file
    pub async fn generate_to_file(&self, output_override: Option<&str>) -> Result<()> {
        let text = self.generate().await?;
        let output_path = output_override.unwrap_or(&self.config.output);
        write_output(output_path, &text).await
    }

    /// Inline links followed by every subscription's links, in profile order
    async fn gather_links(&self) -> Result<Vec<String>> {
        let mut links = self.config.links.clone();
        let total = self.config.subscriptions.len();

        for (index, sub) in self.config.subscriptions.iter().enumerate() {
            info!(
                "Fetching subscription [{}/{}]: '{}'",
                index + 1,
                total,
                sub.name
            );
            let sub_links = sub.fetch_links(self.config.retries).await?;
            debug!("Subscription '{}' returned {} link(s)", sub.name, sub_links.len());
            links.extend(sub_links);
        }

        Ok(links)
    }

    /// Parses every link; one malformed link aborts the run
    pub fn build_store(&self, links: &[String]) -> Result<NodeStore> {
        let nodes = links
            .iter()
            .map(|link| {
                self.registry
                    .parse_link(link)
                    .with_context(|| format!("Failed to parse link: {}", link))
            })
            .collect::<Result<Vec<_>>>()?;
        let store = NodeStore::from_nodes(nodes, std::sync::Arc::clone(self.registry.codec()))?;
        Ok(store)
    }

    /// Backend request URLs for the store's obfuscated links
    pub fn backend_urls(&self, store: &NodeStore) -> Result<Vec<String>> {
        build_backend_urls(
            &self.config.backend,
            self.config.target,
            &store.confuse_links(),
            self.config.chunk_size,
            &self.config.backend_params,
        )
    }

    async fn render<C: ClientConfig>(&self, store: &NodeStore) -> Result<C> {
        let urls = self.backend_urls(store)?;
        let merged: C = fetch_configs(&urls, self.config.retries).await?;
        let restored = merged
            .restore(store)
            .context("Failed to restore rendered config")?;
        Ok(restored)
    }
}

/// Decodes rendered texts, merges them and restores the store's nodes
pub fn assemble<C: ClientConfig>(store: &NodeStore, rendered: &[String]) -> Result<C> {
    let merged = C::merge_texts(rendered).context("Failed to merge rendered configs")?;
    let restored = merged
        .restore(store)
        .context("Failed to restore rendered config")?;
    Ok(restored)
}

/// Writes text to `path`, creating parent directories
pub async fn write_output(path: &str, text: &str) -> Result<()> {
    let expanded_path = expand_tilde(path);
    let path = Path::new(&expanded_path);

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create output directory {:?}", parent))?;
    }

    tokio::fs::write(path, text)
        .await
        .with_context(|| format!("Failed to write config to {:?}", path))?;

    info!("Config written to {:?}", path);
    Ok(())
}

// ============================================================================
// Commands
// ============================================================================

/// Reads a link list from a file or URL and returns the obfuscated links
pub async fn confuse_source(
    registry: &ProtocolRegistry,
    source: &str,
    retries: u32,
) -> Result<Vec<String>> {
    let content = read_source(source, retries).await?;
    let links = split_links(&content)?;
    let nodes = registry
        .parse_link_list(&links.join("\n"))
        .with_context(|| format!("Failed to parse links from {}", source))?;
    Ok(nodes
        .iter()
        .map(|node| node.confuse_link().to_string())
        .collect())
}

/// Encodes obfuscated links as a subscription body
pub fn encode_confused(links: &[String], base64: bool) -> String {
    if base64 {
        encode_link_list(links)
    } else {
        links.join("\n")
    }
}

/// Loads configs from files or URLs and merges them
pub async fn merge_sources(target: Target, sources: &[String], retries: u32) -> Result<String> {
    let mut texts = Vec::with_capacity(sources.len());
    for source in sources {
        texts.push(read_source(source, retries).await?);
    }
    info!("Merging {} {} config(s)", texts.len(), target);

    let text = match target {
        Target::Clash => ClashConfig::merge_texts(&texts)?.to_text()?,
        Target::Singbox => SingBoxConfig::merge_texts(&texts)?.to_text()?,
    };
    Ok(text)
}

// ============================================================================
// Tests
// ============================================================================
