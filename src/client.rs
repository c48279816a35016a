//! Client configuration formats
//!
//! Decoding, merging, restoring and encoding of rendered Clash and sing-box
//! configurations.

use std::fmt;

use anyhow::Context;
use clap::ValueEnum;
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::Result;
use crate::generator::helpers::fetch_with_retry;
use crate::store::NodeStore;

pub mod clash;
pub mod merge;
pub mod singbox;

pub use clash::{ClashConfig, merge_clash_configs};
pub use merge::{GroupUnion, is_same_members, merge_members};
pub use singbox::{SingBoxConfig, merge_singbox_configs};

/// Client format a configuration is rendered for
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Target {
    #[default]
    Clash,
    Singbox,
}

impl Target {
    /// Value of the backend's `target` query parameter
    pub fn as_str(&self) -> &'static str {
        match self {
            Target::Clash => "clash",
            Target::Singbox => "singbox",
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A client configuration tree
pub trait ClientConfig: Sized + Send {
    const TARGET: Target;

    /// Decodes rendered text
    fn from_text(content: &str) -> Result<Self>;

    /// Encodes for delivery
    fn to_text(&self) -> Result<String>;

    /// Combines several configs into one
    fn merge(configs: Vec<Self>) -> Result<Self>;

    /// Replaces every obfuscated node with its real identity
    fn restore(self, store: &NodeStore) -> Result<Self>;

    /// Decodes each text and merges the results, aborting on the first failure
    fn merge_texts<S: AsRef<str>>(texts: &[S]) -> Result<Self> {
        let configs = texts
            .iter()
            .map(|text| Self::from_text(text.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Self::merge(configs)
    }
}

/// Fetches rendered configs concurrently and merges them
///
/// Any failed fetch or decode aborts the whole operation.
pub async fn fetch_configs<C: ClientConfig>(urls: &[String], retries: u32) -> anyhow::Result<C> {
    info!("Fetching {} {} config(s)", urls.len(), C::TARGET);

    let texts = try_join_all(urls.iter().map(|url| fetch_with_retry(url, retries)))
        .await
        .with_context(|| format!("Failed to get {} config", C::TARGET))?;
    debug!(
        "Fetched {} bytes in total",
        texts.iter().map(String::len).sum::<usize>()
    );

    let merged = C::merge_texts(&texts)
        .with_context(|| format!("Failed to merge {} configs", C::TARGET))?;
    Ok(merged)
}
