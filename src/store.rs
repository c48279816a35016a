//! Node store
//!
//! Owns every obfuscating node of one run, keyed by obfuscation token, and
//! restores whole rendered configs by routing each entry to the node whose
//! token its display name carries.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::Value as JsonValue;
use serde_yaml::Value as YamlValue;
use tracing::{debug, warn};

use crate::client::clash::{PROXIES_KEY, PROXY_GROUPS_KEY};
use crate::client::singbox::OUTBOUNDS_KEY;
use crate::client::{ClashConfig, SingBoxConfig};
use crate::error::{Error, Result};
use crate::parser::node::ProxyNode;
use crate::ps::DisplayNameCodec;

/// Insertion-ordered collection of nodes keyed by token
pub struct NodeStore {
    nodes: IndexMap<String, ProxyNode>,
    codec: Arc<dyn DisplayNameCodec>,
}

impl std::fmt::Debug for NodeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeStore")
            .field("tokens", &self.nodes.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl NodeStore {
    pub fn new(codec: Arc<dyn DisplayNameCodec>) -> Self {
        Self {
            nodes: IndexMap::new(),
            codec,
        }
    }

    /// Builds a store, renaming nodes whose display names repeat
    pub fn from_nodes(
        nodes: impl IntoIterator<Item = ProxyNode>,
        codec: Arc<dyn DisplayNameCodec>,
    ) -> Result<Self> {
        let mut store = Self::new(codec);
        for node in nodes {
            store.insert(node)?;
        }
        debug!("Node store holds {} nodes", store.len());
        Ok(store)
    }

    /// Adds a node. A display name already taken gets a numeric suffix
    /// ("HK", "HK 2", "HK 3", ...), so every restored entry stays unique.
    pub fn insert(&mut self, mut node: ProxyNode) -> Result<()> {
        let taken: HashSet<&str> = self.nodes.values().map(ProxyNode::origin_ps).collect();
        if taken.contains(node.origin_ps()) {
            let base = node.origin_ps().to_string();
            let mut suffix = 2;
            let mut candidate = format!("{} {}", base, suffix);
            while taken.contains(candidate.as_str()) {
                suffix += 1;
                candidate = format!("{} {}", base, suffix);
            }
            warn!("Duplicate node name '{}', renamed to '{}'", base, candidate);
            node.update_origin_config(&candidate)?;
        }
        self.nodes.insert(node.confuse_ps().to_string(), node);
        Ok(())
    }

    /// Looks up a node by token
    pub fn get(&self, token: &str) -> Option<&ProxyNode> {
        self.nodes.get(token)
    }

    /// Finds the node owning an obfuscated display name
    ///
    /// Returns the node and the real display name.
    pub fn resolve(&self, opaque: &str) -> Result<(&ProxyNode, String)> {
        let (token, name) = self.codec.split(opaque)?;
        let node = self
            .nodes
            .get(&token)
            .ok_or(Error::UnknownNode(token))?;
        Ok((node, name))
    }

    /// Obfuscated links of all nodes, in insertion order
    pub fn confuse_links(&self) -> Vec<&str> {
        self.nodes.values().map(ProxyNode::confuse_link).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProxyNode> {
        self.nodes.values()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    // ------------------------------------------------------------------------
    // Restore
    // ------------------------------------------------------------------------

    /// Restores every proxy of a rendered Clash config and renames the
    /// matching proxy group members
    ///
    /// Every proxy name must resolve to a node of this store.
    pub fn restore_clash_config(&self, config: ClashConfig) -> Result<ClashConfig> {
        let mut root = config.into_mapping();
        let mut renames: HashMap<String, String> = HashMap::new();

        if let Some(YamlValue::Sequence(proxies)) = root.get_mut(PROXIES_KEY) {
            for entry in proxies.iter_mut() {
                let YamlValue::Mapping(proxy) = entry else {
                    return Err(Error::codec("clash proxy", "entry is not a mapping"));
                };
                let opaque = proxy
                    .get("name")
                    .and_then(YamlValue::as_str)
                    .ok_or_else(|| Error::codec("clash proxy", "entry has no name"))?
                    .to_string();

                let (node, name) = self.resolve(&opaque)?;
                let restored = node.restore_clash(std::mem::take(proxy), &name)?;
                *proxy = restored;
                renames.insert(opaque, name);
            }
        }

        if let Some(YamlValue::Sequence(groups)) = root.get_mut(PROXY_GROUPS_KEY) {
            for group in groups.iter_mut() {
                if let Some(YamlValue::Sequence(members)) = group.get_mut(PROXIES_KEY) {
                    for member in members.iter_mut() {
                        if let Some(name) = member.as_str().and_then(|m| renames.get(m)) {
                            *member = YamlValue::String(name.clone());
                        }
                    }
                }
            }
        }

        debug!("Restored {} clash proxies", renames.len());
        Ok(ClashConfig::from(root))
    }

    /// Restores every node outbound of a rendered sing-box config and renames
    /// the matching group members
    ///
    /// Outbounds whose type no node renders as (selector, direct, ...) are
    /// left alone.
    pub fn restore_singbox_config(&self, config: SingBoxConfig) -> Result<SingBoxConfig> {
        let node_types: HashSet<&str> = self.iter().map(|n| n.fields().singbox_type).collect();
        let mut root = config.into_map();
        let mut renames: HashMap<String, String> = HashMap::new();

        if let Some(JsonValue::Array(outbounds)) = root.get_mut(OUTBOUNDS_KEY) {
            for entry in outbounds.iter_mut() {
                let JsonValue::Object(outbound) = entry else {
                    return Err(Error::codec("sing-box outbound", "entry is not an object"));
                };
                let is_node = outbound
                    .get("type")
                    .and_then(JsonValue::as_str)
                    .is_some_and(|t| node_types.contains(t));
                if !is_node {
                    continue;
                }

                let opaque = outbound
                    .get("tag")
                    .and_then(JsonValue::as_str)
                    .ok_or_else(|| Error::codec("sing-box outbound", "entry has no tag"))?
                    .to_string();

                let (node, name) = self.resolve(&opaque)?;
                let restored = node.restore_singbox(std::mem::take(outbound), &name)?;
                *outbound = restored;
                renames.insert(opaque, name);
            }

            for entry in outbounds.iter_mut() {
                if let Some(JsonValue::Array(members)) = entry.get_mut(OUTBOUNDS_KEY) {
                    for member in members.iter_mut() {
                        if let Some(name) = member.as_str().and_then(|m| renames.get(m)) {
                            *member = JsonValue::String(name.clone());
                        }
                    }
                }
            }
        }

        debug!("Restored {} sing-box outbounds", renames.len());
        Ok(SingBoxConfig::from(root))
    }
}
