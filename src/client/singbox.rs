//! sing-box configuration tree
//!
//! Outbounds carrying an `outbounds` member list (selector, urltest) are the
//! groups of a sing-box config; every other outbound is a node or a builtin.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{Error, Result};
use crate::store::NodeStore;

use super::ClientConfig;
use super::Target;
use super::merge::{GroupUnion, MergedGroup};

pub const OUTBOUNDS_KEY: &str = "outbounds";

/// Outbound types that carry no proxy node and render identically per chunk
pub const BUILTIN_OUTBOUND_TYPES: [&str; 3] = ["direct", "block", "dns"];

/// A decoded sing-box configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SingBoxConfig {
    root: Map<String, Value>,
}

impl SingBoxConfig {
    pub fn from_json(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        match serde_json::from_str::<Value>(content)? {
            Value::Object(root) => Ok(Self { root }),
            _ => Err(Error::codec("sing-box config", "top level is not an object")),
        }
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.root)?)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.root
    }

    pub fn as_map_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.root
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.root
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    pub fn outbounds(&self) -> &[Value] {
        self.root
            .get(OUTBOUNDS_KEY)
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Tags of all outbounds, in order
    pub fn outbound_tags(&self) -> Vec<&str> {
        self.outbounds()
            .iter()
            .filter_map(|o| o.get("tag").and_then(Value::as_str))
            .collect()
    }

    /// Members of the group outbound with this tag
    pub fn group_members(&self, tag: &str) -> Option<Vec<&str>> {
        self.outbounds()
            .iter()
            .find(|o| o.get("tag").and_then(Value::as_str) == Some(tag))
            .and_then(|o| o.get(OUTBOUNDS_KEY))
            .and_then(Value::as_array)
            .map(|members| members.iter().filter_map(Value::as_str).collect())
    }
}

impl From<Map<String, Value>> for SingBoxConfig {
    fn from(root: Map<String, Value>) -> Self {
        Self { root }
    }
}

impl ClientConfig for SingBoxConfig {
    const TARGET: Target = Target::Singbox;

    fn from_text(content: &str) -> Result<Self> {
        Self::from_json(content)
    }

    fn to_text(&self) -> Result<String> {
        self.to_json_pretty()
    }

    fn merge(configs: Vec<Self>) -> Result<Self> {
        merge_singbox_configs(configs)
    }

    fn restore(self, store: &NodeStore) -> Result<Self> {
        store.restore_singbox_config(self)
    }
}

/// Whether an outbound is a group, i.e. carries a member list
pub fn is_group_outbound(outbound: &Map<String, Value>) -> bool {
    outbound.contains_key(OUTBOUNDS_KEY)
}

/// Whether an outbound is one of the builtin `direct`, `block` or `dns` outbounds
pub fn is_builtin_outbound(outbound: &Map<String, Value>) -> bool {
    outbound
        .get("type")
        .and_then(Value::as_str)
        .is_some_and(|t| BUILTIN_OUTBOUND_TYPES.contains(&t))
}

// ============================================================================
// Merge
// ============================================================================

enum Slot {
    Outbound(Value),
    Group(String),
}

/// Merges sing-box configs into one
///
/// Node outbounds are concatenated in input order. Builtin outbounds are keyed
/// by tag and only the first one seen is kept. Group outbounds are unioned by
/// tag and each stays at the position its tag was first seen.
/// Other top-level fields come from the first config.
pub fn merge_singbox_configs(configs: Vec<SingBoxConfig>) -> Result<SingBoxConfig> {
    if configs.len() <= 1 {
        debug!("Merging {} sing-box config(s): nothing to combine", configs.len());
        return Ok(configs.into_iter().next().unwrap_or_default());
    }

    let total = configs.len();
    let mut slots: Vec<Slot> = Vec::new();
    let mut groups: GroupUnion<Map<String, Value>> = GroupUnion::new();
    let mut builtins: HashSet<String> = HashSet::new();
    let mut base: Option<Map<String, Value>> = None;

    for (index, config) in configs.into_iter().enumerate() {
        let mut root = config.root;

        let outbounds = match root.get_mut(OUTBOUNDS_KEY).map(Value::take) {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(outbounds)) => outbounds,
            Some(_) => return Err(Error::merge(index, "'outbounds' is not a list")),
        };

        for (position, value) in outbounds.into_iter().enumerate() {
            let Value::Object(outbound) = value else {
                return Err(Error::merge(
                    index,
                    format!("outbound #{} is not an object", position),
                ));
            };
            if !is_group_outbound(&outbound) {
                if is_builtin_outbound(&outbound)
                    && let Some(tag) = outbound.get("tag").and_then(Value::as_str)
                    && !builtins.insert(tag.to_string())
                {
                    debug!("Dropping repeated builtin outbound '{}' from config #{}", tag, index);
                    continue;
                }
                slots.push(Slot::Outbound(Value::Object(outbound)));
                continue;
            }

            let (tag, members) = read_group(index, position, &outbound)?;
            if groups.add(&tag, outbound, members) {
                slots.push(Slot::Group(tag));
            }
        }

        if base.is_none() {
            base = Some(root);
        }
    }

    let mut merged = Vec::with_capacity(slots.len());
    for slot in slots {
        match slot {
            Slot::Outbound(value) => merged.push(value),
            Slot::Group(tag) => {
                if let Some(MergedGroup { mut group, members }) = groups.take(&tag) {
                    group.insert(OUTBOUNDS_KEY.to_string(), members.into());
                    merged.push(Value::Object(group));
                }
            }
        }
    }

    debug!("Merged {} sing-box configs: {} outbounds", total, merged.len());

    let mut root = base.unwrap_or_default();
    root.insert(OUTBOUNDS_KEY.to_string(), Value::Array(merged));
    Ok(SingBoxConfig { root })
}

fn read_group(
    config: usize,
    position: usize,
    outbound: &Map<String, Value>,
) -> Result<(String, Vec<String>)> {
    let tag = outbound
        .get("tag")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::merge(config, format!("group outbound #{} has no tag", position)))?
        .to_string();

    let members = match outbound.get(OUTBOUNDS_KEY) {
        Some(Value::Array(members)) => members
            .iter()
            .map(|m| {
                m.as_str().map(str::to_string).ok_or_else(|| {
                    Error::merge(config, format!("group '{}' has a non-string member", tag))
                })
            })
            .collect::<Result<Vec<_>>>()?,
        Some(Value::Null) | None => Vec::new(),
        Some(_) => {
            return Err(Error::merge(
                config,
                format!("members of group '{}' are not a list", tag),
            ));
        }
    };

    Ok((tag, members))
}
