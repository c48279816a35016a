//! Clash configuration tree
//!
//! The tree is kept as an untyped YAML mapping so every field the merge and
//! restore steps do not touch survives a decode/encode round trip.

use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Sequence, Value};
use tracing::debug;

use crate::error::{Error, Result};
use crate::store::NodeStore;

use super::ClientConfig;
use super::Target;
use super::merge::{GroupUnion, MergedGroup};

pub const PROXIES_KEY: &str = "proxies";
pub const PROXY_GROUPS_KEY: &str = "proxy-groups";

/// A decoded Clash configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClashConfig {
    root: Mapping,
}

impl ClashConfig {
    /// Parses Clash YAML; an empty document yields an empty config
    pub fn from_yaml(content: &str) -> Result<Self> {
        match serde_yaml::from_str::<Value>(content)? {
            Value::Mapping(root) => Ok(Self { root }),
            Value::Null => Ok(Self::default()),
            _ => Err(Error::codec("clash config", "top level is not a mapping")),
        }
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(&self.root)?)
    }

    pub fn as_mapping(&self) -> &Mapping {
        &self.root
    }

    pub fn as_mapping_mut(&mut self) -> &mut Mapping {
        &mut self.root
    }

    pub fn into_mapping(self) -> Mapping {
        self.root
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    /// Proxy entries, empty if absent
    pub fn proxies(&self) -> &[Value] {
        sequence(&self.root, PROXIES_KEY)
    }

    /// Proxy group entries, empty if absent
    pub fn proxy_groups(&self) -> &[Value] {
        sequence(&self.root, PROXY_GROUPS_KEY)
    }

    /// Names of all proxy entries, in order
    pub fn proxy_names(&self) -> Vec<&str> {
        self.proxies()
            .iter()
            .filter_map(|p| p.get("name").and_then(Value::as_str))
            .collect()
    }

    /// Members of the named proxy group
    pub fn group_members(&self, name: &str) -> Option<Vec<&str>> {
        self.proxy_groups()
            .iter()
            .find(|g| g.get("name").and_then(Value::as_str) == Some(name))
            .map(|g| {
                g.get(PROXIES_KEY)
                    .and_then(Value::as_sequence)
                    .map(|members| members.iter().filter_map(Value::as_str).collect())
                    .unwrap_or_default()
            })
    }
}

impl From<Mapping> for ClashConfig {
    fn from(root: Mapping) -> Self {
        Self { root }
    }
}

impl ClientConfig for ClashConfig {
    const TARGET: Target = Target::Clash;

    fn from_text(content: &str) -> Result<Self> {
        Self::from_yaml(content)
    }

    fn to_text(&self) -> Result<String> {
        self.to_yaml()
    }

    fn merge(configs: Vec<Self>) -> Result<Self> {
        merge_clash_configs(configs)
    }

    fn restore(self, store: &NodeStore) -> Result<Self> {
        store.restore_clash_config(self)
    }
}

// ============================================================================
// Merge
// ============================================================================

/// Merges Clash configs into one
///
/// - No input: an empty config.
/// - One input: returned as is.
/// - Otherwise proxies are concatenated in input order, proxy groups are
///   unioned by name in first-seen order, and every other top-level field is
///   taken from the first config.
///
/// A structurally invalid group aborts the merge.
pub fn merge_clash_configs(configs: Vec<ClashConfig>) -> Result<ClashConfig> {
    if configs.len() <= 1 {
        debug!("Merging {} clash config(s): nothing to combine", configs.len());
        return Ok(configs.into_iter().next().unwrap_or_default());
    }

    let total = configs.len();
    let mut proxies = Sequence::new();
    let mut groups: GroupUnion<Mapping> = GroupUnion::new();
    let mut base: Option<Mapping> = None;

    for (index, config) in configs.into_iter().enumerate() {
        let mut root = config.root;

        proxies.extend(take_sequence(&mut root, PROXIES_KEY, index)?);

        let config_groups = take_sequence(&mut root, PROXY_GROUPS_KEY, index)?;
        for (group_index, value) in config_groups.into_iter().enumerate() {
            let (name, group, members) = read_group(index, group_index, value)?;
            groups.add(&name, group, members);
        }

        if base.is_none() {
            base = Some(root);
        }
    }

    let merged_groups: Sequence = groups
        .into_groups()
        .map(|(_, MergedGroup { mut group, members })| {
            let members = members.into_iter().map(Value::String).collect();
            group.insert(PROXIES_KEY.into(), Value::Sequence(members));
            Value::Mapping(group)
        })
        .collect();

    debug!(
        "Merged {} clash configs: {} proxies, {} groups",
        total,
        proxies.len(),
        merged_groups.len()
    );

    let mut root = base.unwrap_or_default();
    root.insert(PROXIES_KEY.into(), Value::Sequence(proxies));
    root.insert(PROXY_GROUPS_KEY.into(), Value::Sequence(merged_groups));
    Ok(ClashConfig { root })
}

fn sequence<'a>(root: &'a Mapping, key: &str) -> &'a [Value] {
    root.get(key)
        .and_then(Value::as_sequence)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

/// Moves a sequence out of the mapping, leaving `null` in place so the key
/// keeps its position
fn take_sequence(root: &mut Mapping, key: &str, config: usize) -> Result<Sequence> {
    match root.get_mut(key) {
        None => Ok(Sequence::new()),
        Some(value) => match std::mem::take(value) {
            Value::Null => Ok(Sequence::new()),
            Value::Sequence(seq) => Ok(seq),
            _ => Err(Error::merge(config, format!("'{}' is not a list", key))),
        },
    }
}

fn read_group(
    config: usize,
    group_index: usize,
    value: Value,
) -> Result<(String, Mapping, Vec<String>)> {
    let Value::Mapping(group) = value else {
        return Err(Error::merge(
            config,
            format!("proxy group #{} is not a mapping", group_index),
        ));
    };

    let name = group
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::merge(config, format!("proxy group #{} has no name", group_index)))?
        .to_string();

    let members = match group.get(PROXIES_KEY) {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Sequence(seq)) => seq
            .iter()
            .map(|m| {
                m.as_str().map(str::to_string).ok_or_else(|| {
                    Error::merge(config, format!("proxy group '{}' has a non-string member", name))
                })
            })
            .collect::<Result<Vec<_>>>()?,
        Some(_) => {
            return Err(Error::merge(
                config,
                format!("members of proxy group '{}' are not a list", name),
            ));
        }
    };

    Ok((name, group, members))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(yaml: &str) -> ClashConfig {
        ClashConfig::from_yaml(yaml).unwrap()
    }

    #[test]
    fn test_from_yaml_rejects_non_mapping() {
        let err = ClashConfig::from_yaml("- a\n- b\n").unwrap_err();
        assert!(err.is_codec());
        assert!(ClashConfig::from_yaml("proxies: [").unwrap_err().is_codec());
    }

    #[test]
    fn test_from_yaml_empty_document() {
        assert!(ClashConfig::from_yaml("").unwrap().is_empty());
    }

    #[test]
    fn test_round_trip_keeps_unknown_fields() {
        let c = config("mixed-port: 7890\nmode: rule\ndns:\n  enable: true\nrules:\n  - MATCH,DIRECT\n");
        let reparsed = ClashConfig::from_yaml(&c.to_yaml().unwrap()).unwrap();
        assert_eq!(reparsed, c);
    }

    #[test]
    fn test_merge_empty() {
        let merged = merge_clash_configs(vec![]).unwrap();
        assert!(merged.is_empty());
    }

    #[test]
    fn test_merge_single_unchanged() {
        let c = config("port: 7890\nproxies:\n  - name: a\nproxy-groups:\n  - name: G\n    proxies: [a, a]\n");
        assert_eq!(merge_clash_configs(vec![c.clone()]).unwrap(), c);
    }

    #[test]
    fn test_merge_concatenates_proxies() {
        let a = config("proxies:\n  - name: p1\n  - name: p2\n");
        let b = config("proxies:\n  - name: p3\n  - name: p1\n  - name: p4\n");
        let merged = merge_clash_configs(vec![a, b]).unwrap();
        assert_eq!(merged.proxy_names(), vec!["p1", "p2", "p3", "p1", "p4"]);
    }

    #[test]
    fn test_merge_same_member_set_keeps_order() {
        let a = config("proxy-groups:\n  - name: A\n    type: select\n    proxies: [x, y]\n");
        let b = config("proxy-groups:\n  - name: A\n    type: select\n    proxies: [y, x]\n");
        let merged = merge_clash_configs(vec![a, b]).unwrap();
        assert_eq!(merged.group_members("A").unwrap(), vec!["x", "y"]);
        assert_eq!(merged.proxy_groups().len(), 1);
    }

    #[test]
    fn test_merge_unions_members() {
        let a = config("proxy-groups:\n  - name: B\n    proxies: [x, y]\n");
        let b = config("proxy-groups:\n  - name: B\n    proxies: [y, z]\n");
        let merged = merge_clash_configs(vec![a, b]).unwrap();
        assert_eq!(merged.group_members("B").unwrap(), vec!["x", "y", "z"]);
    }

    #[test]
    fn test_merge_group_order_and_first_fields() {
        let a = config("proxy-groups:\n  - name: G1\n    type: select\n    proxies: [a]\n  - name: G2\n    type: select\n    proxies: [b]\n");
        let b = config("proxy-groups:\n  - name: G3\n    type: select\n    proxies: [c]\n  - name: G1\n    type: url-test\n    url: http://x\n    proxies: [d]\n");
        let merged = merge_clash_configs(vec![a, b]).unwrap();

        let names: Vec<&str> = merged
            .proxy_groups()
            .iter()
            .filter_map(|g| g.get("name").and_then(Value::as_str))
            .collect();
        assert_eq!(names, vec!["G1", "G2", "G3"]);

        let g1 = &merged.proxy_groups()[0];
        assert_eq!(g1.get("type").and_then(Value::as_str), Some("select"));
        assert!(g1.get("url").is_none());
        assert_eq!(merged.group_members("G1").unwrap(), vec!["a", "d"]);
    }

    #[test]
    fn test_merge_other_fields_from_first() {
        let a = config("port: 7890\nmode: rule\nproxies: []\nrules:\n  - MATCH,G\n");
        let b = config("port: 1080\nallow-lan: true\nrules:\n  - MATCH,DIRECT\n");
        let merged = merge_clash_configs(vec![a, b]).unwrap();
        let root = merged.as_mapping();

        assert_eq!(root.get("port").and_then(Value::as_u64), Some(7890));
        assert!(root.get("allow-lan").is_none());
        let keys: Vec<&str> = root.keys().filter_map(Value::as_str).collect();
        assert_eq!(keys, vec!["port", "mode", "proxies", "rules", "proxy-groups"]);
    }

    #[test]
    fn test_merge_group_without_proxies_key() {
        let a = config("proxy-groups:\n  - name: P\n    use: [provider]\n");
        let b = config("proxy-groups:\n  - name: P\n    proxies: [x]\n");
        let merged = merge_clash_configs(vec![a, b]).unwrap();
        assert_eq!(merged.group_members("P").unwrap(), vec!["x"]);
    }

    #[test]
    fn test_merge_is_deterministic() {
        let inputs = || {
            vec![
                config("proxy-groups:\n  - name: A\n    proxies: [x, y]\n  - name: B\n    proxies: [q]\n"),
                config("proxy-groups:\n  - name: B\n    proxies: [r]\n  - name: C\n    proxies: [s]\n"),
            ]
        };
        let first = merge_clash_configs(inputs()).unwrap().to_yaml().unwrap();
        let second = merge_clash_configs(inputs()).unwrap().to_yaml().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_merge_group_without_name_fails() {
        let a = config("proxy-groups:\n  - name: A\n    proxies: [x]\n");
        let b = config("proxy-groups:\n  - type: select\n    proxies: [x]\n");
        let err = merge_clash_configs(vec![a, b]).unwrap_err();
        assert!(err.is_merge());
        assert!(matches!(err, Error::Merge { config: 1, .. }));
    }

    #[test]
    fn test_merge_non_string_member_fails() {
        let a = config("proxy-groups:\n  - name: A\n    proxies: [x, {nested: true}]\n");
        let b = config("proxies: []\n");
        assert!(merge_clash_configs(vec![a, b]).unwrap_err().is_merge());
    }

    #[test]
    fn test_merge_proxies_not_list_fails() {
        let a = config("proxies: []\n");
        let b = config("proxies: oops\n");
        assert!(matches!(
            merge_clash_configs(vec![a, b]).unwrap_err(),
            Error::Merge { config: 1, .. }
        ));
    }
}
