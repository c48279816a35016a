//! Order-preserving union of proxy groups
//!
//! Groups are keyed by name. The first occurrence of a name fixes the group's
//! position and its non-membership fields; later occurrences can only add
//! members.

use std::collections::HashSet;

use indexmap::IndexMap;
use tracing::trace;

/// Whether two member lists hold the same members, ignoring order
pub fn is_same_members(existing: &[String], incoming: &[String]) -> bool {
    if existing.len() != incoming.len() {
        return false;
    }
    let seen: HashSet<&str> = existing.iter().map(String::as_str).collect();
    incoming.iter().all(|m| seen.contains(m.as_str()))
}

/// Appends, in incoming order, every member not already present
pub fn merge_members(existing: &mut Vec<String>, incoming: &[String]) {
    let mut seen: HashSet<String> = existing.iter().cloned().collect();
    for member in incoming {
        if seen.insert(member.clone()) {
            existing.push(member.clone());
        }
    }
}

/// A group as first seen, with its accumulated members
#[derive(Debug, Clone, PartialEq)]
pub struct MergedGroup<G> {
    pub group: G,
    pub members: Vec<String>,
}

/// Insertion-ordered map from group name to merged group
#[derive(Debug, Clone)]
pub struct GroupUnion<G> {
    groups: IndexMap<String, MergedGroup<G>>,
}

impl<G> Default for GroupUnion<G> {
    fn default() -> Self {
        Self {
            groups: IndexMap::new(),
        }
    }
}

impl<G> GroupUnion<G> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one occurrence of a group. Returns `true` if the name was new.
    pub fn add(&mut self, name: &str, group: G, members: Vec<String>) -> bool {
        match self.groups.get_mut(name) {
            None => {
                trace!("New group '{}' with {} members", name, members.len());
                self.groups
                    .insert(name.to_string(), MergedGroup { group, members });
                true
            }
            Some(existing) => {
                if !is_same_members(&existing.members, &members) {
                    let before = existing.members.len();
                    merge_members(&mut existing.members, &members);
                    trace!(
                        "Group '{}' gained {} members",
                        name,
                        existing.members.len() - before
                    );
                }
                false
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&MergedGroup<G>> {
        self.groups.get(name)
    }

    /// Removes a group, keeping the order of the others
    pub fn take(&mut self, name: &str) -> Option<MergedGroup<G>> {
        self.groups.shift_remove(name)
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Groups in first-seen order
    pub fn into_groups(self) -> impl Iterator<Item = (String, MergedGroup<G>)> {
        self.groups.into_iter()
    }
}
