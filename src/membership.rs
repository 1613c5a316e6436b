//! The membership table: `ListenAddress -> Identity`, including self.

use crate::identity::{Identity, ListenAddress};
use std::collections::HashMap;

/// Mutated only by the Election Engine: merged on ELECT receipt, refreshed
/// on re-HOWDY. Entries are never removed — a failed peer stays listed,
/// since failure is inferred at send-time, not recorded here.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MembershipTable {
    entries: HashMap<ListenAddress, Identity>,
}

impl MembershipTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(entries: HashMap<ListenAddress, Identity>) -> Self {
        Self { entries }
    }

    pub fn insert(&mut self, addr: ListenAddress, id: Identity) {
        self.entries.entry(addr).or_insert(id);
    }

    /// Merge `other` into `self`. Every address in `other` not already
    /// known is added; existing entries are never overwritten (first write
    /// wins — see DESIGN.md open-question resolution).
    pub fn merge(&mut self, other: &HashMap<ListenAddress, Identity>) {
        for (addr, id) in other {
            self.entries.entry(*addr).or_insert(*id);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn as_map(&self) -> &HashMap<ListenAddress, Identity> {
        &self.entries
    }

    pub fn identity_of(&self, addr: &ListenAddress) -> Option<Identity> {
        self.entries.get(addr).copied()
    }

    /// Every address whose identity is strictly greater than `self_id`.
    pub fn higher_peers(&self, self_addr: &ListenAddress, self_id: Identity) -> Vec<ListenAddress> {
        self.entries
            .iter()
            .filter(|(addr, id)| *addr != self_addr && **id > self_id)
            .map(|(addr, _)| *addr)
            .collect()
    }

    /// All known peers other than `self_addr`, for broadcast.
    pub fn all_peers_except_self(&self, self_addr: &ListenAddress) -> Vec<ListenAddress> {
        self.entries
            .keys()
            .filter(|addr| *addr != self_addr)
            .copied()
            .collect()
    }
}
