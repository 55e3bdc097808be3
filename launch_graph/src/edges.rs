// Copyright 2026 the Launch Graph Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Inline-buffered edge containers.
//!
//! Fan-out per state is small in practice, so neighbor sets keep up to eight
//! node indices inline and the per-node state association keeps up to four
//! `(state, set)` pairs inline. Sets store indices sorted for deterministic
//! iteration and binary-search membership.

use launch_ir::AsyncState;
use smallvec::SmallVec;

/// A small sorted set of node indices.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct NodeSet {
    items: SmallVec<[u32; 8]>,
}

impl NodeSet {
    /// Inserts `node`; returns `true` if it was not present.
    pub(crate) fn insert(&mut self, node: u32) -> bool {
        match self.items.binary_search(&node) {
            Ok(_) => false,
            Err(pos) => {
                self.items.insert(pos, node);
                true
            }
        }
    }

    /// Removes `node`; returns `true` if it was present.
    pub(crate) fn remove(&mut self, node: u32) -> bool {
        match self.items.binary_search(&node) {
            Ok(pos) => {
                self.items.remove(pos);
                true
            }
            Err(_) => false,
        }
    }

    pub(crate) fn contains(&self, node: u32) -> bool {
        self.items.binary_search(&node).is_ok()
    }

    pub(crate) fn len(&self) -> usize {
        self.items.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Ascending iteration.
    pub(crate) fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.items.iter().copied()
    }

    /// Rewrites every element through `f`, dropping `None` results and
    /// restoring sort order.
    pub(crate) fn remap(&mut self, f: impl Fn(u32) -> Option<u32>) {
        let mut next: SmallVec<[u32; 8]> = self.items.iter().copied().filter_map(&f).collect();
        next.sort_unstable();
        next.dedup();
        self.items = next;
    }
}

/// Ordered association from state to the neighbor set reached via it.
///
/// Entries keep insertion order; lookups are linear over the (small) entry
/// list.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct StateToNodesMap {
    entries: SmallVec<[(AsyncState, NodeSet); 4]>,
}

impl StateToNodesMap {
    /// Adds `node` under `state`; returns `true` if the edge was new.
    pub(crate) fn insert(&mut self, state: AsyncState, node: u32) -> bool {
        if let Some((_, set)) = self.entries.iter_mut().find(|(s, _)| *s == state) {
            return set.insert(node);
        }
        let mut set = NodeSet::default();
        set.insert(node);
        self.entries.push((state, set));
        true
    }

    /// Removes `node` under `state`; drops the entry if its set empties.
    /// Returns `true` if the edge existed.
    pub(crate) fn remove(&mut self, state: AsyncState, node: u32) -> bool {
        let Some(pos) = self.entries.iter().position(|(s, _)| *s == state) else {
            return false;
        };
        let removed = self.entries[pos].1.remove(node);
        if self.entries[pos].1.is_empty() {
            self.entries.remove(pos);
        }
        removed
    }

    /// Removes `node` from every state's set; returns how many edges went.
    pub(crate) fn remove_node(&mut self, node: u32) -> usize {
        let mut removed = 0;
        self.entries.retain(|(_, set)| {
            if set.remove(node) {
                removed += 1;
            }
            !set.is_empty()
        });
        removed
    }

    pub(crate) fn get(&self, state: AsyncState) -> Option<&NodeSet> {
        self.entries.iter().find(|(s, _)| *s == state).map(|(_, set)| set)
    }

    pub(crate) fn contains(&self, state: AsyncState, node: u32) -> bool {
        self.get(state).is_some_and(|set| set.contains(node))
    }

    /// Iterates `(state, set)` entries in insertion order.
    pub(crate) fn iter(&self) -> impl Iterator<Item = (AsyncState, &NodeSet)> + '_ {
        self.entries.iter().map(|(s, set)| (*s, set))
    }

    /// Unique neighbor indices across all states, ascending.
    pub(crate) fn neighbors(&self) -> NodeSet {
        let mut all = NodeSet::default();
        for (_, set) in &self.entries {
            for n in set.iter() {
                all.insert(n);
            }
        }
        all
    }

    /// Total edge count (state multiplicity included).
    pub(crate) fn edge_count(&self) -> usize {
        self.entries.iter().map(|(_, set)| set.len()).sum()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }

    /// Removes the whole entry for `state`, returning its set.
    pub(crate) fn take_state(&mut self, state: AsyncState) -> Option<NodeSet> {
        let pos = self.entries.iter().position(|(s, _)| *s == state)?;
        Some(self.entries.remove(pos).1)
    }

    /// Rewrites every stored node index through `f`, dropping `None`s.
    pub(crate) fn remap(&mut self, f: impl Fn(u32) -> Option<u32>) {
        for (_, set) in &mut self.entries {
            set.remap(&f);
        }
        self.entries.retain(|(_, set)| !set.is_empty());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use launch_ir::{AsyncState, SparseNodeId};

    fn st(n: u32) -> AsyncState {
        AsyncState::value(SparseNodeId::new(n))
    }

    #[test]
    fn node_set_stays_sorted_and_deduplicated() {
        let mut set = NodeSet::default();
        assert!(set.insert(5));
        assert!(set.insert(1));
        assert!(!set.insert(5));
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![1, 5]);
        assert!(set.remove(1));
        assert!(!set.remove(1));
        assert!(set.contains(5));
    }

    #[test]
    fn map_deduplicates_per_state_and_drops_empty_entries() {
        let mut map = StateToNodesMap::default();
        assert!(map.insert(st(0), 3));
        assert!(!map.insert(st(0), 3));
        assert!(map.insert(st(1), 3));
        assert_eq!(map.edge_count(), 2);

        assert!(map.remove(st(0), 3));
        assert!(map.get(st(0)).is_none());
        assert!(map.contains(st(1), 3));

        assert_eq!(map.remove_node(3), 1);
        assert!(map.is_empty());
    }

    #[test]
    fn remap_drops_and_renumbers() {
        let mut map = StateToNodesMap::default();
        map.insert(st(0), 2);
        map.insert(st(0), 4);
        map.insert(st(1), 4);

        // Delete node 2, shift 4 down to 3.
        map.remap(|n| match n {
            2 => None,
            4 => Some(3),
            other => Some(other),
        });
        assert_eq!(map.get(st(0)).unwrap().iter().collect::<Vec<_>>(), vec![3]);
        assert!(map.contains(st(1), 3));
    }
}
