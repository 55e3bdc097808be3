// Copyright 2026 the Launch Graph Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Dead-store elimination over the pending window.

use std::sync::Arc;

use hashbrown::HashSet;
use launch_ir::{AsyncState, StateKind};

use crate::graph::StateFlowGraph;

impl StateFlowGraph {
    /// Drops stores no one can observe and deletes nodes left without
    /// outputs.
    ///
    /// A store of state `s` by node `N` is dead when `N` has no flow reader
    /// of `s` and either a later pending launch overwrites `s` or `s` is
    /// not observable after the window (its resource is not host-visible,
    /// or it is a regenerable list). The sweep runs in reverse topological
    /// order so a chain of writers collapses in one call; deleting a node
    /// rewires its same-state predecessors to its successors so ordering
    /// survives. Returns whether anything changed.
    pub fn optimize_dead_store(&mut self) -> bool {
        let base = self.first_pending;
        let n = self.num_pending_tasks();
        let mut doomed = vec![false; n];
        let mut to_delete: HashSet<usize> = HashSet::new();
        let mut modified = false;

        for i in (0..n).rev() {
            let idx = base + i;
            let meta = Arc::clone(&self.nodes[idx].meta);
            if meta.output_states.is_empty() {
                continue;
            }

            let mut dead: Vec<AsyncState> = Vec::new();
            for &s in &meta.output_states {
                let mut live_reader = false;
                let mut later_writer = false;
                if let Some(succs) = self.nodes[idx].output_edges.get(s) {
                    for c in succs.iter() {
                        let c = c as usize;
                        if c >= base && doomed[c - base] {
                            continue;
                        }
                        let succ_meta = &self.nodes[c].meta;
                        if succ_meta.reads(s) {
                            live_reader = true;
                        } else if succ_meta.writes(s) {
                            later_writer = true;
                        }
                    }
                }
                if live_reader {
                    continue;
                }
                let observable = match s.kind {
                    StateKind::List => false,
                    StateKind::Value | StateKind::Mask => self.space.is_host_visible(s.node),
                };
                if later_writer || !observable {
                    dead.push(s);
                }
            }
            if dead.is_empty() {
                continue;
            }

            if dead.len() == meta.output_states.len() && !meta.has_side_effects {
                self.bridge_same_state_edges(idx, &meta.output_states);
                self.disconnect_all(u32::try_from(idx).unwrap_or(u32::MAX));
                doomed[i] = true;
                to_delete.insert(i);
                modified = true;
                continue;
            }

            let Some(rec) = self.nodes[idx].rec.as_ref() else {
                continue;
            };
            let Some(stripped) = self.bank.strip_stores(rec.body, &dead) else {
                continue;
            };
            self.bridge_same_state_edges(idx, &dead);
            let stripped_meta = self
                .bank
                .meta(stripped)
                .expect("stripped body was interned by the bank");
            let node = &mut self.nodes[idx];
            if let Some(rec) = node.rec.as_mut() {
                rec.body = stripped;
            }
            node.meta = stripped_meta;
            self.prune_edges_for(u32::try_from(idx).unwrap_or(u32::MAX));
            modified = true;
        }

        if !to_delete.is_empty() {
            self.delete_nodes(&to_delete);
        }
        if modified {
            self.rebuild_graph(true);
        }
        modified
    }

    /// For each state, connects the node's predecessors under that state
    /// directly to its successors under it, preserving hazard ordering once
    /// the node stops writing the state.
    fn bridge_same_state_edges(&mut self, idx: usize, states: &[AsyncState]) {
        for &s in states {
            let preds: Vec<u32> = self.nodes[idx]
                .input_edges
                .get(s)
                .map(|set| set.iter().collect())
                .unwrap_or_default();
            let succs: Vec<u32> = self.nodes[idx]
                .output_edges
                .get(s)
                .map(|set| set.iter().collect())
                .unwrap_or_default();
            for &p in &preds {
                for &c in &succs {
                    if p != c {
                        self.insert_edge(p, c, s);
                    }
                }
            }
        }
    }
}
