// Copyright 2026 the Launch Graph Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Elimination of redundant list-regeneration launches.

use std::sync::Arc;

use hashbrown::{HashMap, HashSet};
use launch_ir::{SparseNodeId, StateKind};

use crate::graph::StateFlowGraph;

impl StateFlowGraph {
    /// Deletes pending list-regeneration launches whose target list is
    /// still fresh from an earlier pending regeneration.
    ///
    /// "Intervening" writers are judged over the maintained topological
    /// list order, which over-approximates path-ordered writers and is
    /// therefore safe. Consumers of a deleted regeneration are redirected
    /// to the surviving one. Returns whether anything was deleted.
    pub fn optimize_listgen(&mut self) -> bool {
        let base = self.first_pending;
        let n = self.num_pending_tasks();
        let mut to_delete: HashSet<usize> = HashSet::new();
        let mut fresh: HashMap<SparseNodeId, u32> = HashMap::new();

        for i in 0..n {
            let idx = u32::try_from(base + i).unwrap_or(u32::MAX);
            let meta = Arc::clone(&self.nodes[base + i].meta);

            if let Some(target) = meta.listgen_target {
                if let Some(&survivor) = fresh.get(&target) {
                    self.replace_reference(idx, survivor, true);
                    to_delete.insert(i);
                    continue;
                }
                fresh.insert(target, idx);
            }

            for &s in &meta.output_states {
                if matches!(s.kind, StateKind::Value | StateKind::Mask) {
                    for node in self.space.subtree(s.node) {
                        fresh.remove(&node);
                    }
                }
            }
        }

        if to_delete.is_empty() {
            return false;
        }
        self.delete_nodes(&to_delete);
        self.rebuild_graph(true);
        true
    }
}
