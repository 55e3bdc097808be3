// Copyright 2026 the Launch Graph Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Task fusion: merging compatible pending launches into single launches to
//! eliminate per-launch overhead.

use std::sync::Arc;

use hashbrown::{HashMap, HashSet};
use launch_ir::{Backend, LaunchShape};

use crate::bitset::BitSet;
use crate::graph::StateFlowGraph;

type FuseKey = (LaunchShape, Backend, u32, bool);

impl StateFlowGraph {
    /// Attempts fusion among pending tasks `begin..end` and returns the
    /// pending indices of merged-away nodes.
    ///
    /// A node takes part in at most one fuse per call; the caller deletes
    /// the returned nodes and rebuilds before trying again.
    pub fn fuse_range(&mut self, begin: usize, end: usize) -> HashSet<usize> {
        let n = end - begin;
        let mut to_delete = HashSet::new();
        if n < 2 {
            return to_delete;
        }
        let (has_path_from, has_path_to) = self.compute_transitive_closure(begin, end);
        let base = self.first_pending + begin;
        let mut consumed = vec![false; n];

        // Pass over edge-connected pairs first: a writer and the next
        // writer/reader of its states are the common fusion profit case.
        for i in 0..n {
            if consumed[i] {
                continue;
            }
            let succs: Vec<usize> = self.nodes[base + i]
                .output_edges
                .neighbors()
                .iter()
                .filter_map(|s| {
                    let s = s as usize;
                    (s >= base && s < base + n).then(|| s - base)
                })
                .collect();
            for j in succs {
                if consumed[j] {
                    continue;
                }
                if !reachability_isolated(i, j, &has_path_from, &has_path_to) {
                    continue;
                }
                if self.try_fuse(base + i, base + j) {
                    to_delete.insert(begin + i);
                    consumed[i] = true;
                    consumed[j] = true;
                    break;
                }
            }
        }

        // Then pair up independent launches of the same shape: no path in
        // either direction means no intermediate can exist either.
        let mut groups: HashMap<FuseKey, Vec<usize>> = HashMap::new();
        for i in 0..n {
            if consumed[i] {
                continue;
            }
            let meta = &self.nodes[base + i].meta;
            if meta.listgen_target.is_some() {
                continue;
            }
            let key = (meta.shape, meta.backend, meta.block_dim, meta.element_wise);
            groups.entry(key).or_default().push(i);
        }
        for members in groups.values() {
            let mut k = 0;
            while k + 1 < members.len() {
                let (i, j) = (members[k], members[k + 1]);
                if consumed[i] || consumed[j] || has_path_to[i].get(j) {
                    k += 1;
                    continue;
                }
                if self.try_fuse(base + i, base + j) {
                    to_delete.insert(begin + i);
                    consumed[i] = true;
                    consumed[j] = true;
                    k += 2;
                } else {
                    k += 1;
                }
            }
        }

        to_delete
    }

    /// Runs fusion to fixpoint over the whole pending suffix, windowed to
    /// bound closure memory. Returns whether anything fused.
    pub fn fuse(&mut self) -> bool {
        let mut modified = false;
        loop {
            let n = self.num_pending_tasks();
            if n < 2 {
                break;
            }
            let window = self.config.fuse_window_size.max(2);
            let mut deleted = HashSet::new();
            let mut begin = 0;
            while begin < n {
                let end = n.min(begin + window);
                deleted = self.fuse_range(begin, end);
                if !deleted.is_empty() || end == n {
                    break;
                }
                begin += window / 2;
            }
            if deleted.is_empty() {
                break;
            }
            self.delete_nodes(&deleted);
            self.rebuild_graph(true);
            modified = true;
        }
        modified
    }

    /// Fuses node `a_idx` into `b_idx` if the bank accepts the pair.
    ///
    /// On success `b` carries the merged record and metadata and inherits
    /// `a`'s edges; `a` is left disconnected from `b` and ready to delete.
    fn try_fuse(&mut self, a_idx: usize, b_idx: usize) -> bool {
        let a_meta = Arc::clone(&self.nodes[a_idx].meta);
        let b_meta = Arc::clone(&self.nodes[b_idx].meta);
        if !self.bank.are_fusible(&a_meta, &b_meta) {
            return false;
        }
        let (Some(a_rec), Some(b_rec)) = (
            self.nodes[a_idx].rec.as_ref(),
            self.nodes[b_idx].rec.as_ref(),
        ) else {
            return false;
        };
        let (a_body, b_body) = (a_rec.body, b_rec.body);
        let Some(fused) = self.bank.fuse_bodies(a_body, b_body) else {
            return false;
        };
        let fused_meta = self
            .bank
            .meta(fused)
            .expect("fused body was interned by the bank");

        let b = &mut self.nodes[b_idx];
        if let Some(rec) = b.rec.as_mut() {
            rec.body = fused;
        }
        b.meta = fused_meta;

        let a = u32::try_from(a_idx).unwrap_or(u32::MAX);
        let b = u32::try_from(b_idx).unwrap_or(u32::MAX);
        self.disconnect_with(a, b);
        self.replace_reference(a, b, false);
        true
    }
}

/// Condition for fusing `i` into `j`: no third in-range node lies on a path
/// between them.
fn reachability_isolated(
    i: usize,
    j: usize,
    has_path_from: &[BitSet],
    has_path_to: &[BitSet],
) -> bool {
    let mut between = has_path_to[i].clone();
    between.intersect_with(&has_path_from[j]);
    between.clear(i);
    between.clear(j);
    between.is_empty()
}
