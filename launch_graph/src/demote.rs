// Copyright 2026 the Launch Graph Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Activation demotion: rewriting repeat launches of an activating task
//! into plain writes once activation is provably redundant.

use std::sync::Arc;

use hashbrown::HashMap;
use launch_ir::{BodyFingerprint, TaskMeta};

use crate::graph::StateFlowGraph;

impl StateFlowGraph {
    /// Demotes pending activating launches whose cells were already
    /// activated by an earlier launch of the same body.
    ///
    /// A launch demotes when the earlier launch is its ancestor in the
    /// pending subgraph (so it always executes first) and no pending mask
    /// clear of the region — or of a region ancestor — can run between
    /// them. Returns whether anything was rewritten.
    pub fn demote_activation(&mut self) -> bool {
        let base = self.first_pending;
        let n = self.num_pending_tasks();
        if n < 2 {
            return false;
        }
        let (has_path_from, _) = self.compute_transitive_closure(0, n);

        let originals: Vec<(Option<BodyFingerprint>, Arc<TaskMeta>)> = self.nodes[base..]
            .iter()
            .map(|node| (node.rec.as_ref().map(|r| r.body), Arc::clone(&node.meta)))
            .collect();

        let deactivators: Vec<usize> = originals
            .iter()
            .enumerate()
            .filter(|(_, (_, meta))| !meta.deactivates.is_empty())
            .map(|(i, _)| i)
            .collect();

        let mut first_launch: HashMap<BodyFingerprint, usize> = HashMap::new();
        let mut modified = false;

        for i in 0..n {
            let (Some(fp), meta) = (&originals[i].0, &originals[i].1) else {
                continue;
            };
            let Some(region) = meta.activates else {
                continue;
            };
            if !meta.element_wise {
                continue;
            }
            let Some(&prev) = first_launch.get(fp) else {
                first_launch.insert(*fp, i);
                continue;
            };
            if !has_path_from[i].get(prev) {
                continue;
            }

            // A mask clear that is not provably ordered before the
            // activating launch or after this one could run in between.
            let blocked = deactivators.iter().any(|&k| {
                if k == prev || k == i {
                    return false;
                }
                let clears_region = originals[k]
                    .1
                    .deactivates
                    .iter()
                    .any(|&d| self.space.is_ancestor_or_self(d, region));
                if !clears_region {
                    return false;
                }
                let before_prev = has_path_from[prev].get(k);
                let after_this = has_path_from[k].get(i);
                !(before_prev || after_this)
            });
            if blocked {
                continue;
            }

            let Some(demoted) = self.bank.rewrite_for_demotion(*fp, region) else {
                continue;
            };
            let demoted_meta = self
                .bank
                .meta(demoted)
                .expect("demoted body was interned by the bank");
            let node = &mut self.nodes[base + i];
            if let Some(rec) = node.rec.as_mut() {
                rec.body = demoted;
            }
            node.meta = demoted_meta;
            self.prune_edges_for(u32::try_from(base + i).unwrap_or(u32::MAX));
            modified = true;
        }

        if modified {
            self.rebuild_graph(true);
        }
        modified
    }
}

#[cfg(test)]
mod tests {
    use crate::testutil::{Ctx, pending_names};
    use launch_ir::AsyncState;

    #[test]
    fn repeat_activating_launches_demote_to_plain_writes() {
        let ctx = Ctx::new();
        let grid = ctx.space.add_root("grid");
        let mut g = ctx.graph();

        let fill = ctx.activating_fill("fill", grid);
        g.insert_tasks(&[fill.clone(), fill.clone(), fill.clone()], false);
        assert!(g.demote_activation());
        g.verify(true);

        let activators: Vec<bool> = g
            .get_pending_tasks()
            .iter()
            .map(|n| n.meta().activates.is_some())
            .collect();
        assert_eq!(activators, vec![true, false, false]);

        // The demoted launches no longer write the mask.
        let mask = AsyncState::mask(grid);
        assert!(g.get_pending_tasks()[0].meta().writes(mask));
        assert!(!g.get_pending_tasks()[1].meta().writes(mask));

        assert!(!g.demote_activation());
    }

    #[test]
    fn a_mask_clear_between_launches_blocks_demotion() {
        let ctx = Ctx::new();
        let grid = ctx.space.add_root("grid");
        let mut g = ctx.graph();

        let fill = ctx.activating_fill("fill", grid);
        g.insert_tasks(
            &[fill.clone(), ctx.deactivator("gc", grid), fill.clone()],
            false,
        );
        assert!(!g.demote_activation());
        assert_eq!(pending_names(&g), vec!["fill", "gc", "fill"]);
    }

    #[test]
    fn clearing_an_ancestor_region_also_blocks_demotion() {
        let ctx = Ctx::new();
        let grid = ctx.space.add_root("grid");
        let cell = ctx.space.add_child(grid, "cell").unwrap();
        let mut g = ctx.graph();

        let fill = ctx.activating_fill("fill", cell);
        g.insert_tasks(
            &[fill.clone(), ctx.deactivator("gc_root", grid), fill.clone()],
            false,
        );
        assert!(!g.demote_activation());
    }

    #[test]
    fn unrelated_launches_do_not_demote_each_other() {
        let ctx = Ctx::new();
        let a = ctx.space.add_root("a");
        let b = ctx.space.add_root("b");
        let mut g = ctx.graph();

        g.insert_tasks(
            &[ctx.activating_fill("fill_a", a), ctx.activating_fill("fill_b", b)],
            false,
        );
        assert!(!g.demote_activation());
    }
}
