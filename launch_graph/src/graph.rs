// Copyright 2026 the Launch Graph Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The state-flow graph: construction from a task stream, id maintenance,
//! topological order, transitive closure, rewiring and extraction.

use std::mem;
use std::sync::Arc;

use hashbrown::{HashMap, HashSet};
use launch_ir::{AsyncState, IrBank, SparseNodeId, StateKind, StateSpace, TaskLaunchRecord, TaskMeta};

use crate::bitset::BitSet;
use crate::edges::StateToNodesMap;
use crate::node::Node;

/// Tuning knobs for the graph.
#[derive(Copy, Clone, Debug)]
pub struct GraphConfig {
    /// Window width for fusion passes; bounds transitive-closure bitset
    /// memory to `O(window²)` bits.
    pub fuse_window_size: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            fuse_window_size: 512,
        }
    }
}

/// Dependency graph over submitted task launches.
///
/// Nodes live in a master list kept in topological order (every edge points
/// forward in the list); already-executed launches form the list prefix and
/// pending ones the suffix. One logical owner mutates the graph; no
/// operation suspends.
#[derive(Debug)]
pub struct StateFlowGraph {
    pub(crate) bank: Arc<IrBank>,
    pub(crate) space: Arc<StateSpace>,
    pub(crate) config: GraphConfig,
    pub(crate) nodes: Vec<Node>,
    pub(crate) first_pending: usize,
    initial_meta: Arc<TaskMeta>,
    latest_state_owner: HashMap<AsyncState, u32>,
    latest_state_readers: StateToNodesMap,
    task_launch_counts: HashMap<Box<str>, u32>,
    list_up_to_date: HashMap<SparseNodeId, bool>,
}

impl StateFlowGraph {
    /// Creates a graph holding only the initial node.
    #[must_use]
    pub fn new(bank: Arc<IrBank>, space: Arc<StateSpace>) -> Self {
        Self::with_config(bank, space, GraphConfig::default())
    }

    /// Creates a graph with explicit tuning.
    #[must_use]
    pub fn with_config(bank: Arc<IrBank>, space: Arc<StateSpace>, config: GraphConfig) -> Self {
        let initial_meta = Arc::new(TaskMeta::initial());
        Self {
            bank,
            space,
            config,
            nodes: vec![Node::initial(Arc::clone(&initial_meta))],
            first_pending: 1,
            initial_meta,
            latest_state_owner: HashMap::new(),
            latest_state_readers: StateToNodesMap::default(),
            task_launch_counts: HashMap::new(),
            list_up_to_date: HashMap::new(),
        }
    }

    /// The bank this graph resolves bodies and metadata through.
    #[must_use]
    pub fn bank(&self) -> &Arc<IrBank> {
        &self.bank
    }

    /// The sparse layout registry.
    #[must_use]
    pub fn space(&self) -> &Arc<StateSpace> {
        &self.space
    }

    /// Total node count, initial node included.
    #[must_use]
    pub fn size(&self) -> usize {
        self.nodes.len()
    }

    /// Number of tasks not yet handed to the engine.
    #[must_use]
    pub fn num_pending_tasks(&self) -> usize {
        self.nodes.len() - self.first_pending
    }

    /// Borrows the node at `node_id`.
    ///
    /// The reference is valid only until the next structural mutation.
    #[must_use]
    pub fn node(&self, node_id: usize) -> &Node {
        &self.nodes[node_id]
    }

    /// Borrows every pending node, in order.
    #[must_use]
    pub fn get_pending_tasks(&self) -> Vec<&Node> {
        self.nodes[self.first_pending..].iter().collect()
    }

    /// Borrows pending nodes `begin..end`.
    #[must_use]
    pub fn get_pending_tasks_range(&self, begin: usize, end: usize) -> Vec<&Node> {
        self.nodes[self.first_pending + begin..self.first_pending + end]
            .iter()
            .collect()
    }

    /// Resets the graph to a fresh initial node, dropping all history.
    pub fn clear(&mut self) {
        let initial_meta = Arc::new(TaskMeta::initial());
        self.initial_meta = Arc::clone(&initial_meta);
        self.nodes.clear();
        self.nodes.push(Node::initial(initial_meta));
        self.first_pending = 1;
        self.latest_state_owner.clear();
        self.latest_state_readers.clear();
        self.task_launch_counts.clear();
        self.list_up_to_date.clear();
    }

    /// Ingests `records` in submission order.
    ///
    /// With `filter_listgen`, a list-regeneration launch whose target list
    /// is already fresh is dropped without creating a node.
    pub fn insert_tasks(&mut self, records: &[TaskLaunchRecord], filter_listgen: bool) {
        self.insert_records(records, true, filter_listgen);
    }

    /// Ingests a single record without listgen filtering.
    pub fn insert_node(&mut self, record: TaskLaunchRecord) {
        self.insert_records(core::slice::from_ref(&record), true, false);
    }

    pub(crate) fn insert_records(
        &mut self,
        records: &[TaskLaunchRecord],
        assign_ids: bool,
        filter_listgen: bool,
    ) {
        for rec in records {
            let meta = self
                .bank
                .meta(rec.body)
                .unwrap_or_else(|| panic!("launch record references unknown body {}", rec.body));

            if let Some(target) = meta.listgen_target
                && filter_listgen
                && self.list_up_to_date.get(&target).copied().unwrap_or(false)
            {
                continue;
            }

            let mut rec = rec.clone();
            if assign_ids {
                let counter = self.task_launch_counts.entry(meta.name.clone()).or_insert(0);
                rec.launch_id = *counter;
                *counter += 1;
            }

            let idx = u32::try_from(self.nodes.len()).unwrap_or(u32::MAX);
            let pending_id = self.num_pending_tasks();
            let mut node = Node::task(rec, Arc::clone(&meta), pending_id);
            node.node_id = idx as usize;
            self.nodes.push(node);

            for &s in &meta.input_states {
                let owner = self.owner_or_initial(s);
                self.insert_edge(owner, idx, s);
                self.latest_state_readers.insert(s, idx);
            }
            for &s in &meta.output_states {
                if let Some(readers) = self.latest_state_readers.take_state(s) {
                    for r in readers.iter() {
                        if r != idx {
                            self.insert_edge(r, idx, s);
                        }
                    }
                }
                let owner = self.owner_or_initial(s);
                if owner != idx {
                    self.insert_edge(owner, idx, s);
                }
                self.latest_state_owner.insert(s, idx);
            }

            if let Some(target) = meta.listgen_target {
                self.list_up_to_date.insert(target, true);
            }
            for &s in &meta.output_states {
                match s.kind {
                    StateKind::Value | StateKind::Mask => self.mark_list_as_dirty(s.node),
                    StateKind::List => {}
                }
            }
        }
    }

    fn owner_or_initial(&mut self, s: AsyncState) -> u32 {
        if let Some(&owner) = self.latest_state_owner.get(&s) {
            return owner;
        }
        // The initial node owns the first value of every state it is asked
        // about.
        let meta = Arc::make_mut(&mut self.initial_meta);
        meta.add_output(s);
        self.nodes[0].meta = Arc::clone(&self.initial_meta);
        self.latest_state_owner.insert(s, 0);
        0
    }

    /// Adds the edge `from —(state)→ to`. Idempotent per tuple.
    pub(crate) fn insert_edge(&mut self, from: u32, to: u32, state: AsyncState) {
        debug_assert_ne!(from, to, "self edges are never valid");
        self.nodes[from as usize].output_edges.insert(state, to);
        self.nodes[to as usize].input_edges.insert(state, from);
    }

    /// Recursively marks the list states of `node` and all its descendants
    /// stale.
    pub fn mark_list_as_dirty(&mut self, node: SparseNodeId) {
        for n in self.space.subtree(node) {
            self.list_up_to_date.insert(n, false);
        }
    }

    /// Refreshes `node_id` on every node after a structural mutation.
    pub(crate) fn reid_nodes(&mut self) {
        for (i, node) in self.nodes.iter_mut().enumerate() {
            node.node_id = i;
        }
    }

    /// Refreshes `pending_node_id` on the pending suffix.
    pub(crate) fn reid_pending_nodes(&mut self) {
        for (i, node) in self.nodes[self.first_pending..].iter_mut().enumerate() {
            node.pending_node_id = Some(i);
        }
    }

    // ---- edge rewiring -------------------------------------------------

    /// Removes every edge incident to `idx` from both sides.
    pub(crate) fn disconnect_all(&mut self, idx: u32) {
        let input = mem::take(&mut self.nodes[idx as usize].input_edges);
        for (s, set) in input.iter() {
            for p in set.iter() {
                self.nodes[p as usize].output_edges.remove(s, idx);
            }
        }
        let output = mem::take(&mut self.nodes[idx as usize].output_edges);
        for (s, set) in output.iter() {
            for c in set.iter() {
                self.nodes[c as usize].input_edges.remove(s, idx);
            }
        }
    }

    /// Removes the symmetric edges between `a` and `b` on every state.
    pub(crate) fn disconnect_with(&mut self, a: u32, b: u32) {
        let forward: Vec<AsyncState> = self.nodes[a as usize]
            .output_edges
            .iter()
            .filter(|(_, set)| set.contains(b))
            .map(|(s, _)| s)
            .collect();
        for s in forward {
            self.nodes[a as usize].output_edges.remove(s, b);
            self.nodes[b as usize].input_edges.remove(s, a);
        }
        let backward: Vec<AsyncState> = self.nodes[b as usize]
            .output_edges
            .iter()
            .filter(|(_, set)| set.contains(a))
            .map(|(s, _)| s)
            .collect();
        for s in backward {
            self.nodes[b as usize].output_edges.remove(s, a);
            self.nodes[a as usize].input_edges.remove(s, b);
        }
    }

    /// Rewires references to `a` so they reference `b` instead.
    ///
    /// Outbound edges of `a` always move to `b`; inbound edges move too
    /// unless `only_output_edges`. Edges that would become self edges on
    /// `b` are dropped.
    pub(crate) fn replace_reference(&mut self, a: u32, b: u32, only_output_edges: bool) {
        let output = mem::take(&mut self.nodes[a as usize].output_edges);
        for (s, set) in output.iter() {
            for c in set.iter() {
                self.nodes[c as usize].input_edges.remove(s, a);
                if c != b {
                    self.nodes[c as usize].input_edges.insert(s, b);
                    self.nodes[b as usize].output_edges.insert(s, c);
                }
            }
        }
        if !only_output_edges {
            let input = mem::take(&mut self.nodes[a as usize].input_edges);
            for (s, set) in input.iter() {
                for p in set.iter() {
                    self.nodes[p as usize].output_edges.remove(s, a);
                    if p != b {
                        self.nodes[p as usize].output_edges.insert(s, b);
                        self.nodes[b as usize].input_edges.insert(s, p);
                    }
                }
            }
        }
    }

    /// Strips edges of `idx` that its (changed) metadata no longer
    /// justifies, on both sides.
    pub(crate) fn prune_edges_for(&mut self, idx: u32) {
        let meta = Arc::clone(&self.nodes[idx as usize].meta);
        let stale_in: Vec<(AsyncState, Vec<u32>)> = self.nodes[idx as usize]
            .input_edges
            .iter()
            .filter(|(s, _)| !meta.reads(*s) && !meta.writes(*s))
            .map(|(s, set)| (s, set.iter().collect()))
            .collect();
        for (s, preds) in stale_in {
            for p in preds {
                self.nodes[p as usize].output_edges.remove(s, idx);
                self.nodes[idx as usize].input_edges.remove(s, p);
            }
        }
        let stale_out: Vec<(AsyncState, Vec<u32>)> = self.nodes[idx as usize]
            .output_edges
            .iter()
            .filter(|(s, _)| !meta.writes(*s))
            .map(|(s, set)| (s, set.iter().collect()))
            .collect();
        for (s, succs) in stale_out {
            for c in succs {
                self.nodes[c as usize].input_edges.remove(s, idx);
                self.nodes[idx as usize].output_edges.remove(s, c);
            }
        }
    }

    /// Deletes the pending nodes named by pending index, in one pass:
    /// disconnect, compact the master list, refresh ids.
    pub(crate) fn delete_nodes(&mut self, pending_indices: &HashSet<usize>) {
        if pending_indices.is_empty() {
            return;
        }
        let mut doomed = vec![false; self.nodes.len()];
        for &p in pending_indices {
            let idx = self.first_pending + p;
            debug_assert!(self.nodes[idx].pending(), "only pending nodes are deletable");
            debug_assert!(!self.nodes[idx].is_initial_node);
            doomed[idx] = true;
        }
        for (idx, &dead) in doomed.iter().enumerate() {
            if dead {
                self.disconnect_all(u32::try_from(idx).unwrap_or(u32::MAX));
            }
        }

        let mut old_to_new: Vec<Option<u32>> = Vec::with_capacity(self.nodes.len());
        let mut next = 0_u32;
        for &dead in &doomed {
            if dead {
                old_to_new.push(None);
            } else {
                old_to_new.push(Some(next));
                next += 1;
            }
        }

        let mut keep = doomed.iter().map(|&d| !d);
        self.nodes.retain(|_| keep.next().unwrap_or(true));
        for node in &mut self.nodes {
            node.input_edges.remap(|i| old_to_new[i as usize]);
            node.output_edges.remap(|i| old_to_new[i as usize]);
        }
        self.latest_state_owner
            .retain(|_, owner| old_to_new[*owner as usize].is_some());
        for owner in self.latest_state_owner.values_mut() {
            if let Some(new) = old_to_new[*owner as usize] {
                *owner = new;
            }
        }
        self.latest_state_readers.remap(|i| old_to_new[i as usize]);
        self.reid_nodes();
        self.reid_pending_nodes();
    }

    // ---- order maintenance ---------------------------------------------

    /// Sorts the pending suffix topologically (Kahn), breaking ties by
    /// ascending prior `pending_node_id`, then refreshes ids.
    pub fn topo_sort_nodes(&mut self) {
        let n = self.num_pending_tasks();
        if n > 1 {
            let base = self.first_pending;
            let mut in_degree = vec![0_usize; n];
            for (i, slot) in in_degree.iter_mut().enumerate() {
                *slot = self.nodes[base + i]
                    .input_edges
                    .neighbors()
                    .iter()
                    .filter(|&p| p as usize >= base)
                    .count();
            }

            let mut ready: std::collections::BinaryHeap<core::cmp::Reverse<usize>> = in_degree
                .iter()
                .enumerate()
                .filter(|&(_, &d)| d == 0)
                .map(|(i, _)| core::cmp::Reverse(i))
                .collect();
            let mut order: Vec<usize> = Vec::with_capacity(n);
            while let Some(core::cmp::Reverse(i)) = ready.pop() {
                order.push(i);
                for succ in self.nodes[base + i].output_edges.neighbors().iter() {
                    let succ = succ as usize;
                    if succ >= base {
                        let j = succ - base;
                        in_degree[j] -= 1;
                        if in_degree[j] == 0 {
                            ready.push(core::cmp::Reverse(j));
                        }
                    }
                }
            }
            assert_eq!(order.len(), n, "state flow graph contains a cycle");

            let mut old_to_new: Vec<u32> = (0..u32::try_from(self.nodes.len()).unwrap_or(u32::MAX))
                .collect();
            for (new_pos, &old_pos) in order.iter().enumerate() {
                old_to_new[base + old_pos] = u32::try_from(base + new_pos).unwrap_or(u32::MAX);
            }
            self.permute_nodes(&old_to_new);
        }
        self.reid_nodes();
        self.reid_pending_nodes();
    }

    fn permute_nodes(&mut self, old_to_new: &[u32]) {
        let mut slots: Vec<Option<Node>> = self.nodes.iter().map(|_| None).collect();
        for (old, node) in self.nodes.drain(..).enumerate() {
            slots[old_to_new[old] as usize] = Some(node);
        }
        self.nodes = slots
            .into_iter()
            .map(|n| n.expect("node permutation must be total"))
            .collect();
        for node in &mut self.nodes {
            node.input_edges.remap(|i| Some(old_to_new[i as usize]));
            node.output_edges.remap(|i| Some(old_to_new[i as usize]));
        }
        for owner in self.latest_state_owner.values_mut() {
            *owner = old_to_new[*owner as usize];
        }
        self.latest_state_readers
            .remap(|i| Some(old_to_new[i as usize]));
    }

    /// Replays the pending records through the builder, re-deriving the
    /// canonical edge structure (sorted first when `sort`).
    ///
    /// Already-executed history is dropped; states those launches owned
    /// fall back to the initial node, which is equivalent for everything
    /// still pending.
    pub fn rebuild_graph(&mut self, sort: bool) {
        if sort {
            self.topo_sort_nodes();
        }
        let records: Vec<TaskLaunchRecord> = self.nodes[self.first_pending..]
            .iter()
            .filter_map(|n| n.rec.clone())
            .collect();
        let counts = mem::take(&mut self.task_launch_counts);
        self.clear();
        self.task_launch_counts = counts;
        self.insert_records(&records, false, false);
    }

    // ---- transitive closure --------------------------------------------

    /// Computes reachability bitsets over pending tasks `begin..end`.
    ///
    /// `has_path_from[i]` holds every in-range predecessor with a path to
    /// node `i` (and `i` itself); `has_path_to[i]` the successors reachable
    /// from it (and itself). The pending suffix must be topologically
    /// ordered, which the graph maintains after every mutation.
    #[must_use]
    pub fn compute_transitive_closure(
        &self,
        begin: usize,
        end: usize,
    ) -> (Vec<BitSet>, Vec<BitSet>) {
        assert!(begin <= end && end <= self.num_pending_tasks());
        let n = end - begin;
        let base = self.first_pending + begin;
        let mut has_path_from: Vec<BitSet> = (0..n).map(|_| BitSet::new_empty(n)).collect();
        let mut has_path_to: Vec<BitSet> = (0..n).map(|_| BitSet::new_empty(n)).collect();

        for i in 0..n {
            has_path_from[i].set(i);
            for pred in self.nodes[base + i].input_edges.neighbors().iter() {
                let pred = pred as usize;
                if pred >= base && pred < base + n {
                    let local = pred - base;
                    debug_assert!(local < i, "pending suffix must be topologically ordered");
                    let (earlier, rest) = has_path_from.split_at_mut(i);
                    rest[0].union_with(&earlier[local]);
                }
            }
        }
        for i in (0..n).rev() {
            has_path_to[i].set(i);
            for succ in self.nodes[base + i].output_edges.neighbors().iter() {
                let succ = succ as usize;
                if succ >= base && succ < base + n {
                    let local = succ - base;
                    debug_assert!(local > i, "pending suffix must be topologically ordered");
                    let (earlier, later) = has_path_to.split_at_mut(i + 1);
                    earlier[i].union_with(&later[local - i - 1]);
                }
            }
        }
        (has_path_from, has_path_to)
    }

    // ---- extraction ----------------------------------------------------

    /// Marks every pending task executed; they stop being optimization
    /// candidates but stay in the graph as dependency history.
    pub fn mark_pending_tasks_as_executed(&mut self) {
        for node in &mut self.nodes[self.first_pending..] {
            node.mark_executed();
        }
        self.first_pending = self.nodes.len();
    }

    /// Sorts, collects the pending launch records in emission order, and
    /// marks them executed.
    pub fn extract_to_execute(&mut self) -> Vec<TaskLaunchRecord> {
        self.topo_sort_nodes();
        let records: Vec<TaskLaunchRecord> = self.nodes[self.first_pending..]
            .iter()
            .filter_map(|n| n.rec.clone())
            .collect();
        self.mark_pending_tasks_as_executed();
        records
    }

    /// Moves the pending nodes out of the graph.
    ///
    /// The extracted nodes come back disconnected; bookkeeping referring to
    /// them falls back to the initial node.
    pub fn extract_pending_tasks(&mut self) -> Vec<Node> {
        let base = self.first_pending;
        for idx in base..self.nodes.len() {
            self.disconnect_all(u32::try_from(idx).unwrap_or(u32::MAX));
        }
        let extracted = self.nodes.split_off(base);
        self.latest_state_owner
            .retain(|_, owner| (*owner as usize) < base);
        self.latest_state_readers
            .remap(|i| ((i as usize) < base).then_some(i));
        self.reid_nodes();
        self.reid_pending_nodes();
        extracted
    }

    // ---- verification --------------------------------------------------

    /// Asserts every structural invariant; with `also_verify_ir`, also that
    /// each node's record and metadata still resolve through the bank.
    ///
    /// Violations are programming errors and panic with a diagnostic.
    pub fn verify(&self, also_verify_ir: bool) {
        assert!(!self.nodes.is_empty(), "graph lost its initial node");
        assert!(
            self.nodes[0].is_initial_node && self.nodes[0].executed(),
            "node 0 must be the executed initial node"
        );
        let initials = self.nodes.iter().filter(|n| n.is_initial_node).count();
        assert_eq!(initials, 1, "exactly one initial node expected, found {initials}");

        for (i, node) in self.nodes.iter().enumerate() {
            assert_eq!(node.node_id, i, "node_id {} stale at index {i}", node.node_id);
            if i < self.first_pending {
                assert!(
                    node.executed(),
                    "node {i} sits in the executed prefix but is pending"
                );
            } else {
                assert_eq!(
                    node.pending_node_id,
                    Some(i - self.first_pending),
                    "pending_node_id stale at index {i}"
                );
            }
        }

        for (i, node) in self.nodes.iter().enumerate() {
            for (s, set) in node.output_edges.iter() {
                assert!(
                    node.meta.writes(s),
                    "edge out of node {i} under a state it does not write"
                );
                for to in set.iter() {
                    let to_us = to as usize;
                    assert!(to_us < self.nodes.len(), "edge endpoint {to} out of range");
                    assert!(i < to_us, "edge {i}→{to} points backward in the node list");
                    let dest = &self.nodes[to_us];
                    assert!(
                        dest.meta.reads(s) || dest.meta.writes(s),
                        "edge {i}→{to} under a state node {to} neither reads nor writes"
                    );
                    assert!(
                        dest.input_edges.contains(s, u32::try_from(i).unwrap_or(u32::MAX)),
                        "edge {i}→{to} missing its inbound mirror"
                    );
                }
            }
            for (s, set) in node.input_edges.iter() {
                for from in set.iter() {
                    assert!(
                        self.nodes[from as usize]
                            .output_edges
                            .contains(s, u32::try_from(i).unwrap_or(u32::MAX)),
                        "edge {from}→{i} missing its outbound mirror"
                    );
                }
            }
        }

        for (&s, &owner) in &self.latest_state_owner {
            assert!(
                (owner as usize) < self.nodes.len(),
                "state owner {owner} out of range"
            );
            assert!(
                self.nodes[owner as usize].meta.writes(s),
                "latest owner of {s:?} does not write it"
            );
        }
        for (s, readers) in self.latest_state_readers.iter() {
            let owner = self.latest_state_owner.get(&s).copied();
            for r in readers.iter() {
                assert!(
                    self.nodes[r as usize].meta.reads(s),
                    "recorded reader {r} does not read {s:?}"
                );
                if let Some(owner) = owner {
                    assert_ne!(owner, r, "a node cannot read its own latest write");
                    assert!(
                        self.nodes[owner as usize].output_edges.contains(s, r),
                        "missing flow edge {owner}→{r} for {s:?}"
                    );
                }
            }
        }

        if also_verify_ir {
            for (i, node) in self.nodes.iter().enumerate() {
                let Some(rec) = node.rec.as_ref() else {
                    continue;
                };
                let meta = self
                    .bank
                    .meta(rec.body)
                    .unwrap_or_else(|| panic!("node {i} references unknown body {}", rec.body));
                assert!(
                    Arc::ptr_eq(&meta, &node.meta),
                    "node {i} metadata diverged from the bank"
                );
            }
        }
    }
}
