// Copyright 2026 the Launch Graph Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Graph nodes: one task launch each, plus the sentinel initial node.

use std::sync::Arc;

use launch_ir::{AsyncState, TaskLaunchRecord, TaskMeta};

use crate::edges::StateToNodesMap;

/// A single task launch in the graph.
///
/// Nodes live in the graph's master list and refer to each other by index;
/// indices are refreshed in bulk after structural mutations, so references
/// obtained from accessors are only valid until the next mutation.
#[derive(Clone, Debug)]
pub struct Node {
    pub(crate) rec: Option<TaskLaunchRecord>,
    pub(crate) meta: Arc<TaskMeta>,
    pub(crate) is_initial_node: bool,
    pub(crate) node_id: usize,
    pub(crate) pending_node_id: Option<usize>,
    pub(crate) input_edges: StateToNodesMap,
    pub(crate) output_edges: StateToNodesMap,
}

impl Node {
    pub(crate) fn initial(meta: Arc<TaskMeta>) -> Self {
        Self {
            rec: None,
            meta,
            is_initial_node: true,
            node_id: 0,
            pending_node_id: None,
            input_edges: StateToNodesMap::default(),
            output_edges: StateToNodesMap::default(),
        }
    }

    pub(crate) fn task(rec: TaskLaunchRecord, meta: Arc<TaskMeta>, pending_node_id: usize) -> Self {
        Self {
            rec: Some(rec),
            meta,
            is_initial_node: false,
            node_id: 0,
            pending_node_id: Some(pending_node_id),
            input_edges: StateToNodesMap::default(),
            output_edges: StateToNodesMap::default(),
        }
    }

    /// The launch record; `None` only on the initial node.
    #[must_use]
    pub fn record(&self) -> Option<&TaskLaunchRecord> {
        self.rec.as_ref()
    }

    /// The node's interned metadata.
    #[must_use]
    pub fn meta(&self) -> &Arc<TaskMeta> {
        &self.meta
    }

    /// Whether this is the sentinel owning every state's initial value.
    #[must_use]
    pub fn is_initial_node(&self) -> bool {
        self.is_initial_node
    }

    /// Position in the master node list.
    #[must_use]
    pub fn node_id(&self) -> usize {
        self.node_id
    }

    /// Position among pending tasks, or `None` once executed.
    #[must_use]
    pub fn pending_node_id(&self) -> Option<usize> {
        self.pending_node_id
    }

    /// Whether the node still awaits execution.
    #[must_use]
    pub fn pending(&self) -> bool {
        self.pending_node_id.is_some()
    }

    /// Whether the node was handed to the engine (the initial node counts
    /// as executed).
    #[must_use]
    pub fn executed(&self) -> bool {
        self.pending_node_id.is_none()
    }

    pub(crate) fn mark_executed(&mut self) {
        self.pending_node_id = None;
    }

    /// Classifies the edge from this node to `destination` under `state`.
    ///
    /// `true` means a flow edge: the destination reads the state this node
    /// produced (read-after-write). `false` means a plain dependency edge,
    /// ordering a write-after-write or write-after-read hazard.
    #[must_use]
    pub fn has_state_flow(&self, state: AsyncState, destination: &Node) -> bool {
        destination.meta.reads(state)
    }

    /// Human-readable description, e.g. for dumps and DOT labels.
    #[must_use]
    pub fn describe(&self) -> String {
        if self.is_initial_node {
            return "initial_state".to_string();
        }
        let launch = self.rec.as_ref().map_or(0, |r| r.launch_id);
        format!("{}#{launch}", self.meta.name)
    }
}
