// Copyright 2026 the Launch Graph Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Abstract state namespace and the sparse layout registry.

use std::fmt;
use std::sync::RwLock;

/// Identifier of a node in the sparse layout tree.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SparseNodeId(u32);

impl SparseNodeId {
    /// Creates an id from a raw index.
    #[must_use]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Returns the raw index.
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

/// The kind of mutable resource a state handle refers to.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StateKind {
    /// The stored data of a layout node.
    Value,
    /// The active-cell list of a layout node.
    List,
    /// The activation mask of a layout node.
    Mask,
}

impl StateKind {
    /// Short label used in diagnostics and DOT output.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Value => "value",
            Self::List => "list",
            Self::Mask => "mask",
        }
    }
}

/// An identity-compared handle for a mutable resource the scheduler reasons
/// about.
///
/// Two handles are equal iff both the target node and the kind tag are equal.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AsyncState {
    /// The layout node the state belongs to.
    pub node: SparseNodeId,
    /// Which of the node's resources this handle names.
    pub kind: StateKind,
}

impl AsyncState {
    /// The value state of `node`.
    #[must_use]
    pub const fn value(node: SparseNodeId) -> Self {
        Self {
            node,
            kind: StateKind::Value,
        }
    }

    /// The active-cell list state of `node`.
    #[must_use]
    pub const fn list(node: SparseNodeId) -> Self {
        Self {
            node,
            kind: StateKind::List,
        }
    }

    /// The activation mask state of `node`.
    #[must_use]
    pub const fn mask(node: SparseNodeId) -> Self {
        Self {
            node,
            kind: StateKind::Mask,
        }
    }
}

/// A sparse layout registry error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SpaceError {
    /// A node id did not name a registered node.
    UnknownNode {
        /// The invalid node id.
        node: SparseNodeId,
    },
}

impl fmt::Display for SpaceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownNode { node } => {
                write!(f, "unknown sparse layout node {}", node.as_u32())
            }
        }
    }
}

impl std::error::Error for SpaceError {}

#[derive(Debug)]
struct NodeInfo {
    name: Box<str>,
    parent: Option<SparseNodeId>,
    children: Vec<SparseNodeId>,
    host_visible: bool,
}

/// The sparse layout tree: a registry of named nodes whose value, list and
/// mask resources make up the abstract state namespace.
///
/// The registry is shared between the frontend, the bank and the scheduler,
/// and guards its own interior mutability. Nodes are `host_visible` by
/// default; a node whose data the host never reads back can be marked
/// invisible so stores to it with no in-pipeline reader become dead.
#[derive(Debug, Default)]
pub struct StateSpace {
    inner: RwLock<Vec<NodeInfo>>,
}

impl StateSpace {
    /// Creates an empty layout.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a root node.
    pub fn add_root(&self, name: impl Into<Box<str>>) -> SparseNodeId {
        let mut nodes = self.inner.write().expect("layout lock poisoned");
        let id = SparseNodeId::new(u32::try_from(nodes.len()).unwrap_or(u32::MAX));
        nodes.push(NodeInfo {
            name: name.into(),
            parent: None,
            children: Vec::new(),
            host_visible: true,
        });
        id
    }

    /// Registers a child of `parent`.
    pub fn add_child(
        &self,
        parent: SparseNodeId,
        name: impl Into<Box<str>>,
    ) -> Result<SparseNodeId, SpaceError> {
        let mut nodes = self.inner.write().expect("layout lock poisoned");
        if parent.as_u32() as usize >= nodes.len() {
            return Err(SpaceError::UnknownNode { node: parent });
        }
        let id = SparseNodeId::new(u32::try_from(nodes.len()).unwrap_or(u32::MAX));
        nodes.push(NodeInfo {
            name: name.into(),
            parent: Some(parent),
            children: Vec::new(),
            host_visible: true,
        });
        nodes[parent.as_u32() as usize].children.push(id);
        Ok(id)
    }

    /// Sets whether the host can observe `node`'s data after a pipeline
    /// window has executed.
    pub fn set_host_visible(
        &self,
        node: SparseNodeId,
        visible: bool,
    ) -> Result<(), SpaceError> {
        let mut nodes = self.inner.write().expect("layout lock poisoned");
        let info = nodes
            .get_mut(node.as_u32() as usize)
            .ok_or(SpaceError::UnknownNode { node })?;
        info.host_visible = visible;
        Ok(())
    }

    /// Returns whether `node`'s data is host-observable.
    ///
    /// Unknown nodes report `true`: observability must be over-approximated.
    #[must_use]
    pub fn is_host_visible(&self, node: SparseNodeId) -> bool {
        let nodes = self.inner.read().expect("layout lock poisoned");
        nodes
            .get(node.as_u32() as usize)
            .is_none_or(|info| info.host_visible)
    }

    /// Returns the node's registered name, or a placeholder for unknown ids.
    #[must_use]
    pub fn name(&self, node: SparseNodeId) -> Box<str> {
        let nodes = self.inner.read().expect("layout lock poisoned");
        nodes
            .get(node.as_u32() as usize)
            .map(|info| info.name.clone())
            .unwrap_or_else(|| format!("node{}", node.as_u32()).into_boxed_str())
    }

    /// Returns the node's parent, if any.
    #[must_use]
    pub fn parent(&self, node: SparseNodeId) -> Option<SparseNodeId> {
        let nodes = self.inner.read().expect("layout lock poisoned");
        nodes.get(node.as_u32() as usize).and_then(|info| info.parent)
    }

    /// Returns the node's direct children.
    #[must_use]
    pub fn children(&self, node: SparseNodeId) -> Vec<SparseNodeId> {
        let nodes = self.inner.read().expect("layout lock poisoned");
        nodes
            .get(node.as_u32() as usize)
            .map(|info| info.children.clone())
            .unwrap_or_default()
    }

    /// Returns `node` and every descendant, preorder.
    #[must_use]
    pub fn subtree(&self, node: SparseNodeId) -> Vec<SparseNodeId> {
        let nodes = self.inner.read().expect("layout lock poisoned");
        let mut out = Vec::new();
        let mut stack = vec![node];
        while let Some(n) = stack.pop() {
            out.push(n);
            if let Some(info) = nodes.get(n.as_u32() as usize) {
                stack.extend(info.children.iter().copied());
            }
        }
        out
    }

    /// Returns whether `ancestor` is `node` or a transitive parent of it.
    #[must_use]
    pub fn is_ancestor_or_self(&self, ancestor: SparseNodeId, node: SparseNodeId) -> bool {
        let nodes = self.inner.read().expect("layout lock poisoned");
        let mut cur = Some(node);
        while let Some(n) = cur {
            if n == ancestor {
                return true;
            }
            cur = nodes.get(n.as_u32() as usize).and_then(|info| info.parent);
        }
        false
    }

    /// Number of registered nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().expect("layout lock poisoned").len()
    }

    /// Returns `true` if no nodes are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
