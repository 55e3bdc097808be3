// Copyright 2026 the Launch Graph Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Task metadata: the declared reads, writes and optimization hints of a
//! body, derived by a single forward scan over its statements.

use crate::body::{Backend, BodyFingerprint, BodyStmt, LaunchShape, TaskBody};
use crate::state::{AsyncState, SparseNodeId};

/// A launch submitted to the pipeline.
///
/// Opaque to the scheduler except for the body fingerprint (and the metadata
/// reachable through it). `launch_id` numbers the i-th launch of the task
/// name and is assigned at submission.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TaskLaunchRecord {
    /// Content hash of the interned body.
    pub body: BodyFingerprint,
    /// Per-name launch counter value.
    pub launch_id: u32,
}

impl TaskLaunchRecord {
    /// Creates a record for `body` with an unassigned launch id.
    #[must_use]
    pub const fn new(body: BodyFingerprint) -> Self {
        Self { body, launch_id: 0 }
    }
}

/// Immutable per-body metadata.
///
/// `input_states` and `output_states` are sorted and deduplicated so
/// membership checks are binary searches and set unions merge
/// deterministically.
#[derive(Clone, Debug, PartialEq)]
pub struct TaskMeta {
    /// Kernel name.
    pub name: Box<str>,
    /// Iteration shape.
    pub shape: LaunchShape,
    /// Target backend.
    pub backend: Backend,
    /// Launch block dimension.
    pub block_dim: u32,
    /// Whether every state access is element-wise over the iteration domain.
    pub element_wise: bool,
    /// States the body reads, excluding states it defines itself first.
    pub input_states: Vec<AsyncState>,
    /// States the body writes.
    pub output_states: Vec<AsyncState>,
    /// Layout nodes whose resources the body touches.
    pub touched_nodes: Vec<SparseNodeId>,
    /// The node whose active-cell list this body regenerates, if any.
    pub listgen_target: Option<SparseNodeId>,
    /// The node this body activates cells in before writing, if any.
    pub activates: Option<SparseNodeId>,
    /// Nodes whose masks this body lowers.
    pub deactivates: Vec<SparseNodeId>,
    /// Whether the body carries host-observable effects.
    pub has_side_effects: bool,
}

impl TaskMeta {
    /// Metadata for the sentinel node that owns every state's initial value.
    #[must_use]
    pub fn initial() -> Self {
        Self {
            name: "initial_state".into(),
            shape: LaunchShape::Serial,
            backend: Backend::Cpu,
            block_dim: 1,
            element_wise: false,
            input_states: Vec::new(),
            output_states: Vec::new(),
            touched_nodes: Vec::new(),
            listgen_target: None,
            activates: None,
            deactivates: Vec::new(),
            has_side_effects: false,
        }
    }

    /// Returns whether the body reads `state`.
    #[must_use]
    pub fn reads(&self, state: AsyncState) -> bool {
        self.input_states.binary_search(&state).is_ok()
    }

    /// Returns whether the body writes `state`.
    #[must_use]
    pub fn writes(&self, state: AsyncState) -> bool {
        self.output_states.binary_search(&state).is_ok()
    }

    /// Adds `state` to the output set, keeping it sorted.
    pub fn add_output(&mut self, state: AsyncState) {
        if let Err(pos) = self.output_states.binary_search(&state) {
            self.output_states.insert(pos, state);
        }
    }
}

fn insert_sorted<T: Ord + Copy>(v: &mut Vec<T>, item: T) {
    if let Err(pos) = v.binary_search(&item) {
        v.insert(pos, item);
    }
}

/// Derives the metadata of `body`.
///
/// The scan tracks the set of states already written so a load of a
/// locally-defined state does not become an input; this is what makes the
/// metadata of a fused body come out as `A.in ∪ (B.in \ A.out)` without the
/// union being computed explicitly.
#[must_use]
pub fn derive_meta(body: &TaskBody) -> TaskMeta {
    let mut meta = TaskMeta {
        name: body.name.clone(),
        shape: body.shape,
        backend: body.backend,
        block_dim: body.block_dim,
        element_wise: body.element_wise,
        input_states: Vec::new(),
        output_states: Vec::new(),
        touched_nodes: Vec::new(),
        listgen_target: None,
        activates: None,
        deactivates: Vec::new(),
        has_side_effects: false,
    };

    let read = |meta: &mut TaskMeta, state: AsyncState| {
        if !meta.writes(state) {
            insert_sorted(&mut meta.input_states, state);
        }
        insert_sorted(&mut meta.touched_nodes, state.node);
    };
    let write = |meta: &mut TaskMeta, state: AsyncState| {
        insert_sorted(&mut meta.output_states, state);
        insert_sorted(&mut meta.touched_nodes, state.node);
    };

    // A struct-for launch walks the root's active-cell list.
    if let LaunchShape::StructFor { root } = body.shape {
        read(&mut meta, AsyncState::list(root));
    }

    for stmt in &body.stmts {
        match *stmt {
            BodyStmt::Load { state } => read(&mut meta, state),
            BodyStmt::Store { state, .. } => write(&mut meta, state),
            BodyStmt::Activate { node } => {
                read(&mut meta, AsyncState::mask(node));
                write(&mut meta, AsyncState::mask(node));
                meta.activates = Some(node);
            }
            BodyStmt::Deactivate { node } => {
                read(&mut meta, AsyncState::mask(node));
                write(&mut meta, AsyncState::mask(node));
                insert_sorted(&mut meta.deactivates, node);
            }
            BodyStmt::ListGen { node } => {
                read(&mut meta, AsyncState::mask(node));
                write(&mut meta, AsyncState::list(node));
                meta.listgen_target = Some(node);
            }
            BodyStmt::Effect { .. } => meta.has_side_effects = true,
            BodyStmt::Const { .. } | BodyStmt::Unary { .. } | BodyStmt::Binary { .. } => {}
        }
    }

    meta
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::{BinaryOp, BodyBuilder, ConstValue};
    use crate::state::{SparseNodeId, StateSpace};

    #[test]
    fn derive_tracks_reads_writes_and_touched_nodes() {
        let space = StateSpace::new();
        let x = space.add_root("x");
        let y = space.add_root("y");

        let mut b = BodyBuilder::new("axpy", LaunchShape::RangeFor { begin: 0, end: 8 });
        let vx = b.load(AsyncState::value(x));
        let a = b.constant(ConstValue::F64(0.5));
        let ax = b.binary(BinaryOp::Mul, a, vx);
        b.store(AsyncState::value(y), ax);
        let meta = derive_meta(&b.finish().unwrap());

        assert_eq!(meta.input_states, vec![AsyncState::value(x)]);
        assert_eq!(meta.output_states, vec![AsyncState::value(y)]);
        assert_eq!(meta.touched_nodes, vec![x, y]);
        assert!(meta.reads(AsyncState::value(x)));
        assert!(!meta.reads(AsyncState::value(y)));
        assert!(meta.writes(AsyncState::value(y)));
    }

    #[test]
    fn locally_defined_states_are_not_inputs() {
        let s = AsyncState::value(SparseNodeId::new(0));
        let mut b = BodyBuilder::new("store_then_load", LaunchShape::Serial);
        let c = b.constant(ConstValue::I64(3));
        b.store(s, c);
        let reread = b.load(s);
        b.store(s, reread);
        let meta = derive_meta(&b.finish().unwrap());

        assert!(meta.input_states.is_empty());
        assert_eq!(meta.output_states, vec![s]);
    }

    #[test]
    fn struct_for_reads_the_root_list() {
        let root = SparseNodeId::new(4);
        let mut b = BodyBuilder::new("scan", LaunchShape::StructFor { root });
        let v = b.load(AsyncState::value(root));
        b.store(AsyncState::value(root), v);
        let meta = derive_meta(&b.finish().unwrap());

        assert!(meta.reads(AsyncState::list(root)));
    }

    #[test]
    fn listgen_reads_mask_and_writes_list() {
        let node = SparseNodeId::new(2);
        let mut b = BodyBuilder::new("regen", LaunchShape::Serial);
        b.listgen(node);
        let meta = derive_meta(&b.finish().unwrap());

        assert_eq!(meta.listgen_target, Some(node));
        assert!(meta.reads(AsyncState::mask(node)));
        assert!(meta.writes(AsyncState::list(node)));
    }

    #[test]
    fn activation_and_effects_surface_as_hints() {
        let node = SparseNodeId::new(1);
        let mut b = BodyBuilder::new("fill", LaunchShape::StructFor { root: node });
        b.activate(node);
        let c = b.constant(ConstValue::F32(1.0));
        b.store(AsyncState::value(node), c);
        b.effect(7, None);
        let meta = derive_meta(&b.finish().unwrap());

        assert_eq!(meta.activates, Some(node));
        assert!(meta.writes(AsyncState::mask(node)));
        assert!(meta.has_side_effects);
    }
}
