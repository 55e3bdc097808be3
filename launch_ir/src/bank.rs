// Copyright 2026 the Launch Graph Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The IR bank: a content-addressed, thread-shared store for task bodies
//! and their derived metadata, plus the rewrites the scheduler requests.
//!
//! All interior mutability is guarded here; callers hold `Arc` handles and
//! treat everything returned as immutable. Rewrite results (fusion,
//! demotion) are cached by fingerprint so repeated optimization passes over
//! the same bodies never recompute them.

use std::sync::{Arc, Mutex};

use hashbrown::HashMap;

use crate::body::{BodyFingerprint, BodyStmt, StmtId, TaskBody};
use crate::fold::{EvaluatorCache, fold_body};
use crate::meta::{TaskMeta, derive_meta};
use crate::state::{AsyncState, SparseNodeId, StateKind};

#[derive(Debug, Default)]
struct BankInner {
    bodies: HashMap<BodyFingerprint, Arc<TaskBody>>,
    metas: HashMap<BodyFingerprint, Arc<TaskMeta>>,
    fuse_results: HashMap<(BodyFingerprint, BodyFingerprint), Option<BodyFingerprint>>,
    demotion_results: HashMap<(BodyFingerprint, SparseNodeId), Option<BodyFingerprint>>,
}

/// The deduplicating body/metadata store.
#[derive(Debug, Default)]
pub struct IrBank {
    inner: Mutex<BankInner>,
    evaluators: EvaluatorCache,
}

impl IrBank {
    /// Creates an empty bank.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Interns `body`, derives and interns its metadata, and returns the
    /// content fingerprint. Identical bodies share one entry.
    pub fn intern(&self, body: TaskBody) -> BodyFingerprint {
        let mut inner = self.inner.lock().expect("bank lock poisoned");
        Self::intern_inner(&mut inner, body)
    }

    fn intern_inner(inner: &mut BankInner, body: TaskBody) -> BodyFingerprint {
        let fp = body.fingerprint();
        if !inner.bodies.contains_key(&fp) {
            let meta = derive_meta(&body);
            inner.bodies.insert(fp, Arc::new(body));
            inner.metas.insert(fp, Arc::new(meta));
        }
        fp
    }

    /// Returns the interned body for `fp`.
    #[must_use]
    pub fn body(&self, fp: BodyFingerprint) -> Option<Arc<TaskBody>> {
        let inner = self.inner.lock().expect("bank lock poisoned");
        inner.bodies.get(&fp).cloned()
    }

    /// Returns the metadata interned alongside the body for `fp`.
    #[must_use]
    pub fn meta(&self, fp: BodyFingerprint) -> Option<Arc<TaskMeta>> {
        let inner = self.inner.lock().expect("bank lock poisoned");
        inner.metas.get(&fp).cloned()
    }

    /// Number of distinct interned bodies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().expect("bank lock poisoned").bodies.len()
    }

    /// Returns `true` if the bank holds no bodies.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reports whether two bodies may be merged into one launch.
    ///
    /// Requires identical launch shape (including range bounds and sparse
    /// root), identical backend, block dimension and element-wise flag, and
    /// that neither body is a list-regeneration task.
    #[must_use]
    pub fn are_fusible(&self, a: &TaskMeta, b: &TaskMeta) -> bool {
        a.listgen_target.is_none()
            && b.listgen_target.is_none()
            && a.shape == b.shape
            && a.backend == b.backend
            && a.block_dim == b.block_dim
            && a.element_wise == b.element_wise
    }

    /// Merges body `a` followed by body `b` into a single interned body.
    ///
    /// Returns `None` when the bodies are not joinable at the IR level. The
    /// result (including refusal) is cached per ordered pair.
    pub fn fuse_bodies(
        &self,
        a: BodyFingerprint,
        b: BodyFingerprint,
    ) -> Option<BodyFingerprint> {
        let mut inner = self.inner.lock().expect("bank lock poisoned");
        if let Some(&cached) = inner.fuse_results.get(&(a, b)) {
            return cached;
        }
        let (Some(body_a), Some(body_b)) =
            (inner.bodies.get(&a).cloned(), inner.bodies.get(&b).cloned())
        else {
            return None;
        };

        let merged = merge_bodies(&body_a, &body_b);
        let fp = merged.map(|body| Self::intern_inner(&mut inner, body));
        inner.fuse_results.insert((a, b), fp);
        fp
    }

    /// Rewrites `body` so the activation of `region` is demoted to a plain
    /// write, producing a distinct fingerprint.
    ///
    /// Returns `None` when the body does not activate `region`. Results are
    /// cached per (body, region).
    pub fn rewrite_for_demotion(
        &self,
        fp: BodyFingerprint,
        region: SparseNodeId,
    ) -> Option<BodyFingerprint> {
        let mut inner = self.inner.lock().expect("bank lock poisoned");
        if let Some(&cached) = inner.demotion_results.get(&(fp, region)) {
            return cached;
        }
        let body = inner.bodies.get(&fp).cloned()?;

        let keep: Vec<bool> = body
            .stmts
            .iter()
            .map(|s| !matches!(s, BodyStmt::Activate { node } if *node == region))
            .collect();
        let result = if keep.iter().all(|&k| k) {
            None
        } else {
            let stmts = compact_stmts(&body.stmts, &keep);
            let demoted = TaskBody {
                name: body.name.clone(),
                shape: body.shape,
                backend: body.backend,
                block_dim: body.block_dim,
                element_wise: body.element_wise,
                stmts,
            };
            Some(Self::intern_inner(&mut inner, demoted))
        };
        inner.demotion_results.insert((fp, region), result);
        result
    }

    /// Removes the writes of `states` from a body, dead-code-eliminates
    /// statements that only fed them, and interns the edited body.
    ///
    /// Returns `None` when the body writes none of the states.
    pub fn strip_stores(
        &self,
        fp: BodyFingerprint,
        states: &[AsyncState],
    ) -> Option<BodyFingerprint> {
        let mut inner = self.inner.lock().expect("bank lock poisoned");
        let body = inner.bodies.get(&fp).cloned()?;

        let writes_state = |stmt: &BodyStmt| match *stmt {
            BodyStmt::Store { state, .. } => states.contains(&state),
            BodyStmt::Activate { node } | BodyStmt::Deactivate { node } => states
                .contains(&AsyncState {
                    node,
                    kind: StateKind::Mask,
                }),
            BodyStmt::ListGen { node } => states.contains(&AsyncState {
                node,
                kind: StateKind::List,
            }),
            _ => false,
        };

        let mut keep: Vec<bool> = body.stmts.iter().map(|s| !writes_state(s)).collect();
        if keep.iter().all(|&k| k) {
            return None;
        }

        // Sweep pure statements nothing refers to any more, back to front.
        let mut used = vec![false; body.stmts.len()];
        for (i, stmt) in body.stmts.iter().enumerate().rev() {
            if !keep[i] || (stmt.is_pure() && !used[i]) {
                continue;
            }
            for operand in stmt.operands().into_iter().flatten() {
                used[operand.0 as usize] = true;
            }
        }
        for (i, stmt) in body.stmts.iter().enumerate() {
            if stmt.is_pure() && !used[i] {
                keep[i] = false;
            }
        }

        let stmts = compact_stmts(&body.stmts, &keep);
        let stripped = TaskBody {
            name: body.name.clone(),
            shape: body.shape,
            backend: body.backend,
            block_dim: body.block_dim,
            element_wise: body.element_wise,
            stmts,
        };
        Some(Self::intern_inner(&mut inner, stripped))
    }

    /// Folds constant subexpressions of the body for `fp` and interns the
    /// result. Returns `None` when nothing folds.
    pub fn fold_constants(&self, fp: BodyFingerprint) -> Option<BodyFingerprint> {
        let body = self.body(fp)?;
        let folded = fold_body(&body, &self.evaluators)?;
        Some(self.intern(folded))
    }

    /// The shared evaluator cache backing constant folding.
    #[must_use]
    pub fn evaluators(&self) -> &EvaluatorCache {
        &self.evaluators
    }
}

fn merge_bodies(a: &TaskBody, b: &TaskBody) -> Option<TaskBody> {
    if a.shape != b.shape
        || a.backend != b.backend
        || a.block_dim != b.block_dim
        || a.element_wise != b.element_wise
    {
        return None;
    }
    let a_lists = a.stmts.iter().any(|s| matches!(s, BodyStmt::ListGen { .. }));
    let b_lists = b.stmts.iter().any(|s| matches!(s, BodyStmt::ListGen { .. }));
    if a_lists || b_lists {
        return None;
    }

    let offset = u32::try_from(a.stmts.len()).ok()?;
    let mut stmts = a.stmts.clone();
    stmts.extend(b.stmts.iter().map(|s| shift_operands(s, offset)));
    Some(TaskBody {
        name: format!("{}_{}", a.name, b.name).into_boxed_str(),
        shape: a.shape,
        backend: a.backend,
        block_dim: a.block_dim,
        element_wise: a.element_wise,
        stmts,
    })
}

fn shift_operands(stmt: &BodyStmt, offset: u32) -> BodyStmt {
    let shift = |id: StmtId| StmtId(id.0 + offset);
    match *stmt {
        BodyStmt::Unary { op, operand } => BodyStmt::Unary {
            op,
            operand: shift(operand),
        },
        BodyStmt::Binary { op, lhs, rhs } => BodyStmt::Binary {
            op,
            lhs: shift(lhs),
            rhs: shift(rhs),
        },
        BodyStmt::Store { state, value } => BodyStmt::Store {
            state,
            value: shift(value),
        },
        BodyStmt::Effect { symbol, value } => BodyStmt::Effect {
            symbol,
            value: value.map(shift),
        },
        other => other,
    }
}

/// Drops the statements marked `false` in `keep`, remapping operand ids.
///
/// Callers must only drop statements no surviving statement refers to.
fn compact_stmts(stmts: &[BodyStmt], keep: &[bool]) -> Vec<BodyStmt> {
    let mut remap = vec![u32::MAX; stmts.len()];
    let mut next = 0_u32;
    for (i, &k) in keep.iter().enumerate() {
        if k {
            remap[i] = next;
            next += 1;
        }
    }
    let shift = |id: StmtId| {
        debug_assert_ne!(remap[id.0 as usize], u32::MAX, "operand of a kept statement dropped");
        StmtId(remap[id.0 as usize])
    };
    stmts
        .iter()
        .zip(keep)
        .filter(|&(_, &k)| k)
        .map(|(stmt, _)| match *stmt {
            BodyStmt::Unary { op, operand } => BodyStmt::Unary {
                op,
                operand: shift(operand),
            },
            BodyStmt::Binary { op, lhs, rhs } => BodyStmt::Binary {
                op,
                lhs: shift(lhs),
                rhs: shift(rhs),
            },
            BodyStmt::Store { state, value } => BodyStmt::Store {
                state,
                value: shift(value),
            },
            BodyStmt::Effect { symbol, value } => BodyStmt::Effect {
                symbol,
                value: value.map(shift),
            },
            other => other,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::{BinaryOp, BodyBuilder, ConstValue, LaunchShape};
    use crate::state::StateSpace;

    fn writer(name: &str, state: AsyncState, v: i64) -> TaskBody {
        let mut b = BodyBuilder::new(name, LaunchShape::RangeFor { begin: 0, end: 16 })
            .element_wise(true);
        let c = b.constant(ConstValue::I64(v));
        b.store(state, c);
        b.finish().unwrap()
    }

    #[test]
    fn interning_is_idempotent_and_shares_metadata() {
        let bank = IrBank::new();
        let space = StateSpace::new();
        let s = AsyncState::value(space.add_root("x"));

        let fp1 = bank.intern(writer("w", s, 5));
        let fp2 = bank.intern(writer("w", s, 5));
        assert_eq!(fp1, fp2);
        assert_eq!(bank.len(), 1);
        assert!(Arc::ptr_eq(&bank.meta(fp1).unwrap(), &bank.meta(fp2).unwrap()));
    }

    #[test]
    fn fused_bodies_concatenate_and_internalize_dataflow() {
        let bank = IrBank::new();
        let space = StateSpace::new();
        let x = AsyncState::value(space.add_root("x"));
        let y = AsyncState::value(space.add_root("y"));

        // a: x = 2          b: y = x + 1
        let a = bank.intern(writer("init_x", x, 2));
        let b = {
            let mut bb = BodyBuilder::new("incr", LaunchShape::RangeFor { begin: 0, end: 16 })
                .element_wise(true);
            let vx = bb.load(x);
            let one = bb.constant(ConstValue::I64(1));
            let sum = bb.binary(BinaryOp::Add, vx, one);
            bb.store(y, sum);
            bank.intern(bb.finish().unwrap())
        };

        let fused = bank.fuse_bodies(a, b).expect("bodies should fuse");
        let meta = bank.meta(fused).unwrap();
        // x is produced inside the fused body, so it is no longer an input.
        assert!(meta.input_states.is_empty());
        assert_eq!(meta.output_states, vec![x, y]);
        assert_eq!(meta.name.as_ref(), "init_x_incr");

        // Cached: same answer, same fingerprint.
        assert_eq!(bank.fuse_bodies(a, b), Some(fused));
    }

    #[test]
    fn fusion_refuses_shape_mismatches_and_list_tasks() {
        let bank = IrBank::new();
        let space = StateSpace::new();
        let node = space.add_root("grid");
        let s = AsyncState::value(node);

        let a = bank.intern(writer("w", s, 1));
        let serial = {
            let mut bb = BodyBuilder::new("serial_w", LaunchShape::Serial);
            let c = bb.constant(ConstValue::I64(1));
            bb.store(s, c);
            bank.intern(bb.finish().unwrap())
        };
        let regen = {
            let mut bb = BodyBuilder::new("regen", LaunchShape::Serial);
            bb.listgen(node);
            bank.intern(bb.finish().unwrap())
        };

        assert_eq!(bank.fuse_bodies(a, serial), None);
        assert_eq!(bank.fuse_bodies(serial, regen), None);
        assert!(!bank.are_fusible(&bank.meta(a).unwrap(), &bank.meta(serial).unwrap()));
        assert!(!bank.are_fusible(&bank.meta(serial).unwrap(), &bank.meta(regen).unwrap()));
    }

    #[test]
    fn demotion_drops_the_activation_and_its_mask_write() {
        let bank = IrBank::new();
        let space = StateSpace::new();
        let node = space.add_root("grid");

        let activating = {
            let mut bb = BodyBuilder::new("fill", LaunchShape::StructFor { root: node })
                .element_wise(true);
            bb.activate(node);
            let c = bb.constant(ConstValue::F32(1.0));
            bb.store(AsyncState::value(node), c);
            bank.intern(bb.finish().unwrap())
        };

        let demoted = bank
            .rewrite_for_demotion(activating, node)
            .expect("activation should demote");
        assert_ne!(demoted, activating);

        let meta = bank.meta(demoted).unwrap();
        assert_eq!(meta.activates, None);
        assert!(!meta.writes(AsyncState::mask(node)));
        assert!(meta.writes(AsyncState::value(node)));

        // Cached, and a body without the activation refuses.
        assert_eq!(bank.rewrite_for_demotion(activating, node), Some(demoted));
        assert_eq!(bank.rewrite_for_demotion(demoted, node), None);
    }

    #[test]
    fn strip_stores_removes_the_write_and_its_feeding_expression() {
        let bank = IrBank::new();
        let space = StateSpace::new();
        let x = AsyncState::value(space.add_root("x"));
        let y = AsyncState::value(space.add_root("y"));

        let both = {
            let mut bb = BodyBuilder::new("two_outs", LaunchShape::Serial);
            let cx = bb.constant(ConstValue::I64(1));
            let cy = bb.constant(ConstValue::I64(2));
            bb.store(x, cx);
            bb.store(y, cy);
            bank.intern(bb.finish().unwrap())
        };

        let stripped = bank.strip_stores(both, &[x]).expect("store should strip");
        let body = bank.body(stripped).unwrap();
        let meta = bank.meta(stripped).unwrap();
        assert!(!meta.writes(x));
        assert!(meta.writes(y));
        // The constant feeding x is swept too.
        assert_eq!(body.stmts.len(), 2);

        assert_eq!(bank.strip_stores(both, &[AsyncState::mask(SparseNodeId::new(9))]), None);
    }

    #[test]
    fn fold_constants_reinterns_under_a_new_fingerprint() {
        let bank = IrBank::new();
        let space = StateSpace::new();
        let s = AsyncState::value(space.add_root("x"));

        let fp = {
            let mut bb = BodyBuilder::new("k", LaunchShape::Serial);
            let a = bb.constant(ConstValue::I64(20));
            let b = bb.constant(ConstValue::I64(22));
            let sum = bb.binary(BinaryOp::Add, a, b);
            bb.store(s, sum);
            bank.intern(bb.finish().unwrap())
        };

        let folded = bank.fold_constants(fp).expect("should fold");
        assert_ne!(folded, fp);
        assert_eq!(bank.fold_constants(folded), None);
        assert!(!bank.evaluators().is_empty());
    }
}
