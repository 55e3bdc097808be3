// Copyright 2026 the Launch Graph Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Constant folding over task bodies.
//!
//! Folding evaluates pure statements whose operands are constants through a
//! cache of evaluator kernels keyed by opcode and operand/result types.
//! Kernel lookup, construction and execution are serialized under a single
//! mutex; the cache is shared across threads.

use std::sync::Mutex;

use hashbrown::HashMap;

use crate::body::{BinaryOp, BodyStmt, ConstValue, ScalarType, StmtId, TaskBody, UnaryOp};

/// Opcode half of an evaluator key.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum EvalOp {
    /// A binary opcode.
    Binary(BinaryOp),
    /// A unary opcode.
    Unary(UnaryOp),
}

/// Cache key identifying one evaluator kernel.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct EvaluatorId {
    /// The opcode.
    pub op: EvalOp,
    /// Result type.
    pub ret: ScalarType,
    /// Left (or sole) operand type.
    pub lhs: ScalarType,
    /// Right operand type for binary kernels.
    pub rhs: Option<ScalarType>,
}

impl EvaluatorId {
    fn binary(op: BinaryOp, lhs: ScalarType, rhs: ScalarType) -> Self {
        Self {
            op: EvalOp::Binary(op),
            ret: binary_ret_type(op, lhs, rhs),
            lhs,
            rhs: Some(rhs),
        }
    }

    fn unary(op: UnaryOp, operand: ScalarType) -> Self {
        Self {
            op: EvalOp::Unary(op),
            ret: unary_ret_type(op, operand),
            lhs: operand,
            rhs: None,
        }
    }
}

fn promote(a: ScalarType, b: ScalarType) -> ScalarType {
    if a.rank() >= b.rank() { a } else { b }
}

fn binary_ret_type(op: BinaryOp, lhs: ScalarType, rhs: ScalarType) -> ScalarType {
    match op {
        BinaryOp::CmpLt | BinaryOp::CmpEq => ScalarType::I32,
        _ => promote(lhs, rhs),
    }
}

fn unary_ret_type(op: UnaryOp, operand: ScalarType) -> ScalarType {
    match op {
        UnaryOp::Cast(to) => to,
        _ => operand,
    }
}

/// A validated evaluator kernel for one opcode/type combination.
#[derive(Copy, Clone, Debug)]
struct Evaluator {
    id: EvaluatorId,
}

impl Evaluator {
    /// Validates the signature and constructs the kernel, or reports the
    /// combination unsupported.
    fn build(id: EvaluatorId) -> Option<Self> {
        match id.op {
            EvalOp::Binary(op) => {
                let rhs = id.rhs?;
                if id.ret != binary_ret_type(op, id.lhs, rhs) {
                    return None;
                }
                let float = matches!(id.ret, ScalarType::F32 | ScalarType::F64);
                if float && matches!(op, BinaryOp::BitAnd | BinaryOp::BitOr) {
                    return None;
                }
            }
            EvalOp::Unary(op) => {
                if id.rhs.is_some() || id.ret != unary_ret_type(op, id.lhs) {
                    return None;
                }
                if matches!(op, UnaryOp::Sqrt)
                    && !matches!(id.lhs, ScalarType::F32 | ScalarType::F64)
                {
                    return None;
                }
            }
        }
        Some(Self { id })
    }

    fn run(&self, lhs: ConstValue, rhs: Option<ConstValue>) -> Option<ConstValue> {
        match self.id.op {
            EvalOp::Binary(op) => eval_binary(op, self.id.ret, lhs, rhs?),
            EvalOp::Unary(op) => eval_unary(op, lhs),
        }
    }
}

fn cast(value: ConstValue, to: ScalarType) -> ConstValue {
    let as_f64 = match value {
        ConstValue::I32(v) => v as f64,
        ConstValue::I64(v) => v as f64,
        ConstValue::F32(v) => f64::from(v),
        ConstValue::F64(v) => v,
    };
    let as_i64 = match value {
        ConstValue::I32(v) => i64::from(v),
        ConstValue::I64(v) => v,
        ConstValue::F32(v) => v as i64,
        ConstValue::F64(v) => v as i64,
    };
    match to {
        ScalarType::I32 => ConstValue::I32(as_i64 as i32),
        ScalarType::I64 => ConstValue::I64(as_i64),
        ScalarType::F32 => ConstValue::F32(as_f64 as f32),
        ScalarType::F64 => ConstValue::F64(as_f64),
    }
}

fn eval_binary(
    op: BinaryOp,
    ret: ScalarType,
    lhs: ConstValue,
    rhs: ConstValue,
) -> Option<ConstValue> {
    if matches!(op, BinaryOp::CmpLt | BinaryOp::CmpEq) {
        let domain = promote(lhs.scalar_type(), rhs.scalar_type());
        let hit = match (cast(lhs, domain), cast(rhs, domain)) {
            (ConstValue::I32(a), ConstValue::I32(b)) => cmp(op, &a, &b),
            (ConstValue::I64(a), ConstValue::I64(b)) => cmp(op, &a, &b),
            (ConstValue::F32(a), ConstValue::F32(b)) => cmp_float(op, f64::from(a), f64::from(b)),
            (ConstValue::F64(a), ConstValue::F64(b)) => cmp_float(op, a, b),
            _ => return None,
        };
        return Some(ConstValue::I32(i32::from(hit)));
    }

    match (cast(lhs, ret), cast(rhs, ret)) {
        (ConstValue::I32(a), ConstValue::I32(b)) => int_binary(op, a, b).map(ConstValue::I32),
        (ConstValue::I64(a), ConstValue::I64(b)) => int_binary64(op, a, b).map(ConstValue::I64),
        (ConstValue::F32(a), ConstValue::F32(b)) => float_binary(op, a, b).map(ConstValue::F32),
        (ConstValue::F64(a), ConstValue::F64(b)) => float_binary(op, a, b).map(ConstValue::F64),
        _ => None,
    }
}

fn cmp<T: PartialOrd>(op: BinaryOp, a: &T, b: &T) -> bool {
    match op {
        BinaryOp::CmpLt => a < b,
        BinaryOp::CmpEq => a == b,
        _ => false,
    }
}

fn cmp_float(op: BinaryOp, a: f64, b: f64) -> bool {
    match op {
        BinaryOp::CmpLt => a < b,
        BinaryOp::CmpEq => a == b,
        _ => false,
    }
}

fn int_binary(op: BinaryOp, a: i32, b: i32) -> Option<i32> {
    match op {
        BinaryOp::Add => Some(a.wrapping_add(b)),
        BinaryOp::Sub => Some(a.wrapping_sub(b)),
        BinaryOp::Mul => Some(a.wrapping_mul(b)),
        BinaryOp::Div => (b != 0).then(|| a.wrapping_div(b)),
        BinaryOp::Min => Some(a.min(b)),
        BinaryOp::Max => Some(a.max(b)),
        BinaryOp::BitAnd => Some(a & b),
        BinaryOp::BitOr => Some(a | b),
        BinaryOp::CmpLt | BinaryOp::CmpEq => None,
    }
}

fn int_binary64(op: BinaryOp, a: i64, b: i64) -> Option<i64> {
    match op {
        BinaryOp::Add => Some(a.wrapping_add(b)),
        BinaryOp::Sub => Some(a.wrapping_sub(b)),
        BinaryOp::Mul => Some(a.wrapping_mul(b)),
        BinaryOp::Div => (b != 0).then(|| a.wrapping_div(b)),
        BinaryOp::Min => Some(a.min(b)),
        BinaryOp::Max => Some(a.max(b)),
        BinaryOp::BitAnd => Some(a & b),
        BinaryOp::BitOr => Some(a | b),
        BinaryOp::CmpLt | BinaryOp::CmpEq => None,
    }
}

fn float_binary<T>(op: BinaryOp, a: T, b: T) -> Option<T>
where
    T: Copy + PartialOrd + core::ops::Add<Output = T> + core::ops::Sub<Output = T>
        + core::ops::Mul<Output = T> + core::ops::Div<Output = T>,
{
    match op {
        BinaryOp::Add => Some(a + b),
        BinaryOp::Sub => Some(a - b),
        BinaryOp::Mul => Some(a * b),
        BinaryOp::Div => Some(a / b),
        BinaryOp::Min => Some(if b < a { b } else { a }),
        BinaryOp::Max => Some(if a < b { b } else { a }),
        _ => None,
    }
}

fn eval_unary(op: UnaryOp, operand: ConstValue) -> Option<ConstValue> {
    match op {
        UnaryOp::Cast(to) => Some(cast(operand, to)),
        UnaryOp::Neg => Some(match operand {
            ConstValue::I32(v) => ConstValue::I32(v.wrapping_neg()),
            ConstValue::I64(v) => ConstValue::I64(v.wrapping_neg()),
            ConstValue::F32(v) => ConstValue::F32(-v),
            ConstValue::F64(v) => ConstValue::F64(-v),
        }),
        UnaryOp::Abs => Some(match operand {
            ConstValue::I32(v) => ConstValue::I32(v.wrapping_abs()),
            ConstValue::I64(v) => ConstValue::I64(v.wrapping_abs()),
            ConstValue::F32(v) => ConstValue::F32(v.abs()),
            ConstValue::F64(v) => ConstValue::F64(v.abs()),
        }),
        UnaryOp::Sqrt => match operand {
            ConstValue::F32(v) => Some(ConstValue::F32(v.sqrt())),
            ConstValue::F64(v) => Some(ConstValue::F64(v.sqrt())),
            _ => None,
        },
    }
}

/// Shared cache of evaluator kernels.
///
/// One mutex guards lookup, construction and execution; kernels are never
/// rebuilt for a key that was already attempted, including unsupported
/// combinations.
#[derive(Debug, Default)]
pub struct EvaluatorCache {
    inner: Mutex<HashMap<EvaluatorId, Option<Evaluator>>>,
}

impl EvaluatorCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cached kernel slots (including failed combinations).
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().expect("evaluator cache lock poisoned").len()
    }

    /// Returns `true` if no kernel has been requested yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn evaluate(
        &self,
        id: EvaluatorId,
        lhs: ConstValue,
        rhs: Option<ConstValue>,
    ) -> Option<ConstValue> {
        let mut cache = self.inner.lock().expect("evaluator cache lock poisoned");
        let evaluator = cache.entry(id).or_insert_with(|| Evaluator::build(id));
        // Execution stays under the lock; kernel runs are serialized.
        evaluator.as_ref().and_then(|e| e.run(lhs, rhs))
    }
}

/// Folds constant subexpressions of `body`.
///
/// Returns the rewritten body, or `None` when nothing folded. Statement ids
/// are preserved: folded statements are replaced in place by constants.
#[must_use]
pub(crate) fn fold_body(body: &TaskBody, cache: &EvaluatorCache) -> Option<TaskBody> {
    let mut stmts = body.stmts.clone();
    let mut changed = false;

    let const_of = |stmts: &[BodyStmt], id: StmtId| match stmts.get(id.0 as usize) {
        Some(BodyStmt::Const { value }) => Some(*value),
        _ => None,
    };

    for i in 0..stmts.len() {
        let folded = match stmts[i] {
            BodyStmt::Binary { op, lhs, rhs } => {
                match (const_of(&stmts, lhs), const_of(&stmts, rhs)) {
                    (Some(a), Some(b)) => {
                        let id = EvaluatorId::binary(op, a.scalar_type(), b.scalar_type());
                        cache.evaluate(id, a, Some(b))
                    }
                    _ => None,
                }
            }
            BodyStmt::Unary { op, operand } => const_of(&stmts, operand).and_then(|a| {
                let id = EvaluatorId::unary(op, a.scalar_type());
                cache.evaluate(id, a, None)
            }),
            _ => None,
        };
        if let Some(value) = folded {
            stmts[i] = BodyStmt::Const { value };
            changed = true;
        }
    }

    changed.then(|| TaskBody {
        name: body.name.clone(),
        shape: body.shape,
        backend: body.backend,
        block_dim: body.block_dim,
        element_wise: body.element_wise,
        stmts,
    })
}
