// Copyright 2026 the Launch Graph Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Task bodies: a small SSA-style statement IR plus builder and
//! content-addressed fingerprinting.
//!
//! A body is the unit the bank interns and rewrites. Statements form a flat
//! list in definition order; operands always refer to earlier statements, so
//! a single forward walk sees definitions before uses.

use std::fmt;

use crate::state::{AsyncState, SparseNodeId, StateKind};

/// Scalar element types the pipeline computes over.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ScalarType {
    /// 32-bit signed integer.
    I32,
    /// 64-bit signed integer.
    I64,
    /// 32-bit float.
    F32,
    /// 64-bit float.
    F64,
}

impl ScalarType {
    /// Promotion rank; binary results take the higher-ranked operand type.
    #[must_use]
    pub(crate) const fn rank(self) -> u8 {
        match self {
            Self::I32 => 0,
            Self::I64 => 1,
            Self::F32 => 2,
            Self::F64 => 3,
        }
    }

    const fn tag(self) -> u8 {
        match self {
            Self::I32 => 0,
            Self::I64 => 1,
            Self::F32 => 2,
            Self::F64 => 3,
        }
    }
}

/// A typed scalar constant.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum ConstValue {
    /// 32-bit signed integer.
    I32(i32),
    /// 64-bit signed integer.
    I64(i64),
    /// 32-bit float.
    F32(f32),
    /// 64-bit float.
    F64(f64),
}

impl ConstValue {
    /// The constant's scalar type.
    #[must_use]
    pub const fn scalar_type(self) -> ScalarType {
        match self {
            Self::I32(_) => ScalarType::I32,
            Self::I64(_) => ScalarType::I64,
            Self::F32(_) => ScalarType::F32,
            Self::F64(_) => ScalarType::F64,
        }
    }

    /// Canonical bit pattern, used for fingerprinting and equality in maps.
    #[must_use]
    pub const fn to_bits(self) -> u64 {
        match self {
            Self::I32(v) => v as u32 as u64,
            Self::I64(v) => v as u64,
            Self::F32(v) => v.to_bits() as u64,
            Self::F64(v) => v.to_bits(),
        }
    }
}

/// Binary opcodes.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    /// Addition.
    Add,
    /// Subtraction.
    Sub,
    /// Multiplication.
    Mul,
    /// Division.
    Div,
    /// Minimum.
    Min,
    /// Maximum.
    Max,
    /// Bitwise and (integer only).
    BitAnd,
    /// Bitwise or (integer only).
    BitOr,
    /// Less-than comparison; produces `I32` 0/1.
    CmpLt,
    /// Equality comparison; produces `I32` 0/1.
    CmpEq,
}

impl BinaryOp {
    const fn tag(self) -> u8 {
        match self {
            Self::Add => 0,
            Self::Sub => 1,
            Self::Mul => 2,
            Self::Div => 3,
            Self::Min => 4,
            Self::Max => 5,
            Self::BitAnd => 6,
            Self::BitOr => 7,
            Self::CmpLt => 8,
            Self::CmpEq => 9,
        }
    }
}

/// Unary opcodes.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    /// Negation.
    Neg,
    /// Absolute value.
    Abs,
    /// Square root (float only).
    Sqrt,
    /// Value-converting cast to the given type.
    Cast(ScalarType),
}

impl UnaryOp {
    const fn tag(self) -> u8 {
        match self {
            Self::Neg => 0,
            Self::Abs => 1,
            Self::Sqrt => 2,
            Self::Cast(_) => 3,
        }
    }
}

/// Index of a statement within its body.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StmtId(pub u32);

/// A single body statement.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum BodyStmt {
    /// A scalar constant.
    Const {
        /// The constant value.
        value: ConstValue,
    },
    /// A unary operation over an earlier statement.
    Unary {
        /// Opcode.
        op: UnaryOp,
        /// Operand statement.
        operand: StmtId,
    },
    /// A binary operation over two earlier statements.
    Binary {
        /// Opcode.
        op: BinaryOp,
        /// Left operand statement.
        lhs: StmtId,
        /// Right operand statement.
        rhs: StmtId,
    },
    /// Reads a state; the statement's result is the loaded value.
    Load {
        /// The state read.
        state: AsyncState,
    },
    /// Writes an earlier statement's value into a state.
    Store {
        /// The state written.
        state: AsyncState,
        /// The value stored.
        value: StmtId,
    },
    /// Activates the cells this task touches in `node` before writing.
    Activate {
        /// The layout node whose mask is raised.
        node: SparseNodeId,
    },
    /// Clears activation for `node` (garbage collection / reset).
    Deactivate {
        /// The layout node whose mask is lowered.
        node: SparseNodeId,
    },
    /// Regenerates the active-cell list of `node` from its mask.
    ListGen {
        /// The list's layout node.
        node: SparseNodeId,
    },
    /// An opaque host-observable effect (e.g. a device-side print).
    Effect {
        /// Effect discriminator, interned by the frontend.
        symbol: u32,
        /// Optional value the effect consumes.
        value: Option<StmtId>,
    },
}

impl BodyStmt {
    /// Returns `true` for statements whose only purpose is their result
    /// value; these may be dropped once nothing refers to them.
    #[must_use]
    pub const fn is_pure(&self) -> bool {
        matches!(
            self,
            Self::Const { .. } | Self::Unary { .. } | Self::Binary { .. } | Self::Load { .. }
        )
    }

    /// The statement's operands, if any.
    #[must_use]
    pub fn operands(&self) -> [Option<StmtId>; 2] {
        match *self {
            Self::Unary { operand, .. } => [Some(operand), None],
            Self::Binary { lhs, rhs, .. } => [Some(lhs), Some(rhs)],
            Self::Store { value, .. } => [Some(value), None],
            Self::Effect { value, .. } => [value, None],
            _ => [None, None],
        }
    }
}

/// Iteration shape of a task launch.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum LaunchShape {
    /// A single serial invocation.
    Serial,
    /// A dense parallel range.
    RangeFor {
        /// Inclusive start.
        begin: i64,
        /// Exclusive end.
        end: i64,
    },
    /// Iteration over the active cells of a sparse root.
    StructFor {
        /// The sparse root whose active-cell list drives iteration.
        root: SparseNodeId,
    },
}

impl LaunchShape {
    const fn tag(self) -> u8 {
        match self {
            Self::Serial => 0,
            Self::RangeFor { .. } => 1,
            Self::StructFor { .. } => 2,
        }
    }
}

/// Execution backend a body was compiled for.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum Backend {
    /// Host CPU.
    #[default]
    Cpu,
    /// Accelerator device.
    Gpu,
}

/// An immutable task body.
///
/// Bodies are produced by [`BodyBuilder`] or by bank rewrites and are always
/// operand-ordered: every operand id refers to an earlier statement.
#[derive(Clone, Debug, PartialEq)]
pub struct TaskBody {
    /// Kernel name; part of the body's identity.
    pub name: Box<str>,
    /// Iteration shape.
    pub shape: LaunchShape,
    /// Target backend.
    pub backend: Backend,
    /// Launch block dimension.
    pub block_dim: u32,
    /// Whether every state access is element-wise over the iteration domain.
    pub element_wise: bool,
    /// Statements in definition order.
    pub stmts: Vec<BodyStmt>,
}

impl TaskBody {
    /// Computes the body's content-addressed fingerprint.
    #[must_use]
    pub fn fingerprint(&self) -> BodyFingerprint {
        const PREFIX: &[u8] = b"launch_ir:v1\0";
        let mut h = Fnv1a64::new();
        h.update(PREFIX);
        h.update(&encode_u32(
            u32::try_from(self.name.len()).unwrap_or(u32::MAX),
        ));
        h.update(self.name.as_bytes());
        h.update(&[self.shape.tag()]);
        match self.shape {
            LaunchShape::Serial => {}
            LaunchShape::RangeFor { begin, end } => {
                h.update(&begin.to_le_bytes());
                h.update(&end.to_le_bytes());
            }
            LaunchShape::StructFor { root } => h.update(&root.as_u32().to_le_bytes()),
        }
        h.update(&[self.backend as u8, u8::from(self.element_wise)]);
        h.update(&self.block_dim.to_le_bytes());
        h.update(&encode_u32(
            u32::try_from(self.stmts.len()).unwrap_or(u32::MAX),
        ));
        for stmt in &self.stmts {
            hash_stmt(&mut h, stmt);
        }
        BodyFingerprint(h.finish())
    }
}

/// A stable 64-bit content hash of a task body.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BodyFingerprint(pub u64);

impl fmt::Display for BodyFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

fn hash_stmt(h: &mut Fnv1a64, stmt: &BodyStmt) {
    match *stmt {
        BodyStmt::Const { value } => {
            h.update(&[0, value.scalar_type().tag()]);
            h.update(&value.to_bits().to_le_bytes());
        }
        BodyStmt::Unary { op, operand } => {
            h.update(&[1, op.tag()]);
            if let UnaryOp::Cast(to) = op {
                h.update(&[to.tag()]);
            }
            h.update(&operand.0.to_le_bytes());
        }
        BodyStmt::Binary { op, lhs, rhs } => {
            h.update(&[2, op.tag()]);
            h.update(&lhs.0.to_le_bytes());
            h.update(&rhs.0.to_le_bytes());
        }
        BodyStmt::Load { state } => {
            h.update(&[3]);
            hash_state(h, state);
        }
        BodyStmt::Store { state, value } => {
            h.update(&[4]);
            hash_state(h, state);
            h.update(&value.0.to_le_bytes());
        }
        BodyStmt::Activate { node } => {
            h.update(&[5]);
            h.update(&node.as_u32().to_le_bytes());
        }
        BodyStmt::Deactivate { node } => {
            h.update(&[6]);
            h.update(&node.as_u32().to_le_bytes());
        }
        BodyStmt::ListGen { node } => {
            h.update(&[7]);
            h.update(&node.as_u32().to_le_bytes());
        }
        BodyStmt::Effect { symbol, value } => {
            h.update(&[8]);
            h.update(&symbol.to_le_bytes());
            match value {
                Some(v) => {
                    h.update(&[1]);
                    h.update(&v.0.to_le_bytes());
                }
                None => h.update(&[0]),
            }
        }
    }
}

fn hash_state(h: &mut Fnv1a64, state: AsyncState) {
    let kind = match state.kind {
        StateKind::Value => 0_u8,
        StateKind::List => 1,
        StateKind::Mask => 2,
    };
    h.update(&state.node.as_u32().to_le_bytes());
    h.update(&[kind]);
}

fn encode_u32(v: u32) -> [u8; 4] {
    v.to_le_bytes()
}

#[derive(Copy, Clone, Debug)]
struct Fnv1a64(u64);

impl Fnv1a64 {
    const OFFSET: u64 = 0xcbf29ce484222325;
    const PRIME: u64 = 0x100000001b3;

    fn new() -> Self {
        Self(Self::OFFSET)
    }

    fn update(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.0 ^= u64::from(b);
            self.0 = self.0.wrapping_mul(Self::PRIME);
        }
    }

    fn finish(self) -> u64 {
        self.0
    }
}

/// A body construction error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BodyError {
    /// An operand referred to the statement itself or a later statement.
    OperandOutOfRange {
        /// Index of the offending statement.
        stmt: u32,
        /// The out-of-range operand.
        operand: u32,
    },
    /// A body regenerated the lists of more than one layout node.
    MultipleListTargets,
}

impl fmt::Display for BodyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OperandOutOfRange { stmt, operand } => {
                write!(f, "statement {stmt} refers to undefined operand {operand}")
            }
            Self::MultipleListTargets => {
                write!(f, "body regenerates lists for more than one node")
            }
        }
    }
}

impl std::error::Error for BodyError {}

/// Incremental builder for [`TaskBody`] values.
///
/// Push statements in definition order; `finish` validates operand ordering
/// and the single-list-target rule.
#[derive(Clone, Debug)]
pub struct BodyBuilder {
    name: Box<str>,
    shape: LaunchShape,
    backend: Backend,
    block_dim: u32,
    element_wise: bool,
    stmts: Vec<BodyStmt>,
}

impl BodyBuilder {
    /// Creates a builder for a kernel named `name` with the given shape.
    #[must_use]
    pub fn new(name: impl Into<Box<str>>, shape: LaunchShape) -> Self {
        Self {
            name: name.into(),
            shape,
            backend: Backend::Cpu,
            block_dim: 1,
            element_wise: false,
            stmts: Vec::new(),
        }
    }

    /// Sets the target backend.
    #[must_use]
    pub fn backend(mut self, backend: Backend) -> Self {
        self.backend = backend;
        self
    }

    /// Sets the launch block dimension.
    #[must_use]
    pub fn block_dim(mut self, block_dim: u32) -> Self {
        self.block_dim = block_dim;
        self
    }

    /// Declares every state access element-wise over the iteration domain.
    #[must_use]
    pub fn element_wise(mut self, element_wise: bool) -> Self {
        self.element_wise = element_wise;
        self
    }

    fn push(&mut self, stmt: BodyStmt) -> StmtId {
        let id = StmtId(u32::try_from(self.stmts.len()).unwrap_or(u32::MAX));
        self.stmts.push(stmt);
        id
    }

    /// Pushes a constant.
    pub fn constant(&mut self, value: ConstValue) -> StmtId {
        self.push(BodyStmt::Const { value })
    }

    /// Pushes a unary operation.
    pub fn unary(&mut self, op: UnaryOp, operand: StmtId) -> StmtId {
        self.push(BodyStmt::Unary { op, operand })
    }

    /// Pushes a binary operation.
    pub fn binary(&mut self, op: BinaryOp, lhs: StmtId, rhs: StmtId) -> StmtId {
        self.push(BodyStmt::Binary { op, lhs, rhs })
    }

    /// Pushes a state load.
    pub fn load(&mut self, state: AsyncState) -> StmtId {
        self.push(BodyStmt::Load { state })
    }

    /// Pushes a state store.
    pub fn store(&mut self, state: AsyncState, value: StmtId) {
        self.push(BodyStmt::Store { state, value });
    }

    /// Pushes an activation of the cells this task touches in `node`.
    pub fn activate(&mut self, node: SparseNodeId) {
        self.push(BodyStmt::Activate { node });
    }

    /// Pushes a mask clear for `node`.
    pub fn deactivate(&mut self, node: SparseNodeId) {
        self.push(BodyStmt::Deactivate { node });
    }

    /// Pushes a list regeneration for `node`.
    pub fn listgen(&mut self, node: SparseNodeId) {
        self.push(BodyStmt::ListGen { node });
    }

    /// Pushes an opaque host-observable effect.
    pub fn effect(&mut self, symbol: u32, value: Option<StmtId>) {
        self.push(BodyStmt::Effect { symbol, value });
    }

    /// Validates and returns the finished body.
    pub fn finish(self) -> Result<TaskBody, BodyError> {
        let mut list_target = None;
        for (i, stmt) in self.stmts.iter().enumerate() {
            for operand in stmt.operands().into_iter().flatten() {
                if operand.0 as usize >= i {
                    return Err(BodyError::OperandOutOfRange {
                        stmt: u32::try_from(i).unwrap_or(u32::MAX),
                        operand: operand.0,
                    });
                }
            }
            if let BodyStmt::ListGen { node } = stmt {
                if list_target.is_some_and(|t| t != *node) {
                    return Err(BodyError::MultipleListTargets);
                }
                list_target = Some(*node);
            }
        }
        Ok(TaskBody {
            name: self.name,
            shape: self.shape,
            backend: self.backend,
            block_dim: self.block_dim,
            element_wise: self.element_wise,
            stmts: self.stmts,
        })
    }
}
