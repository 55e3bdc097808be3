// Copyright 2026 the Launch Graph Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! `launch_ir`: a deduplicating store for compute-task bodies and metadata.
//!
//! Task bodies are small SSA-style statement lists over a shared namespace of
//! abstract states (value, list and mask states of sparse-layout nodes). The
//! [`IrBank`] interns bodies by content-addressed fingerprint, derives the
//! per-body [`TaskMeta`] (declared reads and writes plus optimization hints),
//! and provides the rewrites a downstream scheduler needs: body fusion,
//! activation demotion, store stripping and constant folding.
//!
//! The bank is shared between compiler threads and guards its own interior
//! mutability; handles returned from it are immutable shared references.

mod bank;
mod body;
mod fold;
mod meta;
mod state;

pub use bank::IrBank;
pub use body::{
    Backend, BinaryOp, BodyBuilder, BodyError, BodyFingerprint, BodyStmt, ConstValue, LaunchShape,
    ScalarType, StmtId, TaskBody, UnaryOp,
};
pub use fold::{EvalOp, EvaluatorCache, EvaluatorId};
pub use meta::{TaskLaunchRecord, TaskMeta, derive_meta};
pub use state::{AsyncState, SparseNodeId, SpaceError, StateKind, StateSpace};
