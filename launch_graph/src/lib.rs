// Copyright 2026 the Launch Graph Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! `launch_graph`: a state-flow dependency graph and optimizer for
//! asynchronous compute-task pipelines.
//!
//! The graph sits between a kernel launcher and an execution engine. Each
//! submitted task is a launch record whose interned metadata declares the
//! abstract states it reads and writes; the graph turns the submission
//! stream into a DAG of flow (read-after-write) and dependency
//! (write-after-write, write-after-read) edges, runs semantics-preserving
//! optimizations over the pending window — task fusion, redundant
//! list-regeneration elimination, activation demotion and dead-store
//! elimination — and emits an equivalent topologically ordered record
//! sequence.
//!
//! ## Shape of the API
//!
//! - [`StateFlowGraph::insert_tasks`] ingests records in program order.
//! - The optimization passes ([`StateFlowGraph::fuse`],
//!   [`StateFlowGraph::optimize_listgen`],
//!   [`StateFlowGraph::demote_activation`],
//!   [`StateFlowGraph::optimize_dead_store`]) each return whether they
//!   changed the graph and leave it canonical (rebuilt and re-sorted).
//! - [`StateFlowGraph::extract_to_execute`] hands the surviving records to
//!   the engine in a topological order consistent with submission order.
//!
//! The graph is single-threaded; the shared [`launch_ir::IrBank`] it
//! consults guards its own interior mutability.

mod bitset;
mod dead_store;
mod demote;
mod edges;
mod fuse;
mod graph;
mod listgen;
mod node;
mod pretty;
#[cfg(test)]
mod testutil;

pub use bitset::BitSet;
pub use graph::{GraphConfig, StateFlowGraph};
pub use node::Node;
