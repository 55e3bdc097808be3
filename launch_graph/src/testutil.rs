// Copyright 2026 the Launch Graph Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Shared helpers for unit tests: a bank/layout context and small body
//! factories.

use std::sync::Arc;

use launch_ir::{
    AsyncState, BinaryOp, BodyBuilder, ConstValue, IrBank, LaunchShape, SparseNodeId, StateSpace,
    TaskLaunchRecord,
};

use crate::graph::StateFlowGraph;

pub(crate) struct Ctx {
    pub(crate) bank: Arc<IrBank>,
    pub(crate) space: Arc<StateSpace>,
}

impl Ctx {
    pub(crate) fn new() -> Self {
        Self {
            bank: Arc::new(IrBank::new()),
            space: Arc::new(StateSpace::new()),
        }
    }

    pub(crate) fn graph(&self) -> StateFlowGraph {
        StateFlowGraph::new(Arc::clone(&self.bank), Arc::clone(&self.space))
    }

    /// Serial task storing a constant into `out`.
    pub(crate) fn writer(&self, name: &str, out: AsyncState) -> TaskLaunchRecord {
        let mut b = BodyBuilder::new(name, LaunchShape::Serial);
        let c = b.constant(ConstValue::I64(1));
        b.store(out, c);
        TaskLaunchRecord::new(self.bank.intern(b.finish().unwrap()))
    }

    /// Serial task copying `input` into `out`.
    pub(crate) fn reader(
        &self,
        name: &str,
        input: AsyncState,
        out: AsyncState,
    ) -> TaskLaunchRecord {
        let mut b = BodyBuilder::new(name, LaunchShape::Serial);
        let v = b.load(input);
        b.store(out, v);
        TaskLaunchRecord::new(self.bank.intern(b.finish().unwrap()))
    }

    /// Serial task reading `input` into a host-observable effect.
    pub(crate) fn pure_reader(&self, name: &str, input: AsyncState) -> TaskLaunchRecord {
        let mut b = BodyBuilder::new(name, LaunchShape::Serial);
        let v = b.load(input);
        b.effect(0, Some(v));
        TaskLaunchRecord::new(self.bank.intern(b.finish().unwrap()))
    }

    /// Element-wise range-for task writing `v` into `out`.
    pub(crate) fn elementwise_writer(
        &self,
        name: &str,
        out: AsyncState,
        v: i64,
    ) -> TaskLaunchRecord {
        let mut b = BodyBuilder::new(name, LaunchShape::RangeFor { begin: 0, end: 64 })
            .element_wise(true);
        let c = b.constant(ConstValue::I64(v));
        b.store(out, c);
        TaskLaunchRecord::new(self.bank.intern(b.finish().unwrap()))
    }

    /// Element-wise range-for task computing `out = input + v`.
    pub(crate) fn elementwise_incr(
        &self,
        name: &str,
        input: AsyncState,
        out: AsyncState,
        v: i64,
    ) -> TaskLaunchRecord {
        let mut b = BodyBuilder::new(name, LaunchShape::RangeFor { begin: 0, end: 64 })
            .element_wise(true);
        let x = b.load(input);
        let c = b.constant(ConstValue::I64(v));
        let sum = b.binary(BinaryOp::Add, x, c);
        b.store(out, sum);
        TaskLaunchRecord::new(self.bank.intern(b.finish().unwrap()))
    }

    /// List-regeneration task for `node`.
    pub(crate) fn listgen(&self, name: &str, node: SparseNodeId) -> TaskLaunchRecord {
        let mut b = BodyBuilder::new(name, LaunchShape::Serial);
        b.listgen(node);
        TaskLaunchRecord::new(self.bank.intern(b.finish().unwrap()))
    }

    /// Struct-for task activating `node`'s touched cells, then writing.
    pub(crate) fn activating_fill(&self, name: &str, node: SparseNodeId) -> TaskLaunchRecord {
        let mut b = BodyBuilder::new(name, LaunchShape::StructFor { root: node })
            .element_wise(true);
        b.activate(node);
        let c = b.constant(ConstValue::F32(1.0));
        b.store(AsyncState::value(node), c);
        TaskLaunchRecord::new(self.bank.intern(b.finish().unwrap()))
    }

    /// Serial task clearing `node`'s mask.
    pub(crate) fn deactivator(&self, name: &str, node: SparseNodeId) -> TaskLaunchRecord {
        let mut b = BodyBuilder::new(name, LaunchShape::Serial);
        b.deactivate(node);
        TaskLaunchRecord::new(self.bank.intern(b.finish().unwrap()))
    }
}

/// Task names of `records`, resolved through the graph's bank.
pub(crate) fn names(graph: &StateFlowGraph, records: &[TaskLaunchRecord]) -> Vec<String> {
    records
        .iter()
        .map(|r| graph.bank().meta(r.body).unwrap().name.to_string())
        .collect()
}

/// Names of the pending nodes in list order.
pub(crate) fn pending_names(graph: &StateFlowGraph) -> Vec<String> {
    graph
        .get_pending_tasks()
        .iter()
        .map(|n| n.meta().name.to_string())
        .collect()
}
