// Copyright 2026 the Launch Graph Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A small runnable `launch_graph` example.
//!
//! Shows:
//! - Building task bodies and submitting launches in program order
//! - Redundant list regenerations being filtered at submission
//! - Fusion, activation demotion and dead-store elimination at work
//! - The emitted order and a DOT dump of the final graph

use std::sync::Arc;

use launch_graph::StateFlowGraph;
use launch_ir::{
    AsyncState, BinaryOp, BodyBuilder, ConstValue, IrBank, LaunchShape, StateSpace,
    TaskLaunchRecord,
};

fn main() {
    let bank = Arc::new(IrBank::new());
    let space = Arc::new(StateSpace::new());

    // Layout: a sparse grid plus a scratch buffer the host never reads.
    let grid = space.add_root("grid");
    let scratch = space.add_root("scratch");
    space.set_host_visible(scratch, false).unwrap();

    let grid_v = AsyncState::value(grid);
    let scratch_v = AsyncState::value(scratch);

    // fill: activate the touched cells, then write 1.0 everywhere.
    let fill = {
        let mut b = BodyBuilder::new("fill", LaunchShape::StructFor { root: grid })
            .element_wise(true);
        b.activate(grid);
        let one = b.constant(ConstValue::F32(1.0));
        b.store(grid_v, one);
        TaskLaunchRecord::new(bank.intern(b.finish().unwrap()))
    };

    // scale: grid *= 2, element-wise over the same cells.
    let scale = {
        let mut b = BodyBuilder::new("scale", LaunchShape::RangeFor { begin: 0, end: 4096 })
            .element_wise(true);
        let v = b.load(grid_v);
        let two = b.constant(ConstValue::F32(2.0));
        let scaled = b.binary(BinaryOp::Mul, v, two);
        b.store(grid_v, scaled);
        TaskLaunchRecord::new(bank.intern(b.finish().unwrap()))
    };

    // shift: grid += 3, fusible with scale (same shape and domain).
    let shift = {
        let mut b = BodyBuilder::new("shift", LaunchShape::RangeFor { begin: 0, end: 4096 })
            .element_wise(true);
        let v = b.load(grid_v);
        let three = b.constant(ConstValue::F32(3.0));
        let shifted = b.binary(BinaryOp::Add, v, three);
        b.store(grid_v, shifted);
        TaskLaunchRecord::new(bank.intern(b.finish().unwrap()))
    };

    // stash: a scratch write nothing ever reads back.
    let stash = {
        let mut b = BodyBuilder::new("stash", LaunchShape::Serial);
        let v = b.load(grid_v);
        b.store(scratch_v, v);
        TaskLaunchRecord::new(bank.intern(b.finish().unwrap()))
    };

    let regen = {
        let mut b = BodyBuilder::new("regen", LaunchShape::Serial);
        b.listgen(grid);
        TaskLaunchRecord::new(bank.intern(b.finish().unwrap()))
    };

    let mut graph = StateFlowGraph::new(Arc::clone(&bank), Arc::clone(&space));

    // A frame worth of launches. The second regen is redundant, the second
    // fill re-activates cells the first fill already activated (and
    // overwrites the first fill's values unread), and stash is never read.
    graph.insert_tasks(
        &[
            fill.clone(),
            regen.clone(),
            regen.clone(),
            fill.clone(),
            scale.clone(),
            shift.clone(),
            stash.clone(),
        ],
        true,
    );
    println!("submitted: 7 launches, admitted: {}", graph.num_pending_tasks());

    let fused = graph.fuse();
    let listgen = graph.optimize_listgen();
    let demoted = graph.demote_activation();
    let dead = graph.optimize_dead_store();
    println!(
        "fuse: {fused}, listgen: {listgen}, demote: {demoted}, dead store: {dead}"
    );
    graph.verify(true);

    println!("\nfinal graph:\n{}", graph.dump());
    println!("dot:\n{}", graph.dump_dot(Some("LR"), 3));

    let emitted = graph.extract_to_execute();
    println!("emitted order:");
    for rec in &emitted {
        let meta = bank.meta(rec.body).unwrap();
        println!("  {}#{}", meta.name, rec.launch_id);
    }
}
