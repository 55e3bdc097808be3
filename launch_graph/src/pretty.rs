// Copyright 2026 the Launch Graph Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Pretty-printing and Graphviz DOT export for [`StateFlowGraph`].

use std::fmt::Write;

use launch_ir::AsyncState;

use crate::graph::StateFlowGraph;

fn escape_label(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 8);
    for ch in value.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            _ => out.push(ch),
        }
    }
    out
}

impl StateFlowGraph {
    fn state_label(&self, state: AsyncState) -> String {
        format!("{}${}", self.space.name(state.node), state.kind.label())
    }

    /// Renders the graph as Graphviz DOT.
    ///
    /// Each node carries its kernel name and launch id. When a task has
    /// fewer than `embed_states_threshold` output states, the state labels
    /// are embedded in the node; otherwise they annotate the outgoing
    /// edges. Flow edges render solid, dependency edges dashed; executed
    /// nodes are filled.
    #[must_use]
    pub fn dump_dot(&self, rankdir: Option<&str>, embed_states_threshold: usize) -> String {
        let mut dot = String::from("digraph state_flow_graph {\n");
        if let Some(rankdir) = rankdir {
            let _ = writeln!(dot, "\trankdir={rankdir};");
        }
        dot.push_str(
            "\tnode [shape=box, fontname=\"monospace\", fontsize=10];\n\
             \tedge [fontname=\"monospace\", fontsize=9, arrowsize=0.7];\n",
        );

        for (id, node) in self.nodes.iter().enumerate() {
            let embed = node.meta.output_states.len() < embed_states_threshold;
            let mut label = node.describe();
            if embed && !node.meta.output_states.is_empty() {
                for &s in &node.meta.output_states {
                    label.push('\n');
                    label.push_str(&self.state_label(s));
                }
            }
            let style = if node.executed() {
                ", style=filled, fillcolor=\"gray88\""
            } else {
                ""
            };
            let _ = writeln!(dot, "  n{id} [label=\"{}\"{style}];", escape_label(&label));
        }

        for (from, node) in self.nodes.iter().enumerate() {
            let embed = node.meta.output_states.len() < embed_states_threshold;
            for (s, set) in node.output_edges.iter() {
                for to in set.iter() {
                    let flow = node.has_state_flow(s, &self.nodes[to as usize]);
                    let mut attrs: Vec<String> = Vec::new();
                    if !flow {
                        attrs.push("style=dashed".to_string());
                    }
                    if !embed {
                        attrs.push(format!(
                            "label=\"{}\"",
                            escape_label(&self.state_label(s))
                        ));
                    }
                    if attrs.is_empty() {
                        let _ = writeln!(dot, "  n{from} -> n{to};");
                    } else {
                        let _ = writeln!(dot, "  n{from} -> n{to} [{}];", attrs.join(", "));
                    }
                }
            }
        }

        dot.push_str("}\n");
        dot
    }

    /// A line-per-node textual dump of the graph.
    #[must_use]
    pub fn dump(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "state flow graph: {} nodes, {} pending",
            self.size(),
            self.num_pending_tasks()
        );
        for node in &self.nodes {
            let status = match node.pending_node_id() {
                Some(p) => format!("pending {p}"),
                None => "executed".to_string(),
            };
            let inputs: Vec<String> = node
                .meta
                .input_states
                .iter()
                .map(|&s| self.state_label(s))
                .collect();
            let outputs: Vec<String> = node
                .meta
                .output_states
                .iter()
                .map(|&s| self.state_label(s))
                .collect();
            let _ = writeln!(
                out,
                "  [{:>3} {status}] {} | in: {} | out: {}",
                node.node_id(),
                node.describe(),
                inputs.join(", "),
                outputs.join(", "),
            );
        }
        out
    }

    /// Prints [`StateFlowGraph::dump`] to stdout.
    pub fn print(&self) {
        println!("{}", self.dump());
    }
}

#[cfg(test)]
mod tests {
    use crate::testutil::Ctx;
    use launch_ir::AsyncState;

    #[test]
    fn dot_embeds_states_under_the_threshold() {
        let ctx = Ctx::new();
        let s1 = AsyncState::value(ctx.space.add_root("s1"));
        let s2 = AsyncState::value(ctx.space.add_root("s2"));
        let mut g = ctx.graph();
        g.insert_tasks(&[ctx.writer("a", s1), ctx.reader("r", s1, s2)], false);

        let dot = g.dump_dot(Some("LR"), 4);
        assert!(dot.contains("digraph state_flow_graph {"));
        assert!(dot.contains("rankdir=LR;"));
        assert!(dot.contains("a#0\\ns1$value"));
        // Flow edge a→r is solid and unlabeled when states are embedded.
        assert!(dot.contains("  n1 -> n2;"));
    }

    #[test]
    fn dot_labels_edges_when_states_are_not_embedded() {
        let ctx = Ctx::new();
        let s1 = AsyncState::value(ctx.space.add_root("s1"));
        let mut g = ctx.graph();
        g.insert_tasks(&[ctx.writer("a", s1), ctx.writer("b", s1)], false);

        let dot = g.dump_dot(None, 0);
        assert!(!dot.contains("rankdir"));
        // Write-after-write is a dependency edge: dashed, with a state label.
        assert!(dot.contains("n1 -> n2 [style=dashed, label=\"s1$value\"];"));
    }

    #[test]
    fn dump_reports_every_node_with_status() {
        let ctx = Ctx::new();
        let s1 = AsyncState::value(ctx.space.add_root("s1"));
        let mut g = ctx.graph();
        g.insert_tasks(&[ctx.writer("a", s1)], false);

        let text = g.dump();
        assert!(text.contains("2 nodes, 1 pending"));
        assert!(text.contains("initial_state"));
        assert!(text.contains("pending 0] a#0"));

        g.extract_to_execute();
        assert!(g.dump().contains("executed] a#0"));
    }
}
