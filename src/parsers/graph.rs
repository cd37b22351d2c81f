//! `show vlib graph` node names.
//!
//! The graph lists every registered node, including nodes that never ran
//! and so are missing from `show runtime`. A node starts a line in the
//! first column; its further next/previous arcs are indented.

use super::interfaces::first_column_names;

pub fn parse_graph_node_names(text: &str) -> Vec<String> {
    first_column_names(text, "Name")
}
