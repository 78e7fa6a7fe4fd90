//! Graphviz output for graph documents.
//!
//! Every node gets one declaration line followed by one edge line per input:
//!
//! ```text
//! "x" [fillcolor="aquamarine3", style="filled", label="x"]
//! "mul" [label="mul"]
//! "x" -> "mul"
//! ```

use std::fmt;

use crate::{
    node::{CONST_OP, PLACEHOLDER_OP},
    proto::GraphDef,
};

fn fill_color(op: &str) -> Option<&'static str> {
    match op {
        CONST_OP => Some("aquamarine3"),
        PLACEHOLDER_OP => Some("antiquewhite3"),
        _ => None,
    }
}

struct Dot<'a>(&'a GraphDef);

impl fmt::Display for Dot<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for node in &self.0.node {
            let name = &node.name;
            match fill_color(&node.op) {
                Some(color) => writeln!(
                    f,
                    "\"{name}\" [fillcolor=\"{color}\", style=\"filled\", label=\"{name}\"]"
                )?,
                None => writeln!(f, "\"{name}\" [label=\"{name}\"]")?,
            }
            for input in &node.input {
                writeln!(f, "\"{input}\" -> \"{name}\"")?;
            }
        }
        Ok(())
    }
}

impl GraphDef {
    pub fn to_dot(&self) -> String {
        Dot(self).to_string()
    }
}

#[test]
fn dot_styles() {
    use crate::proto::{DataType, NodeDef};

    let mut graph = GraphDef::default();
    graph.set_nodes([
        NodeDef::placeholder("in", DataType::DtFloat),
        NodeDef::new("neg", "Neg").with_input("in"),
    ]);
    assert_eq!(
        graph.to_dot(),
        "\"in\" [fillcolor=\"antiquewhite3\", style=\"filled\", label=\"in\"]\n\
         \"neg\" [label=\"neg\"]\n\
         \"in\" -> \"neg\"\n"
    );
    assert_eq!(GraphDef::default().to_dot(), "");
}
