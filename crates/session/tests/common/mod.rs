use prost::Message;
use rustc_hash::FxHashSet;
use tfgraph_core::{
    node::InputRef,
    proto::{GraphDef, VersionDef},
    Tensor,
};
use tfgraph_session::{Engine, SessionError};

pub const PRODUCER: i32 = 1205;

/// Imports graphs the way a real engine validates them: names are unique and
/// every input refers to a node of the same graph.
#[derive(Default)]
pub struct MockEngine;

pub struct MockGraph(pub GraphDef);

impl Engine for MockEngine {
    type Graph = MockGraph;

    fn finalize_empty_graph(&self) -> Result<VersionDef, SessionError> {
        Ok(VersionDef {
            producer: PRODUCER,
            min_consumer: 0,
            bad_consumers: vec![],
        })
    }

    fn import_graph_def(&self, graph_def: &[u8], prefix: &str) -> Result<MockGraph, SessionError> {
        let mut graph = GraphDef::decode(graph_def)?;

        let mut names = FxHashSet::default();
        for node in &graph.node {
            if !names.insert(node.name.clone()) {
                return Err(SessionError::Engine(
                    format!("duplicate node {}", node.name).into(),
                ));
            }
        }
        for input in graph.node.iter().flat_map(|n| n.input.iter()) {
            let r = InputRef::parse(input);
            if !names.contains(r.node) {
                return Err(SessionError::Engine(
                    format!("input {input} refers to a missing node").into(),
                ));
            }
        }

        if !prefix.is_empty() {
            for node in &mut graph.node {
                node.name = format!("{prefix}/{}", node.name);
                for input in &mut node.input {
                    let prefixed = format!("{prefix}/{}", InputRef::parse(input).node);
                    *input = InputRef::parse(input).with_node(&prefixed).to_string();
                }
            }
        }
        Ok(MockGraph(graph))
    }

    fn export_graph_def(&self, graph: &MockGraph) -> Result<Vec<u8>, SessionError> {
        Ok(graph.0.encode_to_vec())
    }

    fn run_constant(&self, graph: &MockGraph, name: &str) -> Result<Tensor, SessionError> {
        Ok(graph.0.get_node(name)?.constant_value()?)
    }
}
