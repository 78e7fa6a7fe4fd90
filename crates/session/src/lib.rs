use std::{borrow::Cow, time::Instant};

use prost::{DecodeError, Message};
use tfgraph_core::{
    graph::GraphError,
    node::CONST_OP,
    proto::{GraphDef, VersionDef},
    tensor::{Tensor, TensorError},
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    /// Failures reported by the engine itself.
    #[error("Engine: {0}")]
    Engine(Cow<'static, str>),

    #[error("Graph: {0}")]
    Graph(#[from] GraphError),

    #[error("Tensor: {0}")]
    Tensor(#[from] TensorError),

    #[error("Failed to decode graph exported by the engine: {0}")]
    Decode(#[from] DecodeError),

    #[error("Unsupported: {0}")]
    Unsupported(Cow<'static, str>),
}

/// The parts of a computation engine that graph documents depend on.
pub trait Engine {
    type Graph;

    /// Versions the engine records when it finalizes an empty graph.
    fn finalize_empty_graph(&self) -> Result<VersionDef, SessionError>;

    /// Imports a binary graph. A non-empty `prefix` is prepended as `prefix/`
    /// to every node name and to every input referring to those nodes.
    fn import_graph_def(&self, graph_def: &[u8], prefix: &str)
        -> Result<Self::Graph, SessionError>;

    fn export_graph_def(&self, graph: &Self::Graph) -> Result<Vec<u8>, SessionError>;

    /// Fetches the first output of node `name` without feeding anything.
    fn run_constant(&self, graph: &Self::Graph, name: &str) -> Result<Tensor, SessionError>;
}

/// Graph document operations that need an engine.
pub trait GraphDefExt: Sized {
    /// An empty document carrying the engine's version metadata.
    fn new_with_versions<E: Engine>(engine: &E) -> Result<Self, SessionError>;

    /// Prefixes all node names and the references to them. The document is
    /// only replaced once the whole engine round trip succeeded.
    fn apply_prefix<E: Engine>(&mut self, engine: &E, prefix: &str) -> Result<(), SessionError>;

    fn export<E: Engine>(&self, engine: &E, prefix: &str) -> Result<E::Graph, SessionError>;

    fn import<E: Engine>(&mut self, engine: &E, graph: &E::Graph) -> Result<(), SessionError>;
}

impl GraphDefExt for GraphDef {
    fn new_with_versions<E: Engine>(engine: &E) -> Result<Self, SessionError> {
        Ok(GraphDef {
            versions: Some(engine.finalize_empty_graph()?),
            ..Default::default()
        })
    }

    fn apply_prefix<E: Engine>(&mut self, engine: &E, prefix: &str) -> Result<(), SessionError> {
        let start = Instant::now();
        let graph = self.export(engine, prefix)?;
        let prefixed = GraphDef::decode(&*engine.export_graph_def(&graph)?)?;
        log::info!(
            "Prefixed {} nodes with {prefix}/ in {:?}",
            prefixed.node.len(),
            start.elapsed()
        );
        *self = prefixed;
        Ok(())
    }

    fn export<E: Engine>(&self, engine: &E, prefix: &str) -> Result<E::Graph, SessionError> {
        engine.import_graph_def(&self.encode_to_vec(), prefix)
    }

    fn import<E: Engine>(&mut self, engine: &E, graph: &E::Graph) -> Result<(), SessionError> {
        *self = GraphDef::decode(&*engine.export_graph_def(graph)?)?;
        Ok(())
    }
}

/// Materializes the value of the `Const` node `name` through the engine.
pub fn run_constant_node<E: Engine>(
    graph_def: &GraphDef,
    engine: &E,
    name: &str,
) -> Result<Tensor, SessionError> {
    let node = graph_def.get_node(name)?;
    if !node.is_constant() {
        return Err(SessionError::Unsupported(
            format!(
                "node {name} is a {} node, only {CONST_OP} nodes can be run",
                node.op
            )
            .into(),
        ));
    }

    let start = Instant::now();
    let graph = graph_def.export(engine, "")?;
    let tensor = engine.run_constant(&graph, name)?;
    log::info!("Ran {name} in {:?}", start.elapsed());
    Ok(tensor)
}
