pub mod opt;
pub mod run;

use std::io;

use thiserror::Error;
use tfgraph_core::{
    graph::GraphError, proto::VersionDef, selector::SelectorError, tensor::TensorError, Tensor,
};
use tfgraph_session::{Engine, SessionError};

pub use opt::Opt;
pub use run::run;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("No input given, pass a filename or - for stdin")]
    MissingInput,

    #[error("Invalid output format {0}, specify pb, pbtxt, json or dot")]
    OutputFormat(String),

    #[error("{0}")]
    Selector(#[from] SelectorError),

    #[error("{0}")]
    Graph(#[from] GraphError),

    #[error("{0}")]
    Session(#[from] SessionError),

    #[error("Failed to parse tensor: {0}")]
    Tensor(#[from] TensorError),

    #[error("Failed to serialize output: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Io: {0}")]
    Io(#[from] io::Error),
}

/// Stands in for an engine when the tool is built without the `tensorflow`
/// feature. Every operation fails with [`SessionError::Unsupported`].
#[derive(Debug, Default, Clone, Copy)]
pub struct NoEngine;

impl NoEngine {
    fn unsupported<T>() -> Result<T, SessionError> {
        Err(SessionError::Unsupported(
            "tf-graph-tool was built without the tensorflow feature".into(),
        ))
    }
}

impl Engine for NoEngine {
    type Graph = ();

    fn finalize_empty_graph(&self) -> Result<VersionDef, SessionError> {
        Self::unsupported()
    }

    fn import_graph_def(&self, _: &[u8], _: &str) -> Result<(), SessionError> {
        Self::unsupported()
    }

    fn export_graph_def(&self, _: &()) -> Result<Vec<u8>, SessionError> {
        Self::unsupported()
    }

    fn run_constant(&self, _: &(), _: &str) -> Result<Tensor, SessionError> {
        Self::unsupported()
    }
}
