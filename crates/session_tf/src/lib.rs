use std::time::Instant;

use prost::Message;
use tensorflow::{
    DataType, Graph, ImportGraphDefOptions, Session, SessionOptions, SessionRunArgs, Status,
    TensorType,
};
use tfgraph_core::{
    proto::{self, VersionDef},
    tensor::{Tensor, TensorElemTypeExt},
};
use tfgraph_session::{Engine, SessionError};

/// Engine backed by the TensorFlow C library.
pub struct TfEngine {
    options: SessionOptions,
}

impl Default for TfEngine {
    fn default() -> Self {
        Self {
            options: SessionOptions::new(),
        }
    }
}

impl TfEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: SessionOptions) -> Self {
        Self { options }
    }

    fn fetch(&self, graph: &Graph, name: &str) -> Result<Tensor, SessionError> {
        let op = graph.operation_by_name_required(name).map_err(engine_err)?;
        let ty = op.output_type(0);
        let mut session = Session::new(&self.options, graph).map_err(engine_err)?;

        let mut args = SessionRunArgs::new();
        let token = args.request_fetch(&op, 0);
        let fetched = session.run(&mut args).map_err(engine_err).and_then(|()| {
            macro_rules! fetch {
                ($ty:ty) => {{
                    let t = args.fetch::<$ty>(token).map_err(engine_err)?;
                    to_tensor(&t)
                }};
            }
            match ty {
                DataType::Bool => fetch!(bool),
                DataType::Int8 => fetch!(i8),
                DataType::Int16 => fetch!(i16),
                DataType::Int32 => fetch!(i32),
                DataType::Int64 => fetch!(i64),
                DataType::UInt8 => fetch!(u8),
                DataType::UInt16 => fetch!(u16),
                DataType::UInt32 => fetch!(u32),
                DataType::UInt64 => fetch!(u64),
                DataType::Float => fetch!(f32),
                DataType::Double => fetch!(f64),
                DataType::String => fetch!(String),
                ty => Err(SessionError::Unsupported(
                    format!("cannot fetch values of type {ty:?}").into(),
                )),
            }
        });

        let closed = session.close().map_err(engine_err);
        let tensor = fetched?;
        closed?;
        Ok(tensor)
    }
}

impl Engine for TfEngine {
    type Graph = Graph;

    fn finalize_empty_graph(&self) -> Result<VersionDef, SessionError> {
        let buf = Graph::new().graph_def().map_err(engine_err)?;
        Ok(proto::GraphDef::decode(&*buf)?
            .versions
            .unwrap_or_default())
    }

    fn import_graph_def(&self, graph_def: &[u8], prefix: &str) -> Result<Graph, SessionError> {
        let mut options = ImportGraphDefOptions::new();
        if !prefix.is_empty() {
            options.set_prefix(prefix).map_err(engine_err)?;
        }
        let mut graph = Graph::new();
        graph
            .import_graph_def(graph_def, &options)
            .map_err(engine_err)?;
        log::debug!("Imported {} bytes with prefix {prefix:?}", graph_def.len());
        Ok(graph)
    }

    fn export_graph_def(&self, graph: &Graph) -> Result<Vec<u8>, SessionError> {
        graph.graph_def().map_err(engine_err)
    }

    fn run_constant(&self, graph: &Graph, name: &str) -> Result<Tensor, SessionError> {
        let start = Instant::now();
        let tensor = self.fetch(graph, name)?;
        log::debug!("Fetched {name} in {:?}", start.elapsed());
        Ok(tensor)
    }
}

fn engine_err(status: Status) -> SessionError {
    SessionError::Engine(status.to_string().into())
}

fn to_tensor<T: TensorType + TensorElemTypeExt>(
    t: &tensorflow::Tensor<T>,
) -> Result<Tensor, SessionError> {
    let dims: Vec<usize> = t.dims().iter().map(|&d| d as usize).collect();
    Ok(Tensor::from_engine_data(dims, T::into_data(t.to_vec()))?)
}
