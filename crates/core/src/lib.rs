pub mod attr;
pub mod dot;
pub mod graph;
pub mod json;
pub mod node;
pub mod proto;
pub mod selector;
pub mod shape;
pub mod tensor;
pub mod text;

pub use graph::{GraphError, GraphFormat};
pub use proto::{GraphDef, NodeDef};
pub use tensor::Tensor;
