//! Message types of the engine's graph schema.
//!
//! Field numbers follow `graph.proto`, `node_def.proto`, `function.proto`,
//! `op_def.proto`, `attr_value.proto`, `tensor.proto`, `tensor_shape.proto`,
//! `resource_handle.proto`, `full_type.proto`, `graph_debug_info.proto`,
//! `types.proto` and `versions.proto` so that the binary encoding is
//! exchangeable with the engine itself.

use std::collections::BTreeMap;

/// A serialized computation graph.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GraphDef {
    #[prost(message, repeated, tag = "1")]
    pub node: Vec<NodeDef>,
    #[prost(message, optional, tag = "4")]
    pub versions: Option<VersionDef>,
    /// Deprecated single version number, superseded by `versions`.
    #[prost(int32, tag = "3")]
    pub version: i32,
    #[prost(message, optional, tag = "2")]
    pub library: Option<FunctionDefLibrary>,
    #[prost(message, optional, tag = "5")]
    pub debug_info: Option<GraphDebugInfo>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct NodeDef {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(string, tag = "2")]
    pub op: String,
    #[prost(string, repeated, tag = "3")]
    pub input: Vec<String>,
    #[prost(string, tag = "4")]
    pub device: String,
    #[prost(btree_map = "string, message", tag = "5")]
    pub attr: BTreeMap<String, AttrValue>,
    #[prost(message, optional, tag = "6")]
    pub experimental_debug_info: Option<node_def::ExperimentalDebugInfo>,
    #[prost(message, optional, tag = "7")]
    pub experimental_type: Option<FullTypeDef>,
}

pub mod node_def {
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct ExperimentalDebugInfo {
        #[prost(string, repeated, tag = "1")]
        pub original_node_names: Vec<String>,
        #[prost(string, repeated, tag = "2")]
        pub original_func_names: Vec<String>,
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct VersionDef {
    #[prost(int32, tag = "1")]
    pub producer: i32,
    #[prost(int32, tag = "2")]
    pub min_consumer: i32,
    #[prost(int32, repeated, tag = "3")]
    pub bad_consumers: Vec<i32>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FunctionDefLibrary {
    #[prost(message, repeated, tag = "1")]
    pub function: Vec<FunctionDef>,
    #[prost(message, repeated, tag = "2")]
    pub gradient: Vec<GradientDef>,
    #[prost(message, repeated, tag = "3")]
    pub registered_gradients: Vec<RegisteredGradient>,
}

impl FunctionDefLibrary {
    pub fn is_empty(&self) -> bool {
        self.function.is_empty() && self.gradient.is_empty() && self.registered_gradients.is_empty()
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FunctionDef {
    #[prost(message, optional, tag = "1")]
    pub signature: Option<OpDef>,
    #[prost(btree_map = "string, message", tag = "5")]
    pub attr: BTreeMap<String, AttrValue>,
    #[prost(btree_map = "uint32, message", tag = "7")]
    pub arg_attr: BTreeMap<u32, function_def::ArgAttrs>,
    #[prost(btree_map = "uint32, uint32", tag = "8")]
    pub resource_arg_unique_id: BTreeMap<u32, u32>,
    #[prost(message, repeated, tag = "3")]
    pub node_def: Vec<NodeDef>,
    #[prost(btree_map = "string, string", tag = "4")]
    pub ret: BTreeMap<String, String>,
    #[prost(btree_map = "string, string", tag = "6")]
    pub control_ret: BTreeMap<String, String>,
}

pub mod function_def {
    use std::collections::BTreeMap;

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct ArgAttrs {
        #[prost(btree_map = "string, message", tag = "1")]
        pub attr: BTreeMap<String, super::AttrValue>,
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GradientDef {
    #[prost(string, tag = "1")]
    pub function_name: String,
    #[prost(string, tag = "2")]
    pub gradient_func: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RegisteredGradient {
    #[prost(string, tag = "1")]
    pub gradient_func: String,
    #[prost(string, tag = "2")]
    pub registered_op_type: String,
}

/// Signature of an operation or a library function.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct OpDef {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(message, repeated, tag = "2")]
    pub input_arg: Vec<op_def::ArgDef>,
    #[prost(message, repeated, tag = "3")]
    pub output_arg: Vec<op_def::ArgDef>,
    #[prost(string, repeated, tag = "20")]
    pub control_output: Vec<String>,
    #[prost(message, repeated, tag = "4")]
    pub attr: Vec<op_def::AttrDef>,
    #[prost(message, optional, tag = "8")]
    pub deprecation: Option<OpDeprecation>,
    #[prost(string, tag = "5")]
    pub summary: String,
    #[prost(string, tag = "6")]
    pub description: String,
    #[prost(bool, tag = "18")]
    pub is_commutative: bool,
    #[prost(bool, tag = "16")]
    pub is_aggregate: bool,
    #[prost(bool, tag = "17")]
    pub is_stateful: bool,
    #[prost(bool, tag = "19")]
    pub allows_uninitialized_input: bool,
    #[prost(bool, tag = "21")]
    pub is_distributed_communication: bool,
}

pub mod op_def {
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct ArgDef {
        #[prost(string, tag = "1")]
        pub name: String,
        #[prost(string, tag = "2")]
        pub description: String,
        #[prost(enumeration = "super::DataType", tag = "3")]
        pub r#type: i32,
        #[prost(string, tag = "4")]
        pub type_attr: String,
        #[prost(string, tag = "5")]
        pub number_attr: String,
        #[prost(string, tag = "6")]
        pub type_list_attr: String,
        #[prost(message, repeated, tag = "7")]
        pub handle_data: Vec<super::resource_handle_proto::DtypeAndShape>,
        #[prost(bool, tag = "16")]
        pub is_ref: bool,
        #[prost(message, optional, tag = "17")]
        pub experimental_full_type: Option<super::FullTypeDef>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct AttrDef {
        #[prost(string, tag = "1")]
        pub name: String,
        #[prost(string, tag = "2")]
        pub r#type: String,
        #[prost(message, optional, tag = "3")]
        pub default_value: Option<super::AttrValue>,
        #[prost(string, tag = "4")]
        pub description: String,
        #[prost(bool, tag = "5")]
        pub has_minimum: bool,
        #[prost(int64, tag = "6")]
        pub minimum: i64,
        #[prost(message, optional, tag = "7")]
        pub allowed_values: Option<super::AttrValue>,
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct OpDeprecation {
    #[prost(int32, tag = "1")]
    pub version: i32,
    #[prost(string, tag = "2")]
    pub explanation: String,
}

/// Type information attached to nodes and arguments by newer producers.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FullTypeDef {
    /// A `FullTypeId` value, see [`full_type_name`].
    #[prost(int32, tag = "1")]
    pub type_id: i32,
    #[prost(message, repeated, tag = "2")]
    pub args: Vec<FullTypeDef>,
    #[prost(oneof = "full_type_def::Attr", tags = "3, 4")]
    pub attr: Option<full_type_def::Attr>,
}

pub mod full_type_def {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Attr {
        #[prost(string, tag = "3")]
        S(String),
        #[prost(int64, tag = "4")]
        I(i64),
    }
}

/// Source locations of the ops in a graph.
///
/// Location fields are explicitly optional so that values equal to zero
/// survive a decode/encode cycle with either schema revision.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GraphDebugInfo {
    #[prost(string, repeated, tag = "1")]
    pub files: Vec<String>,
    #[prost(btree_map = "fixed64, message", tag = "4")]
    pub frames_by_id: BTreeMap<u64, graph_debug_info::FileLineCol>,
    #[prost(btree_map = "fixed64, message", tag = "6")]
    pub traces_by_id: BTreeMap<u64, graph_debug_info::StackTrace>,
    #[prost(btree_map = "string, message", tag = "2")]
    pub traces: BTreeMap<String, graph_debug_info::StackTrace>,
    #[prost(btree_map = "string, fixed64", tag = "5")]
    pub name_to_trace_id: BTreeMap<String, u64>,
}

pub mod graph_debug_info {
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct FileLineCol {
        #[prost(int32, optional, tag = "1")]
        pub file_index: Option<i32>,
        #[prost(int32, optional, tag = "2")]
        pub line: Option<i32>,
        #[prost(int32, optional, tag = "3")]
        pub col: Option<i32>,
        #[prost(string, optional, tag = "4")]
        pub func: Option<String>,
        #[prost(string, optional, tag = "5")]
        pub code: Option<String>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct StackTrace {
        #[prost(message, repeated, tag = "1")]
        pub file_line_cols: Vec<FileLineCol>,
        #[prost(fixed64, repeated, tag = "2")]
        pub frame_id: Vec<u64>,
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AttrValue {
    #[prost(oneof = "attr_value::Value", tags = "2, 3, 4, 5, 6, 7, 8, 1, 10, 9")]
    pub value: Option<attr_value::Value>,
}

pub mod attr_value {
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct ListValue {
        #[prost(bytes = "vec", repeated, tag = "2")]
        pub s: Vec<Vec<u8>>,
        #[prost(int64, repeated, tag = "3")]
        pub i: Vec<i64>,
        #[prost(float, repeated, tag = "4")]
        pub f: Vec<f32>,
        #[prost(bool, repeated, tag = "5")]
        pub b: Vec<bool>,
        #[prost(enumeration = "super::DataType", repeated, tag = "6")]
        pub r#type: Vec<i32>,
        #[prost(message, repeated, tag = "7")]
        pub shape: Vec<super::TensorShapeProto>,
        #[prost(message, repeated, tag = "8")]
        pub tensor: Vec<super::TensorProto>,
        #[prost(message, repeated, tag = "9")]
        pub func: Vec<super::NameAttrList>,
    }

    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Value {
        #[prost(bytes, tag = "2")]
        S(Vec<u8>),
        #[prost(int64, tag = "3")]
        I(i64),
        #[prost(float, tag = "4")]
        F(f32),
        #[prost(bool, tag = "5")]
        B(bool),
        #[prost(enumeration = "super::DataType", tag = "6")]
        Type(i32),
        #[prost(message, tag = "7")]
        Shape(super::TensorShapeProto),
        #[prost(message, tag = "8")]
        Tensor(super::TensorProto),
        #[prost(message, tag = "1")]
        List(ListValue),
        #[prost(message, tag = "10")]
        Func(super::NameAttrList),
        #[prost(string, tag = "9")]
        Placeholder(String),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct NameAttrList {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(btree_map = "string, message", tag = "2")]
    pub attr: BTreeMap<String, AttrValue>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TensorProto {
    #[prost(enumeration = "DataType", tag = "1")]
    pub dtype: i32,
    #[prost(message, optional, tag = "2")]
    pub tensor_shape: Option<TensorShapeProto>,
    #[prost(int32, tag = "3")]
    pub version_number: i32,
    #[prost(bytes = "vec", tag = "4")]
    pub tensor_content: Vec<u8>,
    #[prost(int32, repeated, tag = "13")]
    pub half_val: Vec<i32>,
    #[prost(float, repeated, tag = "5")]
    pub float_val: Vec<f32>,
    #[prost(double, repeated, tag = "6")]
    pub double_val: Vec<f64>,
    #[prost(int32, repeated, tag = "7")]
    pub int_val: Vec<i32>,
    #[prost(bytes = "vec", repeated, tag = "8")]
    pub string_val: Vec<Vec<u8>>,
    #[prost(float, repeated, tag = "9")]
    pub scomplex_val: Vec<f32>,
    #[prost(int64, repeated, tag = "10")]
    pub int64_val: Vec<i64>,
    #[prost(bool, repeated, tag = "11")]
    pub bool_val: Vec<bool>,
    #[prost(double, repeated, tag = "12")]
    pub dcomplex_val: Vec<f64>,
    #[prost(message, repeated, tag = "14")]
    pub resource_handle_val: Vec<ResourceHandleProto>,
    #[prost(message, repeated, tag = "15")]
    pub variant_val: Vec<VariantTensorDataProto>,
    #[prost(uint32, repeated, tag = "16")]
    pub uint32_val: Vec<u32>,
    #[prost(uint64, repeated, tag = "17")]
    pub uint64_val: Vec<u64>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ResourceHandleProto {
    #[prost(string, tag = "1")]
    pub device: String,
    #[prost(string, tag = "2")]
    pub container: String,
    #[prost(string, tag = "3")]
    pub name: String,
    #[prost(uint64, tag = "4")]
    pub hash_code: u64,
    #[prost(string, tag = "5")]
    pub maybe_type_name: String,
    #[prost(message, repeated, tag = "6")]
    pub dtypes_and_shapes: Vec<resource_handle_proto::DtypeAndShape>,
}

pub mod resource_handle_proto {
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct DtypeAndShape {
        #[prost(enumeration = "super::DataType", tag = "1")]
        pub dtype: i32,
        #[prost(message, optional, tag = "2")]
        pub shape: Option<super::TensorShapeProto>,
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct VariantTensorDataProto {
    #[prost(string, tag = "1")]
    pub type_name: String,
    #[prost(bytes = "vec", tag = "2")]
    pub metadata: Vec<u8>,
    #[prost(message, repeated, tag = "3")]
    pub tensors: Vec<TensorProto>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TensorShapeProto {
    #[prost(message, repeated, tag = "2")]
    pub dim: Vec<tensor_shape_proto::Dim>,
    #[prost(bool, tag = "3")]
    pub unknown_rank: bool,
}

pub mod tensor_shape_proto {
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Dim {
        /// `-1` marks an unknown size.
        #[prost(int64, tag = "1")]
        pub size: i64,
        #[prost(string, tag = "2")]
        pub name: String,
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum DataType {
    DtInvalid = 0,
    DtFloat = 1,
    DtDouble = 2,
    DtInt32 = 3,
    DtUint8 = 4,
    DtInt16 = 5,
    DtInt8 = 6,
    DtString = 7,
    DtComplex64 = 8,
    DtInt64 = 9,
    DtBool = 10,
    DtQint8 = 11,
    DtQuint8 = 12,
    DtQint32 = 13,
    DtBfloat16 = 14,
    DtQint16 = 15,
    DtQuint16 = 16,
    DtUint16 = 17,
    DtComplex128 = 18,
    DtHalf = 19,
    DtResource = 20,
    DtVariant = 21,
    DtUint32 = 22,
    DtUint64 = 23,
}

const DATA_TYPE_NAMES: [(DataType, &str); 24] = [
    (DataType::DtInvalid, "DT_INVALID"),
    (DataType::DtFloat, "DT_FLOAT"),
    (DataType::DtDouble, "DT_DOUBLE"),
    (DataType::DtInt32, "DT_INT32"),
    (DataType::DtUint8, "DT_UINT8"),
    (DataType::DtInt16, "DT_INT16"),
    (DataType::DtInt8, "DT_INT8"),
    (DataType::DtString, "DT_STRING"),
    (DataType::DtComplex64, "DT_COMPLEX64"),
    (DataType::DtInt64, "DT_INT64"),
    (DataType::DtBool, "DT_BOOL"),
    (DataType::DtQint8, "DT_QINT8"),
    (DataType::DtQuint8, "DT_QUINT8"),
    (DataType::DtQint32, "DT_QINT32"),
    (DataType::DtBfloat16, "DT_BFLOAT16"),
    (DataType::DtQint16, "DT_QINT16"),
    (DataType::DtQuint16, "DT_QUINT16"),
    (DataType::DtUint16, "DT_UINT16"),
    (DataType::DtComplex128, "DT_COMPLEX128"),
    (DataType::DtHalf, "DT_HALF"),
    (DataType::DtResource, "DT_RESOURCE"),
    (DataType::DtVariant, "DT_VARIANT"),
    (DataType::DtUint32, "DT_UINT32"),
    (DataType::DtUint64, "DT_UINT64"),
];

impl DataType {
    /// The enum value name used by the text and JSON encodings.
    pub fn name(&self) -> &'static str {
        DATA_TYPE_NAMES
            .iter()
            .find(|(ty, _)| ty == self)
            .map_or("DT_INVALID", |(_, name)| name)
    }

    pub fn from_name(name: &str) -> Option<Self> {
        DATA_TYPE_NAMES
            .iter()
            .find(|(_, n)| *n == name)
            .map(|(ty, _)| *ty)
    }
}

/// Name of an enum value as stored in a message, falling back to the number
/// for values this schema does not know.
pub fn data_type_name(value: i32) -> std::borrow::Cow<'static, str> {
    match DataType::from_i32(value) {
        Some(ty) => ty.name().into(),
        None => value.to_string().into(),
    }
}

const FULL_TYPE_NAMES: [(i32, &str); 34] = [
    (0, "TFT_UNSET"),
    (1, "TFT_VAR"),
    (2, "TFT_ANY"),
    (3, "TFT_PRODUCT"),
    (4, "TFT_NAMED"),
    (20, "TFT_FOR_EACH"),
    (100, "TFT_CALLABLE"),
    (1000, "TFT_TENSOR"),
    (1001, "TFT_ARRAY"),
    (1002, "TFT_OPTIONAL"),
    (1003, "TFT_LITERAL"),
    (1004, "TFT_ENCODED"),
    (1005, "TFT_SHAPE_TENSOR"),
    (200, "TFT_BOOL"),
    (201, "TFT_UINT8"),
    (202, "TFT_UINT16"),
    (203, "TFT_UINT32"),
    (204, "TFT_UINT64"),
    (205, "TFT_INT8"),
    (206, "TFT_INT16"),
    (207, "TFT_INT32"),
    (208, "TFT_INT64"),
    (209, "TFT_HALF"),
    (210, "TFT_FLOAT"),
    (211, "TFT_DOUBLE"),
    (212, "TFT_COMPLEX64"),
    (213, "TFT_COMPLEX128"),
    (214, "TFT_STRING"),
    (215, "TFT_BFLOAT16"),
    (10102, "TFT_DATASET"),
    (10103, "TFT_RAGGED"),
    (10104, "TFT_ITERATOR"),
    (10202, "TFT_MUTEX_LOCK"),
    (10203, "TFT_LEGACY_VARIANT"),
];

/// Name of a `FullTypeDef::type_id`, or the number for ids missing here.
pub fn full_type_name(type_id: i32) -> std::borrow::Cow<'static, str> {
    match FULL_TYPE_NAMES.iter().find(|(id, _)| *id == type_id) {
        Some((_, name)) => (*name).into(),
        None => type_id.to_string().into(),
    }
}

pub fn full_type_from_name(name: &str) -> Option<i32> {
    FULL_TYPE_NAMES
        .iter()
        .find(|(_, n)| *n == name)
        .map(|(id, _)| *id)
}

#[test]
fn data_type_names_round_trip() {
    for (ty, name) in DATA_TYPE_NAMES {
        assert_eq!(ty.name(), name);
        assert_eq!(DataType::from_name(name), Some(ty));
        assert_eq!(DataType::from_i32(ty as i32), Some(ty));
    }
    assert_eq!(DataType::from_name("DT_FLOAT_REF"), None);
    assert_eq!(data_type_name(2), "DT_DOUBLE");
    assert_eq!(data_type_name(101), "101");
}

#[test]
fn full_type_names() {
    assert_eq!(full_type_name(1000), "TFT_TENSOR");
    assert_eq!(full_type_from_name("TFT_TENSOR"), Some(1000));
    assert_eq!(full_type_name(77), "77");
    assert_eq!(full_type_from_name("TFT_NOPE"), None);
}

#[test]
fn newer_fields_survive_binary_round_trip() {
    use prost::Message;

    // node { name: "a" op: "Const" experimental_type { type_id: TFT_VAR } } debug_info {}
    let buf = [
        0x0a, 0x0e, 0x0a, 0x01, 0x61, 0x12, 0x05, 0x43, 0x6f, 0x6e, 0x73, 0x74, 0x3a, 0x02, 0x08,
        0x01, 0x2a, 0x00,
    ];
    let graph = GraphDef::decode(&buf[..]).unwrap();
    assert_eq!(graph.node[0].experimental_type.as_ref().unwrap().type_id, 1);
    assert_eq!(graph.debug_info, Some(GraphDebugInfo::default()));
    assert_eq!(graph.encode_to_vec(), buf);

    // dtype: DT_RESOURCE resource_handle_val { device: "d" hash_code: 7 } variant_val { type_name: "v" }
    let buf = [
        0x08, 0x14, 0x72, 0x05, 0x0a, 0x01, 0x64, 0x20, 0x07, 0x7a, 0x03, 0x0a, 0x01, 0x76,
    ];
    let tensor = TensorProto::decode(&buf[..]).unwrap();
    assert_eq!(tensor.resource_handle_val[0].hash_code, 7);
    assert_eq!(tensor.variant_val[0].type_name, "v");
    assert_eq!(tensor.encode_to_vec(), buf);
}

#[test]
fn library_round_trip() {
    use prost::Message;

    let library = FunctionDefLibrary {
        function: vec![FunctionDef {
            signature: Some(OpDef {
                name: "f".to_string(),
                output_arg: vec![op_def::ArgDef {
                    name: "y".to_string(),
                    r#type: DataType::DtFloat as i32,
                    ..Default::default()
                }],
                ..Default::default()
            }),
            node_def: vec![NodeDef {
                name: "c".to_string(),
                op: "Const".to_string(),
                ..Default::default()
            }],
            ret: BTreeMap::from([("y".to_string(), "c:output:0".to_string())]),
            arg_attr: BTreeMap::from([(0, function_def::ArgAttrs::default())]),
            ..Default::default()
        }],
        gradient: vec![GradientDef {
            function_name: "f".to_string(),
            gradient_func: "g".to_string(),
        }],
        registered_gradients: vec![],
    };
    let graph = GraphDef {
        library: Some(library.clone()),
        ..Default::default()
    };
    let decoded = GraphDef::decode(&*graph.encode_to_vec()).unwrap();
    assert_eq!(decoded.library, Some(library));
}
