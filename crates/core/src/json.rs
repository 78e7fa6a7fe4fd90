//! JSON projection of graph documents following the proto3 JSON mapping.
//! Only encoding is provided.

use std::collections::BTreeMap;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::{Map, Number, Value};

use crate::{
    attr::AttrMap,
    graph::GraphError,
    proto::{
        attr_value::{ListValue, Value as AttrOneof},
        data_type_name, full_type_name,
        full_type_def::Attr as TypeAttr,
        graph_debug_info::{FileLineCol, StackTrace},
        op_def::{ArgDef, AttrDef},
        resource_handle_proto::DtypeAndShape,
        AttrValue, FullTypeDef, FunctionDef, FunctionDefLibrary, GraphDebugInfo, GraphDef,
        NameAttrList, NodeDef, OpDef, ResourceHandleProto, TensorProto, TensorShapeProto,
        VariantTensorDataProto, VersionDef,
    },
};

pub fn to_value(graph: &GraphDef) -> Value {
    let mut obj = Object::default();
    obj.list("node", graph.node.iter().map(node_def));
    if let Some(library) = &graph.library {
        obj.insert("library", function_library(library));
    }
    obj.int("version", graph.version);
    if let Some(versions) = &graph.versions {
        obj.insert("versions", version_def(versions));
    }
    if let Some(info) = &graph.debug_info {
        obj.insert("debugInfo", debug_info(info));
    }
    obj.into()
}

/// Two-space indented JSON.
pub fn to_vec_pretty(graph: &GraphDef) -> Result<Vec<u8>, GraphError> {
    Ok(serde_json::to_vec_pretty(&to_value(graph))?)
}

#[derive(Default)]
struct Object(Map<String, Value>);

impl From<Object> for Value {
    fn from(obj: Object) -> Self {
        Value::Object(obj.0)
    }
}

impl Object {
    fn insert(&mut self, key: &str, value: Value) {
        self.0.insert(key.to_string(), value);
    }

    fn string(&mut self, key: &str, value: &str) {
        if !value.is_empty() {
            self.insert(key, Value::from(value));
        }
    }

    fn int(&mut self, key: &str, value: i32) {
        if value != 0 {
            self.insert(key, Value::from(value));
        }
    }

    fn flag(&mut self, key: &str, value: bool) {
        if value {
            self.insert(key, Value::from(true));
        }
    }

    fn list(&mut self, key: &str, values: impl Iterator<Item = Value>) {
        let values: Vec<Value> = values.collect();
        if !values.is_empty() {
            self.insert(key, Value::Array(values));
        }
    }

    /// Map keys of any type become JSON strings.
    fn map<K: ToString, V>(&mut self, key: &str, map: &BTreeMap<K, V>, value: impl Fn(&V) -> Value) {
        if !map.is_empty() {
            let entries = map.iter().map(|(k, v)| (k.to_string(), value(v)));
            self.insert(key, Value::Object(entries.collect()));
        }
    }
}

fn bytes(b: &[u8]) -> Value {
    Value::String(STANDARD.encode(b))
}

fn int64(v: impl ToString) -> Value {
    Value::String(v.to_string())
}

fn float(v: f64) -> Value {
    match Number::from_f64(v) {
        Some(n) => Value::Number(n),
        None if v.is_nan() => Value::from("NaN"),
        None if v > 0.0 => Value::from("Infinity"),
        None => Value::from("-Infinity"),
    }
}

/// Keeps the shortest decimal form of a single precision value.
fn float32(v: f32) -> Value {
    float(v.to_string().parse().unwrap_or(v as f64))
}

fn data_type(ty: i32) -> Value {
    Value::from(data_type_name(ty).into_owned())
}

fn node_def(node: &NodeDef) -> Value {
    let mut obj = Object::default();
    obj.string("name", &node.name);
    obj.string("op", &node.op);
    obj.list("input", node.input.iter().map(|i| Value::from(i.as_str())));
    obj.string("device", &node.device);
    if !node.attr.is_empty() {
        obj.insert("attr", attr_map(&node.attr));
    }
    if let Some(info) = &node.experimental_debug_info {
        let mut debug = Object::default();
        debug.list(
            "originalNodeNames",
            info.original_node_names.iter().map(|n| Value::from(n.as_str())),
        );
        debug.list(
            "originalFuncNames",
            info.original_func_names.iter().map(|n| Value::from(n.as_str())),
        );
        obj.insert("experimentalDebugInfo", debug.into());
    }
    if let Some(ty) = &node.experimental_type {
        obj.insert("experimentalType", full_type(ty));
    }
    obj.into()
}

fn attr_map(attrs: &AttrMap) -> Value {
    Value::Object(
        attrs
            .iter()
            .map(|(k, v)| (k.clone(), attr_value(v)))
            .collect(),
    )
}

fn attr_value(attr: &AttrValue) -> Value {
    let mut obj = Object::default();
    match &attr.value {
        None => {}
        Some(AttrOneof::S(s)) => obj.insert("s", bytes(s)),
        Some(AttrOneof::I(i)) => obj.insert("i", int64(i)),
        Some(AttrOneof::F(f)) => obj.insert("f", float32(*f)),
        Some(AttrOneof::B(b)) => obj.insert("b", Value::from(*b)),
        Some(AttrOneof::Type(ty)) => obj.insert("type", data_type(*ty)),
        Some(AttrOneof::Shape(shape)) => obj.insert("shape", tensor_shape(shape)),
        Some(AttrOneof::Tensor(t)) => obj.insert("tensor", tensor(t)),
        Some(AttrOneof::List(list)) => obj.insert("list", list_value(list)),
        Some(AttrOneof::Func(func)) => obj.insert("func", name_attr_list(func)),
        Some(AttrOneof::Placeholder(p)) => obj.insert("placeholder", Value::from(p.as_str())),
    }
    obj.into()
}

fn list_value(list: &ListValue) -> Value {
    let mut obj = Object::default();
    obj.list("s", list.s.iter().map(|s| bytes(s)));
    obj.list("i", list.i.iter().map(int64));
    obj.list("f", list.f.iter().map(|&f| float32(f)));
    obj.list("b", list.b.iter().map(|&b| Value::from(b)));
    obj.list("type", list.r#type.iter().map(|&ty| data_type(ty)));
    obj.list("shape", list.shape.iter().map(tensor_shape));
    obj.list("tensor", list.tensor.iter().map(tensor));
    obj.list("func", list.func.iter().map(name_attr_list));
    obj.into()
}

fn name_attr_list(func: &NameAttrList) -> Value {
    let mut obj = Object::default();
    obj.string("name", &func.name);
    if !func.attr.is_empty() {
        obj.insert("attr", attr_map(&func.attr));
    }
    obj.into()
}

fn tensor_shape(shape: &TensorShapeProto) -> Value {
    let mut obj = Object::default();
    obj.list(
        "dim",
        shape.dim.iter().map(|d| {
            let mut dim = Object::default();
            if d.size != 0 {
                dim.insert("size", int64(d.size));
            }
            dim.string("name", &d.name);
            dim.into()
        }),
    );
    if shape.unknown_rank {
        obj.insert("unknownRank", Value::from(true));
    }
    obj.into()
}

fn tensor(t: &TensorProto) -> Value {
    let mut obj = Object::default();
    if t.dtype != 0 {
        obj.insert("dtype", data_type(t.dtype));
    }
    if let Some(shape) = &t.tensor_shape {
        obj.insert("tensorShape", tensor_shape(shape));
    }
    obj.int("versionNumber", t.version_number);
    if !t.tensor_content.is_empty() {
        obj.insert("tensorContent", bytes(&t.tensor_content));
    }
    obj.list("halfVal", t.half_val.iter().map(|&v| Value::from(v)));
    obj.list("floatVal", t.float_val.iter().map(|&v| float32(v)));
    obj.list("doubleVal", t.double_val.iter().map(|&v| float(v)));
    obj.list("intVal", t.int_val.iter().map(|&v| Value::from(v)));
    obj.list("stringVal", t.string_val.iter().map(|s| bytes(s)));
    obj.list("scomplexVal", t.scomplex_val.iter().map(|&v| float32(v)));
    obj.list("int64Val", t.int64_val.iter().map(int64));
    obj.list("boolVal", t.bool_val.iter().map(|&v| Value::from(v)));
    obj.list("dcomplexVal", t.dcomplex_val.iter().map(|&v| float(v)));
    obj.list("resourceHandleVal", t.resource_handle_val.iter().map(resource_handle));
    obj.list("variantVal", t.variant_val.iter().map(variant));
    obj.list("uint32Val", t.uint32_val.iter().map(|&v| Value::from(v)));
    obj.list("uint64Val", t.uint64_val.iter().map(int64));
    obj.into()
}

fn version_def(versions: &VersionDef) -> Value {
    let mut obj = Object::default();
    obj.int("producer", versions.producer);
    obj.int("minConsumer", versions.min_consumer);
    obj.list(
        "badConsumers",
        versions.bad_consumers.iter().map(|&v| Value::from(v)),
    );
    obj.into()
}

fn resource_handle(handle: &ResourceHandleProto) -> Value {
    let mut obj = Object::default();
    obj.string("device", &handle.device);
    obj.string("container", &handle.container);
    obj.string("name", &handle.name);
    if handle.hash_code != 0 {
        obj.insert("hashCode", int64(handle.hash_code));
    }
    obj.string("maybeTypeName", &handle.maybe_type_name);
    obj.list(
        "dtypesAndShapes",
        handle.dtypes_and_shapes.iter().map(dtype_and_shape),
    );
    obj.into()
}

fn dtype_and_shape(ds: &DtypeAndShape) -> Value {
    let mut obj = Object::default();
    if ds.dtype != 0 {
        obj.insert("dtype", data_type(ds.dtype));
    }
    if let Some(shape) = &ds.shape {
        obj.insert("shape", tensor_shape(shape));
    }
    obj.into()
}

fn variant(v: &VariantTensorDataProto) -> Value {
    let mut obj = Object::default();
    obj.string("typeName", &v.type_name);
    if !v.metadata.is_empty() {
        obj.insert("metadata", bytes(&v.metadata));
    }
    obj.list("tensors", v.tensors.iter().map(tensor));
    obj.into()
}

fn full_type(t: &FullTypeDef) -> Value {
    let mut obj = Object::default();
    if t.type_id != 0 {
        obj.insert("typeId", Value::from(full_type_name(t.type_id).into_owned()));
    }
    obj.list("args", t.args.iter().map(full_type));
    match &t.attr {
        None => {}
        Some(TypeAttr::S(s)) => obj.insert("s", Value::from(s.as_str())),
        Some(TypeAttr::I(i)) => obj.insert("i", int64(i)),
    }
    obj.into()
}

fn function_library(library: &FunctionDefLibrary) -> Value {
    let mut obj = Object::default();
    obj.list("function", library.function.iter().map(function_def));
    obj.list(
        "gradient",
        library.gradient.iter().map(|g| {
            let mut obj = Object::default();
            obj.string("functionName", &g.function_name);
            obj.string("gradientFunc", &g.gradient_func);
            obj.into()
        }),
    );
    obj.list(
        "registeredGradients",
        library.registered_gradients.iter().map(|g| {
            let mut obj = Object::default();
            obj.string("gradientFunc", &g.gradient_func);
            obj.string("registeredOpType", &g.registered_op_type);
            obj.into()
        }),
    );
    obj.into()
}

fn function_def(func: &FunctionDef) -> Value {
    let mut obj = Object::default();
    if let Some(signature) = &func.signature {
        obj.insert("signature", op_def(signature));
    }
    obj.map("attr", &func.attr, attr_value);
    obj.map("argAttr", &func.arg_attr, |attrs| {
        let mut obj = Object::default();
        if !attrs.attr.is_empty() {
            obj.insert("attr", attr_map(&attrs.attr));
        }
        obj.into()
    });
    obj.map("resourceArgUniqueId", &func.resource_arg_unique_id, |&id| {
        Value::from(id)
    });
    obj.list("nodeDef", func.node_def.iter().map(node_def));
    obj.map("ret", &func.ret, |v| Value::from(v.as_str()));
    obj.map("controlRet", &func.control_ret, |v| Value::from(v.as_str()));
    obj.into()
}

fn op_def(op: &OpDef) -> Value {
    let mut obj = Object::default();
    obj.string("name", &op.name);
    obj.list("inputArg", op.input_arg.iter().map(arg_def));
    obj.list("outputArg", op.output_arg.iter().map(arg_def));
    obj.list(
        "controlOutput",
        op.control_output.iter().map(|o| Value::from(o.as_str())),
    );
    obj.list("attr", op.attr.iter().map(attr_def));
    if let Some(deprecation) = &op.deprecation {
        let mut dep = Object::default();
        dep.int("version", deprecation.version);
        dep.string("explanation", &deprecation.explanation);
        obj.insert("deprecation", dep.into());
    }
    obj.string("summary", &op.summary);
    obj.string("description", &op.description);
    obj.flag("isCommutative", op.is_commutative);
    obj.flag("isAggregate", op.is_aggregate);
    obj.flag("isStateful", op.is_stateful);
    obj.flag("allowsUninitializedInput", op.allows_uninitialized_input);
    obj.flag("isDistributedCommunication", op.is_distributed_communication);
    obj.into()
}

fn arg_def(arg: &ArgDef) -> Value {
    let mut obj = Object::default();
    obj.string("name", &arg.name);
    obj.string("description", &arg.description);
    if arg.r#type != 0 {
        obj.insert("type", data_type(arg.r#type));
    }
    obj.string("typeAttr", &arg.type_attr);
    obj.string("numberAttr", &arg.number_attr);
    obj.string("typeListAttr", &arg.type_list_attr);
    obj.list("handleData", arg.handle_data.iter().map(dtype_and_shape));
    obj.flag("isRef", arg.is_ref);
    if let Some(ty) = &arg.experimental_full_type {
        obj.insert("experimentalFullType", full_type(ty));
    }
    obj.into()
}

fn attr_def(attr: &AttrDef) -> Value {
    let mut obj = Object::default();
    obj.string("name", &attr.name);
    obj.string("type", &attr.r#type);
    if let Some(value) = &attr.default_value {
        obj.insert("defaultValue", attr_value(value));
    }
    obj.string("description", &attr.description);
    obj.flag("hasMinimum", attr.has_minimum);
    if attr.minimum != 0 {
        obj.insert("minimum", int64(attr.minimum));
    }
    if let Some(values) = &attr.allowed_values {
        obj.insert("allowedValues", attr_value(values));
    }
    obj.into()
}

fn debug_info(info: &GraphDebugInfo) -> Value {
    let mut obj = Object::default();
    obj.list("files", info.files.iter().map(|f| Value::from(f.as_str())));
    obj.map("framesById", &info.frames_by_id, file_line_col);
    obj.map("tracesById", &info.traces_by_id, stack_trace);
    obj.map("traces", &info.traces, stack_trace);
    obj.map("nameToTraceId", &info.name_to_trace_id, |id| int64(id));
    obj.into()
}

fn file_line_col(frame: &FileLineCol) -> Value {
    let mut obj = Object::default();
    if let Some(v) = frame.file_index {
        obj.insert("fileIndex", Value::from(v));
    }
    if let Some(v) = frame.line {
        obj.insert("line", Value::from(v));
    }
    if let Some(v) = frame.col {
        obj.insert("col", Value::from(v));
    }
    if let Some(v) = &frame.func {
        obj.insert("func", Value::from(v.as_str()));
    }
    if let Some(v) = &frame.code {
        obj.insert("code", Value::from(v.as_str()));
    }
    obj.into()
}

fn stack_trace(trace: &StackTrace) -> Value {
    let mut obj = Object::default();
    obj.list("fileLineCols", trace.file_line_cols.iter().map(file_line_col));
    obj.list("frameId", trace.frame_id.iter().map(int64));
    obj.into()
}

#[test]
fn encode_constant_node() {
    use crate::proto::DataType;

    let mut graph = GraphDef::default();
    graph.node.push(NodeDef::constant_from_proto(
        "c",
        TensorProto {
            dtype: DataType::DtInt32 as i32,
            tensor_shape: Some(crate::attr::shape_proto(&[2])),
            tensor_content: vec![0, 0, 0, 0, 1, 0, 0, 0],
            ..Default::default()
        },
    ));
    graph.versions = Some(VersionDef {
        producer: 808,
        ..Default::default()
    });

    let value = to_value(&graph);
    assert_eq!(
        value,
        serde_json::json!({
            "node": [{
                "name": "c",
                "op": "Const",
                "attr": {
                    "dtype": { "type": "DT_INT32" },
                    "value": { "tensor": {
                        "dtype": "DT_INT32",
                        "tensorShape": { "dim": [{ "size": "2" }] },
                        "tensorContent": "AAAAAAEAAAA="
                    }}
                }
            }],
            "versions": { "producer": 808 }
        })
    );

    let pretty = String::from_utf8(to_vec_pretty(&graph).unwrap()).unwrap();
    assert!(pretty.starts_with("{\n  \"node\": [\n    {\n"));
}

#[test]
fn encode_special_values() {
    let node = NodeDef::new("n", "Op").with_attrs(AttrMap::from([
        ("nan".to_string(), AttrValue::from(f32::NAN)),
        ("tenth".to_string(), AttrValue::from(0.1f32)),
        ("big".to_string(), AttrValue::from(i64::MAX)),
        ("empty".to_string(), AttrValue::from(ListValue::default())),
    ]));
    let attrs = &node_def(&node)["attr"];
    assert_eq!(attrs["nan"]["f"], "NaN");
    assert_eq!(attrs["tenth"]["f"], 0.1);
    assert_eq!(attrs["big"]["i"], "9223372036854775807");
    assert_eq!(attrs["empty"]["list"], serde_json::json!({}));
}

#[test]
fn encode_library_and_debug_info() {
    use crate::proto::{
        function_def::ArgAttrs, graph_debug_info::FileLineCol, op_def::ArgDef, DataType,
        GradientDef,
    };

    let graph = GraphDef {
        library: Some(FunctionDefLibrary {
            function: vec![FunctionDef {
                signature: Some(OpDef {
                    name: "f".to_string(),
                    output_arg: vec![ArgDef {
                        name: "y".to_string(),
                        r#type: DataType::DtFloat as i32,
                        ..Default::default()
                    }],
                    is_stateful: true,
                    ..Default::default()
                }),
                arg_attr: BTreeMap::from([(0, ArgAttrs::default())]),
                ret: BTreeMap::from([("y".to_string(), "c:output:0".to_string())]),
                ..Default::default()
            }],
            gradient: vec![GradientDef {
                function_name: "f".to_string(),
                gradient_func: "g".to_string(),
            }],
            registered_gradients: vec![],
        }),
        debug_info: Some(GraphDebugInfo {
            files: vec!["model.py".to_string()],
            frames_by_id: BTreeMap::from([(
                u64::MAX,
                FileLineCol {
                    file_index: Some(0),
                    line: Some(12),
                    ..Default::default()
                },
            )]),
            ..Default::default()
        }),
        ..Default::default()
    };

    assert_eq!(
        to_value(&graph),
        serde_json::json!({
            "library": {
                "function": [{
                    "signature": {
                        "name": "f",
                        "outputArg": [{ "name": "y", "type": "DT_FLOAT" }],
                        "isStateful": true
                    },
                    "argAttr": { "0": {} },
                    "ret": { "y": "c:output:0" }
                }],
                "gradient": [{ "functionName": "f", "gradientFunc": "g" }]
            },
            "debugInfo": {
                "files": ["model.py"],
                "framesById": {
                    "18446744073709551615": { "fileIndex": 0, "line": 12 }
                }
            }
        })
    );
}
