use tfgraph_core::{
    node::{CONST_OP, PLACEHOLDER_OP},
    proto::DataType,
    selector::{parse_selectors, NodeFilter},
    text, GraphDef, GraphError, GraphFormat, NodeDef, Tensor,
};

const NORM_GRAPH: &str = include_str!("data/norm.pbtxt");

fn norm_graph() -> GraphDef {
    NORM_GRAPH.parse().unwrap()
}

fn matmul_graph() -> GraphDef {
    let x = Tensor::new(vec![2, 2], vec![1.0f64, 2.0, 3.0, 4.0]).unwrap();
    let y = Tensor::new(vec![2, 2], vec![5.0f64, 6.0, 7.0, 8.0]).unwrap();

    let mut graph = GraphDef::default();
    graph.set_nodes([
        NodeDef::constant("x", &x).unwrap(),
        NodeDef::constant("y", &y).unwrap(),
        NodeDef::new("mul", "MatMul").with_inputs(["x", "y"]),
    ]);
    graph
}

#[test]
fn text_format_is_reproduced() {
    let graph = norm_graph();
    assert_eq!(graph.nodes().len(), 7);
    assert_eq!(graph.versions.as_ref().unwrap().producer, 808);
    assert_eq!(text::to_string(&graph), NORM_GRAPH);
    assert_eq!(graph.to_string(), NORM_GRAPH);
}

#[test]
fn compact_text_format() {
    let src = "node:{name:\"X/Placeholder\"  op:\"Placeholder\"  attr:{key:\"dtype\"  value:{type:DT_DOUBLE}}  \
               attr:{key:\"shape\"  value:{shape:{dim:{size:2}  dim:{size:2}}}}}  \
               node:{name:\"MatMul\"  op:\"MatMul\"  input:\"X/Placeholder\"  input:\"X/Placeholder\"  \
               attr:{key:\"transpose_a\"  value:{b:false}}}  versions:{producer:987}  library:{}";
    let graph: GraphDef = src.parse().unwrap();
    assert_eq!(graph.list_nodes(&[]), ["X/Placeholder", "MatMul"]);
    assert_eq!(graph.versions.as_ref().unwrap().producer, 987);
    assert!(graph.library.as_ref().unwrap().is_empty());

    let matmul = graph.get_node("MatMul").unwrap();
    assert_eq!(matmul.attrs()["transpose_a"].as_bool(), Some(false));
}

#[test]
fn dot_notation() {
    insta::assert_snapshot!(norm_graph().to_dot(), @r###"
    "tensor" [fillcolor="antiquewhite3", style="filled", label="tensor"]
    "norm/mul" [label="norm/mul"]
    "tensor" -> "norm/mul"
    "tensor" -> "norm/mul"
    "norm/Const" [fillcolor="aquamarine3", style="filled", label="norm/Const"]
    "norm/Sum" [label="norm/Sum"]
    "norm/mul" -> "norm/Sum"
    "norm/Const" -> "norm/Sum"
    "norm/Sqrt" [label="norm/Sqrt"]
    "norm/Sum" -> "norm/Sqrt"
    "norm/Squeeze" [label="norm/Squeeze"]
    "norm/Sqrt" -> "norm/Squeeze"
    "Identity" [label="Identity"]
    "norm/Squeeze" -> "Identity"
    "###);
}

#[test]
fn matmul_dot_notation() {
    let dot = matmul_graph().to_dot();
    let lines: Vec<&str> = dot.lines().collect();
    assert_eq!(lines.len(), 5);
    assert_eq!(lines.iter().filter(|l| l.contains("style=\"filled\"")).count(), 2);
    assert_eq!(lines[2], "\"mul\" [label=\"mul\"]");
    assert_eq!(&lines[3..], ["\"x\" -> \"mul\"", "\"y\" -> \"mul\""]);
}

#[test]
fn list_nodes_with_filters() {
    let graph = norm_graph();
    assert_eq!(graph.list_nodes(&[NodeFilter::op(CONST_OP)]), ["norm/Const"]);
    assert_eq!(
        graph.list_nodes(&[NodeFilter::op(PLACEHOLDER_OP)]),
        ["tensor"]
    );
    assert_eq!(
        graph.list_nodes(&[NodeFilter::inputs(["tensor"])]),
        ["norm/mul"]
    );
    assert_eq!(
        graph.list_nodes(&[NodeFilter::inputs(Vec::<String>::new())]),
        ["tensor", "norm/Const"]
    );
    assert_eq!(graph.list_nodes(&[]).len(), 7);

    let filters = parse_selectors(&["op=Sum", "input=norm/mul", "input=norm/Const"]).unwrap();
    assert_eq!(graph.list_nodes(&filters), ["norm/Sum"]);
    let filters = parse_selectors(&["op=constant", "input=tensor"]).unwrap();
    assert!(graph.list_nodes(&filters).is_empty());

    let matmul = matmul_graph();
    let filters = parse_selectors(&["op=const"]).unwrap();
    assert_eq!(matmul.list_nodes(&filters), ["x", "y"]);
    assert_eq!(
        matmul.list_nodes(&[NodeFilter::inputs(["x"])]),
        ["mul"]
    );
}

#[test]
fn constant_values_survive_binary_round_trip() {
    let graph = matmul_graph();
    let buf = graph.to_bytes(GraphFormat::Binary).unwrap();
    let decoded = GraphDef::from_bytes(&buf, Some(GraphFormat::Binary)).unwrap();
    assert_eq!(decoded, graph);

    let x = decoded.get_node("x").unwrap().constant_value().unwrap();
    assert_eq!(x.data::<f64>().unwrap(), &[1.0, 2.0, 3.0, 4.0]);
}

#[test]
fn file_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let mut graph = norm_graph();
    graph.set_nodes([NodeDef::placeholder("extra", DataType::DtInt32).with_shape(&[-1])]);

    for name in ["g.pb", "g.pbtxt", "g.pbtext", "graph"] {
        let path = dir.path().join(name);
        graph.save(&path).unwrap();
        assert_eq!(GraphDef::load(&path).unwrap(), graph, "{name}");
    }

    // Detected when the extension says nothing.
    let path = dir.path().join("g.pbtxt");
    let renamed = dir.path().join("g.graph");
    std::fs::rename(&path, &renamed).unwrap();
    assert_eq!(GraphDef::load(&renamed).unwrap(), graph);

    let json = dir.path().join("g.json");
    graph.save(&json).unwrap();
    let written: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&json).unwrap()).unwrap();
    assert_eq!(written["node"][0]["name"], "tensor");
    assert!(matches!(
        GraphDef::load(&json),
        Err(GraphError::Unsupported(_))
    ));

    assert!(matches!(
        graph.save(dir.path().join("g.yaml")),
        Err(GraphError::Unsupported(_))
    ));
    assert!(matches!(
        GraphDef::load(dir.path().join("missing.pb")),
        Err(GraphError::Io(_))
    ));
}

#[test]
fn failed_operations_leave_graph_untouched() {
    let mut graph = norm_graph();
    let before = graph.clone();

    assert!(graph.delete_nodes(&["norm/Sum", "nope"]).is_err());
    assert!(graph.rename_node("norm/Sum", "Identity").is_err());
    assert!(graph.rename_node("nope", "fresh").is_err());

    let mut other = GraphDef::default();
    other.set_nodes([NodeDef::new("fresh", "NoOp"), NodeDef::new("tensor", "NoOp")]);
    assert!(matches!(
        graph.append(other),
        Err(GraphError::AlreadyExists(name)) if name == "tensor"
    ));

    assert_eq!(graph, before);
}

#[test]
fn reset_clears_everything() {
    let mut graph = norm_graph();
    graph.reset();
    assert_eq!(graph, GraphDef::default());
    assert_eq!(graph.to_bytes(GraphFormat::Binary).unwrap(), Vec::<u8>::new());
}
