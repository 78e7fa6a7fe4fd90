use tfgraph_core::{node::CONST_OP, GraphDef, NodeDef, Tensor};
use tfgraph_session::{run_constant_node, GraphDefExt, SessionError};
use tfgraph_session_tf::TfEngine;

fn graph() -> GraphDef {
    let engine = TfEngine::new();
    let mut graph = GraphDef::new_with_versions(&engine).unwrap();
    graph.set_nodes([
        NodeDef::constant(
            "x",
            &Tensor::new(vec![2, 2], vec![1.0f32, 2.0, 3.0, 4.0]).unwrap(),
        )
        .unwrap(),
        NodeDef::constant(
            "s",
            &Tensor::vector(vec!["a".to_string(), "bc".to_string()]).unwrap(),
        )
        .unwrap(),
        NodeDef::new("neg", "Neg")
            .with_input("x")
            .with_attrs([("T".to_string(), tfgraph_core::proto::DataType::DtFloat.into())].into()),
    ]);
    graph
}

#[test]
fn versions_come_from_the_engine() {
    let graph = GraphDef::new_with_versions(&TfEngine::new()).unwrap();
    assert!(graph.versions.unwrap().producer > 0);
}

#[test]
fn apply_prefix() {
    let mut graph = graph();
    graph.apply_prefix(&TfEngine::new(), "p").unwrap();

    assert!(graph.contains_node("p/x"));
    assert_eq!(graph.get_node("p/neg").unwrap().inputs(), ["p/x"]);
    assert_eq!(graph.get_node("p/x").unwrap().op(), CONST_OP);
}

#[test]
fn run_constants() {
    let graph = graph();
    let engine = TfEngine::new();

    let x = run_constant_node(&graph, &engine, "x").unwrap();
    assert_eq!(x.dims().as_slice(), &[2, 2]);
    assert_eq!(x.data::<f32>().unwrap(), &[1.0, 2.0, 3.0, 4.0]);

    let s = run_constant_node(&graph, &engine, "s").unwrap();
    assert_eq!(s.data::<String>().unwrap(), &["a".to_string(), "bc".to_string()]);

    assert!(matches!(
        run_constant_node(&graph, &engine, "neg"),
        Err(SessionError::Unsupported(_))
    ));
}
