mod common;

use common::{MockEngine, PRODUCER};
use tfgraph_core::{graph::GraphError, GraphDef, NodeDef, Tensor};
use tfgraph_session::{run_constant_node, GraphDefExt, SessionError};

fn chain() -> GraphDef {
    let mut graph = GraphDef::new_with_versions(&MockEngine).unwrap();
    graph.set_nodes([
        NodeDef::constant("a", &Tensor::scalar(3i32)).unwrap(),
        NodeDef::new("b", "Neg").with_input("a"),
        NodeDef::new("c", "AddN").with_inputs(["a:0", "b", "^a"]),
    ]);
    graph
}

#[test]
fn new_graph_has_versions() {
    let graph = GraphDef::new_with_versions(&MockEngine).unwrap();
    assert!(graph.nodes().is_empty());
    assert_eq!(graph.versions.as_ref().unwrap().producer, PRODUCER);
}

#[test]
fn apply_prefix() {
    let mut graph = chain();
    graph.apply_prefix(&MockEngine, "p").unwrap();

    assert_eq!(graph.list_nodes(&[]), ["p/a", "p/b", "p/c"]);
    assert_eq!(graph.get_node("p/b").unwrap().inputs(), ["p/a"]);
    assert_eq!(
        graph.get_node("p/c").unwrap().inputs(),
        ["p/a:0", "p/b", "^p/a"]
    );
    assert_eq!(graph.versions.as_ref().unwrap().producer, PRODUCER);

    let value = graph.get_node("p/a").unwrap().constant_value().unwrap();
    assert_eq!(value, Tensor::scalar(3i32));
}

#[test]
fn failed_prefix_leaves_graph_untouched() {
    let mut graph = chain();
    graph.set_nodes([NodeDef::new("d", "Neg").with_input("missing")]);
    let before = graph.clone();

    assert!(matches!(
        graph.apply_prefix(&MockEngine, "p"),
        Err(SessionError::Engine(_))
    ));
    assert_eq!(graph, before);
}

#[test]
fn export_and_import() {
    let graph = chain();
    let exported = graph.export(&MockEngine, "").unwrap();

    let mut imported = GraphDef::default();
    imported.import(&MockEngine, &exported).unwrap();
    assert_eq!(imported, graph);
}

#[test]
fn merge_prefixed_graphs() {
    let mut left = chain();
    let mut right = chain();
    assert!(matches!(
        left.clone().append(right.clone()),
        Err(GraphError::AlreadyExists(name)) if name == "a"
    ));

    left.apply_prefix(&MockEngine, "left").unwrap();
    right.apply_prefix(&MockEngine, "right").unwrap();
    left.append(right).unwrap();
    assert_eq!(left.nodes().len(), 6);
    assert_eq!(
        left.get_node("right/b").unwrap().inputs(),
        ["right/a"]
    );
}

#[test]
fn run_constants() {
    let graph = chain();
    let value = run_constant_node(&graph, &MockEngine, "a").unwrap();
    assert_eq!(value.data::<i32>().unwrap(), &[3]);
    assert!(value.is_scalar());

    assert!(matches!(
        run_constant_node(&graph, &MockEngine, "b"),
        Err(SessionError::Unsupported(_))
    ));
    assert!(matches!(
        run_constant_node(&graph, &MockEngine, "nope"),
        Err(SessionError::Graph(GraphError::NotFound(name))) if name == "nope"
    ));
}
