use structopt::StructOpt;
use tfgraph_cli::{run, CliError, NoEngine, Opt};
use tfgraph_core::{graph::GraphError, GraphDef, Tensor};
use tfgraph_session::SessionError;

const NORM_GRAPH: &str = include_str!("../../core/tests/data/norm.pbtxt");

fn tool(args: &[&str], stdin: &[u8]) -> Result<Vec<u8>, CliError> {
    let opt = Opt::from_iter_safe(std::iter::once("tf-graph-tool").chain(args.iter().copied()))
        .unwrap();
    let mut out = vec![];
    run(opt, &NoEngine, &mut &stdin[..], &mut out)?;
    Ok(out)
}

fn tool_str(args: &[&str], stdin: &str) -> String {
    String::from_utf8(tool(args, stdin.as_bytes()).unwrap()).unwrap()
}

#[test]
fn decode_formats() {
    let text = tool_str(&["graph", "decode", "-", "--output-format", "pbtxt"], NORM_GRAPH);
    assert_eq!(text, NORM_GRAPH);

    let dot = tool_str(&["graph", "decode", "-", "--output-format", "dot"], NORM_GRAPH);
    assert!(dot.starts_with("\"tensor\" [fillcolor=\"antiquewhite3\", style=\"filled\""));

    let json: serde_json::Value =
        serde_json::from_str(&tool_str(&["graph", "decode", "--input-filename", "-"], NORM_GRAPH))
            .unwrap();
    assert_eq!(json["node"].as_array().unwrap().len(), 7);
    assert_eq!(json["versions"]["producer"], 808);

    let pb = tool(&["graph", "decode", "-", "--output-format", "pb"], NORM_GRAPH.as_bytes()).unwrap();
    let back = String::from_utf8(
        tool(&["graph", "decode", "-", "--output-format", "pbtxt"], &pb).unwrap(),
    )
    .unwrap();
    assert_eq!(back, NORM_GRAPH);
}

#[test]
fn engine_commands_need_an_engine() {
    assert!(matches!(
        tool(&["graph", "decode", "-", "--add-prefix", "p"], NORM_GRAPH.as_bytes()),
        Err(CliError::Session(SessionError::Unsupported(_)))
    ));
    assert!(matches!(
        tool(&["node", "run", "-", "--name", "norm/Const"], NORM_GRAPH.as_bytes()),
        Err(CliError::Session(SessionError::Unsupported(_)))
    ));
}

#[test]
fn list_nodes() {
    let out = tool_str(&["node", "list", "-", "--selector", "op=const"], NORM_GRAPH);
    assert_eq!(out, "[\n  \"norm/Const\"\n]\n");

    let out = tool_str(
        &["node", "list", "-", "--selector", "input=norm/mul", "--selector", "op=Sum"],
        NORM_GRAPH,
    );
    assert_eq!(out, "[\n  \"norm/Sum\"\n]\n");

    let all: Vec<String> = serde_json::from_str(&tool_str(&["node", "list", "-"], NORM_GRAPH)).unwrap();
    assert_eq!(all.len(), 7);

    assert!(matches!(
        tool(&["node", "list", "-", "--selector", "device=cpu"], NORM_GRAPH.as_bytes()),
        Err(CliError::Selector(_))
    ));
}

#[test]
fn get_node() {
    let out = tool_str(
        &["node", "get", "-", "--name", "norm/Sqrt", "--output-format", "pbtxt"],
        NORM_GRAPH,
    );
    let graph: GraphDef = out.parse().unwrap();
    assert_eq!(graph.list_nodes(&[]), ["norm/Sqrt"]);
    assert_eq!(graph.versions, None);

    assert!(matches!(
        tool(&["node", "get", "-", "--name", "nope"], NORM_GRAPH.as_bytes()),
        Err(CliError::Graph(GraphError::NotFound(name))) if name == "nope"
    ));
}

#[test]
fn delete_and_rename_nodes() {
    let out = tool_str(
        &[
            "node",
            "delete",
            "-",
            "--name",
            "norm/Squeeze",
            "--name",
            "Identity",
            "--output-format",
            "pbtxt",
        ],
        NORM_GRAPH,
    );
    let graph: GraphDef = out.parse().unwrap();
    assert_eq!(graph.nodes().len(), 5);
    assert!(!graph.contains_node("Identity"));

    let out = tool_str(
        &[
            "node",
            "rename",
            "-",
            "--name",
            "norm/Squeeze",
            "--new-name",
            "squeezed",
            "--output-format",
            "pbtxt",
        ],
        NORM_GRAPH,
    );
    let graph: GraphDef = out.parse().unwrap();
    assert!(graph.contains_node("squeezed"));
    assert_eq!(graph.get_node("Identity").unwrap().inputs(), ["norm/Squeeze"]);

    assert!(matches!(
        tool(
            &["node", "rename", "-", "--name", "tensor", "--new-name", "Identity"],
            NORM_GRAPH.as_bytes()
        ),
        Err(CliError::Graph(GraphError::AlreadyExists(_)))
    ));
}

#[test]
fn encode_tensor() {
    let envelope = r#"{"type":"tensor","goDataType":"int32","shape":[2,2],"value":[1,2,3,4]}"#;
    let out = tool_str(
        &["tensor", "encode", "-", "--name", "x", "--output-format", "pbtxt"],
        envelope,
    );
    let graph: GraphDef = out.parse().unwrap();
    let value = graph.get_node("x").unwrap().constant_value().unwrap();
    assert_eq!(value, Tensor::new(vec![2, 2], vec![1i32, 2, 3, 4]).unwrap());

    assert!(matches!(
        tool(
            &["tensor", "encode", "-", "--name", "x"],
            br#"{"type":"tensor","goDataType":"int32","shape":[3],"value":[1]}"#
        ),
        Err(CliError::Tensor(_))
    ));
}

#[test]
fn files() {
    let dir = tempfile::tempdir().unwrap();
    let path = |name: &str| dir.path().join(name).to_string_lossy().into_owned();

    std::fs::write(path("norm.pbtxt"), NORM_GRAPH).unwrap();
    tool(
        &[
            "graph",
            "decode",
            &path("norm.pbtxt"),
            "--output-filename",
            &path("norm.pb"),
            "--output-format",
            "pb",
        ],
        b"",
    )
    .unwrap();
    assert_eq!(
        GraphDef::load(path("norm.pb")).unwrap(),
        NORM_GRAPH.parse::<GraphDef>().unwrap()
    );

    for (name, value) in [("a", 1), ("b", 2)] {
        let envelope = format!(r#"{{"type":"scalar","goDataType":"int64","value":{value}}}"#);
        tool(
            &[
                "tensor",
                "encode",
                "-",
                "--name",
                name,
                "--output-filename",
                &path(&format!("{name}.pb")),
                "--output-format",
                "pb",
            ],
            envelope.as_bytes(),
        )
        .unwrap();
    }

    let out = tool_str(
        &[
            "graph",
            "merge",
            &path("a.pb"),
            "--input-filename",
            &path("b.pb"),
            "--output-format",
            "pbtxt",
        ],
        "",
    );
    let merged: GraphDef = out.parse().unwrap();
    assert_eq!(merged.list_nodes(&[]), ["b", "a"]);

    assert!(matches!(
        tool(&["graph", "merge", &path("a.pb"), &path("a.pb")], b""),
        Err(CliError::Graph(GraphError::AlreadyExists(name))) if name == "a"
    ));
    assert!(matches!(
        tool(&["graph", "decode"], b""),
        Err(CliError::MissingInput)
    ));
}
