use std::{borrow::Cow, fmt, fs, io, path::Path, str::FromStr};

use prost::Message;
use rustc_hash::{FxHashMap, FxHashSet};
use thiserror::Error;

use crate::{
    json,
    node::InputRef,
    proto::{GraphDef, NodeDef},
    selector::NodeFilter,
    tensor::TensorError,
    text::{self, ParseError},
};

#[derive(Error, Debug)]
pub enum GraphError {
    #[error("Node {0} not found in graph")]
    NotFound(String),

    #[error("Node {0} already exists in graph")]
    AlreadyExists(String),

    #[error("Failed to decode graph: {}", .0.join("; "))]
    Malformed(Vec<String>),

    #[error("Unsupported: {0}")]
    Unsupported(Cow<'static, str>),

    #[error("Text format: {0}")]
    Text(#[from] ParseError),

    #[error("Tensor: {0}")]
    Tensor(#[from] TensorError),

    #[error("Json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Io(#[from] io::Error),
}

/// Serialization formats of a graph document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphFormat {
    Binary,
    Text,
    Json,
}

impl GraphFormat {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "pb" => Some(Self::Binary),
            "pbtxt" | "pbtext" => Some(Self::Text),
            "json" => Some(Self::Json),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Binary => "pb",
            Self::Text => "pbtxt",
            Self::Json => "json",
        }
    }

    /// Format to read `path` as. `None` means the content has to be sniffed.
    pub fn for_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }

    /// Format to write `path` as. A path without extension is written as binary.
    pub fn for_save(path: &Path) -> Result<Self, GraphError> {
        match path.extension().and_then(|ext| ext.to_str()) {
            None | Some("") => Ok(Self::Binary),
            Some(ext) => Self::from_extension(ext).ok_or_else(|| {
                GraphError::Unsupported(
                    format!("cannot save graph as .{ext}, use .pb, .pbtxt or .json").into(),
                )
            }),
        }
    }
}

impl FromStr for GraphFormat {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_extension(s).ok_or_else(|| {
            GraphError::Unsupported(
                format!("unknown graph format {s}, use pb, pbtxt or json").into(),
            )
        })
    }
}

impl fmt::Display for GraphFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.extension())
    }
}

fn json_unsupported() -> GraphError {
    GraphError::Unsupported("decoding graphs from JSON is not supported".into())
}

impl GraphDef {
    /// Decodes a graph from `buf`. Without a format hint, binary, text and
    /// JSON are tried in that order.
    pub fn from_bytes(buf: &[u8], hint: Option<GraphFormat>) -> Result<Self, GraphError> {
        match hint {
            Some(GraphFormat::Binary) => Self::decode(buf)
                .map_err(|e| GraphError::Malformed(vec![format!("binary: {e}")])),
            Some(GraphFormat::Text) => Self::from_text_bytes(buf)
                .map_err(|e| GraphError::Malformed(vec![format!("text: {e}")])),
            Some(GraphFormat::Json) => Err(json_unsupported()),
            None => Self::detect(buf),
        }
    }

    fn detect(buf: &[u8]) -> Result<Self, GraphError> {
        let mut errors = Vec::with_capacity(3);

        match Self::decode(buf) {
            Ok(graph) => {
                log::debug!("Decoded {} bytes as binary graph", buf.len());
                return Ok(graph);
            }
            Err(e) => errors.push(format!("binary: {e}")),
        }

        match Self::from_text_bytes(buf) {
            Ok(graph) => {
                log::debug!("Decoded {} bytes as text graph", buf.len());
                return Ok(graph);
            }
            Err(e) => errors.push(format!("text: {e}")),
        }

        errors.push(format!("json: {}", json_unsupported()));
        Err(GraphError::Malformed(errors))
    }

    fn from_text_bytes(buf: &[u8]) -> Result<Self, ParseError> {
        let src = std::str::from_utf8(buf).map_err(|e| ParseError::new(1, 1, e.to_string()))?;
        text::parse(src)
    }

    pub fn to_bytes(&self, format: GraphFormat) -> Result<Vec<u8>, GraphError> {
        Ok(match format {
            GraphFormat::Binary => self.encode_to_vec(),
            GraphFormat::Text => text::to_string(self).into_bytes(),
            GraphFormat::Json => json::to_vec_pretty(self)?,
        })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, GraphError> {
        let path = path.as_ref();
        let buf = fs::read(path)?;
        Self::from_bytes(&buf, GraphFormat::for_path(path))
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), GraphError> {
        let path = path.as_ref();
        let format = GraphFormat::for_save(path)?;
        fs::write(path, self.to_bytes(format)?)?;
        Ok(())
    }

    /// Clears all content, including versions, library and debug info.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn nodes(&self) -> &[NodeDef] {
        &self.node
    }

    pub fn node_names(&self) -> impl Iterator<Item = &str> {
        self.node.iter().map(|n| n.name.as_str())
    }

    pub fn contains_node(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.node.iter().position(|n| n.name == name)
    }

    pub fn get_node(&self, name: &str) -> Result<&NodeDef, GraphError> {
        self.node
            .iter()
            .find(|n| n.name == name)
            .ok_or_else(|| GraphError::NotFound(name.to_string()))
    }

    pub fn get_node_mut(&mut self, name: &str) -> Result<&mut NodeDef, GraphError> {
        self.node
            .iter_mut()
            .find(|n| n.name == name)
            .ok_or_else(|| GraphError::NotFound(name.to_string()))
    }

    /// Returns the named nodes in graph order. Fails on the first name that
    /// is not in the graph.
    pub fn get_nodes<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<&NodeDef>, GraphError> {
        let wanted = self.check_present(names)?;
        Ok(self
            .node
            .iter()
            .filter(|n| wanted.contains(n.name.as_str()))
            .collect())
    }

    fn check_present<'a, S: AsRef<str>>(
        &self,
        names: &'a [S],
    ) -> Result<FxHashSet<&'a str>, GraphError> {
        let existing: FxHashSet<&str> = self.node_names().collect();
        names
            .iter()
            .map(AsRef::as_ref)
            .map(|name| {
                if existing.contains(name) {
                    Ok(name)
                } else {
                    Err(GraphError::NotFound(name.to_string()))
                }
            })
            .collect()
    }

    /// Replaces nodes of the same name in place and appends the rest in the
    /// given order. Of several nodes sharing a name, the last one wins.
    pub fn set_nodes(&mut self, nodes: impl IntoIterator<Item = NodeDef>) {
        let mut index: FxHashMap<String, usize> = self
            .node
            .iter()
            .enumerate()
            .map(|(i, n)| (n.name.clone(), i))
            .collect();

        for node in nodes {
            match index.get(&node.name) {
                Some(&i) => self.node[i] = node,
                None => {
                    index.insert(node.name.clone(), self.node.len());
                    self.node.push(node);
                }
            }
        }
    }

    /// Removes exactly the named nodes, keeping the order of the others.
    /// No names clears the node list. If any name is missing, nothing is removed.
    pub fn delete_nodes<S: AsRef<str>>(&mut self, names: &[S]) -> Result<(), GraphError> {
        if names.is_empty() {
            log::debug!("Clearing {} nodes", self.node.len());
            self.node.clear();
            return Ok(());
        }

        let doomed = self.check_present(names)?;
        self.node.retain(|n| !doomed.contains(n.name.as_str()));
        Ok(())
    }

    /// Removes `name` if present.
    pub fn delete_node(&mut self, name: &str) -> bool {
        match self.position(name) {
            Some(i) => {
                self.node.remove(i);
                true
            }
            None => false,
        }
    }

    /// Names of the nodes, in graph order, that satisfy every filter.
    pub fn list_nodes(&self, filters: &[NodeFilter]) -> Vec<&str> {
        self.node
            .iter()
            .filter(|n| filters.iter().all(|f| f.matches(n)))
            .map(|n| n.name.as_str())
            .collect()
    }

    /// Moves the nodes of `other` behind the nodes of `self`. Versions and
    /// library of `self` are kept.
    pub fn append(&mut self, other: GraphDef) -> Result<(), GraphError> {
        let mut names: FxHashSet<&str> = self.node_names().collect();
        if let Some(dup) = other.node.iter().find(|n| !names.insert(n.name.as_str())) {
            return Err(GraphError::AlreadyExists(dup.name.clone()));
        }

        if let Some(library) = other.library.as_ref().filter(|l| !l.is_empty()) {
            log::warn!(
                "Dropping function library of appended graph ({} functions)",
                library.function.len()
            );
        }
        log::debug!(
            "Appending {} nodes to a graph of {} nodes",
            other.node.len(),
            self.node.len()
        );
        self.node.extend(other.node);
        Ok(())
    }

    /// Changes the name of one node. Inputs of other nodes that refer to
    /// `old` are left as they are.
    pub fn rename_node(&mut self, old: &str, new: &str) -> Result<(), GraphError> {
        let i = self
            .position(old)
            .ok_or_else(|| GraphError::NotFound(old.to_string()))?;
        if old == new {
            return Ok(());
        }
        if self.contains_node(new) {
            return Err(GraphError::AlreadyExists(new.to_string()));
        }
        self.node[i].name = new.to_string();
        Ok(())
    }

    /// Like [`GraphDef::rename_node`], then points every `old`, `old:N` and
    /// `^old` input at `new`.
    pub fn rename_node_and_references(&mut self, old: &str, new: &str) -> Result<(), GraphError> {
        self.rename_node(old, new)?;

        let mut rewritten = 0;
        for input in self.node.iter_mut().flat_map(|n| n.input.iter_mut()) {
            let r = InputRef::parse(input);
            if r.node == old {
                *input = r.with_node(new).to_string();
                rewritten += 1;
            }
        }
        log::debug!("Renamed {old} to {new}, rewrote {rewritten} references");
        Ok(())
    }
}

impl FromStr for GraphDef {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(text::parse(s)?)
    }
}

/// Renders the text format.
impl fmt::Display for GraphDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&text::to_string(self))
    }
}

#[cfg(test)]
fn chain() -> GraphDef {
    let mut graph = GraphDef::default();
    graph.set_nodes([
        NodeDef::new("a", "Const"),
        NodeDef::new("b", "Neg").with_input("a"),
        NodeDef::new("c", "Add").with_inputs(["a", "b:0", "^b"]),
    ]);
    graph
}

#[cfg(test)]
fn names(graph: &GraphDef) -> Vec<&str> {
    graph.node_names().collect()
}

#[test]
fn set_nodes_replaces_in_place() {
    let mut graph = chain();
    graph.set_nodes([
        NodeDef::new("z", "Const"),
        NodeDef::new("b", "Abs").with_input("a"),
        NodeDef::new("y", "Const"),
    ]);
    assert_eq!(names(&graph), ["a", "b", "c", "z", "y"]);
    assert_eq!(graph.get_node("b").unwrap().op, "Abs");

    graph.set_nodes([NodeDef::new("w", "Const"), NodeDef::new("w", "Identity")]);
    assert_eq!(names(&graph).len(), 6);
    assert_eq!(graph.get_node("w").unwrap().op, "Identity");
}

#[test]
fn get_nodes() {
    let graph = chain();
    let nodes = graph.get_nodes(&["c", "a"]).unwrap();
    assert_eq!(nodes.iter().map(|n| n.name.as_str()).collect::<Vec<_>>(), ["a", "c"]);

    match graph.get_nodes(&["a", "nope", "gone"]) {
        Err(GraphError::NotFound(name)) => assert_eq!(name, "nope"),
        other => panic!("unexpected {other:?}"),
    }
    assert!(matches!(graph.get_node("nope"), Err(GraphError::NotFound(_))));
}

#[test]
fn delete_nodes() {
    let mut graph = chain();
    graph.delete_nodes(&["b"]).unwrap();
    assert_eq!(names(&graph), ["a", "c"]);

    match graph.delete_nodes(&["a", "missing"]) {
        Err(GraphError::NotFound(name)) => assert_eq!(name, "missing"),
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(names(&graph), ["a", "c"]);

    graph.delete_nodes::<&str>(&[]).unwrap();
    assert!(graph.nodes().is_empty());
}

#[test]
fn delete_single_node() {
    let mut graph = chain();
    assert!(graph.delete_node("a"));
    assert!(!graph.delete_node("a"));
    assert_eq!(names(&graph), ["b", "c"]);
}

#[test]
fn append_graphs() {
    let mut graph = chain();
    let mut other = GraphDef::default();
    other.set_nodes([NodeDef::new("d", "Const"), NodeDef::new("e", "Neg").with_input("d")]);
    graph.append(other).unwrap();
    assert_eq!(names(&graph), ["a", "b", "c", "d", "e"]);

    let mut clash = GraphDef::default();
    clash.set_nodes([NodeDef::new("f", "Const"), NodeDef::new("c", "Const")]);
    match graph.append(clash) {
        Err(GraphError::AlreadyExists(name)) => assert_eq!(name, "c"),
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(names(&graph).len(), 5);

    let mut twice = GraphDef::default();
    twice.node = vec![NodeDef::new("g", "Const"), NodeDef::new("g", "Const")];
    assert!(matches!(graph.append(twice), Err(GraphError::AlreadyExists(_))));
    assert_eq!(names(&graph).len(), 5);
}

#[test]
fn rename_keeps_references() {
    let mut graph = chain();
    graph.rename_node("a", "x").unwrap();
    assert_eq!(names(&graph), ["x", "b", "c"]);
    assert_eq!(graph.get_node("b").unwrap().input, ["a"]);

    assert!(matches!(
        graph.rename_node("b", "c"),
        Err(GraphError::AlreadyExists(_))
    ));
    assert!(matches!(
        graph.rename_node("a", "y"),
        Err(GraphError::NotFound(_))
    ));
    graph.rename_node("b", "b").unwrap();
    assert_eq!(names(&graph), ["x", "b", "c"]);
}

#[test]
fn rename_rewrites_references() {
    let mut graph = chain();
    graph.rename_node_and_references("b", "neg").unwrap();
    assert_eq!(graph.get_node("c").unwrap().input, ["a", "neg:0", "^neg"]);
    assert_eq!(graph.get_node("neg").unwrap().input, ["a"]);
}

#[test]
fn formats_from_paths() {
    assert_eq!(GraphFormat::for_path(Path::new("g.PB")), Some(GraphFormat::Binary));
    assert_eq!(GraphFormat::for_path(Path::new("g.pbtext")), Some(GraphFormat::Text));
    assert_eq!(GraphFormat::for_path(Path::new("g.data")), None);
    assert_eq!(GraphFormat::for_path(Path::new("graph")), None);

    assert_eq!(GraphFormat::for_save(Path::new("graph")).unwrap(), GraphFormat::Binary);
    assert_eq!(GraphFormat::for_save(Path::new("g.json")).unwrap(), GraphFormat::Json);
    assert!(matches!(
        GraphFormat::for_save(Path::new("g.yaml")),
        Err(GraphError::Unsupported(_))
    ));
    assert_eq!("pbtxt".parse::<GraphFormat>().unwrap(), GraphFormat::Text);
}

#[test]
fn detect_formats() {
    let graph = chain();
    let binary = graph.to_bytes(GraphFormat::Binary).unwrap();
    let text = graph.to_bytes(GraphFormat::Text).unwrap();
    assert_eq!(GraphDef::from_bytes(&binary, None).unwrap(), graph);
    assert_eq!(GraphDef::from_bytes(&text, None).unwrap(), graph);
    assert_eq!(GraphDef::from_bytes(&text, Some(GraphFormat::Text)).unwrap(), graph);

    let json = graph.to_bytes(GraphFormat::Json).unwrap();
    assert!(matches!(
        GraphDef::from_bytes(&json, Some(GraphFormat::Json)),
        Err(GraphError::Unsupported(_))
    ));
    match GraphDef::from_bytes(b"\x07\x01garbage", None) {
        Err(GraphError::Malformed(errors)) => {
            assert_eq!(errors.len(), 3);
            assert!(errors[0].starts_with("binary"));
            assert!(errors[1].starts_with("text"));
            assert!(errors[2].starts_with("json"));
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn deeply_nested_text_is_malformed() {
    let buf = "node {".repeat(200_000);
    match GraphDef::from_bytes(buf.as_bytes(), None) {
        Err(GraphError::Malformed(errors)) => {
            assert_eq!(errors.len(), 3);
            assert!(errors[1].contains("nested"), "{}", errors[1]);
        }
        other => panic!("unexpected {other:?}"),
    }
}
