use std::fmt;

use thiserror::Error;

use crate::{
    node::{CONST_OP, PLACEHOLDER_OP},
    proto::NodeDef,
};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SelectorError {
    #[error("Selector {0} is not formatted as key=value")]
    Format(String),

    #[error("Selector key {0} is not valid, use op, operation or input")]
    UnknownKey(String),
}

/// A predicate over the nodes of a graph.
pub enum NodeFilter {
    /// Operation type equals the given string.
    Op(String),
    /// Every listed string appears among the node's inputs. An empty list
    /// matches nodes without inputs.
    Inputs(Vec<String>),
    Custom(Box<dyn Fn(&NodeDef) -> bool>),
}

impl NodeFilter {
    pub fn op(op: impl Into<String>) -> Self {
        Self::Op(op.into())
    }

    pub fn inputs<I, S>(inputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Inputs(inputs.into_iter().map(Into::into).collect())
    }

    pub fn custom(f: impl Fn(&NodeDef) -> bool + 'static) -> Self {
        Self::Custom(Box::new(f))
    }

    pub fn matches(&self, node: &NodeDef) -> bool {
        match self {
            Self::Op(op) => node.op == *op,
            Self::Inputs(inputs) if inputs.is_empty() => node.input.is_empty(),
            Self::Inputs(inputs) => inputs.iter().all(|i| node.input.contains(i)),
            Self::Custom(f) => f(node),
        }
    }
}

impl fmt::Debug for NodeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Op(op) => f.debug_tuple("Op").field(op).finish(),
            Self::Inputs(inputs) => f.debug_tuple("Inputs").field(inputs).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Maps the short spellings `const`, `constant` and `placeholder` to the
/// engine's operation names.
pub fn canonical_op(op: &str) -> &str {
    match op.to_ascii_lowercase().as_str() {
        "const" | "constant" => CONST_OP,
        "placeholder" => PLACEHOLDER_OP,
        _ => op,
    }
}

/// Parses `key=value` selectors. `op`/`operation` select by operation type,
/// repeated `input` selectors combine into a single [`NodeFilter::Inputs`].
pub fn parse_selectors<S: AsRef<str>>(selectors: &[S]) -> Result<Vec<NodeFilter>, SelectorError> {
    let mut filters = Vec::with_capacity(selectors.len());
    let mut inputs = Vec::new();

    for selector in selectors.iter().map(AsRef::as_ref) {
        let (key, value) = match selector.split_once('=') {
            Some((key, value)) if !key.is_empty() && !value.contains('=') => (key, value),
            _ => return Err(SelectorError::Format(selector.to_string())),
        };

        match key.to_ascii_lowercase().as_str() {
            "op" | "operation" => filters.push(NodeFilter::op(canonical_op(value))),
            "input" => inputs.push(value.to_string()),
            _ => return Err(SelectorError::UnknownKey(key.to_string())),
        }
    }

    if !inputs.is_empty() {
        filters.push(NodeFilter::Inputs(inputs));
    }
    Ok(filters)
}

#[test]
fn filter_nodes() {
    let a = NodeDef::new("a", "Const");
    let b = NodeDef::new("b", "MatMul").with_inputs(["a", "x"]);

    assert!(NodeFilter::op("Const").matches(&a));
    assert!(!NodeFilter::op("const").matches(&a));
    assert!(NodeFilter::inputs(["x", "a"]).matches(&b));
    assert!(!NodeFilter::inputs(["a", "y"]).matches(&b));

    let no_inputs = NodeFilter::inputs(Vec::<String>::new());
    assert!(no_inputs.matches(&a));
    assert!(!no_inputs.matches(&b));

    let custom = NodeFilter::custom(|n| n.name.starts_with('b'));
    assert!(custom.matches(&b));
    assert_eq!(format!("{custom:?}"), "Custom(..)");
}

#[test]
fn parse_selector_tokens() {
    let filters = parse_selectors(&["OP=constant", "input=a", "Input=x"]).unwrap();
    assert_eq!(filters.len(), 2);
    assert!(matches!(&filters[0], NodeFilter::Op(op) if op == "Const"));
    assert!(matches!(&filters[1], NodeFilter::Inputs(i) if i == &["a", "x"]));

    let filters = parse_selectors(&["operation=Placeholder", "op=MatMul"]).unwrap();
    assert!(matches!(&filters[0], NodeFilter::Op(op) if op == "Placeholder"));
    assert!(matches!(&filters[1], NodeFilter::Op(op) if op == "MatMul"));

    assert!(parse_selectors::<&str>(&[]).unwrap().is_empty());
    assert_eq!(
        parse_selectors(&["op"]).unwrap_err(),
        SelectorError::Format("op".into())
    );
    assert_eq!(
        parse_selectors(&["a=b=c"]).unwrap_err(),
        SelectorError::Format("a=b=c".into())
    );
    assert_eq!(
        parse_selectors(&["device=cpu"]).unwrap_err(),
        SelectorError::UnknownKey("device".into())
    );
}
