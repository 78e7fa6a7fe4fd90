use std::fmt;

use crate::{
    attr::{self, AttrMap, SHAPE_ATTR, VALUE_ATTR},
    proto::{DataType, NodeDef, TensorProto},
    tensor::{Tensor, TensorError},
};

pub const CONST_OP: &str = "Const";
pub const PLACEHOLDER_OP: &str = "Placeholder";

/// One entry of a node's input list: `name`, `name:slot` or `^name`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputRef<'a> {
    pub node: &'a str,
    pub slot: Option<&'a str>,
    pub control: bool,
}

impl<'a> InputRef<'a> {
    pub fn parse(input: &'a str) -> Self {
        let (control, body) = match input.strip_prefix('^') {
            Some(body) => (true, body),
            None => (false, input),
        };
        match body.rsplit_once(':') {
            Some((node, slot)) if !slot.is_empty() && slot.bytes().all(|b| b.is_ascii_digit()) => {
                Self {
                    node,
                    slot: Some(slot),
                    control,
                }
            }
            _ => Self {
                node: body,
                slot: None,
                control,
            },
        }
    }

    pub fn with_node(self, node: &'a str) -> Self {
        Self { node, ..self }
    }
}

impl fmt::Display for InputRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.control {
            write!(f, "^")?;
        }
        write!(f, "{}", self.node)?;
        if let Some(slot) = self.slot {
            write!(f, ":{slot}")?;
        }
        Ok(())
    }
}

impl NodeDef {
    pub fn new(name: impl Into<String>, op: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            op: op.into(),
            ..Default::default()
        }
    }

    /// A `Const` node embedding `tensor`.
    pub fn constant(name: impl Into<String>, tensor: &Tensor) -> Result<Self, TensorError> {
        Ok(Self::new(name, CONST_OP).with_attrs(attr::from_tensor(tensor)?))
    }

    pub fn constant_from_proto(name: impl Into<String>, proto: TensorProto) -> Self {
        Self::new(name, CONST_OP).with_attrs(attr::from_tensor_proto(proto))
    }

    /// A `Placeholder` node declaring only its element type.
    pub fn placeholder(name: impl Into<String>, ty: DataType) -> Self {
        Self::new(name, PLACEHOLDER_OP).with_attrs(attr::from_data_type(ty))
    }

    pub fn with_attrs(mut self, attrs: AttrMap) -> Self {
        self.attr = attrs;
        self
    }

    pub fn with_input(mut self, input: impl Into<String>) -> Self {
        self.input.push(input.into());
        self
    }

    pub fn with_inputs<I, S>(mut self, inputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.input.extend(inputs.into_iter().map(Into::into));
        self
    }

    pub fn with_device(mut self, device: impl Into<String>) -> Self {
        self.device = device.into();
        self
    }

    /// Declares the output shape, `-1` marking an unknown dimension.
    pub fn with_shape(mut self, dims: &[i64]) -> Self {
        self.attr
            .insert(SHAPE_ATTR.to_string(), attr::shape_proto(dims).into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn op(&self) -> &str {
        &self.op
    }

    pub fn inputs(&self) -> &[String] {
        &self.input
    }

    pub fn attrs(&self) -> &AttrMap {
        &self.attr
    }

    pub fn attrs_mut(&mut self) -> &mut AttrMap {
        &mut self.attr
    }

    /// Copies out the entries named by `keys`. Unknown keys are skipped.
    pub fn select_attrs(&self, keys: &[&str]) -> AttrMap {
        self.attr
            .iter()
            .filter(|(k, _)| keys.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn set_attrs(&mut self, attrs: AttrMap) {
        self.attr = attrs;
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn set_device(&mut self, device: impl Into<String>) {
        self.device = device.into();
    }

    pub fn is_constant(&self) -> bool {
        self.op == CONST_OP
    }

    /// Decodes the payload embedded under the `value` attribute.
    pub fn constant_value(&self) -> Result<Tensor, TensorError> {
        let proto = self
            .attr
            .get(VALUE_ATTR)
            .and_then(|v| v.tensor())
            .ok_or_else(|| {
                TensorError::Malformed(format!("node {} has no tensor value", self.name).into())
            })?;
        Tensor::try_from(proto)
    }
}

#[test]
fn build_nodes() {
    let node = NodeDef::new("mul", "MatMul")
        .with_inputs(["x", "y"])
        .with_input("^init")
        .with_device("/device:CPU:0");
    assert_eq!(node.name(), "mul");
    assert_eq!(node.op(), "MatMul");
    assert_eq!(node.inputs(), &["x", "y", "^init"]);
    assert_eq!(node.device(), "/device:CPU:0");
    assert!(node.attrs().is_empty());
}

#[test]
fn parse_input_refs() {
    let plain = InputRef::parse("scope/x");
    assert_eq!((plain.node, plain.slot, plain.control), ("scope/x", None, false));

    let slot = InputRef::parse("split:1");
    assert_eq!((slot.node, slot.slot, slot.control), ("split", Some("1"), false));

    let control = InputRef::parse("^init");
    assert_eq!((control.node, control.control), ("init", true));

    assert_eq!(InputRef::parse("odd:name").node, "odd:name");
    assert_eq!(InputRef::parse("split:1").with_node("p/split").to_string(), "p/split:1");
    assert_eq!(InputRef::parse("^init").to_string(), "^init");
}

#[test]
fn constant_and_placeholder() {
    let t = Tensor::new(vec![2, 2], vec![1i32, 2, 3, 4]).unwrap();
    let c = NodeDef::constant("x", &t).unwrap();
    assert!(c.is_constant());
    assert!(c.inputs().is_empty());
    assert_eq!(c.constant_value().unwrap(), t);

    let p = NodeDef::placeholder("in", DataType::DtFloat).with_shape(&[-1, 2]);
    assert_eq!(p.op(), PLACEHOLDER_OP);
    assert_eq!(p.attrs().len(), 2);
    assert!(p.constant_value().is_err());
}

#[test]
fn select_and_replace_attrs() {
    let t = Tensor::scalar(1.5f32);
    let mut node = NodeDef::constant("c", &t).unwrap();

    let dtype = node.select_attrs(&[attr::DTYPE_ATTR, "missing"]);
    assert_eq!(dtype.len(), 1);
    assert!(dtype.contains_key(attr::DTYPE_ATTR));
    assert!(node.select_attrs(&[]).is_empty());

    node.set_attrs(attr::from_data_type(DataType::DtBool));
    assert_eq!(node.attrs().len(), 1);
    node.set_device("/device:GPU:0");
    assert_eq!(node.device(), "/device:GPU:0");
}
