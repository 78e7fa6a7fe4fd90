use std::collections::BTreeMap;

use crate::{
    proto::{
        attr_value::{ListValue, Value},
        tensor_shape_proto::Dim,
        AttrValue, DataType, TensorProto, TensorShapeProto,
    },
    tensor::{Tensor, TensorError},
};

pub type AttrMap = BTreeMap<String, AttrValue>;

/// Key of the embedded payload of a constant node.
pub const VALUE_ATTR: &str = "value";
/// Key of the declared element type. Constant nodes repeat it next to the
/// payload since the engine reads it independently.
pub const DTYPE_ATTR: &str = "dtype";
/// Key of a placeholder's declared shape.
pub const SHAPE_ATTR: &str = "shape";

/// Builds the attributes of a constant node holding `tensor`.
pub fn from_tensor(tensor: &Tensor) -> Result<AttrMap, TensorError> {
    Ok(from_tensor_proto(tensor.to_proto()?))
}

/// Builds the `value` and `dtype` attributes from an already serialized tensor.
pub fn from_tensor_proto(proto: TensorProto) -> AttrMap {
    let dtype = AttrValue::from_raw_type(proto.dtype);
    AttrMap::from([
        (VALUE_ATTR.to_string(), AttrValue::from(proto)),
        (DTYPE_ATTR.to_string(), dtype),
    ])
}

/// Builds the single `dtype` attribute of a placeholder.
pub fn from_data_type(ty: DataType) -> AttrMap {
    AttrMap::from([(DTYPE_ATTR.to_string(), AttrValue::from(ty))])
}

/// Shape descriptor for possibly partially known dimensions (`-1` = unknown).
pub fn shape_proto(dims: &[i64]) -> TensorShapeProto {
    TensorShapeProto {
        dim: dims
            .iter()
            .map(|&size| Dim {
                size,
                name: String::new(),
            })
            .collect(),
        unknown_rank: false,
    }
}

impl AttrValue {
    pub fn new(value: Value) -> Self {
        Self { value: Some(value) }
    }

    /// A type attribute holding an enum value that may be unknown to this schema.
    pub fn from_raw_type(ty: i32) -> Self {
        Self::new(Value::Type(ty))
    }

    pub fn data_type(&self) -> Option<DataType> {
        match &self.value {
            Some(Value::Type(ty)) => DataType::from_i32(*ty),
            _ => None,
        }
    }

    pub fn tensor(&self) -> Option<&TensorProto> {
        match &self.value {
            Some(Value::Tensor(t)) => Some(t),
            _ => None,
        }
    }

    pub fn shape(&self) -> Option<&TensorShapeProto> {
        match &self.value {
            Some(Value::Shape(s)) => Some(s),
            _ => None,
        }
    }

    pub fn list(&self) -> Option<&ListValue> {
        match &self.value {
            Some(Value::List(l)) => Some(l),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self.value {
            Some(Value::B(b)) => Some(b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self.value {
            Some(Value::I(i)) => Some(i),
            _ => None,
        }
    }

    pub fn as_f32(&self) -> Option<f32> {
        match self.value {
            Some(Value::F(f)) => Some(f),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match &self.value {
            Some(Value::S(s)) => Some(s),
            _ => None,
        }
    }
}

impl From<DataType> for AttrValue {
    fn from(ty: DataType) -> Self {
        Self::new(Value::Type(ty as i32))
    }
}

impl From<bool> for AttrValue {
    fn from(b: bool) -> Self {
        Self::new(Value::B(b))
    }
}

impl From<i64> for AttrValue {
    fn from(i: i64) -> Self {
        Self::new(Value::I(i))
    }
}

impl From<f32> for AttrValue {
    fn from(f: f32) -> Self {
        Self::new(Value::F(f))
    }
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        Self::new(Value::S(s.as_bytes().to_vec()))
    }
}

impl From<TensorShapeProto> for AttrValue {
    fn from(shape: TensorShapeProto) -> Self {
        Self::new(Value::Shape(shape))
    }
}

impl From<TensorProto> for AttrValue {
    fn from(tensor: TensorProto) -> Self {
        Self::new(Value::Tensor(tensor))
    }
}

impl From<ListValue> for AttrValue {
    fn from(list: ListValue) -> Self {
        Self::new(Value::List(list))
    }
}

#[test]
fn constant_attrs() {
    let t = Tensor::new(vec![2, 2], vec![1.0f64, 2.0, 3.0, 4.0]).unwrap();
    let attrs = from_tensor(&t).unwrap();
    assert_eq!(attrs.len(), 2);
    assert_eq!(attrs[DTYPE_ATTR].data_type(), Some(DataType::DtDouble));

    let value = attrs[VALUE_ATTR].tensor().unwrap();
    assert_eq!(value.dtype, DataType::DtDouble as i32);
    assert_eq!(value.tensor_content.len(), 32);
    let dims: Vec<i64> = value
        .tensor_shape
        .as_ref()
        .unwrap()
        .dim
        .iter()
        .map(|d| d.size)
        .collect();
    assert_eq!(dims, vec![2, 2]);
    assert_eq!(Tensor::try_from(value).unwrap(), t);
}

#[test]
fn placeholder_attrs() {
    let attrs = from_data_type(DataType::DtInt64);
    assert_eq!(attrs.len(), 1);
    assert_eq!(attrs[DTYPE_ATTR].data_type(), Some(DataType::DtInt64));
    assert!(attrs[DTYPE_ATTR].tensor().is_none());

    let shape = AttrValue::from(shape_proto(&[-1, 3]));
    assert_eq!(shape.shape().unwrap().dim[0].size, -1);
    assert!(!shape.shape().unwrap().unknown_rank);
}

#[test]
fn scalar_accessors() {
    assert_eq!(AttrValue::from(true).as_bool(), Some(true));
    assert_eq!(AttrValue::from(7i64).as_i64(), Some(7));
    assert_eq!(AttrValue::from(0.5f32).as_f32(), Some(0.5));
    assert_eq!(AttrValue::from("VALID").as_bytes(), Some(&b"VALID"[..]));
    assert_eq!(AttrValue::from(7i64).as_bool(), None);
    assert_eq!(AttrValue::from_raw_type(999).data_type(), None);
    assert_eq!(AttrValue::default().list(), None);
}
