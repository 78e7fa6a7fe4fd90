use std::{borrow::Cow, fmt};

use ndarray::{ArrayD, IxDyn};
use num_complex::{Complex32, Complex64};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::{
    proto::{DataType, TensorProto},
    shape::Shape,
};

pub const TYPE_TENSOR: &str = "tensor";
pub const TYPE_SCALAR: &str = "scalar";

/// Upper bound on the bytes a padded value list may expand to.
const MAX_EXPANDED_BYTES: usize = i32::MAX as usize;

#[derive(Error, Debug)]
pub enum TensorError {
    #[error("Shape {shape:?} holds {expected} elements but {actual} were given")]
    ShapeMismatch {
        shape: Shape,
        expected: usize,
        actual: usize,
    },

    #[error("Tensor holds {actual:?} elements, not {expected:?}")]
    TypeMismatch {
        expected: TensorElemType,
        actual: TensorElemType,
    },

    #[error("Shape {0:?} has a zero-sized dimension")]
    ZeroDimension(Shape),

    #[error("Unsupported data type: {0}")]
    UnsupportedDataType(Cow<'static, str>),

    #[error("Malformed tensor: {0}")]
    Malformed(Cow<'static, str>),

    #[error("Invalid tensor envelope: {0}")]
    Envelope(Cow<'static, str>),

    #[error("Json: {0}")]
    Json(#[from] serde_json::Error),
}

/// A dense tensor of one of the element kinds the engine can embed in a graph.
///
/// Elements are stored flat in row-major order. A tensor with an empty shape is
/// a scalar holding exactly one element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Envelope", into = "Envelope")]
pub struct Tensor {
    dims: Shape,
    data: TensorData,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TensorData {
    Bool(Vec<bool>),
    I8(Vec<i8>),
    I16(Vec<i16>),
    I32(Vec<i32>),
    I64(Vec<i64>),
    U8(Vec<u8>),
    U16(Vec<u16>),
    U32(Vec<u32>),
    U64(Vec<u64>),
    F32(Vec<f32>),
    F64(Vec<f64>),
    C64(Vec<Complex32>),
    C128(Vec<Complex64>),
    String(Vec<String>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TensorElemType {
    Bool,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    C64,
    C128,
    String,
}

pub trait TensorElemTypeExt: Clone + PartialEq + fmt::Debug + Sized {
    fn get_type() -> TensorElemType;
    fn into_data(data: Vec<Self>) -> TensorData;
    fn from_data(data: &TensorData) -> Option<&[Self]>;
}

macro_rules! each_variant {
    ($data:expr, $v:ident => $body:expr) => {
        match $data {
            TensorData::Bool($v) => $body,
            TensorData::I8($v) => $body,
            TensorData::I16($v) => $body,
            TensorData::I32($v) => $body,
            TensorData::I64($v) => $body,
            TensorData::U8($v) => $body,
            TensorData::U16($v) => $body,
            TensorData::U32($v) => $body,
            TensorData::U64($v) => $body,
            TensorData::F32($v) => $body,
            TensorData::F64($v) => $body,
            TensorData::C64($v) => $body,
            TensorData::C128($v) => $body,
            TensorData::String($v) => $body,
        }
    };
}

macro_rules! elem_types {
    ($($ty:ty => $variant:ident),* $(,)?) => {$(
        impl TensorElemTypeExt for $ty {
            fn get_type() -> TensorElemType {
                TensorElemType::$variant
            }

            fn into_data(data: Vec<Self>) -> TensorData {
                TensorData::$variant(data)
            }

            fn from_data(data: &TensorData) -> Option<&[Self]> {
                match data {
                    TensorData::$variant(v) => Some(v.as_slice()),
                    _ => None,
                }
            }
        }
    )*};
}

elem_types!(
    bool => Bool,
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    u8 => U8,
    u16 => U16,
    u32 => U32,
    u64 => U64,
    f32 => F32,
    f64 => F64,
    Complex32 => C64,
    Complex64 => C128,
    String => String,
);

impl TensorData {
    pub fn len(&self) -> usize {
        each_variant!(self, v => v.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn elem_ty(&self) -> TensorElemType {
        match self {
            TensorData::Bool(_) => TensorElemType::Bool,
            TensorData::I8(_) => TensorElemType::I8,
            TensorData::I16(_) => TensorElemType::I16,
            TensorData::I32(_) => TensorElemType::I32,
            TensorData::I64(_) => TensorElemType::I64,
            TensorData::U8(_) => TensorElemType::U8,
            TensorData::U16(_) => TensorElemType::U16,
            TensorData::U32(_) => TensorElemType::U32,
            TensorData::U64(_) => TensorElemType::U64,
            TensorData::F32(_) => TensorElemType::F32,
            TensorData::F64(_) => TensorElemType::F64,
            TensorData::C64(_) => TensorElemType::C64,
            TensorData::C128(_) => TensorElemType::C128,
            TensorData::String(_) => TensorElemType::String,
        }
    }
}

impl Tensor {
    pub fn new<T: TensorElemTypeExt>(
        dims: impl Into<Shape>,
        data: Vec<T>,
    ) -> Result<Self, TensorError> {
        Self::from_data(dims, T::into_data(data))
    }

    /// Every dimension of `dims` must be at least one.
    pub fn from_data(dims: impl Into<Shape>, data: TensorData) -> Result<Self, TensorError> {
        let dims = dims.into();
        if dims.as_slice().contains(&0) {
            return Err(TensorError::ZeroDimension(dims));
        }
        Self::from_engine_data(dims, data)
    }

    /// Like [`Tensor::from_data`] but also accepts the empty tensors the engine
    /// produces and embeds in graphs.
    pub fn from_engine_data(dims: impl Into<Shape>, data: TensorData) -> Result<Self, TensorError> {
        let dims = dims.into();
        let expected = dims
            .checked_total_elems()
            .ok_or_else(|| TensorError::Malformed(format!("shape {dims:?} is too large").into()))?;
        if expected != data.len() {
            return Err(TensorError::ShapeMismatch {
                shape: dims,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self { dims, data })
    }

    /// A rank-1 tensor holding `data`.
    pub fn vector<T: TensorElemTypeExt>(data: Vec<T>) -> Result<Self, TensorError> {
        Self::from_data(vec![data.len()], T::into_data(data))
    }

    pub fn scalar<T: TensorElemTypeExt>(value: T) -> Self {
        Self {
            dims: Shape::scalar(),
            data: T::into_data(vec![value]),
        }
    }

    pub fn dims(&self) -> &Shape {
        &self.dims
    }

    pub fn elem_ty(&self) -> TensorElemType {
        self.data.elem_ty()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn is_scalar(&self) -> bool {
        self.dims.is_scalar()
    }

    pub fn raw_data(&self) -> &TensorData {
        &self.data
    }

    pub fn into_raw_data(self) -> TensorData {
        self.data
    }

    pub fn data<T: TensorElemTypeExt>(&self) -> Result<&[T], TensorError> {
        T::from_data(&self.data).ok_or(TensorError::TypeMismatch {
            expected: T::get_type(),
            actual: self.elem_ty(),
        })
    }

    pub fn to_array<T: TensorElemTypeExt>(&self) -> Result<ArrayD<T>, TensorError> {
        let data = self.data::<T>()?.to_vec();
        ArrayD::from_shape_vec(IxDyn(self.dims.as_slice()), data)
            .map_err(|e| TensorError::Malformed(e.to_string().into()))
    }

    /// Serializes the tensor the way the engine embeds constants: numeric and
    /// boolean payloads as little-endian `tensor_content`, strings as
    /// `string_val`.
    pub fn to_proto(&self) -> Result<TensorProto, TensorError> {
        let expected = self.dims.total_elems();
        if expected != self.len() {
            return Err(TensorError::ShapeMismatch {
                shape: self.dims.clone(),
                expected,
                actual: self.len(),
            });
        }

        let mut proto = TensorProto {
            dtype: self.elem_ty().data_type() as i32,
            tensor_shape: Some(self.dims.to_proto()),
            ..Default::default()
        };
        match &self.data {
            TensorData::String(v) => {
                proto.string_val = v.iter().map(|s| s.as_bytes().to_vec()).collect()
            }
            data => proto.tensor_content = encode_content(data),
        }
        Ok(proto)
    }

    /// Decodes a JSON envelope, requiring its element type to be `T`.
    pub fn from_json_as<T: TensorElemTypeExt>(json: &[u8]) -> Result<Self, TensorError> {
        let envelope: Envelope = serde_json::from_slice(json)?;
        let expected = T::get_type();
        if TensorElemType::from_type_name(&envelope.go_data_type) != Some(expected) {
            return Err(TensorError::Envelope(
                format!(
                    "expected goDataType {}, found {}",
                    expected.type_name(),
                    envelope.go_data_type
                )
                .into(),
            ));
        }
        Self::try_from(envelope)
    }
}

impl TensorElemType {
    pub fn data_type(&self) -> DataType {
        match self {
            TensorElemType::Bool => DataType::DtBool,
            TensorElemType::I8 => DataType::DtInt8,
            TensorElemType::I16 => DataType::DtInt16,
            TensorElemType::I32 => DataType::DtInt32,
            TensorElemType::I64 => DataType::DtInt64,
            TensorElemType::U8 => DataType::DtUint8,
            TensorElemType::U16 => DataType::DtUint16,
            TensorElemType::U32 => DataType::DtUint32,
            TensorElemType::U64 => DataType::DtUint64,
            TensorElemType::F32 => DataType::DtFloat,
            TensorElemType::F64 => DataType::DtDouble,
            TensorElemType::C64 => DataType::DtComplex64,
            TensorElemType::C128 => DataType::DtComplex128,
            TensorElemType::String => DataType::DtString,
        }
    }

    pub fn from_data_type(ty: DataType) -> Result<Self, TensorError> {
        Ok(match ty {
            DataType::DtBool => TensorElemType::Bool,
            DataType::DtInt8 => TensorElemType::I8,
            DataType::DtInt16 => TensorElemType::I16,
            DataType::DtInt32 => TensorElemType::I32,
            DataType::DtInt64 => TensorElemType::I64,
            DataType::DtUint8 => TensorElemType::U8,
            DataType::DtUint16 => TensorElemType::U16,
            DataType::DtUint32 => TensorElemType::U32,
            DataType::DtUint64 => TensorElemType::U64,
            DataType::DtFloat => TensorElemType::F32,
            DataType::DtDouble => TensorElemType::F64,
            DataType::DtComplex64 => TensorElemType::C64,
            DataType::DtComplex128 => TensorElemType::C128,
            DataType::DtString => TensorElemType::String,
            ty => return Err(TensorError::UnsupportedDataType(ty.name().into())),
        })
    }

    /// Bytes per element in `tensor_content`; `None` for strings.
    pub fn size(&self) -> Option<usize> {
        Some(match self {
            TensorElemType::Bool | TensorElemType::I8 | TensorElemType::U8 => 1,
            TensorElemType::I16 | TensorElemType::U16 => 2,
            TensorElemType::I32 | TensorElemType::U32 | TensorElemType::F32 => 4,
            TensorElemType::I64 | TensorElemType::U64 | TensorElemType::F64 => 8,
            TensorElemType::C64 => 8,
            TensorElemType::C128 => 16,
            TensorElemType::String => return None,
        })
    }

    /// Element name recorded as `goDataType` in the JSON envelope.
    pub fn type_name(&self) -> &'static str {
        match self {
            TensorElemType::Bool => "bool",
            TensorElemType::I8 => "int8",
            TensorElemType::I16 => "int16",
            TensorElemType::I32 => "int32",
            TensorElemType::I64 => "int64",
            TensorElemType::U8 => "uint8",
            TensorElemType::U16 => "uint16",
            TensorElemType::U32 => "uint32",
            TensorElemType::U64 => "uint64",
            TensorElemType::F32 => "float32",
            TensorElemType::F64 => "float64",
            TensorElemType::C64 => "complex64",
            TensorElemType::C128 => "complex128",
            TensorElemType::String => "string",
        }
    }

    pub fn from_type_name(name: &str) -> Option<Self> {
        Some(match name {
            "bool" => TensorElemType::Bool,
            "int8" => TensorElemType::I8,
            "int16" => TensorElemType::I16,
            "int32" => TensorElemType::I32,
            "int64" => TensorElemType::I64,
            "uint8" | "byte" => TensorElemType::U8,
            "uint16" => TensorElemType::U16,
            "uint32" => TensorElemType::U32,
            "uint64" => TensorElemType::U64,
            "float32" => TensorElemType::F32,
            "float64" => TensorElemType::F64,
            "complex64" => TensorElemType::C64,
            "complex128" => TensorElemType::C128,
            "string" => TensorElemType::String,
            _ => return None,
        })
    }

    /// Engine data type name recorded as `tfDataType` in the JSON envelope.
    pub fn tf_name(&self) -> &'static str {
        match self {
            TensorElemType::Bool => "Bool",
            TensorElemType::I8 => "Int8",
            TensorElemType::I16 => "Int16",
            TensorElemType::I32 => "Int32",
            TensorElemType::I64 => "Int64",
            TensorElemType::U8 => "Uint8",
            TensorElemType::U16 => "Uint16",
            TensorElemType::U32 => "Uint32",
            TensorElemType::U64 => "Uint64",
            TensorElemType::F32 => "Float",
            TensorElemType::F64 => "Double",
            TensorElemType::C64 => "Complex64",
            TensorElemType::C128 => "Complex128",
            TensorElemType::String => "String",
        }
    }

    pub fn is_complex(&self) -> bool {
        matches!(self, Self::C64 | Self::C128)
    }
}

fn encode_content(data: &TensorData) -> Vec<u8> {
    match data {
        TensorData::Bool(v) => v.iter().map(|&b| b as u8).collect(),
        TensorData::I8(v) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
        TensorData::I16(v) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
        TensorData::I32(v) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
        TensorData::I64(v) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
        TensorData::U8(v) => v.clone(),
        TensorData::U16(v) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
        TensorData::U32(v) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
        TensorData::U64(v) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
        TensorData::F32(v) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
        TensorData::F64(v) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
        TensorData::C64(v) => v
            .iter()
            .flat_map(|c| c.re.to_le_bytes().into_iter().chain(c.im.to_le_bytes()))
            .collect(),
        TensorData::C128(v) => v
            .iter()
            .flat_map(|c| c.re.to_le_bytes().into_iter().chain(c.im.to_le_bytes()))
            .collect(),
        TensorData::String(_) => Vec::new(),
    }
}

fn array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut a = [0; N];
    a.copy_from_slice(bytes);
    a
}

fn decode_content(
    elem_ty: TensorElemType,
    content: &[u8],
    total_elems: usize,
) -> Result<TensorData, TensorError> {
    let string_content =
        || TensorError::Malformed("string tensors cannot be stored as tensor_content".into());
    let size = elem_ty.size().ok_or_else(string_content)?;
    let expected = total_elems.checked_mul(size).ok_or_else(|| {
        TensorError::Malformed(format!("{total_elems} {elem_ty:?} elements are too large").into())
    })?;
    if content.len() != expected {
        return Err(TensorError::Malformed(
            format!(
                "tensor_content has {} bytes, expected {expected} for {total_elems} {elem_ty:?} elements",
                content.len(),
            )
            .into(),
        ));
    }

    macro_rules! le {
        ($ty:ty) => {
            content
                .chunks_exact(size)
                .map(|c| <$ty>::from_le_bytes(array(c)))
                .collect()
        };
    }

    Ok(match elem_ty {
        TensorElemType::Bool => TensorData::Bool(content.iter().map(|&b| b != 0).collect()),
        TensorElemType::I8 => TensorData::I8(le!(i8)),
        TensorElemType::I16 => TensorData::I16(le!(i16)),
        TensorElemType::I32 => TensorData::I32(le!(i32)),
        TensorElemType::I64 => TensorData::I64(le!(i64)),
        TensorElemType::U8 => TensorData::U8(content.to_vec()),
        TensorElemType::U16 => TensorData::U16(le!(u16)),
        TensorElemType::U32 => TensorData::U32(le!(u32)),
        TensorElemType::U64 => TensorData::U64(le!(u64)),
        TensorElemType::F32 => TensorData::F32(le!(f32)),
        TensorElemType::F64 => TensorData::F64(le!(f64)),
        TensorElemType::C64 => TensorData::C64(
            content
                .chunks_exact(size)
                .map(|c| {
                    Complex32::new(
                        f32::from_le_bytes(array(&c[..4])),
                        f32::from_le_bytes(array(&c[4..])),
                    )
                })
                .collect(),
        ),
        TensorElemType::C128 => TensorData::C128(
            content
                .chunks_exact(size)
                .map(|c| {
                    Complex64::new(
                        f64::from_le_bytes(array(&c[..8])),
                        f64::from_le_bytes(array(&c[8..])),
                    )
                })
                .collect(),
        ),
        TensorElemType::String => return Err(string_content()),
    })
}

/// Expands a typed value list to `total_elems` entries. The engine allows a
/// shorter list whose last value is repeated, and an empty list for zeros.
fn fill<T: Clone + Default>(mut values: Vec<T>, total_elems: usize) -> Result<Vec<T>, TensorError> {
    match values.last().cloned() {
        _ if values.len() == total_elems => Ok(values),
        None => Ok(vec![T::default(); total_elems]),
        Some(last) if values.len() < total_elems => {
            values.resize(total_elems, last);
            Ok(values)
        }
        Some(_) => Err(TensorError::Malformed(
            format!("{} values given for {total_elems} elements", values.len()).into(),
        )),
    }
}

fn pairs<T: Copy>(values: &[T]) -> Result<Vec<(T, T)>, TensorError> {
    if values.len() % 2 != 0 {
        return Err(TensorError::Malformed(
            "complex values must come in real/imaginary pairs".into(),
        ));
    }
    Ok(values.chunks_exact(2).map(|c| (c[0], c[1])).collect())
}

fn decode_values(
    elem_ty: TensorElemType,
    proto: &TensorProto,
    n: usize,
) -> Result<TensorData, TensorError> {
    fn narrow<T: TryFrom<i32>>(values: &[i32]) -> Result<Vec<T>, TensorError> {
        values
            .iter()
            .map(|&v| {
                T::try_from(v).map_err(|_| {
                    TensorError::Malformed(format!("int_val {v} is out of range").into())
                })
            })
            .collect()
    }

    let elem_size = elem_ty.size().unwrap_or(std::mem::size_of::<String>());
    if n.checked_mul(elem_size).map_or(true, |bytes| bytes > MAX_EXPANDED_BYTES) {
        return Err(TensorError::Malformed(
            format!("{n} {elem_ty:?} elements are too large to expand").into(),
        ));
    }

    Ok(match elem_ty {
        TensorElemType::Bool => TensorData::Bool(fill(proto.bool_val.clone(), n)?),
        TensorElemType::I8 => TensorData::I8(fill(narrow(&proto.int_val)?, n)?),
        TensorElemType::I16 => TensorData::I16(fill(narrow(&proto.int_val)?, n)?),
        TensorElemType::I32 => TensorData::I32(fill(proto.int_val.clone(), n)?),
        TensorElemType::I64 => TensorData::I64(fill(proto.int64_val.clone(), n)?),
        TensorElemType::U8 => TensorData::U8(fill(narrow(&proto.int_val)?, n)?),
        TensorElemType::U16 => TensorData::U16(fill(narrow(&proto.int_val)?, n)?),
        TensorElemType::U32 => TensorData::U32(fill(proto.uint32_val.clone(), n)?),
        TensorElemType::U64 => TensorData::U64(fill(proto.uint64_val.clone(), n)?),
        TensorElemType::F32 => TensorData::F32(fill(proto.float_val.clone(), n)?),
        TensorElemType::F64 => TensorData::F64(fill(proto.double_val.clone(), n)?),
        TensorElemType::C64 => {
            let values = pairs(&proto.scomplex_val)?
                .into_iter()
                .map(|(re, im)| Complex32::new(re, im))
                .collect();
            TensorData::C64(fill(values, n)?)
        }
        TensorElemType::C128 => {
            let values = pairs(&proto.dcomplex_val)?
                .into_iter()
                .map(|(re, im)| Complex64::new(re, im))
                .collect();
            TensorData::C128(fill(values, n)?)
        }
        TensorElemType::String => {
            let values = proto
                .string_val
                .iter()
                .map(|s| {
                    String::from_utf8(s.clone()).map_err(|_| {
                        TensorError::Malformed("string_val is not valid UTF-8".into())
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            TensorData::String(fill(values, n)?)
        }
    })
}

impl TryFrom<&TensorProto> for Tensor {
    type Error = TensorError;

    fn try_from(proto: &TensorProto) -> Result<Self, Self::Error> {
        let dtype = DataType::from_i32(proto.dtype).ok_or_else(|| {
            TensorError::UnsupportedDataType(format!("unknown dtype {}", proto.dtype).into())
        })?;
        let elem_ty = TensorElemType::from_data_type(dtype)?;
        let dims = match &proto.tensor_shape {
            Some(shape) => Shape::from_proto(shape).ok_or_else(|| {
                TensorError::Malformed("tensor shape is not fully defined".into())
            })?,
            None => Shape::scalar(),
        };
        let total_elems = dims
            .checked_total_elems()
            .ok_or_else(|| TensorError::Malformed(format!("shape {dims:?} is too large").into()))?;

        let data = if proto.tensor_content.is_empty() {
            decode_values(elem_ty, proto, total_elems)?
        } else {
            decode_content(elem_ty, &proto.tensor_content, total_elems)?
        };
        Self::from_engine_data(dims, data)
    }
}

impl<T: TensorElemTypeExt> TryFrom<ArrayD<T>> for Tensor {
    type Error = TensorError;

    fn try_from(arr: ArrayD<T>) -> Result<Self, Self::Error> {
        let dims = arr.shape().to_vec();
        let data = arr.iter().cloned().collect();
        Self::from_data(dims, T::into_data(data))
    }
}

/// The JSON form of a tensor.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    tf_data_type: String,
    go_data_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    shape: Option<Vec<usize>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    value: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    real64: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    imag64: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    real32: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    imag32: Option<JsonValue>,
}

fn pack<T: Into<JsonValue>>(mut v: Vec<T>, scalar: bool) -> Option<JsonValue> {
    if scalar {
        v.pop().map(Into::into)
    } else {
        Some(JsonValue::from(v))
    }
}

impl From<Tensor> for Envelope {
    fn from(tensor: Tensor) -> Self {
        let elem_ty = tensor.elem_ty();
        let scalar = tensor.is_scalar();
        let mut envelope = Envelope {
            kind: if scalar { TYPE_SCALAR } else { TYPE_TENSOR }.to_string(),
            tf_data_type: elem_ty.tf_name().to_string(),
            go_data_type: elem_ty.type_name().to_string(),
            shape: (!scalar).then(|| tensor.dims.0.clone()),
            value: None,
            real64: None,
            imag64: None,
            real32: None,
            imag32: None,
        };

        match tensor.data {
            TensorData::Bool(v) => envelope.value = pack(v, scalar),
            TensorData::I8(v) => envelope.value = pack(v, scalar),
            TensorData::I16(v) => envelope.value = pack(v, scalar),
            TensorData::I32(v) => envelope.value = pack(v, scalar),
            TensorData::I64(v) => envelope.value = pack(v, scalar),
            TensorData::U8(v) => envelope.value = pack(v, scalar),
            TensorData::U16(v) => envelope.value = pack(v, scalar),
            TensorData::U32(v) => envelope.value = pack(v, scalar),
            TensorData::U64(v) => envelope.value = pack(v, scalar),
            TensorData::F32(v) => envelope.value = pack(v, scalar),
            TensorData::F64(v) => envelope.value = pack(v, scalar),
            TensorData::String(v) => envelope.value = pack(v, scalar),
            TensorData::C64(v) => {
                envelope.real32 = pack(v.iter().map(|c| c.re).collect(), scalar);
                envelope.imag32 = pack(v.iter().map(|c| c.im).collect(), scalar);
            }
            TensorData::C128(v) => {
                envelope.real64 = pack(v.iter().map(|c| c.re).collect(), scalar);
                envelope.imag64 = pack(v.iter().map(|c| c.im).collect(), scalar);
            }
        }
        envelope
    }
}

fn unpack<T: DeserializeOwned>(
    value: Option<JsonValue>,
    field: &'static str,
    scalar: bool,
) -> Result<Vec<T>, TensorError> {
    let value = value
        .ok_or_else(|| TensorError::Envelope(format!("missing \"{field}\" field").into()))?;
    if scalar {
        Ok(vec![serde_json::from_value(value)?])
    } else {
        Ok(serde_json::from_value(value)?)
    }
}

fn complex_parts<T: DeserializeOwned>(
    re: Option<JsonValue>,
    im: Option<JsonValue>,
    fields: (&'static str, &'static str),
    scalar: bool,
) -> Result<Vec<(T, T)>, TensorError> {
    let re: Vec<T> = unpack(re, fields.0, scalar)?;
    let im: Vec<T> = unpack(im, fields.1, scalar)?;
    if re.len() != im.len() {
        return Err(TensorError::Envelope(
            format!("\"{}\" and \"{}\" differ in length", fields.0, fields.1).into(),
        ));
    }
    Ok(re.into_iter().zip(im).collect())
}

impl TryFrom<Envelope> for Tensor {
    type Error = TensorError;

    fn try_from(envelope: Envelope) -> Result<Self, Self::Error> {
        let scalar = match envelope.kind.as_str() {
            TYPE_SCALAR => true,
            TYPE_TENSOR => false,
            kind => {
                return Err(TensorError::Envelope(
                    format!("type must be \"{TYPE_TENSOR}\" or \"{TYPE_SCALAR}\", found \"{kind}\"")
                        .into(),
                ))
            }
        };

        let elem_ty = TensorElemType::from_type_name(&envelope.go_data_type).ok_or_else(|| {
            TensorError::Envelope(
                format!("goDataType {} is not supported", envelope.go_data_type).into(),
            )
        })?;
        if !envelope.tf_data_type.is_empty() && envelope.tf_data_type != elem_ty.tf_name() {
            return Err(TensorError::Envelope(
                format!(
                    "tfDataType {} does not match goDataType {}",
                    envelope.tf_data_type, envelope.go_data_type
                )
                .into(),
            ));
        }

        let stray = if elem_ty.is_complex() {
            envelope.value.is_some()
                || match elem_ty {
                    TensorElemType::C64 => envelope.real64.is_some() || envelope.imag64.is_some(),
                    _ => envelope.real32.is_some() || envelope.imag32.is_some(),
                }
        } else {
            envelope.real64.is_some()
                || envelope.imag64.is_some()
                || envelope.real32.is_some()
                || envelope.imag32.is_some()
        };
        if stray {
            return Err(TensorError::Envelope(
                format!("unexpected payload fields for {}", elem_ty.type_name()).into(),
            ));
        }

        let dims = match (scalar, envelope.shape) {
            (true, Some(shape)) if !shape.is_empty() => {
                return Err(TensorError::Envelope("a scalar cannot have a shape".into()))
            }
            (true, _) => Some(Shape::scalar()),
            (false, Some(shape)) if shape.is_empty() => {
                return Err(TensorError::Envelope(
                    "a tensor needs at least one dimension".into(),
                ))
            }
            (false, shape) => shape.map(Shape),
        };

        let value = envelope.value;
        let data = match elem_ty {
            TensorElemType::Bool => TensorData::Bool(unpack(value, "value", scalar)?),
            TensorElemType::I8 => TensorData::I8(unpack(value, "value", scalar)?),
            TensorElemType::I16 => TensorData::I16(unpack(value, "value", scalar)?),
            TensorElemType::I32 => TensorData::I32(unpack(value, "value", scalar)?),
            TensorElemType::I64 => TensorData::I64(unpack(value, "value", scalar)?),
            TensorElemType::U8 => TensorData::U8(unpack(value, "value", scalar)?),
            TensorElemType::U16 => TensorData::U16(unpack(value, "value", scalar)?),
            TensorElemType::U32 => TensorData::U32(unpack(value, "value", scalar)?),
            TensorElemType::U64 => TensorData::U64(unpack(value, "value", scalar)?),
            TensorElemType::F32 => TensorData::F32(unpack(value, "value", scalar)?),
            TensorElemType::F64 => TensorData::F64(unpack(value, "value", scalar)?),
            TensorElemType::String => TensorData::String(unpack(value, "value", scalar)?),
            TensorElemType::C64 => TensorData::C64(
                complex_parts(envelope.real32, envelope.imag32, ("real32", "imag32"), scalar)?
                    .into_iter()
                    .map(|(re, im)| Complex32::new(re, im))
                    .collect(),
            ),
            TensorElemType::C128 => TensorData::C128(
                complex_parts(envelope.real64, envelope.imag64, ("real64", "imag64"), scalar)?
                    .into_iter()
                    .map(|(re, im)| Complex64::new(re, im))
                    .collect(),
            ),
        };

        let dims = dims.unwrap_or_else(|| Shape(vec![data.len()]));
        Self::from_data(dims, data)
    }
}

impl fmt::Display for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn dump<T: fmt::Debug>(f: &mut fmt::Formatter<'_>, data: &[T]) -> fmt::Result {
            const MAX_ELEMS: usize = 10;
            if data.len() > MAX_ELEMS {
                write!(f, "[")?;
                for e in data[0..MAX_ELEMS / 2].iter() {
                    write!(f, "{e:?}, ")?;
                }
                write!(f, "...")?;
                for e in data[data.len() - MAX_ELEMS / 2..].iter() {
                    write!(f, ", {e:?}")?;
                }
                write!(f, "]")
            } else {
                write!(f, "{data:?}")
            }
        }

        write!(f, "Tensor({:?}, {:?}, ", self.dims, self.elem_ty())?;
        each_variant!(&self.data, v => dump(f, v)?);
        write!(f, ")")
    }
}

#[test]
fn create_tensors() {
    let t = Tensor::new(vec![2, 2], vec![1.0f32, 2.0, 3.0, 4.0]).unwrap();
    assert_eq!(t.elem_ty(), TensorElemType::F32);
    assert_eq!(t.data::<f32>().unwrap(), &[1.0, 2.0, 3.0, 4.0]);
    assert!(t.data::<f64>().is_err());
    assert!(Tensor::scalar(3i64).is_scalar());
    assert_eq!(Tensor::vector(vec![true, false]).unwrap().dims().as_slice(), &[2]);
    assert!(matches!(
        Tensor::vector(Vec::<f32>::new()),
        Err(TensorError::ZeroDimension(_))
    ));
    assert!(matches!(
        Tensor::new(vec![2, 0], Vec::<i32>::new()),
        Err(TensorError::ZeroDimension(_))
    ));

    match Tensor::new(vec![2, 3], vec![1i32, 2, 3]) {
        Err(TensorError::ShapeMismatch {
            expected, actual, ..
        }) => assert_eq!((expected, actual), (6, 3)),
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn dump_tensor() {
    let t = Tensor::new(vec![2, 3], vec![0i32; 6]).unwrap();
    assert_eq!(t.to_string(), "Tensor([2, 3], I32, [0, 0, 0, 0, 0, 0])");

    let t = Tensor::vector((0..12).collect::<Vec<i64>>()).unwrap();
    assert_eq!(
        t.to_string(),
        "Tensor([12], I64, [0, 1, 2, 3, 4, ..., 7, 8, 9, 10, 11])"
    );
}

#[test]
fn to_proto_writes_little_endian_content() {
    let t = Tensor::new(vec![3, 4], (0..12).collect::<Vec<i32>>()).unwrap();
    let proto = t.to_proto().unwrap();
    assert_eq!(proto.dtype, DataType::DtInt32 as i32);
    assert_eq!(proto.tensor_content.len(), 48);
    assert_eq!(&proto.tensor_content[..8], &[0, 0, 0, 0, 1, 0, 0, 0]);
    assert_eq!(Tensor::try_from(&proto).unwrap(), t);

    let s = Tensor::vector(vec!["a".to_string(), "bc".to_string()]).unwrap();
    let proto = s.to_proto().unwrap();
    assert!(proto.tensor_content.is_empty());
    assert_eq!(proto.string_val, vec![b"a".to_vec(), b"bc".to_vec()]);
    assert_eq!(Tensor::try_from(&proto).unwrap(), s);
}

#[test]
fn typed_values_are_padded_with_last_value() {
    let proto = TensorProto {
        dtype: DataType::DtFloat as i32,
        tensor_shape: Some(Shape(vec![2, 2]).to_proto()),
        float_val: vec![1.0, 2.0],
        ..Default::default()
    };
    let t = Tensor::try_from(&proto).unwrap();
    assert_eq!(t.data::<f32>().unwrap(), &[1.0, 2.0, 2.0, 2.0]);

    let zeros = TensorProto {
        dtype: DataType::DtInt64 as i32,
        tensor_shape: Some(Shape(vec![3]).to_proto()),
        ..Default::default()
    };
    assert_eq!(Tensor::try_from(&zeros).unwrap().data::<i64>().unwrap(), &[0, 0, 0]);

    let too_many = TensorProto {
        dtype: DataType::DtInt32 as i32,
        int_val: vec![1, 2, 3],
        ..Default::default()
    };
    assert!(matches!(
        Tensor::try_from(&too_many),
        Err(TensorError::Malformed(_))
    ));
}

#[test]
fn truncated_content_is_malformed() {
    let proto = TensorProto {
        dtype: DataType::DtDouble as i32,
        tensor_shape: Some(Shape(vec![2]).to_proto()),
        tensor_content: vec![0; 12],
        ..Default::default()
    };
    assert!(matches!(
        Tensor::try_from(&proto),
        Err(TensorError::Malformed(_))
    ));

    let huge = TensorProto {
        dtype: DataType::DtDouble as i32,
        tensor_shape: Some(Shape(vec![1 << 61]).to_proto()),
        tensor_content: vec![0; 8],
        ..Default::default()
    };
    assert!(matches!(
        Tensor::try_from(&huge),
        Err(TensorError::Malformed(_))
    ));

    let unfilled = TensorProto {
        dtype: DataType::DtInt32 as i32,
        tensor_shape: Some(Shape(vec![1 << 40]).to_proto()),
        ..Default::default()
    };
    assert!(matches!(
        Tensor::try_from(&unfilled),
        Err(TensorError::Malformed(_))
    ));

    let half = TensorProto {
        dtype: DataType::DtHalf as i32,
        ..Default::default()
    };
    assert!(matches!(
        Tensor::try_from(&half),
        Err(TensorError::UnsupportedDataType(_))
    ));
}

#[test]
fn json_envelope() {
    let t = Tensor::new(vec![2, 2], vec![1.0f32, 2.0, 3.0, 4.0]).unwrap();
    let json = serde_json::to_string(&t).unwrap();
    assert_eq!(
        json,
        r#"{"type":"tensor","tfDataType":"Float","goDataType":"float32","shape":[2,2],"value":[1.0,2.0,3.0,4.0]}"#
    );
    let back: Tensor = serde_json::from_str(&json).unwrap();
    assert_eq!(back, t);

    let s = Tensor::scalar(Complex64::new(1.5, -2.0));
    let json = serde_json::to_string(&s).unwrap();
    assert_eq!(
        json,
        r#"{"type":"scalar","tfDataType":"Complex128","goDataType":"complex128","real64":1.5,"imag64":-2.0}"#
    );
    assert_eq!(serde_json::from_str::<Tensor>(&json).unwrap(), s);
}

#[test]
fn json_envelope_without_shape_is_a_vector() {
    let t: Tensor =
        serde_json::from_str(r#"{"type":"tensor","goDataType":"int64","value":[1,2,3]}"#).unwrap();
    assert_eq!(t.dims().as_slice(), &[3]);
    assert_eq!(t.data::<i64>().unwrap(), &[1, 2, 3]);
}

#[test]
fn json_envelope_rejects_mismatches() {
    for json in [
        r#"{"type":"matrix","goDataType":"int32","shape":[1],"value":[1]}"#,
        r#"{"type":"tensor","goDataType":"int128","shape":[1],"value":[1]}"#,
        r#"{"type":"tensor","tfDataType":"Double","goDataType":"int32","shape":[1],"value":[1]}"#,
        r#"{"type":"tensor","goDataType":"int32","shape":[2],"value":[1]}"#,
        r#"{"type":"tensor","goDataType":"bool","shape":[1],"value":[1]}"#,
        r#"{"type":"scalar","goDataType":"int32","shape":[2],"value":1}"#,
        r#"{"type":"scalar","goDataType":"complex64","value":1.0}"#,
        r#"{"type":"scalar","goDataType":"complex64","real32":1.0,"imag32":1.0,"real64":1.0}"#,
        r#"{"type":"tensor","goDataType":"int32","shape":[0],"value":[]}"#,
        r#"{"type":"tensor","goDataType":"int32","shape":[2,0],"value":[]}"#,
        r#"{"type":"tensor","goDataType":"int32","shape":[],"value":[1]}"#,
        r#"{"type":"tensor","goDataType":"int32","value":[]}"#,
    ] {
        assert!(serde_json::from_str::<Tensor>(json).is_err(), "{json}");
    }

    let json = br#"{"type":"scalar","tfDataType":"Float","goDataType":"float32","value":2.5}"#;
    assert!(Tensor::from_json_as::<f32>(json).is_ok());
    assert!(matches!(
        Tensor::from_json_as::<f64>(json),
        Err(TensorError::Envelope(_))
    ));
}

#[test]
fn ndarray_conversion() {
    let arr = ndarray::arr2(&[[1.0f64, 2.0], [3.0, 4.0]]).into_dyn();
    let t = Tensor::try_from(arr.clone()).unwrap();
    assert_eq!(t.dims().as_slice(), &[2, 2]);
    assert_eq!(t.to_array::<f64>().unwrap(), arr);

    let empty = ndarray::ArrayD::<f64>::zeros(ndarray::IxDyn(&[3, 0]));
    assert!(matches!(
        Tensor::try_from(empty),
        Err(TensorError::ZeroDimension(_))
    ));
}

#[test]
fn engine_tensors_may_be_empty() {
    let proto = TensorProto {
        dtype: DataType::DtFloat as i32,
        tensor_shape: Some(Shape(vec![0, 3]).to_proto()),
        ..Default::default()
    };
    let t = Tensor::try_from(&proto).unwrap();
    assert!(t.is_empty());
    assert_eq!(t.dims().as_slice(), &[0, 3]);
    assert_eq!(t.to_proto().unwrap().tensor_shape, proto.tensor_shape);
}
