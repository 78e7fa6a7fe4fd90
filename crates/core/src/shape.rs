use std::ops::{Deref, Index};

use crate::proto::{tensor_shape_proto::Dim, TensorShapeProto};

pub type Dimension = usize;

/// Fully known dimension sizes of a tensor. An empty shape is a scalar.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct Shape(pub Vec<Dimension>);

impl std::fmt::Debug for Shape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

impl Shape {
    pub fn scalar() -> Self {
        Self(vec![])
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn is_scalar(&self) -> bool {
        self.is_empty()
    }

    pub fn total_elems(&self) -> usize {
        self.0.iter().product()
    }

    /// Like [`Shape::total_elems`] but `None` on overflow.
    pub fn checked_total_elems(&self) -> Option<usize> {
        self.0.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d))
    }

    pub fn as_slice(&self) -> &[Dimension] {
        self.0.as_slice()
    }

    pub fn to_i64_vec(&self) -> Vec<i64> {
        self.0.iter().map(|&x| x as i64).collect()
    }

    /// Returns `None` if any size is negative (i.e. unknown).
    pub fn from_i64(dims: &[i64]) -> Option<Self> {
        dims.iter()
            .map(|&x| Dimension::try_from(x).ok())
            .collect::<Option<Vec<_>>>()
            .map(Self)
    }

    pub fn to_proto(&self) -> TensorShapeProto {
        TensorShapeProto {
            dim: self
                .0
                .iter()
                .map(|&size| Dim {
                    size: size as i64,
                    name: String::new(),
                })
                .collect(),
            unknown_rank: false,
        }
    }

    /// Returns `None` for unknown rank or any unknown dimension.
    pub fn from_proto(proto: &TensorShapeProto) -> Option<Self> {
        if proto.unknown_rank {
            return None;
        }
        Self::from_i64(&proto.dim.iter().map(|d| d.size).collect::<Vec<_>>())
    }
}

impl Deref for Shape {
    type Target = [Dimension];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Index<usize> for Shape {
    type Output = Dimension;

    fn index(&self, index: usize) -> &Self::Output {
        &self.0[index]
    }
}

impl From<Vec<Dimension>> for Shape {
    fn from(v: Vec<Dimension>) -> Self {
        Self(v)
    }
}

impl From<&[Dimension]> for Shape {
    fn from(v: &[Dimension]) -> Self {
        Self(v.to_vec())
    }
}

impl AsRef<Shape> for Shape {
    fn as_ref(&self) -> &Shape {
        self
    }
}

#[test]
fn total_elems() {
    assert_eq!(Shape::scalar().total_elems(), 1);
    assert_eq!(Shape(vec![2, 3, 4]).total_elems(), 24);
    assert_eq!(Shape(vec![2, 0]).total_elems(), 0);
    assert_eq!(Shape(vec![usize::MAX, 2]).checked_total_elems(), None);
}

#[test]
fn proto_dims() {
    let shape = Shape(vec![3, 4]);
    let proto = shape.to_proto();
    assert_eq!(proto.dim.len(), 2);
    assert_eq!(proto.dim[1].size, 4);
    assert_eq!(Shape::from_proto(&proto), Some(shape));
    assert_eq!(Shape::from_i64(&[2, -1]), None);

    let unknown = TensorShapeProto {
        dim: vec![],
        unknown_rank: true,
    };
    assert_eq!(Shape::from_proto(&unknown), None);
}
