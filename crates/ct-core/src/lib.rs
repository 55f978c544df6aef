#![forbid(unsafe_code)]

pub mod value;

pub use value::{
    CanonicalTypeId, CanonicalValue, ConverterError, ForeignObject, Payload, ProducerType, Value,
};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DType {
    F32,
    F64,
    I32,
    I64,
    Bool,
    Complex64,
    Complex128,
}

impl DType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::F32 => "float32",
            Self::F64 => "float64",
            Self::I32 => "int32",
            Self::I64 => "int64",
            Self::Bool => "bool",
            Self::Complex64 => "complex64",
            Self::Complex128 => "complex128",
        }
    }
}

impl std::fmt::Display for DType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Shape {
    pub dims: Vec<u32>,
}

impl Shape {
    #[must_use]
    pub fn scalar() -> Self {
        Self { dims: Vec::new() }
    }

    #[must_use]
    pub fn vector(len: u32) -> Self {
        Self { dims: vec![len] }
    }

    #[must_use]
    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    #[must_use]
    pub fn element_count(&self) -> Option<u64> {
        self.dims
            .iter()
            .try_fold(1_u64, |acc, dim| acc.checked_mul(u64::from(*dim)))
    }
}

/// Strategy that produced (or was tried for) a canonical value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Identity,
    Registry,
    Protocol,
    Sequence,
}

impl Strategy {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Identity => "identity",
            Self::Registry => "registry",
            Self::Protocol => "protocol",
            Self::Sequence => "sequence",
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Literal {
    I64(i64),
    Bool(bool),
    F64Bits(u64),
    Complex128Bits(u64, u64),
}

impl Literal {
    #[must_use]
    pub fn from_f64(value: f64) -> Self {
        Self::F64Bits(value.to_bits())
    }

    #[must_use]
    pub fn from_complex128(re: f64, im: f64) -> Self {
        Self::Complex128Bits(re.to_bits(), im.to_bits())
    }

    #[must_use]
    pub fn as_f64(self) -> Option<f64> {
        match self {
            Self::F64Bits(bits) => Some(f64::from_bits(bits)),
            Self::I64(value) => Some(value as f64),
            Self::Bool(_) | Self::Complex128Bits(..) => None,
        }
    }

    #[must_use]
    pub fn as_i64(self) -> Option<i64> {
        match self {
            Self::I64(value) => Some(value),
            Self::Bool(_) | Self::F64Bits(_) | Self::Complex128Bits(..) => None,
        }
    }

    #[must_use]
    pub fn as_bool(self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(value),
            _ => None,
        }
    }

    #[must_use]
    pub fn dtype(self) -> DType {
        match self {
            Self::I64(_) => DType::I64,
            Self::Bool(_) => DType::Bool,
            Self::F64Bits(_) => DType::F64,
            Self::Complex128Bits(..) => DType::Complex128,
        }
    }
}

/// Dense row-major aggregate: the payload every tensor-like canonical value
/// ultimately carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TensorValue {
    pub dtype: DType,
    pub shape: Shape,
    pub elements: Vec<Literal>,
}

impl TensorValue {
    pub fn new(dtype: DType, shape: Shape, elements: Vec<Literal>) -> Result<Self, ValueError> {
        let expected_count = shape.element_count().ok_or(ValueError::ShapeOverflow {
            shape: shape.clone(),
        })?;

        if expected_count != elements.len() as u64 {
            return Err(ValueError::ElementCountMismatch {
                shape,
                expected_count,
                actual_count: elements.len(),
            });
        }

        Ok(Self {
            dtype,
            shape,
            elements,
        })
    }

    #[must_use]
    pub fn scalar(literal: Literal) -> Self {
        Self {
            dtype: literal.dtype(),
            shape: Shape::scalar(),
            elements: vec![literal],
        }
    }

    /// Zero-length vector, the aggregate of an empty sequence.
    #[must_use]
    pub fn empty(dtype: DType) -> Self {
        Self {
            dtype,
            shape: Shape::vector(0),
            elements: Vec::new(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    #[must_use]
    pub fn rank(&self) -> usize {
        self.shape.rank()
    }

    /// Stacks equally shaped, equally typed slices along a new leading axis.
    pub fn stack_axis0(slices: &[TensorValue]) -> Result<Self, ValueError> {
        let Some(first) = slices.first() else {
            return Err(ValueError::EmptyAxisStack);
        };

        let mut elements = Vec::with_capacity(first.elements.len() * slices.len());
        elements.extend_from_slice(&first.elements);
        for (index, tensor) in slices.iter().enumerate().skip(1) {
            if tensor.dtype != first.dtype {
                return Err(ValueError::AxisStackDTypeMismatch {
                    index,
                    expected: first.dtype,
                    actual: tensor.dtype,
                });
            }
            if tensor.shape != first.shape {
                return Err(ValueError::AxisStackShapeMismatch {
                    index,
                    expected: first.shape.clone(),
                    actual: tensor.shape.clone(),
                });
            }
            elements.extend_from_slice(&tensor.elements);
        }

        let leading = u32::try_from(slices.len()).map_err(|_| ValueError::ShapeOverflow {
            shape: first.shape.clone(),
        })?;
        let mut dims = Vec::with_capacity(first.shape.rank() + 1);
        dims.push(leading);
        dims.extend_from_slice(&first.shape.dims);
        TensorValue::new(first.dtype, Shape { dims }, elements)
    }

    pub fn to_f64_vec(&self) -> Option<Vec<f64>> {
        self.elements.iter().copied().map(Literal::as_f64).collect()
    }

    pub fn to_i64_vec(&self) -> Option<Vec<i64>> {
        self.elements.iter().copied().map(Literal::as_i64).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueError {
    ShapeOverflow {
        shape: Shape,
    },
    ElementCountMismatch {
        shape: Shape,
        expected_count: u64,
        actual_count: usize,
    },
    EmptyAxisStack,
    AxisStackShapeMismatch {
        index: usize,
        expected: Shape,
        actual: Shape,
    },
    AxisStackDTypeMismatch {
        index: usize,
        expected: DType,
        actual: DType,
    },
}

impl std::fmt::Display for ValueError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ShapeOverflow { shape } => {
                write!(f, "shape element count overflowed: {:?}", shape.dims)
            }
            Self::ElementCountMismatch {
                shape,
                expected_count,
                actual_count,
            } => {
                write!(
                    f,
                    "tensor element count mismatch for shape {:?}: expected {}, got {}",
                    shape.dims, expected_count, actual_count
                )
            }
            Self::EmptyAxisStack => write!(f, "cannot stack empty slice list"),
            Self::AxisStackShapeMismatch {
                index,
                expected,
                actual,
            } => {
                write!(
                    f,
                    "element {} has shape {:?}, expected {:?}",
                    index, actual.dims, expected.dims
                )
            }
            Self::AxisStackDTypeMismatch {
                index,
                expected,
                actual,
            } => {
                write!(f, "element {index} has dtype {actual}, expected {expected}")
            }
        }
    }
}

impl std::error::Error for ValueError {}

#[cfg(test)]
mod tests {
    use super::{DType, Literal, Shape, Strategy, TensorValue, ValueError};
    use proptest::prelude::*;
    use proptest::test_runner::TestCaseError;

    fn vector_i64(values: &[i64]) -> TensorValue {
        TensorValue::new(
            DType::I64,
            Shape::vector(values.len() as u32),
            values.iter().copied().map(Literal::I64).collect(),
        )
        .expect("vector should build")
    }

    #[test]
    fn shape_scalar_rank_is_zero() {
        assert_eq!(Shape::scalar().rank(), 0);
        assert_eq!(Shape::scalar().element_count(), Some(1));
        assert_eq!(Shape { dims: vec![2, 0, 3] }.element_count(), Some(0));
    }

    #[test]
    fn tensor_new_rejects_wrong_element_count() {
        let err = TensorValue::new(DType::I64, Shape::vector(3), vec![Literal::I64(1)])
            .expect_err("element count mismatch should fail");
        assert!(matches!(
            err,
            ValueError::ElementCountMismatch {
                expected_count: 3,
                actual_count: 1,
                ..
            }
        ));
    }

    #[test]
    fn stack_axis0_of_scalars_builds_vector() {
        let stacked = TensorValue::stack_axis0(&[
            TensorValue::scalar(Literal::I64(1)),
            TensorValue::scalar(Literal::I64(2)),
        ])
        .expect("stack should succeed");
        assert_eq!(stacked.shape, Shape::vector(2));
        assert_eq!(stacked.to_i64_vec(), Some(vec![1, 2]));
    }

    #[test]
    fn stack_axis0_of_vectors_builds_matrix() {
        let stacked = TensorValue::stack_axis0(&[vector_i64(&[1, 2]), vector_i64(&[3, 4])])
            .expect("stack should succeed");
        assert_eq!(stacked.shape.dims, vec![2, 2]);
        assert_eq!(stacked.to_i64_vec(), Some(vec![1, 2, 3, 4]));
    }

    #[test]
    fn stack_axis0_reports_offending_element() {
        let ragged = TensorValue::stack_axis0(&[vector_i64(&[1, 2]), vector_i64(&[3])])
            .expect_err("ragged stack should fail");
        assert!(matches!(
            ragged,
            ValueError::AxisStackShapeMismatch { index: 1, .. }
        ));

        let mixed = TensorValue::stack_axis0(&[
            TensorValue::scalar(Literal::I64(1)),
            TensorValue::scalar(Literal::from_f64(2.5)),
        ])
        .expect_err("mixed dtype stack should fail");
        assert_eq!(
            mixed,
            ValueError::AxisStackDTypeMismatch {
                index: 1,
                expected: DType::I64,
                actual: DType::F64,
            }
        );
        assert_eq!(mixed.to_string(), "element 1 has dtype float64, expected int64");

        assert_eq!(
            TensorValue::stack_axis0(&[]).expect_err("empty stack"),
            ValueError::EmptyAxisStack
        );
    }

    #[test]
    fn literal_accessors_cover_paths() {
        assert_eq!(Literal::I64(7).as_f64(), Some(7.0));
        assert_eq!(Literal::from_f64(1.5).as_i64(), None);
        assert_eq!(Literal::Bool(true).as_bool(), Some(true));
        assert_eq!(Literal::from_complex128(1.0, 2.0).dtype(), DType::Complex128);
        assert_eq!(Literal::from_complex128(1.0, 2.0).as_f64(), None);
    }

    #[test]
    fn strategy_names_are_snake_case_in_json() {
        let encoded = serde_json::to_string(&Strategy::Protocol).expect("serialize");
        assert_eq!(encoded, "\"protocol\"");
        assert_eq!(Strategy::Sequence.to_string(), "sequence");
    }

    #[test]
    fn prop_stack_of_uniform_vectors_prepends_leading_axis() {
        let mut runner = ct_test_utils::property_runner();
        let strategy = (1_usize..6, 0_usize..5);
        runner
            .run(&strategy, |(rows, width)| {
                let row = vec![3_i64; width];
                let slices = vec![vector_i64(&row); rows];
                let stacked = TensorValue::stack_axis0(&slices)
                    .map_err(|err| TestCaseError::fail(err.to_string()))?;
                prop_assert_eq!(&stacked.shape.dims, &vec![rows as u32, width as u32]);
                prop_assert_eq!(stacked.len(), rows * width);
                Ok(())
            })
            .expect("uniform stacks should always succeed");
    }
}
