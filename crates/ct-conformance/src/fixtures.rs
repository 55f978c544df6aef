//! Foreign objects and spy converters shared by the conformance suite.

use ct_core::{
    ConverterError, DType, ForeignObject, Literal, Payload, ProducerType, Shape, TensorValue,
    Value,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

pub const PROTOCOL_TENSOR: ProducerType = ProducerType::new("conformance.ProtocolTensor");
pub const VARIABLE_LIKE: ProducerType = ProducerType::new("conformance.VariableLike");
pub const UNRELATED: ProducerType = ProducerType::new("conformance.Unrelated");
pub const DENSE_ARRAY: ProducerType = ProducerType::new("conformance.DenseArray");
pub const DERIVED: ProducerType = ProducerType::new("conformance.Derived");
pub const BASE: ProducerType = ProducerType::new("conformance.Base");

/// Counts invocations and returns a fixed rank-0 tensor.
#[derive(Debug, Clone, Default)]
pub struct SpyConverter {
    calls: Arc<AtomicUsize>,
    result: i64,
}

impl SpyConverter {
    #[must_use]
    pub fn returning(result: i64) -> Self {
        Self {
            calls: Arc::default(),
            result,
        }
    }

    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// The converter callback; every clone shares the same counter.
    pub fn converter(
        &self,
    ) -> impl Fn(&Value) -> Result<Payload, ConverterError> + Send + Sync + 'static {
        let calls = Arc::clone(&self.calls);
        let result = self.result;
        move |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(Payload::Tensor(TensorValue::scalar(Literal::I64(result))))
        }
    }
}

/// Conforms to the built-in `Tensor` descriptor and canonicalizes to a
/// rank-0 tensor holding `value`.
#[derive(Debug, Clone, Copy)]
pub struct ProtocolTensor {
    pub value: i64,
}

impl ForeignObject for ProtocolTensor {
    fn producer_type(&self) -> ProducerType {
        PROTOCOL_TENSOR
    }

    fn has_member(&self, name: &str) -> bool {
        matches!(name, "shape" | "dtype" | "__tensor__")
    }

    fn canonicalize(&self, entry_point: &str) -> Result<Payload, ConverterError> {
        match entry_point {
            "__tensor__" => Ok(Payload::Tensor(TensorValue::scalar(Literal::I64(
                self.value,
            )))),
            other => Err(ConverterError::new(format!("no entry point `{other}`"))),
        }
    }
}

/// Conforms to the built-in `Variable` descriptor; its canonical form is an
/// opaque handle to itself.
#[derive(Debug, Clone)]
pub struct VariableLike {
    pub name: String,
}

impl ForeignObject for VariableLike {
    fn producer_type(&self) -> ProducerType {
        VARIABLE_LIKE
    }

    fn has_member(&self, name: &str) -> bool {
        matches!(name, "read_value" | "assign" | "__variable__")
    }

    fn canonicalize(&self, entry_point: &str) -> Result<Payload, ConverterError> {
        if entry_point == "__variable__" {
            Ok(Payload::Handle(Arc::new(self.clone())))
        } else {
            Err(ConverterError::new(format!("no entry point `{entry_point}`")))
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UnrelatedObject;

impl ForeignObject for UnrelatedObject {
    fn producer_type(&self) -> ProducerType {
        UNRELATED
    }

    fn has_member(&self, _name: &str) -> bool {
        false
    }
}

/// Row-major array-like object exposing only a dense view.
#[derive(Debug, Clone)]
pub struct DenseArray {
    pub rows: u32,
    pub cols: u32,
    pub data: Vec<f64>,
}

impl ForeignObject for DenseArray {
    fn producer_type(&self) -> ProducerType {
        DENSE_ARRAY
    }

    fn has_member(&self, name: &str) -> bool {
        name == "shape"
    }

    fn dense_view(&self) -> Option<TensorValue> {
        let elements = self.data.iter().copied().map(Literal::from_f64).collect();
        TensorValue::new(
            DType::F64,
            Shape {
                dims: vec![self.rows, self.cols],
            },
            elements,
        )
        .ok()
    }
}

/// Producer whose language-native supertype is [`BASE`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DerivedObject;

impl ForeignObject for DerivedObject {
    fn producer_type(&self) -> ProducerType {
        DERIVED
    }

    fn supertypes(&self) -> &'static [ProducerType] {
        &[BASE]
    }

    fn has_member(&self, _name: &str) -> bool {
        false
    }
}
