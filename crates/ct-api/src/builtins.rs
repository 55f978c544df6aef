//! Built-in canonical types and scalar converters.

use crate::ApiError;
use ct_convert::{ConverterPriority, ConverterRegistry};
use ct_core::{CanonicalTypeId, ConverterError, Payload, ProducerType, TensorValue, Value};
use ct_registry::{CanonicalTypeRegistry, CapabilityDescriptor, RegistryError, TypeDeclaration};

pub const TENSOR: &str = "Tensor";
pub const SYMBOL: &str = "Symbol";
pub const EAGER: &str = "Eager";
pub const VARIABLE: &str = "Variable";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuiltinIds {
    pub tensor: CanonicalTypeId,
    pub symbol: CanonicalTypeId,
    pub eager: CanonicalTypeId,
    pub variable: CanonicalTypeId,
}

#[must_use]
pub fn tensor_descriptor() -> CapabilityDescriptor {
    CapabilityDescriptor::new()
        .attribute("shape")
        .attribute("dtype")
        .entry_point("__tensor__")
        .with_sequence_fallback(TENSOR)
}

#[must_use]
pub fn variable_descriptor() -> CapabilityDescriptor {
    CapabilityDescriptor::new()
        .method("read_value", 0)
        .method("assign", 1)
        .entry_point("__variable__")
}

/// Registers the four built-in types as one batch, then the scalar converters.
/// A name collision leaves both registries untouched.
pub(crate) fn install(
    types: &CanonicalTypeRegistry,
    converters: &ConverterRegistry,
) -> Result<BuiltinIds, ApiError> {
    let ids = types.register_all(vec![
        TypeDeclaration::new(TENSOR, tensor_descriptor()),
        TypeDeclaration::new(SYMBOL, CapabilityDescriptor::new().entry_point("__symbol__"))
            .with_parent(TENSOR),
        TypeDeclaration::new(EAGER, CapabilityDescriptor::new().entry_point("__eager__"))
            .with_parent(TENSOR),
        TypeDeclaration::new(VARIABLE, variable_descriptor()),
    ])?;
    let &[tensor, symbol, eager, variable] = ids.as_slice() else {
        return Err(ApiError::Registry(RegistryError::UnknownType {
            name: TENSOR.to_owned(),
        }));
    };

    let tensor_type = types.get(tensor)?;
    for producer in [
        ProducerType::INT,
        ProducerType::FLOAT,
        ProducerType::BOOL,
        ProducerType::COMPLEX,
    ] {
        converters.register_converter(
            producer,
            &tensor_type,
            scalar_to_tensor,
            ConverterPriority::Default,
        );
    }

    tracing::debug!(
        fingerprint = %types.fingerprint(),
        converters = converters.len(),
        "built-in canonical types installed",
    );
    Ok(BuiltinIds {
        tensor,
        symbol,
        eager,
        variable,
    })
}

/// Native scalars become rank-0 tensors of the matching dtype.
fn scalar_to_tensor(value: &Value) -> Result<Payload, ConverterError> {
    match value {
        Value::Scalar(literal) => Ok(Payload::Tensor(TensorValue::scalar(*literal))),
        other => Err(ConverterError::new(format!(
            "scalar converter received `{}`",
            other.producer_type()
        ))),
    }
}
