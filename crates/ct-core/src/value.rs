//! Dynamic values handed to resolution, and the canonical values it returns.
//!
//! A [`Value`] is whatever a producer hands over: a native scalar, a finite
//! sequence, a foreign object, or something that is already canonical.
//! Foreign objects describe themselves through [`ForeignObject`]; nothing in
//! this crate inspects them beyond that trait.

use crate::{DType, Literal, TensorValue};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Identity of a concrete producer type.
///
/// Names are `'static` so the identity is `Copy` and hashes without
/// allocation on the resolution hot path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProducerType(&'static str);

impl ProducerType {
    pub const INT: Self = Self::new("builtin.int");
    pub const FLOAT: Self = Self::new("builtin.float");
    pub const BOOL: Self = Self::new("builtin.bool");
    pub const COMPLEX: Self = Self::new("builtin.complex");
    pub const SEQUENCE: Self = Self::new("builtin.sequence");
    pub const CANONICAL: Self = Self::new("builtin.canonical");

    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    /// Producer identity derived from a Rust type name.
    #[must_use]
    pub fn of<T: ?Sized>() -> Self {
        Self(std::any::type_name::<T>())
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        self.0
    }
}

impl std::fmt::Display for ProducerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.0)
    }
}

/// Registration-order id of a canonical type within one type registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CanonicalTypeId(pub u32);

impl std::fmt::Display for CanonicalTypeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "canonical#{}", self.0)
    }
}

/// Failure raised by a registered converter or by a value's own
/// canonicalization entry point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConverterError {
    pub message: String,
}

impl ConverterError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ConverterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "converter failed: {}", self.message)
    }
}

impl std::error::Error for ConverterError {}

/// Self-description of a foreign value.
///
/// Implementations must answer `has_member` without invoking the member; the
/// structural check calls it once per required member on hot paths.
pub trait ForeignObject: Send + Sync + std::fmt::Debug {
    fn producer_type(&self) -> ProducerType;

    /// Language-native supertype chain, most specific first, excluding the
    /// producer type itself.
    fn supertypes(&self) -> &'static [ProducerType] {
        &[]
    }

    /// Whether `name` is present and callable or accessible.
    fn has_member(&self, name: &str) -> bool;

    /// Invokes the canonicalization member named `entry_point`.
    fn canonicalize(&self, entry_point: &str) -> Result<Payload, ConverterError> {
        Err(ConverterError::new(format!(
            "{} exposes no canonicalization entry point `{entry_point}`",
            self.producer_type()
        )))
    }

    /// Dense-array view for array-like objects; `None` for everything else.
    fn dense_view(&self) -> Option<TensorValue> {
        None
    }
}

#[derive(Debug, Clone)]
pub enum Payload {
    Tensor(TensorValue),
    Handle(Arc<dyn ForeignObject>),
}

impl Payload {
    #[must_use]
    pub fn as_tensor(&self) -> Option<&TensorValue> {
        match self {
            Self::Tensor(tensor) => Some(tensor),
            Self::Handle(_) => None,
        }
    }
}

impl PartialEq for Payload {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Tensor(lhs), Self::Tensor(rhs)) => lhs == rhs,
            (Self::Handle(lhs), Self::Handle(rhs)) => Arc::ptr_eq(lhs, rhs),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalValue {
    pub canonical: CanonicalTypeId,
    pub payload: Payload,
}

impl CanonicalValue {
    #[must_use]
    pub fn new(canonical: CanonicalTypeId, payload: Payload) -> Self {
        Self { canonical, payload }
    }

    #[must_use]
    pub fn tensor(canonical: CanonicalTypeId, tensor: TensorValue) -> Self {
        Self::new(canonical, Payload::Tensor(tensor))
    }

    #[must_use]
    pub fn as_tensor(&self) -> Option<&TensorValue> {
        self.payload.as_tensor()
    }
}

#[derive(Debug, Clone)]
pub enum Value {
    Scalar(Literal),
    Sequence(Vec<Value>),
    Object(Arc<dyn ForeignObject>),
    Canonical(CanonicalValue),
}

impl Value {
    #[must_use]
    pub fn scalar_i64(value: i64) -> Self {
        Self::Scalar(Literal::I64(value))
    }

    #[must_use]
    pub fn scalar_f64(value: f64) -> Self {
        Self::Scalar(Literal::from_f64(value))
    }

    #[must_use]
    pub fn scalar_bool(value: bool) -> Self {
        Self::Scalar(Literal::Bool(value))
    }

    #[must_use]
    pub fn sequence(items: impl IntoIterator<Item = Value>) -> Self {
        Self::Sequence(items.into_iter().collect())
    }

    #[must_use]
    pub fn object(object: impl ForeignObject + 'static) -> Self {
        Self::Object(Arc::new(object))
    }

    #[must_use]
    pub fn producer_type(&self) -> ProducerType {
        match self {
            Self::Scalar(literal) => match literal.dtype() {
                DType::I32 | DType::I64 => ProducerType::INT,
                DType::F32 | DType::F64 => ProducerType::FLOAT,
                DType::Bool => ProducerType::BOOL,
                DType::Complex64 | DType::Complex128 => ProducerType::COMPLEX,
            },
            Self::Sequence(_) => ProducerType::SEQUENCE,
            Self::Object(object) => object.producer_type(),
            Self::Canonical(_) => ProducerType::CANONICAL,
        }
    }

    #[must_use]
    pub fn supertypes(&self) -> &'static [ProducerType] {
        match self {
            Self::Object(object) => object.supertypes(),
            Self::Scalar(_) | Self::Sequence(_) | Self::Canonical(_) => &[],
        }
    }

    #[must_use]
    pub fn as_object(&self) -> Option<&dyn ForeignObject> {
        match self {
            Self::Object(object) => Some(object.as_ref()),
            _ => None,
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::scalar_i64(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::scalar_f64(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::scalar_bool(value)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Self::sequence(items.into_iter().map(Into::into))
    }
}

impl From<CanonicalValue> for Value {
    fn from(value: CanonicalValue) -> Self {
        Self::Canonical(value)
    }
}

#[cfg(test)]
mod tests {
    use super::{CanonicalTypeId, CanonicalValue, ForeignObject, Payload, ProducerType, Value};
    use crate::{Literal, TensorValue};
    use std::sync::Arc;

    #[derive(Debug)]
    struct Widget;

    static WIDGET_SUPERTYPES: [ProducerType; 1] = [ProducerType::new("test.Gadget")];

    impl ForeignObject for Widget {
        fn producer_type(&self) -> ProducerType {
            ProducerType::of::<Self>()
        }

        fn supertypes(&self) -> &'static [ProducerType] {
            &WIDGET_SUPERTYPES
        }

        fn has_member(&self, name: &str) -> bool {
            name == "spin"
        }
    }

    #[test]
    fn builtin_producer_types_follow_value_kind() {
        assert_eq!(Value::scalar_i64(1).producer_type(), ProducerType::INT);
        assert_eq!(Value::scalar_f64(1.0).producer_type(), ProducerType::FLOAT);
        assert_eq!(Value::scalar_bool(true).producer_type(), ProducerType::BOOL);
        assert_eq!(
            Value::Scalar(Literal::from_complex128(0.0, 1.0)).producer_type(),
            ProducerType::COMPLEX
        );
        assert_eq!(Value::from(vec![1_i64]).producer_type(), ProducerType::SEQUENCE);
        let canonical = CanonicalValue::tensor(
            CanonicalTypeId(0),
            TensorValue::scalar(Literal::I64(1)),
        );
        assert_eq!(
            Value::from(canonical).producer_type(),
            ProducerType::CANONICAL
        );
    }

    #[test]
    fn foreign_objects_report_their_own_identity() {
        let value = Value::object(Widget);
        assert!(value.producer_type().name().ends_with("Widget"));
        assert_eq!(value.supertypes(), &WIDGET_SUPERTYPES);
        let object = value.as_object().expect("object");
        assert!(object.has_member("spin"));
        assert!(object.dense_view().is_none());
        let err = object
            .canonicalize("__tensor__")
            .expect_err("default entry point should fail");
        assert!(err.message.contains("__tensor__"));
    }

    #[test]
    fn nested_vectors_become_nested_sequences() {
        let value = Value::from(vec![vec![1_i64, 2], vec![3]]);
        let Value::Sequence(rows) = value else {
            panic!("expected sequence");
        };
        assert_eq!(rows.len(), 2);
        assert!(matches!(&rows[1], Value::Sequence(row) if row.len() == 1));
    }

    #[test]
    fn handle_payloads_compare_by_identity() {
        let shared: Arc<dyn ForeignObject> = Arc::new(Widget);
        let lhs = Payload::Handle(Arc::clone(&shared));
        let rhs = Payload::Handle(shared);
        let other = Payload::Handle(Arc::new(Widget));
        assert_eq!(lhs, rhs);
        assert_ne!(lhs, other);
    }
}
