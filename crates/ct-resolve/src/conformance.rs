//! Structural conformance: a value satisfies a descriptor when every required
//! member is present on it. No nominal relationship and no signature check.

use ct_core::{ForeignObject, Value};
use ct_registry::CapabilityDescriptor;

/// Only foreign objects expose members; scalars, sequences and canonical
/// values never conform structurally.
#[must_use]
pub fn conforms(value: &Value, descriptor: &CapabilityDescriptor) -> bool {
    value
        .as_object()
        .is_some_and(|object| conforms_object(object, descriptor))
}

#[must_use]
pub fn conforms_object(object: &dyn ForeignObject, descriptor: &CapabilityDescriptor) -> bool {
    descriptor
        .member_names()
        .all(|name| object.has_member(name))
}

/// Required members `object` lacks, in declaration order.
#[must_use]
pub fn missing_members<'d>(
    object: &dyn ForeignObject,
    descriptor: &'d CapabilityDescriptor,
) -> Vec<&'d str> {
    descriptor
        .member_names()
        .filter(|name| !object.has_member(name))
        .collect()
}
