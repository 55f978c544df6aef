//! Sequence fallback: finite sequences and dense-array views aggregate into
//! one tensor whose leading axis is the sequence length.

use crate::{ResolutionEngine, ResolutionFailure, ResolutionTrace};
use ct_core::{CanonicalTypeId, DType, Payload, TensorValue, Value};
use ct_registry::CanonicalType;

/// Aggregates `value` for `target`, whose elements resolve to `element`.
///
/// `Ok(None)` means the value is not eligible (not a sequence or array view,
/// or nested past the configured depth). An element that fails to resolve
/// fails the whole aggregate with its own failure.
pub(crate) fn aggregate(
    engine: &ResolutionEngine,
    value: Value,
    target: &CanonicalType,
    element: CanonicalTypeId,
    depth: usize,
) -> Result<Option<TensorValue>, ResolutionFailure> {
    let producer = value.producer_type();
    let items = match value {
        Value::Object(object) => return Ok(object.dense_view()),
        Value::Sequence(items) if depth < engine.config().max_sequence_depth => items,
        _ => return Ok(None),
    };
    if items.is_empty() {
        return Ok(Some(TensorValue::empty(DType::F64)));
    }

    let element_type =
        engine
            .types()
            .get(element)
            .map_err(|_| ResolutionFailure::UnknownType {
                target: element.to_string(),
                producer,
            })?;

    let mut slices = Vec::with_capacity(items.len());
    for (index, item) in items.into_iter().enumerate() {
        let mut scratch = ResolutionTrace::new(item.producer_type(), element);
        let resolved = engine.resolve_at(item, &element_type, depth + 1, &mut scratch)?;
        match resolved.payload {
            Payload::Tensor(tensor) => slices.push(tensor),
            Payload::Handle(_) => {
                return Err(ResolutionFailure::RaggedOrMixedElements {
                    target: target.name().to_owned(),
                    producer,
                    detail: format!("element {index} resolved to a non-dense payload"),
                });
            }
        }
    }

    TensorValue::stack_axis0(&slices)
        .map(Some)
        .map_err(|err| ResolutionFailure::RaggedOrMixedElements {
            target: target.name().to_owned(),
            producer,
            detail: err.to_string(),
        })
}
