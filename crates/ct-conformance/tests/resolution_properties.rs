#![forbid(unsafe_code)]

//! Resolution behaviour across the public surface:
//! identity, registry precedence, cache coherence under mutation, sequence
//! aggregation and no-match diagnostics.

use ct_api::{ApiError, TypeSystem};
use ct_conformance::fixtures::{
    BASE, DerivedObject, PROTOCOL_TENSOR, ProtocolTensor, SpyConverter, UnrelatedObject,
    VariableLike,
};
use ct_conformance::harness_system;
use ct_convert::ConverterPriority;
use ct_core::{
    CanonicalValue, ConverterError, DType, Literal, Payload, ProducerType, Strategy, TensorValue,
    Value,
};
use ct_ledger::Outcome;
use ct_resolve::ResolutionFailure;
use ct_test_utils::{TestMode, property_runner, run_logged, test_id};
use proptest::prelude::*;
use proptest::strategy::Strategy as _;
use proptest::test_runner::TestCaseError;
use std::sync::Arc;

fn system() -> TypeSystem {
    harness_system().expect("built-ins install")
}

fn scalar_of(value: &CanonicalValue) -> Option<i64> {
    value.as_tensor()?.elements.first()?.as_i64()
}

fn protocol(value: i64) -> Value {
    Value::object(ProtocolTensor { value })
}

// ── Identity ────────────────────────────────────────────────────────

#[test]
fn resolving_a_resolved_value_is_identity() {
    let system = system();
    let tensor = system.lookup("Tensor").expect("Tensor").id();
    let spy = SpyConverter::returning(-1);
    system
        .register_converter(
            ProducerType::CANONICAL,
            "Tensor",
            spy.converter(),
            ConverterPriority::Default,
        )
        .expect("register canonical converter");
    let mut runner = property_runner();
    let matrix = (1_usize..4, 1_usize..4).prop_flat_map(|(rows, cols)| {
        prop::collection::vec(prop::collection::vec(any::<i64>(), cols), rows)
    });
    runner
        .run(&matrix, |rows| {
            let once = system
                .resolve(Value::from(rows), "Tensor")
                .map_err(|err| TestCaseError::fail(err.to_string()))?;
            let (twice, trace) = system.resolve_traced(Value::Canonical(once.clone()), tensor);
            let twice = twice.map_err(|err| TestCaseError::fail(err.to_string()))?;
            prop_assert_eq!(&once, &twice);
            prop_assert_eq!(trace.strategy, Some(Strategy::Identity));
            prop_assert!(trace.attempted.is_empty());
            Ok(())
        })
        .expect("canonical values resolve to themselves");
    assert_eq!(spy.calls(), 0);
}

#[test]
fn subtype_instance_is_returned_unchanged_for_ancestor_target() {
    let system = system();
    let ids = system.builtins().expect("installed");
    let symbol = CanonicalValue::tensor(ids.symbol, TensorValue::scalar(Literal::I64(9)));
    let resolved = system
        .resolve(Value::Canonical(symbol.clone()), "Tensor")
        .expect("identity through subtype");
    assert_eq!(resolved, symbol);
    assert_eq!(system.type_name(resolved.canonical), "Symbol");
}

// ── Registry precedence ────────────────────────────────────────────

#[test]
fn registry_beats_protocol_for_conforming_object() {
    run_logged(
        &test_id(module_path!(), "registry_beats_protocol_for_conforming_object"),
        &("ProtocolTensor", "Tensor"),
        TestMode::Conformance,
        || {
            let system = system();
            let spy = SpyConverter::returning(42);
            system
                .register_converter(
                    PROTOCOL_TENSOR,
                    "Tensor",
                    spy.converter(),
                    ConverterPriority::Default,
                )
                .map_err(|err| err.to_string())?;
            let resolved = system
                .resolve(protocol(1), "Tensor")
                .map_err(|err| err.to_string())?;
            if scalar_of(&resolved) != Some(42) {
                return Err(format!("protocol result leaked through: {resolved:?}"));
            }
            if spy.calls() != 1 {
                return Err(format!("spy called {} times", spy.calls()));
            }
            Ok(())
        },
    );
}

#[test]
fn supertype_converter_covers_subclass_producer() {
    let system = system();
    let spy = SpyConverter::returning(5);
    system
        .register_converter(BASE, "Variable", spy.converter(), ConverterPriority::Default)
        .expect("register");
    let resolved = system
        .resolve(Value::object(DerivedObject), "Variable")
        .expect("inherited converter");
    assert_eq!(system.type_name(resolved.canonical), "Variable");
    assert_eq!(spy.calls(), 1);
}

#[test]
fn converter_error_surfaces_unchanged() {
    let system = system();
    system
        .register_converter(
            PROTOCOL_TENSOR,
            "Tensor",
            |_: &Value| Err(ConverterError::new("backing store closed")),
            ConverterPriority::Override,
        )
        .expect("register");
    let err = system
        .resolve(protocol(1), "Tensor")
        .expect_err("converter failure");
    let ApiError::Resolution(ResolutionFailure::Converter {
        strategy, error, ..
    }) = &err
    else {
        panic!("unexpected error: {err}");
    };
    assert_eq!(*strategy, Strategy::Registry);
    assert_eq!(error.message, "backing store closed");
}

// ── Cache coherence ────────────────────────────────────────────────

#[test]
fn cache_follows_every_registry_mutation() {
    run_logged(
        &test_id(module_path!(), "cache_follows_every_registry_mutation"),
        &("register", "replace", "deregister"),
        TestMode::Conformance,
        || {
            let system = system();
            let tensor = system.lookup("Tensor").map_err(|err| err.to_string())?.id();
            let trace_of = |expected: i64| -> Result<(Option<Strategy>, bool), String> {
                let (result, trace) = system.resolve_traced(protocol(7), tensor);
                let resolved = result.map_err(|err| err.to_string())?;
                if scalar_of(&resolved) != Some(expected) {
                    return Err(format!("expected {expected}, got {resolved:?}"));
                }
                Ok((trace.strategy, trace.cache_hit))
            };

            assert_eq!(trace_of(7)?, (Some(Strategy::Protocol), false));
            assert_eq!(trace_of(7)?, (Some(Strategy::Protocol), true));

            let first = SpyConverter::returning(1);
            system
                .register_converter(
                    PROTOCOL_TENSOR,
                    "Tensor",
                    first.converter(),
                    ConverterPriority::Default,
                )
                .map_err(|err| err.to_string())?;
            assert_eq!(trace_of(1)?, (Some(Strategy::Registry), false));
            assert_eq!(trace_of(1)?, (Some(Strategy::Registry), true));

            let second = SpyConverter::returning(2);
            let registration = system
                .register_converter(
                    PROTOCOL_TENSOR,
                    "Tensor",
                    second.converter(),
                    ConverterPriority::Override,
                )
                .map_err(|err| err.to_string())?;
            assert!(registration.replaced());
            assert_eq!(trace_of(2)?, (Some(Strategy::Registry), false));
            assert_eq!(first.calls(), 2);

            system
                .deregister_converter(PROTOCOL_TENSOR, "Tensor")
                .map_err(|err| err.to_string())?;
            assert_eq!(trace_of(7)?, (Some(Strategy::Protocol), false));
            assert_eq!(second.calls(), 1);
            Ok(())
        },
    );
}

#[test]
fn concurrent_resolution_never_observes_partial_registration() {
    let system = Arc::new(system());
    let tensor = system.lookup("Tensor").expect("Tensor").id();

    std::thread::scope(|scope| {
        for _ in 0..4 {
            let system = Arc::clone(&system);
            scope.spawn(move || {
                for _ in 0..250 {
                    let (result, trace) = system.resolve_traced(protocol(3), tensor);
                    let got = scalar_of(&result.expect("always resolvable"));
                    match trace.strategy {
                        Some(Strategy::Protocol) => assert_eq!(got, Some(3)),
                        Some(Strategy::Registry) => {
                            assert!(matches!(got, Some(100..=199)), "torn value {got:?}");
                        }
                        other => panic!("unexpected strategy {other:?}"),
                    }
                }
            });
        }
        let writer = Arc::clone(&system);
        scope.spawn(move || {
            for round in 0..100 {
                let spy = SpyConverter::returning(100 + round);
                writer
                    .register_converter(
                        PROTOCOL_TENSOR,
                        "Tensor",
                        spy.converter(),
                        ConverterPriority::Default,
                    )
                    .expect("register");
                if round % 3 == 0 {
                    writer
                        .deregister_converter(PROTOCOL_TENSOR, "Tensor")
                        .expect("deregister");
                }
            }
        });
    });
}

// ── Sequence fallback ──────────────────────────────────────────────

#[test]
fn nested_lists_aggregate_and_ragged_lists_fail() {
    let system = system();
    let square = system
        .resolve(Value::from(vec![vec![1_i64, 2], vec![3, 4]]), "Tensor")
        .expect("2x2");
    let tensor = square.as_tensor().expect("dense");
    assert_eq!(tensor.shape.dims, vec![2, 2]);
    assert_eq!(tensor.dtype, DType::I64);

    let ragged = Value::sequence([Value::from(vec![1_i64, 2]), Value::from(vec![3_i64])]);
    let err = system.resolve(ragged, "Tensor").expect_err("ragged");
    assert!(matches!(
        err,
        ApiError::Resolution(ResolutionFailure::RaggedOrMixedElements { .. })
    ));
}

#[test]
fn protocol_objects_inside_lists_aggregate() {
    let system = system();
    let resolved = system
        .resolve(Value::sequence([protocol(1), protocol(2), protocol(3)]), "Tensor")
        .expect("protocol elements");
    let tensor = resolved.as_tensor().expect("dense");
    assert_eq!(tensor.to_i64_vec(), Some(vec![1, 2, 3]));
}

#[test]
fn handle_payload_cannot_be_aggregated() {
    let system = system();
    system
        .register_canonical_type(
            "VariableList",
            None,
            ct_registry::CapabilityDescriptor::new().with_sequence_fallback("Variable"),
        )
        .expect("register");
    let value = Value::sequence([Value::object(VariableLike {
        name: "w".to_owned(),
    })]);
    let err = system
        .resolve(value, "VariableList")
        .expect_err("handles are not dense");
    assert!(matches!(
        err,
        ApiError::Resolution(ResolutionFailure::RaggedOrMixedElements { .. })
    ));
}

// ── Protocol handles ───────────────────────────────────────────────

#[test]
fn conforming_variable_resolves_to_handle() {
    let system = system();
    let resolved = system
        .resolve(
            Value::object(VariableLike {
                name: "weights".to_owned(),
            }),
            "Variable",
        )
        .expect("protocol");
    assert!(matches!(resolved.payload, Payload::Handle(_)));
    assert_eq!(system.type_name(resolved.canonical), "Variable");
}

// ── Diagnostics ────────────────────────────────────────────────────

#[test]
fn no_match_names_target_producer_and_attempts() {
    let system = system();
    let err = system
        .resolve(Value::object(UnrelatedObject), "Tensor")
        .expect_err("no path");
    let ApiError::Resolution(failure) = &err else {
        panic!("unexpected error: {err}");
    };
    assert_eq!(
        failure.attempted(),
        &[Strategy::Registry, Strategy::Protocol, Strategy::Sequence]
    );
    let message = err.to_string();
    assert!(message.contains("conformance.Unrelated"));
    assert!(message.contains("`Tensor`"));

    let records = system.ledger().resolutions();
    let last = records.last().expect("recorded");
    assert_eq!(last.producer, "conformance.Unrelated");
    assert!(matches!(last.outcome, Outcome::Failed { .. }));
}
