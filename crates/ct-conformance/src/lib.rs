#![forbid(unsafe_code)]

//! Behavioural conformance cases for canonical type resolution and signature
//! checking, expressible as JSON so new scenarios need no code.

pub mod fixtures;

use ct_api::TypeSystem;
use ct_core::{DType, Literal, Strategy, Value};
use ct_resolve::{EngineConfig, ResolutionFailure};
use ct_signature::{AnnotationShape, Compatibility, Dim, TypeSignature};
use fixtures::{DenseArray, ProtocolTensor, UnrelatedObject};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum FixtureValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Sequence(Vec<FixtureValue>),
    ProtocolTensor(i64),
    Unrelated,
    Dense { rows: u32, cols: u32, data: Vec<f64> },
}

impl FixtureValue {
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::Int(value) => Value::scalar_i64(*value),
            Self::Float(value) => Value::scalar_f64(*value),
            Self::Bool(value) => Value::Scalar(Literal::Bool(*value)),
            Self::Sequence(items) => Value::sequence(items.iter().map(Self::to_value)),
            Self::ProtocolTensor(value) => Value::object(ProtocolTensor { value: *value }),
            Self::Unrelated => Value::object(UnrelatedObject),
            Self::Dense { rows, cols, data } => Value::object(DenseArray {
                rows: *rows,
                cols: *cols,
                data: data.clone(),
            }),
        }
    }

    #[must_use]
    pub fn ints(values: &[i64]) -> Self {
        Self::Sequence(values.iter().copied().map(Self::Int).collect())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ExpectedOutcome {
    Resolved { strategy: Strategy, dims: Vec<u32> },
    RaggedOrMixed,
    NoConversion { attempted: Vec<Strategy> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionCase {
    pub name: String,
    pub value: FixtureValue,
    pub target: String,
    pub expect: ExpectedOutcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Agreement,
    Refinement,
    Conflict,
}

impl Verdict {
    #[must_use]
    pub fn of(compatibility: &Compatibility) -> Self {
        match compatibility {
            Compatibility::Agreement => Self::Agreement,
            Compatibility::Refinement(_) => Self::Refinement,
            Compatibility::Conflict(_) => Self::Conflict,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureCase {
    pub name: String,
    pub annotation: AnnotationShape,
    pub runtime: TypeSignature,
    pub expect: Verdict,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseReport {
    pub name: String,
    pub passed: bool,
    pub detail: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConformanceReport {
    pub suite: String,
    pub total: usize,
    pub passed: usize,
    pub cases: Vec<CaseReport>,
}

impl ConformanceReport {
    fn from_cases(suite: &str, cases: Vec<CaseReport>) -> Self {
        Self {
            suite: suite.to_owned(),
            total: cases.len(),
            passed: cases.iter().filter(|case| case.passed).count(),
            cases,
        }
    }

    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.passed == self.total
    }

    pub fn failures(&self) -> impl Iterator<Item = &CaseReport> {
        self.cases.iter().filter(|case| !case.passed)
    }
}

/// Fresh isolated system with built-ins installed.
pub fn harness_system() -> Result<TypeSystem, ct_api::ApiError> {
    TypeSystem::with_builtins(EngineConfig::default())
}

pub fn load_resolution_cases(json: &str) -> Result<Vec<ResolutionCase>, serde_json::Error> {
    serde_json::from_str(json)
}

pub fn load_signature_cases(json: &str) -> Result<Vec<SignatureCase>, serde_json::Error> {
    serde_json::from_str(json)
}

#[must_use]
pub fn default_resolution_cases() -> Vec<ResolutionCase> {
    use ExpectedOutcome::{NoConversion, RaggedOrMixed, Resolved};
    use Strategy::{Protocol, Registry, Sequence};

    let case = |name: &str, value: FixtureValue, target: &str, expect: ExpectedOutcome| {
        ResolutionCase {
            name: name.to_owned(),
            value,
            target: target.to_owned(),
            expect,
        }
    };
    vec![
        case(
            "int_scalar_uses_builtin_converter",
            FixtureValue::Int(3),
            "Tensor",
            Resolved {
                strategy: Registry,
                dims: vec![],
            },
        ),
        case(
            "conforming_object_uses_protocol",
            FixtureValue::ProtocolTensor(4),
            "Tensor",
            Resolved {
                strategy: Protocol,
                dims: vec![],
            },
        ),
        case(
            "nested_list_aggregates_2x2",
            FixtureValue::Sequence(vec![FixtureValue::ints(&[1, 2]), FixtureValue::ints(&[3, 4])]),
            "Tensor",
            Resolved {
                strategy: Sequence,
                dims: vec![2, 2],
            },
        ),
        case(
            "empty_list_is_zero_length",
            FixtureValue::Sequence(vec![]),
            "Tensor",
            Resolved {
                strategy: Sequence,
                dims: vec![0],
            },
        ),
        case(
            "dense_view_aggregates",
            FixtureValue::Dense {
                rows: 2,
                cols: 3,
                data: vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0],
            },
            "Tensor",
            Resolved {
                strategy: Sequence,
                dims: vec![2, 3],
            },
        ),
        case(
            "ragged_list_is_rejected",
            FixtureValue::Sequence(vec![FixtureValue::ints(&[1, 2]), FixtureValue::ints(&[3])]),
            "Tensor",
            RaggedOrMixed,
        ),
        case(
            "mixed_dtypes_are_rejected",
            FixtureValue::Sequence(vec![FixtureValue::Int(1), FixtureValue::Float(2.5)]),
            "Tensor",
            RaggedOrMixed,
        ),
        case(
            "unrelated_object_lists_all_strategies",
            FixtureValue::Unrelated,
            "Tensor",
            NoConversion {
                attempted: vec![Registry, Protocol, Sequence],
            },
        ),
        case(
            "list_to_variable_skips_sequence",
            FixtureValue::ints(&[1]),
            "Variable",
            NoConversion {
                attempted: vec![Registry, Protocol],
            },
        ),
    ]
}

#[must_use]
pub fn default_signature_cases() -> Vec<SignatureCase> {
    let int_annotation = AnnotationShape::new(vec![Dim::Unknown, Dim::Known(3)], DType::I32);
    let case = |name: &str, annotation: &AnnotationShape, runtime: TypeSignature, expect| {
        SignatureCase {
            name: name.to_owned(),
            annotation: annotation.clone(),
            runtime,
            expect,
        }
    };
    vec![
        case(
            "runtime_pins_open_axis",
            &int_annotation,
            TypeSignature::new(vec![Dim::Known(5), Dim::Known(3)], DType::I32),
            Verdict::Refinement,
        ),
        case(
            "kind_disagrees",
            &int_annotation,
            TypeSignature::new(vec![Dim::Known(5), Dim::Known(3)], DType::F32),
            Verdict::Conflict,
        ),
        case(
            "identical_partial_shape",
            &int_annotation,
            TypeSignature::new(vec![Dim::Unknown, Dim::Known(3)], DType::I32),
            Verdict::Agreement,
        ),
        case(
            "rank_disagrees",
            &int_annotation,
            TypeSignature::new(vec![Dim::Known(3)], DType::I32),
            Verdict::Conflict,
        ),
    ]
}

#[must_use]
pub fn evaluate_resolution_case(system: &TypeSystem, case: &ResolutionCase) -> CaseReport {
    let report = |detail: Option<String>| CaseReport {
        name: case.name.clone(),
        passed: detail.is_none(),
        detail,
    };
    let target = match system.lookup(&case.target) {
        Ok(target) => target,
        Err(err) => return report(Some(err.to_string())),
    };
    let (result, trace) = system.resolve_traced(case.value.to_value(), target.id());

    let mismatch = match (&case.expect, &result) {
        (ExpectedOutcome::Resolved { strategy, dims }, Ok(resolved)) => {
            let actual_dims = resolved.as_tensor().map(|tensor| tensor.shape.dims.clone());
            if trace.strategy != Some(*strategy) {
                Some(format!("strategy {:?}, expected {strategy}", trace.strategy))
            } else if actual_dims.as_ref() != Some(dims) {
                Some(format!("dims {actual_dims:?}, expected {dims:?}"))
            } else {
                None
            }
        }
        (ExpectedOutcome::RaggedOrMixed, Err(ResolutionFailure::RaggedOrMixedElements { .. })) => {
            None
        }
        (
            ExpectedOutcome::NoConversion { attempted },
            Err(failure @ ResolutionFailure::NoConversionFound { .. }),
        ) => (failure.attempted() != attempted.as_slice())
            .then(|| format!("attempted {:?}, expected {attempted:?}", failure.attempted())),
        (expected, actual) => Some(format!("expected {expected:?}, got {actual:?}")),
    };
    report(mismatch)
}

#[must_use]
pub fn evaluate_signature_case(system: &TypeSystem, case: &SignatureCase) -> CaseReport {
    let verdict = system.check(&case.annotation, &case.runtime);
    let actual = Verdict::of(&verdict);
    CaseReport {
        name: case.name.clone(),
        passed: actual == case.expect,
        detail: (actual != case.expect)
            .then(|| format!("got {verdict}, expected {:?}", case.expect)),
    }
}

#[must_use]
pub fn run_resolution_suite(system: &TypeSystem, cases: &[ResolutionCase]) -> ConformanceReport {
    ConformanceReport::from_cases(
        "resolution",
        cases
            .iter()
            .map(|case| evaluate_resolution_case(system, case))
            .collect(),
    )
}

#[must_use]
pub fn run_signature_suite(system: &TypeSystem, cases: &[SignatureCase]) -> ConformanceReport {
    ConformanceReport::from_cases(
        "signature",
        cases
            .iter()
            .map(|case| evaluate_signature_case(system, case))
            .collect(),
    )
}
