#![forbid(unsafe_code)]

//! Signature compatibility between a declared annotation and the runtime
//! signature of a value.
//!
//! The comparison is pure. A conflict is a reportable outcome, not an error:
//! callers decide whether it is fatal.

use ct_core::{DType, Shape, TensorValue};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dim {
    Known(u32),
    Unknown,
}

impl std::fmt::Display for Dim {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Known(size) => write!(f, "{size}"),
            Self::Unknown => f.write_str("?"),
        }
    }
}

/// Static shape and data kind of a canonical value, as produced by the
/// tracing side. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeSignature {
    dims: Vec<Dim>,
    kind: DType,
}

impl TypeSignature {
    #[must_use]
    pub fn new(dims: Vec<Dim>, kind: DType) -> Self {
        Self { dims, kind }
    }

    #[must_use]
    pub fn from_shape(shape: &Shape, kind: DType) -> Self {
        Self::new(shape.dims.iter().copied().map(Dim::Known).collect(), kind)
    }

    #[must_use]
    pub fn of_tensor(tensor: &TensorValue) -> Self {
        Self::from_shape(&tensor.shape, tensor.dtype)
    }

    #[must_use]
    pub fn dims(&self) -> &[Dim] {
        &self.dims
    }

    #[must_use]
    pub fn kind(&self) -> DType {
        self.kind
    }

    #[must_use]
    pub fn rank(&self) -> usize {
        self.dims.len()
    }
}

/// A declared annotation. `dims: None` leaves the rank open and
/// `kind: None` leaves the data kind open.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AnnotationShape {
    pub dims: Option<Vec<Dim>>,
    pub kind: Option<DType>,
}

impl AnnotationShape {
    #[must_use]
    pub fn new(dims: Vec<Dim>, kind: DType) -> Self {
        Self {
            dims: Some(dims),
            kind: Some(kind),
        }
    }

    #[must_use]
    pub fn unconstrained() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn exact(signature: &TypeSignature) -> Self {
        Self::new(signature.dims.clone(), signature.kind)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Site {
    Rank,
    Axis(usize),
    Kind,
}

/// Which side pins down a detail the other leaves open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Specific {
    Declared,
    Runtime,
    /// Both sides are specific and disagree.
    Neither,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SignatureDelta {
    pub site: Site,
    pub declared: String,
    pub runtime: String,
    pub specific: Specific,
}

impl std::fmt::Display for SignatureDelta {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.site {
            Site::Rank => write!(f, "rank: declared {}, runtime {}", self.declared, self.runtime),
            Site::Axis(axis) => write!(
                f,
                "axis {axis}: declared {}, runtime {}",
                self.declared, self.runtime
            ),
            Site::Kind => write!(f, "kind: declared {}, runtime {}", self.declared, self.runtime),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", content = "deltas", rename_all = "snake_case")]
pub enum Compatibility {
    Agreement,
    Refinement(Vec<SignatureDelta>),
    Conflict(Vec<SignatureDelta>),
}

impl Compatibility {
    #[must_use]
    pub fn is_agreement(&self) -> bool {
        matches!(self, Self::Agreement)
    }

    #[must_use]
    pub fn is_refinement(&self) -> bool {
        matches!(self, Self::Refinement(_))
    }

    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    #[must_use]
    pub fn deltas(&self) -> &[SignatureDelta] {
        match self {
            Self::Agreement => &[],
            Self::Refinement(deltas) | Self::Conflict(deltas) => deltas,
        }
    }
}

impl std::fmt::Display for Compatibility {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (label, deltas) = match self {
            Self::Agreement => return f.write_str("agreement"),
            Self::Refinement(deltas) => ("refinement", deltas),
            Self::Conflict(deltas) => ("conflict", deltas),
        };
        write!(f, "{label}")?;
        for (index, delta) in deltas.iter().enumerate() {
            let sep = if index == 0 { ": " } else { "; " };
            write!(f, "{sep}{delta}")?;
        }
        Ok(())
    }
}

/// Compares `annotation` against `runtime`.
///
/// Any explicit disagreement makes the result a conflict, listing every
/// disagreeing site. Otherwise a site that one side leaves open and the
/// other pins down makes it a refinement. A rank mismatch stops the
/// per-axis comparison.
#[must_use]
pub fn check(annotation: &AnnotationShape, runtime: &TypeSignature) -> Compatibility {
    let mut refinements = Vec::new();
    let mut conflicts = Vec::new();

    match annotation.kind {
        Some(kind) if kind == runtime.kind => {}
        Some(kind) => conflicts.push(delta(Site::Kind, kind, runtime.kind, Specific::Neither)),
        None => refinements.push(delta(Site::Kind, "?", runtime.kind, Specific::Runtime)),
    }

    match &annotation.dims {
        None => refinements.push(delta(Site::Rank, "?", runtime.rank(), Specific::Runtime)),
        Some(dims) if dims.len() != runtime.rank() => {
            conflicts.push(delta(Site::Rank, dims.len(), runtime.rank(), Specific::Neither));
        }
        Some(dims) => {
            for (axis, (declared, actual)) in dims.iter().zip(&runtime.dims).enumerate() {
                let specific = match (declared, actual) {
                    (Dim::Known(lhs), Dim::Known(rhs)) if lhs == rhs => continue,
                    (Dim::Unknown, Dim::Unknown) => continue,
                    (Dim::Known(_), Dim::Known(_)) => Specific::Neither,
                    (Dim::Unknown, Dim::Known(_)) => Specific::Runtime,
                    (Dim::Known(_), Dim::Unknown) => Specific::Declared,
                };
                let entry = delta(Site::Axis(axis), declared, actual, specific);
                if specific == Specific::Neither {
                    conflicts.push(entry);
                } else {
                    refinements.push(entry);
                }
            }
        }
    }

    if !conflicts.is_empty() {
        Compatibility::Conflict(conflicts)
    } else if !refinements.is_empty() {
        Compatibility::Refinement(refinements)
    } else {
        Compatibility::Agreement
    }
}

fn delta(
    site: Site,
    declared: impl std::fmt::Display,
    runtime: impl std::fmt::Display,
    specific: Specific,
) -> SignatureDelta {
    SignatureDelta {
        site,
        declared: declared.to_string(),
        runtime: runtime.to_string(),
        specific,
    }
}
