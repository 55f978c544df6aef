use ct_core::{ConverterError, ProducerType, Strategy};
use smallvec::SmallVec;

/// Strategies tried by one resolution, in precedence order.
pub type Attempted = SmallVec<[Strategy; 3]>;

/// Every variant names the target canonical type and the concrete producer
/// type so a failure is actionable without further context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionFailure {
    UnknownType {
        target: String,
        producer: ProducerType,
    },
    Converter {
        target: String,
        producer: ProducerType,
        strategy: Strategy,
        error: ConverterError,
    },
    RaggedOrMixedElements {
        target: String,
        producer: ProducerType,
        detail: String,
    },
    NoConversionFound {
        target: String,
        producer: ProducerType,
        attempted: Attempted,
    },
}

impl ResolutionFailure {
    #[must_use]
    pub fn target(&self) -> &str {
        match self {
            Self::UnknownType { target, .. }
            | Self::Converter { target, .. }
            | Self::RaggedOrMixedElements { target, .. }
            | Self::NoConversionFound { target, .. } => target,
        }
    }

    #[must_use]
    pub fn producer(&self) -> ProducerType {
        match self {
            Self::UnknownType { producer, .. }
            | Self::Converter { producer, .. }
            | Self::RaggedOrMixedElements { producer, .. }
            | Self::NoConversionFound { producer, .. } => *producer,
        }
    }

    /// Strategies tried before giving up; empty for every other variant.
    #[must_use]
    pub fn attempted(&self) -> &[Strategy] {
        match self {
            Self::NoConversionFound { attempted, .. } => attempted,
            _ => &[],
        }
    }
}

impl std::fmt::Display for ResolutionFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownType { target, producer } => write!(
                f,
                "cannot resolve `{producer}`: unknown canonical type `{target}`"
            ),
            Self::Converter {
                target,
                producer,
                strategy,
                error,
            } => write!(
                f,
                "{strategy} conversion of `{producer}` to `{target}` failed: {}",
                error.message
            ),
            Self::RaggedOrMixedElements {
                target,
                producer,
                detail,
            } => write!(
                f,
                "`{producer}` cannot become `{target}`: ragged or mixed elements ({detail})"
            ),
            Self::NoConversionFound {
                target,
                producer,
                attempted,
            } => {
                let attempted = attempted
                    .iter()
                    .map(|strategy| strategy.as_str())
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(
                    f,
                    "no conversion from `{producer}` to canonical type `{target}` (attempted: {attempted})"
                )
            }
        }
    }
}

impl std::error::Error for ResolutionFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Converter { error, .. } => Some(error),
            _ => None,
        }
    }
}
