#![forbid(unsafe_code)]

//! Resolution engine: maps a runtime value to an instance of a canonical type.
//!
//! Precedence, first success wins:
//! 1. identity, when the value is already the target or a subtype of it
//! 2. cached strategy for the `(producer, target)` pair
//! 3. converter registry (exact producer, then its supertypes)
//! 4. structural protocol via the target's canonicalization entry point
//! 5. sequence fallback, when the target permits it
//!
//! Otherwise the result is [`ResolutionFailure::NoConversionFound`] listing
//! the strategies that were attempted.

pub mod cache;
pub mod config;
pub mod conformance;
pub mod error;
mod fallback;

pub use cache::{CachedStrategy, ResolutionCache};
pub use config::EngineConfig;
pub use conformance::{conforms, conforms_object, missing_members};
pub use error::{Attempted, ResolutionFailure};

use ct_convert::{ConverterEntry, ConverterRegistry};
use ct_core::{CanonicalTypeId, CanonicalValue, ForeignObject, ProducerType, Strategy, Value};
use ct_ledger::{EventLedger, Outcome, ResolutionRecord};
use ct_registry::{CanonicalType, CanonicalTypeRegistry};
use std::sync::Arc;

/// How one resolution was decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionTrace {
    pub producer: ProducerType,
    pub target: CanonicalTypeId,
    /// Strategy that produced the result, or the one whose callback failed.
    pub strategy: Option<Strategy>,
    pub cache_hit: bool,
    pub attempted: Attempted,
}

impl ResolutionTrace {
    #[must_use]
    pub fn new(producer: ProducerType, target: CanonicalTypeId) -> Self {
        Self {
            producer,
            target,
            strategy: None,
            cache_hit: false,
            attempted: Attempted::new(),
        }
    }
}

#[derive(Debug)]
pub struct ResolutionEngine {
    types: Arc<CanonicalTypeRegistry>,
    converters: Arc<ConverterRegistry>,
    cache: ResolutionCache,
    config: EngineConfig,
    ledger: Option<Arc<EventLedger>>,
}

impl ResolutionEngine {
    #[must_use]
    pub fn new(types: Arc<CanonicalTypeRegistry>, converters: Arc<ConverterRegistry>) -> Self {
        Self {
            types,
            converters,
            cache: ResolutionCache::new(),
            config: EngineConfig::default(),
            ledger: None,
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn with_ledger(mut self, ledger: Arc<EventLedger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub fn types(&self) -> &Arc<CanonicalTypeRegistry> {
        &self.types
    }

    #[must_use]
    pub fn converters(&self) -> &Arc<ConverterRegistry> {
        &self.converters
    }

    pub fn resolve(
        &self,
        value: Value,
        target: CanonicalTypeId,
    ) -> Result<CanonicalValue, ResolutionFailure> {
        self.resolve_traced(value, target).0
    }

    /// Resolves `value` and reports which strategy decided the outcome.
    pub fn resolve_traced(
        &self,
        value: Value,
        target: CanonicalTypeId,
    ) -> (Result<CanonicalValue, ResolutionFailure>, ResolutionTrace) {
        let mut trace = ResolutionTrace::new(value.producer_type(), target);
        let result = match self.types.get(target) {
            Ok(target_type) => {
                let result = self.resolve_at(value, &target_type, 0, &mut trace);
                self.observe(target_type.name(), &result, &trace);
                result
            }
            Err(_) => {
                let failure = ResolutionFailure::UnknownType {
                    target: target.to_string(),
                    producer: trace.producer,
                };
                let result = Err(failure);
                self.observe(&target.to_string(), &result, &trace);
                result
            }
        };
        (result, trace)
    }

    /// Drops every cached strategy. Converter-registry mutations already do
    /// this implicitly.
    pub fn invalidate_cache(&self) {
        self.cache.invalidate();
    }

    /// Cached strategies valid against the current converter registry.
    #[must_use]
    pub fn cache_len(&self) -> usize {
        self.cache.len(self.converters.generation())
    }

    pub(crate) fn resolve_at(
        &self,
        value: Value,
        target: &CanonicalType,
        depth: usize,
        trace: &mut ResolutionTrace,
    ) -> Result<CanonicalValue, ResolutionFailure> {
        let value = match value {
            Value::Canonical(canonical)
                if self
                    .types
                    .is_same_or_ancestor(target.id(), canonical.canonical) =>
            {
                trace.strategy = Some(Strategy::Identity);
                return Ok(canonical);
            }
            other => other,
        };
        let producer = value.producer_type();

        if self.config.cache_enabled {
            let generation = self.converters.generation();
            if let Some(cached) = self.cache.get(producer, target.id(), generation) {
                match cached {
                    CachedStrategy::Registry(entry) => {
                        trace.cache_hit = true;
                        return self.invoke_converter(&entry, &value, target, trace);
                    }
                    CachedStrategy::Protocol => {
                        if let Some(object) = value.as_object()
                            && let Some(entry_point) = target.descriptor().entry_point_name()
                        {
                            trace.cache_hit = true;
                            return self.invoke_protocol(object, entry_point, target, trace);
                        }
                    }
                }
            }
        }

        // ── Registry ───────────────────────────────────────────────
        trace.attempted.push(Strategy::Registry);
        let (entry, generation) =
            self.converters
                .lookup_with_generation(producer, value.supertypes(), target.id());
        if let Some(entry) = entry {
            let canonical = self.invoke_converter(&entry, &value, target, trace)?;
            self.remember(producer, target.id(), CachedStrategy::Registry(entry), generation);
            return Ok(canonical);
        }

        // ── Protocol ───────────────────────────────────────────────
        if let Some(entry_point) = target.descriptor().entry_point_name() {
            trace.attempted.push(Strategy::Protocol);
            if let Some(object) = value.as_object()
                && conforms_object(object, target.descriptor())
            {
                let canonical = self.invoke_protocol(object, entry_point, target, trace)?;
                self.remember(producer, target.id(), CachedStrategy::Protocol, generation);
                return Ok(canonical);
            }
        }

        // ── Sequence ───────────────────────────────────────────────
        if let Some(element) = target.sequence_element() {
            trace.attempted.push(Strategy::Sequence);
            if let Some(tensor) = fallback::aggregate(self, value, target, element, depth)? {
                trace.strategy = Some(Strategy::Sequence);
                return Ok(CanonicalValue::tensor(target.id(), tensor));
            }
        }

        Err(ResolutionFailure::NoConversionFound {
            target: target.name().to_owned(),
            producer,
            attempted: trace.attempted.clone(),
        })
    }

    fn invoke_converter(
        &self,
        entry: &ConverterEntry,
        value: &Value,
        target: &CanonicalType,
        trace: &mut ResolutionTrace,
    ) -> Result<CanonicalValue, ResolutionFailure> {
        trace.strategy = Some(Strategy::Registry);
        entry
            .convert(value)
            .map(|payload| CanonicalValue::new(target.id(), payload))
            .map_err(|error| ResolutionFailure::Converter {
                target: target.name().to_owned(),
                producer: value.producer_type(),
                strategy: Strategy::Registry,
                error,
            })
    }

    fn invoke_protocol(
        &self,
        object: &dyn ForeignObject,
        entry_point: &str,
        target: &CanonicalType,
        trace: &mut ResolutionTrace,
    ) -> Result<CanonicalValue, ResolutionFailure> {
        trace.strategy = Some(Strategy::Protocol);
        object
            .canonicalize(entry_point)
            .map(|payload| CanonicalValue::new(target.id(), payload))
            .map_err(|error| ResolutionFailure::Converter {
                target: target.name().to_owned(),
                producer: object.producer_type(),
                strategy: Strategy::Protocol,
                error,
            })
    }

    fn remember(
        &self,
        producer: ProducerType,
        target: CanonicalTypeId,
        strategy: CachedStrategy,
        generation: u64,
    ) {
        if self.config.cache_enabled {
            self.cache.insert(producer, target, strategy, generation);
        }
    }

    /// Identity resolutions are neither logged nor recorded.
    fn observe(
        &self,
        target: &str,
        result: &Result<CanonicalValue, ResolutionFailure>,
        trace: &ResolutionTrace,
    ) {
        if trace.strategy == Some(Strategy::Identity) && result.is_ok() {
            return;
        }
        let outcome = match result {
            Ok(_) => {
                tracing::debug!(
                    producer = trace.producer.name(),
                    target = target,
                    strategy = trace.strategy.map(Strategy::as_str),
                    cache_hit = trace.cache_hit,
                    "value resolved",
                );
                Outcome::Resolved
            }
            Err(failure) => {
                tracing::debug!(
                    producer = trace.producer.name(),
                    target = target,
                    error = %failure,
                    "resolution failed",
                );
                Outcome::Failed {
                    reason: failure.to_string(),
                }
            }
        };
        if self.config.record_ledger
            && let Some(ledger) = &self.ledger
        {
            ledger.record_resolution(ResolutionRecord {
                producer: trace.producer.name().to_owned(),
                target: target.to_owned(),
                strategy: trace.strategy,
                cache_hit: trace.cache_hit,
                attempted: trace.attempted.to_vec(),
                outcome,
            });
        }
    }
}
