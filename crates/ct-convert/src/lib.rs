#![forbid(unsafe_code)]

//! Converter registry: explicit, author-controlled conversions from a
//! concrete producer type to a canonical type.
//!
//! At most one entry exists per `(producer, target)` pair. Registering the
//! pair again replaces the entry atomically (last write wins) and is reported
//! as a non-fatal signal. Every mutation bumps [`ConverterRegistry::generation`],
//! which is what downstream resolution caches key their validity on.

use ct_core::{CanonicalTypeId, ConverterError, Payload, ProducerType, Value};
use ct_ledger::{EventLedger, RegistryEvent};
use ct_registry::CanonicalType;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

pub type ConvertFn = dyn Fn(&Value) -> Result<Payload, ConverterError> + Send + Sync;

/// Descriptive tag carried into diagnostics and the ledger. It does not
/// override last-write-wins replacement.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ConverterPriority {
    Legacy,
    #[default]
    Default,
    Override,
}

impl ConverterPriority {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Legacy => "legacy",
            Self::Default => "default",
            Self::Override => "override",
        }
    }
}

pub struct ConverterEntry {
    producer: ProducerType,
    target: CanonicalTypeId,
    target_name: String,
    sequence: u64,
    priority: ConverterPriority,
    func: Box<ConvertFn>,
}

impl ConverterEntry {
    #[must_use]
    pub fn producer(&self) -> ProducerType {
        self.producer
    }

    #[must_use]
    pub fn target(&self) -> CanonicalTypeId {
        self.target
    }

    #[must_use]
    pub fn target_name(&self) -> &str {
        &self.target_name
    }

    /// Registration sequence number, unique within one registry.
    #[must_use]
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    #[must_use]
    pub fn priority(&self) -> ConverterPriority {
        self.priority
    }

    pub fn convert(&self, value: &Value) -> Result<Payload, ConverterError> {
        (self.func)(value)
    }
}

impl std::fmt::Debug for ConverterEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConverterEntry")
            .field("producer", &self.producer)
            .field("target", &self.target_name)
            .field("sequence", &self.sequence)
            .field("priority", &self.priority)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    Inserted { sequence: u64 },
    Replaced { previous_sequence: u64, sequence: u64 },
}

impl Registration {
    #[must_use]
    pub fn sequence(self) -> u64 {
        match self {
            Self::Inserted { sequence } | Self::Replaced { sequence, .. } => sequence,
        }
    }

    #[must_use]
    pub fn replaced(self) -> bool {
        matches!(self, Self::Replaced { .. })
    }
}

#[derive(Default)]
struct ConverterTable {
    entries: FxHashMap<(ProducerType, CanonicalTypeId), Arc<ConverterEntry>>,
    next_sequence: u64,
}

#[derive(Default)]
pub struct ConverterRegistry {
    table: RwLock<ConverterTable>,
    generation: AtomicU64,
    ledger: Option<Arc<EventLedger>>,
}

impl ConverterRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_ledger(ledger: Arc<EventLedger>) -> Self {
        Self {
            ledger: Some(ledger),
            ..Self::default()
        }
    }

    /// Inserts or replaces the converter for `(producer, target)`.
    pub fn register_converter<F>(
        &self,
        producer: ProducerType,
        target: &CanonicalType,
        func: F,
        priority: ConverterPriority,
    ) -> Registration
    where
        F: Fn(&Value) -> Result<Payload, ConverterError> + Send + Sync + 'static,
    {
        let registration = {
            let mut table = self.table.write();
            let sequence = table.next_sequence;
            table.next_sequence += 1;
            let entry = Arc::new(ConverterEntry {
                producer,
                target: target.id(),
                target_name: target.name().to_owned(),
                sequence,
                priority,
                func: Box::new(func),
            });
            let previous = table.entries.insert((producer, target.id()), entry);
            self.generation.fetch_add(1, Ordering::SeqCst);
            match previous {
                Some(previous) => Registration::Replaced {
                    previous_sequence: previous.sequence,
                    sequence,
                },
                None => Registration::Inserted { sequence },
            }
        };

        match registration {
            Registration::Replaced {
                previous_sequence,
                sequence,
            } => {
                tracing::warn!(
                    producer = producer.name(),
                    target = target.name(),
                    previous_sequence,
                    sequence,
                    priority = priority.as_str(),
                    "converter replaced; resolution precedence for this pair changed",
                );
                self.record(RegistryEvent::Replaced {
                    producer: producer.name().to_owned(),
                    target: target.name().to_owned(),
                    previous_sequence,
                    sequence,
                    priority: priority.as_str().to_owned(),
                });
            }
            Registration::Inserted { sequence } => {
                tracing::debug!(
                    producer = producer.name(),
                    target = target.name(),
                    sequence,
                    "converter registered",
                );
                self.record(RegistryEvent::Registered {
                    producer: producer.name().to_owned(),
                    target: target.name().to_owned(),
                    sequence,
                    priority: priority.as_str().to_owned(),
                });
            }
        }
        registration
    }

    /// Exact match first, then `supertypes` from most to least specific.
    #[must_use]
    pub fn lookup_converter(
        &self,
        producer: ProducerType,
        supertypes: &[ProducerType],
        target: CanonicalTypeId,
    ) -> Option<Arc<ConverterEntry>> {
        self.lookup_with_generation(producer, supertypes, target).0
    }

    /// Same as [`Self::lookup_converter`], paired with the generation the
    /// answer was read under.
    #[must_use]
    pub fn lookup_with_generation(
        &self,
        producer: ProducerType,
        supertypes: &[ProducerType],
        target: CanonicalTypeId,
    ) -> (Option<Arc<ConverterEntry>>, u64) {
        let table = self.table.read();
        let generation = self.generation.load(Ordering::SeqCst);
        let entry = std::iter::once(producer)
            .chain(supertypes.iter().copied())
            .find_map(|candidate| table.entries.get(&(candidate, target)).cloned());
        (entry, generation)
    }

    /// Removes the entry for `(producer, target)`; returns whether one existed.
    pub fn deregister(&self, producer: ProducerType, target: CanonicalTypeId) -> bool {
        let removed = {
            let mut table = self.table.write();
            let removed = table.entries.remove(&(producer, target));
            if removed.is_some() {
                self.generation.fetch_add(1, Ordering::SeqCst);
            }
            removed
        };

        let Some(entry) = removed else {
            return false;
        };
        tracing::debug!(
            producer = producer.name(),
            target = entry.target_name(),
            sequence = entry.sequence,
            "converter deregistered",
        );
        self.record(RegistryEvent::Deregistered {
            producer: producer.name().to_owned(),
            target: entry.target_name.clone(),
            sequence: entry.sequence,
        });
        true
    }

    /// Mutation counter; strictly increases on every insert, replace or
    /// effective removal.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Snapshot of the active entries, highest priority first, then by
    /// registration order.
    #[must_use]
    pub fn entries(&self) -> Vec<Arc<ConverterEntry>> {
        let mut entries = self
            .table
            .read()
            .entries
            .values()
            .cloned()
            .collect::<Vec<_>>();
        entries.sort_by(|lhs, rhs| {
            rhs.priority
                .cmp(&lhs.priority)
                .then(lhs.sequence.cmp(&rhs.sequence))
        });
        entries
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.table.read().entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.table.read().entries.is_empty()
    }

    fn record(&self, event: RegistryEvent) {
        if let Some(ledger) = &self.ledger {
            ledger.record_registry(event);
        }
    }
}

impl std::fmt::Debug for ConverterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConverterRegistry")
            .field("len", &self.len())
            .field("generation", &self.generation())
            .finish()
    }
}
