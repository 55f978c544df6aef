#![forbid(unsafe_code)]

use ct_core::Strategy;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

pub const DEFAULT_LEDGER_CAPACITY: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Outcome {
    Resolved,
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionRecord {
    pub producer: String,
    pub target: String,
    pub strategy: Option<Strategy>,
    pub cache_hit: bool,
    pub attempted: Vec<Strategy>,
    pub outcome: Outcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RegistryEvent {
    Registered {
        producer: String,
        target: String,
        sequence: u64,
        priority: String,
    },
    Replaced {
        producer: String,
        target: String,
        previous_sequence: u64,
        sequence: u64,
        priority: String,
    },
    Deregistered {
        producer: String,
        target: String,
        sequence: u64,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerRecord {
    Resolution(ResolutionRecord),
    Registry(RegistryEvent),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub timestamp_unix_ms: u128,
    pub record: LedgerRecord,
}

/// Bounded, append-only event log shared by the registries and the engine.
///
/// When full, the oldest entry is dropped and counted in [`Self::dropped`].
#[derive(Debug)]
pub struct EventLedger {
    capacity: usize,
    entries: Mutex<VecDeque<LedgerEntry>>,
    dropped: AtomicU64,
}

impl EventLedger {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: Mutex::new(VecDeque::new()),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn append(&self, record: LedgerRecord) {
        let entry = LedgerEntry {
            timestamp_unix_ms: now_unix_ms(),
            record,
        };
        let mut entries = self.entries.lock();
        if entries.len() == self.capacity {
            entries.pop_front();
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        entries.push_back(entry);
    }

    pub fn record_resolution(&self, record: ResolutionRecord) {
        self.append(LedgerRecord::Resolution(record));
    }

    pub fn record_registry(&self, event: RegistryEvent) {
        self.append(LedgerRecord::Registry(event));
    }

    #[must_use]
    pub fn snapshot(&self) -> Vec<LedgerEntry> {
        self.entries.lock().iter().cloned().collect()
    }

    /// Removes and returns every entry, oldest first.
    pub fn drain(&self) -> Vec<LedgerEntry> {
        self.entries.lock().drain(..).collect()
    }

    #[must_use]
    pub fn registry_events(&self) -> Vec<RegistryEvent> {
        self.entries
            .lock()
            .iter()
            .filter_map(|entry| match &entry.record {
                LedgerRecord::Registry(event) => Some(event.clone()),
                LedgerRecord::Resolution(_) => None,
            })
            .collect()
    }

    #[must_use]
    pub fn resolutions(&self) -> Vec<ResolutionRecord> {
        self.entries
            .lock()
            .iter()
            .filter_map(|entry| match &entry.record {
                LedgerRecord::Resolution(record) => Some(record.clone()),
                LedgerRecord::Registry(_) => None,
            })
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.snapshot())
    }
}

impl Default for EventLedger {
    fn default() -> Self {
        Self::new(DEFAULT_LEDGER_CAPACITY)
    }
}

fn now_unix_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_millis())
}
