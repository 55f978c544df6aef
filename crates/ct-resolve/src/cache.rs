//! Memo of the winning strategy per `(producer, target)` pair.
//!
//! Entries are tagged with the converter-registry generation they were
//! computed under. Observing a newer generation clears the whole table, so a
//! lookup can never combine a pre-mutation answer with post-mutation state.

use ct_convert::ConverterEntry;
use ct_core::{CanonicalTypeId, ProducerType, Strategy};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::cmp::Ordering;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub enum CachedStrategy {
    Registry(Arc<ConverterEntry>),
    Protocol,
}

impl CachedStrategy {
    #[must_use]
    pub fn strategy(&self) -> Strategy {
        match self {
            Self::Registry(_) => Strategy::Registry,
            Self::Protocol => Strategy::Protocol,
        }
    }
}

#[derive(Debug, Default)]
struct CacheTable {
    generation: u64,
    entries: FxHashMap<(ProducerType, CanonicalTypeId), CachedStrategy>,
}

#[derive(Debug, Default)]
pub struct ResolutionCache {
    table: RwLock<CacheTable>,
}

impl ResolutionCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached strategy for the pair, valid only at `generation`.
    #[must_use]
    pub fn get(
        &self,
        producer: ProducerType,
        target: CanonicalTypeId,
        generation: u64,
    ) -> Option<CachedStrategy> {
        {
            let table = self.table.read();
            match table.generation.cmp(&generation) {
                Ordering::Equal => return table.entries.get(&(producer, target)).cloned(),
                Ordering::Greater => return None,
                Ordering::Less => {}
            }
        }
        self.advance(generation);
        None
    }

    /// Stores `strategy` as computed under `generation`. Inserts computed
    /// against an older generation than the cache has seen are dropped.
    pub fn insert(
        &self,
        producer: ProducerType,
        target: CanonicalTypeId,
        strategy: CachedStrategy,
        generation: u64,
    ) {
        let mut table = self.table.write();
        match generation.cmp(&table.generation) {
            Ordering::Less => return,
            Ordering::Greater => {
                table.entries.clear();
                table.generation = generation;
            }
            Ordering::Equal => {}
        }
        table.entries.insert((producer, target), strategy);
    }

    pub fn invalidate(&self) {
        self.table.write().entries.clear();
    }

    /// Number of entries valid at `generation`.
    #[must_use]
    pub fn len(&self, generation: u64) -> usize {
        let table = self.table.read();
        if table.generation == generation {
            table.entries.len()
        } else {
            0
        }
    }

    fn advance(&self, generation: u64) {
        let mut table = self.table.write();
        if generation > table.generation {
            table.entries.clear();
            table.generation = generation;
        }
    }
}
