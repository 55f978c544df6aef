use ct_ledger::DEFAULT_LEDGER_CAPACITY;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const DEFAULT_MAX_SEQUENCE_DEPTH: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Memoize the winning strategy per `(producer, target)`.
    pub cache_enabled: bool,
    /// Append non-identity resolutions to the engine's ledger, if it has one.
    pub record_ledger: bool,
    pub ledger_capacity: usize,
    /// Nesting limit for sequence fallback; deeper sequences are not eligible.
    pub max_sequence_depth: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_enabled: true,
            record_ledger: true,
            ledger_capacity: DEFAULT_LEDGER_CAPACITY,
            max_sequence_depth: DEFAULT_MAX_SEQUENCE_DEPTH,
        }
    }
}

impl EngineConfig {
    /// Builds a config from string options, keeping the default for any key
    /// that is absent or malformed.
    ///
    /// Recognised keys: `cache`, `ledger`, `ledger_capacity`, `max_sequence_depth`.
    #[must_use]
    pub fn from_options(options: &BTreeMap<String, String>) -> Self {
        let mut config = Self::default();
        if let Some(enabled) = options.get("cache").and_then(|raw| parse_flag(raw)) {
            config.cache_enabled = enabled;
        }
        if let Some(enabled) = options.get("ledger").and_then(|raw| parse_flag(raw)) {
            config.record_ledger = enabled;
        }
        if let Some(capacity) = options
            .get("ledger_capacity")
            .and_then(|raw| raw.trim().parse::<usize>().ok())
            && capacity > 0
        {
            config.ledger_capacity = capacity;
        }
        if let Some(depth) = options
            .get("max_sequence_depth")
            .and_then(|raw| raw.trim().parse::<usize>().ok())
        {
            config.max_sequence_depth = depth;
        }
        config
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Some(true),
        "0" | "false" | "off" | "no" => Some(false),
        _ => None,
    }
}
