#![forbid(unsafe_code)]

//! One entry point over the canonical type machinery.
//!
//! A [`TypeSystem`] owns its registries, ledger and engine. Instances are
//! isolated from each other; [`TypeSystem::global`] is the only shared one.

pub mod builtins;
pub mod errors;

pub use builtins::BuiltinIds;
pub use errors::ApiError;

use ct_convert::{ConverterPriority, ConverterRegistry, Registration};
use ct_core::{CanonicalTypeId, CanonicalValue, ConverterError, Payload, ProducerType, Value};
use ct_ledger::EventLedger;
use ct_registry::{CanonicalType, CanonicalTypeRegistry, CapabilityDescriptor};
use ct_resolve::{EngineConfig, ResolutionEngine, ResolutionFailure, ResolutionTrace};
use ct_signature::{AnnotationShape, Compatibility, TypeSignature};
use parking_lot::Mutex;
use std::sync::{Arc, OnceLock};

#[derive(Debug)]
pub struct TypeSystem {
    types: Arc<CanonicalTypeRegistry>,
    converters: Arc<ConverterRegistry>,
    engine: ResolutionEngine,
    ledger: Arc<EventLedger>,
    builtins: OnceLock<BuiltinIds>,
    install_lock: Mutex<()>,
}

impl TypeSystem {
    /// Empty instance: no canonical types, no converters.
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        let ledger = Arc::new(EventLedger::new(config.ledger_capacity));
        let types = Arc::new(CanonicalTypeRegistry::new());
        let converters = Arc::new(ConverterRegistry::with_ledger(Arc::clone(&ledger)));
        let engine = ResolutionEngine::new(Arc::clone(&types), Arc::clone(&converters))
            .with_config(config)
            .with_ledger(Arc::clone(&ledger));
        Self {
            types,
            converters,
            engine,
            ledger,
            builtins: OnceLock::new(),
            install_lock: Mutex::new(()),
        }
    }

    pub fn with_builtins(config: EngineConfig) -> Result<Self, ApiError> {
        let system = Self::new(config);
        system.install_builtins()?;
        Ok(system)
    }

    /// Registers the built-in types and scalar converters. After the first
    /// success, calls return the same ids. A failed install registers nothing
    /// and is not remembered, so a later call may retry.
    pub fn install_builtins(&self) -> Result<BuiltinIds, ApiError> {
        if let Some(ids) = self.builtins.get() {
            return Ok(*ids);
        }
        let _guard = self.install_lock.lock();
        if let Some(ids) = self.builtins.get() {
            return Ok(*ids);
        }
        let ids = builtins::install(&self.types, &self.converters)?;
        Ok(*self.builtins.get_or_init(|| ids))
    }

    /// Built-in ids, if installation has succeeded.
    #[must_use]
    pub fn builtins(&self) -> Option<BuiltinIds> {
        self.builtins.get().copied()
    }

    /// Process-wide instance with built-ins installed.
    pub fn global() -> Result<&'static TypeSystem, ApiError> {
        static GLOBAL: OnceLock<TypeSystem> = OnceLock::new();
        let system = GLOBAL.get_or_init(|| TypeSystem::new(EngineConfig::default()));
        system.install_builtins()?;
        Ok(system)
    }

    pub fn register_canonical_type(
        &self,
        name: &str,
        parent: Option<&str>,
        descriptor: CapabilityDescriptor,
    ) -> Result<CanonicalTypeId, ApiError> {
        Ok(self.types.register(name, parent, descriptor)?)
    }

    pub fn lookup(&self, name: &str) -> Result<Arc<CanonicalType>, ApiError> {
        Ok(self.types.lookup(name)?)
    }

    /// Proper-ancestor test by name.
    pub fn is_ancestor(&self, ancestor: &str, descendant: &str) -> Result<bool, ApiError> {
        let ancestor = self.types.lookup(ancestor)?;
        let descendant = self.types.lookup(descendant)?;
        Ok(self.types.is_ancestor(ancestor.id(), descendant.id()))
    }

    pub fn register_converter<F>(
        &self,
        producer: ProducerType,
        target: &str,
        func: F,
        priority: ConverterPriority,
    ) -> Result<Registration, ApiError>
    where
        F: Fn(&Value) -> Result<Payload, ConverterError> + Send + Sync + 'static,
    {
        let target = self.types.lookup(target)?;
        Ok(self
            .converters
            .register_converter(producer, &target, func, priority))
    }

    pub fn deregister_converter(
        &self,
        producer: ProducerType,
        target: &str,
    ) -> Result<bool, ApiError> {
        let target = self.types.lookup(target)?;
        Ok(self.converters.deregister(producer, target.id()))
    }

    /// Resolves `value` to the canonical type named `target`.
    pub fn resolve(&self, value: Value, target: &str) -> Result<CanonicalValue, ApiError> {
        let Ok(target) = self.types.lookup(target) else {
            return Err(ApiError::Resolution(ResolutionFailure::UnknownType {
                target: target.to_owned(),
                producer: value.producer_type(),
            }));
        };
        Ok(self.engine.resolve(value, target.id())?)
    }

    pub fn resolve_traced(
        &self,
        value: Value,
        target: CanonicalTypeId,
    ) -> (Result<CanonicalValue, ResolutionFailure>, ResolutionTrace) {
        self.engine.resolve_traced(value, target)
    }

    #[must_use]
    pub fn check(&self, annotation: &AnnotationShape, signature: &TypeSignature) -> Compatibility {
        ct_signature::check(annotation, signature)
    }

    #[must_use]
    pub fn type_name(&self, id: CanonicalTypeId) -> String {
        self.types.name_of(id)
    }

    #[must_use]
    pub fn engine(&self) -> &ResolutionEngine {
        &self.engine
    }

    #[must_use]
    pub fn types(&self) -> &Arc<CanonicalTypeRegistry> {
        &self.types
    }

    #[must_use]
    pub fn converters(&self) -> &Arc<ConverterRegistry> {
        &self.converters
    }

    #[must_use]
    pub fn ledger(&self) -> &Arc<EventLedger> {
        &self.ledger
    }
}

impl Default for TypeSystem {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}
