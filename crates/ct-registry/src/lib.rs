#![forbid(unsafe_code)]

//! Canonical type registry.
//!
//! Holds the declared canonical types, their capability descriptors and the
//! single-parent lattice used for subtype matching. Registration is
//! append-only: there is no removal, and a registered type never changes.

pub mod descriptor;

pub use descriptor::{CapabilityDescriptor, MemberKind, RequiredMember, SequenceFallback};

use ct_core::CanonicalTypeId;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use sha2::{Digest, Sha256};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalType {
    id: CanonicalTypeId,
    name: String,
    parent: Option<CanonicalTypeId>,
    descriptor: CapabilityDescriptor,
    sequence_element: Option<CanonicalTypeId>,
}

impl CanonicalType {
    #[must_use]
    pub fn id(&self) -> CanonicalTypeId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn parent(&self) -> Option<CanonicalTypeId> {
        self.parent
    }

    #[must_use]
    pub fn descriptor(&self) -> &CapabilityDescriptor {
        &self.descriptor
    }

    /// Element type for sequence fallback, when this type permits it.
    #[must_use]
    pub fn sequence_element(&self) -> Option<CanonicalTypeId> {
        self.sequence_element
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    DuplicateType { name: String },
    UnknownType { name: String },
    UnknownParent { name: String, parent: String },
    BreakingDescriptorChange { removed: Vec<String> },
    CapacityExceeded { name: String },
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateType { name } => {
                write!(f, "canonical type `{name}` is already registered")
            }
            Self::UnknownType { name } => write!(f, "unknown canonical type `{name}`"),
            Self::UnknownParent { name, parent } => write!(
                f,
                "canonical type `{name}` names unregistered parent `{parent}`"
            ),
            Self::BreakingDescriptorChange { removed } => write!(
                f,
                "descriptor change removes required members: {}",
                removed.join(",")
            ),
            Self::CapacityExceeded { name } => write!(
                f,
                "canonical type `{name}` does not fit in the id space"
            ),
        }
    }
}

impl std::error::Error for RegistryError {}

#[derive(Debug, Default)]
struct TypeTable {
    types: Vec<Arc<CanonicalType>>,
    by_name: FxHashMap<String, CanonicalTypeId>,
}

impl TypeTable {
    fn get(&self, id: CanonicalTypeId) -> Option<&Arc<CanonicalType>> {
        self.types.get(id.0 as usize)
    }

    fn insert(
        &mut self,
        name: &str,
        parent: Option<&str>,
        descriptor: CapabilityDescriptor,
    ) -> Result<CanonicalTypeId, RegistryError> {
        if self.by_name.contains_key(name) {
            return Err(RegistryError::DuplicateType {
                name: name.to_owned(),
            });
        }

        let parent = parent
            .map(|parent| {
                self.by_name
                    .get(parent)
                    .copied()
                    .ok_or_else(|| RegistryError::UnknownParent {
                        name: name.to_owned(),
                        parent: parent.to_owned(),
                    })
            })
            .transpose()?;

        let id = u32::try_from(self.types.len())
            .map(CanonicalTypeId)
            .map_err(|_| RegistryError::CapacityExceeded {
                name: name.to_owned(),
            })?;

        let sequence_element = match descriptor.sequence_fallback() {
            None => None,
            Some(fallback) if fallback.element == name => Some(id),
            Some(fallback) => Some(self.by_name.get(&fallback.element).copied().ok_or_else(
                || RegistryError::UnknownType {
                    name: fallback.element.clone(),
                },
            )?),
        };

        self.types.push(Arc::new(CanonicalType {
            id,
            name: name.to_owned(),
            parent,
            descriptor,
            sequence_element,
        }));
        self.by_name.insert(name.to_owned(), id);
        Ok(id)
    }

    /// Drops every type from index `len` on.
    fn truncate(&mut self, len: usize) {
        for ty in self.types.drain(len..) {
            self.by_name.remove(&ty.name);
        }
    }
}

/// One entry of a [`CanonicalTypeRegistry::register_all`] batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDeclaration {
    pub name: String,
    pub parent: Option<String>,
    pub descriptor: CapabilityDescriptor,
}

impl TypeDeclaration {
    #[must_use]
    pub fn new(name: impl Into<String>, descriptor: CapabilityDescriptor) -> Self {
        Self {
            name: name.into(),
            parent: None,
            descriptor,
        }
    }

    #[must_use]
    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }
}

/// Process-wide (or per-instance) set of canonical types.
///
/// Reads take a shared lock; registration takes the exclusive lock for the
/// duration of the insert only.
#[derive(Debug, Default)]
pub struct CanonicalTypeRegistry {
    table: RwLock<TypeTable>,
}

impl CanonicalTypeRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `name` under an optional, already registered `parent`.
    ///
    /// A sequence-fallback element may name the type being registered.
    pub fn register(
        &self,
        name: &str,
        parent: Option<&str>,
        descriptor: CapabilityDescriptor,
    ) -> Result<CanonicalTypeId, RegistryError> {
        self.table.write().insert(name, parent, descriptor)
    }

    /// Registers every declaration under one write lock, in order. Later
    /// declarations may name earlier ones as parent or sequence element.
    ///
    /// On the first failure every type inserted by this call is removed again,
    /// so readers never observe a partial batch.
    pub fn register_all(
        &self,
        declarations: Vec<TypeDeclaration>,
    ) -> Result<Vec<CanonicalTypeId>, RegistryError> {
        let mut table = self.table.write();
        let start = table.types.len();
        let mut ids = Vec::with_capacity(declarations.len());
        for declaration in declarations {
            match table.insert(
                &declaration.name,
                declaration.parent.as_deref(),
                declaration.descriptor,
            ) {
                Ok(id) => ids.push(id),
                Err(err) => {
                    table.truncate(start);
                    return Err(err);
                }
            }
        }
        Ok(ids)
    }

    pub fn lookup(&self, name: &str) -> Result<Arc<CanonicalType>, RegistryError> {
        let table = self.table.read();
        table
            .by_name
            .get(name)
            .and_then(|id| table.get(*id))
            .cloned()
            .ok_or_else(|| RegistryError::UnknownType {
                name: name.to_owned(),
            })
    }

    pub fn get(&self, id: CanonicalTypeId) -> Result<Arc<CanonicalType>, RegistryError> {
        self.table
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownType {
                name: id.to_string(),
            })
    }

    /// Name of `id`, or its numeric rendering when it is not registered here.
    #[must_use]
    pub fn name_of(&self, id: CanonicalTypeId) -> String {
        self.table
            .read()
            .get(id)
            .map_or_else(|| id.to_string(), |ty| ty.name.clone())
    }

    /// True iff `ancestor` is a proper ancestor of `descendant`.
    #[must_use]
    pub fn is_ancestor(&self, ancestor: CanonicalTypeId, descendant: CanonicalTypeId) -> bool {
        let table = self.table.read();
        let mut cursor = table.get(descendant).and_then(|ty| ty.parent);
        // Parents always precede children, so the walk is bounded by the table size.
        for _ in 0..table.types.len() {
            match cursor {
                Some(id) if id == ancestor => return true,
                Some(id) => cursor = table.get(id).and_then(|ty| ty.parent),
                None => return false,
            }
        }
        false
    }

    #[must_use]
    pub fn is_same_or_ancestor(
        &self,
        ancestor: CanonicalTypeId,
        descendant: CanonicalTypeId,
    ) -> bool {
        ancestor == descendant || self.is_ancestor(ancestor, descendant)
    }

    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.table
            .read()
            .types
            .iter()
            .map(|ty| ty.name.clone())
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.table.read().types.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.table.read().types.is_empty()
    }

    /// Digest of every published type and descriptor, in registration order.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let table = self.table.read();
        let mut hasher = Sha256::new();
        for ty in &table.types {
            let parent = ty
                .parent
                .and_then(|id| table.get(id))
                .map_or("none", |parent| parent.name.as_str());
            hasher.update(
                format!(
                    "type={}|parent={}|{};",
                    ty.name,
                    parent,
                    ty.descriptor.canonical_payload()
                )
                .as_bytes(),
            );
        }
        let digest = hasher.finalize();
        let hex = digest
            .iter()
            .map(|byte| format!("{byte:02x}"))
            .collect::<String>();
        format!("ctr-{hex}")
    }
}

/// Checks that `proposed` only grows `published`: every required member of
/// the published descriptor must still be required.
pub fn check_descriptor_evolution(
    published: &CapabilityDescriptor,
    proposed: &CapabilityDescriptor,
) -> Result<(), RegistryError> {
    let removed = published
        .member_names()
        .filter(|name| !proposed.requires(name))
        .map(str::to_owned)
        .collect::<Vec<_>>();
    if removed.is_empty() {
        Ok(())
    } else {
        Err(RegistryError::BreakingDescriptorChange { removed })
    }
}

#[cfg(test)]
mod tests {
    use super::{
        CanonicalTypeRegistry, CapabilityDescriptor, RegistryError, TypeDeclaration,
        check_descriptor_evolution,
    };

    fn tensor_descriptor() -> CapabilityDescriptor {
        CapabilityDescriptor::new()
            .attribute("shape")
            .attribute("dtype")
            .entry_point("__tensor__")
            .with_sequence_fallback("Tensor")
    }

    fn lattice() -> CanonicalTypeRegistry {
        let registry = CanonicalTypeRegistry::new();
        registry
            .register("Tensor", None, tensor_descriptor())
            .expect("Tensor");
        registry
            .register("Symbol", Some("Tensor"), CapabilityDescriptor::new())
            .expect("Symbol");
        registry
            .register("GraphSymbol", Some("Symbol"), CapabilityDescriptor::new())
            .expect("GraphSymbol");
        registry
            .register("Variable", None, CapabilityDescriptor::new())
            .expect("Variable");
        registry
    }

    #[test]
    fn duplicate_names_are_rejected_and_registry_is_unchanged() {
        let registry = lattice();
        let before = registry.fingerprint();
        let err = registry
            .register("Tensor", None, CapabilityDescriptor::new())
            .expect_err("duplicate should fail");
        assert_eq!(
            err,
            RegistryError::DuplicateType {
                name: "Tensor".to_owned()
            }
        );
        assert_eq!(registry.len(), 4);
        assert_eq!(registry.fingerprint(), before);
    }

    #[test]
    fn lookup_unknown_type_fails() {
        let registry = lattice();
        let err = registry.lookup("Sparse").expect_err("unknown type");
        assert_eq!(err.to_string(), "unknown canonical type `Sparse`");
        assert_eq!(registry.lookup("Symbol").expect("Symbol").name(), "Symbol");
    }

    #[test]
    fn unknown_parent_is_rejected() {
        let registry = lattice();
        let err = registry
            .register("Ragged", Some("Array"), CapabilityDescriptor::new())
            .expect_err("unknown parent");
        assert!(matches!(err, RegistryError::UnknownParent { .. }));
        assert!(registry.lookup("Ragged").is_err());
    }

    #[test]
    fn sequence_fallback_element_resolves_to_ids() {
        let registry = lattice();
        let tensor = registry.lookup("Tensor").expect("Tensor");
        assert_eq!(tensor.sequence_element(), Some(tensor.id()));

        let err = registry
            .register(
                "Batch",
                None,
                CapabilityDescriptor::new().with_sequence_fallback("Missing"),
            )
            .expect_err("unknown element type");
        assert!(matches!(err, RegistryError::UnknownType { name } if name == "Missing"));
    }

    #[test]
    fn ancestor_walk_follows_parent_chain() {
        let registry = lattice();
        let tensor = registry.lookup("Tensor").expect("Tensor").id();
        let symbol = registry.lookup("Symbol").expect("Symbol").id();
        let graph = registry.lookup("GraphSymbol").expect("GraphSymbol").id();
        let variable = registry.lookup("Variable").expect("Variable").id();

        assert!(registry.is_ancestor(tensor, symbol));
        assert!(registry.is_ancestor(tensor, graph));
        assert!(registry.is_ancestor(symbol, graph));
        assert!(!registry.is_ancestor(graph, tensor));
        assert!(!registry.is_ancestor(tensor, tensor));
        assert!(!registry.is_ancestor(tensor, variable));
        assert!(registry.is_same_or_ancestor(tensor, tensor));
    }

    #[test]
    fn fingerprint_is_stable_and_sensitive() {
        let lhs = lattice();
        let rhs = lattice();
        assert_eq!(lhs.fingerprint(), rhs.fingerprint());
        assert!(lhs.fingerprint().starts_with("ctr-"));

        rhs.register("Module", None, CapabilityDescriptor::new())
            .expect("Module");
        assert_ne!(lhs.fingerprint(), rhs.fingerprint());
    }

    #[test]
    fn descriptor_evolution_only_grows() {
        let published = tensor_descriptor();
        let grown = published.clone().attribute("device");
        assert!(check_descriptor_evolution(&published, &grown).is_ok());

        let shrunk = CapabilityDescriptor::new()
            .attribute("shape")
            .entry_point("__tensor__");
        let err = check_descriptor_evolution(&published, &shrunk).expect_err("breaking");
        assert_eq!(
            err,
            RegistryError::BreakingDescriptorChange {
                removed: vec!["dtype".to_owned()]
            }
        );
    }

    #[test]
    fn names_preserve_registration_order() {
        let registry = lattice();
        assert_eq!(
            registry.names(),
            vec!["Tensor", "Symbol", "GraphSymbol", "Variable"]
        );
        assert!(!registry.is_empty());
    }

    #[test]
    fn batch_registration_links_earlier_entries() {
        let registry = CanonicalTypeRegistry::new();
        let ids = registry
            .register_all(vec![
                TypeDeclaration::new("Tensor", tensor_descriptor()),
                TypeDeclaration::new("Symbol", CapabilityDescriptor::new()).with_parent("Tensor"),
            ])
            .expect("batch");
        assert_eq!(ids.len(), 2);
        assert!(registry.is_ancestor(ids[0], ids[1]));
    }

    #[test]
    fn failed_batch_leaves_registry_unchanged() {
        let registry = CanonicalTypeRegistry::new();
        registry
            .register("Variable", None, CapabilityDescriptor::new())
            .expect("Variable");
        let before = registry.fingerprint();

        let err = registry
            .register_all(vec![
                TypeDeclaration::new("Tensor", tensor_descriptor()),
                TypeDeclaration::new("Symbol", CapabilityDescriptor::new()).with_parent("Tensor"),
                TypeDeclaration::new("Variable", CapabilityDescriptor::new()),
            ])
            .expect_err("Variable collides");
        assert_eq!(
            err,
            RegistryError::DuplicateType {
                name: "Variable".to_owned()
            }
        );
        assert_eq!(registry.names(), vec!["Variable"]);
        assert_eq!(registry.fingerprint(), before);
        assert!(registry.lookup("Tensor").is_err());

        // The rolled-back names are free again and ids continue densely.
        let tensor = registry
            .register("Tensor", None, tensor_descriptor())
            .expect("Tensor after rollback");
        assert_eq!(tensor.0, 1);
    }
}
