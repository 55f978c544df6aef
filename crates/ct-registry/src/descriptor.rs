//! Capability descriptors: the minimal member surface a canonical type
//! requires of anything that wants to stand in for it.
//!
//! Arity hints are carried for documentation and static-check generation
//! only. At runtime a descriptor is checked for member presence, nothing more.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberKind {
    Attribute,
    Method { arity: Option<u8> },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequiredMember {
    pub name: String,
    pub kind: MemberKind,
}

/// Marks a canonical type as accepting finite, non-ragged sequences whose
/// elements each resolve to `element`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SequenceFallback {
    pub element: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityDescriptor {
    members: Vec<RequiredMember>,
    entry_point: Option<String>,
    sequence_fallback: Option<SequenceFallback>,
}

impl CapabilityDescriptor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn attribute(self, name: impl Into<String>) -> Self {
        self.member(name, MemberKind::Attribute)
    }

    #[must_use]
    pub fn method(self, name: impl Into<String>, arity: u8) -> Self {
        self.member(name, MemberKind::Method { arity: Some(arity) })
    }

    /// Adds a required member; a name already present keeps its first kind.
    #[must_use]
    pub fn member(mut self, name: impl Into<String>, kind: MemberKind) -> Self {
        let name = name.into();
        if !self.requires(&name) {
            self.members.push(RequiredMember { name, kind });
        }
        self
    }

    /// Names the member the protocol path invokes to canonicalize a value.
    /// The entry point is itself a required member.
    #[must_use]
    pub fn entry_point(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self = self.member(name.clone(), MemberKind::Method { arity: Some(0) });
        self.entry_point = Some(name);
        self
    }

    #[must_use]
    pub fn with_sequence_fallback(mut self, element: impl Into<String>) -> Self {
        self.sequence_fallback = Some(SequenceFallback {
            element: element.into(),
        });
        self
    }

    #[must_use]
    pub fn members(&self) -> &[RequiredMember] {
        &self.members
    }

    pub fn member_names(&self) -> impl Iterator<Item = &str> {
        self.members.iter().map(|member| member.name.as_str())
    }

    #[must_use]
    pub fn requires(&self, name: &str) -> bool {
        self.members.iter().any(|member| member.name == name)
    }

    #[must_use]
    pub fn entry_point_name(&self) -> Option<&str> {
        self.entry_point.as_deref()
    }

    #[must_use]
    pub fn sequence_fallback(&self) -> Option<&SequenceFallback> {
        self.sequence_fallback.as_ref()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub(crate) fn canonical_payload(&self) -> String {
        let members = self
            .members
            .iter()
            .map(|member| match member.kind {
                MemberKind::Attribute => format!("attr:{}", member.name),
                MemberKind::Method { arity: Some(arity) } => {
                    format!("method:{}/{arity}", member.name)
                }
                MemberKind::Method { arity: None } => format!("method:{}/*", member.name),
            })
            .collect::<Vec<_>>()
            .join(",");
        format!(
            "members=[{}]|entry={}|sequence={}",
            members,
            self.entry_point.as_deref().unwrap_or("none"),
            self.sequence_fallback
                .as_ref()
                .map_or("none", |fallback| fallback.element.as_str()),
        )
    }
}
