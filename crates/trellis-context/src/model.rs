//! The context model: overload sets of every member, plus the class table.

use std::collections::BTreeMap;

use trellis_core::{Dependency, Signature};

use crate::classes::ClassTable;

/// One entry of an overload set.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Member {
    pub signature: Signature,
    /// Name of the contributor whose declaration is dispatched to.
    pub origin: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContextModel {
    pub(crate) contributors: Vec<String>,
    pub(crate) members: BTreeMap<String, Vec<Member>>,
    /// Every contributor's own declarations, before deduplication.
    pub(crate) declared: BTreeMap<String, BTreeMap<String, Vec<Signature>>>,
    pub(crate) classes: ClassTable,
}

impl ContextModel {
    /// The full overload set of `name`, in contribution order.
    pub fn overloads(&self, name: &str) -> &[Member] {
        self.members.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Overloads of `name` declared by one contributor (for qualified calls).
    pub fn contributor_overloads(&self, contributor: &str, name: &str) -> &[Signature] {
        self.declared
            .get(contributor)
            .and_then(|members| members.get(name))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn has_member(&self, name: &str) -> bool {
        self.members.contains_key(name)
    }

    pub fn member_names(&self) -> impl Iterator<Item = &str> {
        self.members.keys().map(String::as_str)
    }

    /// Contributor names in priority order; `base` is always first.
    pub fn contributors(&self) -> &[String] {
        &self.contributors
    }

    pub fn is_contributor(&self, name: &str) -> bool {
        self.contributors.iter().any(|c| c == name)
    }

    pub fn classes(&self) -> &ClassTable {
        &self.classes
    }

    /// Which contributor a resolved signature dispatches to.
    pub fn origin_of(&self, signature: &Signature) -> Option<&str> {
        self.overloads(&signature.name)
            .iter()
            .find(|member| &member.signature == signature)
            .map(|member| member.origin.as_str())
    }

    /// Stable textual rendering of whatever a member dependency can resolve
    /// against. A change to an overload set changes this text, which is what
    /// recompilation decisions are keyed on.
    pub fn render_dependency(&self, dependency: &Dependency) -> Option<String> {
        let Dependency::Member { contributor, name } = dependency else {
            return None;
        };
        let mut lines: Vec<String> = match contributor {
            Some(contributor) => self
                .contributor_overloads(contributor, name)
                .iter()
                .map(|sig| format!("{contributor}: {sig}"))
                .collect(),
            None => self
                .overloads(name)
                .iter()
                .map(|member| format!("{}: {}", member.origin, member.signature))
                .collect(),
        };
        lines.sort();
        Some(lines.join("\n"))
    }
}
