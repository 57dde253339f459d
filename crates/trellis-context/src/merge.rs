//! Merging independently authored contributors into one context.
//!
//! Contributors are visited in priority order, the fixed `base` contributor
//! first. A member whose signature is identical to an existing entry is
//! dropped, the same name with a different parameter list becomes another
//! overload, and the same name and parameters with a different return type
//! is a [`MergeCollisionError`]. Classes merge the same way.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use derive_more::{Display, Error};
use tracing::debug;
use trellis_core::unit::MemberRef;
use trellis_core::{HostError, Signature, TypeRef, Value};

use crate::base::{BASE, base_contributor};
use crate::classes::ClassTable;
use crate::contributor::Contributor;
use crate::model::{ContextModel, Member};

#[derive(Clone, Debug, Display, Error, PartialEq, Eq)]
pub enum MergeCollisionError {
    #[display(
        "`{member}` from contributor `{second}` collides with `{existing}` from contributor `{first}`"
    )]
    Member {
        member: String,
        existing: String,
        first: String,
        second: String,
    },
    #[display("class `{class}` from contributor `{second}` differs from the one declared by `{first}`")]
    Class {
        class: String,
        first: String,
        second: String,
    },
    #[display("contributor name `{name}` is used more than once")]
    DuplicateContributor { name: String },
    #[display("contributor name `{name}` is reserved")]
    ReservedName { name: String },
    #[display("`{member}` from contributor `{contributor}`: {reason}")]
    InvalidType {
        contributor: String,
        member: String,
        reason: String,
    },
}

/// The single capability surface built from all contributors.
///
/// Read-only once built. At execution time it acts as the dispatcher that
/// routes each call to the contributor that declared the winning overload.
#[derive(Clone)]
pub struct MergedContext {
    model: ContextModel,
    contributors: BTreeMap<String, Arc<dyn Contributor>>,
}

impl MergedContext {
    /// A context with only the base contributor.
    pub fn base_only() -> Self {
        let base: Arc<dyn Contributor> = Arc::new(base_contributor());
        let mut members: BTreeMap<String, Vec<Member>> = BTreeMap::new();
        let mut declared: BTreeMap<String, Vec<Signature>> = BTreeMap::new();
        for signature in base.members() {
            declared
                .entry(signature.name.clone())
                .or_default()
                .push(signature.clone());
            members.entry(signature.name.clone()).or_default().push(Member {
                signature,
                origin: BASE.to_string(),
            });
        }
        Self {
            model: ContextModel {
                contributors: vec![BASE.to_string()],
                members,
                declared: BTreeMap::from([(BASE.to_string(), declared)]),
                classes: ClassTable::builtin(),
            },
            contributors: BTreeMap::from([(BASE.to_string(), base)]),
        }
    }

    pub fn model(&self) -> &ContextModel {
        &self.model
    }

    pub fn classes(&self) -> &ClassTable {
        self.model.classes()
    }

    /// Route a resolved member call to its contributor.
    pub fn dispatch(&self, member: &MemberRef, args: Vec<Value>) -> Result<Value, HostError> {
        let origin = match &member.contributor {
            Some(name) => name.as_str(),
            None => self.model.origin_of(&member.signature).ok_or_else(|| {
                HostError::new(format!("member `{}` is not in the context", member.signature))
            })?,
        };
        let contributor = self
            .contributors
            .get(origin)
            .ok_or_else(|| HostError::new(format!("unknown contributor `{origin}`")))?;
        contributor.invoke(&member.signature, args)
    }
}

impl fmt::Debug for MergedContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MergedContext")
            .field("contributors", &self.model.contributors)
            .field("members", &self.model.members.len())
            .finish()
    }
}

/// Collects contributors in priority order and merges them.
pub struct MergedContextBuilder {
    contributors: Vec<(String, Arc<dyn Contributor>)>,
}

impl Default for MergedContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MergedContextBuilder {
    pub fn new() -> Self {
        let base: Arc<dyn Contributor> = Arc::new(base_contributor());
        Self {
            contributors: vec![(BASE.to_string(), base)],
        }
    }

    pub fn contributor(self, name: impl Into<String>, contributor: impl Contributor + 'static) -> Self {
        self.shared(name, Arc::new(contributor))
    }

    pub fn shared(mut self, name: impl Into<String>, contributor: Arc<dyn Contributor>) -> Self {
        self.contributors.push((name.into(), contributor));
        self
    }

    pub fn build(self) -> Result<MergedContext, MergeCollisionError> {
        let mut names: Vec<String> = Vec::with_capacity(self.contributors.len());
        for (i, (name, _)) in self.contributors.iter().enumerate() {
            if i > 0 && name == BASE {
                return Err(MergeCollisionError::ReservedName { name: name.clone() });
            }
            if names.contains(name) {
                return Err(MergeCollisionError::DuplicateContributor { name: name.clone() });
            }
            names.push(name.clone());
        }

        let classes = self.merge_classes()?;

        let mut members: BTreeMap<String, Vec<Member>> = BTreeMap::new();
        let mut declared: BTreeMap<String, BTreeMap<String, Vec<Signature>>> = BTreeMap::new();
        for (origin, contributor) in &self.contributors {
            for signature in contributor.members() {
                validate_signature(&classes, origin, &signature)?;
                let own = declared
                    .entry(origin.clone())
                    .or_default()
                    .entry(signature.name.clone())
                    .or_default();
                if !own.contains(&signature) {
                    own.push(signature.clone());
                }

                let overloads = members.entry(signature.name.clone()).or_default();
                let existing = overloads
                    .iter()
                    .find(|m| m.signature.same_parameters(&signature))
                    .cloned();
                match existing {
                    Some(existing) if existing.signature.returns == signature.returns => {
                        debug!(
                            "merge: `{}` from `{}` duplicates the entry from `{}`",
                            signature, origin, existing.origin
                        );
                    }
                    Some(existing) => {
                        return Err(MergeCollisionError::Member {
                            member: signature.to_string(),
                            existing: existing.signature.to_string(),
                            first: existing.origin.clone(),
                            second: origin.clone(),
                        });
                    }
                    None => overloads.push(Member {
                        signature,
                        origin: origin.clone(),
                    }),
                }
            }
        }

        debug!(
            "merge: {} contributor(s), {} member name(s)",
            names.len(),
            members.len()
        );
        Ok(MergedContext {
            model: ContextModel {
                contributors: names,
                members,
                declared,
                classes,
            },
            contributors: self.contributors.into_iter().collect(),
        })
    }

    fn merge_classes(&self) -> Result<ClassTable, MergeCollisionError> {
        let mut table = ClassTable::builtin();
        let mut origins: BTreeMap<String, String> = table
            .iter()
            .map(|def| (def.name.clone(), BASE.to_string()))
            .collect();
        for (origin, contributor) in &self.contributors {
            for def in contributor.classes() {
                match table.get(&def.name) {
                    Some(existing) if *existing == def => {
                        debug!("merge: class `{}` from `{}` is a duplicate", def.name, origin);
                    }
                    Some(_) => {
                        return Err(MergeCollisionError::Class {
                            class: def.name.clone(),
                            first: origins.get(&def.name).cloned().unwrap_or_default(),
                            second: origin.clone(),
                        });
                    }
                    None => {
                        origins.insert(def.name.clone(), origin.clone());
                        table.insert(def);
                    }
                }
            }
        }
        for def in table.iter() {
            let origin = origins.get(&def.name).map_or(BASE, String::as_str);
            for ty in def.supertypes.iter().chain(def.methods.iter().flat_map(signature_types)) {
                table
                    .validate(ty)
                    .map_err(|reason| MergeCollisionError::InvalidType {
                        contributor: origin.to_string(),
                        member: def.name.clone(),
                        reason,
                    })?;
            }
        }
        Ok(table)
    }
}

fn signature_types(signature: &Signature) -> impl Iterator<Item = &TypeRef> {
    signature.params.iter().chain(std::iter::once(&signature.returns))
}

fn validate_signature(
    classes: &ClassTable,
    origin: &str,
    signature: &Signature,
) -> Result<(), MergeCollisionError> {
    let invalid = |reason: String| MergeCollisionError::InvalidType {
        contributor: origin.to_string(),
        member: signature.to_string(),
        reason,
    };
    if signature.variadic && signature.variadic_element().is_none() {
        return Err(invalid("variadic member without a trailing array parameter".into()));
    }
    if signature.params.iter().any(TypeRef::is_void) {
        return Err(invalid("void parameter".into()));
    }
    for ty in signature_types(signature) {
        classes.validate(ty).map_err(invalid)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classes::ClassDef;
    use crate::contributor::FnContributor;

    fn greeting(params: Vec<TypeRef>, returns: TypeRef) -> Signature {
        Signature::new("greeting", params, returns)
    }

    fn declaring(signatures: Vec<Signature>) -> FnContributor {
        signatures.into_iter().fold(FnContributor::new(), |c, sig| {
            c.function(sig, |_| Ok(Value::from("hello")))
        })
    }

    #[test]
    fn test_identical_members_merge_into_one_entry() {
        let sig = greeting(vec![TypeRef::string()], TypeRef::string());
        let context = MergedContextBuilder::new()
            .contributor("site", declaring(vec![sig.clone()]))
            .contributor("blog", declaring(vec![sig.clone()]))
            .build()
            .unwrap();
        let overloads = context.model().overloads("greeting");
        assert_eq!(overloads.len(), 1);
        assert_eq!(overloads[0].origin, "site");
        assert_eq!(context.model().contributor_overloads("blog", "greeting"), [sig]);
    }

    #[test]
    fn test_different_parameters_coexist() {
        let context = MergedContextBuilder::new()
            .contributor(
                "site",
                declaring(vec![greeting(vec![TypeRef::string()], TypeRef::string())]),
            )
            .contributor(
                "blog",
                declaring(vec![greeting(vec![TypeRef::int()], TypeRef::string())]),
            )
            .build()
            .unwrap();
        let origins: Vec<&str> = context
            .model()
            .overloads("greeting")
            .iter()
            .map(|m| m.origin.as_str())
            .collect();
        assert_eq!(origins, ["site", "blog"]);
    }

    #[test]
    fn test_return_type_conflict_is_a_collision() {
        let err = MergedContextBuilder::new()
            .contributor(
                "site",
                declaring(vec![greeting(vec![TypeRef::string()], TypeRef::string())]),
            )
            .contributor(
                "blog",
                declaring(vec![greeting(vec![TypeRef::string()], TypeRef::int())]),
            )
            .build()
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "`greeting(String): int` from contributor `blog` collides with \
             `greeting(String): String` from contributor `site`"
        );
    }

    #[test]
    fn test_base_members_dedup_and_collide_too() {
        let same = Signature::new("trim", vec![TypeRef::string()], TypeRef::string());
        let context = MergedContextBuilder::new()
            .contributor("site", declaring(vec![same]))
            .build()
            .unwrap();
        assert_eq!(context.model().overloads("trim")[0].origin, BASE);

        let clash = Signature::new("trim", vec![TypeRef::string()], TypeRef::int());
        let err = MergedContextBuilder::new()
            .contributor("site", declaring(vec![clash]))
            .build()
            .unwrap_err();
        assert!(matches!(err, MergeCollisionError::Member { ref first, .. } if first == BASE));
    }

    #[test]
    fn test_contributor_names_are_checked() {
        let err = MergedContextBuilder::new()
            .contributor("base", FnContributor::new())
            .build()
            .unwrap_err();
        assert_eq!(err, MergeCollisionError::ReservedName { name: "base".into() });
        let err = MergedContextBuilder::new()
            .contributor("site", FnContributor::new())
            .contributor("site", FnContributor::new())
            .build()
            .unwrap_err();
        assert_eq!(err, MergeCollisionError::DuplicateContributor { name: "site".into() });
    }

    #[test]
    fn test_classes_merge_and_validate() {
        let page = ClassDef::class("Page").method(Signature::new("title", vec![], TypeRef::string()));
        let context = MergedContextBuilder::new()
            .contributor("site", FnContributor::new().class(page.clone()))
            .contributor("blog", FnContributor::new().class(page.clone()))
            .build()
            .unwrap();
        assert!(context.classes().contains("Page"));

        let other = ClassDef::class("Page");
        let err = MergedContextBuilder::new()
            .contributor("site", FnContributor::new().class(page))
            .contributor("blog", FnContributor::new().class(other))
            .build()
            .unwrap_err();
        assert!(matches!(err, MergeCollisionError::Class { .. }));

        let broken = FnContributor::new().function(
            Signature::new("pages", vec![], TypeRef::class("Missing")),
            |_| Ok(Value::Null),
        );
        let err = MergedContextBuilder::new()
            .contributor("site", broken)
            .build()
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "`pages(): Missing` from contributor `site`: unknown class `Missing`"
        );
    }

    #[test]
    fn test_dispatch_routes_to_declaring_contributor() {
        let sig = greeting(vec![], TypeRef::string());
        let context = MergedContextBuilder::new()
            .contributor(
                "site",
                FnContributor::new().function(sig.clone(), |_| Ok(Value::from("from site"))),
            )
            .contributor(
                "blog",
                FnContributor::new().function(sig.clone(), |_| Ok(Value::from("from blog"))),
            )
            .build()
            .unwrap();
        let unqualified = MemberRef {
            contributor: None,
            signature: sig.clone(),
        };
        assert_eq!(context.dispatch(&unqualified, vec![]).unwrap(), Value::from("from site"));
        let qualified = MemberRef {
            contributor: Some("blog".into()),
            signature: sig,
        };
        assert_eq!(context.dispatch(&qualified, vec![]).unwrap(), Value::from("from blog"));
    }
}
