//! Class table: built-in and contributed classes, subtyping, conversions and
//! method lookup.
//!
//! Class members are plain [`Signature`]s whose types may mention the class's
//! own type parameters as [`TypeRef::Var`]. Looking a member up through a
//! parametrized receiver (`List<String>`) substitutes those variables, walking
//! the supertype chain so that `Collection<E>` members seen from
//! `List<String>` come back specialized to `String`.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use trellis_core::unit::Conversion;
use trellis_core::{Primitive, Signature, TypeArg, TypeRef};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ClassKind {
    Class,
    /// A class that can have no subclasses (`String`, the wrappers).
    Final,
    Interface,
}

/// Declaration of one class or interface.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ClassDef {
    pub name: String,
    pub kind: ClassKind,
    /// Declared type parameters, referenced as `TypeRef::Var` in members.
    pub params: Vec<String>,
    pub supertypes: Vec<TypeRef>,
    pub methods: Vec<Signature>,
}

impl ClassDef {
    pub fn class(name: impl Into<String>) -> Self {
        Self::with_kind(name, ClassKind::Class)
    }

    pub fn final_class(name: impl Into<String>) -> Self {
        Self::with_kind(name, ClassKind::Final)
    }

    pub fn interface(name: impl Into<String>) -> Self {
        Self::with_kind(name, ClassKind::Interface)
    }

    fn with_kind(name: impl Into<String>, kind: ClassKind) -> Self {
        Self {
            name: name.into(),
            kind,
            params: Vec::new(),
            supertypes: Vec::new(),
            methods: Vec::new(),
        }
    }

    pub fn param(mut self, name: impl Into<String>) -> Self {
        self.params.push(name.into());
        self
    }

    pub fn extends(mut self, supertype: TypeRef) -> Self {
        self.supertypes.push(supertype);
        self
    }

    pub fn method(mut self, signature: Signature) -> Self {
        self.methods.push(signature);
        self
    }

    pub fn is_interface(&self) -> bool {
        self.kind == ClassKind::Interface
    }
}

/// How an argument of one static type is converted to a parameter type.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Coercion {
    pub conversions: Vec<Conversion>,
    /// The source and target types are identical.
    pub exact: bool,
}

impl Coercion {
    fn exact() -> Self {
        Self {
            conversions: Vec::new(),
            exact: true,
        }
    }

    fn steps(conversions: Vec<Conversion>) -> Self {
        Self {
            conversions,
            exact: false,
        }
    }

    pub fn widenings(&self) -> usize {
        self.conversions
            .iter()
            .filter(|c| matches!(c, Conversion::Widen(..)))
            .count()
    }

    pub fn boxings(&self) -> usize {
        self.conversions
            .iter()
            .filter(|c| matches!(c, Conversion::Box(_) | Conversion::Unbox(_)))
            .count()
    }
}

/// Run-time work an explicit cast needs: conversions before the check, an
/// optional class check, and conversions after it.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Default)]
pub struct CastPlan {
    pub before: Vec<Conversion>,
    pub check: Option<TypeRef>,
    pub after: Vec<Conversion>,
}

/// A class method found by lookup.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MethodCandidate {
    /// Class whose declaration won (the most specific return type).
    pub owner: String,
    /// The method as declared on `owner`.
    pub declared: Signature,
    /// The method with the receiver's type arguments substituted.
    pub signature: Signature,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClassTable {
    classes: BTreeMap<String, ClassDef>,
}

fn sig(name: &str, params: Vec<TypeRef>, returns: TypeRef) -> Signature {
    Signature::new(name, params, returns)
}

impl ClassTable {
    /// A table holding only the built-in classes.
    pub fn builtin() -> Self {
        let string = TypeRef::string;
        let int = TypeRef::int;
        let boolean = TypeRef::boolean;
        let object = TypeRef::object;
        let var = TypeRef::var;

        let mut table = ClassTable {
            classes: BTreeMap::new(),
        };
        let defs = [
            ClassDef::class("Object")
                .method(sig("toString", vec![], string()))
                .method(sig("equals", vec![object()], boolean()))
                .method(sig("hashCode", vec![], int())),
            ClassDef::interface("CharSequence")
                .method(sig("length", vec![], int()))
                .method(sig("toString", vec![], string())),
            ClassDef::interface("Comparable")
                .param("T")
                .method(sig("compareTo", vec![var("T")], int())),
            ClassDef::interface("Iterable").param("T"),
            ClassDef::interface("Collection")
                .param("E")
                .extends(TypeRef::generic("Iterable", [var("E")]))
                .method(sig("size", vec![], int()))
                .method(sig("isEmpty", vec![], boolean()))
                .method(sig("contains", vec![object()], boolean())),
            ClassDef::interface("List")
                .param("E")
                .extends(TypeRef::generic("Collection", [var("E")]))
                .method(sig("get", vec![int()], var("E")))
                .method(sig("indexOf", vec![object()], int()))
                .method(sig(
                    "subList",
                    vec![int(), int()],
                    TypeRef::generic("List", [var("E")]),
                )),
            ClassDef::interface("Set")
                .param("E")
                .extends(TypeRef::generic("Collection", [var("E")])),
            ClassDef::final_class("String")
                .extends(object())
                .extends(TypeRef::class("CharSequence"))
                .extends(TypeRef::generic("Comparable", [string()]))
                .method(sig("length", vec![], int()))
                .method(sig("isEmpty", vec![], boolean()))
                .method(sig("substring", vec![int()], string()))
                .method(sig("substring", vec![int(), int()], string()))
                .method(sig("toUpperCase", vec![], string()))
                .method(sig("toLowerCase", vec![], string()))
                .method(sig("trim", vec![], string()))
                .method(sig(
                    "contains",
                    vec![TypeRef::class("CharSequence")],
                    boolean(),
                ))
                .method(sig("startsWith", vec![string()], boolean()))
                .method(sig("endsWith", vec![string()], boolean()))
                .method(sig("indexOf", vec![string()], int()))
                .method(sig("concat", vec![string()], string()))
                .method(sig(
                    "replace",
                    vec![
                        TypeRef::class("CharSequence"),
                        TypeRef::class("CharSequence"),
                    ],
                    string(),
                ))
                .method(sig("split", vec![string()], TypeRef::array(string())))
                .method(sig("compareTo", vec![string()], int())),
            ClassDef::class("Number")
                .extends(object())
                .method(sig("intValue", vec![], int()))
                .method(sig("longValue", vec![], TypeRef::long()))
                .method(sig("doubleValue", vec![], TypeRef::double())),
            wrapper("Integer", "Number"),
            wrapper("Long", "Number"),
            wrapper("Double", "Number"),
            wrapper("Boolean", "Object").method(sig("booleanValue", vec![], boolean())),
        ];
        for def in defs {
            table.insert(def);
        }
        table
    }

    /// Add or replace a class; returns the previous declaration.
    pub fn insert(&mut self, def: ClassDef) -> Option<ClassDef> {
        self.classes.insert(def.name.clone(), def)
    }

    pub fn get(&self, name: &str) -> Option<&ClassDef> {
        self.classes.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.classes.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ClassDef> {
        self.classes.values()
    }

    /// Check that every class a type mentions exists and is applied to the
    /// right number of type arguments (zero arguments means raw).
    pub fn validate(&self, ty: &TypeRef) -> Result<(), String> {
        match ty {
            TypeRef::Class { name, args } => {
                let def = self
                    .get(name)
                    .ok_or_else(|| format!("unknown class `{name}`"))?;
                if !args.is_empty() && args.len() != def.params.len() {
                    return Err(format!(
                        "`{name}` expects {} type argument(s), found {}",
                        def.params.len(),
                        args.len()
                    ));
                }
                for arg in args {
                    match arg {
                        TypeArg::Exact(t) | TypeArg::Extends(t) | TypeArg::Super(t) => {
                            if t.is_primitive() || t.is_void() {
                                return Err(format!("primitive `{t}` used as a type argument"));
                            }
                            self.validate(t)?;
                        }
                        TypeArg::Any => {}
                    }
                }
                Ok(())
            }
            TypeRef::Array(elem) => {
                if elem.is_void() {
                    return Err("array of void".to_string());
                }
                self.validate(elem)
            }
            _ => Ok(()),
        }
    }

    fn bindings(&self, ty: &TypeRef) -> BTreeMap<String, TypeRef> {
        let mut bindings = BTreeMap::new();
        if let TypeRef::Class { name, args } = ty
            && let Some(def) = self.get(name)
        {
            for (i, param) in def.params.iter().enumerate() {
                let bound = args.get(i).map_or_else(TypeRef::object, TypeArg::upper_bound);
                bindings.insert(param.clone(), bound);
            }
        }
        bindings
    }

    /// Direct supertypes of a class type, specialized to its type arguments.
    pub fn direct_supertypes(&self, ty: &TypeRef) -> Vec<TypeRef> {
        let TypeRef::Class { name, args } = ty else {
            return Vec::new();
        };
        let Some(def) = self.get(name) else {
            return Vec::new();
        };
        let raw = args.is_empty() && !def.params.is_empty();
        let bindings = self.bindings(ty);
        def.supertypes
            .iter()
            .map(|s| {
                if raw { s.erased() } else { s.substitute(&bindings) }
            })
            .collect()
    }

    /// View `ty` as an instance of `target`, e.g. `List<String>` as
    /// `Iterable<String>`.
    pub fn as_super(&self, ty: &TypeRef, target: &str) -> Option<TypeRef> {
        if target == "Object" && ty.is_reference() && !ty.is_null() {
            return Some(TypeRef::object());
        }
        let mut queue = VecDeque::from([ty.clone()]);
        let mut seen = BTreeSet::new();
        while let Some(current) = queue.pop_front() {
            let Some(name) = current.class_name() else {
                continue;
            };
            if name == target {
                return Some(current);
            }
            if !seen.insert(name.to_string()) {
                continue;
            }
            queue.extend(self.direct_supertypes(&current));
        }
        None
    }

    pub fn is_subclass(&self, sub: &str, sup: &str) -> bool {
        sup == "Object" || self.as_super(&TypeRef::class(sub), sup).is_some()
    }

    fn is_final(&self, name: &str) -> bool {
        self.get(name).is_some_and(|def| def.kind == ClassKind::Final)
    }

    fn is_interface(&self, name: &str) -> bool {
        self.get(name).is_some_and(ClassDef::is_interface)
    }

    /// Reference assignability (subtyping with generic variance). Primitives
    /// are only assignable to themselves.
    pub fn is_assignable(&self, from: &TypeRef, to: &TypeRef) -> bool {
        if from == to {
            return true;
        }
        match (from, to) {
            (TypeRef::Primitive(_), _) | (_, TypeRef::Primitive(_)) => false,
            (_, TypeRef::Var(_)) => true,
            (TypeRef::Null, _) => true,
            (_, TypeRef::Class { name, .. }) if name == "Object" => true,
            (TypeRef::Var(_), _) => false,
            (TypeRef::Array(a), TypeRef::Array(b)) => {
                if a.is_primitive() || b.is_primitive() {
                    a == b
                } else {
                    self.is_assignable(a, b)
                }
            }
            (TypeRef::Class { .. }, TypeRef::Class { name, args }) => {
                match self.as_super(from, name) {
                    Some(sup) => {
                        args.is_empty()
                            || sup.type_args().is_empty()
                            || self.args_compatible(sup.type_args(), args)
                    }
                    None => false,
                }
            }
            _ => false,
        }
    }

    fn args_compatible(&self, source: &[TypeArg], target: &[TypeArg]) -> bool {
        source.len() == target.len()
            && source.iter().zip(target).all(|(s, t)| match (s, t) {
                (_, TypeArg::Any) => true,
                (TypeArg::Exact(s), TypeArg::Exact(t)) => s == t,
                (TypeArg::Exact(s) | TypeArg::Extends(s), TypeArg::Extends(t)) => {
                    self.is_assignable(s, t)
                }
                (TypeArg::Super(_) | TypeArg::Any, TypeArg::Extends(t)) => {
                    t.is_class("Object")
                }
                (TypeArg::Exact(s) | TypeArg::Super(s), TypeArg::Super(t)) => {
                    self.is_assignable(t, s)
                }
                _ => false,
            })
    }

    /// Implicit conversion of a value of type `from` to type `to`, as used for
    /// arguments, assignments and return values.
    pub fn coerce(&self, from: &TypeRef, to: &TypeRef) -> Option<Coercion> {
        if from == to && !from.is_void() {
            return Some(Coercion::exact());
        }
        let object = TypeRef::object();
        let to = if matches!(to, TypeRef::Var(_)) { &object } else { to };
        match (from, to) {
            (TypeRef::Primitive(Primitive::Void), _) | (_, TypeRef::Primitive(Primitive::Void)) => {
                None
            }
            (TypeRef::Primitive(p), TypeRef::Primitive(q)) => {
                p.widens_to(*q)
                    .then(|| Coercion::steps(vec![Conversion::Widen(*p, *q)]))
            }
            (TypeRef::Primitive(p), _) => {
                let boxed = TypeRef::class(p.wrapper()?);
                self.is_assignable(&boxed, to)
                    .then(|| Coercion::steps(vec![Conversion::Box(*p)]))
            }
            (_, TypeRef::Primitive(q)) => {
                let p = from.unboxed().filter(|_| from.is_reference())?;
                if p == *q {
                    Some(Coercion::steps(vec![Conversion::Unbox(p)]))
                } else if p.widens_to(*q) {
                    Some(Coercion::steps(vec![
                        Conversion::Unbox(p),
                        Conversion::Widen(p, *q),
                    ]))
                } else {
                    None
                }
            }
            _ => self
                .is_assignable(from, to)
                .then(|| Coercion::steps(Vec::new())),
        }
    }

    /// Whether a value of static type `a` could at run time also be an
    /// instance of `b` (the static requirement of `isa` and `as`).
    pub fn are_related(&self, a: &TypeRef, b: &TypeRef) -> bool {
        let (a, b) = (a.boxed().erased(), b.boxed().erased());
        if a.is_null() || b.is_null() {
            return true;
        }
        if self.is_assignable(&a, &b) || self.is_assignable(&b, &a) {
            return true;
        }
        match (a.class_name(), b.class_name()) {
            (Some(x), Some(y)) => {
                let (xi, yi) = (self.is_interface(x), self.is_interface(y));
                (xi && yi) || (xi && !self.is_final(y)) || (yi && !self.is_final(x))
            }
            _ => false,
        }
    }

    /// Plan an explicit cast, or `None` when the types can never meet.
    pub fn cast(&self, from: &TypeRef, to: &TypeRef) -> Option<CastPlan> {
        if let Some(coercion) = self.coerce(from, to) {
            return Some(CastPlan {
                before: coercion.conversions,
                ..CastPlan::default()
            });
        }
        match (from, to) {
            (TypeRef::Primitive(p), TypeRef::Primitive(q)) if p.is_numeric() && q.is_numeric() => {
                Some(CastPlan {
                    before: vec![Conversion::Narrow(*p, *q)],
                    ..CastPlan::default()
                })
            }
            (TypeRef::Primitive(_), _) => None,
            (_, TypeRef::Primitive(q)) => {
                if from.is_null() || q.wrapper().is_none() {
                    return None;
                }
                if let Some(p) = from.numeric()
                    && q.is_numeric()
                {
                    return Some(CastPlan {
                        before: vec![Conversion::Unbox(p), Conversion::Narrow(p, *q)],
                        ..CastPlan::default()
                    });
                }
                let boxed = to.boxed();
                self.are_related(from, &boxed).then(|| CastPlan {
                    before: Vec::new(),
                    check: Some(boxed),
                    after: vec![Conversion::Unbox(*q)],
                })
            }
            _ => self.are_related(from, to).then(|| CastPlan {
                check: Some(to.erased()),
                ..CastPlan::default()
            }),
        }
    }

    /// The common supertype of two types, used for ternary/elvis results,
    /// collection literals and template return types.
    pub fn common_supertype(&self, a: &TypeRef, b: &TypeRef) -> Option<TypeRef> {
        if a.is_void() || b.is_void() {
            return None;
        }
        if a == b {
            return Some(a.clone());
        }
        match (a, b) {
            (TypeRef::Null, other) | (other, TypeRef::Null) => Some(other.boxed()),
            (TypeRef::Primitive(p), TypeRef::Primitive(q)) => match p.promote(*q) {
                Some(wide) => Some(TypeRef::Primitive(wide)),
                None => self.common_supertype(&a.boxed(), &b.boxed()),
            },
            (TypeRef::Primitive(_), _) | (_, TypeRef::Primitive(_)) => {
                self.common_supertype(&a.boxed(), &b.boxed())
            }
            (TypeRef::Array(x), TypeRef::Array(y)) if x.is_reference() && y.is_reference() => {
                Some(TypeRef::array(self.common_supertype(x, y)?))
            }
            (TypeRef::Class { .. }, TypeRef::Class { .. }) => Some(self.join_classes(a, b)),
            _ => Some(TypeRef::object()),
        }
    }

    fn ancestors(&self, ty: &TypeRef) -> Vec<String> {
        let mut out = Vec::new();
        let mut queue = VecDeque::from([ty.clone()]);
        while let Some(current) = queue.pop_front() {
            let Some(name) = current.class_name() else {
                continue;
            };
            if out.iter().any(|seen| seen == name) {
                continue;
            }
            out.push(name.to_string());
            queue.extend(self.direct_supertypes(&current));
        }
        out
    }

    fn join_classes(&self, a: &TypeRef, b: &TypeRef) -> TypeRef {
        let b_ancestors = self.ancestors(b);
        let shared: Vec<String> = self
            .ancestors(a)
            .into_iter()
            .filter(|name| name != "Object" && b_ancestors.contains(name))
            .collect();
        let minimal: Vec<&String> = shared
            .iter()
            .filter(|name| {
                !shared
                    .iter()
                    .any(|other| other != *name && self.is_subclass(other, name))
            })
            .collect();
        let chosen = minimal
            .iter()
            .find(|name| !self.is_interface(name))
            .or_else(|| match minimal.as_slice() {
                [only] => Some(only),
                _ => None,
            });
        let Some(chosen) = chosen else {
            return TypeRef::object();
        };
        match (self.as_super(a, chosen), self.as_super(b, chosen)) {
            (Some(x), Some(y)) if x == y => x,
            (Some(x), Some(_)) if !x.type_args().is_empty() => TypeRef::Class {
                name: chosen.to_string(),
                args: vec![TypeArg::Any; x.type_args().len()],
            },
            _ => TypeRef::class(chosen.as_str()),
        }
    }

    /// Instance methods named `name` visible on `receiver`.
    ///
    /// Overriding declarations (same parameters after substitution) collapse
    /// into one candidate carrying the most specific declared return type.
    pub fn methods(&self, receiver: &TypeRef, name: &str) -> Vec<MethodCandidate> {
        let start = match receiver.boxed() {
            ty @ TypeRef::Class { .. } => ty,
            _ => TypeRef::object(),
        };
        let mut found: Vec<MethodCandidate> = Vec::new();
        let mut queue = VecDeque::from([start]);
        let mut seen = BTreeSet::new();
        let visit = |ty: &TypeRef, found: &mut Vec<MethodCandidate>| {
            let Some(def) = ty.class_name().and_then(|n| self.get(n)) else {
                return;
            };
            let raw = ty.type_args().is_empty() && !def.params.is_empty();
            let bindings = self.bindings(ty);
            for declared in def.methods.iter().filter(|m| m.name == name) {
                let specialize = |t: &TypeRef| if raw { t.erased() } else { t.substitute(&bindings) };
                let signature = Signature {
                    name: declared.name.clone(),
                    params: declared.params.iter().map(specialize).collect(),
                    variadic: declared.variadic,
                    returns: specialize(&declared.returns),
                };
                found.push(MethodCandidate {
                    owner: def.name.clone(),
                    declared: declared.clone(),
                    signature,
                });
            }
        };
        while let Some(current) = queue.pop_front() {
            let Some(class) = current.class_name() else {
                continue;
            };
            if !seen.insert(class.to_string()) {
                continue;
            }
            visit(&current, &mut found);
            queue.extend(self.direct_supertypes(&current));
        }
        if !seen.contains("Object") {
            visit(&TypeRef::object(), &mut found);
        }
        self.collapse_overrides(found)
    }

    fn collapse_overrides(&self, found: Vec<MethodCandidate>) -> Vec<MethodCandidate> {
        let mut groups: Vec<Vec<MethodCandidate>> = Vec::new();
        for candidate in found {
            match groups
                .iter_mut()
                .find(|group| group[0].signature.same_parameters(&candidate.signature))
            {
                Some(group) => group.push(candidate),
                None => groups.push(vec![candidate]),
            }
        }
        groups
            .into_iter()
            .map(|mut group| {
                let best = group.iter().position(|c| {
                    group
                        .iter()
                        .all(|o| self.return_covariant(&c.signature.returns, &o.signature.returns))
                });
                group.swap_remove(best.unwrap_or(0))
            })
            .collect()
    }

    fn return_covariant(&self, narrow: &TypeRef, wide: &TypeRef) -> bool {
        narrow == wide || (narrow.is_reference() && self.is_assignable(narrow, wide))
    }

    /// Element type produced by iterating a value of type `ty`.
    pub fn element_type(&self, ty: &TypeRef) -> Option<TypeRef> {
        match ty {
            TypeRef::Array(elem) => Some((**elem).clone()),
            TypeRef::Class { .. } => {
                let iterable = self.as_super(ty, "Iterable")?;
                Some(
                    iterable
                        .type_args()
                        .first()
                        .map_or_else(TypeRef::object, TypeArg::upper_bound),
                )
            }
            _ => None,
        }
    }

    /// Whether values of `ty` can be ordered with `<=>` and the relational
    /// operators.
    pub fn is_comparable(&self, ty: &TypeRef) -> bool {
        ty.numeric().is_some() || ty.is_null() || self.as_super(&ty.boxed(), "Comparable").is_some()
    }
}

fn wrapper(name: &str, parent: &str) -> ClassDef {
    ClassDef::final_class(name)
        .extends(TypeRef::class(parent))
        .extends(TypeRef::generic("Comparable", [TypeRef::class(name)]))
        .method(sig("compareTo", vec![TypeRef::class(name)], TypeRef::int()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list_of(ty: TypeRef) -> TypeRef {
        TypeRef::generic("List", [ty])
    }

    #[test]
    fn test_generic_supertype_substitution() {
        let table = ClassTable::builtin();
        let iterable = table.as_super(&list_of(TypeRef::string()), "Iterable");
        assert_eq!(iterable, Some(TypeRef::generic("Iterable", [TypeRef::string()])));
        assert_eq!(
            table.element_type(&list_of(TypeRef::string())),
            Some(TypeRef::string())
        );
        assert_eq!(
            table.element_type(&TypeRef::class("List")),
            Some(TypeRef::object())
        );
    }

    #[test]
    fn test_assignability_with_wildcards() {
        let table = ClassTable::builtin();
        let strings = list_of(TypeRef::string());
        let numbers_ext = TypeRef::Class {
            name: "List".into(),
            args: vec![TypeArg::Extends(TypeRef::class("Number"))],
        };
        assert!(table.is_assignable(&strings, &TypeRef::class("Collection")));
        assert!(!table.is_assignable(&strings, &list_of(TypeRef::object())));
        assert!(table.is_assignable(&list_of(TypeRef::class("Integer")), &numbers_ext));
        assert!(!table.is_assignable(&strings, &numbers_ext));
        assert!(table.is_assignable(&TypeRef::Null, &strings));
        assert!(!table.is_assignable(&TypeRef::Null, &TypeRef::int()));
    }

    #[test]
    fn test_coercion_costs() {
        let table = ClassTable::builtin();
        let widen = table.coerce(&TypeRef::int(), &TypeRef::double()).unwrap();
        assert_eq!((widen.widenings(), widen.boxings()), (1, 0));
        let boxed = table.coerce(&TypeRef::int(), &TypeRef::class("Number")).unwrap();
        assert_eq!(boxed.conversions, vec![Conversion::Box(Primitive::Int)]);
        let unbox = table.coerce(&TypeRef::class("Integer"), &TypeRef::long()).unwrap();
        assert_eq!(unbox.widenings(), 1);
        assert_eq!(unbox.boxings(), 1);
        assert!(table.coerce(&TypeRef::double(), &TypeRef::int()).is_none());
        assert!(table.coerce(&TypeRef::string(), &TypeRef::string()).unwrap().exact);
    }

    #[test]
    fn test_common_supertype() {
        let table = ClassTable::builtin();
        let lub = |a: TypeRef, b: TypeRef| table.common_supertype(&a, &b);
        assert_eq!(lub(TypeRef::int(), TypeRef::long()), Some(TypeRef::long()));
        assert_eq!(lub(TypeRef::Null, TypeRef::int()), Some(TypeRef::class("Integer")));
        assert_eq!(
            lub(TypeRef::class("Integer"), TypeRef::class("Double")),
            Some(TypeRef::class("Number"))
        );
        assert_eq!(
            lub(list_of(TypeRef::string()), TypeRef::generic("Set", [TypeRef::string()])),
            Some(TypeRef::generic("Collection", [TypeRef::string()]))
        );
        assert_eq!(lub(TypeRef::void(), TypeRef::int()), None);
    }

    #[test]
    fn test_covariant_return_picks_most_derived() {
        let mut table = ClassTable::builtin();
        table.insert(
            ClassDef::class("Node")
                .method(sig("parent", vec![], TypeRef::class("Node")))
                .method(sig("label", vec![], TypeRef::string())),
        );
        table.insert(
            ClassDef::class("Element")
                .extends(TypeRef::class("Node"))
                .method(sig("parent", vec![], TypeRef::class("Element"))),
        );
        let methods = table.methods(&TypeRef::class("Element"), "parent");
        assert_eq!(methods.len(), 1);
        assert_eq!(methods[0].owner, "Element");
        assert_eq!(methods[0].signature.returns, TypeRef::class("Element"));
        assert_eq!(table.methods(&TypeRef::class("Element"), "label").len(), 1);
    }

    #[test]
    fn test_method_specialized_through_hierarchy() {
        let table = ClassTable::builtin();
        let get = table.methods(&list_of(TypeRef::string()), "get");
        assert_eq!(get[0].signature.returns, TypeRef::string());
        let to_string = table.methods(&list_of(TypeRef::string()), "toString");
        assert_eq!(to_string.len(), 1);
    }

    #[test]
    fn test_related_types_for_casts() {
        let table = ClassTable::builtin();
        assert!(table.are_related(&TypeRef::object(), &TypeRef::string()));
        assert!(table.are_related(&TypeRef::class("CharSequence"), &TypeRef::class("List")));
        assert!(!table.are_related(&TypeRef::string(), &TypeRef::class("Integer")));
        let plan = table.cast(&TypeRef::object(), &TypeRef::int()).unwrap();
        assert_eq!(plan.check, Some(TypeRef::class("Integer")));
        let narrow = table.cast(&TypeRef::double(), &TypeRef::int()).unwrap();
        assert_eq!(
            narrow.before,
            vec![Conversion::Narrow(Primitive::Double, Primitive::Int)]
        );
    }
}
