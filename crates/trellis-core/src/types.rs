//! Static types of the template language.
//!
//! A [`TypeRef`] is either a primitive, a (possibly parametrized) class, or an
//! array. Two internal forms complete the picture: `Var` names a class's own
//! type parameter inside its member declarations, and `Null` is the type of
//! the `null` literal before it meets anything else.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Primitive {
    Boolean,
    Int,
    Long,
    Double,
    Void,
}

impl Primitive {
    pub fn keyword(self) -> &'static str {
        match self {
            Primitive::Boolean => "boolean",
            Primitive::Int => "int",
            Primitive::Long => "long",
            Primitive::Double => "double",
            Primitive::Void => "void",
        }
    }

    pub fn from_keyword(word: &str) -> Option<Self> {
        Some(match word {
            "boolean" => Primitive::Boolean,
            "int" => Primitive::Int,
            "long" => Primitive::Long,
            "double" => Primitive::Double,
            "void" => Primitive::Void,
            _ => return None,
        })
    }

    /// Name of the wrapper class used when this primitive is boxed.
    pub fn wrapper(self) -> Option<&'static str> {
        match self {
            Primitive::Boolean => Some("Boolean"),
            Primitive::Int => Some("Integer"),
            Primitive::Long => Some("Long"),
            Primitive::Double => Some("Double"),
            Primitive::Void => None,
        }
    }

    pub fn from_wrapper(name: &str) -> Option<Self> {
        Some(match name {
            "Boolean" => Primitive::Boolean,
            "Integer" => Primitive::Int,
            "Long" => Primitive::Long,
            "Double" => Primitive::Double,
            _ => return None,
        })
    }

    pub fn is_numeric(self) -> bool {
        self.numeric_rank().is_some()
    }

    fn numeric_rank(self) -> Option<u8> {
        match self {
            Primitive::Int => Some(0),
            Primitive::Long => Some(1),
            Primitive::Double => Some(2),
            _ => None,
        }
    }

    /// Strict numeric widening (`int -> long -> double`).
    pub fn widens_to(self, target: Primitive) -> bool {
        match (self.numeric_rank(), target.numeric_rank()) {
            (Some(from), Some(to)) => from < to,
            _ => false,
        }
    }

    /// The wider of two numeric primitives.
    pub fn promote(self, other: Primitive) -> Option<Primitive> {
        let (a, b) = (self.numeric_rank()?, other.numeric_rank()?);
        Some(if a >= b { self } else { other })
    }
}

/// A type argument of a parametrized class.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TypeArg {
    Exact(TypeRef),
    /// `? extends T`
    Extends(TypeRef),
    /// `? super T`
    Super(TypeRef),
    /// `?`
    Any,
}

impl TypeArg {
    /// The type a value read through this argument is known to have.
    pub fn upper_bound(&self) -> TypeRef {
        match self {
            TypeArg::Exact(ty) | TypeArg::Extends(ty) => ty.clone(),
            TypeArg::Super(_) | TypeArg::Any => TypeRef::object(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TypeRef {
    Primitive(Primitive),
    Class { name: String, args: Vec<TypeArg> },
    Array(Box<TypeRef>),
    Var(String),
    Null,
}

impl TypeRef {
    pub fn boolean() -> Self {
        TypeRef::Primitive(Primitive::Boolean)
    }

    pub fn int() -> Self {
        TypeRef::Primitive(Primitive::Int)
    }

    pub fn long() -> Self {
        TypeRef::Primitive(Primitive::Long)
    }

    pub fn double() -> Self {
        TypeRef::Primitive(Primitive::Double)
    }

    pub fn void() -> Self {
        TypeRef::Primitive(Primitive::Void)
    }

    pub fn class(name: impl Into<String>) -> Self {
        TypeRef::Class {
            name: name.into(),
            args: Vec::new(),
        }
    }

    /// A class applied to exact type arguments, e.g. `List<String>`.
    pub fn generic(name: impl Into<String>, args: impl IntoIterator<Item = TypeRef>) -> Self {
        TypeRef::Class {
            name: name.into(),
            args: args.into_iter().map(TypeArg::Exact).collect(),
        }
    }

    pub fn array(elem: TypeRef) -> Self {
        TypeRef::Array(Box::new(elem))
    }

    pub fn var(name: impl Into<String>) -> Self {
        TypeRef::Var(name.into())
    }

    pub fn object() -> Self {
        Self::class("Object")
    }

    pub fn string() -> Self {
        Self::class("String")
    }

    pub fn as_primitive(&self) -> Option<Primitive> {
        match self {
            TypeRef::Primitive(p) => Some(*p),
            _ => None,
        }
    }

    pub fn is_primitive(&self) -> bool {
        matches!(self, TypeRef::Primitive(p) if *p != Primitive::Void)
    }

    pub fn is_void(&self) -> bool {
        matches!(self, TypeRef::Primitive(Primitive::Void))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, TypeRef::Null)
    }

    pub fn is_reference(&self) -> bool {
        !matches!(self, TypeRef::Primitive(_))
    }

    pub fn class_name(&self) -> Option<&str> {
        match self {
            TypeRef::Class { name, .. } => Some(name),
            _ => None,
        }
    }

    pub fn type_args(&self) -> &[TypeArg] {
        match self {
            TypeRef::Class { args, .. } => args,
            _ => &[],
        }
    }

    pub fn is_class(&self, expected: &str) -> bool {
        self.class_name() == Some(expected)
    }

    /// Box a primitive into its wrapper class; other types are unchanged.
    pub fn boxed(&self) -> TypeRef {
        match self {
            TypeRef::Primitive(p) => match p.wrapper() {
                Some(wrapper) => TypeRef::class(wrapper),
                None => self.clone(),
            },
            _ => self.clone(),
        }
    }

    /// The primitive behind a primitive or a wrapper class.
    pub fn unboxed(&self) -> Option<Primitive> {
        match self {
            TypeRef::Primitive(p) if *p != Primitive::Void => Some(*p),
            TypeRef::Class { name, .. } => Primitive::from_wrapper(name),
            _ => None,
        }
    }

    /// The numeric primitive behind a numeric primitive or its wrapper.
    pub fn numeric(&self) -> Option<Primitive> {
        self.unboxed().filter(|p| p.is_numeric())
    }

    /// The same type with every type argument dropped (runtime view).
    pub fn erased(&self) -> TypeRef {
        match self {
            TypeRef::Class { name, .. } => TypeRef::class(name.clone()),
            TypeRef::Array(elem) => TypeRef::array(elem.erased()),
            TypeRef::Var(_) => TypeRef::object(),
            other => other.clone(),
        }
    }

    /// Replace type variables using `bindings`; unbound variables are kept.
    pub fn substitute(&self, bindings: &BTreeMap<String, TypeRef>) -> TypeRef {
        match self {
            TypeRef::Var(name) => bindings.get(name).cloned().unwrap_or_else(|| self.clone()),
            TypeRef::Class { name, args } => TypeRef::Class {
                name: name.clone(),
                args: args
                    .iter()
                    .map(|arg| match arg {
                        TypeArg::Exact(ty) => TypeArg::Exact(ty.substitute(bindings)),
                        TypeArg::Extends(ty) => TypeArg::Extends(ty.substitute(bindings)),
                        TypeArg::Super(ty) => TypeArg::Super(ty.substitute(bindings)),
                        TypeArg::Any => TypeArg::Any,
                    })
                    .collect(),
            },
            TypeRef::Array(elem) => TypeRef::array(elem.substitute(bindings)),
            other => other.clone(),
        }
    }

    pub fn contains_var(&self) -> bool {
        match self {
            TypeRef::Var(_) => true,
            TypeRef::Class { args, .. } => args.iter().any(|arg| match arg {
                TypeArg::Exact(ty) | TypeArg::Extends(ty) | TypeArg::Super(ty) => {
                    ty.contains_var()
                }
                TypeArg::Any => false,
            }),
            TypeRef::Array(elem) => elem.contains_var(),
            _ => false,
        }
    }
}

impl fmt::Display for TypeArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeArg::Exact(ty) => write!(f, "{ty}"),
            TypeArg::Extends(ty) => write!(f, "? extends {ty}"),
            TypeArg::Super(ty) => write!(f, "? super {ty}"),
            TypeArg::Any => f.write_str("?"),
        }
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeRef::Primitive(p) => f.write_str(p.keyword()),
            TypeRef::Class { name, args } => {
                f.write_str(name)?;
                if !args.is_empty() {
                    f.write_str("<")?;
                    for (i, arg) in args.iter().enumerate() {
                        if i > 0 {
                            f.write_str(", ")?;
                        }
                        write!(f, "{arg}")?;
                    }
                    f.write_str(">")?;
                }
                Ok(())
            }
            TypeRef::Array(elem) => write!(f, "{elem}[]"),
            TypeRef::Var(name) => f.write_str(name),
            TypeRef::Null => f.write_str("null"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_generic_and_array() {
        let ty = TypeRef::Class {
            name: "Map".into(),
            args: vec![
                TypeArg::Exact(TypeRef::string()),
                TypeArg::Extends(TypeRef::class("Number")),
            ],
        };
        assert_eq!(ty.to_string(), "Map<String, ? extends Number>");
        assert_eq!(TypeRef::array(TypeRef::int()).to_string(), "int[]");
    }

    #[test]
    fn test_boxing_round_trip() {
        assert_eq!(TypeRef::int().boxed(), TypeRef::class("Integer"));
        assert_eq!(TypeRef::class("Integer").unboxed(), Some(Primitive::Int));
        assert_eq!(TypeRef::string().unboxed(), None);
        assert_eq!(TypeRef::void().boxed(), TypeRef::void());
    }

    #[test]
    fn test_widening_order() {
        assert!(Primitive::Int.widens_to(Primitive::Long));
        assert!(Primitive::Long.widens_to(Primitive::Double));
        assert!(!Primitive::Double.widens_to(Primitive::Int));
        assert!(!Primitive::Boolean.widens_to(Primitive::Int));
        assert_eq!(Primitive::Int.promote(Primitive::Double), Some(Primitive::Double));
    }

    #[test]
    fn test_substitute_nested() {
        let list_of_t = TypeRef::generic("List", [TypeRef::var("T")]);
        let mut bindings = BTreeMap::new();
        bindings.insert("T".to_string(), TypeRef::string());
        assert_eq!(
            list_of_t.substitute(&bindings),
            TypeRef::generic("List", [TypeRef::string()])
        );
        assert!(list_of_t.contains_var());
    }
}
