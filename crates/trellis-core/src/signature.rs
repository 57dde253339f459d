use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::TypeRef;

/// A callable member: context function or class method.
///
/// When `variadic` is set the last parameter is an array type whose element
/// type absorbs any number of trailing arguments.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Signature {
    pub name: String,
    pub params: Vec<TypeRef>,
    pub variadic: bool,
    pub returns: TypeRef,
}

impl Signature {
    pub fn new(name: impl Into<String>, params: Vec<TypeRef>, returns: TypeRef) -> Self {
        Self {
            name: name.into(),
            params,
            variadic: false,
            returns,
        }
    }

    /// A variadic signature; `element` is the type of each trailing argument.
    pub fn variadic(
        name: impl Into<String>,
        mut fixed: Vec<TypeRef>,
        element: TypeRef,
        returns: TypeRef,
    ) -> Self {
        fixed.push(TypeRef::array(element));
        Self {
            name: name.into(),
            params: fixed,
            variadic: true,
            returns,
        }
    }

    /// Number of leading parameters that are never absorbed by varargs.
    pub fn fixed_arity(&self) -> usize {
        if self.variadic {
            self.params.len() - 1
        } else {
            self.params.len()
        }
    }

    /// Element type of the variadic tail, if any.
    pub fn variadic_element(&self) -> Option<&TypeRef> {
        if !self.variadic {
            return None;
        }
        match self.params.last() {
            Some(TypeRef::Array(elem)) => Some(elem),
            _ => None,
        }
    }

    /// Same name and identical parameter list (return type ignored).
    pub fn same_parameters(&self, other: &Signature) -> bool {
        self.name == other.name && self.params == other.params && self.variadic == other.variadic
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            match (self.variadic && i + 1 == self.params.len(), param) {
                (true, TypeRef::Array(elem)) => write!(f, "{elem}...")?,
                _ => write!(f, "{param}")?,
            }
        }
        write!(f, "): {}", self.returns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variadic_display() {
        let sig = Signature::variadic(
            "join",
            vec![TypeRef::string()],
            TypeRef::object(),
            TypeRef::string(),
        );
        assert_eq!(sig.to_string(), "join(String, Object...): String");
        assert_eq!(sig.fixed_arity(), 1);
        assert_eq!(sig.variadic_element(), Some(&TypeRef::object()));
    }

    #[test]
    fn test_same_parameters_ignores_return() {
        let a = Signature::new("f", vec![TypeRef::int()], TypeRef::int());
        let b = Signature::new("f", vec![TypeRef::int()], TypeRef::string());
        let c = Signature::new("f", vec![TypeRef::long()], TypeRef::int());
        assert!(a.same_parameters(&b));
        assert!(!a.same_parameters(&c));
    }
}
