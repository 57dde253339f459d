//! Runtime values exchanged between compiled templates and the host.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use derive_more::{Display, Error};

use crate::types::TypeRef;

/// Failure raised by host code (a contributor or a host object).
#[derive(Clone, Debug, Display, Error, PartialEq, Eq)]
#[display("{message}")]
pub struct HostError {
    #[error(not(source))]
    pub message: String,
}

impl HostError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// An object owned by the host application.
///
/// `class_name` must name a class known to the context's class table so the
/// analyzer can type its members and `isa` can test it at run time.
pub trait HostObject: fmt::Debug + Send + Sync {
    fn class_name(&self) -> &str;

    /// Invoke a method declared on `class_name` (or one of its supertypes).
    fn invoke(&self, method: &str, args: Vec<Value>) -> Result<Value, HostError>;

    fn display(&self) -> String {
        format!("{self:?}")
    }

    /// Ordering used by `<=>` when the class implements `Comparable`.
    fn compare(&self, _other: &Value) -> Option<Ordering> {
        None
    }
}

#[derive(Clone, Debug)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i32),
    Long(i64),
    Double(f64),
    Str(Arc<str>),
    List(Arc<Vec<Value>>),
    /// Insertion-ordered, duplicate-free.
    Set(Arc<Vec<Value>>),
    Array {
        elem: TypeRef,
        items: Arc<Vec<Value>>,
    },
    Object(Arc<dyn HostObject>),
}

impl Value {
    pub fn string(text: impl Into<Arc<str>>) -> Self {
        Value::Str(text.into())
    }

    pub fn list(items: Vec<Value>) -> Self {
        Value::List(Arc::new(items))
    }

    /// Build a set, dropping later duplicates.
    pub fn set(items: impl IntoIterator<Item = Value>) -> Self {
        let mut unique: Vec<Value> = Vec::new();
        for item in items {
            if !unique.iter().any(|existing| existing.loose_eq(&item)) {
                unique.push(item);
            }
        }
        Value::Set(Arc::new(unique))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// The language's conversion of any value to a boolean.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Long(n) => *n != 0,
            Value::Double(n) => *n != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(items) | Value::Set(items) => !items.is_empty(),
            Value::Array { items, .. } => !items.is_empty(),
            Value::Object(_) => true,
        }
    }

    /// Runtime class of the value, or `None` for `null`.
    pub fn runtime_type(&self) -> Option<TypeRef> {
        Some(match self {
            Value::Null => return None,
            Value::Bool(_) => TypeRef::class("Boolean"),
            Value::Int(_) => TypeRef::class("Integer"),
            Value::Long(_) => TypeRef::class("Long"),
            Value::Double(_) => TypeRef::class("Double"),
            Value::Str(_) => TypeRef::string(),
            Value::List(_) => TypeRef::class("List"),
            Value::Set(_) => TypeRef::class("Set"),
            Value::Array { elem, .. } => TypeRef::array(elem.clone()),
            Value::Object(obj) => TypeRef::class(obj.class_name()),
        })
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(&**s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(i64::from(*n)),
            Value::Long(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(f64::from(*n)),
            Value::Long(n) => Some(*n as f64),
            Value::Double(n) => Some(*n),
            _ => None,
        }
    }

    /// Elements of a list, set or array.
    pub fn elements(&self) -> Option<&Arc<Vec<Value>>> {
        match self {
            Value::List(items) | Value::Set(items) => Some(items),
            Value::Array { items, .. } => Some(items),
            _ => None,
        }
    }

    /// Equality used by `==`: numbers compare by value across widths, other
    /// values structurally, host objects by identity.
    pub fn loose_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.loose_eq(y))
            }
            (Value::Set(a), Value::Set(b)) => {
                a.len() == b.len() && a.iter().all(|x| b.iter().any(|y| x.loose_eq(y)))
            }
            (Value::Array { items: a, .. }, Value::Array { items: b, .. }) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.loose_eq(y))
            }
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            (a, b) => match (a.as_i64(), b.as_i64()) {
                (Some(x), Some(y)) => x == y,
                _ => match (a.as_f64(), b.as_f64()) {
                    (Some(x), Some(y)) => x == y,
                    _ => false,
                },
            },
        }
    }

    /// Ordering used by `<=>` and the relational operators. `null` sorts
    /// before everything else.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Null, Value::Null) => Some(Ordering::Equal),
            (Value::Null, _) => Some(Ordering::Less),
            (_, Value::Null) => Some(Ordering::Greater),
            (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::Object(obj), other) => obj.compare(other),
            (a, b) => match (a.as_i64(), b.as_i64()) {
                (Some(x), Some(y)) => Some(x.cmp(&y)),
                _ => a.as_f64()?.partial_cmp(&b.as_f64()?),
            },
        }
    }

    /// Ordering used by `<=>` and `compareTo`. Same as [`Value::compare`]
    /// except that NaN is equal to itself and sorts after every other number.
    pub fn three_way(&self, other: &Value) -> Option<Ordering> {
        match (self.as_f64(), other.as_f64()) {
            (Some(x), Some(y)) if x.is_nan() || y.is_nan() => {
                Some(x.is_nan().cmp(&y.is_nan()))
            }
            _ => self.compare(other),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(n) => write!(f, "{n}"),
            Value::Long(n) => write!(f, "{n}"),
            Value::Double(n) => {
                if n.fract() == 0.0 && n.is_finite() {
                    write!(f, "{n:.1}")
                } else {
                    write!(f, "{n}")
                }
            }
            Value::Str(s) => f.write_str(s),
            Value::List(items) | Value::Set(items) => write_items(f, items),
            Value::Array { items, .. } => write_items(f, items),
            Value::Object(obj) => f.write_str(&obj.display()),
        }
    }
}

fn write_items(f: &mut fmt::Formatter<'_>, items: &[Value]) -> fmt::Result {
    f.write_str("[")?;
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{item}")?;
    }
    f.write_str("]")
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Long(a), Value::Long(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => a == b,
            (Value::Int(_) | Value::Long(_) | Value::Double(_), _)
            | (_, Value::Int(_) | Value::Long(_) | Value::Double(_)) => false,
            _ => self.loose_eq(other),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Long(n)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Double(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.into())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s.into())
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::list(items)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truthiness_table() {
        let falsy = [
            Value::Null,
            Value::Bool(false),
            Value::Int(0),
            Value::Long(0),
            Value::Double(0.0),
            Value::from(""),
            Value::list(vec![]),
            Value::set(vec![]),
        ];
        for value in falsy {
            assert!(!value.is_truthy(), "{value:?} should be falsy");
        }
        let truthy = [
            Value::Bool(true),
            Value::Int(-3),
            Value::Double(0.5),
            Value::from("x"),
            Value::list(vec![Value::Null]),
            Value::set(vec![Value::Int(1)]),
        ];
        for value in truthy {
            assert!(value.is_truthy(), "{value:?} should be truthy");
        }
    }

    #[test]
    fn test_loose_equality_crosses_numeric_widths() {
        assert!(Value::Int(3).loose_eq(&Value::Long(3)));
        assert!(Value::Int(3).loose_eq(&Value::Double(3.0)));
        assert!(!Value::Int(3).loose_eq(&Value::from("3")));
        assert_ne!(Value::Int(3), Value::Long(3));
    }

    #[test]
    fn test_compare_orders_null_first() {
        assert_eq!(Value::Null.compare(&Value::Int(1)), Some(Ordering::Less));
        assert_eq!(
            Value::from("abc").compare(&Value::from("def")),
            Some(Ordering::Less)
        );
        assert_eq!(Value::Long(5).compare(&Value::Double(4.5)), Some(Ordering::Greater));
    }

    #[test]
    fn test_set_equality_ignores_order() {
        let forward = Value::set(vec![Value::Int(1), Value::Int(2)]);
        let backward = Value::set(vec![Value::Int(2), Value::Long(1)]);
        assert!(forward.loose_eq(&backward));
        assert!(!forward.loose_eq(&Value::set(vec![Value::Int(1), Value::Int(3)])));
        assert!(!forward.loose_eq(&Value::set(vec![Value::Int(1)])));
        assert!(!Value::list(vec![Value::Int(1), Value::Int(2)])
            .loose_eq(&Value::list(vec![Value::Int(2), Value::Int(1)])));
    }

    #[test]
    fn test_three_way_puts_nan_last() {
        let nan = Value::Double(f64::NAN);
        assert_eq!(nan.compare(&Value::Double(1.0)), None);
        assert_eq!(nan.three_way(&Value::Double(1.0)), Some(Ordering::Greater));
        assert_eq!(Value::Int(7).three_way(&nan), Some(Ordering::Less));
        assert_eq!(nan.three_way(&Value::Double(f64::NAN)), Some(Ordering::Equal));
        assert_eq!(Value::Null.three_way(&nan), Some(Ordering::Less));
        assert_eq!(Value::Int(2).three_way(&Value::Long(1)), Some(Ordering::Greater));
    }

    #[test]
    fn test_set_drops_duplicates() {
        let set = Value::set(vec![Value::Int(1), Value::Long(1), Value::Int(2)]);
        assert_eq!(set.to_string(), "[1, 2]");
    }
}
