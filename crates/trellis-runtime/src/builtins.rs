//! Methods of the built-in classes.
//!
//! Dispatch is by the runtime value and the method's name and arity, so a
//! method resolved statically on a supertype (`Object.toString`,
//! `CharSequence.length`) runs the receiver's own implementation.

use std::cmp::Ordering;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use trellis_context::base::substring;
use trellis_context::contributor::args;
use trellis_core::unit::MethodRef;
use trellis_core::{HostError, TypeRef, Value};

fn ordering_value(ordering: Ordering) -> Value {
    Value::Int(match ordering {
        Ordering::Less => -1,
        Ordering::Equal => 0,
        Ordering::Greater => 1,
    })
}

fn hash_code(value: &Value) -> i32 {
    let mut hasher = DefaultHasher::new();
    value.to_string().hash(&mut hasher);
    hasher.finish() as i32
}

fn no_method(receiver: &Value, name: &str, argc: usize) -> HostError {
    let class = receiver
        .runtime_type()
        .map_or_else(|| "null".to_string(), |ty| ty.to_string());
    HostError::new(format!("`{class}` has no method `{name}` taking {argc} argument(s)"))
}

fn compare_to(receiver: &Value, other: &Value) -> Result<Value, HostError> {
    if other.is_null() {
        return Err(HostError::new("compareTo(null)"));
    }
    receiver
        .three_way(other)
        .map(ordering_value)
        .ok_or_else(|| HostError::new(format!("cannot compare {receiver} with {other}")))
}

/// Position of `needle` in `haystack`, counted in characters.
fn char_index(haystack: &str, needle: &str) -> i32 {
    haystack
        .find(needle)
        .map_or(-1, |byte| haystack[..byte].chars().count() as i32)
}

fn string_method(text: &str, name: &str, a: &[Value]) -> Option<Result<Value, HostError>> {
    let result = match (name, a.len()) {
        ("length", 0) => Ok(Value::Int(text.chars().count() as i32)),
        ("isEmpty", 0) => Ok(Value::Bool(text.is_empty())),
        ("toUpperCase", 0) => Ok(Value::from(text.to_uppercase())),
        ("toLowerCase", 0) => Ok(Value::from(text.to_lowercase())),
        ("trim", 0) => Ok(Value::from(text.trim())),
        ("substring", 1) => {
            args::int(a, 0).and_then(|begin| substring(text, begin, None).map(Value::from))
        }
        ("substring", 2) => args::int(a, 0).and_then(|begin| {
            substring(text, begin, Some(args::int(a, 1)?)).map(Value::from)
        }),
        ("contains", 1) => args::string(a, 0).map(|s| Value::Bool(text.contains(s))),
        ("startsWith", 1) => args::string(a, 0).map(|s| Value::Bool(text.starts_with(s))),
        ("endsWith", 1) => args::string(a, 0).map(|s| Value::Bool(text.ends_with(s))),
        ("indexOf", 1) => args::string(a, 0).map(|s| Value::Int(char_index(text, s))),
        ("concat", 1) => args::string(a, 0).map(|s| Value::from(format!("{text}{s}"))),
        ("replace", 2) => args::string(a, 0)
            .and_then(|from| Ok(Value::from(text.replace(from, args::string(a, 1)?)))),
        ("split", 1) => args::string(a, 0).map(|separator| Value::Array {
            elem: TypeRef::string(),
            items: Arc::new(text.split(separator).map(Value::from).collect()),
        }),
        _ => return None,
    };
    Some(result)
}

fn number_method(receiver: &Value, name: &str, argc: usize) -> Option<Value> {
    Some(match (name, argc) {
        ("intValue", 0) => Value::Int(match receiver {
            Value::Double(n) => *n as i32,
            other => other.as_i64()? as i32,
        }),
        ("longValue", 0) => Value::Long(match receiver {
            Value::Double(n) => *n as i64,
            other => other.as_i64()?,
        }),
        ("doubleValue", 0) => Value::Double(receiver.as_f64()?),
        _ => return None,
    })
}

fn collection_method(receiver: &Value, items: &[Value], name: &str, a: &[Value]) -> Option<Result<Value, HostError>> {
    let is_list = matches!(receiver, Value::List(_));
    let result = match (name, a.len()) {
        ("size", 0) => Ok(Value::Int(items.len() as i32)),
        ("isEmpty", 0) => Ok(Value::Bool(items.is_empty())),
        ("contains", 1) => Ok(Value::Bool(items.iter().any(|item| item.loose_eq(&a[0])))),
        ("get", 1) if is_list => args::int(a, 0).and_then(|index| {
            usize::try_from(index)
                .ok()
                .and_then(|i| items.get(i))
                .cloned()
                .ok_or_else(|| {
                    HostError::new(format!("index {index} out of bounds for length {}", items.len()))
                })
        }),
        ("indexOf", 1) if is_list => Ok(Value::Int(
            items
                .iter()
                .position(|item| item.loose_eq(&a[0]))
                .map_or(-1, |i| i as i32),
        )),
        ("subList", 2) if is_list => args::int(a, 0).and_then(|from| {
            let to = args::int(a, 1)?;
            match (usize::try_from(from), usize::try_from(to)) {
                (Ok(from), Ok(to)) if from <= to && to <= items.len() => {
                    Ok(Value::list(items[from..to].to_vec()))
                }
                _ => Err(HostError::new(format!(
                    "subList({from}, {to}) out of bounds for length {}",
                    items.len()
                ))),
            }
        }),
        _ => return None,
    };
    Some(result)
}

/// Run `method` on `receiver`, which must not be `null`.
pub fn invoke_method(receiver: &Value, method: &MethodRef, args: Vec<Value>) -> Result<Value, HostError> {
    let name = method.signature.name.as_str();
    let own = match receiver {
        Value::Null => {
            return Err(HostError::new(format!("cannot call `{name}` on null")));
        }
        Value::Object(object) if !matches!(name, "toString" | "equals" | "hashCode") => {
            return object.invoke(name, args);
        }
        Value::Str(text) => string_method(text, name, &args),
        Value::Int(_) | Value::Long(_) | Value::Double(_) => {
            number_method(receiver, name, args.len()).map(Ok)
        }
        Value::Bool(b) if name == "booleanValue" && args.is_empty() => Some(Ok(Value::Bool(*b))),
        Value::List(items) | Value::Set(items) => collection_method(receiver, items, name, &args),
        _ => None,
    };
    if let Some(result) = own {
        return result;
    }
    match (name, args.as_slice()) {
        ("toString", []) => Ok(Value::from(receiver.to_string())),
        ("equals", [other]) => Ok(Value::Bool(receiver.loose_eq(other))),
        ("hashCode", []) => Ok(Value::Int(hash_code(receiver))),
        ("compareTo", [other]) => compare_to(receiver, other),
        _ => Err(no_method(receiver, name, args.len())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_core::Signature;

    fn call(receiver: Value, name: &str, args: Vec<Value>) -> Result<Value, HostError> {
        let method = MethodRef {
            owner: "Object".into(),
            signature: Signature::new(name, vec![TypeRef::object(); args.len()], TypeRef::object()),
        };
        invoke_method(&receiver, &method, args)
    }

    #[test]
    fn test_string_methods_count_characters() {
        let text = Value::from("héllo wörld");
        assert_eq!(call(text.clone(), "length", vec![]).unwrap(), Value::Int(11));
        assert_eq!(
            call(text.clone(), "indexOf", vec![Value::from("wö")]).unwrap(),
            Value::Int(6)
        );
        assert_eq!(
            call(text.clone(), "substring", vec![Value::Int(1), Value::Int(4)]).unwrap(),
            Value::from("éll")
        );
        assert!(call(text, "substring", vec![Value::Int(20)]).is_err());
    }

    #[test]
    fn test_object_methods_apply_to_every_value() {
        assert_eq!(
            call(Value::Int(42), "toString", vec![]).unwrap(),
            Value::from("42")
        );
        assert_eq!(
            call(Value::list(vec![Value::Int(1)]), "equals", vec![Value::list(vec![Value::Long(1)])])
                .unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            call(Value::from("abc"), "compareTo", vec![Value::from("abd")]).unwrap(),
            Value::Int(-1)
        );
    }

    #[test]
    fn test_list_access_is_bounds_checked() {
        let list = Value::list(vec![Value::from("a"), Value::from("b")]);
        assert_eq!(call(list.clone(), "get", vec![Value::Int(1)]).unwrap(), Value::from("b"));
        let err = call(list.clone(), "get", vec![Value::Int(2)]).unwrap_err();
        assert_eq!(err.message, "index 2 out of bounds for length 2");
        assert_eq!(call(list, "size", vec![]).unwrap(), Value::Int(2));
    }

    #[test]
    fn test_null_receiver_and_unknown_methods_fail() {
        assert!(call(Value::Null, "toString", vec![]).is_err());
        let err = call(Value::Bool(true), "shout", vec![]).unwrap_err();
        assert_eq!(err.message, "`Boolean` has no method `shout` taking 0 argument(s)");
    }
}
