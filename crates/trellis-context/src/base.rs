//! The fixed `base` contributor: the language's built-in functions.
//!
//! It is always the first contributor of a merged context and cannot be
//! removed or shadowed by another contributor using the same name.

use trellis_core::{HostError, Signature, TypeRef, Value};

use crate::contributor::{FnContributor, args};

/// Reserved name of the base contributor.
pub const BASE: &str = "base";

/// Characters `[begin, end)` of `text`, counted in Unicode scalar values.
pub fn substring(text: &str, begin: i32, end: Option<i32>) -> Result<String, HostError> {
    let len = text.chars().count();
    let end = end.map_or(len as i64, i64::from);
    let begin = i64::from(begin);
    if begin < 0 || end < begin || end > len as i64 {
        return Err(HostError::new(format!(
            "substring range {begin}..{end} out of bounds for length {len}"
        )));
    }
    Ok(text
        .chars()
        .skip(begin as usize)
        .take((end - begin) as usize)
        .collect())
}

pub fn base_contributor() -> FnContributor {
    let mut base = FnContributor::new()
        .function(
            Signature::new("toString", vec![TypeRef::object()], TypeRef::string()),
            |a| Ok(Value::from(args::get(a, 0)?.to_string())),
        )
        .function(
            Signature::new(
                "substring",
                vec![TypeRef::string(), TypeRef::int(), TypeRef::int()],
                TypeRef::string(),
            ),
            |a| {
                let text = args::string(a, 0)?;
                Ok(Value::from(substring(
                    text,
                    args::int(a, 1)?,
                    Some(args::int(a, 2)?),
                )?))
            },
        )
        .function(
            Signature::new("isEmpty", vec![TypeRef::string()], TypeRef::boolean()),
            |a| {
                Ok(Value::Bool(match args::get(a, 0)? {
                    Value::Null => true,
                    _ => args::string(a, 0)?.is_empty(),
                }))
            },
        )
        .function(
            Signature::new("size", vec![TypeRef::class("Collection")], TypeRef::int()),
            |a| Ok(Value::Int(args::elements(a, 0)?.len() as i32)),
        )
        .function(
            Signature::new("abs", vec![TypeRef::int()], TypeRef::int()),
            |a| Ok(Value::Int(args::int(a, 0)?.wrapping_abs())),
        )
        .function(
            Signature::new("abs", vec![TypeRef::double()], TypeRef::double()),
            |a| Ok(Value::Double(args::double(a, 0)?.abs())),
        )
        .function(
            Signature::variadic(
                "join",
                vec![TypeRef::string()],
                TypeRef::object(),
                TypeRef::string(),
            ),
            |a| {
                let separator = args::string(a, 0)?;
                let parts: Vec<String> = args::elements(a, 1)?
                    .iter()
                    .map(ToString::to_string)
                    .collect();
                Ok(Value::from(parts.join(separator)))
            },
        )
        .function(
            Signature::variadic("concat", vec![], TypeRef::string(), TypeRef::string()),
            |a| {
                let mut out = String::new();
                for part in args::elements(a, 0)? {
                    if let Value::Str(s) = part {
                        out.push_str(s);
                    }
                }
                Ok(Value::from(out))
            },
        );

    let transforms: [(&str, fn(&str) -> String); 3] = [
        ("trim", |s: &str| s.trim().to_string()),
        ("toUpperCase", |s: &str| s.to_uppercase()),
        ("toLowerCase", |s: &str| s.to_lowercase()),
    ];
    for (name, transform) in transforms {
        base = base.function(
            Signature::new(name, vec![TypeRef::string()], TypeRef::string()),
            move |a| Ok(Value::from(transform(args::string(a, 0)?))),
        );
    }

    for (name, pick_first) in [("max", true), ("min", false)] {
        let choose = move |ordering: std::cmp::Ordering| {
            (ordering == std::cmp::Ordering::Greater) == pick_first
        };
        base = base
            .function(
                Signature::new(name, vec![TypeRef::int(), TypeRef::int()], TypeRef::int()),
                move |a| {
                    let (x, y) = (args::int(a, 0)?, args::int(a, 1)?);
                    Ok(Value::Int(if choose(x.cmp(&y)) { x } else { y }))
                },
            )
            .function(
                Signature::new(name, vec![TypeRef::long(), TypeRef::long()], TypeRef::long()),
                move |a| {
                    let (x, y) = (args::long(a, 0)?, args::long(a, 1)?);
                    Ok(Value::Long(if choose(x.cmp(&y)) { x } else { y }))
                },
            )
            .function(
                Signature::new(
                    name,
                    vec![TypeRef::double(), TypeRef::double()],
                    TypeRef::double(),
                ),
                move |a| {
                    let (x, y) = (args::double(a, 0)?, args::double(a, 1)?);
                    let ordering = x.total_cmp(&y);
                    Ok(Value::Double(if choose(ordering) { x } else { y }))
                },
            );
    }
    base
}
