//! Template arguments given on the command line.

use serde_json::Value as Json;
use trellis_core::Value;

/// Interpret one command-line argument. Valid JSON maps onto the nearest
/// runtime value; any other text is passed as a string.
pub fn parse_argument(text: &str) -> Value {
    match serde_json::from_str::<Json>(text) {
        Ok(json) => from_json(json),
        Err(_) => Value::from(text),
    }
}

pub fn from_json(json: Json) -> Value {
    match json {
        Json::Null => Value::Null,
        Json::Bool(b) => Value::Bool(b),
        Json::Number(n) => match n.as_i64() {
            Some(n) => i32::try_from(n).map_or(Value::Long(n), Value::Int),
            None => n.as_f64().map_or(Value::Null, Value::Double),
        },
        Json::String(s) => Value::from(s),
        Json::Array(items) => Value::list(items.into_iter().map(from_json).collect()),
        // Objects have no runtime counterpart beyond their text.
        Json::Object(map) => Value::from(Json::Object(map).to_string()),
    }
}
