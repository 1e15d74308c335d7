//! Dynamic Values
//!
//! The reactive core operates on arbitrary object graphs. `Value` is the
//! dynamically typed currency: primitives are stored inline, containers are
//! shared handles ([`Object`], [`Array`]) with reference identity, so two
//! clones of the same handle are "the same object".
//!
//! Property reads on an [`Object`] go through tracked cells once the object
//! has been observed; see [`crate::reactive::observe`].

mod array;
mod object;

use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

use serde_json::{Map, Number, Value as Json};

pub use array::Array;
pub use object::Object;
pub(crate) use object::SlotInfo;

use crate::reactive::Observer;

/// Integers up to this magnitude round-trip through `f64` exactly.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

/// A dynamically typed value.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(Rc<str>),
    Object(Object),
    Array(Array),
}

impl Value {
    /// Identity comparison.
    ///
    /// Primitives compare by value and containers by reference. Two NaNs are
    /// considered the same value, so writing NaN over NaN is not a change.
    pub fn same_value(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            (Value::Array(a), Value::Array(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    /// True for objects and arrays.
    pub fn is_container(&self) -> bool {
        matches!(self, Value::Object(_) | Value::Array(_))
    }

    /// True for `Undefined` and `Null`.
    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(object) => Some(object),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Array> {
        match self {
            Value::Array(array) => Some(array),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// The observer marker attached to a container, if it has been observed.
    pub fn observer(&self) -> Option<Rc<Observer>> {
        match self {
            Value::Object(object) => object.observer(),
            Value::Array(array) => array.observer(),
            _ => None,
        }
    }

    /// Build a fresh (unobserved) value graph from JSON.
    pub fn from_json(json: &Json) -> Value {
        match json {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(*b),
            Json::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            Json::String(s) => Value::from(s.as_str()),
            Json::Array(items) => Value::Array(Array::from_vec(items.iter().map(Value::from_json).collect())),
            Json::Object(map) => Value::Object(Object::from_pairs(
                map.iter().map(|(k, v)| (k.clone(), Value::from_json(v))),
            )),
        }
    }

    /// Snapshot the value as JSON without registering dependencies.
    ///
    /// `Undefined`, non-finite numbers, and back-references to a container
    /// already on the current path serialize as `null`.
    pub fn to_json(&self) -> Json {
        let mut path = HashSet::new();
        self.to_json_inner(&mut path)
    }

    fn to_json_inner(&self, path: &mut HashSet<usize>) -> Json {
        match self {
            Value::Undefined | Value::Null => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Number(n) if n.fract() == 0.0 && n.abs() < MAX_SAFE_INTEGER => Json::from(*n as i64),
            Value::Number(n) => Number::from_f64(*n).map(Json::Number).unwrap_or(Json::Null),
            Value::String(s) => Json::String(s.to_string()),
            Value::Object(object) => {
                if !path.insert(object.addr()) {
                    return Json::Null;
                }
                let mut map = Map::new();
                for (key, value) in object.entries_untracked() {
                    map.insert(key, value.to_json_inner(path));
                }
                path.remove(&object.addr());
                Json::Object(map)
            }
            Value::Array(array) => {
                if !path.insert(array.addr()) {
                    return Json::Null;
                }
                let items = array.to_vec().iter().map(|v| v.to_json_inner(path)).collect();
                path.remove(&array.addr());
                Json::Array(items)
            }
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.same_value(other)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(Rc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(Rc::from(s))
    }
}

impl From<Object> for Value {
    fn from(object: Object) -> Self {
        Value::Object(object)
    }
}

impl From<Array> for Value {
    fn from(array: Array) -> Self {
        Value::Array(array)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => f.write_str("Undefined"),
            Value::Null => f.write_str("Null"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Number(n) => write!(f, "Number({n})"),
            Value::String(s) => write!(f, "String({s:?})"),
            Value::Object(object) => fmt::Debug::fmt(object, f),
            Value::Array(array) => fmt::Debug::fmt(array, f),
        }
    }
}

/// String conversion in the loose scripting sense. Used by the default
/// array sort.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => f.write_str("undefined"),
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) if n.is_nan() => f.write_str("NaN"),
            Value::Number(n) if n.is_infinite() => {
                f.write_str(if *n > 0.0 { "Infinity" } else { "-Infinity" })
            }
            Value::Number(n) if n.fract() == 0.0 && n.abs() < MAX_SAFE_INTEGER => write!(f, "{}", *n as i64),
            Value::Number(n) => write!(f, "{n}"),
            Value::String(s) => f.write_str(s),
            Value::Object(_) => f.write_str("[object Object]"),
            Value::Array(array) => {
                for (i, item) in array.to_vec().iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    if !item.is_nullish() {
                        write!(f, "{item}")?;
                    }
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn nan_is_the_same_value_as_nan() {
        assert!(Value::from(f64::NAN).same_value(&Value::from(f64::NAN)));
        assert!(!Value::from(f64::NAN).same_value(&Value::from(0.0)));
    }

    #[test]
    fn containers_compare_by_identity() {
        let a = Value::Object(Object::new());
        let b = Value::Object(Object::new());
        assert!(a.same_value(&a.clone()));
        assert!(!a.same_value(&b));
    }

    #[test]
    fn strings_compare_by_content() {
        assert_eq!(Value::from("abc"), Value::from(String::from("abc")));
    }

    #[test]
    fn json_conversion_preserves_shape() {
        let source = json!({ "a": { "b": [1, 2, { "c": "x" }] }, "d": null, "e": true });
        let value = Value::from_json(&source);
        assert_eq!(value.to_json(), source);
    }

    #[test]
    fn cyclic_graphs_serialize_back_references_as_null() {
        let object = Object::new();
        object.set("self", Value::Object(object.clone()));
        object.set("n", 1.into());

        assert_eq!(Value::Object(object).to_json(), json!({ "self": null, "n": 1 }));
    }

    #[test]
    fn display_follows_loose_string_conversion() {
        assert_eq!(Value::from(3).to_string(), "3");
        assert_eq!(Value::from(1.5).to_string(), "1.5");
        assert_eq!(Value::from(f64::NAN).to_string(), "NaN");
        let array = Array::from_vec(vec![1.into(), Value::Null, "x".into()]);
        assert_eq!(Value::Array(array).to_string(), "1,,x");
    }
}
