//! Transport sanitization of handler output.
//!
//! Handler return values are captured into a [`Captured`] tree, a JSON
//! superset with big integers and shareable (possibly cyclic) nodes, then
//! sanitized into plain JSON for the wire. Big integers become decimal
//! strings, a re-visited shared node becomes `"[Circular]"`, and recursion
//! past the depth limit becomes `"[Max depth reached]"`. Sanitization reads
//! a private copy only; the real return value is never mutated.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use serde_json::{Map, Value};

pub const DEFAULT_MAX_DEPTH: usize = 50;

pub const CIRCULAR_MARKER: &str = "[Circular]";
pub const MAX_DEPTH_MARKER: &str = "[Max depth reached]";
const UNSERIALIZABLE_MARKER: &str = "[Unserializable]";

/// A shareable node; two `SharedNode` clones alias the same value, which
/// is how aliasing and cycles are represented.
#[derive(Debug, Clone)]
pub struct SharedNode(Arc<Mutex<Captured>>);

impl SharedNode {
    pub fn new(value: Captured) -> Self {
        SharedNode(Arc::new(Mutex::new(value)))
    }

    pub fn set(&self, value: Captured) {
        if let Ok(mut slot) = self.0.lock() {
            *slot = value;
        }
    }

    fn identity(&self) -> usize {
        Arc::as_ptr(&self.0) as usize
    }
}

/// Captured handler output before sanitization.
#[derive(Debug, Clone)]
pub enum Captured {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    /// Arbitrary-precision integers are stringified for transport.
    BigInt(i128),
    Str(String),
    Array(Vec<Captured>),
    Object(Vec<(String, Captured)>),
    Shared(SharedNode),
}

impl From<Value> for Captured {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Captured::Null,
            Value::Bool(b) => Captured::Bool(b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Captured::Int(i)
                } else {
                    Captured::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            Value::String(s) => Captured::Str(s),
            Value::Array(items) => Captured::Array(items.into_iter().map(Into::into).collect()),
            Value::Object(map) => {
                Captured::Object(map.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
        }
    }
}

/// Conversion used by the wrapper runtime to capture a handler's result.
pub trait ToCaptured {
    fn to_captured(&self) -> Captured;
}

impl ToCaptured for Captured {
    fn to_captured(&self) -> Captured {
        self.clone()
    }
}

impl ToCaptured for Value {
    fn to_captured(&self) -> Captured {
        self.clone().into()
    }
}

impl ToCaptured for () {
    fn to_captured(&self) -> Captured {
        Captured::Null
    }
}

pub fn sanitize(value: &Captured) -> Value {
    sanitize_with_depth(value, DEFAULT_MAX_DEPTH)
}

pub fn sanitize_with_depth(value: &Captured, max_depth: usize) -> Value {
    // Visited identities are per call; a shared node stays marked once
    // seen, so sibling aliases are reported the same way as true cycles.
    let mut visited: HashSet<usize> = HashSet::new();
    sanitize_at(value, 0, max_depth, &mut visited)
}

fn sanitize_at(
    value: &Captured,
    depth: usize,
    max_depth: usize,
    visited: &mut HashSet<usize>,
) -> Value {
    match value {
        Captured::Null => Value::Null,
        Captured::Bool(b) => Value::Bool(*b),
        Captured::Int(i) => Value::from(*i),
        Captured::Float(f) => {
            // Non-finite numbers have no JSON form; mirror JSON.stringify.
            serde_json::Number::from_f64(*f).map(Value::Number).unwrap_or(Value::Null)
        }
        Captured::BigInt(n) => Value::String(n.to_string()),
        Captured::Str(s) => Value::String(s.clone()),
        Captured::Array(items) => {
            if depth >= max_depth {
                return Value::String(MAX_DEPTH_MARKER.to_string());
            }
            Value::Array(
                items
                    .iter()
                    .map(|item| sanitize_at(item, depth + 1, max_depth, visited))
                    .collect(),
            )
        }
        Captured::Object(fields) => {
            if depth >= max_depth {
                return Value::String(MAX_DEPTH_MARKER.to_string());
            }
            let mut map = Map::with_capacity(fields.len());
            for (key, field) in fields {
                map.insert(key.clone(), sanitize_at(field, depth + 1, max_depth, visited));
            }
            Value::Object(map)
        }
        Captured::Shared(node) => {
            if depth >= max_depth {
                return Value::String(MAX_DEPTH_MARKER.to_string());
            }
            if !visited.insert(node.identity()) {
                return Value::String(CIRCULAR_MARKER.to_string());
            }
            match node.0.lock() {
                Ok(inner) => sanitize_at(&inner, depth, max_depth, visited),
                // Isolated per field: a poisoned node becomes a placeholder,
                // never an error.
                Err(_) => Value::String(UNSERIALIZABLE_MARKER.to_string()),
            }
        }
    }
}
