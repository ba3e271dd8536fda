//! Cache key encoding.

use crate::executor::Args;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::Write as _;

/// Canonical key for a (command, arguments) pair.
///
/// No arguments and an empty argument map both encode to the bare command
/// name; otherwise the key is `command:<json>` with object keys sorted at every
/// depth, so argument maps built in different orders share a key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(command: &str, args: Option<&Args>) -> Self {
        Self(encode(command, args))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when this key is `command` itself or one of its argument variants.
    pub fn belongs_to(&self, command: &str) -> bool {
        belongs_to(&self.0, command)
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Encodes a cache key; see [`CacheKey`].
pub fn encode(command: &str, args: Option<&Args>) -> String {
    match args {
        Some(args) if !args.is_empty() => {
            let mut out = String::with_capacity(command.len() + 32);
            out.push_str(command);
            out.push(':');
            write_object(args, &mut out);
            out
        }
        _ => command.to_string(),
    }
}

pub(crate) fn belongs_to(key: &str, command: &str) -> bool {
    match key.strip_prefix(command) {
        Some(rest) => rest.is_empty() || rest.starts_with(':'),
        None => false,
    }
}

fn write_object(map: &Args, out: &mut String) {
    let mut keys: Vec<&String> = map.keys().collect();
    keys.sort();
    out.push('{');
    for (i, k) in keys.into_iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        write_string(k, out);
        out.push(':');
        if let Some(v) = map.get(k) {
            write_value(v, out);
        }
    }
    out.push('}');
}

fn write_value(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => write_object(map, out),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(item, out);
            }
            out.push(']');
        }
        Value::String(s) => write_string(s, out),
        scalar => {
            let _ = write!(out, "{}", scalar);
        }
    }
}

fn write_string(s: &str, out: &mut String) {
    let _ = write!(out, "{}", Value::String(s.to_string()));
}
