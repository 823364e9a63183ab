//! # Key-Value Sample Object
//!
//! Minimal application object used by demos and the test suite.

use std::collections::HashMap;

use serde_json::Value;

use super::app::{AppFault, AppObject};

/// A key-value store over JSON values.
///
/// Methods: `set(key, value)`, `get(key)`, `delete(key)`, `len()`. `get` and
/// `delete` return `null` for absent keys; `set` and `delete` return the
/// previous value.
#[derive(Debug, Clone, Default)]
pub struct KeyValueObject {
    entries: HashMap<String, Value>,
}

impl KeyValueObject {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn key_arg<'a>(method: &str, args: &'a [Value]) -> Result<&'a str, AppFault> {
        args.first()
            .and_then(Value::as_str)
            .ok_or_else(|| AppFault::BadArguments {
                method: method.to_string(),
                reason: "expected a string key as the first argument".to_string(),
            })
    }
}

impl AppObject for KeyValueObject {
    fn invoke(&mut self, method: &str, args: &[Value]) -> Result<Value, AppFault> {
        match method {
            "get" => {
                let key = Self::key_arg(method, args)?;
                Ok(self.entries.get(key).cloned().unwrap_or(Value::Null))
            }
            "set" => {
                let key = Self::key_arg(method, args)?;
                let value = args.get(1).cloned().ok_or_else(|| AppFault::BadArguments {
                    method: method.to_string(),
                    reason: "expected a value as the second argument".to_string(),
                })?;
                Ok(self
                    .entries
                    .insert(key.to_string(), value)
                    .unwrap_or(Value::Null))
            }
            "delete" => {
                let key = Self::key_arg(method, args)?;
                Ok(self.entries.remove(key).unwrap_or(Value::Null))
            }
            "len" => Ok(Value::from(self.entries.len() as u64)),
            other => Err(AppFault::UnknownMethod(other.to_string())),
        }
    }

    fn clone_box(&self) -> Box<dyn AppObject> {
        Box::new(self.clone())
    }
}
