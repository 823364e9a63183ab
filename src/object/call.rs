//! # Remote Calls

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One method invocation addressed to a distributed object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Call {
    /// Method name on the application object.
    pub method: String,

    /// Positional arguments as JSON values.
    pub args: Vec<Value>,
}

impl Call {
    /// Create a call.
    pub fn new(method: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            method: method.into(),
            args,
        }
    }

    /// Create a call with no arguments.
    pub fn nullary(method: impl Into<String>) -> Self {
        Self::new(method, Vec::new())
    }
}
