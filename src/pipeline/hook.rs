//! Optional pre/post validation hook.
//!
//! Hooks are advisory: a failing hook is logged and counted, and the call
//! carries on. A hook can observe content but never change it.

use std::future::Future;
use std::pin::Pin;

use serde_json::Value;

use crate::error::{Result, SanitizeError};

/// Future returned by hook methods.
pub type HookFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

/// Observes values entering and leaving the pipeline.
pub trait ValidationHook: Send + Sync {
    /// Called with the raw input before any stage runs
    fn before<'a>(&'a self, input: &'a Value) -> HookFuture<'a>;

    /// Called with the sanitized output
    fn after<'a>(&'a self, output: &'a Value) -> HookFuture<'a>;
}

/// Flags oversized arrays and objects.
#[derive(Debug, Clone, Copy)]
pub struct ShapeHook {
    /// Largest array or object accepted without complaint
    pub max_collection_len: usize,
}

impl Default for ShapeHook {
    fn default() -> Self {
        Self {
            max_collection_len: 10_000,
        }
    }
}

impl ShapeHook {
    fn check(&self, value: &Value) -> Result<()> {
        let len = match value {
            Value::Array(items) => items.len(),
            Value::Object(map) => map.len(),
            _ => return Ok(()),
        };
        if len > self.max_collection_len {
            return Err(SanitizeError::Hook(format!(
                "collection of {len} entries exceeds {}",
                self.max_collection_len
            )));
        }
        match value {
            Value::Array(items) => items.iter().try_for_each(|v| self.check(v)),
            Value::Object(map) => map.values().try_for_each(|v| self.check(v)),
            _ => Ok(()),
        }
    }
}

impl ValidationHook for ShapeHook {
    fn before<'a>(&'a self, input: &'a Value) -> HookFuture<'a> {
        Box::pin(async move { self.check(input) })
    }

    fn after<'a>(&'a self, output: &'a Value) -> HookFuture<'a> {
        Box::pin(async move { self.check(output) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_shape_hook() {
        let hook = ShapeHook {
            max_collection_len: 2,
        };
        assert!(hook.before(&json!({"a": [1, 2]})).await.is_ok());
        assert!(hook.before(&json!({"a": [1, 2, 3]})).await.is_err());
        assert!(hook.after(&json!("plain")).await.is_ok());
    }
}
