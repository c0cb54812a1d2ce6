use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use futures::FutureExt;
use serde_json::Value;

use crate::errors::{AdapterError, AdapterResult, ToolExecutionError, ToolResult};
use crate::models::tool::{Tool, ToolCall, ToolOutcome};

/// Caller-supplied implementation of one tool.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, arguments: Value) -> ToolResult<Value>;
}

struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> ToolHandler for FnHandler<F>
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ToolResult<Value>> + Send + 'static,
{
    async fn call(&self, arguments: Value) -> ToolResult<Value> {
        (self.0)(arguments).await
    }
}

/// Tool definitions plus the handlers that execute them.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: Vec<Tool>,
    handlers: HashMap<String, Arc<dyn ToolHandler>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<H: ToolHandler + 'static>(&mut self, tool: Tool, handler: H) -> AdapterResult<()> {
        if self.handlers.contains_key(&tool.name) {
            return Err(AdapterError::Validation(format!(
                "Duplicate tool name: {}",
                tool.name
            )));
        }
        self.handlers.insert(tool.name.clone(), Arc::new(handler));
        self.tools.push(tool);
        Ok(())
    }

    pub fn register_fn<F, Fut>(&mut self, tool: Tool, f: F) -> AdapterResult<()>
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ToolResult<Value>> + Send + 'static,
    {
        self.register(tool, FnHandler(f))
    }

    pub fn tools(&self) -> &[Tool] {
        &self.tools
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Run every call concurrently. Results come back in call order and a
    /// failing call never affects its siblings.
    pub async fn dispatch(&self, calls: &[ToolCall]) -> Vec<ToolOutcome> {
        join_all(calls.iter().map(|call| async move {
            let result = AssertUnwindSafe(self.dispatch_one(call))
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| {
                    Err(ToolExecutionError::ExecutionError(format!(
                        "Tool {} panicked: {}",
                        call.name,
                        panic_message(panic.as_ref())
                    )))
                });
            if let Err(e) = &result {
                tracing::warn!(tool = %call.name, id = %call.id, "tool call failed: {}", e);
            }
            ToolOutcome {
                call: call.clone(),
                result,
            }
        }))
        .await
    }

    async fn dispatch_one(&self, call: &ToolCall) -> ToolResult<Value> {
        let handler = self
            .handlers
            .get(&call.name)
            .ok_or_else(|| ToolExecutionError::ToolNotFound(call.name.clone()))?;

        if !call.arguments.is_object() {
            return Err(ToolExecutionError::InvalidParameters(format!(
                "Could not interpret tool use parameters for id {}: {}",
                call.id, call.arguments
            )));
        }
        handler.call(call.arguments.clone()).await
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.tools.iter().map(|t| &t.name).collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Upper;

    #[async_trait]
    impl ToolHandler for Upper {
        async fn call(&self, arguments: Value) -> ToolResult<Value> {
            let text = arguments["text"].as_str().ok_or_else(|| {
                ToolExecutionError::InvalidParameters("text is required".to_string())
            })?;
            Ok(json!(text.to_uppercase()))
        }
    }

    struct Explode;

    #[async_trait]
    impl ToolHandler for Explode {
        async fn call(&self, _arguments: Value) -> ToolResult<Value> {
            panic!("handler blew up")
        }
    }

    fn registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry
            .register(Tool::new("upper", "Uppercase text", json!({"type": "object"})), Upper)
            .unwrap();
        registry
            .register_fn(
                Tool::new("fail", "Always fails", json!({"type": "object"})),
                |_| async { Err(ToolExecutionError::ExecutionError("boom".to_string())) },
            )
            .unwrap();
        registry
    }

    #[test]
    fn test_duplicate_registration() {
        let mut registry = registry();
        let result = registry.register(Tool::new("upper", "again", json!({})), Upper);
        assert!(matches!(result, Err(AdapterError::Validation(_))));
        assert_eq!(registry.tools().len(), 2);
    }

    #[tokio::test]
    async fn test_dispatch_isolates_failures() {
        let calls = vec![
            ToolCall::new("1", "fail", json!({})),
            ToolCall::new("2", "upper", json!({"text": "ok"})),
            ToolCall::new("3", "missing", json!({})),
            ToolCall::new("4", "upper", json!("not an object")),
            ToolCall::new("5", "upper", json!({})),
        ];

        let outcomes = registry().dispatch(&calls).await;
        let ids: Vec<_> = outcomes.iter().map(|o| o.call.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2", "3", "4", "5"]);

        assert_eq!(
            outcomes[0].result,
            Err(ToolExecutionError::ExecutionError("boom".to_string()))
        );
        assert_eq!(outcomes[1].result, Ok(json!("OK")));
        assert_eq!(
            outcomes[2].result,
            Err(ToolExecutionError::ToolNotFound("missing".to_string()))
        );
        assert!(matches!(
            outcomes[3].result,
            Err(ToolExecutionError::InvalidParameters(_))
        ));
        assert!(matches!(
            outcomes[4].result,
            Err(ToolExecutionError::InvalidParameters(_))
        ));
    }

    #[tokio::test]
    async fn test_panicking_handler_is_contained() {
        let mut registry = registry();
        registry
            .register(Tool::new("explode", "Panics", json!({"type": "object"})), Explode)
            .unwrap();

        let calls = vec![
            ToolCall::new("1", "upper", json!({"text": "a"})),
            ToolCall::new("2", "explode", json!({})),
            ToolCall::new("3", "upper", json!({"text": "b"})),
        ];
        let outcomes = registry.dispatch(&calls).await;

        assert_eq!(outcomes.len(), 3);
        assert_eq!(outcomes[0].result, Ok(json!("A")));
        match &outcomes[1].result {
            Err(ToolExecutionError::ExecutionError(message)) => {
                assert!(message.contains("handler blew up"))
            }
            other => panic!("unexpected result {:?}", other),
        }
        assert_eq!(outcomes[2].result, Ok(json!("B")));
    }
}
