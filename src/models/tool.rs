use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::ToolExecutionError;

/// A tool the model may call, described by a JSON schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tool {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

impl Tool {
    pub fn new<N, D>(name: N, description: D, input_schema: Value) -> Self
    where
        N: Into<String>,
        D: Into<String>,
    {
        Tool {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }
}

/// A call the model asked for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

impl ToolCall {
    pub fn new<I: Into<String>, S: Into<String>>(id: I, name: S, arguments: Value) -> Self {
        ToolCall {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// The result of dispatching one tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutcome {
    pub call: ToolCall,
    pub result: Result<Value, ToolExecutionError>,
}

impl ToolOutcome {
    /// Text sent back to the model for this call.
    pub fn output_text(&self) -> String {
        match &self.result {
            Ok(Value::String(text)) => text.clone(),
            Ok(value) => value.to_string(),
            Err(e) => format!("The tool call returned the following error:\n{}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_output_text() {
        let call = ToolCall::new("call_1", "echo", json!({"text": "hi"}));

        let ok = ToolOutcome {
            call: call.clone(),
            result: Ok(json!("hi")),
        };
        assert_eq!(ok.output_text(), "hi");

        let structured = ToolOutcome {
            call: call.clone(),
            result: Ok(json!({"temp": 21})),
        };
        assert_eq!(structured.output_text(), "{\"temp\":21}");

        let failed = ToolOutcome {
            call,
            result: Err(ToolExecutionError::ExecutionError("boom".to_string())),
        };
        assert!(failed.output_text().ends_with("Tool execution failed: boom"));
    }
}
