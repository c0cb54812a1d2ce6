use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::errors::{AdapterError, AdapterResult};
use crate::models::response::TokenUsage;
use crate::models::tool::{Tool, ToolCall};

lazy_static! {
    static ref INVALID_NAME_CHARS: Regex = Regex::new(r"[^a-zA-Z0-9_-]").unwrap();
    static ref VALID_NAME: Regex = Regex::new(r"^[a-zA-Z0-9_-]+$").unwrap();
}

pub fn create_object_id(prefix: &str) -> String {
    format!("{}_{}", prefix, Uuid::new_v4().simple())
}

/// Reject an empty credential before any request is built.
pub fn require_api_key(provider: &str, api_key: &str) -> AdapterResult<()> {
    if api_key.trim().is_empty() {
        return Err(AdapterError::Validation(format!(
            "{} requires an API key",
            provider
        )));
    }
    Ok(())
}

pub fn sanitize_function_name(name: &str) -> String {
    INVALID_NAME_CHARS.replace_all(name, "_").to_string()
}

pub fn is_valid_function_name(name: &str) -> bool {
    VALID_NAME.is_match(name)
}

/// Convert tools to the OpenAI function-calling specification
pub fn tools_to_openai_spec(tools: &[Tool]) -> AdapterResult<Vec<Value>> {
    let mut tool_names = std::collections::HashSet::new();
    let mut result = Vec::new();

    for tool in tools {
        if !tool_names.insert(&tool.name) {
            return Err(AdapterError::Validation(format!(
                "Duplicate tool name: {}",
                tool.name
            )));
        }

        result.push(json!({
            "type": "function",
            "function": {
                "name": tool.name,
                "description": tool.description,
                "parameters": tool.input_schema,
            }
        }));
    }

    Ok(result)
}

/// Parse OpenAI-style `tool_calls`. Arguments that are not valid JSON are
/// kept as a raw string so the dispatcher can report them per call.
pub fn openai_tool_calls(tool_calls: &Value) -> Vec<ToolCall> {
    let Some(calls) = tool_calls.as_array() else {
        return Vec::new();
    };

    calls
        .iter()
        .map(|call| {
            let id = call["id"]
                .as_str()
                .map(String::from)
                .unwrap_or_else(|| create_object_id("call"));
            let name = call["function"]["name"]
                .as_str()
                .unwrap_or_default()
                .to_string();
            let arguments = match &call["function"]["arguments"] {
                Value::String(raw) => {
                    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.clone()))
                }
                Value::Null => json!({}),
                other => other.clone(),
            };
            ToolCall::new(id, name, arguments)
        })
        .collect()
}

/// Read a token count pair from a usage object, if either field is present.
pub fn token_usage(usage: &Value, input_key: &str, output_key: &str) -> Option<TokenUsage> {
    let input = usage.get(input_key).and_then(Value::as_u64);
    let output = usage.get(output_key).and_then(Value::as_u64);
    if input.is_none() && output.is_none() {
        return None;
    }
    Some(TokenUsage::new(input.unwrap_or(0), output.unwrap_or(0)))
}

/// Payload of an SSE `data:` line, `None` for any other line.
pub fn sse_data(line: &str) -> Option<&str> {
    let data = line.strip_prefix("data:")?;
    Some(data.strip_prefix(' ').unwrap_or(data).trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_object_id() {
        let id = create_object_id("resp");
        assert!(id.starts_with("resp_"));
        assert_eq!(id.len(), "resp_".len() + 32);
        assert_ne!(id, create_object_id("resp"));
    }

    #[test]
    fn test_require_api_key() {
        assert!(require_api_key("OpenAI", "sk-1").is_ok());
        assert!(matches!(
            require_api_key("OpenAI", "  "),
            Err(AdapterError::Validation(_))
        ));
    }

    #[test]
    fn test_sanitize_function_name() {
        assert_eq!(sanitize_function_name("hello-world"), "hello-world");
        assert_eq!(sanitize_function_name("hello world"), "hello_world");
        assert_eq!(sanitize_function_name("hello@world"), "hello_world");
    }

    #[test]
    fn test_is_valid_function_name() {
        assert!(is_valid_function_name("hello-world"));
        assert!(is_valid_function_name("hello_world"));
        assert!(!is_valid_function_name("hello world"));
        assert!(!is_valid_function_name("hello@world"));
        assert!(!is_valid_function_name(""));
    }

    #[test]
    fn test_tools_to_openai_spec() -> AdapterResult<()> {
        let tool = Tool::new(
            "test_tool",
            "A test tool",
            json!({
                "type": "object",
                "properties": {
                    "input": {"type": "string", "description": "Test parameter"}
                },
                "required": ["input"]
            }),
        );

        let spec = tools_to_openai_spec(&[tool.clone()])?;
        assert_eq!(spec.len(), 1);
        assert_eq!(spec[0]["type"], "function");
        assert_eq!(spec[0]["function"]["name"], "test_tool");

        let result = tools_to_openai_spec(&[tool.clone(), tool]);
        assert!(matches!(result, Err(AdapterError::Validation(_))));
        Ok(())
    }

    #[test]
    fn test_openai_tool_calls() {
        let calls = openai_tool_calls(&json!([
            {"id": "1", "function": {"name": "example_fn", "arguments": "{\"param\": \"value\"}"}},
            {"id": "2", "function": {"name": "broken", "arguments": "{not json"}}
        ]));
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].arguments, json!({"param": "value"}));
        assert_eq!(calls[1].arguments, json!("{not json"));
        assert!(openai_tool_calls(&Value::Null).is_empty());
    }

    #[test]
    fn test_sse_data() {
        assert_eq!(sse_data("data: {\"a\":1}"), Some("{\"a\":1}"));
        assert_eq!(sse_data("data:[DONE]\r"), Some("[DONE]"));
        assert_eq!(sse_data("event: ping"), None);
        assert_eq!(sse_data(": keep-alive"), None);
    }
}
