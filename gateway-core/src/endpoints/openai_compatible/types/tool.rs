//! Tool definitions, tool choice, and tool calls in the OpenAI-compatible format.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, ErrorDetails};
use crate::inference::types::{ToolCallPart, ToolChoice, ToolDescriptor};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OpenAICompatibleToolType {
    #[default]
    Function,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct OpenAICompatibleTool {
    #[serde(default)]
    pub r#type: OpenAICompatibleToolType,
    pub function: OpenAICompatibleFunction,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct OpenAICompatibleFunction {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default = "empty_object_schema")]
    pub parameters: Value,
}

fn empty_object_schema() -> Value {
    serde_json::json!({"type": "object", "properties": {}})
}

impl From<OpenAICompatibleTool> for ToolDescriptor {
    fn from(tool: OpenAICompatibleTool) -> Self {
        ToolDescriptor {
            name: tool.function.name,
            description: tool.function.description,
            input_schema: tool.function.parameters,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OpenAICompatibleToolChoiceMode {
    None,
    Auto,
    Required,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct OpenAICompatibleNamedToolChoice {
    #[serde(default)]
    pub r#type: OpenAICompatibleToolType,
    pub function: OpenAICompatibleFunctionName,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct OpenAICompatibleFunctionName {
    pub name: String,
}

/// Either `"none" | "auto" | "required"` or `{"type": "function", "function": {"name": ...}}`.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum OpenAICompatibleToolChoice {
    Mode(OpenAICompatibleToolChoiceMode),
    Named(OpenAICompatibleNamedToolChoice),
}

impl From<OpenAICompatibleToolChoice> for ToolChoice {
    fn from(choice: OpenAICompatibleToolChoice) -> Self {
        match choice {
            OpenAICompatibleToolChoice::Mode(OpenAICompatibleToolChoiceMode::None) => {
                ToolChoice::None
            }
            OpenAICompatibleToolChoice::Mode(OpenAICompatibleToolChoiceMode::Auto) => {
                ToolChoice::Auto
            }
            OpenAICompatibleToolChoice::Mode(OpenAICompatibleToolChoiceMode::Required) => {
                ToolChoice::Required
            }
            OpenAICompatibleToolChoice::Named(named) => ToolChoice::Tool {
                tool_name: named.function.name,
            },
        }
    }
}

/// A complete tool call, as found in an assistant message.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct OpenAICompatibleToolCall {
    pub id: String,
    #[serde(default)]
    pub r#type: OpenAICompatibleToolType,
    pub function: OpenAICompatibleFunctionCall,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct OpenAICompatibleFunctionCall {
    pub name: String,
    /// JSON-encoded arguments.
    pub arguments: String,
}

impl OpenAICompatibleToolCall {
    pub fn to_tool_call_part(&self) -> Result<ToolCallPart, Error> {
        // Some clients send an empty string for tools that take no arguments.
        let input = if self.function.arguments.trim().is_empty() {
            Value::Object(Default::default())
        } else {
            serde_json::from_str(&self.function.arguments).map_err(|e| {
                Error::new(ErrorDetails::InvalidToolCallArguments {
                    tool_call_id: self.id.clone(),
                    message: e.to_string(),
                })
            })?
        };
        Ok(ToolCallPart {
            tool_call_id: self.id.clone(),
            tool_name: self.function.name.clone(),
            input,
        })
    }
}

impl From<&ToolCallPart> for OpenAICompatibleToolCall {
    fn from(part: &ToolCallPart) -> Self {
        OpenAICompatibleToolCall {
            id: part.tool_call_id.clone(),
            r#type: OpenAICompatibleToolType::Function,
            function: OpenAICompatibleFunctionCall {
                name: part.tool_name.clone(),
                arguments: part.input.to_string(),
            },
        }
    }
}

/// A tool call inside a streamed delta. Each streamed call is already complete.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OpenAICompatibleToolCallChunk {
    pub id: String,
    pub index: usize,
    pub r#type: OpenAICompatibleToolType,
    pub function: OpenAICompatibleFunctionCall,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_tool_schema_is_passed_through() {
        let schema = json!({
            "type": "object",
            "properties": {"city": {"type": "string", "format": "custom-format"}},
            "required": ["city"],
            "additionalProperties": false
        });
        let tool: OpenAICompatibleTool = serde_json::from_value(json!({
            "type": "function",
            "function": {
                "name": "get_weather",
                "description": "Current weather",
                "parameters": schema.clone()
            }
        }))
        .unwrap();
        let descriptor = ToolDescriptor::from(tool);
        assert_eq!(descriptor.name, "get_weather");
        assert_eq!(descriptor.description.as_deref(), Some("Current weather"));
        assert_eq!(descriptor.input_schema, schema);
    }

    #[test]
    fn test_tool_choice_conversion() {
        let cases = [
            (json!("none"), ToolChoice::None),
            (json!("auto"), ToolChoice::Auto),
            (json!("required"), ToolChoice::Required),
            (
                json!({"type": "function", "function": {"name": "get_weather"}}),
                ToolChoice::Tool {
                    tool_name: "get_weather".to_string(),
                },
            ),
        ];
        for (wire, expected) in cases {
            let choice: OpenAICompatibleToolChoice = serde_json::from_value(wire).unwrap();
            assert_eq!(ToolChoice::from(choice), expected);
        }
        assert!(serde_json::from_value::<OpenAICompatibleToolChoice>(json!("sometimes")).is_err());
    }

    #[test]
    fn test_invalid_tool_call_arguments() {
        let call = OpenAICompatibleToolCall {
            id: "call_1".to_string(),
            r#type: OpenAICompatibleToolType::Function,
            function: OpenAICompatibleFunctionCall {
                name: "get_weather".to_string(),
                arguments: "{\"city\":".to_string(),
            },
        };
        let err = call.to_tool_call_part().unwrap_err();
        assert!(matches!(
            err.get_details(),
            ErrorDetails::InvalidToolCallArguments { tool_call_id, .. } if tool_call_id == "call_1"
        ));
    }

    #[test]
    fn test_empty_tool_call_arguments() {
        let call = OpenAICompatibleToolCall {
            id: "call_1".to_string(),
            r#type: OpenAICompatibleToolType::Function,
            function: OpenAICompatibleFunctionCall {
                name: "list_cities".to_string(),
                arguments: String::new(),
            },
        };
        assert_eq!(call.to_tool_call_part().unwrap().input, json!({}));
    }
}
