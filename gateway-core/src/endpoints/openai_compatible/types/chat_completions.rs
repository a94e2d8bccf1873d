//! Request and response types for the chat completions endpoint.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::catalog::ModelFamily;
use crate::error::Error;
use crate::inference::reasoning::{
    ReasoningConfig, ReasoningEffort, ReasoningParams, get_reasoning_config,
};
use crate::inference::types::{GenerateRequest, GenerateResult, ToolDescriptor};

use super::messages::{
    OpenAICompatibleAssistantMessage, OpenAICompatibleMessage, to_model_messages,
    to_openai_compatible_message,
};
use super::tool::{OpenAICompatibleTool, OpenAICompatibleToolChoice};
use super::usage::OpenAICompatibleUsage;

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct OpenAICompatibleStreamOptions {
    #[serde(default)]
    pub include_usage: bool,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum OpenAICompatibleStop {
    Single(String),
    Multiple(Vec<String>),
}

impl From<OpenAICompatibleStop> for Vec<String> {
    fn from(stop: OpenAICompatibleStop) -> Self {
        match stop {
            OpenAICompatibleStop::Single(stop) => vec![stop],
            OpenAICompatibleStop::Multiple(stops) => stops,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct OpenAICompatibleParams {
    /// The alias path `<agent>/<branch>/<alias>`.
    pub model: String,
    pub messages: Vec<OpenAICompatibleMessage>,
    #[serde(default)]
    pub tools: Option<Vec<OpenAICompatibleTool>>,
    #[serde(default)]
    pub tool_choice: Option<OpenAICompatibleToolChoice>,
    #[serde(default)]
    pub stream: Option<bool>,
    #[serde(default)]
    pub stream_options: Option<OpenAICompatibleStreamOptions>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub top_p: Option<f64>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub max_completion_tokens: Option<u32>,
    #[serde(default)]
    pub stop: Option<OpenAICompatibleStop>,
    #[serde(default)]
    pub reasoning: Option<ReasoningParams>,
    #[serde(default)]
    pub reasoning_effort: Option<ReasoningEffort>,
    #[serde(flatten)]
    pub unknown_fields: HashMap<String, Value>,
}

impl OpenAICompatibleParams {
    pub fn is_streaming(&self) -> bool {
        self.stream.unwrap_or(false)
    }

    /// Builds the provider-neutral request, leaving `reasoning` unset.
    ///
    /// Reasoning depends on the model family, which is only known once the model is resolved.
    pub fn to_generate_request(&self) -> Result<GenerateRequest, Error> {
        if !self.unknown_fields.is_empty() {
            let mut names = self.unknown_fields.keys().collect::<Vec<_>>();
            names.sort();
            tracing::warn!("Ignoring unknown fields in OpenAI-compatible request: {names:?}");
        }
        Ok(GenerateRequest {
            messages: to_model_messages(self.messages.clone())?,
            tools: self
                .tools
                .iter()
                .flatten()
                .cloned()
                .map(ToolDescriptor::from)
                .collect(),
            tool_choice: self.tool_choice.clone().map(Into::into),
            temperature: self.temperature,
            top_p: self.top_p,
            // `max_completion_tokens` is the newer name for `max_tokens`.
            max_output_tokens: self.max_completion_tokens.or(self.max_tokens),
            stop: self.stop.clone().map(Vec::from).unwrap_or_default(),
            reasoning: None,
        })
    }

    /// Combines `reasoning` with the `reasoning_effort` shorthand and maps them onto `family`.
    pub fn reasoning_config(&self, family: ModelFamily) -> Result<Option<ReasoningConfig>, Error> {
        let params = match (&self.reasoning, self.reasoning_effort) {
            (None, None) => return Ok(None),
            (Some(reasoning), None) => reasoning.clone(),
            (None, Some(effort)) => ReasoningParams {
                effort: Some(effort),
                ..Default::default()
            },
            (Some(reasoning), Some(effort)) => ReasoningParams {
                effort: reasoning.effort.or(Some(effort)),
                ..reasoning.clone()
            },
        };
        get_reasoning_config(family, &params)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OpenAICompatibleResponse {
    pub id: String,
    pub object: String,
    pub created: u64,
    pub model: String,
    pub choices: Vec<OpenAICompatibleChoice>,
    pub usage: OpenAICompatibleUsage,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OpenAICompatibleChoice {
    pub index: u32,
    pub message: OpenAICompatibleMessage,
    pub finish_reason: String,
}

/// `chatcmpl-` followed by a fresh UUID.
pub fn new_completion_id() -> String {
    format!("chatcmpl-{}", uuid::Uuid::new_v4())
}

pub fn current_timestamp() -> u64 {
    chrono::Utc::now().timestamp().try_into().unwrap_or_default()
}

impl OpenAICompatibleResponse {
    /// `model` is echoed back exactly as the caller sent it.
    pub fn new(result: &GenerateResult, model: String) -> Self {
        let message: OpenAICompatibleAssistantMessage = to_openai_compatible_message(result);
        OpenAICompatibleResponse {
            id: new_completion_id(),
            object: "chat.completion".to_string(),
            created: current_timestamp(),
            model,
            choices: vec![OpenAICompatibleChoice {
                index: 0,
                message: OpenAICompatibleMessage::Assistant(message),
                finish_reason: result.finish_reason.to_openai(),
            }],
            usage: result.usage.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::error::ErrorDetails;
    use crate::inference::types::{FinishReason, ToolCallPart, ToolChoice, Usage};

    fn params(value: Value) -> OpenAICompatibleParams {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_to_generate_request() {
        let params = params(json!({
            "model": "acme/main/default",
            "messages": [{"role": "user", "content": "Hi"}],
            "tools": [{"type": "function", "function": {"name": "get_weather", "parameters": {"type": "object"}}}],
            "tool_choice": {"type": "function", "function": {"name": "get_weather"}},
            "temperature": 0.2,
            "max_tokens": 100,
            "max_completion_tokens": 200,
            "stop": "END",
            "user": "someone"
        }));
        assert!(!params.is_streaming());
        assert!(params.unknown_fields.contains_key("user"));
        let request = params.to_generate_request().unwrap();
        assert_eq!(request.messages.len(), 1);
        assert_eq!(request.tools.len(), 1);
        assert_eq!(
            request.tool_choice,
            Some(ToolChoice::Tool {
                tool_name: "get_weather".to_string()
            })
        );
        assert_eq!(request.temperature, Some(0.2));
        assert_eq!(request.max_output_tokens, Some(200));
        assert_eq!(request.stop, vec!["END".to_string()]);
        assert!(request.reasoning.is_none());
    }

    #[test]
    fn test_reasoning_effort_shorthand() {
        let shorthand = params(json!({
            "model": "acme/main/default",
            "messages": [],
            "reasoning_effort": "high"
        }));
        assert_eq!(
            shorthand.reasoning_config(ModelFamily::Gpt).unwrap(),
            Some(ReasoningConfig::Effort(ReasoningEffort::High))
        );

        let conflicting = params(json!({
            "model": "acme/main/default",
            "messages": [],
            "reasoning": {"max_tokens": 2048},
            "reasoning_effort": "low"
        }));
        let err = conflicting.reasoning_config(ModelFamily::Gemini).unwrap_err();
        assert!(matches!(
            err.get_details(),
            ErrorDetails::InvalidReasoningParams { .. }
        ));

        let none = params(json!({"model": "acme/main/default", "messages": []}));
        assert_eq!(none.reasoning_config(ModelFamily::Gpt).unwrap(), None);
    }

    #[test]
    fn test_response_shape() {
        let result = GenerateResult {
            text: String::new(),
            reasoning_text: None,
            tool_calls: vec![ToolCallPart {
                tool_call_id: "call_1".to_string(),
                tool_name: "get_weather".to_string(),
                input: json!({"city": "Paris"}),
            }],
            finish_reason: FinishReason::ToolCalls,
            usage: Usage {
                input_tokens: Some(10),
                output_tokens: Some(5),
                ..Default::default()
            },
        };
        let response =
            serde_json::to_value(OpenAICompatibleResponse::new(&result, "acme/main/default".to_string()))
                .unwrap();
        assert!(response["id"].as_str().unwrap().starts_with("chatcmpl-"));
        assert_eq!(response["object"], "chat.completion");
        assert_eq!(response["model"], "acme/main/default");
        assert_eq!(
            response["choices"],
            json!([{
                "index": 0,
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {"name": "get_weather", "arguments": "{\"city\":\"Paris\"}"}
                    }]
                },
                "finish_reason": "tool_calls"
            }])
        );
        assert_eq!(response["usage"]["total_tokens"], 15);
    }
}
