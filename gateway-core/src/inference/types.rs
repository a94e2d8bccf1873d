//! The provider-neutral representation of a generation call.
//!
//! OpenAI-compatible requests are converted into these types before a provider
//! sees them, and provider output is converted back from them.

use std::pin::Pin;

use futures::Stream;
use serde::Serialize;
use serde_json::Value;
use url::Url;

use crate::error::Error;
use crate::inference::reasoning::ReasoningConfig;

#[derive(Clone, Debug, PartialEq)]
pub enum GenerationMessage {
    System { content: String },
    User { content: UserContent },
    Assistant { content: AssistantContent },
    Tool { content: Vec<ToolResultPart> },
}

#[derive(Clone, Debug, PartialEq)]
pub enum UserContent {
    Text(String),
    Parts(Vec<UserContentPart>),
}

#[derive(Clone, Debug, PartialEq)]
pub enum UserContentPart {
    Text {
        text: String,
    },
    Image {
        image: ImageData,
        media_type: Option<String>,
    },
    File {
        data: Vec<u8>,
        media_type: String,
        filename: Option<String>,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub enum ImageData {
    Bytes(Vec<u8>),
    Url(Url),
}

#[derive(Clone, Debug, PartialEq)]
pub enum AssistantContent {
    Text(String),
    Parts(Vec<AssistantContentPart>),
}

#[derive(Clone, Debug, PartialEq)]
pub enum AssistantContentPart {
    Text { text: String },
    Reasoning { text: String },
    ToolCall(ToolCallPart),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ToolCallPart {
    pub tool_call_id: String,
    pub tool_name: String,
    pub input: Value,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ToolResultPart {
    pub tool_call_id: String,
    pub tool_name: String,
    pub output: ToolResultOutput,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ToolResultOutput {
    Json(Value),
    Text(String),
}

impl ToolResultOutput {
    /// The output as it is sent to providers that only accept a string.
    pub fn to_text(&self) -> String {
        match self {
            ToolResultOutput::Json(value) => value.to_string(),
            ToolResultOutput::Text(text) => text.clone(),
        }
    }

    /// The output as it is sent to providers that accept structured results.
    pub fn to_json(&self) -> Value {
        match self {
            ToolResultOutput::Json(value) => value.clone(),
            ToolResultOutput::Text(text) => Value::String(text.clone()),
        }
    }
}

/// A tool the model may call. `input_schema` is the caller's JSON Schema, untouched.
#[derive(Clone, Debug, PartialEq)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: Option<String>,
    pub input_schema: Value,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ToolChoice {
    None,
    Auto,
    Required,
    Tool { tool_name: String },
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct GenerateRequest {
    pub messages: Vec<GenerationMessage>,
    pub tools: Vec<ToolDescriptor>,
    pub tool_choice: Option<ToolChoice>,
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub max_output_tokens: Option<u32>,
    pub stop: Vec<String>,
    pub reasoning: Option<ReasoningConfig>,
}

impl GenerateRequest {
    /// Splits leading and interleaved system messages from the conversation,
    /// for providers that take the system prompt as a separate field.
    pub fn system_and_conversation(&self) -> (Option<String>, Vec<&GenerationMessage>) {
        let mut system = Vec::new();
        let mut conversation = Vec::with_capacity(self.messages.len());
        for message in &self.messages {
            match message {
                GenerationMessage::System { content } => system.push(content.as_str()),
                other => conversation.push(other),
            }
        }
        let system = (!system.is_empty()).then(|| system.join("\n"));
        (system, conversation)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum FinishReason {
    Stop,
    Length,
    ContentFilter,
    ToolCalls,
    Error,
    Other,
    Unknown,
}

impl FinishReason {
    /// The value of `finish_reason` on the OpenAI wire.
    pub fn to_openai(self) -> String {
        match self {
            FinishReason::Error | FinishReason::Other | FinishReason::Unknown => "stop".to_string(),
            other => other.to_string().replace('-', "_"),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Usage {
    pub input_tokens: Option<u32>,
    pub output_tokens: Option<u32>,
    pub total_tokens: Option<u32>,
    pub reasoning_tokens: Option<u32>,
    pub cached_input_tokens: Option<u32>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct GenerateResult {
    pub text: String,
    pub reasoning_text: Option<String>,
    pub tool_calls: Vec<ToolCallPart>,
    pub finish_reason: FinishReason,
    pub usage: Usage,
}

/// Incremental output of a streaming generation.
/// Tool calls are only emitted once complete.
#[derive(Clone, Debug, PartialEq)]
pub enum StreamPart {
    TextDelta(String),
    ReasoningDelta(String),
    ToolCall(ToolCallPart),
    Finish {
        finish_reason: FinishReason,
        usage: Usage,
    },
}

pub type GenerationStream = Pin<Box<dyn Stream<Item = Result<StreamPart, Error>> + Send>>;

#[derive(Clone, Debug, PartialEq)]
pub struct EmbeddingResult {
    pub embeddings: Vec<Vec<f32>>,
    pub input_tokens: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finish_reason_to_openai() {
        assert_eq!(FinishReason::ToolCalls.to_openai(), "tool_calls");
        assert_eq!(FinishReason::ContentFilter.to_openai(), "content_filter");
        assert_eq!(FinishReason::Length.to_openai(), "length");
        assert_eq!(FinishReason::Error.to_openai(), "stop");
        assert_eq!(FinishReason::Other.to_openai(), "stop");
        assert_eq!(FinishReason::Unknown.to_openai(), "stop");
    }

    #[test]
    fn test_system_and_conversation() {
        let request = GenerateRequest {
            messages: vec![
                GenerationMessage::System {
                    content: "Be brief.".to_string(),
                },
                GenerationMessage::User {
                    content: UserContent::Text("Hi".to_string()),
                },
                GenerationMessage::System {
                    content: "Answer in French.".to_string(),
                },
            ],
            ..Default::default()
        };
        let (system, conversation) = request.system_and_conversation();
        assert_eq!(system.as_deref(), Some("Be brief.\nAnswer in French."));
        assert_eq!(conversation.len(), 1);
    }
}
