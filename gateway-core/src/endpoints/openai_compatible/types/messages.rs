//! Conversion between OpenAI-compatible chat messages and `GenerationMessage`s.

use std::collections::HashMap;

use base64::Engine;
use base64::prelude::BASE64_STANDARD;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Error, ErrorDetails};
use crate::inference::types::{
    AssistantContent, AssistantContentPart, GenerateResult, GenerationMessage, ImageData,
    ToolResultOutput, ToolResultPart, UserContent, UserContentPart,
};

use super::tool::OpenAICompatibleToolCall;

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum OpenAICompatibleMessage {
    /// `developer` is OpenAI's newer name for the system role.
    #[serde(alias = "developer")]
    System(OpenAICompatibleSystemMessage),
    User(OpenAICompatibleUserMessage),
    Assistant(OpenAICompatibleAssistantMessage),
    Tool(OpenAICompatibleToolMessage),
}

/// Content that must be text, but may be sent as an array of text parts.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum OpenAICompatibleTextContent {
    Text(String),
    Parts(Vec<OpenAICompatibleTextPart>),
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OpenAICompatibleTextPart {
    Text { text: String },
}

impl OpenAICompatibleTextContent {
    pub fn into_text(self) -> String {
        match self {
            OpenAICompatibleTextContent::Text(text) => text,
            OpenAICompatibleTextContent::Parts(parts) => parts
                .into_iter()
                .map(|OpenAICompatibleTextPart::Text { text }| text)
                .collect::<Vec<_>>()
                .join(""),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct OpenAICompatibleSystemMessage {
    pub content: OpenAICompatibleTextContent,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct OpenAICompatibleUserMessage {
    pub content: OpenAICompatibleUserContent,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum OpenAICompatibleUserContent {
    Text(String),
    Parts(Vec<OpenAICompatibleContentPart>),
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OpenAICompatibleContentPart {
    Text { text: String },
    ImageUrl { image_url: OpenAICompatibleImageUrl },
    File { file: OpenAICompatibleFile },
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct OpenAICompatibleImageUrl {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// An inline file. `data` is base64 without a `data:` prefix.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct OpenAICompatibleFile {
    pub data: String,
    pub media_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

/// Also used for the `message` of a chat completion response, so `content` is
/// serialized as `null` rather than skipped.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct OpenAICompatibleAssistantMessage {
    #[serde(default)]
    pub content: Option<OpenAICompatibleTextContent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<OpenAICompatibleToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_content: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct OpenAICompatibleToolMessage {
    pub content: OpenAICompatibleTextContent,
    pub tool_call_id: String,
}

/// Converts an OpenAI-compatible conversation into `GenerationMessage`s.
///
/// A tool message must answer a tool call made by an earlier assistant message; the
/// tool name is taken from that call. Nothing here touches the network, so a malformed
/// conversation is rejected before any provider is contacted.
pub fn to_model_messages(
    messages: Vec<OpenAICompatibleMessage>,
) -> Result<Vec<GenerationMessage>, Error> {
    let mut tool_names_by_call_id: HashMap<String, String> = HashMap::new();
    let mut model_messages = Vec::with_capacity(messages.len());
    for message in messages {
        let model_message = match message {
            OpenAICompatibleMessage::System(system) => GenerationMessage::System {
                content: system.content.into_text(),
            },
            OpenAICompatibleMessage::User(user) => GenerationMessage::User {
                content: convert_user_content(user.content)?,
            },
            OpenAICompatibleMessage::Assistant(assistant) => {
                for tool_call in assistant.tool_calls.iter().flatten() {
                    tool_names_by_call_id
                        .insert(tool_call.id.clone(), tool_call.function.name.clone());
                }
                GenerationMessage::Assistant {
                    content: convert_assistant_message(assistant)?,
                }
            }
            OpenAICompatibleMessage::Tool(tool) => {
                let Some(tool_name) = tool_names_by_call_id.get(&tool.tool_call_id) else {
                    return Err(Error::new(ErrorDetails::DanglingToolResult {
                        tool_call_id: tool.tool_call_id,
                    }));
                };
                GenerationMessage::Tool {
                    content: vec![ToolResultPart {
                        tool_name: tool_name.clone(),
                        output: parse_tool_output(tool.content.into_text()),
                        tool_call_id: tool.tool_call_id,
                    }],
                }
            }
        };
        model_messages.push(model_message);
    }
    Ok(model_messages)
}

fn convert_user_content(content: OpenAICompatibleUserContent) -> Result<UserContent, Error> {
    match content {
        OpenAICompatibleUserContent::Text(text) => Ok(UserContent::Text(text)),
        OpenAICompatibleUserContent::Parts(parts) => Ok(UserContent::Parts(
            parts
                .into_iter()
                .map(convert_content_part)
                .collect::<Result<_, _>>()?,
        )),
    }
}

fn convert_content_part(part: OpenAICompatibleContentPart) -> Result<UserContentPart, Error> {
    match part {
        OpenAICompatibleContentPart::Text { text } => Ok(UserContentPart::Text { text }),
        OpenAICompatibleContentPart::ImageUrl { image_url } => {
            if image_url.url.starts_with("data:") {
                let (media_type, data) = decode_data_uri(&image_url.url)?;
                Ok(binary_part(data, media_type, None))
            } else {
                let url = Url::parse(&image_url.url).map_err(|e| {
                    Error::new(ErrorDetails::InvalidDataUri {
                        message: format!("Invalid image URL: {e}"),
                    })
                })?;
                Ok(UserContentPart::Image {
                    image: ImageData::Url(url),
                    media_type: None,
                })
            }
        }
        OpenAICompatibleContentPart::File { file } => {
            let data = BASE64_STANDARD.decode(file.data.as_bytes()).map_err(|e| {
                Error::new(ErrorDetails::InvalidDataUri {
                    message: format!("File data is not valid base64: {e}"),
                })
            })?;
            Ok(binary_part(data, file.media_type, file.filename))
        }
    }
}

/// Binary content is an image if its MIME type says so, and a generic file otherwise.
fn binary_part(data: Vec<u8>, media_type: String, filename: Option<String>) -> UserContentPart {
    if media_type.starts_with("image/") {
        UserContentPart::Image {
            image: ImageData::Bytes(data),
            media_type: Some(media_type),
        }
    } else {
        UserContentPart::File {
            data,
            media_type,
            filename,
        }
    }
}

/// Splits `data:<media type>[;base64],<payload>` into the media type and decoded bytes.
fn decode_data_uri(uri: &str) -> Result<(String, Vec<u8>), Error> {
    let invalid = |message: String| Error::new(ErrorDetails::InvalidDataUri { message });
    let rest = uri
        .strip_prefix("data:")
        .ok_or_else(|| invalid("Data URI must start with `data:`".to_string()))?;
    let (metadata, payload) = rest
        .split_once(',')
        .ok_or_else(|| invalid("Data URI is missing a `,` separator".to_string()))?;
    let mut params = metadata.split(';');
    let media_type = match params.next() {
        Some(media_type) if !media_type.is_empty() => media_type.to_string(),
        // RFC 2397 default
        _ => "text/plain".to_string(),
    };
    let is_base64 = params.any(|param| param.eq_ignore_ascii_case("base64"));
    let data = if is_base64 {
        BASE64_STANDARD
            .decode(payload.as_bytes())
            .map_err(|e| invalid(format!("Data URI payload is not valid base64: {e}")))?
    } else {
        urlencoding::decode_binary(payload.as_bytes()).into_owned()
    };
    Ok((media_type, data))
}

fn convert_assistant_message(
    message: OpenAICompatibleAssistantMessage,
) -> Result<AssistantContent, Error> {
    let text = message.content.map(OpenAICompatibleTextContent::into_text);
    let tool_calls = message.tool_calls.unwrap_or_default();
    if tool_calls.is_empty() {
        return Ok(AssistantContent::Text(text.unwrap_or_default()));
    }
    let mut parts = Vec::with_capacity(tool_calls.len() + 1);
    if let Some(text) = text
        && !text.is_empty()
    {
        parts.push(AssistantContentPart::Text { text });
    }
    for tool_call in &tool_calls {
        parts.push(AssistantContentPart::ToolCall(tool_call.to_tool_call_part()?));
    }
    Ok(AssistantContent::Parts(parts))
}

/// Tool output that parses as JSON is kept structured; anything else is plain text.
fn parse_tool_output(content: String) -> ToolResultOutput {
    match serde_json::from_str(&content) {
        Ok(value) => ToolResultOutput::Json(value),
        Err(_) => ToolResultOutput::Text(content),
    }
}

/// Builds the assistant message of a chat completion response.
///
/// When the model called tools, `content` is `null`. Reasoning text is exposed under
/// both `reasoning` and `reasoning_content`, since clients disagree on the field name.
pub fn to_openai_compatible_message(result: &GenerateResult) -> OpenAICompatibleAssistantMessage {
    let mut message = OpenAICompatibleAssistantMessage::default();
    if result.tool_calls.is_empty() {
        message.content = Some(OpenAICompatibleTextContent::Text(result.text.clone()));
    } else {
        message.tool_calls = Some(
            result
                .tool_calls
                .iter()
                .map(OpenAICompatibleToolCall::from)
                .collect(),
        );
    }
    if let Some(reasoning) = result.reasoning_text.as_ref().filter(|r| !r.is_empty()) {
        message.reasoning = Some(reasoning.clone());
        message.reasoning_content = Some(reasoning.clone());
    }
    message
}
