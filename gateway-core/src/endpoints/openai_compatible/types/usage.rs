//! Token usage in OpenAI-compatible responses.

use serde::Serialize;

use crate::inference::types::Usage;

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct OpenAICompatibleUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
    pub completion_tokens_details: OpenAICompatibleCompletionTokensDetails,
    pub prompt_tokens_details: OpenAICompatiblePromptTokensDetails,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct OpenAICompatibleCompletionTokensDetails {
    pub reasoning_tokens: u32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct OpenAICompatiblePromptTokensDetails {
    pub cached_tokens: u32,
}

impl From<Usage> for OpenAICompatibleUsage {
    /// Counts the provider did not report are sent as zero.
    fn from(usage: Usage) -> Self {
        let prompt_tokens = usage.input_tokens.unwrap_or_default();
        let completion_tokens = usage.output_tokens.unwrap_or_default();
        OpenAICompatibleUsage {
            prompt_tokens,
            completion_tokens,
            total_tokens: usage
                .total_tokens
                .unwrap_or(prompt_tokens + completion_tokens),
            completion_tokens_details: OpenAICompatibleCompletionTokensDetails {
                reasoning_tokens: usage.reasoning_tokens.unwrap_or_default(),
            },
            prompt_tokens_details: OpenAICompatiblePromptTokensDetails {
                cached_tokens: usage.cached_input_tokens.unwrap_or_default(),
            },
        }
    }
}
