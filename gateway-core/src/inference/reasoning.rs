use serde::{Deserialize, Serialize};

use crate::catalog::ModelFamily;
use crate::error::{Error, ErrorDetails};

const GEMINI_LOW_THINKING_BUDGET: u32 = 1024;
const GEMINI_DEFAULT_THINKING_BUDGET: u32 = 8192;
const GEMINI_HIGH_THINKING_BUDGET: u32 = 24_576;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ReasoningEffort {
    Low,
    Medium,
    High,
}

/// The OpenAI-compatible `reasoning` request object.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReasoningParams {
    pub enabled: Option<bool>,
    pub max_tokens: Option<u32>,
    pub effort: Option<ReasoningEffort>,
    pub exclude: Option<bool>,
}

/// Reasoning settings in the form a provider understands.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReasoningConfig {
    Effort(ReasoningEffort),
    ThinkingBudget {
        budget_tokens: u32,
        include_thoughts: bool,
    },
}

/// Maps the caller's reasoning parameters onto the model family's native setting.
///
/// Returns `Ok(None)` when reasoning stays at the provider's default.
pub fn get_reasoning_config(
    family: ModelFamily,
    params: &ReasoningParams,
) -> Result<Option<ReasoningConfig>, Error> {
    if params.effort.is_some() && params.max_tokens.is_some() {
        return Err(Error::new(ErrorDetails::InvalidReasoningParams {
            message: "Mutually exclusive parameters: You cannot specify both effort and max_tokens in the same request.".to_string(),
        }));
    }
    match family {
        ModelFamily::Gpt => gpt_reasoning(params),
        ModelFamily::Gemini => Ok(gemini_reasoning(params)),
        ModelFamily::Cohere | ModelFamily::Voyage | ModelFamily::Other => {
            tracing::debug!("Ignoring reasoning parameters for model family `{family}`");
            Ok(None)
        }
    }
}

fn gpt_reasoning(params: &ReasoningParams) -> Result<Option<ReasoningConfig>, Error> {
    if params.max_tokens.is_some() {
        return Err(Error::new(ErrorDetails::InvalidReasoningParams {
            message: "GPT models do not support 'max_tokens' for reasoning.".to_string(),
        }));
    }
    if params.exclude.is_some() {
        return Err(Error::new(ErrorDetails::InvalidReasoningParams {
            message: "GPT models do not support 'exclude' for reasoning.".to_string(),
        }));
    }
    let active = match params.enabled {
        Some(enabled) => enabled,
        None => params.effort.is_some(),
    };
    Ok(active.then(|| ReasoningConfig::Effort(params.effort.unwrap_or(ReasoningEffort::Medium))))
}

fn gemini_reasoning(params: &ReasoningParams) -> Option<ReasoningConfig> {
    let active = match params.enabled {
        Some(enabled) => enabled,
        None => params.max_tokens.is_some() || params.effort.is_some(),
    };
    if !active {
        return None;
    }
    let budget_tokens = match (params.max_tokens, params.effort) {
        (Some(max_tokens), _) => max_tokens,
        (None, Some(ReasoningEffort::Low)) => GEMINI_LOW_THINKING_BUDGET,
        (None, Some(ReasoningEffort::High)) => GEMINI_HIGH_THINKING_BUDGET,
        (None, Some(ReasoningEffort::Medium) | None) => GEMINI_DEFAULT_THINKING_BUDGET,
    };
    Some(ReasoningConfig::ThinkingBudget {
        budget_tokens,
        include_thoughts: params.enabled != Some(false) && params.exclude != Some(true),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effort_and_max_tokens_are_exclusive() {
        let params = ReasoningParams {
            effort: Some(ReasoningEffort::High),
            max_tokens: Some(100),
            ..Default::default()
        };
        let err = get_reasoning_config(ModelFamily::Gemini, &params).unwrap_err();
        assert!(matches!(
            err.get_details(),
            ErrorDetails::InvalidReasoningParams { .. }
        ));
    }

    #[test]
    fn test_gpt_reasoning() {
        let params = ReasoningParams {
            enabled: Some(true),
            ..Default::default()
        };
        assert_eq!(
            get_reasoning_config(ModelFamily::Gpt, &params).unwrap(),
            Some(ReasoningConfig::Effort(ReasoningEffort::Medium))
        );

        let params = ReasoningParams {
            effort: Some(ReasoningEffort::Low),
            ..Default::default()
        };
        assert_eq!(
            get_reasoning_config(ModelFamily::Gpt, &params).unwrap(),
            Some(ReasoningConfig::Effort(ReasoningEffort::Low))
        );

        assert_eq!(
            get_reasoning_config(ModelFamily::Gpt, &ReasoningParams::default()).unwrap(),
            None
        );

        let params = ReasoningParams {
            exclude: Some(true),
            ..Default::default()
        };
        assert!(get_reasoning_config(ModelFamily::Gpt, &params).is_err());
    }

    #[test]
    fn test_gemini_reasoning_budgets() {
        let cases = [
            (Some(ReasoningEffort::Low), None, 1024),
            (Some(ReasoningEffort::Medium), None, 8192),
            (Some(ReasoningEffort::High), None, 24_576),
            (None, Some(2000), 2000),
        ];
        for (effort, max_tokens, expected) in cases {
            let params = ReasoningParams {
                effort,
                max_tokens,
                ..Default::default()
            };
            assert_eq!(
                get_reasoning_config(ModelFamily::Gemini, &params).unwrap(),
                Some(ReasoningConfig::ThinkingBudget {
                    budget_tokens: expected,
                    include_thoughts: true,
                })
            );
        }
    }

    #[test]
    fn test_gemini_exclude_hides_thoughts() {
        let params = ReasoningParams {
            enabled: Some(true),
            exclude: Some(true),
            ..Default::default()
        };
        assert_eq!(
            get_reasoning_config(ModelFamily::Gemini, &params).unwrap(),
            Some(ReasoningConfig::ThinkingBudget {
                budget_tokens: 8192,
                include_thoughts: false,
            })
        );
        let params = ReasoningParams {
            enabled: Some(false),
            effort: Some(ReasoningEffort::High),
            ..Default::default()
        };
        assert_eq!(
            get_reasoning_config(ModelFamily::Gemini, &params).unwrap(),
            None
        );
    }
}
