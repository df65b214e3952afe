//! Response documents returned by the LLM service

use serde::{Deserialize, Serialize};

/// Timing and token usage of one model run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct RunMetaData {
    pub run_time: String,
    pub run_time_seconds: f64,
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
    pub total_tokens: i64,
}

/// Stored result of a chat or embedding request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct CachedEntry {
    pub user_name: String,
    pub original_tags: Vec<String>,
    pub chat_answer: Option<String>,
    pub embedding: Option<Vec<f32>>,
    pub runtime_data: Option<RunMetaData>,
}

/// Raw response of a single `ask` / `embed`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LlmOutput {
    pub answer: Option<CachedEntry>,
    /// URL of the answer when it was too large to send inline
    pub answer_reference: Option<String>,
    pub error: Option<String>,
    pub is_cached: bool,
}

/// Answer handed to callers once any blob reference is resolved
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSimpleOutput {
    pub answer: Option<CachedEntry>,
    pub error: Option<String>,
}

impl LlmSimpleOutput {
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Chat completion text, if any
    pub fn text(&self) -> Option<&str> {
        self.answer.as_ref()?.chat_answer.as_deref()
    }

    pub fn embedding(&self) -> Option<&[f32]> {
        self.answer.as_ref()?.embedding.as_deref()
    }
}

impl From<LlmOutput> for LlmSimpleOutput {
    fn from(output: LlmOutput) -> Self {
        Self {
            answer: output.answer,
            error: output.error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_inline_answer() {
        let json = r#"{
            "answer": {
                "UserName": "alice",
                "OriginalTags": ["t1"],
                "ChatAnswer": "42",
                "Embedding": null,
                "RuntimeData": {
                    "RunTime": "00:00:01",
                    "RunTimeSeconds": 1.5,
                    "PromptTokens": 10,
                    "CompletionTokens": 2,
                    "TotalTokens": 12
                }
            },
            "answerReference": null,
            "error": null,
            "isCached": true
        }"#;

        let output: LlmOutput = serde_json::from_str(json).unwrap();
        assert!(output.is_cached);
        assert_eq!(output.answer_reference, None);

        let simple = LlmSimpleOutput::from(output);
        assert_eq!(simple.text(), Some("42"));
        assert!(!simple.is_error());
        let runtime = simple.answer.unwrap().runtime_data.unwrap();
        assert_eq!(runtime.total_tokens, 12);
    }

    #[test]
    fn test_parse_error_with_missing_fields() {
        let output: LlmOutput = serde_json::from_str(r#"{"error": "quota exceeded"}"#).unwrap();
        let simple = LlmSimpleOutput::from(output);
        assert!(simple.is_error());
        assert_eq!(simple.text(), None);
    }
}
