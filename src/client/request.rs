//! Request documents and verb payload layouts
//!
//! Single requests (`ask`, `embed`) carry:
//!
//! ```text
//! str(request JSON) | str(tags JSON array) | int(cache_only 0/1) | int(retries)
//! ```
//!
//! Batch requests (`askmany`, `embedmany`) carry:
//!
//! ```text
//! str(JSON array of requests) | str(tags JSON array) | int(retries)
//! ```
//!
//! A retry count of -1 leaves the choice to the server.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::codec::FrameWriter;
use crate::error::{FrameError, Result};

pub const DEFAULT_CHAT_MODEL: &str = "gpt-5-mini_2025-08-07";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-large_1";

/// Retry count meaning "server default"
pub const SERVER_DEFAULT_RETRIES: i32 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    Assistant,
    User,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

/// Chat completion request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    /// JSON schema of the expected answer, serialized as a string
    #[serde(rename = "ResponseSchema")]
    pub response_schema: String,
}

impl ChatRequest {
    /// Request with the default model. `None` asks for free-form text.
    pub fn new(response_schema: Option<&serde_json::Value>) -> Result<Self> {
        Self::with_model(DEFAULT_CHAT_MODEL, response_schema)
    }

    pub fn with_model(
        model: impl Into<String>,
        response_schema: Option<&serde_json::Value>,
    ) -> Result<Self> {
        Ok(Self {
            model: model.into(),
            messages: Vec::new(),
            response_schema: serde_json::to_string(&response_schema)?,
        })
    }

    pub fn system(mut self, content: impl Into<String>) -> Self {
        self.push(Role::System, content);
        self
    }

    pub fn assistant(mut self, content: impl Into<String>) -> Self {
        self.push(Role::Assistant, content);
        self
    }

    pub fn user(mut self, content: impl Into<String>) -> Self {
        self.push(Role::User, content);
        self
    }

    pub fn push(&mut self, role: Role, content: impl Into<String>) {
        self.messages.push(ChatMessage {
            role,
            content: content.into(),
        });
    }
}

/// Embedding request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddingRequest {
    pub model: String,
    pub text: String,
}

impl EmbeddingRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self::with_model(DEFAULT_EMBEDDING_MODEL, text)
    }

    pub fn with_model(model: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            text: text.into(),
        }
    }
}

/// Map an optional retry count onto the wire value
pub fn wire_retries(retries: Option<u32>) -> i32 {
    retries.map_or(SERVER_DEFAULT_RETRIES, |n| i32::try_from(n).unwrap_or(i32::MAX))
}

/// Payload of `ask` / `embed`
pub fn single_payload(
    request_json: &str,
    tags_json: &str,
    cache_only: bool,
    retries: i32,
) -> std::result::Result<Bytes, FrameError> {
    let mut writer = FrameWriter::new();
    writer
        .write_str(request_json)
        .write_str(tags_json)
        .write_flag(cache_only)
        .write_int(retries);
    writer.finish()
}

/// Payload of `askmany` / `embedmany`
pub fn batch_payload(
    requests_json: &str,
    tags_json: &str,
    retries: i32,
) -> std::result::Result<Bytes, FrameError> {
    let mut writer = FrameWriter::new();
    writer
        .write_str(requests_json)
        .write_str(tags_json)
        .write_int(retries);
    writer.finish()
}

/// Serialize tags as a JSON array of strings
pub fn tags_json<T: AsRef<str>>(tags: &[T]) -> Result<String> {
    let tags: Vec<&str> = tags.iter().map(AsRef::as_ref).collect();
    Ok(serde_json::to_string(&tags)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::FrameReader;

    #[test]
    fn test_single_payload_bytes() {
        let payload = single_payload("{}", "[]", true, -1).unwrap();
        assert_eq!(
            &payload[..],
            &[
                0x02, b'{', b'}', // request
                0x02, b'[', b']', // tags
                0x01, // cache_only
                0x8F, 0xFF, 0xFF, 0xFF, 0x7F, // retries = -1
            ]
        );
    }

    #[test]
    fn test_batch_payload_bytes() {
        let payload = batch_payload("[]", r#"["a"]"#, 3).unwrap();
        assert_eq!(
            &payload[..],
            &[0x02, b'[', b']', 0x05, b'[', b'"', b'a', b'"', b']', 0x03]
        );
    }

    #[test]
    fn test_single_payload_reads_back_in_order() {
        let chat = ChatRequest::new(None).unwrap().system("be brief").user("hi");
        let request = serde_json::to_string(&chat).unwrap();
        let tags = tags_json(&["run-1", "ünïcode"]).unwrap();
        let payload = single_payload(&request, &tags, false, 2).unwrap();

        let mut reader = FrameReader::new(&payload);
        assert_eq!(reader.read_str().unwrap(), Some(request.as_str()));
        assert_eq!(reader.read_str().unwrap(), Some(r#"["run-1","ünïcode"]"#));
        assert!(!reader.read_flag().unwrap());
        assert_eq!(reader.read_int().unwrap(), 2);
        assert!(reader.is_empty());
    }

    #[test]
    fn test_chat_request_document() {
        let schema = serde_json::json!({"type": "object"});
        let chat = ChatRequest::new(Some(&schema)).unwrap().user("hello");
        let doc = serde_json::to_value(&chat).unwrap();

        assert_eq!(doc["model"], DEFAULT_CHAT_MODEL);
        assert_eq!(doc["messages"][0]["role"], "user");
        assert_eq!(doc["messages"][0]["content"], "hello");
        assert_eq!(doc["ResponseSchema"], r#"{"type":"object"}"#);

        let plain = ChatRequest::new(None).unwrap();
        assert_eq!(plain.response_schema, "null");
    }

    #[test]
    fn test_embedding_request_document() {
        let doc = serde_json::to_value(EmbeddingRequest::new("text")).unwrap();
        assert_eq!(doc, serde_json::json!({"model": DEFAULT_EMBEDDING_MODEL, "text": "text"}));
    }

    #[test]
    fn test_wire_retries() {
        assert_eq!(wire_retries(None), -1);
        assert_eq!(wire_retries(Some(4)), 4);
        assert_eq!(wire_retries(Some(u32::MAX)), i32::MAX);
    }
}
