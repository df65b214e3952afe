//! Envelope: the unit exchanged over a session stream
//!
//! An envelope is a short type tag plus opaque payload bytes. The tag selects
//! server-side handling: the engine name for the handshake, one of the
//! reserved tags below, or an application [`Verb`].

use std::fmt;

use bytes::Bytes;

use crate::codec::FrameWriter;
use crate::error::FrameError;
use crate::session::SessionToken;

/// Keepalive ping, payload is the session token
pub const HEARTBEAT: &str = "__heartbeat__";

/// Post-handshake engine setup, payload is the encoded user code
pub const INIT_ENGINE: &str = "__initengine__";

/// Handshake reply tag for a session the server has not seen before
pub const FRESH_SESSION: &str = "fresh";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    kind: String,
    payload: Bytes,
}

impl Envelope {
    pub fn new(kind: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            kind: kind.into(),
            payload: payload.into(),
        }
    }

    /// Handshake envelope: tag is the engine type, payload the token
    pub fn hello(engine: &str, token: &SessionToken) -> Self {
        Self::new(engine, token.to_bytes())
    }

    pub fn heartbeat(token: &SessionToken) -> Self {
        Self::new(HEARTBEAT, token.to_bytes())
    }

    /// Engine setup envelope carrying the user credential
    pub fn init_engine(user_code: &str) -> Result<Self, FrameError> {
        let mut writer = FrameWriter::new();
        writer.write_str(user_code);
        Ok(Self::new(INIT_ENGINE, writer.finish()?))
    }

    pub fn verb(verb: Verb, payload: Bytes) -> Self {
        Self::new(verb.as_str(), payload)
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn is_heartbeat(&self) -> bool {
        self.kind == HEARTBEAT
    }

    pub fn into_parts(self) -> (String, Bytes) {
        (self.kind, self.payload)
    }
}

/// Application verbs understood by the remote service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Ask,
    AskMany,
    Embed,
    EmbedMany,
}

impl Verb {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Ask => "ask",
            Verb::AskMany => "askmany",
            Verb::Embed => "embed",
            Verb::EmbedMany => "embedmany",
        }
    }

    /// Whether the server answers this verb with an output document
    pub fn expects_output(&self) -> bool {
        matches!(self, Verb::Ask | Verb::Embed)
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::FrameReader;

    #[test]
    fn test_hello_carries_token_bytes() {
        let token = SessionToken::from("abc123");
        let hello = Envelope::hello("llm", &token);
        assert_eq!(hello.kind(), "llm");
        assert_eq!(&hello.payload()[..], b"abc123");
    }

    #[test]
    fn test_heartbeat_tag() {
        let token = SessionToken::from("t");
        let beat = Envelope::heartbeat(&token);
        assert!(beat.is_heartbeat());
        assert_eq!(&beat.payload()[..], b"t");
    }

    #[test]
    fn test_init_engine_payload_is_single_string() {
        let init = Envelope::init_engine("user-42").unwrap();
        assert_eq!(init.kind(), INIT_ENGINE);

        let mut reader = FrameReader::new(init.payload());
        assert_eq!(reader.read_str().unwrap(), Some("user-42"));
        assert!(reader.is_empty());
    }

    #[test]
    fn test_verb_tags() {
        assert_eq!(Verb::Ask.as_str(), "ask");
        assert_eq!(Verb::AskMany.as_str(), "askmany");
        assert_eq!(Verb::Embed.to_string(), "embed");
        assert_eq!(Verb::EmbedMany.to_string(), "embedmany");
        assert!(Verb::Ask.expects_output());
        assert!(!Verb::EmbedMany.expects_output());
    }
}
