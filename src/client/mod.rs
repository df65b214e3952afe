//! Verb-level client for the LLM service
//!
//! [`LlmClient`] encodes requests with the frame codec, submits them through
//! the [`Dispatcher`] and decodes [`LlmOutput`] responses. Background verbs
//! only wait for the server's acknowledgment.

mod blob;
mod output;
mod request;

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

pub use blob::{BlobFetcher, HttpBlobFetcher};
pub use output::{CachedEntry, LlmOutput, LlmSimpleOutput, RunMetaData};
pub use request::{
    batch_payload, single_payload, tags_json, wire_retries, ChatMessage, ChatRequest,
    EmbeddingRequest, Role, DEFAULT_CHAT_MODEL, DEFAULT_EMBEDDING_MODEL, SERVER_DEFAULT_RETRIES,
};

use crate::codec::FrameReader;
use crate::config::SessionConfig;
use crate::dispatcher::Dispatcher;
use crate::envelope::{Envelope, Verb};
use crate::error::{ClientError, Result};
use crate::retry::RetryPolicy;
use crate::session::SessionToken;
use crate::supervisor::SessionSupervisor;
use crate::transport::Transport;

pub struct LlmClient {
    dispatcher: Dispatcher,
    blobs: Option<Arc<dyn BlobFetcher>>,
}

impl LlmClient {
    /// Connect a session and wrap it in a dispatcher
    pub async fn connect(
        transport: Arc<dyn Transport>,
        config: SessionConfig,
        retry: RetryPolicy,
    ) -> Result<Self> {
        let supervisor = SessionSupervisor::create(transport, config, retry).await?;
        Ok(Self::from_dispatcher(Dispatcher::new(supervisor)))
    }

    pub fn from_dispatcher(dispatcher: Dispatcher) -> Self {
        Self {
            dispatcher,
            blobs: None,
        }
    }

    /// Resolve `answerReference` responses through `fetcher`
    pub fn with_blob_fetcher(mut self, fetcher: Arc<dyn BlobFetcher>) -> Self {
        self.blobs = Some(fetcher);
        self
    }

    /// Run one chat request and wait for its answer
    pub async fn ask<T: AsRef<str>>(
        &self,
        chat: &ChatRequest,
        tags: &[T],
        cache_only: bool,
        retries: Option<u32>,
    ) -> Result<LlmSimpleOutput> {
        self.single(Verb::Ask, chat, tags, cache_only, retries).await
    }

    /// Queue chat requests for background processing
    pub async fn ask_background<T: AsRef<str>>(
        &self,
        chats: &[ChatRequest],
        tags: &[T],
        retries: Option<u32>,
    ) -> Result<()> {
        self.batch(Verb::AskMany, chats, tags, retries).await
    }

    /// Compute one embedding and wait for it
    pub async fn embed<T: AsRef<str>>(
        &self,
        input: &EmbeddingRequest,
        tags: &[T],
        cache_only: bool,
        retries: Option<u32>,
    ) -> Result<LlmSimpleOutput> {
        self.single(Verb::Embed, input, tags, cache_only, retries).await
    }

    /// Queue embedding requests for background processing
    pub async fn embed_background<T: AsRef<str>>(
        &self,
        inputs: &[EmbeddingRequest],
        tags: &[T],
        retries: Option<u32>,
    ) -> Result<()> {
        self.batch(Verb::EmbedMany, inputs, tags, retries).await
    }

    async fn single<R: Serialize + ?Sized, T: AsRef<str>>(
        &self,
        verb: Verb,
        request: &R,
        tags: &[T],
        cache_only: bool,
        retries: Option<u32>,
    ) -> Result<LlmSimpleOutput> {
        let request_json = serde_json::to_string(request)?;
        let payload = single_payload(
            &request_json,
            &tags_json(tags)?,
            cache_only,
            wire_retries(retries),
        )?;

        let response = self
            .dispatcher
            .send_surely(&Envelope::verb(verb, payload), true)
            .await?
            .ok_or_else(|| ClientError::MissingPayload(verb.to_string()))?;

        let output = decode_output(verb, &response)?;
        self.resolve(output).await
    }

    async fn batch<R: Serialize, T: AsRef<str>>(
        &self,
        verb: Verb,
        requests: &[R],
        tags: &[T],
        retries: Option<u32>,
    ) -> Result<()> {
        let requests_json = serde_json::to_string(requests)?;
        let payload = batch_payload(&requests_json, &tags_json(tags)?, wire_retries(retries))?;

        self.dispatcher
            .send_surely(&Envelope::verb(verb, payload), false)
            .await?;
        debug!(%verb, count = requests.len(), "Batch accepted");
        Ok(())
    }

    /// Replace a by-reference answer with the downloaded document
    async fn resolve(&self, output: LlmOutput) -> Result<LlmSimpleOutput> {
        let Some(reference) = output.answer_reference.clone() else {
            return Ok(output.into());
        };
        let Some(fetcher) = &self.blobs else {
            warn!("Answer sent by reference but no blob fetcher is configured");
            return Ok(output.into());
        };

        let body = fetcher.fetch(&reference).await?;
        let entry: CachedEntry = serde_json::from_str(&body)?;
        Ok(LlmSimpleOutput {
            answer: Some(entry),
            error: output.error,
        })
    }

    pub async fn token(&self) -> SessionToken {
        self.dispatcher.token().await
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub async fn close(&self) {
        self.dispatcher.close().await;
    }
}

/// Decode the single JSON string carried by an `ask` / `embed` response
pub fn decode_output(verb: Verb, response: &Envelope) -> Result<LlmOutput> {
    let mut reader = FrameReader::new(response.payload());
    let json = reader
        .read_str()?
        .ok_or_else(|| ClientError::MissingPayload(verb.to_string()))?;
    Ok(serde_json::from_str(json)?)
}
