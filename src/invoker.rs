//! Authenticated calls to the function gateway.
//!
//! Two modes share one request shape:
//!
//! - **buffered**: wait for the whole body and return it verbatim
//! - **streaming**: surface the body chunk by chunk as decoded, normalized
//!   text fragments
//!
//! A non-success status is reported as `GatewayCall` with the raw body as
//! detail in both modes, before any normalization happens.

use std::pin::Pin;
use std::sync::Arc;

use futures_util::stream::{self, Stream};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::Serialize;
use tokio_stream::StreamExt;
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::decoder::Utf8ChunkDecoder;
use crate::error::{ClientError, Result};
use crate::normalize::FragmentNormalizer;
use crate::token::Credential;

/// Lazily produced fragments of one streamed response. Finite, and not
/// restartable: polling it after `None` keeps returning `None`.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

// ---------------------------------------------------------------------------
// Request types
// ---------------------------------------------------------------------------

/// JSON body sent when the invocation carries user text.
#[derive(Debug, Serialize)]
pub struct QueryBody<'a> {
    pub query: &'a str,
}

/// One call to the gateway: which path, which method, and optional text.
#[derive(Debug, Clone, PartialEq)]
pub struct InvocationRequest {
    pub path: String,
    pub method: Method,
    pub query: Option<String>,
}

impl InvocationRequest {
    pub fn new(path: impl Into<String>, method: Method) -> Self {
        Self {
            path: path.into(),
            method,
            query: None,
        }
    }

    /// Attach user text, sent as `{"query": text}`.
    pub fn with_query(mut self, text: impl Into<String>) -> Self {
        self.query = Some(text.into());
        self
    }
}

// ---------------------------------------------------------------------------
// FunctionInvoker
// ---------------------------------------------------------------------------

pub struct FunctionInvoker {
    client: Client,
    config: Arc<ClientConfig>,
}

impl FunctionInvoker {
    pub fn new(client: Client, config: Arc<ClientConfig>) -> Self {
        Self { client, config }
    }

    fn build(&self, req: &InvocationRequest, credential: &Credential) -> RequestBuilder {
        let url = self.config.function_url(&req.path);
        debug!(method = %req.method, url = %url, has_query = req.query.is_some(), "invoking function");
        let builder = self
            .client
            .request(req.method.clone(), &url)
            .header("Content-Type", "application/json")
            .header("Authorization", credential.bearer());
        match &req.query {
            Some(text) => builder.json(&QueryBody { query: text }),
            None => builder,
        }
    }

    async fn send(&self, req: &InvocationRequest, credential: &Credential) -> Result<Response> {
        let resp = self.build(req, credential).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let detail = resp.text().await?;
            warn!(status = status.as_u16(), path = %req.path, "gateway returned failure status");
            return Err(ClientError::GatewayCall {
                status: status.as_u16(),
                detail,
            });
        }
        Ok(resp)
    }

    /// Send `req` and return the full response body, unmodified.
    ///
    /// # Errors
    /// - `GatewayCall` on a non-2xx status, with the body as detail.
    /// - `Transport` when the connection fails.
    pub async fn invoke_buffered(&self, req: &InvocationRequest, credential: &Credential) -> Result<String> {
        let resp = self.send(req, credential).await?;
        let text = resp.text().await?;
        debug!(bytes = text.len(), "buffered response received");
        Ok(text)
    }

    /// Send `req` and return the body as a stream of text fragments, one per
    /// network chunk that completes at least one character.
    ///
    /// # Errors
    /// - `GatewayCall` on a non-2xx status, before any body is read.
    /// - `StreamUnsupported` when the response cannot carry a body (HEAD
    ///   requests, 204 and 205 responses).
    /// - Items of the stream carry `Transport` if the connection drops mid-body.
    pub async fn invoke_streaming(
        &self,
        req: &InvocationRequest,
        credential: &Credential,
    ) -> Result<FragmentStream> {
        let resp = self.send(req, credential).await?;
        let status = resp.status();
        if req.method == Method::HEAD
            || status == StatusCode::NO_CONTENT
            || status == StatusCode::RESET_CONTENT
        {
            return Err(ClientError::StreamUnsupported(format!(
                "{} {} has no readable body (HTTP {})",
                req.method,
                req.path,
                status.as_u16()
            )));
        }
        Ok(decode_fragments(resp.bytes_stream()))
    }
}

/// Turn a stream of raw body chunks into normalized text fragments.
///
/// Multi-byte characters split across chunks are carried over by a
/// [`Utf8ChunkDecoder`], and a [`FragmentNormalizer`] keeps the cleanup
/// independent of where the chunks were cut. A chunk that completes no output
/// yields nothing. After the first error the stream ends.
pub fn decode_fragments<S, B, E>(chunks: S) -> FragmentStream
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<ClientError> + Send + 'static,
{
    let state = (
        Box::pin(chunks),
        Utf8ChunkDecoder::new(),
        FragmentNormalizer::new(),
        false,
    );
    Box::pin(
        stream::unfold(state, |(mut chunks, mut decoder, mut normalizer, done)| async move {
            if done {
                return None;
            }
            loop {
                match chunks.next().await {
                    Some(Ok(bytes)) => {
                        let text = normalizer.push(&decoder.decode(bytes.as_ref()));
                        if text.is_empty() {
                            continue;
                        }
                        return Some((Ok(text), (chunks, decoder, normalizer, false)));
                    }
                    Some(Err(e)) => {
                        let err: ClientError = e.into();
                        warn!(error = %err, "response stream aborted");
                        return Some((Err(err), (chunks, decoder, normalizer, true)));
                    }
                    None => {
                        let mut tail = normalizer.push(&decoder.finish());
                        tail.push_str(&normalizer.finish());
                        if tail.is_empty() {
                            return None;
                        }
                        return Some((Ok(tail), (chunks, decoder, normalizer, true)));
                    }
                }
            }
        })
        .fuse(),
    )
}

/// Drain a fragment stream into one string.
pub async fn collect_fragments(mut fragments: FragmentStream) -> Result<String> {
    let mut out = String::new();
    while let Some(fragment) = fragments.next().await {
        out.push_str(&fragment?);
    }
    Ok(out)
}
