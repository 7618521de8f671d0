//! Session state for an interactive front end.
//!
//! A session is authorized once: resolve a credential, probe `GET /` on the
//! function, and on failure refresh and probe once more. If that second probe
//! fails the session is [`SessionState::Failed`] and refuses submissions. Once
//! ready, each submission records an exchange, calls the configured function
//! path with the user's text, and attaches the normalized answer.
//!
//! A failed submission leaves earlier history alone and the new exchange
//! without an answer.

use std::sync::Arc;

use reqwest::{Client, Method};
use tokio_stream::StreamExt;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::history::ChatHistory;
use crate::invoker::{FunctionInvoker, InvocationRequest};
use crate::normalize::normalize_buffered;
use crate::retry::{with_deadline, with_token_refresh};
use crate::storage::KeyValueStore;
use crate::token::{Credential, TokenManager};

/// Path probed during authorization.
pub const PROBE_PATH: &str = "/";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Authorization has not completed yet.
    Authorizing,
    /// A working credential is held; submissions are accepted.
    Ready,
    /// Authorization failed after the retry. Carries the user-facing message.
    Failed(String),
}

pub struct Session {
    config: Arc<ClientConfig>,
    tokens: TokenManager,
    invoker: FunctionInvoker,
    history: ChatHistory,
    state: SessionState,
    credential: Option<Credential>,
    submitting: bool,
}

impl Session {
    /// Build a session over `store`, restoring any persisted history.
    pub fn new(config: ClientConfig, store: Arc<dyn KeyValueStore>) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| ClientError::Config(format!("cannot build HTTP client: {e}")))?;
        let config = Arc::new(config);
        Ok(Self {
            tokens: TokenManager::new(client.clone(), Arc::clone(&config), Arc::clone(&store)),
            invoker: FunctionInvoker::new(client, Arc::clone(&config)),
            history: ChatHistory::load(store)?,
            config,
            state: SessionState::Authorizing,
            credential: None,
            submitting: false,
        })
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn is_submitting(&self) -> bool {
        self.submitting
    }

    pub fn history(&self) -> &ChatHistory {
        &self.history
    }

    /// Credential the session authorized with.
    pub fn credential(&self) -> Option<&Credential> {
        self.credential.as_ref()
    }

    /// Resolve a credential and probe the function, refreshing once on
    /// failure. Moves the session to `Ready` or `Failed`.
    pub async fn authorize(&mut self) -> Result<()> {
        self.state = SessionState::Authorizing;
        let probe = InvocationRequest::new(PROBE_PATH, Method::GET);
        let invoker = &self.invoker;
        let probe_ref = &probe;

        let outcome = with_deadline(
            self.config.request_timeout,
            with_token_refresh(&self.tokens, move |credential| async move {
                invoker.invoke_buffered(probe_ref, &credential).await
            }),
        )
        .await;

        match outcome {
            Ok((credential, _)) => {
                info!(function_id = %self.config.function_id, "session authorized");
                self.credential = Some(credential);
                self.state = SessionState::Ready;
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "authorization failed");
                self.credential = None;
                self.state = SessionState::Failed(format!("Failed to execute request. Error: {e}"));
                Err(e)
            }
        }
    }

    fn begin_submission(&mut self, text: &str) -> Result<(Credential, Uuid, InvocationRequest)> {
        let credential = match (&self.state, &self.credential) {
            (SessionState::Ready, Some(c)) => c.clone(),
            (SessionState::Failed(msg), _) => return Err(ClientError::NotAuthorized(msg.clone())),
            _ => return Err(ClientError::NotAuthorized("session is not authorized yet".into())),
        };
        let id = self.history.push(text)?;
        let req = InvocationRequest::new(self.config.function_path.clone(), self.config.submit_method.clone())
            .with_query(text);
        self.submitting = true;
        Ok((credential, id, req))
    }

    /// Send `text` to the function and wait for the whole answer.
    ///
    /// Returns the normalized answer, which is also attached to the new
    /// exchange. On failure the exchange stays unanswered.
    pub async fn submit(&mut self, text: &str) -> Result<String> {
        let (credential, id, req) = self.begin_submission(text)?;

        let outcome = with_deadline(
            self.config.request_timeout,
            self.invoker.invoke_buffered(&req, &credential),
        )
        .await;
        self.submitting = false;

        match outcome {
            Ok(raw) => {
                let answer = normalize_buffered(&raw);
                self.history.attach_answer(id, answer.clone())?;
                Ok(answer)
            }
            Err(e) => {
                warn!(error = %e, exchange = %id, "submission failed");
                Err(e)
            }
        }
    }

    /// Send `text` and surface the answer fragment by fragment through
    /// `on_fragment` as it arrives. Returns the accumulated answer.
    ///
    /// Fragments received before a mid-stream failure stay attached to the
    /// exchange.
    pub async fn submit_streaming<F>(&mut self, text: &str, mut on_fragment: F) -> Result<String>
    where
        F: FnMut(&str),
    {
        let (credential, id, req) = self.begin_submission(text)?;
        let invoker = &self.invoker;
        let history = &mut self.history;

        let outcome = with_deadline(self.config.request_timeout, async {
            let mut fragments = invoker.invoke_streaming(&req, &credential).await?;
            while let Some(fragment) = fragments.next().await {
                let fragment = fragment?;
                history.append_to_answer(id, &fragment);
                on_fragment(&fragment);
            }
            Ok::<(), ClientError>(())
        })
        .await;
        self.submitting = false;
        let persisted = self.history.persist();

        match outcome {
            Ok(()) => {
                persisted?;
                Ok(self
                    .history
                    .get(id)
                    .and_then(|e| e.answer.clone())
                    .unwrap_or_default())
            }
            Err(e) => {
                if let Err(store_err) = persisted {
                    warn!(error = %store_err, exchange = %id, "could not persist partial answer");
                }
                warn!(error = %e, exchange = %id, "streaming submission failed");
                Err(e)
            }
        }
    }
}
