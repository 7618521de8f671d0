//! Client for functions hosted behind a code-service gateway.
//!
//! The pipeline has two halves:
//!
//! - [`token::TokenManager`] obtains a bearer credential from the management
//!   API and caches it in an injected [`storage::KeyValueStore`].
//! - [`invoker::FunctionInvoker`] calls the gateway with that credential and
//!   returns the body either whole or as a stream of decoded fragments.
//!
//! [`retry::call_with_refresh`] ties them together with a single forced
//! refresh on failure, and [`session::Session`] adds the state an interactive
//! front end needs (authorization status, submissions, chat history).
//!
//! ```rust,ignore
//! let config = ClientConfig::load(None)?;
//! let mut session = Session::new(config, Arc::new(MemoryStore::new()))?;
//! session.authorize().await?;
//! let answer = session.submit("Summarize the release notes").await?;
//! ```

pub mod cli;
pub mod config;
pub mod decoder;
pub mod error;
pub mod history;
pub mod invoker;
pub mod normalize;
pub mod retry;
pub mod session;
pub mod storage;
pub mod token;

pub use config::ClientConfig;
pub use error::{ClientError, Result};
pub use history::{ChatHistory, Exchange, HISTORY_LIMIT};
pub use invoker::{FragmentStream, FunctionInvoker, InvocationRequest};
pub use normalize::{normalize, FragmentNormalizer, NormalizeMode};
pub use session::{Session, SessionState};
pub use storage::{FileStore, KeyValueStore, MemoryStore};
pub use token::{Credential, TokenManager};
