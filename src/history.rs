//! Multi-turn chat history.
//!
//! Every submission appends an [`Exchange`]; the answer is attached to it in
//! place once it arrives. The full list stays in memory for the session, and
//! only the newest [`HISTORY_LIMIT`] exchanges are written to the store, each
//! time after the in-memory change.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{ClientError, Result};
use crate::storage::{KeyValueStore, CHAT_HISTORY_KEY};

/// How many exchanges survive a restart.
pub const HISTORY_LIMIT: usize = 10;

/// One question and, once received, its answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exchange {
    pub id: Uuid,
    pub question: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
}

impl Exchange {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            question: question.into(),
            answer: None,
        }
    }

    pub fn is_answered(&self) -> bool {
        self.answer.is_some()
    }
}

pub struct ChatHistory {
    exchanges: Vec<Exchange>,
    store: Arc<dyn KeyValueStore>,
}

impl ChatHistory {
    /// Restore persisted exchanges. A corrupt entry is logged and replaced by
    /// an empty history rather than failing the session.
    pub fn load(store: Arc<dyn KeyValueStore>) -> Result<Self> {
        let exchanges = match store.get(CHAT_HISTORY_KEY)? {
            Some(raw) => serde_json::from_str::<Vec<Exchange>>(&raw).unwrap_or_else(|e| {
                warn!(error = %e, "discarding unreadable chat history");
                Vec::new()
            }),
            None => Vec::new(),
        };
        debug!(restored = exchanges.len(), "chat history loaded");
        Ok(Self { exchanges, store })
    }

    pub fn exchanges(&self) -> &[Exchange] {
        &self.exchanges
    }

    pub fn len(&self) -> usize {
        self.exchanges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exchanges.is_empty()
    }

    pub fn latest(&self) -> Option<&Exchange> {
        self.exchanges.last()
    }

    pub fn get(&self, id: Uuid) -> Option<&Exchange> {
        self.exchanges.iter().find(|e| e.id == id)
    }

    /// Append a new unanswered exchange and persist. Returns its id.
    pub fn push(&mut self, question: impl Into<String>) -> Result<Uuid> {
        let exchange = Exchange::new(question);
        let id = exchange.id;
        self.exchanges.push(exchange);
        self.persist()?;
        Ok(id)
    }

    /// Set the answer of exchange `id` and persist.
    pub fn attach_answer(&mut self, id: Uuid, answer: impl Into<String>) -> Result<()> {
        let exchange = self
            .exchanges
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| ClientError::Storage(format!("no exchange with id {id}")))?;
        exchange.answer = Some(answer.into());
        self.persist()
    }

    /// Append a streamed fragment to the answer of `id` in memory only.
    /// Call [`persist`](Self::persist) when the stream ends.
    pub fn append_to_answer(&mut self, id: Uuid, fragment: &str) -> bool {
        match self.exchanges.iter_mut().find(|e| e.id == id) {
            Some(exchange) => {
                exchange.answer.get_or_insert_with(String::new).push_str(fragment);
                true
            }
            None => false,
        }
    }

    /// Write the newest [`HISTORY_LIMIT`] exchanges to the store.
    pub fn persist(&self) -> Result<()> {
        let start = self.exchanges.len().saturating_sub(HISTORY_LIMIT);
        let json = serde_json::to_string(&self.exchanges[start..])
            .map_err(|e| ClientError::Storage(e.to_string()))?;
        self.store.set(CHAT_HISTORY_KEY, &json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn persisted(store: &MemoryStore) -> Vec<Exchange> {
        let raw = store.get(CHAT_HISTORY_KEY).unwrap().unwrap();
        serde_json::from_str(&raw).unwrap()
    }

    #[test]
    fn test_push_persists_unanswered_exchange() {
        let store = Arc::new(MemoryStore::new());
        let mut history = ChatHistory::load(store.clone()).unwrap();
        let id = history.push("what is rust?").unwrap();

        let saved = persisted(&store);
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].id, id);
        assert!(!saved[0].is_answered());
    }

    #[test]
    fn test_attach_answer_updates_in_place() {
        let store = Arc::new(MemoryStore::new());
        let mut history = ChatHistory::load(store.clone()).unwrap();
        let first = history.push("one").unwrap();
        let _second = history.push("two").unwrap();
        history.attach_answer(first, "uno").unwrap();

        assert_eq!(history.exchanges()[0].answer.as_deref(), Some("uno"));
        assert!(history.exchanges()[1].answer.is_none());
        assert_eq!(persisted(&store)[0].answer.as_deref(), Some("uno"));
    }

    #[test]
    fn test_attach_answer_unknown_id_is_error() {
        let store = Arc::new(MemoryStore::new());
        let mut history = ChatHistory::load(store).unwrap();
        assert!(history.attach_answer(Uuid::new_v4(), "x").is_err());
    }

    #[test]
    fn test_only_last_ten_persisted_in_order() {
        let store = Arc::new(MemoryStore::new());
        let mut history = ChatHistory::load(store.clone()).unwrap();
        for i in 0..13 {
            history.push(format!("q{i}")).unwrap();
        }
        assert_eq!(history.len(), 13);

        let saved = persisted(&store);
        assert_eq!(saved.len(), HISTORY_LIMIT);
        let questions: Vec<_> = saved.iter().map(|e| e.question.as_str()).collect();
        assert_eq!(questions.first(), Some(&"q3"));
        assert_eq!(questions.last(), Some(&"q12"));
    }

    #[test]
    fn test_load_restores_previous_session() {
        let store = Arc::new(MemoryStore::new());
        {
            let mut history = ChatHistory::load(store.clone()).unwrap();
            let id = history.push("remember me").unwrap();
            history.attach_answer(id, "remembered").unwrap();
        }
        let restored = ChatHistory::load(store).unwrap();
        assert_eq!(restored.len(), 1);
        assert_eq!(restored.latest().unwrap().answer.as_deref(), Some("remembered"));
    }

    #[test]
    fn test_corrupt_history_starts_empty() {
        let store = Arc::new(MemoryStore::new());
        store.set(CHAT_HISTORY_KEY, "{not an array").unwrap();
        let history = ChatHistory::load(store).unwrap();
        assert!(history.is_empty());
    }

    #[test]
    fn test_append_to_answer_accumulates_without_persisting() {
        let store = Arc::new(MemoryStore::new());
        let mut history = ChatHistory::load(store.clone()).unwrap();
        let id = history.push("stream it").unwrap();
        assert!(history.append_to_answer(id, "Hel"));
        assert!(history.append_to_answer(id, "lo"));
        assert!(!history.append_to_answer(Uuid::new_v4(), "x"));
        assert_eq!(history.get(id).unwrap().answer.as_deref(), Some("Hello"));
        assert!(persisted(&store)[0].answer.is_none());

        history.persist().unwrap();
        assert_eq!(persisted(&store)[0].answer.as_deref(), Some("Hello"));
    }

    #[test]
    fn test_unanswered_exchange_omits_answer_field() {
        let json = serde_json::to_value(Exchange::new("q")).unwrap();
        assert!(json.get("answer").is_none());
        assert_eq!(json["question"], "q");
    }
}
