//! Bounded, durable mapping from context id to the client's private key.
//!
//! All contexts live in a single record (`psi.contexts`) of the underlying
//! [`KeyValueStore`], as a JSON array in insertion order. Capacity is enforced
//! on insert by dropping the oldest insertion. Reads never refresh an entry:
//! this is a FIFO, not an LRU, since sessions are short-lived.
//!
//! Every mutation is a read-modify-write of that one record. Mutations through
//! the same `ContextStore` are serialized; two processes sharing the backing
//! store can still lose each other's updates.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::envelope::Encoded;
use crate::error::{PsiError, Result};
use crate::store::KeyValueStore;

/// Record key holding the serialized contexts.
pub const CONTEXTS_KEY: &str = "psi.contexts";

/// Default number of contexts retained.
pub const DEFAULT_CONTEXT_CAPACITY: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Context {
    pub context_id: String,
    pub private_key: Encoded,
}

pub struct ContextStore<S> {
    store: S,
    capacity: usize,
    write: Mutex<()>,
}

impl<S: KeyValueStore> ContextStore<S> {
    pub fn new(store: S) -> Self {
        Self::with_capacity(store, DEFAULT_CONTEXT_CAPACITY)
    }

    pub fn with_capacity(store: S, capacity: usize) -> Self {
        Self {
            store,
            capacity: capacity.max(1),
            write: Mutex::new(()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Insert or replace a context, returning the ids evicted to stay in bounds.
    ///
    /// Re-inserting an existing id replaces its key and moves it to the newest
    /// position.
    pub async fn put(&self, context_id: &str, private_key: Encoded) -> Result<Vec<String>> {
        let _write = self.write.lock().await;
        let mut contexts = self.load().await?;
        contexts.retain(|c| c.context_id != context_id);
        contexts.push_back(Context {
            context_id: context_id.to_string(),
            private_key,
        });

        let mut evicted = Vec::new();
        while contexts.len() > self.capacity {
            if let Some(oldest) = contexts.pop_front() {
                info!(context_id = %oldest.context_id, "evicting oldest context");
                evicted.push(oldest.context_id);
            }
        }

        self.save(&contexts).await?;
        debug!(%context_id, stored = contexts.len(), "context stored");
        Ok(evicted)
    }

    pub async fn get(&self, context_id: &str) -> Result<Option<Encoded>> {
        let contexts = self.load().await?;
        Ok(contexts
            .into_iter()
            .find(|c| c.context_id == context_id)
            .map(|c| c.private_key))
    }

    /// Remove a context; `false` if it was not stored.
    pub async fn delete(&self, context_id: &str) -> Result<bool> {
        let _write = self.write.lock().await;
        let mut contexts = self.load().await?;
        let before = contexts.len();
        contexts.retain(|c| c.context_id != context_id);
        if contexts.len() == before {
            return Ok(false);
        }
        self.save(&contexts).await?;
        debug!(%context_id, "context deleted");
        Ok(true)
    }

    pub async fn len(&self) -> Result<usize> {
        Ok(self.load().await?.len())
    }

    /// Stored ids, oldest first.
    pub async fn ids(&self) -> Result<Vec<String>> {
        Ok(self
            .load()
            .await?
            .into_iter()
            .map(|c| c.context_id)
            .collect())
    }

    async fn load(&self) -> Result<VecDeque<Context>> {
        match self.store.get(CONTEXTS_KEY).await? {
            None => Ok(VecDeque::new()),
            Some(raw) => serde_json::from_str(&raw)
                .map_err(|e| PsiError::Storage(format!("corrupt context record: {e}"))),
        }
    }

    async fn save(&self, contexts: &VecDeque<Context>) -> Result<()> {
        let raw = serde_json::to_string(contexts)?;
        self.store.put(CONTEXTS_KEY, raw).await
    }
}
