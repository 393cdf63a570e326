//! Persistence for requests, documents and the per-owner active-request index.
//!
//! Key layout:
//! - `request:{id}`         → JSON `Request`
//! - `document:{id}`        → JSON `Document`
//! - `user:{owner_id}:active` → request id
//!
//! The substrate is eventually consistent. Reads that follow a write in the
//! same operation go through the `*_consistent` helpers, which wrap
//! `retry_with_backoff`. There are no cross-key transactions.

pub mod kv;
pub mod retry;

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::{Document, Request};

pub use kv::{KvStore, MemoryKv, RedisKv};
pub use retry::{retry_with_backoff, RetryPolicy};

const REQUEST_PREFIX: &str = "request:";
const DOCUMENT_PREFIX: &str = "document:";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Expiry window of {0} hours is out of range")]
    WindowOutOfRange(i64),
}

fn request_key(id: Uuid) -> String {
    format!("{REQUEST_PREFIX}{id}")
}

fn document_key(id: Uuid) -> String {
    format!("{DOCUMENT_PREFIX}{id}")
}

fn active_key(owner_id: &str) -> String {
    format!("user:{owner_id}:active")
}

#[derive(Clone)]
pub struct Storage {
    kv: Arc<dyn KvStore>,
    /// Expiry applied to every request/document write.
    ttl_secs: Option<u64>,
    retry: RetryPolicy,
}

impl Storage {
    pub fn new(kv: Arc<dyn KvStore>, ttl_secs: Option<u64>) -> Self {
        Self {
            kv,
            ttl_secs,
            retry: RetryPolicy::default(),
        }
    }

    async fn put_json<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StorageError> {
        let json = serde_json::to_string(value)?;
        self.kv.put(key, &json, self.ttl_secs).await
    }

    async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StorageError> {
        match self.kv.get(key).await? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    // ── Requests ─────────────────────────────────────────────────────────────

    pub async fn store_request(&self, request: &Request) -> Result<(), StorageError> {
        self.put_json(&request_key(request.id), request).await?;
        debug!(request_id = %request.id, status = request.status.as_str(), "Stored request");
        Ok(())
    }

    pub async fn get_request(&self, id: Uuid) -> Result<Option<Request>, StorageError> {
        self.get_json(&request_key(id)).await
    }

    /// Reads a request that was just written, retrying until it is visible.
    pub async fn get_request_consistent(&self, id: Uuid) -> Result<Option<Request>, StorageError> {
        retry_with_backoff(self.retry, "request", move || self.get_request(id)).await
    }

    /// Retries until a visible version of the request satisfies `ready`.
    pub async fn get_request_where<P>(
        &self,
        id: Uuid,
        ready: P,
    ) -> Result<Option<Request>, StorageError>
    where
        P: Fn(&Request) -> bool,
    {
        let ready = &ready;
        retry_with_backoff(self.retry, "request", move || async move {
            Ok::<_, StorageError>(self.get_request(id).await?.filter(|r| ready(r)))
        })
        .await
    }

    /// Deletes a request, its documents, and the owner's index entry if it
    /// still points here. Returns false when the request did not exist.
    pub async fn delete_request(&self, id: Uuid) -> Result<bool, StorageError> {
        let Some(request) = self.get_request(id).await? else {
            return Ok(false);
        };

        for document_id in &request.document_ids {
            self.kv.delete(&document_key(*document_id)).await?;
        }
        self.kv.delete(&request_key(id)).await?;
        self.clear_user_active_request(&request.owner_id, id).await?;

        info!(
            request_id = %id,
            documents = request.document_ids.len(),
            "Deleted request"
        );
        Ok(true)
    }

    // ── Documents ────────────────────────────────────────────────────────────

    pub async fn store_document(&self, document: &Document) -> Result<(), StorageError> {
        self.put_json(&document_key(document.id), document).await
    }

    pub async fn get_document(&self, id: Uuid) -> Result<Option<Document>, StorageError> {
        self.get_json(&document_key(id)).await
    }

    /// Resolves the request's `document_ids`; ids that do not resolve are skipped.
    pub async fn get_request_documents(
        &self,
        request: &Request,
    ) -> Result<Vec<Document>, StorageError> {
        let mut documents = Vec::with_capacity(request.document_ids.len());
        for id in &request.document_ids {
            match self.get_document(*id).await? {
                Some(document) => documents.push(document),
                None => debug!(request_id = %request.id, document_id = %id, "Document not visible"),
            }
        }
        Ok(documents)
    }

    /// Like `get_request_documents`, but waits until every listed id resolves.
    /// Falls back to whatever is visible once retries are exhausted.
    pub async fn get_request_documents_consistent(
        &self,
        request: &Request,
    ) -> Result<Vec<Document>, StorageError> {
        let expected = request.document_ids.len();
        let complete = retry_with_backoff(self.retry, "documents", move || async move {
            let documents = self.get_request_documents(request).await?;
            Ok::<_, StorageError>((documents.len() == expected).then_some(documents))
        })
        .await?;

        match complete {
            Some(documents) => Ok(documents),
            None => {
                warn!(request_id = %request.id, expected, "Not all documents became visible");
                self.get_request_documents(request).await
            }
        }
    }

    /// Every listed id must resolve. Unlike `get_request_documents_consistent`
    /// there is no partial fallback; an id that never becomes visible is an error.
    pub async fn get_request_documents_strict(
        &self,
        request: &Request,
    ) -> Result<Vec<Document>, StorageError> {
        let expected = request.document_ids.len();
        retry_with_backoff(self.retry, "documents", move || async move {
            let documents = self.get_request_documents(request).await?;
            Ok::<_, StorageError>((documents.len() == expected).then_some(documents))
        })
        .await?
        .ok_or_else(|| {
            StorageError::Unavailable(format!(
                "documents of request {} are not visible yet",
                request.id
            ))
        })
    }

    // ── Active-request index ─────────────────────────────────────────────────

    pub async fn set_user_active_request(
        &self,
        owner_id: &str,
        request_id: Uuid,
    ) -> Result<(), StorageError> {
        self.kv
            .put(&active_key(owner_id), &request_id.to_string(), self.ttl_secs)
            .await
    }

    pub async fn get_user_active_request_id(
        &self,
        owner_id: &str,
    ) -> Result<Option<Uuid>, StorageError> {
        let raw = self.kv.get(&active_key(owner_id)).await?;
        Ok(raw.and_then(|s| match Uuid::parse_str(&s) {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(owner_id, "Ignoring malformed active-request index entry: {e}");
                None
            }
        }))
    }

    /// Returns `None` if either the index or the request lookup misses.
    pub async fn get_user_active_request(
        &self,
        owner_id: &str,
    ) -> Result<Option<Request>, StorageError> {
        match self.get_user_active_request_id(owner_id).await? {
            Some(id) => self.get_request(id).await,
            None => Ok(None),
        }
    }

    /// Retries while either the index entry or the request it names is not
    /// visible yet. A first lookup for a new owner pays the full backoff.
    pub async fn get_user_active_request_consistent(
        &self,
        owner_id: &str,
    ) -> Result<Option<Request>, StorageError> {
        retry_with_backoff(self.retry, "active request", move || {
            self.get_user_active_request(owner_id)
        })
        .await
    }

    /// Removes the owner's index entry only if it still points at `request_id`.
    pub async fn clear_user_active_request(
        &self,
        owner_id: &str,
        request_id: Uuid,
    ) -> Result<(), StorageError> {
        if self.get_user_active_request_id(owner_id).await? == Some(request_id) {
            self.kv.delete(&active_key(owner_id)).await?;
        }
        Ok(())
    }

    // ── Expiry ───────────────────────────────────────────────────────────────

    pub async fn get_expired_requests(
        &self,
        older_than_hours: i64,
    ) -> Result<Vec<Request>, StorageError> {
        let cutoff = Duration::try_hours(older_than_hours)
            .and_then(|window| Utc::now().checked_sub_signed(window))
            .ok_or(StorageError::WindowOutOfRange(older_than_hours))?;
        let mut expired = Vec::new();

        for key in self.kv.list_keys(REQUEST_PREFIX).await? {
            let Some(request) = self.get_json::<Request>(&key).await? else {
                continue;
            };
            if request.last_activity < cutoff {
                expired.push(request);
            }
        }

        Ok(expired)
    }

    pub async fn cleanup_expired_requests(
        &self,
        older_than_hours: i64,
    ) -> Result<usize, StorageError> {
        let expired = self.get_expired_requests(older_than_hours).await?;
        let mut deleted = 0;
        for request in expired {
            if self.delete_request(request.id).await? {
                deleted += 1;
            }
        }
        if deleted > 0 {
            info!(deleted, older_than_hours, "Cleaned up expired requests");
        }
        Ok(deleted)
    }
}
