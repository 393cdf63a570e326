//! Key-value substrate. `RedisKv` backs production; `MemoryKv` backs tests and
//! local development and can simulate read-after-write lag.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use redis::{aio::ConnectionManager, Client};

use super::StorageError;

#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    async fn put(&self, key: &str, value: &str, ttl_secs: Option<u64>)
        -> Result<(), StorageError>;
    async fn delete(&self, key: &str) -> Result<(), StorageError>;
    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StorageError>;
}

#[derive(Clone)]
pub struct RedisKv {
    manager: ConnectionManager,
}

impl RedisKv {
    pub async fn connect(url: &str) -> Result<Self, StorageError> {
        tracing::info!("Connecting to Redis");
        let client = Client::open(url)?;

        // ConnectionManager reconnects automatically
        let manager = client.get_connection_manager().await.map_err(|e| {
            tracing::error!("Failed to get Redis connection manager: {e}");
            StorageError::from(e)
        })?;

        tracing::info!("Successfully connected to Redis");
        Ok(Self { manager })
    }
}

#[async_trait]
impl KvStore for RedisKv {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let mut conn = self.manager.clone();
        let value: Option<String> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
        Ok(value)
    }

    async fn put(
        &self,
        key: &str,
        value: &str,
        ttl_secs: Option<u64>,
    ) -> Result<(), StorageError> {
        let mut conn = self.manager.clone();
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        if let Some(ttl) = ttl_secs {
            cmd.arg("EX").arg(ttl);
        }
        let _: () = cmd.query_async(&mut conn).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let mut conn = self.manager.clone();
        let _: i64 = redis::cmd("DEL").arg(key).query_async(&mut conn).await?;
        Ok(())
    }

    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let mut conn = self.manager.clone();
        let pattern = format!("{prefix}*");
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();

        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(200)
                .query_async(&mut conn)
                .await?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }

        keys.sort();
        keys.dedup();
        Ok(keys)
    }
}

struct MemoryEntry {
    value: String,
    /// Reads left before a newly created key becomes visible.
    pending_reads: u32,
    expires_at: Option<Instant>,
}

impl MemoryEntry {
    fn visible(&self) -> Option<&str> {
        (self.pending_reads == 0).then_some(self.value.as_str())
    }
}

/// In-process store. With a non-zero `visibility_lag`, a newly created key
/// stays hidden for that many reads; overwrites of visible keys apply at once.
#[derive(Default)]
pub struct MemoryKv {
    entries: Mutex<HashMap<String, MemoryEntry>>,
    visibility_lag: u32,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_visibility_lag(visibility_lag: u32) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            visibility_lag,
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, MemoryEntry>>, StorageError> {
        self.entries
            .lock()
            .map_err(|e| StorageError::Unavailable(format!("memory store mutex poisoned: {e}")))
    }
}

#[async_trait]
impl KvStore for MemoryKv {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let mut entries = self.lock()?;
        let expired = entries
            .get(key)
            .and_then(|e| e.expires_at)
            .is_some_and(|at| at <= Instant::now());
        if expired {
            entries.remove(key);
            return Ok(None);
        }

        let Some(entry) = entries.get_mut(key) else {
            return Ok(None);
        };
        let value = entry.visible().map(str::to_string);
        if entry.pending_reads > 0 {
            entry.pending_reads -= 1;
        }
        Ok(value)
    }

    async fn put(
        &self,
        key: &str,
        value: &str,
        ttl_secs: Option<u64>,
    ) -> Result<(), StorageError> {
        let mut entries = self.lock()?;
        let pending_reads = entries.get(key).map_or(self.visibility_lag, |e| e.pending_reads);
        entries.insert(
            key.to_string(),
            MemoryEntry {
                value: value.to_string(),
                pending_reads,
                expires_at: ttl_secs.map(|s| Instant::now() + Duration::from_secs(s)),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.lock()?.remove(key);
        Ok(())
    }

    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let now = Instant::now();
        let entries = self.lock()?;
        let mut keys: Vec<String> = entries
            .iter()
            .filter(|(k, e)| {
                k.starts_with(prefix)
                    && e.visible().is_some()
                    && e.expires_at.map_or(true, |at| at > now)
            })
            .map(|(k, _)| k.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }
}
