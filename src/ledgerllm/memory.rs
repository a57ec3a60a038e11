//! Conversation memory: active threads plus an append-only audit projection.
//!
//! Two views of every thread:
//!
//! - **active** — the full ordered transcript used for prompt assembly; expires after an
//!   inactivity window (default 24 h).
//! - **audit** — one immutable record per message, unique on
//!   `(thread_id, message_index)`, retained beyond the active lifetime and only ever
//!   touched again to stamp `closed_at`.
//!
//! [`MongoMemory`] is the production store (TTL index on `last_activity`, unique index on
//! the audit pair).  [`EphemeralMemory`] keeps the same semantics in-process for
//! deployments without MongoDB and for the test suite.
//!
//! Audit-insert failures are logged and swallowed; active-view write failures propagate.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::Mutex;

/// Memory backend failures.
#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("memory backend error: {0}")]
    Backend(String),
}

/// One persisted transcript message.
///
/// Tool-role records never reach the store; the orchestrator persists synthesized
/// assistant summaries instead.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredMessage {
    pub role: String,
    pub content: String,
}

impl StoredMessage {
    pub fn new(role: &str, content: impl Into<String>) -> StoredMessage {
        StoredMessage {
            role: role.to_string(),
            content: content.into(),
        }
    }
}

/// Durable conversation store.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Ordered transcript of the active thread; empty when unknown or expired.
    async fn load(&self, thread_id: &str) -> Result<Vec<StoredMessage>, MemoryError>;

    /// Upsert the active thread, extend its message list, and insert one audit record per
    /// message.
    async fn append(
        &self,
        thread_id: &str,
        owner_id: &str,
        messages: &[StoredMessage],
    ) -> Result<(), MemoryError>;

    /// Remove the active thread and stamp its audit records closed.
    async fn close(&self, thread_id: &str) -> Result<(), MemoryError>;
}

// ---------------------------------------------------------------------------
// In-process store
// ---------------------------------------------------------------------------

/// One immutable audit row (in-process store).
#[derive(Debug, Clone)]
pub struct AuditRecord {
    pub thread_id: String,
    pub user_id: String,
    pub message_index: u64,
    pub role: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

struct ActiveThread {
    owner_id: String,
    #[allow(dead_code)]
    created_at: DateTime<Utc>,
    last_activity: DateTime<Utc>,
    messages: Vec<StoredMessage>,
    next_index: u64,
}

/// In-process [`MemoryStore`] with the same TTL and audit semantics as the Mongo store.
pub struct EphemeralMemory {
    ttl: Duration,
    active: Mutex<HashMap<String, ActiveThread>>,
    audit: Mutex<Vec<AuditRecord>>,
}

impl EphemeralMemory {
    /// Store with the given inactivity window.
    pub fn new(ttl_hours: i64) -> EphemeralMemory {
        EphemeralMemory {
            ttl: Duration::hours(ttl_hours),
            active: Mutex::new(HashMap::new()),
            audit: Mutex::new(Vec::new()),
        }
    }

    /// The audit rows for one thread, in insertion order.
    pub async fn audit_records(&self, thread_id: &str) -> Vec<AuditRecord> {
        self.audit
            .lock()
            .await
            .iter()
            .filter(|r| r.thread_id == thread_id)
            .cloned()
            .collect()
    }

    /// Force a thread's `last_activity` back in time (tests exercise TTL expiry with it).
    pub async fn backdate(&self, thread_id: &str, by_hours: i64) {
        if let Some(thread) = self.active.lock().await.get_mut(thread_id) {
            thread.last_activity = thread.last_activity - Duration::hours(by_hours);
        }
    }
}

#[async_trait]
impl MemoryStore for EphemeralMemory {
    async fn load(&self, thread_id: &str) -> Result<Vec<StoredMessage>, MemoryError> {
        let mut active = self.active.lock().await;
        let expired = match active.get(thread_id) {
            Some(thread) => {
                if Utc::now() - thread.last_activity <= self.ttl {
                    return Ok(thread.messages.clone());
                }
                true
            }
            None => false,
        };
        if expired {
            // Expired: drop the active view; audit rows stay.
            active.remove(thread_id);
        }
        Ok(Vec::new())
    }

    async fn append(
        &self,
        thread_id: &str,
        owner_id: &str,
        messages: &[StoredMessage],
    ) -> Result<(), MemoryError> {
        let now = Utc::now();
        let mut active = self.active.lock().await;
        let thread = active
            .entry(thread_id.to_string())
            .or_insert_with(|| ActiveThread {
                owner_id: owner_id.to_string(),
                created_at: now,
                last_activity: now,
                messages: Vec::new(),
                next_index: 0,
            });
        thread.last_activity = now;
        thread.messages.extend_from_slice(messages);

        let mut audit = self.audit.lock().await;
        for message in messages {
            audit.push(AuditRecord {
                thread_id: thread_id.to_string(),
                user_id: thread.owner_id.clone(),
                message_index: thread.next_index,
                role: message.role.clone(),
                content: message.content.clone(),
                timestamp: now,
                closed_at: None,
            });
            thread.next_index += 1;
        }
        Ok(())
    }

    async fn close(&self, thread_id: &str) -> Result<(), MemoryError> {
        let now = Utc::now();
        self.active.lock().await.remove(thread_id);
        for record in self.audit.lock().await.iter_mut() {
            if record.thread_id == thread_id && record.closed_at.is_none() {
                record.closed_at = Some(now);
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MongoDB store
// ---------------------------------------------------------------------------

use mongodb::bson::{doc, Bson, DateTime as BsonDateTime, Document};
use mongodb::options::{IndexOptions, ReturnDocument};
use mongodb::{Client, Collection, IndexModel};

/// MongoDB-backed [`MemoryStore`].
///
/// Collections: `chat_threads_active` (one document per thread, TTL-indexed on
/// `last_activity`) and `chat_threads_audit` (one document per message, unique on
/// `(thread_id, message_index)`).
pub struct MongoMemory {
    active: Collection<Document>,
    audit: Collection<Document>,
    counters: Collection<Document>,
}

impl MongoMemory {
    /// Connect and ensure the TTL and uniqueness indexes exist.
    pub async fn connect(
        uri: &str,
        db_name: &str,
        ttl_hours: i64,
    ) -> Result<MongoMemory, MemoryError> {
        let client = Client::with_uri_str(uri)
            .await
            .map_err(|e| MemoryError::Backend(e.to_string()))?;
        let db = client.database(db_name);
        let store = MongoMemory {
            active: db.collection("chat_threads_active"),
            audit: db.collection("chat_threads_audit"),
            counters: db.collection("chat_threads_counters"),
        };

        let ttl = std::time::Duration::from_secs((ttl_hours.max(1) as u64) * 3600);
        let ttl_index = IndexModel::builder()
            .keys(doc! {"last_activity": 1})
            .options(IndexOptions::builder().expire_after(ttl).build())
            .build();
        store
            .active
            .create_index(ttl_index)
            .await
            .map_err(|e| MemoryError::Backend(e.to_string()))?;

        let unique_index = IndexModel::builder()
            .keys(doc! {"thread_id": 1, "message_index": 1})
            .options(IndexOptions::builder().unique(true).build())
            .build();
        store
            .audit
            .create_index(unique_index)
            .await
            .map_err(|e| MemoryError::Backend(e.to_string()))?;

        Ok(store)
    }

    /// Reserve `count` consecutive audit indexes for a thread.
    async fn reserve_indexes(&self, thread_id: &str, count: u32) -> Result<i64, MemoryError> {
        let updated = self
            .counters
            .find_one_and_update(
                doc! {"thread_id": thread_id},
                doc! {"$inc": {"next_index": count as i64}},
            )
            .upsert(true)
            .return_document(ReturnDocument::After)
            .await
            .map_err(|e| MemoryError::Backend(e.to_string()))?;
        let next = updated
            .as_ref()
            .and_then(|d| d.get_i64("next_index").ok())
            .unwrap_or(count as i64);
        Ok(next - count as i64)
    }
}

#[async_trait]
impl MemoryStore for MongoMemory {
    async fn load(&self, thread_id: &str) -> Result<Vec<StoredMessage>, MemoryError> {
        let doc = self
            .active
            .find_one(doc! {"thread_id": thread_id})
            .await
            .map_err(|e| MemoryError::Backend(e.to_string()))?;

        let Some(doc) = doc else {
            return Ok(Vec::new());
        };
        let messages = doc
            .get_array("messages")
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| match item {
                        Bson::Document(d) => Some(StoredMessage {
                            role: d.get_str("role").unwrap_or("user").to_string(),
                            content: d.get_str("content").unwrap_or("").to_string(),
                        }),
                        _ => None,
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(messages)
    }

    async fn append(
        &self,
        thread_id: &str,
        owner_id: &str,
        messages: &[StoredMessage],
    ) -> Result<(), MemoryError> {
        if messages.is_empty() {
            return Ok(());
        }
        let now = BsonDateTime::now();
        let message_docs: Vec<Document> = messages
            .iter()
            .map(|m| doc! {"role": &m.role, "content": &m.content})
            .collect();

        self.active
            .update_one(
                doc! {"thread_id": thread_id},
                doc! {
                    "$setOnInsert": {
                        "thread_id": thread_id,
                        "user_id": owner_id,
                        "created_at": now,
                    },
                    "$set": {"last_activity": now},
                    "$push": {"messages": {"$each": message_docs}},
                },
            )
            .upsert(true)
            .await
            .map_err(|e| MemoryError::Backend(e.to_string()))?;

        // Audit rows are best-effort: failures are logged, never propagated.
        match self.reserve_indexes(thread_id, messages.len() as u32).await {
            Ok(base) => {
                for (offset, message) in messages.iter().enumerate() {
                    let record = doc! {
                        "thread_id": thread_id,
                        "user_id": owner_id,
                        "message_index": base + offset as i64,
                        "role": &message.role,
                        "content": &message.content,
                        "timestamp": now,
                    };
                    if let Err(err) = self.audit.insert_one(record).await {
                        log::warn!("audit insert failed for thread {}: {}", thread_id, err);
                    }
                }
            }
            Err(err) => {
                log::warn!(
                    "audit index reservation failed for thread {}: {}",
                    thread_id,
                    err
                );
            }
        }
        Ok(())
    }

    async fn close(&self, thread_id: &str) -> Result<(), MemoryError> {
        self.active
            .delete_one(doc! {"thread_id": thread_id})
            .await
            .map_err(|e| MemoryError::Backend(e.to_string()))?;
        self.audit
            .update_many(
                doc! {"thread_id": thread_id},
                doc! {"$set": {"closed_at": BsonDateTime::now()}},
            )
            .await
            .map_err(|e| MemoryError::Backend(e.to_string()))?;
        Ok(())
    }
}
