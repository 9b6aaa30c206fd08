//! Server-side session storage backends
//!
//! Session records live server-side keyed by an opaque session id; the cookie
//! only ever carries the key. Two backends are provided: an in-process map
//! for single-instance deployments and Redis for multi-instance ones. Both
//! store records as JSON strings so they stay interchangeable.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::models::UserSession;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("session store backend error: {0}")]
    Backend(String),
    #[error("session record serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Storage backend for session records
///
/// `get` on a missing or expired key is `Ok(None)`, never an error; `remove`
/// of an absent key succeeds. Backend failures (for example a Redis
/// connection drop) are the only `Err` cases.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Store or replace the record under `session_id` with the given lifetime
    async fn set(
        &self,
        session_id: &str,
        session: &UserSession,
        ttl: Duration,
    ) -> Result<(), StoreError>;

    /// Fetch the record under `session_id`, if present and unexpired
    async fn get(&self, session_id: &str) -> Result<Option<UserSession>, StoreError>;

    /// Remove the record under `session_id`; absent keys are not an error
    async fn remove(&self, session_id: &str) -> Result<(), StoreError>;
}

/// In-process session store for single-instance deployments
///
/// Entries carry a deadline and are evicted lazily on read.
#[derive(Default)]
pub struct MemorySessionStore {
    entries: Arc<RwLock<HashMap<String, StoredEntry>>>,
}

struct StoredEntry {
    json: String,
    deadline: DateTime<Utc>,
}

impl MemorySessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn set(
        &self,
        session_id: &str,
        session: &UserSession,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let json = serde_json::to_string(session)?;
        let deadline = Utc::now()
            + chrono::Duration::from_std(ttl)
                .map_err(|e| StoreError::Backend(format!("ttl out of range: {e}")))?;

        let mut entries = self.entries.write().await;
        entries.insert(session_id.to_string(), StoredEntry { json, deadline });
        Ok(())
    }

    async fn get(&self, session_id: &str) -> Result<Option<UserSession>, StoreError> {
        {
            let entries = self.entries.read().await;
            match entries.get(session_id) {
                None => return Ok(None),
                Some(entry) if entry.deadline > Utc::now() => {
                    let session = serde_json::from_str(&entry.json)?;
                    return Ok(Some(session));
                }
                Some(_) => {}
            }
        }

        // Expired entry, evict it
        let mut entries = self.entries.write().await;
        if entries
            .get(session_id)
            .is_some_and(|entry| entry.deadline <= Utc::now())
        {
            entries.remove(session_id);
        }
        Ok(None)
    }

    async fn remove(&self, session_id: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.write().await;
        entries.remove(session_id);
        Ok(())
    }
}

/// Redis-backed session store for multi-instance deployments
///
/// Uses `SET .. EX` so Redis owns expiry; keys are namespaced with a
/// configurable prefix.
#[derive(Clone)]
pub struct RedisSessionStore {
    connection: ConnectionManager,
    key_prefix: String,
}

impl RedisSessionStore {
    /// Connect to Redis and return a store using the given key prefix
    ///
    /// # Errors
    ///
    /// Returns an error if the Redis URL is invalid or the initial
    /// connection fails
    pub async fn connect(redis_url: &str, key_prefix: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| StoreError::Backend(format!("invalid redis url: {e}")))?;
        let connection = ConnectionManager::new(client)
            .await
            .map_err(|e| StoreError::Backend(format!("redis connection failed: {e}")))?;

        Ok(Self {
            connection,
            key_prefix: key_prefix.to_string(),
        })
    }

    fn prefixed_key(&self, session_id: &str) -> String {
        format!("{}{session_id}", self.key_prefix)
    }

    fn map_err(e: redis::RedisError) -> StoreError {
        StoreError::Backend(format!("redis error: {e}"))
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn set(
        &self,
        session_id: &str,
        session: &UserSession,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let json = serde_json::to_string(session)?;
        let key = self.prefixed_key(session_id);
        let mut conn = self.connection.clone();
        let _: () = conn
            .set_ex(&key, json, ttl.as_secs())
            .await
            .map_err(Self::map_err)?;
        Ok(())
    }

    async fn get(&self, session_id: &str) -> Result<Option<UserSession>, StoreError> {
        let key = self.prefixed_key(session_id);
        let mut conn = self.connection.clone();
        let json: Option<String> = conn.get(&key).await.map_err(Self::map_err)?;

        match json {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn remove(&self, session_id: &str) -> Result<(), StoreError> {
        let key = self.prefixed_key(session_id);
        let mut conn = self.connection.clone();
        let _: () = conn.del(&key).await.map_err(Self::map_err)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EndpointUrls, UserProfile, UserSession};
    use chrono::Duration as ChronoDuration;

    fn sample_session(id_suffix: &str) -> UserSession {
        UserSession {
            profile: UserProfile {
                id: format!("user-{id_suffix}"),
                correlation_id: None,
                contact_id: None,
                service_id: None,
                first_name: Some("Jane".to_string()),
                last_name: Some("Smith".to_string()),
                display_name: "Jane Smith".to_string(),
                email: Some("jane@example.com".to_string()),
                unique_reference: None,
                loa: None,
                aal: None,
                enrolment_count: None,
                enrolment_request_count: None,
                current_relationship_id: None,
                relationships: vec![],
                roles: vec![],
                jwt_exp: None,
            },
            is_authenticated: true,
            token: "token".to_string(),
            id_token: "id-token".to_string(),
            refresh_token: Some("refresh".to_string()),
            urls: EndpointUrls {
                token: "https://idp.example/token".to_string(),
                logout: "https://idp.example/logout".to_string(),
            },
            expires_in_ms: 3_600_000,
            expires_at: Utc::now() + ChronoDuration::hours(1),
            linked_organisation_id: None,
        }
    }

    #[tokio::test]
    async fn test_set_then_get_returns_record() {
        let store = MemorySessionStore::new();
        let session = sample_session("1");

        store
            .set("sid-1", &session, Duration::from_secs(60))
            .await
            .unwrap();

        let loaded = store.get("sid-1").await.unwrap().unwrap();
        assert_eq!(loaded.profile.id, "user-1");
        assert_eq!(loaded.token, "token");
    }

    #[tokio::test]
    async fn test_get_missing_key_is_none() {
        let store = MemorySessionStore::new();
        assert!(store.get("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_entry_is_none() {
        let store = MemorySessionStore::new();
        let session = sample_session("2");

        store
            .set("sid-2", &session, Duration::from_millis(10))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(store.get("sid-2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let store = MemorySessionStore::new();
        let session = sample_session("3");

        store
            .set("sid-3", &session, Duration::from_secs(60))
            .await
            .unwrap();

        store.remove("sid-3").await.unwrap();
        assert!(store.get("sid-3").await.unwrap().is_none());

        // Second removal of the same key also succeeds
        store.remove("sid-3").await.unwrap();
        store.remove("never-existed").await.unwrap();
    }

    #[tokio::test]
    async fn test_set_replaces_existing_record() {
        let store = MemorySessionStore::new();
        let mut session = sample_session("4");

        store
            .set("sid-4", &session, Duration::from_secs(60))
            .await
            .unwrap();

        session.token = "rotated-token".to_string();
        store
            .set("sid-4", &session, Duration::from_secs(60))
            .await
            .unwrap();

        let loaded = store.get("sid-4").await.unwrap().unwrap();
        assert_eq!(loaded.token, "rotated-token");
    }
}
