//! Token storage
//!
//! At most one [`TokenRecord`] exists per `(user_id, provider)`. Writes are
//! upserts so that a second successful exchange replaces the first instead
//! of creating a duplicate.

use async_trait::async_trait;
use parking_lot::Mutex;
use sqlx::PgPool;
use std::collections::HashMap;

use super::types::{OAuthError, TokenRecord};

/// Embedded schema migrations
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// Persistence for token records
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Load the record for a user and provider
    ///
    /// # Errors
    ///
    /// Returns [`OAuthError::Storage`] if the backend fails.
    async fn find(&self, user_id: &str, provider: &str) -> Result<Option<TokenRecord>, OAuthError>;

    /// Insert or replace the record for `(record.user_id, record.provider)`
    ///
    /// # Errors
    ///
    /// Returns [`OAuthError::Storage`] if the backend fails.
    async fn upsert(&self, record: &TokenRecord) -> Result<TokenRecord, OAuthError>;

    /// Delete the record; returns whether one existed
    ///
    /// # Errors
    ///
    /// Returns [`OAuthError::Storage`] if the backend fails.
    async fn delete(&self, user_id: &str, provider: &str) -> Result<bool, OAuthError>;
}

/// Postgres-backed token store
#[derive(Debug, Clone)]
pub struct PgTokenStore {
    pool: PgPool,
}

impl PgTokenStore {
    /// Wrap an existing pool
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply the embedded migrations
    ///
    /// # Errors
    ///
    /// Returns error if a migration fails to apply
    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        MIGRATOR.run(&self.pool).await
    }
}

#[async_trait]
impl TokenStore for PgTokenStore {
    async fn find(&self, user_id: &str, provider: &str) -> Result<Option<TokenRecord>, OAuthError> {
        let record = sqlx::query_as::<_, TokenRecord>(
            r"
            SELECT user_id, provider, access_token, refresh_token, expires_at, scope, updated_at
            FROM token_records
            WHERE user_id = $1 AND provider = $2
            ",
        )
        .bind(user_id)
        .bind(provider)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    async fn upsert(&self, record: &TokenRecord) -> Result<TokenRecord, OAuthError> {
        let saved = sqlx::query_as::<_, TokenRecord>(
            r"
            INSERT INTO token_records
                (user_id, provider, access_token, refresh_token, expires_at, scope, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (user_id, provider)
            DO UPDATE SET
                access_token = EXCLUDED.access_token,
                refresh_token = EXCLUDED.refresh_token,
                expires_at = EXCLUDED.expires_at,
                scope = EXCLUDED.scope,
                updated_at = EXCLUDED.updated_at
            RETURNING user_id, provider, access_token, refresh_token, expires_at, scope, updated_at
            ",
        )
        .bind(&record.user_id)
        .bind(&record.provider)
        .bind(&record.access_token)
        .bind(&record.refresh_token)
        .bind(record.expires_at)
        .bind(&record.scope)
        .bind(record.updated_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(saved)
    }

    async fn delete(&self, user_id: &str, provider: &str) -> Result<bool, OAuthError> {
        let result = sqlx::query("DELETE FROM token_records WHERE user_id = $1 AND provider = $2")
            .bind(user_id)
            .bind(provider)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

/// In-memory token store for development and tests
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    records: Mutex<HashMap<(String, String), TokenRecord>>,
}

impl MemoryTokenStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// Whether the store is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn find(&self, user_id: &str, provider: &str) -> Result<Option<TokenRecord>, OAuthError> {
        Ok(self
            .records
            .lock()
            .get(&(user_id.to_string(), provider.to_string()))
            .cloned())
    }

    async fn upsert(&self, record: &TokenRecord) -> Result<TokenRecord, OAuthError> {
        self.records.lock().insert(
            (record.user_id.clone(), record.provider.clone()),
            record.clone(),
        );
        Ok(record.clone())
    }

    async fn delete(&self, user_id: &str, provider: &str) -> Result<bool, OAuthError> {
        Ok(self
            .records
            .lock()
            .remove(&(user_id.to_string(), provider.to_string()))
            .is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn record(user_id: &str, access: &str) -> TokenRecord {
        let now = Utc::now();
        TokenRecord {
            user_id: user_id.to_string(),
            provider: "zoom".to_string(),
            access_token: access.to_string(),
            refresh_token: Some("RT".to_string()),
            expires_at: now + Duration::hours(1),
            scope: None,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_memory_upsert_replaces_existing() {
        let store = MemoryTokenStore::new();
        store.upsert(&record("u1", "AT1")).await.unwrap();
        store.upsert(&record("u1", "AT2")).await.unwrap();

        assert_eq!(store.len(), 1);
        let found = store.find("u1", "zoom").await.unwrap().unwrap();
        assert_eq!(found.access_token, "AT2");
    }

    #[tokio::test]
    async fn test_memory_records_are_per_user_and_provider() {
        let store = MemoryTokenStore::new();
        store.upsert(&record("u1", "AT1")).await.unwrap();
        store.upsert(&record("u2", "AT2")).await.unwrap();

        assert_eq!(store.len(), 2);
        assert!(store.find("u1", "google").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_memory_delete_is_idempotent() {
        let store = MemoryTokenStore::new();
        store.upsert(&record("u1", "AT1")).await.unwrap();

        assert!(store.delete("u1", "zoom").await.unwrap());
        assert!(!store.delete("u1", "zoom").await.unwrap());
        assert!(store.is_empty());
    }

    async fn pg_store() -> Option<PgTokenStore> {
        let url = std::env::var("DATABASE_URL").ok()?;
        let pool = PgPool::connect(&url).await.ok()?;
        let store = PgTokenStore::new(pool);
        store.migrate().await.ok()?;
        Some(store)
    }

    #[tokio::test]
    #[ignore = "requires a Postgres DATABASE_URL"]
    async fn test_pg_upsert_find_delete() {
        let Some(store) = pg_store().await else {
            return;
        };
        let user_id = format!("test-{}", uuid::Uuid::new_v4());

        store.upsert(&record(&user_id, "AT1")).await.unwrap();
        let saved = store.upsert(&record(&user_id, "AT2")).await.unwrap();
        assert_eq!(saved.access_token, "AT2");

        let found = store.find(&user_id, "zoom").await.unwrap().unwrap();
        assert_eq!(found.access_token, "AT2");

        assert!(store.delete(&user_id, "zoom").await.unwrap());
        assert!(!store.delete(&user_id, "zoom").await.unwrap());
        assert!(store.find(&user_id, "zoom").await.unwrap().is_none());
    }
}
