//! Append-only symptom log stores
//!
//! Provides a `SymptomLogStore` trait with implementations for:
//! - **PostgREST**: Supabase REST insert with the service-role key
//! - **Postgres**: direct insert over an sqlx pool

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;
use thiserror::Error;

use crate::config::{Secret, StoreBackend, StoreConfig};
use crate::models::NewSymptomLog;
use crate::supabase::SupabaseClient;

// ============================================================================
// SymptomLogStore trait
// ============================================================================

#[async_trait]
pub trait SymptomLogStore: Send + Sync {
    /// Append one row. Rows are never updated or deleted.
    async fn append(&self, entry: &NewSymptomLog) -> Result<(), StoreError>;

    /// Backend name for logging.
    fn name(&self) -> &str;
}

// ============================================================================
// Error types
// ============================================================================

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Store API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Store rejected credentials: {0}")]
    Unauthorized(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Missing store credential: {0}")]
    MissingCredential(&'static str),
}

/// Create the configured store. `pool` is required for the postgres backend.
pub fn create_store(
    config: &StoreConfig,
    pool: Option<PgPool>,
) -> Result<Arc<dyn SymptomLogStore>, StoreError> {
    match config.backend {
        StoreBackend::Postgrest => Ok(Arc::new(PostgrestLogStore::from_config(config)?)),
        StoreBackend::Postgres => {
            let pool = pool.ok_or(StoreError::MissingCredential("store.database.url"))?;
            Ok(Arc::new(PgLogStore::new(pool, config.symptom_table.clone())))
        }
    }
}

// ============================================================================
// PostgrestLogStore
// ============================================================================

/// Writes through Supabase REST with the service-role key. The key bypasses
/// row-level policy, so rows carry no caller identity.
pub struct PostgrestLogStore {
    client: SupabaseClient,
    service_key: Secret,
    table: String,
}

impl PostgrestLogStore {
    pub fn new(client: SupabaseClient, service_key: Secret, table: String) -> Self {
        Self {
            client,
            service_key,
            table,
        }
    }

    pub fn from_config(config: &StoreConfig) -> Result<Self, StoreError> {
        if config.service_key.is_empty() {
            return Err(StoreError::MissingCredential("store.service_key"));
        }
        let client = SupabaseClient::new(
            &config.url,
            config.service_key.clone(),
            Duration::from_secs(config.timeout_seconds),
        )?;
        Ok(Self::new(
            client,
            config.service_key.clone(),
            config.symptom_table.clone(),
        ))
    }
}

#[async_trait]
impl SymptomLogStore for PostgrestLogStore {
    async fn append(&self, entry: &NewSymptomLog) -> Result<(), StoreError> {
        self.client
            .insert(&self.table, std::slice::from_ref(entry), &self.service_key)
            .await
    }

    fn name(&self) -> &str {
        "postgrest"
    }
}

// ============================================================================
// PgLogStore
// ============================================================================

pub struct PgLogStore {
    pool: PgPool,
    insert_sql: String,
}

impl PgLogStore {
    /// `table` must already have passed `config::is_identifier`.
    pub fn new(pool: PgPool, table: String) -> Self {
        let insert_sql = format!(
            "INSERT INTO {} (symptoms, ai_response) VALUES ($1, $2)",
            table
        );
        Self { pool, insert_sql }
    }
}

#[async_trait]
impl SymptomLogStore for PgLogStore {
    async fn append(&self, entry: &NewSymptomLog) -> Result<(), StoreError> {
        sqlx::query(&self.insert_sql)
            .bind(&entry.symptoms)
            .bind(&entry.ai_response)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    fn name(&self) -> &str {
        "postgres"
    }
}

// ============================================================================
// TESTS
// ============================================================================
