//! Health-log journal: per-user CRUD over the Supabase `health_logs` table.
//!
//! Requests run with the project's anon key and the caller's own access
//! token, so the store's row-level policy decides which rows are visible.

use std::time::Duration;

use serde::de::IgnoredAny;
use thiserror::Error;

use crate::config::{Secret, StoreConfig};
use crate::models::{HealthLog, HealthLogError, HealthLogInput, NewHealthLog};
use crate::store::StoreError;
use crate::supabase::SupabaseClient;

#[derive(Error, Debug)]
pub enum JournalError {
    #[error("{0}")]
    Invalid(#[from] HealthLogError),

    #[error("Not authorized: {0}")]
    Unauthorized(String),

    #[error("Health log {0} not found")]
    NotFound(i64),

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for JournalError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unauthorized(msg) => JournalError::Unauthorized(msg),
            other => JournalError::Store(other),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HealthLogJournal {
    client: SupabaseClient,
    table: String,
}

impl HealthLogJournal {
    pub fn new(client: SupabaseClient, table: String) -> Self {
        Self { client, table }
    }

    /// Build from config. Returns `Ok(None)` when no anon key is configured.
    pub fn from_config(config: &StoreConfig) -> Result<Option<Self>, StoreError> {
        if config.anon_key.is_empty() || config.url.trim().is_empty() {
            return Ok(None);
        }
        let client = SupabaseClient::new(
            &config.url,
            config.anon_key.clone(),
            Duration::from_secs(config.timeout_seconds),
        )?;
        Ok(Some(Self::new(client, config.health_table.clone())))
    }

    /// The caller's logs, most recent date first.
    pub async fn list(&self, token: &Secret) -> Result<Vec<HealthLog>, JournalError> {
        let user = self.client.get_user(token).await?;
        let logs = self
            .client
            .select(
                &self.table,
                &[
                    ("user_id", format!("eq.{}", user.id)),
                    ("order", "date.desc".to_string()),
                ],
                token,
            )
            .await?;
        Ok(logs)
    }

    pub async fn create(
        &self,
        token: &Secret,
        input: HealthLogInput,
    ) -> Result<HealthLog, JournalError> {
        input.validate()?;
        let user = self.client.get_user(token).await?;

        let row = NewHealthLog {
            input,
            user_id: user.id,
        };
        let mut created: Vec<HealthLog> = self
            .client
            .insert_returning(&self.table, std::slice::from_ref(&row), token)
            .await?;

        let log = created.pop().ok_or_else(|| {
            JournalError::Store(StoreError::Api {
                status: 200,
                message: "insert returned no rows".to_string(),
            })
        })?;

        tracing::info!(id = log.id, "Health log created");
        Ok(log)
    }

    /// Replace the editable fields of one log. Bounds are checked again here
    /// because edits bypass the create path.
    pub async fn update(
        &self,
        token: &Secret,
        id: i64,
        input: HealthLogInput,
    ) -> Result<HealthLog, JournalError> {
        input.validate()?;

        let mut updated: Vec<HealthLog> = self
            .client
            .update(&self.table, &[("id", format!("eq.{}", id))], &input, token)
            .await?;

        updated.pop().ok_or(JournalError::NotFound(id))
    }

    pub async fn delete(&self, token: &Secret, id: i64) -> Result<(), JournalError> {
        // Rows are only counted; legacy rows need not fit `HealthLog`.
        let deleted: Vec<IgnoredAny> = self
            .client
            .delete(&self.table, &[("id", format!("eq.{}", id))], token)
            .await?;

        if deleted.is_empty() {
            return Err(JournalError::NotFound(id));
        }

        tracing::info!(id, "Health log deleted");
        Ok(())
    }
}
