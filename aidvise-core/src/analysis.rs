//! Symptom analysis pipeline
//!
//! validate → inference → append to the symptom log → advisory text.
//!
//! The log write is best effort: a failed insert is logged and the advisory
//! text is still returned. Inference failures abort the request. Nothing is
//! retried and no state survives between calls.

use std::sync::Arc;

use thiserror::Error;

use crate::inference::{symptom_messages, InferenceBackend, InferenceError};
use crate::models::{NewSymptomLog, NO_RESPONSE};
use crate::store::SymptomLogStore;

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Invalid symptoms")]
    InvalidSymptoms,

    #[error("Inference failed: {0}")]
    Inference(#[from] InferenceError),
}

#[derive(Clone)]
pub struct SymptomAnalyzer {
    inference: Arc<dyn InferenceBackend>,
    store: Arc<dyn SymptomLogStore>,
    min_length: usize,
}

impl SymptomAnalyzer {
    pub fn new(
        inference: Arc<dyn InferenceBackend>,
        store: Arc<dyn SymptomLogStore>,
        min_length: usize,
    ) -> Self {
        Self {
            inference,
            store,
            min_length,
        }
    }

    pub fn store_name(&self) -> &str {
        self.store.name()
    }

    pub fn model(&self) -> &str {
        self.inference.model()
    }

    /// Returns the trimmed description, or `InvalidSymptoms` when it is
    /// absent or shorter than the minimum after trimming.
    pub fn validate<'a>(&self, symptoms: Option<&'a str>) -> Result<&'a str, AnalysisError> {
        let trimmed = symptoms.map(str::trim).unwrap_or("");
        if trimmed.chars().count() < self.min_length {
            return Err(AnalysisError::InvalidSymptoms);
        }
        Ok(trimmed)
    }

    /// Run one analysis and return the advisory text.
    pub async fn analyze(&self, symptoms: Option<&str>) -> Result<String, AnalysisError> {
        let trimmed = self.validate(symptoms)?;

        let messages = symptom_messages(trimmed);
        let completion = self.inference.complete(&messages).await?;

        let ai_response = match completion {
            Some(text) => text,
            None => {
                tracing::warn!(model = self.inference.model(), "Completion had no content");
                NO_RESPONSE.to_string()
            }
        };

        // Logged as received, not trimmed.
        let entry = NewSymptomLog {
            symptoms: symptoms.unwrap_or(trimmed).to_string(),
            ai_response,
        };

        if let Err(e) = self.store.append(&entry).await {
            tracing::error!(
                store = self.store.name(),
                error = %e,
                "Symptom log insert failed; returning advisory anyway"
            );
        }

        Ok(entry.ai_response)
    }
}
