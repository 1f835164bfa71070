use thiserror::Error;

use crate::inference::InferenceError;
use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum AidviseError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Inference client error: {0}")]
    Inference(#[from] InferenceError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}
