pub mod analysis;
pub mod config;
pub mod db;
pub mod error;
pub mod inference;
pub mod journal;
pub mod models;
pub mod store;
pub mod supabase;

pub use analysis::{AnalysisError, SymptomAnalyzer};
pub use config::{AidviseConfig, Secret, StoreBackend};
pub use error::AidviseError;
pub use inference::{
    ChatConfig, ChatMessage, InferenceBackend, InferenceError, OpenAiChatClient, Role,
    SYMPTOMS_PREFIX, SYSTEM_PROMPT,
};
pub use journal::{HealthLogJournal, JournalError};
pub use store::{create_store, PgLogStore, PostgrestLogStore, StoreError, SymptomLogStore};
pub use supabase::{AuthUser, SupabaseClient};
