pub mod completion;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod quota;
pub mod store;
pub mod transcript;

pub use completion::{
    CompletionClient, CompletionError, CompletionRequest, OpenAiCompletionClient, STOP_SEQUENCES,
};
pub use config::ParleyConfig;
pub use error::ParleyError;
pub use models::{LogEntry, UserSession};
pub use quota::QuotaDecision;
pub use store::{MemoryUserStore, PgUserStore, StoreError, UserStore};
pub use transcript::{Speaker, Transcript, Turn};
