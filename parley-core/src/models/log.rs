use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Archived transcript, written whenever a session row is deleted.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct LogEntry {
    pub id: i64,
    pub user_id: i64,
    pub archived_transcript: String,
    pub archived_at: DateTime<Utc>,
}
