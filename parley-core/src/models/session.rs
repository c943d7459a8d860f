use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::transcript::Transcript;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserSession {
    pub user_id: i64,
    pub transcript: String,
    pub message_count: i32,
    pub last_activity: DateTime<Utc>,
}

impl UserSession {
    /// Fresh session with an empty transcript and a zero counter.
    pub fn empty(user_id: i64, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            transcript: String::new(),
            message_count: 0,
            last_activity: now,
        }
    }

    pub fn transcript(&self) -> Transcript {
        Transcript::from_stored(self.transcript.clone())
    }
}
