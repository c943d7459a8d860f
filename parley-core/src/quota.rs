//! Daily quota policy
//!
//! A user may complete `limit` exchanges per UTC day. The boundary is `>=`:
//! once `message_count` reaches the limit, further exchanges are denied.
//! Every quota check in the workspace goes through [`admit`].

use chrono::{DateTime, Utc};

use crate::store::{StoreError, UserStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaDecision {
    Allow,
    Deny,
}

impl QuotaDecision {
    pub fn is_allowed(self) -> bool {
        matches!(self, QuotaDecision::Allow)
    }
}

pub fn admit(message_count: i32, limit: i32) -> QuotaDecision {
    if message_count >= limit {
        QuotaDecision::Deny
    } else {
        QuotaDecision::Allow
    }
}

/// Zero every user's counter. Transcripts are left alone.
pub async fn reset_all_counters(
    store: &dyn UserStore,
    now: DateTime<Utc>,
) -> Result<u64, StoreError> {
    let visited = store.reset_counters().await?;
    tracing::info!(sessions = visited, at = %now, "Daily message counters reset");
    Ok(visited)
}
