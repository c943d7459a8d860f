//! Conversation Session Manager: the read-modify-write cycle per user
//!
//! Every operation that mutates a session runs under that user's lock, so
//! two messages from the same user are processed one after the other while
//! different users never wait on each other. The lock is held across the
//! completion call; a second message from the same user queues behind it.
//!
//! Exchange commit rule: the user turn, the bot turn and the counter
//! increment are written by one `put` after the completion succeeds. If the
//! completion fails or times out, nothing is written.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};

use parley_core::quota;
use parley_core::{
    CompletionClient, CompletionError, CompletionRequest, ParleyConfig, StoreError, Turn,
    UserSession, UserStore,
};

// ============================================================================
// PUBLIC API
// ============================================================================

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub daily_limit: i32,
    pub max_tokens: u32,
    pub temperature: f32,
    pub completion_timeout: Duration,
    pub display_ceiling: usize,
}

impl From<&ParleyConfig> for SessionSettings {
    fn from(config: &ParleyConfig) -> Self {
        Self {
            daily_limit: config.quota.daily_limit,
            max_tokens: config.completion.max_tokens,
            temperature: config.completion.temperature,
            completion_timeout: Duration::from_secs(config.completion.timeout_seconds),
            display_ceiling: config.chat.display_ceiling,
        }
    }
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("No conversation for user {user_id}")]
    NoSession { user_id: i64 },

    #[error("Quota exceeded: {used}/{limit} messages used")]
    QuotaExceeded { used: i32, limit: i32 },

    #[error("Completion failed: {0}")]
    Completion(#[from] CompletionError),

    #[error("Completion timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// What the user sees after a successful exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundPayload {
    /// Transcript up to and including the new user turn, cut to the display
    /// ceiling. The reply itself is carried separately.
    pub display_transcript: String,
    pub latest_reply: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Usage {
    pub used: i32,
    pub limit: i32,
}

impl Usage {
    pub fn exceeded(&self) -> bool {
        !quota::admit(self.used, self.limit).is_allowed()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Export {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResetOutcome {
    pub preserved_count: i32,
}

// ============================================================================
// Per-user locks
// ============================================================================

#[derive(Debug, Default)]
pub struct UserLocks {
    locks: Arc<DashMap<i64, Arc<Mutex<()>>>>,
}

/// Holds one user's lock. On drop the map entry is removed unless another
/// task is still holding or waiting on it.
#[derive(Debug)]
pub struct UserGuard {
    user_id: i64,
    guard: Option<OwnedMutexGuard<()>>,
    locks: Arc<DashMap<i64, Arc<Mutex<()>>>>,
}

impl Drop for UserGuard {
    fn drop(&mut self) {
        // Release the mutex first so its Arc is no longer counted.
        self.guard.take();
        self.locks
            .remove_if(&self.user_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}

impl UserLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, user_id: i64) -> UserGuard {
        // Clone the Arc out so the map shard is released before awaiting.
        let lock = self.locks.entry(user_id).or_default().clone();
        let guard = lock.lock_owned().await;
        UserGuard {
            user_id,
            guard: Some(guard),
            locks: Arc::clone(&self.locks),
        }
    }

    /// Users with a live lock entry.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

// ============================================================================
// SessionManager
// ============================================================================

pub struct SessionManager {
    store: Arc<dyn UserStore>,
    completion: Arc<dyn CompletionClient>,
    settings: SessionSettings,
    locks: UserLocks,
}

impl SessionManager {
    pub fn new(
        store: Arc<dyn UserStore>,
        completion: Arc<dyn CompletionClient>,
        settings: SessionSettings,
    ) -> Self {
        Self {
            store,
            completion,
            settings,
            locks: UserLocks::new(),
        }
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn store(&self) -> &Arc<dyn UserStore> {
        &self.store
    }

    pub fn model(&self) -> &str {
        self.completion.model()
    }

    pub fn locks(&self) -> &UserLocks {
        &self.locks
    }

    /// Free-form message: one full exchange appended to the transcript.
    pub async fn handle_user_message(
        &self,
        user_id: i64,
        text: &str,
        now: DateTime<Utc>,
    ) -> Result<OutboundPayload, SessionError> {
        let _guard = self.locks.acquire(user_id).await;

        let mut session = self.load_or_empty(user_id, now).await?;
        self.check_quota(session.message_count)?;

        let mut transcript = session.transcript();
        transcript.push(&Turn::user(text));
        let display_transcript = transcript.display_excerpt(self.settings.display_ceiling);

        let raw = self.complete(transcript.prompt()).await?;
        let bot_turn = Turn::bot(&raw);
        transcript.push(&bot_turn);

        session.transcript = transcript.into_string();
        session.message_count = session.message_count.saturating_add(1);
        session.last_activity = now;
        self.store.put(&session).await?;

        tracing::debug!(
            user_id,
            message_count = session.message_count,
            "Exchange committed"
        );

        Ok(OutboundPayload {
            display_transcript,
            latest_reply: bot_turn.text.trim().to_string(),
        })
    }

    /// Single-shot question without transcript context. Counts against the
    /// quota like a normal exchange but leaves the transcript untouched.
    pub async fn ask(
        &self,
        user_id: i64,
        question: &str,
        now: DateTime<Utc>,
    ) -> Result<String, SessionError> {
        let _guard = self.locks.acquire(user_id).await;

        let mut session = self.load_or_empty(user_id, now).await?;
        self.check_quota(session.message_count)?;

        let raw = self.complete(question.to_string()).await?;

        session.message_count = session.message_count.saturating_add(1);
        session.last_activity = now;
        self.store.put(&session).await?;

        Ok(raw.trim().to_string())
    }

    /// Create an empty session if the user has none. Returns `true` if one
    /// was created.
    pub async fn start(&self, user_id: i64, now: DateTime<Utc>) -> Result<bool, SessionError> {
        let _guard = self.locks.acquire(user_id).await;

        if self.store.get(user_id).await?.is_some() {
            return Ok(false);
        }
        self.store.put(&UserSession::empty(user_id, now)).await?;
        Ok(true)
    }

    /// Messages used today. A user without a session has used none.
    pub async fn usage(&self, user_id: i64) -> Result<Usage, SessionError> {
        let used = self
            .store
            .get(user_id)
            .await?
            .map(|s| s.message_count)
            .unwrap_or(0);
        Ok(Usage {
            used,
            limit: self.settings.daily_limit,
        })
    }

    /// Full persisted transcript as `<user_id>.txt`.
    pub async fn export(&self, user_id: i64) -> Result<Export, SessionError> {
        let session = self
            .store
            .get(user_id)
            .await?
            .ok_or(SessionError::NoSession { user_id })?;

        let transcript = session.transcript();
        if transcript.is_empty() {
            return Err(SessionError::NoSession { user_id });
        }

        Ok(Export {
            file_name: format!("{}.txt", user_id),
            bytes: transcript.as_str().trim().as_bytes().to_vec(),
        })
    }

    /// Archive the transcript and start over. The counter carries across:
    /// the quota is per day, not per conversation.
    pub async fn reset_user(
        &self,
        user_id: i64,
        now: DateTime<Utc>,
    ) -> Result<ResetOutcome, SessionError> {
        let _guard = self.locks.acquire(user_id).await;

        let preserved_count = self
            .store
            .reset(user_id, now)
            .await?
            .ok_or(SessionError::NoSession { user_id })?;

        tracing::info!(user_id, preserved_count, "Conversation reset");

        Ok(ResetOutcome { preserved_count })
    }

    /// Zero every counter. Does not take user locks: a concurrent increment
    /// may land after the reset, which only costs that user one message.
    pub async fn reset_all_counters(&self, now: DateTime<Utc>) -> Result<u64, SessionError> {
        Ok(quota::reset_all_counters(self.store.as_ref(), now).await?)
    }

    async fn load_or_empty(
        &self,
        user_id: i64,
        now: DateTime<Utc>,
    ) -> Result<UserSession, SessionError> {
        Ok(self
            .store
            .get(user_id)
            .await?
            .unwrap_or_else(|| UserSession::empty(user_id, now)))
    }

    fn check_quota(&self, used: i32) -> Result<(), SessionError> {
        let limit = self.settings.daily_limit;
        if quota::admit(used, limit).is_allowed() {
            Ok(())
        } else {
            Err(SessionError::QuotaExceeded { used, limit })
        }
    }

    async fn complete(&self, prompt: String) -> Result<String, SessionError> {
        let request =
            CompletionRequest::new(prompt, self.settings.max_tokens, self.settings.temperature);
        let timeout = self.settings.completion_timeout;

        match tokio::time::timeout(timeout, self.completion.complete(&request)).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(SessionError::Timeout {
                seconds: timeout.as_secs(),
            }),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
