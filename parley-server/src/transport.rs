//! Chat transport boundary: messages in, text and files out

use async_trait::async_trait;
use thiserror::Error;

use crate::commands::CommandSpec;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatKind {
    Private,
    Group,
    Supergroup,
    Channel,
}

impl ChatKind {
    /// Shared chats honour explicit commands only.
    pub fn is_shared(self) -> bool {
        !matches!(self, ChatKind::Private)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub user_id: i64,
    pub chat_id: i64,
    pub text: String,
    pub kind: ChatKind,
}

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({code}): {description}")]
    Api { code: u16, description: String },

    #[error("Missing bot token")]
    MissingToken,
}

impl TransportError {
    /// Rate limits, server errors and network failures are worth another try.
    pub fn is_retryable(&self) -> bool {
        match self {
            TransportError::Http(_) => true,
            TransportError::Api { code, .. } => *code == 429 || *code >= 500,
            TransportError::MissingToken => false,
        }
    }
}

#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<(), TransportError>;

    async fn send_typing(&self, chat_id: i64) -> Result<(), TransportError>;

    async fn send_file(
        &self,
        chat_id: i64,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<(), TransportError>;

    async fn set_commands(&self, commands: &[CommandSpec]) -> Result<(), TransportError>;
}
