//! Telegram Bot API transport
//!
//! Long-polls `getUpdates` and hands each text message to the dispatcher on
//! its own task. Outbound calls go through `sendMessage`, `sendChatAction`,
//! `sendDocument` and `setMyCommands`; rate limits and server errors are
//! retried with jittered exponential backoff.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;

use parley_core::config::TelegramConfig;

use crate::commands::CommandSpec;
use crate::dispatch::Dispatcher;
use crate::transport::{ChatKind, ChatTransport, InboundMessage, TransportError};

/// Telegram rejects messages longer than this many characters.
pub const MAX_MESSAGE_CHARS: usize = 4096;

const SEND_ATTEMPTS: usize = 3;

// ============================================================================
// Bot API structs (private)
// ============================================================================

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    error_code: Option<u16>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    message: Option<Message>,
}

#[derive(Debug, Deserialize)]
struct Message {
    from: Option<User>,
    chat: Chat,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct User {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct Chat {
    id: i64,
    #[serde(rename = "type")]
    kind: String,
}

// ============================================================================
// TelegramTransport
// ============================================================================

#[derive(Debug, Clone)]
pub struct TelegramTransport {
    client: Client,
    token: String,
    base_url: String,
    poll_timeout_seconds: u64,
}

impl TelegramTransport {
    pub fn new(config: &TelegramConfig) -> Result<Self, TransportError> {
        Self::with_base_url(config, config.api_base.clone())
    }

    /// Create a transport with a custom API base URL (for testing)
    pub fn with_base_url(
        config: &TelegramConfig,
        base_url: String,
    ) -> Result<Self, TransportError> {
        if config.token.is_empty() {
            return Err(TransportError::MissingToken);
        }

        // Must outlive the server-side long-poll wait.
        let client = Client::builder()
            .timeout(Duration::from_secs(config.poll_timeout_seconds + 10))
            .build()?;

        Ok(Self {
            client,
            token: config.token.clone(),
            base_url: base_url.trim_end_matches('/').to_string(),
            poll_timeout_seconds: config.poll_timeout_seconds,
        })
    }

    fn api_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.base_url, self.token, method)
    }

    /// One long-poll round. Returns the text messages received and the
    /// offset to pass next time.
    pub async fn get_updates(
        &self,
        offset: i64,
    ) -> Result<(Vec<InboundMessage>, i64), TransportError> {
        let body = serde_json::json!({
            "offset": offset,
            "timeout": self.poll_timeout_seconds,
            "allowed_updates": ["message"],
        });
        let updates: Vec<Update> = self.call("getUpdates", &body).await?;

        let next_offset = updates
            .iter()
            .map(|u| u.update_id + 1)
            .max()
            .unwrap_or(offset);

        let messages = updates.into_iter().filter_map(to_inbound).collect();
        Ok((messages, next_offset))
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        body: &serde_json::Value,
    ) -> Result<T, TransportError> {
        let response = self.client.post(self.api_url(method)).json(body).send().await?;
        parse_response(response).await
    }

    async fn call_with_retry<T: DeserializeOwned>(
        &self,
        method: &str,
        body: &serde_json::Value,
    ) -> Result<T, TransportError> {
        let strategy = ExponentialBackoff::from_millis(200)
            .max_delay(Duration::from_secs(5))
            .map(jitter)
            .take(SEND_ATTEMPTS - 1);

        RetryIf::spawn(
            strategy,
            || self.call(method, body),
            |e: &TransportError| e.is_retryable(),
        )
        .await
    }
}

async fn parse_response<T: DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, TransportError> {
    let status = response.status();
    let text = response.text().await?;

    let parsed: ApiResponse<T> =
        serde_json::from_str(&text).map_err(|_| TransportError::Api {
            code: status.as_u16(),
            description: text.clone(),
        })?;

    match (parsed.ok, parsed.result) {
        (true, Some(result)) => Ok(result),
        _ => Err(TransportError::Api {
            code: parsed.error_code.unwrap_or(status.as_u16()),
            description: parsed.description.unwrap_or_default(),
        }),
    }
}

fn to_inbound(update: Update) -> Option<InboundMessage> {
    let message = update.message?;
    Some(InboundMessage {
        user_id: message.from?.id,
        chat_id: message.chat.id,
        text: message.text?,
        kind: chat_kind(&message.chat.kind),
    })
}

fn chat_kind(kind: &str) -> ChatKind {
    match kind {
        "private" => ChatKind::Private,
        "supergroup" => ChatKind::Supergroup,
        "channel" => ChatKind::Channel,
        _ => ChatKind::Group,
    }
}

/// Split `message` into chunks of at most `max_chars` characters, preferring
/// to break at a newline.
pub fn split_message(message: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut remaining = message;

    while remaining.chars().count() > max_chars {
        let hard_end = remaining
            .char_indices()
            .nth(max_chars)
            .map(|(i, _)| i)
            .unwrap_or(remaining.len());
        let split = match remaining[..hard_end].rfind('\n') {
            Some(pos) if pos > 0 => pos,
            _ => hard_end,
        };
        chunks.push(remaining[..split].to_string());
        remaining = remaining[split..].strip_prefix('\n').unwrap_or(&remaining[split..]);
    }

    if !remaining.is_empty() || chunks.is_empty() {
        chunks.push(remaining.to_string());
    }
    chunks
}

#[async_trait]
impl ChatTransport for TelegramTransport {
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<(), TransportError> {
        for chunk in split_message(text, MAX_MESSAGE_CHARS) {
            let body = serde_json::json!({ "chat_id": chat_id, "text": chunk });
            let _: serde_json::Value = self.call_with_retry("sendMessage", &body).await?;
        }
        Ok(())
    }

    async fn send_typing(&self, chat_id: i64) -> Result<(), TransportError> {
        let body = serde_json::json!({ "chat_id": chat_id, "action": "typing" });
        let _: bool = self.call("sendChatAction", &body).await?;
        Ok(())
    }

    async fn send_file(
        &self,
        chat_id: i64,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<(), TransportError> {
        let part = Part::bytes(bytes).file_name(file_name.to_string());
        let form = Form::new()
            .text("chat_id", chat_id.to_string())
            .part("document", part);

        let response = self
            .client
            .post(self.api_url("sendDocument"))
            .multipart(form)
            .send()
            .await?;
        let _: serde_json::Value = parse_response(response).await?;

        tracing::info!(chat_id, file_name, "Telegram document sent");
        Ok(())
    }

    async fn set_commands(&self, commands: &[CommandSpec]) -> Result<(), TransportError> {
        let commands: Vec<serde_json::Value> = commands
            .iter()
            .map(|c| serde_json::json!({ "command": c.command, "description": c.description }))
            .collect();
        let body = serde_json::json!({ "commands": commands });
        let _: bool = self.call_with_retry("setMyCommands", &body).await?;
        Ok(())
    }
}

// ============================================================================
// Poll loop
// ============================================================================

/// Called from main.rs; runs until the shutdown signal fires.
pub async fn run_poll_loop(
    telegram: Arc<TelegramTransport>,
    dispatcher: Arc<Dispatcher>,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut offset: i64 = 0;
    tracing::info!("Telegram poll loop started");

    loop {
        tokio::select! {
            res = telegram.get_updates(offset) => {
                match res {
                    Ok((messages, next_offset)) => {
                        offset = next_offset;
                        for message in messages {
                            let dispatcher = dispatcher.clone();
                            tokio::spawn(async move {
                                let chat_id = message.chat_id;
                                if let Err(e) = dispatcher.handle(message, Utc::now()).await {
                                    tracing::warn!(chat_id, error = %e, "Failed to deliver reply");
                                }
                            });
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Telegram poll error");
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                }
            }
            _ = shutdown.recv() => {
                tracing::info!("Telegram poll loop shutting down");
                break;
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
