//! Routes inbound messages to session operations and sends the replies
//!
//! Every domain failure becomes a reply to the user. The only error that
//! leaves `handle` is a transport failure, which the caller logs; nothing
//! here can take down the poll loop or the scheduler.

use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::commands::{self, Command};
use crate::session::{OutboundPayload, SessionError, SessionManager};
use crate::transport::{ChatTransport, InboundMessage, TransportError};

pub struct Dispatcher {
    manager: Arc<SessionManager>,
    transport: Arc<dyn ChatTransport>,
    bot_username: String,
}

impl Dispatcher {
    pub fn new(
        manager: Arc<SessionManager>,
        transport: Arc<dyn ChatTransport>,
        bot_username: impl Into<String>,
    ) -> Self {
        Self {
            manager,
            transport,
            bot_username: bot_username.into(),
        }
    }

    pub async fn handle(
        &self,
        message: InboundMessage,
        now: DateTime<Utc>,
    ) -> Result<(), TransportError> {
        match Command::parse(&message.text, &self.bot_username) {
            Some(command) => self.run_command(command, &message, now).await,
            // Unknown commands and commands for other bots.
            None if message.text.trim_start().starts_with('/') => Ok(()),
            None if message.kind.is_shared() => Ok(()),
            None => self.chat(&message, now).await,
        }
    }

    async fn chat(&self, message: &InboundMessage, now: DateTime<Utc>) -> Result<(), TransportError> {
        self.typing(message.chat_id).await;

        let reply = match self
            .manager
            .handle_user_message(message.user_id, &message.text, now)
            .await
        {
            Ok(payload) => render_exchange(&payload),
            Err(e) => self.failure_reply(message, &e),
        };
        self.transport.send_text(message.chat_id, &reply).await
    }

    async fn run_command(
        &self,
        command: Command,
        message: &InboundMessage,
        now: DateTime<Utc>,
    ) -> Result<(), TransportError> {
        let (user_id, chat_id) = (message.user_id, message.chat_id);

        let reply = match command {
            Command::Start => match self.manager.start(user_id, now).await {
                Ok(_) => commands::GREETING.to_string(),
                Err(e) => self.failure_reply(message, &e),
            },
            Command::Help => match self.manager.usage(user_id).await {
                Ok(usage) => commands::help_text(self.manager.model(), usage),
                Err(e) => self.failure_reply(message, &e),
            },
            Command::Info => commands::info_text(self.manager.model(), self.manager.settings()),
            Command::Limit => match self.manager.usage(user_id).await {
                Ok(usage) => commands::limit_text(usage),
                Err(e) => self.failure_reply(message, &e),
            },
            Command::Reset => match self.manager.reset_user(user_id, now).await {
                Ok(_) => commands::GREETING.to_string(),
                Err(e) => self.failure_reply(message, &e),
            },
            Command::Save => match self.manager.export(user_id).await {
                Ok(export) => {
                    self.transport.send_text(chat_id, commands::SAVE_CAPTION).await?;
                    // The export only ever lives in memory; it is dropped once sent.
                    return self
                        .transport
                        .send_file(chat_id, &export.file_name, export.bytes)
                        .await;
                }
                Err(e) => self.failure_reply(message, &e),
            },
            Command::Ask(question) if question.is_empty() => commands::ASK_USAGE.to_string(),
            Command::Ask(question) => {
                self.typing(chat_id).await;
                match self.manager.ask(user_id, &question, now).await {
                    Ok(answer) => answer,
                    Err(e) => self.failure_reply(message, &e),
                }
            }
        };

        self.transport.send_text(chat_id, &reply).await
    }

    async fn typing(&self, chat_id: i64) {
        if let Err(e) = self.transport.send_typing(chat_id).await {
            tracing::debug!(chat_id, error = %e, "Typing indicator failed");
        }
    }

    fn failure_reply(&self, message: &InboundMessage, error: &SessionError) -> String {
        match error {
            SessionError::NoSession { .. } | SessionError::QuotaExceeded { .. } => {
                tracing::info!(user_id = message.user_id, reason = %error, "Request declined");
            }
            SessionError::Completion(_) | SessionError::Timeout { .. } | SessionError::Store(_) => {
                tracing::error!(
                    user_id = message.user_id,
                    chat_id = message.chat_id,
                    error = %error,
                    "Request failed"
                );
            }
        }
        commands::error_reply(error)
    }
}

/// Transcript excerpt followed by the new reply.
pub fn render_exchange(payload: &OutboundPayload) -> String {
    format!("{}\nBot: {}", payload.display_transcript, payload.latest_reply)
}
