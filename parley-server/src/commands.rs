//! Slash commands and the reply texts they produce
//!
//! Commands match on the first word only: `/limit` or `/limit@<bot_username>`.
//! A command addressed to a different bot is not ours and is ignored.

use crate::session::{SessionError, SessionSettings, Usage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandSpec {
    pub command: &'static str,
    pub description: &'static str,
}

/// Published to the transport at startup.
pub const COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "help",
        description: "Get all commands and their description",
    },
    CommandSpec {
        command: "info",
        description: "Show model and limit settings",
    },
    CommandSpec {
        command: "ask",
        description: "Ask the chatbot a question",
    },
    CommandSpec {
        command: "reset",
        description: "Reset the chatbot",
    },
    CommandSpec {
        command: "limit",
        description: "View your message limit",
    },
    CommandSpec {
        command: "save",
        description: "Save the chat to a txt file",
    },
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    Info,
    Limit,
    Reset,
    Save,
    Ask(String),
}

impl Command {
    /// Parse `text` as a command for `bot_username`. Returns `None` for
    /// free-form text, unknown commands and commands meant for another bot.
    pub fn parse(text: &str, bot_username: &str) -> Option<Command> {
        let text = text.trim();
        let rest = text.strip_prefix('/')?;
        let (head, args) = match rest.split_once(char::is_whitespace) {
            Some((head, args)) => (head, args.trim()),
            None => (rest, ""),
        };

        let name = match head.split_once('@') {
            Some((name, target)) => {
                if !target.eq_ignore_ascii_case(bot_username) {
                    return None;
                }
                name
            }
            None => head,
        };

        match name {
            "start" => Some(Command::Start),
            "help" => Some(Command::Help),
            "info" => Some(Command::Info),
            "limit" => Some(Command::Limit),
            "reset" => Some(Command::Reset),
            "save" => Some(Command::Save),
            "ask" => Some(Command::Ask(args.to_string())),
            _ => None,
        }
    }
}

// ============================================================================
// Reply texts
// ============================================================================

pub const GREETING: &str = "Hi, I am a chatbot. How can I help you?";
pub const NO_CONVERSATION: &str = "You have not even started a conversation yet!";
pub const SAVE_CAPTION: &str = "Here is our conversation so far. Would you like to clear the conversation and start over? If so, use the /reset command.";
pub const ASK_USAGE: &str = "Usage: /ask <question>";
pub const COMPLETION_FAILED: &str =
    "Sorry, I could not come up with a reply just now. Please send your message again.";
pub const INTERNAL_FAILURE: &str = "Something went wrong on my side. Please try again later.";

pub fn help_text(model: &str, usage: Usage) -> String {
    format!(
        "Hi, I'm a chatbot ({} model). To get started, just type something in the chat!\n\
         You can use the following commands:\n\
         /start - Start the chatbot\n\
         /help - Show this message\n\
         /info - Show model and limit settings\n\
         /ask - Ask a single question (works in groups)\n\
         /limit - Show how many messages you have left (message limit resets every midnight UTC)\n\
         /save - Save the conversation to a txt file\n\
         /reset - Reset the chatbot\n\n\
         You have used {}/{} messages",
        model, usage.used, usage.limit
    )
}

pub fn info_text(model: &str, settings: &SessionSettings) -> String {
    format!(
        "Model: {}\nMax tokens: {}\nTemperature: {}\nMessage limit: {}\nReply timeout: {}s",
        model,
        settings.max_tokens,
        settings.temperature,
        settings.daily_limit,
        settings.completion_timeout.as_secs()
    )
}

pub fn limit_text(usage: Usage) -> String {
    if usage.exceeded() {
        format!(
            "You have used {}/{} messages. You have exceeded your message limit. Please wait until tomorrow for more messages.",
            usage.used, usage.limit
        )
    } else {
        format!("You have used {}/{} messages.", usage.used, usage.limit)
    }
}

/// Friendly reply for a failed operation.
pub fn error_reply(error: &SessionError) -> String {
    match error {
        SessionError::NoSession { .. } => NO_CONVERSATION.to_string(),
        SessionError::QuotaExceeded { used, limit } => format!(
            "You have reached the message limit of {} messages ({}/{} used). The limit resets every midnight UTC.",
            limit, used, limit
        ),
        SessionError::Completion(_) | SessionError::Timeout { .. } => {
            COMPLETION_FAILED.to_string()
        }
        SessionError::Store(_) => INTERNAL_FAILURE.to_string(),
    }
}
