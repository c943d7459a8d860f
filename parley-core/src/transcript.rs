//! Conversation transcript: the flat text blob sent to the completion API
//!
//! A transcript is a sequence of turns joined by `\n`:
//!
//! ```text
//! User: Hello
//! Bot: Hi there! How can I help?
//! User: Tell me a joke
//! ```
//!
//! The blob is stored verbatim and only ever grows until an explicit reset,
//! so it is never parsed back into turns.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Cue appended to the transcript to ask the model for the next bot turn.
pub const BOT_CUE: &str = "\nBot:";

/// Prefixed to a display excerpt that had to be cut.
pub const TRUNCATION_NOTICE: &str =
    "(message shortened because of message length limit. to show entire conversation execute /save)";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Speaker {
    User,
    Bot,
}

impl Speaker {
    pub fn label(self) -> &'static str {
        match self {
            Speaker::User => "User",
            Speaker::Bot => "Bot",
        }
    }
}

impl fmt::Display for Speaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One message in a transcript.
///
/// Bot text is kept in its normalised form (see [`normalize_reply`]), which
/// already carries the single separating space after `Bot:`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub speaker: Speaker,
    pub text: String,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::User,
            text: text.into(),
        }
    }

    /// Bot turn from raw completion output.
    pub fn bot(raw: &str) -> Self {
        Self {
            speaker: Speaker::Bot,
            text: normalize_reply(raw),
        }
    }

    pub fn render(&self) -> String {
        match self.speaker {
            Speaker::User => format!("{}: {}", self.speaker, self.text),
            Speaker::Bot => format!("{}:{}", self.speaker, self.text),
        }
    }
}

/// Trim the model output and prefix exactly one space.
pub fn normalize_reply(raw: &str) -> String {
    format!(" {}", raw.trim())
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transcript {
    text: String,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_stored(text: String) -> Self {
        Self { text }
    }

    pub fn push(&mut self, turn: &Turn) {
        if !self.text.is_empty() {
            self.text.push('\n');
        }
        self.text.push_str(&turn.render());
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn into_string(self) -> String {
        self.text
    }

    /// True when the transcript holds no turns (whitespace-only counts as empty).
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }

    /// Character count, as opposed to `len()` bytes.
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }

    /// Completion prompt: the full transcript followed by the bot cue.
    pub fn prompt(&self) -> String {
        format!("{}{}", self.text, BOT_CUE)
    }

    /// Copy of the transcript for display, limited to `ceiling` characters.
    pub fn display_excerpt(&self, ceiling: usize) -> String {
        display_excerpt(&self.text, ceiling)
    }
}

/// Keep the trailing `ceiling` characters of `text`, prefixed with
/// [`TRUNCATION_NOTICE`] when anything was cut.
pub fn display_excerpt(text: &str, ceiling: usize) -> String {
    let total = text.chars().count();
    if total <= ceiling {
        return text.to_string();
    }
    let tail: String = text.chars().skip(total - ceiling).collect();
    format!("{}\n{}", TRUNCATION_NOTICE, tail)
}
