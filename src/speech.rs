//! Conversation capability: speak a response, listen for a reply.
//!
//! Speech synthesis and recognition live outside this crate. The controller
//! only needs to deliver text and collect a yes/no token, so it depends on
//! the [`Conversation`] trait. [`ConsoleConversation`] backs the interactive
//! console; [`ScriptedConversation`] backs non-interactive channels, where
//! replies arrive with the request and responses are collected for the
//! caller.

use std::collections::VecDeque;
use std::io::{self, BufRead, Write};
use std::sync::Mutex;

use tracing::{debug, info};

use crate::{AppError, Result};

/// Speak/listen collaborator used by every lifecycle component.
pub trait Conversation: Send + Sync {
    /// Deliver `text` to the user.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` when the output channel is gone.
    fn speak(&self, text: &str) -> Result<()>;

    /// Wait for the user's reply; `None` when nothing was heard.
    fn listen(&self) -> Option<String>;

    /// Apply an output volume level (0-100).
    fn set_volume(&self, level: u8) {
        debug!(level, "volume change not supported by this conversation");
    }

    /// Restore the default voice.
    fn default_voice(&self) {
        debug!("voice change not supported by this conversation");
    }
}

/// Line-based conversation over stdin/stdout.
#[derive(Debug, Default)]
pub struct ConsoleConversation;

impl Conversation for ConsoleConversation {
    fn speak(&self, text: &str) -> Result<()> {
        let mut stdout = io::stdout().lock();
        writeln!(stdout, "{text}")
            .and_then(|()| stdout.flush())
            .map_err(|err| AppError::Io(format!("console output closed: {err}")))
    }

    fn listen(&self) -> Option<String> {
        let mut line = String::new();
        match io::stdin().lock().read_line(&mut line) {
            Ok(0) | Err(_) => None,
            Ok(_) => {
                let trimmed = line.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_owned())
            }
        }
    }

    fn set_volume(&self, level: u8) {
        info!(level, "console volume set");
    }

    fn default_voice(&self) {
        info!("console voice reset to default");
    }
}

/// Conversation with pre-supplied replies that records everything spoken.
#[derive(Debug, Default)]
pub struct ScriptedConversation {
    replies: Mutex<VecDeque<String>>,
    spoken: Mutex<Vec<String>>,
}

impl ScriptedConversation {
    /// Create a conversation that answers `listen` with `replies` in order.
    #[must_use]
    pub fn with_replies<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
            spoken: Mutex::new(Vec::new()),
        }
    }

    /// Everything spoken so far, in order.
    #[must_use]
    pub fn spoken(&self) -> Vec<String> {
        self.spoken
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

impl Conversation for ScriptedConversation {
    fn speak(&self, text: &str) -> Result<()> {
        self.spoken
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(text.to_owned());
        Ok(())
    }

    fn listen(&self) -> Option<String> {
        self.replies
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .pop_front()
    }
}
