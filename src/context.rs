//! Explicit session context shared by the lifecycle components.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::config::GlobalConfig;

/// Where a request came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// Interactive console conversation; confirmations are asked for.
    Voice,
    /// Non-interactive channel (local IPC); confirmations travel with the request.
    Offline,
}

/// Session-scoped flags and identity of the running controller.
#[derive(Debug)]
pub struct SessionContext {
    name: String,
    pid: u32,
    title: String,
    started: Instant,
    listening: AtomicBool,
    greeting: AtomicBool,
    volume: AtomicU8,
}

impl SessionContext {
    /// Build a context for the current process.
    #[must_use]
    pub fn new(name: impl Into<String>, title: impl Into<String>) -> Self {
        Self::with_pid(name, title, std::process::id())
    }

    /// Build a context with an explicit pid.
    #[must_use]
    pub fn with_pid(name: impl Into<String>, title: impl Into<String>, pid: u32) -> Self {
        Self {
            name: name.into(),
            pid,
            title: title.into(),
            started: Instant::now(),
            listening: AtomicBool::new(false),
            greeting: AtomicBool::new(true),
            volume: AtomicU8::new(0),
        }
    }

    /// Build a context from the loaded configuration.
    #[must_use]
    pub fn from_config(config: &GlobalConfig) -> Self {
        Self::new(config.name.clone(), config.title.clone())
    }

    /// The controller's own process name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The controller's own pid.
    #[must_use]
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Honorific used in responses.
    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Time since the controller started.
    #[must_use]
    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    /// Whether the console conversation is accepting phrases.
    #[must_use]
    pub fn is_listening(&self) -> bool {
        self.listening.load(Ordering::SeqCst)
    }

    /// Enable or disable listening.
    pub fn set_listening(&self, enabled: bool) {
        self.listening.store(enabled, Ordering::SeqCst);
    }

    /// Whether greetings are spoken.
    #[must_use]
    pub fn greeting(&self) -> bool {
        self.greeting.load(Ordering::SeqCst)
    }

    /// Enable or disable greetings (sentry mode turns them off).
    pub fn set_greeting(&self, enabled: bool) {
        self.greeting.store(enabled, Ordering::SeqCst);
    }

    /// Current output volume.
    #[must_use]
    pub fn volume(&self) -> u8 {
        self.volume.load(Ordering::SeqCst)
    }

    /// Record the output volume.
    pub fn set_volume(&self, level: u8) {
        self.volume.store(level.min(100), Ordering::SeqCst);
    }
}
