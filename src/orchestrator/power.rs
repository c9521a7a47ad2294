//! Host power and presence controls.
//!
//! Destructive host actions (restart, shutdown) need an affirmative reply
//! unless they were triggered internally. Either way the controller is
//! told to terminate afterwards.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::config::KeywordConfig;
use crate::context::SessionContext;
use crate::dispatch::Directive;
use crate::intent;
use crate::phrase;
use crate::speech::Conversation;
use crate::supervisor::ProcessSupervisor;
use crate::Result;

/// Terminal applications closed before the host goes down.
pub const TERMINAL_APPS: [&str; 2] = ["iterm", "terminal"];

/// Restart, shutdown, sleep, sentry and kill.
pub struct PowerControl {
    ctx: Arc<SessionContext>,
    supervisor: Arc<dyn ProcessSupervisor>,
    keywords: KeywordConfig,
}

impl PowerControl {
    /// Create a power controller.
    #[must_use]
    pub fn new(
        ctx: Arc<SessionContext>,
        supervisor: Arc<dyn ProcessSupervisor>,
        keywords: KeywordConfig,
    ) -> Self {
        Self {
            ctx,
            supervisor,
            keywords,
        }
    }

    /// Restart the host, asking first when `ask` is set.
    ///
    /// # Errors
    ///
    /// Returns the conversation's error when a prompt cannot be delivered.
    pub fn restart_host(&self, ask: bool, conversation: &dyn Conversation) -> Result<Directive> {
        if !self.confirmed(ask, "restart your machine?", conversation)? {
            return self.left_intact(conversation);
        }
        self.stop_terminals();
        info!("restarting host");
        if let Err(err) = self.supervisor.reboot_host() {
            error!(%err, "host restart failed");
        }
        Ok(Directive::Terminate)
    }

    /// Power off the host, asking first unless `proceed` is set.
    ///
    /// # Errors
    ///
    /// Returns the conversation's error when a prompt cannot be delivered.
    pub fn shutdown_host(&self, proceed: bool, conversation: &dyn Conversation) -> Result<Directive> {
        if !self.confirmed(!proceed, "turn off the machine?", conversation)? {
            return self.left_intact(conversation);
        }
        self.stop_terminals();
        info!("shutting down host");
        if let Err(err) = self.supervisor.shutdown_host() {
            error!(%err, "host shutdown failed");
        }
        Ok(Directive::Terminate)
    }

    /// Lock the host screen and acknowledge.
    ///
    /// # Errors
    ///
    /// Returns the conversation's error when the acknowledgement fails.
    pub fn sleep(&self, conversation: &dyn Conversation) -> Result<Directive> {
        if let Err(err) = self.supervisor.lock_host() {
            warn!(%err, "failed to lock host");
        }
        conversation.speak(&format!("Done {}!", self.ctx.title()))?;
        Ok(Directive::Continue)
    }

    /// Turn greetings off.
    ///
    /// # Errors
    ///
    /// Returns the conversation's error when the response fails.
    pub fn sentry(&self, conversation: &dyn Conversation) -> Result<Directive> {
        conversation.speak(&format!(
            "Activating sentry mode, enjoy yourself {}!",
            self.ctx.title()
        ))?;
        self.ctx.set_greeting(false);
        Ok(Directive::Continue)
    }

    /// Stop the controller.
    #[must_use]
    pub fn kill(&self) -> Directive {
        info!("kill requested");
        Directive::Terminate
    }

    fn confirmed(&self, ask: bool, question: &str, conversation: &dyn Conversation) -> Result<bool> {
        if !ask {
            return Ok(true);
        }
        conversation.speak(&format!("Are you sure you want to {question}"))?;
        let reply = conversation.listen();
        Ok(intent::is_affirmative(reply.as_deref(), &self.keywords))
    }

    fn left_intact(&self, conversation: &dyn Conversation) -> Result<Directive> {
        conversation.speak(&format!("Machine state is left intact {}!", self.ctx.title()))?;
        Ok(Directive::Continue)
    }

    fn stop_terminals(&self) {
        for process in self.supervisor.list_processes() {
            if phrase::word_match(&process.name, &TERMINAL_APPS, false).is_none() {
                continue;
            }
            if let Err(err) = self.supervisor.stop_process(process.pid) {
                warn!(%err, name = process.name, pid = process.pid, "failed to stop terminal");
            }
        }
    }
}
