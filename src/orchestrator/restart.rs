//! Restart coordination through durable restart records.
//!
//! A requester never restarts another process directly. It upserts a
//! [`RestartRecord`](crate::persistence::restart_repo::RestartRecord) keyed
//! by the target's name and the target's own supervision cycle picks it up
//! (see [`super::watcher`]). Interactive requests write the record after
//! [`RESTART_DEFERRAL`] so the spoken response goes out first.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::orchestrator::registry::ProcessRegistry;
use crate::persistence::restart_repo::{RestartRecord, RestartRepo};
use crate::phrase;
use crate::speech::Conversation;
use crate::Result;

/// Delay before an interactive restart request is persisted.
pub const RESTART_DEFERRAL: Duration = Duration::from_secs(5);

/// Caller key meaning "every background process".
pub const ALL_CALLER: &str = "ALL";

/// A restart request as it reaches the coordinator.
#[derive(Debug, Clone, Copy)]
pub enum RestartRequest<'a> {
    /// Internally triggered; record immediately, say nothing.
    Quiet {
        /// Name of the process that has to restart.
        caller: &'a str,
    },
    /// User-initiated; resolve the target from the phrase.
    Interactive {
        /// Phrase the user said or typed.
        phrase: Option<&'a str>,
    },
}

/// What the coordinator did with a request.
#[derive(Debug)]
pub enum RestartOutcome {
    /// A record was written synchronously.
    Recorded {
        /// Caller key of the record.
        caller: String,
    },
    /// A deferred write was scheduled.
    Scheduled {
        /// Caller key the timer will write.
        target: String,
        /// Timer task; resolves once the record is written.
        timer: JoinHandle<Result<()>>,
    },
    /// The phrase was missing; the user was asked to clarify.
    Clarify,
    /// No live background processes could be listed.
    RegistryUnavailable,
    /// The phrase named none of the live background processes.
    NoMatch {
        /// Names offered back to the user.
        available: Vec<String>,
    },
}

/// Turns restart requests into restart records.
pub struct RestartCoordinator {
    repo: RestartRepo,
    registry: Arc<ProcessRegistry>,
    delay: Duration,
}

impl RestartCoordinator {
    /// Create a coordinator using [`RESTART_DEFERRAL`].
    #[must_use]
    pub fn new(repo: RestartRepo, registry: Arc<ProcessRegistry>) -> Self {
        Self::with_delay(repo, registry, RESTART_DEFERRAL)
    }

    /// Create a coordinator with a custom deferral.
    #[must_use]
    pub fn with_delay(repo: RestartRepo, registry: Arc<ProcessRegistry>, delay: Duration) -> Self {
        Self {
            repo,
            registry,
            delay,
        }
    }

    /// Handle a restart request.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Persistence` when a quiet upsert fails, or the
    /// conversation's error when a response cannot be delivered.
    pub async fn request(
        &self,
        request: RestartRequest<'_>,
        conversation: &dyn Conversation,
    ) -> Result<RestartOutcome> {
        match request {
            RestartRequest::Quiet { caller } => {
                self.repo.upsert(caller).await?;
                info!(caller, "restart recorded");
                Ok(RestartOutcome::Recorded {
                    caller: caller.to_owned(),
                })
            }
            RestartRequest::Interactive { phrase } => {
                let Some(phrase) = phrase.filter(|p| !p.trim().is_empty()) else {
                    conversation.speak("Invalid request to restart.")?;
                    return Ok(RestartOutcome::Clarify);
                };
                self.interactive(phrase, conversation)
            }
        }
    }

    fn interactive(&self, phrase: &str, conversation: &dyn Conversation) -> Result<RestartOutcome> {
        if phrase::tokenize(phrase).iter().any(|token| token == "all") {
            let timer = self.schedule(ALL_CALLER.to_owned());
            conversation.speak("Restarting all background processes!")?;
            return Ok(RestartOutcome::Scheduled {
                target: ALL_CALLER.to_owned(),
                timer,
            });
        }

        let candidates = self.registry.names().unwrap_or_else(|err| {
            warn!(%err, "failed to read the process registry");
            Vec::new()
        });
        if candidates.is_empty() {
            conversation.speak("Unable to fetch background processes. Try specifying 'all'")?;
            return Ok(RestartOutcome::RegistryUnavailable);
        }

        match self.registry.match_name(phrase, &candidates, true) {
            Some(target) => {
                let timer = self.schedule(target.clone());
                conversation.speak(&format!("Restarting the background process '{target}'"))?;
                Ok(RestartOutcome::Scheduled { target, timer })
            }
            None => {
                conversation.speak(&format!(
                    "Please specify a process name. Available: {}",
                    phrase::comma_separated(&candidates)
                ))?;
                Ok(RestartOutcome::NoMatch {
                    available: candidates,
                })
            }
        }
    }

    /// Records currently waiting for their owner to pick them up.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Persistence` if the store cannot be read.
    pub async fn pending(&self) -> Result<Vec<RestartRecord>> {
        self.repo.list().await
    }

    fn schedule(&self, caller: String) -> JoinHandle<Result<()>> {
        let repo = self.repo.clone();
        let delay = self.delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            match repo.upsert(&caller).await {
                Ok(_) => {
                    info!(caller, "deferred restart recorded");
                    Ok(())
                }
                Err(err) => {
                    error!(%err, caller, "deferred restart could not be recorded");
                    Err(err)
                }
            }
        })
    }
}
