//! Request routing from phrases to lifecycle actions.

use std::sync::Arc;

use tracing::{debug, info_span, Instrument};

use crate::config::KeywordConfig;
use crate::context::Channel;
use crate::intent::{self, Intent};
use crate::orchestrator::power::PowerControl;
use crate::orchestrator::restart::{RestartCoordinator, RestartOutcome, RestartRequest};
use crate::speech::Conversation;
use crate::Result;

/// What the caller should do after a request was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    /// Keep serving requests.
    Continue,
    /// Enter the termination sequence.
    Terminate,
}

/// Classifies phrases and routes them to restart or power handling.
pub struct Controller {
    keywords: KeywordConfig,
    restarts: Arc<RestartCoordinator>,
    power: PowerControl,
}

impl Controller {
    /// Create a controller.
    #[must_use]
    pub fn new(keywords: KeywordConfig, restarts: Arc<RestartCoordinator>, power: PowerControl) -> Self {
        Self {
            keywords,
            restarts,
            power,
        }
    }

    /// Restart coordinator shared with internal callers.
    #[must_use]
    pub fn restarts(&self) -> &Arc<RestartCoordinator> {
        &self.restarts
    }

    /// Handle one phrase arriving on `channel`.
    ///
    /// Restart requests from the offline channel target background
    /// processes; spoken restart requests target the host.
    ///
    /// # Errors
    ///
    /// Propagates persistence and conversation errors from the handlers.
    pub async fn handle(
        &self,
        phrase: &str,
        channel: Channel,
        conversation: &dyn Conversation,
    ) -> Result<Directive> {
        let span = info_span!("handle", ?channel);
        async move {
            let intent = intent::classify(phrase, &self.keywords);
            debug!(?intent, "phrase classified");
            match intent {
                Some(Intent::Restart) => match channel {
                    Channel::Offline => {
                        let outcome = self
                            .restarts
                            .request(RestartRequest::Interactive { phrase: Some(phrase) }, conversation)
                            .await?;
                        if let RestartOutcome::Scheduled { target, .. } = &outcome {
                            debug!(target, "restart scheduled");
                        }
                        Ok(Directive::Continue)
                    }
                    Channel::Voice => self.power.restart_host(true, conversation),
                },
                Some(Intent::Shutdown) => self.power.shutdown_host(false, conversation),
                Some(Intent::Sleep) => self.power.sleep(conversation),
                Some(Intent::Sentry) => self.power.sentry(conversation),
                Some(Intent::Kill) => Ok(self.power.kill()),
                None => {
                    conversation.speak("I'm not sure how to help with that.")?;
                    Ok(Directive::Continue)
                }
            }
        }
        .instrument(span)
        .await
    }
}
