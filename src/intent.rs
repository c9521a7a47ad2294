//! Phrase-to-intent classification.

use serde::{Deserialize, Serialize};

use crate::config::KeywordConfig;
use crate::phrase::{matches_verbatim, tokenize};

/// Lifecycle intents the controller acts on.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    /// Restart background processes or the host.
    Restart,
    /// Power off the host.
    Shutdown,
    /// Lock the host screen.
    Sleep,
    /// Silence greetings.
    Sentry,
    /// Stop the controller itself.
    Kill,
}

/// Classify a phrase against the keyword vocabulary.
///
/// Intents are checked in the order kill, shutdown, restart, sleep, sentry;
/// the first intent with a verbatim keyword hit wins.
#[must_use]
pub fn classify(phrase: &str, keywords: &KeywordConfig) -> Option<Intent> {
    let tokens = tokenize(phrase);
    if tokens.is_empty() {
        return None;
    }

    let table: [(Intent, &[String]); 5] = [
        (Intent::Kill, &keywords.kill),
        (Intent::Shutdown, &keywords.shutdown),
        (Intent::Restart, &keywords.restart),
        (Intent::Sleep, &keywords.sleep),
        (Intent::Sentry, &keywords.sentry),
    ];

    table
        .into_iter()
        .find(|(_, words)| words.iter().any(|word| matches_verbatim(&tokens, word)))
        .map(|(intent, _)| intent)
}

/// Whether `reply` carries an affirmative acknowledgement token.
#[must_use]
pub fn is_affirmative(reply: Option<&str>, keywords: &KeywordConfig) -> bool {
    let Some(reply) = reply else {
        return false;
    };
    let tokens = tokenize(reply);
    keywords.ok.iter().any(|word| matches_verbatim(&tokens, word))
}
