//! Phrase tokenization and keyword matching.

/// Split a phrase into lowercase tokens, trimming surrounding punctuation.
///
/// Inner `-` and `_` are kept so names like `telegram-bot` stay one token.
#[must_use]
pub fn tokenize(phrase: &str) -> Vec<String> {
    phrase
        .split_whitespace()
        .map(|raw| {
            raw.trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase()
        })
        .filter(|token| !token.is_empty())
        .collect()
}

/// Whether any token of `candidate` appears among `tokens`.
#[must_use]
pub fn matches_any_token(tokens: &[String], candidate: &str) -> bool {
    tokenize(candidate).iter().any(|word| tokens.contains(word))
}

/// Whether the full token sequence of `candidate` appears contiguously in `tokens`.
#[must_use]
pub fn matches_verbatim(tokens: &[String], candidate: &str) -> bool {
    let needle = tokenize(candidate);
    if needle.is_empty() || needle.len() > tokens.len() {
        return false;
    }
    tokens.windows(needle.len()).any(|window| window == needle.as_slice())
}

/// Return the first candidate that matches `phrase`.
///
/// Non-strict matching accepts any shared token; strict matching requires
/// the candidate verbatim on token boundaries. Ties resolve to the first
/// candidate in the supplied order.
#[must_use]
pub fn word_match<'a, S: AsRef<str>>(
    phrase: &str,
    candidates: &'a [S],
    strict: bool,
) -> Option<&'a str> {
    let tokens = tokenize(phrase);
    if tokens.is_empty() {
        return None;
    }
    candidates.iter().map(|c| c.as_ref()).find(|candidate| {
        if strict {
            matches_verbatim(&tokens, candidate)
        } else {
            matches_any_token(&tokens, candidate)
        }
    })
}

/// Join items as `a, b and c` for spoken responses.
#[must_use]
pub fn comma_separated<S: AsRef<str>>(items: &[S]) -> String {
    match items {
        [] => String::new(),
        [only] => only.as_ref().to_owned(),
        [init @ .., last] => {
            let head: Vec<&str> = init.iter().map(|s| s.as_ref()).collect();
            format!("{} and {}", head.join(", "), last.as_ref())
        }
    }
}
