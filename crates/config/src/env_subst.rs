//! `${NAME}` and `${NAME:-fallback}` placeholders in raw config text.
//!
//! Deployments usually keep the bot token in the environment, so config
//! files carry `token = "${TOKEN}"` rather than the secret itself.

use tracing::warn;

const OPEN: &str = "${";
const FALLBACK: &str = ":-";

/// Expand placeholders from the process environment.
///
/// A placeholder with no value and no fallback is kept verbatim, which
/// validation then reports as a suspicious token.
pub fn substitute_env(input: &str) -> String {
    substitute_env_with(input, |name| std::env::var(name).ok())
}

fn substitute_env_with(input: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find(OPEN) {
        out.push_str(&rest[..start]);
        let after = &rest[start + OPEN.len()..];
        let Some(end) = after.find('}') else {
            out.push_str(&rest[start..]);
            return out;
        };
        let placeholder = &rest[start..start + OPEN.len() + end + 1];
        let (name, fallback) = match after[..end].split_once(FALLBACK) {
            Some((name, fallback)) => (name.trim(), Some(fallback)),
            None => (after[..end].trim(), None),
        };

        match (is_variable_name(name), lookup(name), fallback) {
            (true, Some(value), _) => out.push_str(&value),
            (true, None, Some(fallback)) => out.push_str(fallback),
            (true, None, None) => {
                warn!(variable = name, "config references an unset environment variable");
                out.push_str(placeholder);
            },
            (false, ..) => out.push_str(placeholder),
        }
        rest = &after[end + 1..];
    }

    out.push_str(rest);
    out
}

fn is_variable_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
