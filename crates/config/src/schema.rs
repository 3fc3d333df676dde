/// Config schema types (telegram transport, evaluator, reply formatting).
use std::path::PathBuf;

use {
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
};

/// Telegram's hard limit on the length of a single text message.
pub const TELEGRAM_MAX_MESSAGE_LEN: usize = 4096;

/// Source name given to compiled user scripts. Traceback frames carrying
/// this name belong to the user's code.
pub const DEFAULT_SNIPPET_SOURCE: &str = "<snippet>";

pub const DEFAULT_OVERSIZED_CAPTION: &str = "Output is too large to be sent as a text message.";

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EvalbotConfig {
    pub telegram: TelegramConfig,
    pub evaluator: EvaluatorConfig,
    pub reply: ReplyConfig,
}

/// Telegram bot account settings.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    /// Bot token from @BotFather.
    #[serde(serialize_with = "serialize_secret")]
    pub token: Secret<String>,

    /// Long-polling timeout passed to `getUpdates` (seconds).
    pub poll_timeout_secs: u32,

    /// Register `/start` and `/run` in the client command menu at startup.
    pub register_commands: bool,

    /// Link shown at the end of the `/start` greeting.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
}

impl std::fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("token", &"[REDACTED]")
            .field("poll_timeout_secs", &self.poll_timeout_secs)
            .field("register_commands", &self.register_commands)
            .finish_non_exhaustive()
    }
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            token: Secret::new(String::new()),
            poll_timeout_secs: 30,
            register_commands: true,
            source_url: None,
        }
    }
}

impl TelegramConfig {
    #[must_use]
    pub fn has_token(&self) -> bool {
        !self.token.expose_secret().trim().is_empty()
    }
}

fn serialize_secret<S: serde::Serializer>(
    secret: &Secret<String>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(secret.expose_secret())
}

/// Script engine settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EvaluatorConfig {
    /// Source name attached to compiled scripts; marks user frames in tracebacks.
    pub snippet_source: String,

    /// Reject scripts referencing variables that are not bound at compile time.
    pub strict_variables: bool,

    /// Base directory for relativizing traceback paths. Defaults to the
    /// process working directory at startup.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            snippet_source: DEFAULT_SNIPPET_SOURCE.into(),
            strict_variables: false,
            working_dir: None,
        }
    }
}

/// How evaluation results are rendered back to the chat.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ReplyConfig {
    /// Longest inline reply (in characters) before falling back to a file.
    pub inline_limit: usize,

    /// Extension of the fallback attachment (`<ID>.<ext>`).
    pub attachment_extension: String,

    /// Caption sent with the fallback attachment.
    pub oversized_caption: String,
}

impl Default for ReplyConfig {
    fn default() -> Self {
        Self {
            inline_limit: TELEGRAM_MAX_MESSAGE_LEN,
            attachment_extension: "TXT".into(),
            oversized_caption: DEFAULT_OVERSIZED_CAPTION.into(),
        }
    }
}
