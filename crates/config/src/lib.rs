//! Configuration loading, validation and env substitution.
//!
//! Config files: `evalbot.toml`, `evalbot.yaml`, or `evalbot.json`
//! Searched in `./` then `~/.config/evalbot/`.
//!
//! Supports `${ENV_VAR}` substitution in all string values.

pub mod env_subst;
pub mod error;
pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    error::{Error, Result},
    loader::{apply_env_overrides, config_dir, discover_and_load, load_config},
    schema::{
        DEFAULT_SNIPPET_SOURCE, EvalbotConfig, EvaluatorConfig, ReplyConfig,
        TELEGRAM_MAX_MESSAGE_LEN, TelegramConfig,
    },
    validate::{Diagnostic, Severity, ValidationResult, validate, validate_config},
};
