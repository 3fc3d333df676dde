use std::path::{Path, PathBuf};

use {
    secrecy::Secret,
    tracing::{debug, warn},
};

use crate::{
    env_subst::substitute_env,
    error::{Error, Result},
    schema::EvalbotConfig,
};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &[
    "evalbot.toml",
    "evalbot.yaml",
    "evalbot.yml",
    "evalbot.json",
];

/// Environment variables that supply the bot token, highest priority first.
/// `TOKEN` is the name most deployments already use.
const TOKEN_ENV_VARS: &[&str] = &["EVALBOT_TELEGRAM_TOKEN", "TOKEN"];

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> Result<EvalbotConfig> {
    let raw = std::fs::read_to_string(path).map_err(|source| Error::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let raw = substitute_env(&raw);
    parse_config(&raw, path)
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./evalbot.{toml,yaml,yml,json}` (project-local)
/// 2. `~/.config/evalbot/evalbot.{toml,yaml,yml,json}` (user-global)
///
/// Returns `EvalbotConfig::default()` if no config file is found.
pub fn discover_and_load() -> EvalbotConfig {
    if let Some(path) = find_config_file() {
        debug!(path = %path.display(), "loading config");
        match load_config(&path) {
            Ok(cfg) => return cfg,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
            },
        }
    } else {
        debug!("no config file found, using defaults");
    }
    EvalbotConfig::default()
}

/// Find the first config file in standard locations.
pub(crate) fn find_config_file() -> Option<PathBuf> {
    // Project-local
    for name in CONFIG_FILENAMES {
        let p = PathBuf::from(name);
        if p.exists() {
            return Some(p);
        }
    }

    // User-global: ~/.config/evalbot/
    let config_dir = config_dir()?;
    CONFIG_FILENAMES
        .iter()
        .map(|name| config_dir.join(name))
        .find(|p| p.exists())
}

/// Returns the user-global config directory (`~/.config/evalbot/`).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "evalbot").map(|d| d.config_dir().to_path_buf())
}

/// Apply token overrides from the process environment.
pub fn apply_env_overrides(config: EvalbotConfig) -> EvalbotConfig {
    apply_env_overrides_with(config, |name| std::env::var(name).ok())
}

/// Apply token overrides using a custom lookup function.
fn apply_env_overrides_with(
    mut config: EvalbotConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> EvalbotConfig {
    let token = TOKEN_ENV_VARS
        .iter()
        .find_map(|name| lookup(name).filter(|v| !v.trim().is_empty()));
    if let Some(token) = token {
        debug!("telegram token taken from environment");
        config.telegram.token = Secret::new(token);
    }
    config
}

fn parse_config(raw: &str, path: &Path) -> Result<EvalbotConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");
    let parse_error = |source: Box<dyn std::error::Error + Send + Sync>| Error::Parse {
        path: path.to_path_buf(),
        source,
    };

    match ext {
        "toml" => toml::from_str(raw).map_err(|e| parse_error(e.into())),
        "yaml" | "yml" => serde_yaml::from_str(raw).map_err(|e| parse_error(e.into())),
        "json" => serde_json::from_str(raw).map_err(|e| parse_error(e.into())),
        _ => Err(Error::UnsupportedFormat {
            extension: ext.to_string(),
        }),
    }
}
