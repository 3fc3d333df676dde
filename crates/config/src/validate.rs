//! Configuration validation engine.
//!
//! Validates configuration files against the known schema, detects
//! unknown/misspelled fields, and reports settings the bot cannot run with.

use std::{collections::HashMap, path::Path};

use crate::schema::{EvalbotConfig, TELEGRAM_MAX_MESSAGE_LEN};

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
            Self::Info => write!(f, "info"),
        }
    }
}

/// A single validation diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Category: "syntax", "unknown-field", "type-error", "semantic", "file-ref"
    pub category: &'static str,
    /// Dotted path, e.g. "reply.inline_limit"
    pub path: String,
    pub message: String,
}

/// Result of validating a configuration file.
#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
    pub config_path: Option<std::path::PathBuf>,
}

impl ValidationResult {
    /// Returns `true` if any diagnostic is an error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    /// Count diagnostics by severity.
    #[must_use]
    pub fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }
}

// ── Schema tree for unknown-field detection ─────────────────────────────────

enum KnownKeys {
    Struct(HashMap<&'static str, KnownKeys>),
    Leaf,
}

/// Build the schema map mirroring every field in `schema.rs`.
fn build_schema_map() -> KnownKeys {
    use KnownKeys::{Leaf, Struct};

    Struct(HashMap::from([
        (
            "telegram",
            Struct(HashMap::from([
                ("token", Leaf),
                ("poll_timeout_secs", Leaf),
                ("register_commands", Leaf),
                ("source_url", Leaf),
            ])),
        ),
        (
            "evaluator",
            Struct(HashMap::from([
                ("snippet_source", Leaf),
                ("strict_variables", Leaf),
                ("working_dir", Leaf),
            ])),
        ),
        (
            "reply",
            Struct(HashMap::from([
                ("inline_limit", Leaf),
                ("attachment_extension", Leaf),
                ("oversized_caption", Leaf),
            ])),
        ),
    ]))
}

// ── Levenshtein distance ────────────────────────────────────────────────────

fn levenshtein(a: &str, b: &str) -> usize {
    let b_len = b.chars().count();
    if a.is_empty() {
        return b_len;
    }
    if b.is_empty() {
        return a.chars().count();
    }

    let mut prev: Vec<usize> = (0..=b_len).collect();
    let mut curr = vec![0; b_len + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.chars().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b_len]
}

/// Closest candidate within `max_distance` edits, if any.
fn suggest<'a>(needle: &str, candidates: &[&'a str], max_distance: usize) -> Option<&'a str> {
    let mut best: Option<(&'a str, usize)> = None;
    for &candidate in candidates {
        let d = levenshtein(needle, candidate);
        if d > 0 && d <= max_distance && best.as_ref().is_none_or(|(_, bd)| d < *bd) {
            best = Some((candidate, d));
        }
    }
    best.map(|(s, _)| s)
}

// ── Core validation ─────────────────────────────────────────────────────────

/// Validate a config file at the given path, or discover the default config
/// file location if `path` is `None`.
#[must_use]
pub fn validate(path: Option<&Path>) -> ValidationResult {
    let config_path = if let Some(p) = path {
        Some(p.to_path_buf())
    } else {
        crate::loader::find_config_file()
    };

    let Some(ref actual_path) = config_path else {
        return ValidationResult {
            diagnostics: vec![Diagnostic {
                severity: Severity::Info,
                category: "file-ref",
                path: String::new(),
                message: "no config file found; using defaults".into(),
            }],
            config_path: None,
        };
    };

    let is_toml = actual_path
        .extension()
        .and_then(|e| e.to_str())
        .is_none_or(|e| e == "toml");

    let mut result = if is_toml {
        match std::fs::read_to_string(actual_path) {
            Ok(content) => validate_toml_str(&crate::env_subst::substitute_env(&content)),
            Err(e) => ValidationResult {
                diagnostics: vec![Diagnostic {
                    severity: Severity::Error,
                    category: "syntax",
                    path: String::new(),
                    message: format!("failed to read config file: {e}"),
                }],
                config_path: None,
            },
        }
    } else {
        let diagnostics = match crate::loader::load_config(actual_path) {
            Ok(config) => validate_config(&config),
            Err(e) => vec![Diagnostic {
                severity: Severity::Error,
                category: "type-error",
                path: String::new(),
                message: e.to_string(),
            }],
        };
        ValidationResult {
            diagnostics,
            config_path: None,
        }
    };
    result.config_path = Some(actual_path.clone());
    result
}

/// Validate a TOML string without file-system side effects.
#[must_use]
pub fn validate_toml_str(toml_str: &str) -> ValidationResult {
    let mut diagnostics = Vec::new();

    // 1. Syntax
    let toml_value: toml::Value = match toml::from_str(toml_str) {
        Ok(v) => v,
        Err(e) => {
            diagnostics.push(Diagnostic {
                severity: Severity::Error,
                category: "syntax",
                path: String::new(),
                message: format!("TOML syntax error: {e}"),
            });
            return ValidationResult {
                diagnostics,
                config_path: None,
            };
        },
    };

    // 2. Unknown fields
    let schema = build_schema_map();
    check_unknown_fields(&toml_value, &schema, "", &mut diagnostics);

    // 3. Types, then semantics on the parsed config
    match toml::from_str::<EvalbotConfig>(toml_str) {
        Ok(config) => diagnostics.extend(validate_config(&config)),
        Err(e) => diagnostics.push(Diagnostic {
            severity: Severity::Error,
            category: "type-error",
            path: String::new(),
            message: format!("type error: {e}"),
        }),
    }

    ValidationResult {
        diagnostics,
        config_path: None,
    }
}

/// Semantic checks on a parsed config, run at startup after env overrides.
#[must_use]
pub fn validate_config(config: &EvalbotConfig) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    let mut push = |severity, path: &str, message: String| {
        diagnostics.push(Diagnostic {
            severity,
            category: "semantic",
            path: path.into(),
            message,
        });
    };

    if !config.telegram.has_token() {
        push(
            Severity::Error,
            "telegram.token",
            "no bot token configured (set TOKEN or telegram.token)".into(),
        );
    }
    if config.telegram.poll_timeout_secs == 0 {
        push(
            Severity::Warning,
            "telegram.poll_timeout_secs",
            "0 disables long polling and busy-loops getUpdates".into(),
        );
    }

    if config.evaluator.snippet_source.trim().is_empty() {
        push(
            Severity::Error,
            "evaluator.snippet_source",
            "must not be empty; tracebacks use it to find user frames".into(),
        );
    }

    let limit = config.reply.inline_limit;
    if limit == 0 {
        push(
            Severity::Error,
            "reply.inline_limit",
            "must be greater than 0".into(),
        );
    } else if limit > TELEGRAM_MAX_MESSAGE_LEN {
        push(
            Severity::Warning,
            "reply.inline_limit",
            format!("{limit} exceeds Telegram's {TELEGRAM_MAX_MESSAGE_LEN}-character message limit"),
        );
    }

    let ext = &config.reply.attachment_extension;
    if ext.is_empty() || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        push(
            Severity::Warning,
            "reply.attachment_extension",
            format!("\"{ext}\" is not a plain alphanumeric file extension"),
        );
    }

    diagnostics
}

/// Walk the TOML value tree against the schema tree and flag unknown keys.
fn check_unknown_fields(
    value: &toml::Value,
    schema: &KnownKeys,
    prefix: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let (toml::Value::Table(table), KnownKeys::Struct(fields)) = (value, schema) else {
        return;
    };
    let known_keys: Vec<&str> = fields.keys().copied().collect();
    for (key, child_value) in table {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        if let Some(child_schema) = fields.get(key.as_str()) {
            check_unknown_fields(child_value, child_schema, &path, diagnostics);
            continue;
        }
        let level = if prefix.is_empty() {
            "at top level "
        } else {
            ""
        };
        let msg = match suggest(key, &known_keys, 3) {
            Some(s) => format!("unknown field {level}(did you mean \"{s}\"?)"),
            None => format!("unknown field {level}"),
        };
        diagnostics.push(Diagnostic {
            severity: Severity::Error,
            category: "unknown-field",
            path,
            message: msg.trim().to_string(),
        });
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    #[rstest]
    #[case("hello", "hello", 0)]
    #[case("", "abc", 3)]
    #[case("abc", "", 3)]
    #[case("telegram", "telgram", 1)]
    #[case("cat", "car", 1)]
    fn levenshtein_distance(#[case] a: &str, #[case] b: &str, #[case] expected: usize) {
        assert_eq!(levenshtein(a, b), expected);
    }

    #[test]
    fn unknown_top_level_key_with_suggestion() {
        let result = validate_toml_str("[telgram]\ntoken = \"1:a\"\n");
        let d = result
            .diagnostics
            .iter()
            .find(|d| d.category == "unknown-field" && d.path == "telgram")
            .expect("unknown-field diagnostic for 'telgram'");
        assert_eq!(d.severity, Severity::Error);
        assert!(d.message.contains("\"telegram\""), "{}", d.message);
    }

    #[test]
    fn unknown_nested_key_with_suggestion() {
        let toml = "[telegram]\ntoken = \"1:a\"\n\n[reply]\ninline_limt = 100\n";
        let result = validate_toml_str(toml);
        let d = result
            .diagnostics
            .iter()
            .find(|d| d.path == "reply.inline_limt")
            .expect("unknown-field diagnostic for 'reply.inline_limt'");
        assert!(d.message.contains("inline_limit"));
    }

    #[test]
    fn syntax_error_detected() {
        let result = validate_toml_str("[telegram\n");
        assert!(result.has_errors());
        assert_eq!(result.diagnostics[0].category, "syntax");
    }

    #[test]
    fn type_error_detected() {
        let result = validate_toml_str("[reply]\ninline_limit = \"big\"\n");
        assert!(
            result
                .diagnostics
                .iter()
                .any(|d| d.category == "type-error")
        );
    }

    #[test]
    fn missing_token_is_error() {
        let result = validate_toml_str("");
        assert!(result.has_errors());
        assert!(
            result
                .diagnostics
                .iter()
                .any(|d| d.path == "telegram.token")
        );
    }

    #[test]
    fn complete_config_has_no_diagnostics() {
        let toml = r#"
[telegram]
token = "123:ABC"
poll_timeout_secs = 20
source_url = "https://example.com/evalbot"

[evaluator]
snippet_source = "<snippet>"
strict_variables = true

[reply]
inline_limit = 4096
attachment_extension = "TXT"
"#;
        let result = validate_toml_str(toml);
        assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);
    }

    #[rstest]
    #[case(0, Severity::Error)]
    #[case(5000, Severity::Warning)]
    fn inline_limit_bounds(#[case] limit: usize, #[case] severity: Severity) {
        let toml = format!("[telegram]\ntoken = \"1:a\"\n[reply]\ninline_limit = {limit}\n");
        let result = validate_toml_str(&toml);
        let d = result
            .diagnostics
            .iter()
            .find(|d| d.path == "reply.inline_limit")
            .expect("inline_limit diagnostic");
        assert_eq!(d.severity, severity);
        assert_eq!(result.count(severity), 1);
    }

    #[test]
    fn odd_extension_warned() {
        let toml = "[telegram]\ntoken = \"1:a\"\n[reply]\nattachment_extension = \".txt\"\n";
        let result = validate_toml_str(toml);
        assert!(!result.has_errors());
        assert_eq!(result.count(Severity::Warning), 1);
    }

    #[test]
    fn validates_json_file_by_loading_it() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("evalbot.json");
        std::fs::write(&path, r#"{"telegram": {"token": "1:a"}}"#).unwrap();

        let result = validate(Some(&path));
        assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);
        assert_eq!(result.config_path.as_deref(), Some(path.as_path()));
    }
}
