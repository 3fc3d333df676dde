//! `evalbot doctor`: config validation and an offline pipeline check.
//!
//! Prints a report with `[ok]`, `[warn]`, `[fail]` or `[info]` per item and
//! exits non-zero when anything failed.

use std::{path::Path, sync::Arc};

use {
    anyhow::Result,
    async_trait::async_trait,
    evalbot_config::{
        EvalbotConfig,
        validate::{self, Diagnostic, Severity},
    },
    evalbot_eval::{
        Environment, Evaluator, ExecutionOutcome, ExecutionRequest, ScriptOutbound,
    },
    secrecy::ExposeSecret,
};

const GREEN: &str = "\x1b[32m";
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Ok,
    Warn,
    Fail,
    Info,
}

impl Status {
    fn label(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Warn => "warn",
            Self::Fail => "fail",
            Self::Info => "info",
        }
    }

    fn color(self) -> &'static str {
        match self {
            Self::Ok => GREEN,
            Self::Warn => YELLOW,
            Self::Fail => RED,
            Self::Info => CYAN,
        }
    }

    fn from_severity(severity: Severity) -> Self {
        match severity {
            Severity::Error => Self::Fail,
            Severity::Warning => Self::Warn,
            Severity::Info => Self::Info,
        }
    }
}

struct CheckItem {
    status: Status,
    message: String,
}

struct Section {
    title: String,
    items: Vec<CheckItem>,
}

impl Section {
    fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            items: Vec::new(),
        }
    }

    fn push(&mut self, status: Status, message: impl Into<String>) {
        self.items.push(CheckItem {
            status,
            message: message.into(),
        });
    }

    fn push_diagnostic(&mut self, d: &Diagnostic) {
        let message = if d.path.is_empty() {
            d.message.clone()
        } else {
            format!("{}: {}", d.path, d.message)
        };
        self.push(Status::from_severity(d.severity), message);
    }
}

fn print_report(sections: &[Section]) -> (usize, usize) {
    let mut errors = 0usize;
    let mut warnings = 0usize;

    for section in sections {
        eprintln!("{BOLD}{}{RESET}", section.title);
        for item in &section.items {
            let color = item.status.color();
            let label = item.status.label();
            eprintln!("  [{color}{label}{RESET}]  {}", item.message);
            match item.status {
                Status::Fail => errors += 1,
                Status::Warn => warnings += 1,
                _ => {},
            }
        }
        eprintln!();
    }

    (errors, warnings)
}

/// `config_path` is the `--config` override; `config` is the effective
/// configuration after environment and flag overrides.
pub async fn handle_doctor(config_path: Option<&Path>, config: &EvalbotConfig) -> Result<()> {
    eprintln!("{BOLD}evalbot doctor{RESET}");
    eprintln!("{BOLD}=============={RESET}\n");

    let sections = vec![
        check_config(config_path, config.telegram.has_token()),
        check_token(config),
        check_pipeline(config).await,
    ];

    let (errors, warnings) = print_report(&sections);
    eprintln!("{BOLD}Summary:{RESET} {errors} error(s), {warnings} warning(s)");

    if errors > 0 {
        std::process::exit(1);
    }
    Ok(())
}

/// File-level checks. A missing token in the file is not reported when the
/// token comes from elsewhere.
fn check_config(config_path: Option<&Path>, token_supplied: bool) -> Section {
    let result = validate::validate(config_path);
    let label = result
        .config_path
        .as_ref()
        .map_or_else(|| "defaults".to_string(), |p| p.display().to_string());
    let mut section = Section::new(format!("Config ({label})"));

    let syntax_errors: Vec<_> = result
        .diagnostics
        .iter()
        .filter(|d| d.category == "syntax" && d.severity == Severity::Error)
        .collect();
    if !syntax_errors.is_empty() {
        for d in syntax_errors {
            section.push_diagnostic(d);
        }
        return section;
    }
    if result.config_path.is_some() {
        section.push(Status::Ok, "Syntax valid");
    }

    let mut unknown = 0usize;
    let mut type_errors = 0usize;
    for d in &result.diagnostics {
        match d.category {
            "unknown-field" => unknown += 1,
            "type-error" => type_errors += 1,
            "semantic" if d.path == "telegram.token" && token_supplied => continue,
            _ => {},
        }
        section.push_diagnostic(d);
    }
    if unknown == 0 {
        section.push(Status::Ok, "All fields recognized");
    }
    if type_errors == 0 {
        section.push(Status::Ok, "No type errors");
    }

    section
}

fn check_token(config: &EvalbotConfig) -> Section {
    let mut section = Section::new("Telegram");
    if !config.telegram.has_token() {
        section.push(
            Status::Fail,
            "No bot token (set TOKEN, EVALBOT_TELEGRAM_TOKEN, --token or telegram.token)",
        );
        return section;
    }

    let token = config.telegram.token.expose_secret();
    let looks_valid = token
        .split_once(':')
        .is_some_and(|(id, secret)| !id.is_empty() && id.chars().all(|c| c.is_ascii_digit()) && !secret.is_empty());
    if looks_valid {
        section.push(Status::Ok, "Bot token present");
    } else {
        section.push(
            Status::Warn,
            "Bot token does not look like `<bot id>:<secret>`",
        );
    }
    section.push(
        Status::Info,
        format!("Long-poll timeout: {}s", config.telegram.poll_timeout_secs),
    );
    section
}

/// Outbound stub: the offline check never reaches Telegram.
struct Offline;

#[async_trait]
impl ScriptOutbound for Offline {
    async fn send_message(&self, _chat_id: i64, _text: &str) -> evalbot_eval::Result<i64> {
        Err(evalbot_eval::Error::message("offline"))
    }

    async fn reply(&self, _chat_id: i64, _message_id: i64, _text: &str) -> evalbot_eval::Result<i64> {
        Err(evalbot_eval::Error::message("offline"))
    }

    async fn edit_message(&self, _chat_id: i64, _message_id: i64, _text: &str) -> evalbot_eval::Result<()> {
        Err(evalbot_eval::Error::message("offline"))
    }

    async fn delete_message(&self, _chat_id: i64, _message_id: i64) -> evalbot_eval::Result<()> {
        Err(evalbot_eval::Error::message("offline"))
    }
}

/// Run a tiny script and a failing one through the evaluator.
async fn check_pipeline(config: &EvalbotConfig) -> Section {
    let mut section = Section::new("Evaluator");
    let evaluator = Evaluator::new(config.evaluator.clone());
    let message = serde_json::json!({ "message_id": 1, "chat": { "id": 1 }, "text": "/run" });

    let run = |script: &'static str| {
        let environment = Environment::build(
            &message,
            None,
            None::<&serde_json::Value>,
            Arc::new(Offline) as Arc<dyn ScriptOutbound>,
        );
        let evaluator = &evaluator;
        async move {
            let environment = environment?;
            Ok::<_, evalbot_eval::Error>(
                evaluator
                    .evaluate(ExecutionRequest::new(script, environment))
                    .await,
            )
        }
    };

    match run("print(\"ok\"); 40 + 2").await {
        Ok(ExecutionOutcome::Completed { captured, value })
            if captured == "ok\n" && value.as_deref() == Some("42") =>
        {
            section.push(Status::Ok, "Scripts run and print");
        },
        Ok(other) => section.push(
            Status::Fail,
            format!("Unexpected result: {}", other.output_text()),
        ),
        Err(e) => section.push(Status::Fail, format!("Environment build failed: {e}")),
    }

    match run("1 / 0").await {
        Ok(ExecutionOutcome::Failed { traceback, .. })
            if traceback.contains(config.evaluator.snippet_source.as_str())
                && traceback.ends_with("ZeroDivisionError: division by zero") =>
        {
            section.push(Status::Ok, "Tracebacks point at the snippet");
        },
        Ok(other) => section.push(
            Status::Fail,
            format!("Unexpected traceback: {}", other.output_text()),
        ),
        Err(e) => section.push(Status::Fail, format!("Environment build failed: {e}")),
    }

    section
}
