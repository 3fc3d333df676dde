use std::{path::PathBuf, time::Instant};

use {
    evalbot_config::EvaluatorConfig,
    tokio::{runtime::Handle, task::JoinError},
    tracing::{debug, info, warn},
};

use crate::{
    engine,
    environment::Environment,
    traceback::{Frame, RaisedError, Sanitizer},
};

/// A script and the environment it runs against. Built once per `/run`.
#[derive(Debug)]
pub struct ExecutionRequest {
    script: String,
    environment: Environment,
}

impl ExecutionRequest {
    #[must_use]
    pub fn new(script: impl Into<String>, environment: Environment) -> Self {
        Self {
            script: script.into(),
            environment,
        }
    }
}

/// Result of evaluating one script: exactly one of the two variants.
///
/// `captured` is the print buffer as written, one `\n` per `print`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    /// The script ran to completion. `value` is the rendering of its final
    /// expression, absent when that was unit.
    Completed {
        captured: String,
        value: Option<String>,
    },
    /// The script raised. `captured` holds whatever it printed first.
    Failed { captured: String, traceback: String },
}

impl ExecutionOutcome {
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    #[must_use]
    pub fn captured(&self) -> &str {
        match self {
            Self::Completed { captured, .. } | Self::Failed { captured, .. } => captured,
        }
    }

    /// Text shown to the user: captured output untouched, then the value or
    /// traceback on its own line. Only the end of the whole text is trimmed.
    #[must_use]
    pub fn output_text(&self) -> String {
        let tail = match self {
            Self::Completed { value, .. } => value.as_deref(),
            Self::Failed { traceback, .. } => Some(traceback.as_str()),
        };
        let mut text = self.captured().to_string();
        if let Some(tail) = tail {
            if !text.is_empty() && !text.ends_with('\n') {
                text.push('\n');
            }
            text.push_str(tail);
        }
        text.truncate(text.trim_end().len());
        text
    }
}

/// Runs scripts and turns every failure into an [`ExecutionOutcome::Failed`].
#[derive(Debug, Clone)]
pub struct Evaluator {
    config: EvaluatorConfig,
    sanitizer: Sanitizer,
}

impl Evaluator {
    /// Paths in tracebacks are made relative to `config.working_dir`, or to
    /// the process working directory at the time of this call.
    #[must_use]
    pub fn new(config: EvaluatorConfig) -> Self {
        let base_dir = config
            .working_dir
            .clone()
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_default();
        Self::with_base_dir(config, base_dir)
    }

    #[must_use]
    pub fn with_base_dir(config: EvaluatorConfig, base_dir: impl Into<PathBuf>) -> Self {
        let sanitizer = Sanitizer::new(config.snippet_source.clone(), base_dir);
        Self { config, sanitizer }
    }

    /// Execute `request` and wait for everything the script started.
    ///
    /// The engine runs on the blocking pool; transport calls made by the
    /// script are driven on this runtime while the script waits for them.
    pub async fn evaluate(&self, request: ExecutionRequest) -> ExecutionOutcome {
        let ExecutionRequest {
            script,
            environment,
        } = request;
        let output = environment.output().clone();
        let config = self.config.clone();
        let runtime = Handle::current();
        let started = Instant::now();
        let script_len = script.len();

        debug!(script_len, "evaluating script");
        let job = tokio::task::spawn_blocking(move || {
            engine::run_script(&config, &script, environment, runtime)
        });
        let result = match job.await {
            Ok(result) => result,
            Err(err) => Err(panicked(err)),
        };

        let captured = output.contents();
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(value) => {
                info!(script_len, elapsed_ms, "script completed");
                ExecutionOutcome::Completed { captured, value }
            },
            Err(mut raised) => {
                info!(script_len, elapsed_ms, kind = %raised.kind, "script failed");
                raised.frames.insert(0, Frame::host("Evaluator::evaluate"));
                let traceback = self.sanitizer.sanitize(raised);
                ExecutionOutcome::Failed {
                    captured,
                    traceback,
                }
            },
        }
    }
}

fn panicked(err: JoinError) -> RaisedError {
    let message = match err.try_into_panic() {
        Ok(payload) => payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_default(),
        Err(err) => err.to_string(),
    };
    warn!(%message, "script engine panicked");
    RaisedError {
        frames: Vec::new(),
        kind: "Panic".into(),
        message,
    }
}
