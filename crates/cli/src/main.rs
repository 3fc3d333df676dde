mod doctor_commands;

use std::{path::PathBuf, sync::Arc};

use {
    anyhow::Context,
    clap::{Parser, Subcommand},
    evalbot_config::{EvalbotConfig, Severity},
    evalbot_eval::Evaluator,
    secrecy::Secret,
    tracing::{error, info, warn},
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

/// HTTP client crates are noisy at `info`; keep them at `warn` unless
/// `RUST_LOG` says otherwise.
const QUIET_DEPENDENCIES: &str = "reqwest=warn,hyper=warn,hyper_util=warn";

#[derive(Parser)]
#[command(name = "evalbot", about = "Telegram bot that runs Rhai scripts", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Config file (overrides discovery in ./ and ~/.config/evalbot/).
    #[arg(long, global = true, env = "EVALBOT_CONFIG")]
    config: Option<PathBuf>,

    /// Bot token (overrides config file and environment).
    #[arg(long, global = true, hide_env_values = true)]
    token: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the bot (default when no subcommand is provided).
    Bot,
    /// Validate the configuration and check the evaluator offline.
    Doctor,
}

fn init_telemetry(cli: &Cli) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},{QUIET_DEPENDENCIES}", cli.log_level)));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

/// File (or defaults), then token environment variables, then `--token`.
fn load_config(cli: &Cli) -> anyhow::Result<EvalbotConfig> {
    let config = match cli.config.as_deref() {
        Some(path) => evalbot_config::load_config(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => evalbot_config::discover_and_load(),
    };
    let mut config = evalbot_config::apply_env_overrides(config);
    if let Some(token) = cli.token.as_ref().filter(|t| !t.trim().is_empty()) {
        config.telegram.token = Secret::new(token.clone());
    }
    Ok(config)
}

async fn run_bot(config: EvalbotConfig) -> anyhow::Result<()> {
    let diagnostics = evalbot_config::validate_config(&config);
    for d in &diagnostics {
        match d.severity {
            Severity::Error => error!(path = %d.path, "{}", d.message),
            Severity::Warning => warn!(path = %d.path, "{}", d.message),
            Severity::Info => info!(path = %d.path, "{}", d.message),
        }
    }
    if diagnostics.iter().any(|d| d.severity == Severity::Error) {
        anyhow::bail!("invalid configuration; run `evalbot doctor` for details");
    }

    let evaluator = Arc::new(Evaluator::new(config.evaluator.clone()));
    let cancel = evalbot_telegram::start_polling(Arc::new(config), evaluator).await?;

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            info!("shutdown requested");
        },
        () = cancel.cancelled() => {
            warn!("telegram polling stopped");
        },
    }
    cancel.cancel();
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    init_telemetry(&cli);

    info!(version = env!("CARGO_PKG_VERSION"), "evalbot starting");

    let config = load_config(&cli)?;

    match cli.command {
        None | Some(Commands::Bot) => run_bot(config).await,
        Some(Commands::Doctor) => {
            doctor_commands::handle_doctor(cli.config.as_deref(), &config).await
        },
    }
}
