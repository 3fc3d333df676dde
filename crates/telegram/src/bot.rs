use std::{sync::Arc, time::Duration};

use {
    evalbot_config::EvalbotConfig,
    evalbot_eval::Evaluator,
    secrecy::ExposeSecret,
    teloxide::{
        ApiError, RequestError,
        prelude::*,
        types::{AllowedUpdate, BotCommand, UpdateKind},
    },
    tokio_util::sync::CancellationToken,
    tracing::{debug, error, info, warn},
};

use crate::{Result, commands::COMMAND_MENU, handlers, state::BotState};

/// Extra HTTP time on top of the long-poll timeout so the client does not
/// abort `getUpdates` before Telegram answers.
const HTTP_TIMEOUT_MARGIN_SECS: u64 = 15;

const POLL_ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// Connect with the configured token and start polling.
///
/// Spawns a background task that processes updates until the returned
/// `CancellationToken` is cancelled.
pub async fn start_polling(
    config: Arc<EvalbotConfig>,
    evaluator: Arc<Evaluator>,
) -> anyhow::Result<CancellationToken> {
    let client = polling_client(config.telegram.poll_timeout_secs)?;
    let bot = Bot::with_client(config.telegram.token.expose_secret(), client);
    start_polling_with_bot(bot, config, evaluator).await
}

/// HTTP client whose timeout outlasts a `getUpdates` long poll.
fn polling_client(poll_timeout_secs: u32) -> Result<reqwest::Client> {
    let timeout = u64::from(poll_timeout_secs) + HTTP_TIMEOUT_MARGIN_SECS;
    Ok(teloxide::net::default_reqwest_settings()
        .timeout(Duration::from_secs(timeout))
        .build()?)
}

/// Like [`start_polling`] with an already built bot.
pub async fn start_polling_with_bot(
    bot: Bot,
    config: Arc<EvalbotConfig>,
    evaluator: Arc<Evaluator>,
) -> anyhow::Result<CancellationToken> {
    // Verify credentials and get bot username.
    let me = bot.get_me().await?;
    let bot_username = me.username.clone();

    // Delete any existing webhook so long polling works.
    bot.delete_webhook().await?;

    if config.telegram.register_commands {
        let commands: Vec<_> = COMMAND_MENU
            .iter()
            .map(|(name, description)| BotCommand::new(*name, *description))
            .collect();
        if let Err(e) = bot.set_my_commands(commands).await {
            warn!("failed to register bot commands: {e}");
        }
    }

    info!(username = ?bot_username, "telegram bot connected (webhook cleared)");

    let poll_timeout = config.telegram.poll_timeout_secs;
    let state = Arc::new(BotState::new(bot, bot_username, config, evaluator));
    let cancel = CancellationToken::new();
    tokio::spawn(poll_updates(state, poll_timeout, cancel.clone()));

    Ok(cancel)
}

async fn poll_updates(state: Arc<BotState>, poll_timeout: u32, cancel: CancellationToken) {
    info!("starting telegram manual polling loop");
    let mut offset: i32 = 0;

    loop {
        let result = tokio::select! {
            () = cancel.cancelled() => {
                info!("telegram polling stopped");
                break;
            },
            result = state
                .bot
                .get_updates()
                .offset(offset)
                .timeout(poll_timeout)
                .allowed_updates(vec![AllowedUpdate::Message])
                .send() => result,
        };

        match result {
            Ok(updates) => {
                debug!(count = updates.len(), "got telegram updates");
                for update in updates {
                    offset = update.id.as_offset();
                    match update.kind {
                        UpdateKind::Message(msg) => {
                            debug!(
                                chat_id = msg.chat.id.0,
                                message_id = msg.id.0,
                                "received telegram message"
                            );
                            let state = Arc::clone(&state);
                            tokio::spawn(async move {
                                let chat_id = msg.chat.id.0;
                                if let Err(e) = handlers::handle_message_direct(msg, &state).await {
                                    error!(chat_id, error = %e, "error handling telegram message");
                                }
                            });
                        },
                        other => {
                            debug!("ignoring non-message update: {other:?}");
                        },
                    }
                }
            },
            Err(e) => {
                if is_conflict(&e) {
                    warn!(
                        "telegram polling disabled: another instance is already running with this token"
                    );
                    cancel.cancel();
                    break;
                }

                warn!(error = %e, "telegram getUpdates failed");
                tokio::time::sleep(POLL_ERROR_BACKOFF).await;
            },
        }
    }
}

/// Another bot instance is polling with the same token.
fn is_conflict(error: &RequestError) -> bool {
    matches!(error, RequestError::Api(ApiError::TerminatedByOtherGetUpdates))
}
