use std::sync::Arc;

use {evalbot_config::EvalbotConfig, evalbot_eval::Evaluator};

use crate::outbound::TelegramOutbound;

/// Everything a message handler needs. Shared read-only across request tasks.
#[derive(Clone)]
pub struct BotState {
    pub bot: teloxide::Bot,
    /// Username reported by `getMe`, used to route `/cmd@username`.
    pub bot_username: Option<String>,
    pub config: Arc<EvalbotConfig>,
    pub evaluator: Arc<Evaluator>,
    pub outbound: Arc<TelegramOutbound>,
}

impl BotState {
    #[must_use]
    pub fn new(
        bot: teloxide::Bot,
        bot_username: Option<String>,
        config: Arc<EvalbotConfig>,
        evaluator: Arc<Evaluator>,
    ) -> Self {
        let outbound = Arc::new(TelegramOutbound::new(bot.clone()));
        Self {
            bot,
            bot_username,
            config,
            evaluator,
            outbound,
        }
    }
}
