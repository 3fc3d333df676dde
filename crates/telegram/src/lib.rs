//! Telegram transport for evalbot.
//!
//! Long-polls the Bot API, routes `/start` and `/run`, and hands scripts a
//! `bot` binding backed by the same outbound client.

pub mod bot;
pub mod commands;
pub mod error;
pub mod handlers;
pub mod outbound;
pub mod state;

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod mock_api;

pub use {
    bot::{start_polling, start_polling_with_bot},
    error::{Error, Result},
    state::BotState,
};
