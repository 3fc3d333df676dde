use std::sync::Arc;

use {
    evalbot_eval::{
        Environment, ExecutionRequest, ScriptOutbound, deliver, escape_html, format_reply,
    },
    teloxide::types::{Message, User},
    tracing::{debug, info},
};

use crate::{
    commands::{self, Command},
    outbound::PlaceholderReply,
    state::BotState,
};

/// Placeholder shown while a script runs; replaced by the result.
pub const PLACEHOLDER: &str = "<i>Executing your code...</i>";

pub const RUN_USAGE: &str = "To execute a Rhai script, please include the code you wish to run. \
                             Use the command /run followed by your code.";

/// Handle a single inbound Telegram message (called from the polling loop).
pub async fn handle_message_direct(msg: Message, state: &BotState) -> anyhow::Result<()> {
    let Some(text) = msg.text() else {
        debug!(chat_id = msg.chat.id.0, "ignoring non-text message");
        return Ok(());
    };

    match commands::parse_command(text, state.bot_username.as_deref()) {
        Some(Command::Start) => handle_start(&msg, state).await,
        Some(Command::Run { script }) => handle_run(&msg, script, state).await,
        None => {
            debug!(chat_id = msg.chat.id.0, "ignoring non-command message");
            Ok(())
        },
    }
}

async fn handle_start(msg: &Message, state: &BotState) -> anyhow::Result<()> {
    let greeting = start_message(msg.from.as_ref(), state.config.telegram.source_url.as_deref());
    state
        .outbound
        .send_html(msg.chat.id, Some(msg.id), &greeting)
        .await?;
    info!(chat_id = msg.chat.id.0, "sent /start greeting");
    Ok(())
}

fn start_message(user: Option<&User>, source_url: Option<&str>) -> String {
    let name = user.map_or_else(|| "there".to_string(), mention_html);
    let mut text = format!(
        "Hi {name}!\n\
         Welcome, this bot runs Rhai scripts for you.\n\n\
         To get started, use the /run command followed by the script you want \
         to execute. Make sure your script is complete so it can run properly."
    );
    if let Some(url) = source_url {
        text.push_str("\n\n📦 <b>Source Code:</b> ");
        text.push_str(&escape_html(url));
    }
    text
}

/// HTML link that mentions `user` by id.
fn mention_html(user: &User) -> String {
    format!(
        "<a href=\"tg://user?id={}\">{}</a>",
        user.id.0,
        escape_html(&user.full_name())
    )
}

async fn handle_run(msg: &Message, script: String, state: &BotState) -> anyhow::Result<()> {
    let chat_id = msg.chat.id;
    if script.trim().is_empty() {
        state
            .outbound
            .send_html(chat_id, Some(msg.id), RUN_USAGE)
            .await?;
        debug!(chat_id = chat_id.0, "empty /run, sent usage");
        return Ok(());
    }

    let placeholder = state
        .outbound
        .send_html(chat_id, Some(msg.id), PLACEHOLDER)
        .await?;
    info!(
        chat_id = chat_id.0,
        message_id = msg.id.0,
        script_len = script.len(),
        "running script"
    );

    let environment = Environment::build(
        msg,
        msg.reply_to_message(),
        msg.from.as_ref(),
        Arc::clone(&state.outbound) as Arc<dyn ScriptOutbound>,
    )?;
    let outcome = state
        .evaluator
        .evaluate(ExecutionRequest::new(script.clone(), environment))
        .await;

    let reply = format_reply(&script, &outcome, &state.config.reply);
    let target = PlaceholderReply {
        outbound: Arc::clone(&state.outbound),
        chat_id,
        placeholder,
        origin: msg.id,
    };
    deliver(&reply, &target).await?;
    debug!(
        chat_id = chat_id.0,
        failed = outcome.is_failure(),
        "delivered script result"
    );
    Ok(())
}
