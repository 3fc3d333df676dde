use std::{future::Future, sync::Arc, time::Duration};

use {
    async_trait::async_trait,
    evalbot_eval::{FileReply, ReplyTarget, ScriptOutbound},
    teloxide::{
        ApiError, RequestError,
        payloads::{EditMessageTextSetters, SendDocumentSetters, SendMessageSetters},
        prelude::*,
        types::{ChatId, InputFile, MessageId, ParseMode, ReplyParameters},
    },
    tracing::{debug, info, warn},
};

use crate::{Error, Result};

const TELEGRAM_RETRY_AFTER_MAX_RETRIES: usize = 4;

/// Outbound Bot API calls, shared by the handlers and by scripts' `bot`.
pub struct TelegramOutbound {
    bot: Bot,
}

impl TelegramOutbound {
    #[must_use]
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    /// Send an HTML message, optionally as a reply. Returns the new message id.
    pub async fn send_html(
        &self,
        chat_id: ChatId,
        reply_to: Option<MessageId>,
        text: &str,
    ) -> Result<MessageId> {
        let message = self
            .run_telegram_request_with_retry(chat_id, "send message (html)", || {
                let mut req = self
                    .bot
                    .send_message(chat_id, text)
                    .parse_mode(ParseMode::Html);
                if let Some(id) = reply_to {
                    req = req.reply_parameters(reply_params(id));
                }
                async move { req.await }
            })
            .await?;
        Ok(message.id)
    }

    /// Replace a message's text with HTML. "Not modified" counts as success.
    pub async fn edit_html(&self, chat_id: ChatId, message_id: MessageId, text: &str) -> Result<()> {
        let result = self
            .run_telegram_request_with_retry(chat_id, "edit message (html)", || {
                let req = self
                    .bot
                    .edit_message_text(chat_id, message_id, text)
                    .parse_mode(ParseMode::Html);
                async move { req.await }
            })
            .await;
        match result {
            Ok(_) => Ok(()),
            Err(e) if is_message_not_modified_error(&e) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn delete(&self, chat_id: ChatId, message_id: MessageId) -> Result<()> {
        self.run_telegram_request_with_retry(chat_id, "delete message", || {
            let req = self.bot.delete_message(chat_id, message_id);
            async move { req.await }
        })
        .await?;
        Ok(())
    }

    /// Send `file` as a document replying to `reply_to`.
    pub async fn send_document(
        &self,
        chat_id: ChatId,
        reply_to: MessageId,
        file: &FileReply,
    ) -> Result<()> {
        info!(
            chat_id = chat_id.0,
            filename = %file.filename,
            bytes = file.bytes.len(),
            "telegram outbound document send"
        );
        self.run_telegram_request_with_retry(chat_id, "send document", || {
            let input = InputFile::memory(file.bytes.clone()).file_name(file.filename.clone());
            let req = self
                .bot
                .send_document(chat_id, input)
                .caption(file.caption.clone())
                .reply_parameters(reply_params(reply_to));
            async move { req.await }
        })
        .await?;
        Ok(())
    }

    async fn run_telegram_request_with_retry<T, F, Fut>(
        &self,
        chat_id: ChatId,
        operation: &'static str,
        mut request: F,
    ) -> std::result::Result<T, RequestError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, RequestError>>,
    {
        let mut retries = 0usize;

        loop {
            match request().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    let Some(wait) = retry_after_duration(&err) else {
                        debug!(chat_id = chat_id.0, operation, error = %err, "telegram request failed");
                        return Err(err);
                    };

                    if retries >= TELEGRAM_RETRY_AFTER_MAX_RETRIES {
                        warn!(
                            chat_id = chat_id.0,
                            operation,
                            retries,
                            max_retries = TELEGRAM_RETRY_AFTER_MAX_RETRIES,
                            retry_after_secs = wait.as_secs(),
                            "telegram rate limit persisted after retries"
                        );
                        return Err(err);
                    }

                    retries += 1;
                    warn!(
                        chat_id = chat_id.0,
                        operation,
                        retries,
                        max_retries = TELEGRAM_RETRY_AFTER_MAX_RETRIES,
                        retry_after_secs = wait.as_secs(),
                        "telegram rate limited, waiting before retry"
                    );
                    tokio::time::sleep(wait).await;
                },
            }
        }
    }
}

fn reply_params(message_id: MessageId) -> ReplyParameters {
    ReplyParameters::new(message_id).allow_sending_without_reply()
}

/// Script-supplied message ids are `i64`; Telegram's are `i32`.
fn to_message_id(id: i64) -> Result<MessageId> {
    i32::try_from(id)
        .map(MessageId)
        .map_err(|_| Error::message(format!("invalid message id: {id}")))
}

fn retry_after_duration(error: &RequestError) -> Option<Duration> {
    match error {
        RequestError::RetryAfter(wait) => Some(wait.duration()),
        _ => None,
    }
}

fn is_message_not_modified_error(error: &RequestError) -> bool {
    matches!(error, RequestError::Api(ApiError::MessageNotModified))
}

/// Plain-text operations behind a script's `bot` binding.
#[async_trait]
impl ScriptOutbound for TelegramOutbound {
    async fn send_message(&self, chat_id: i64, text: &str) -> evalbot_eval::Result<i64> {
        let chat_id = ChatId(chat_id);
        let message = self
            .run_telegram_request_with_retry(chat_id, "script send message", || {
                let req = self.bot.send_message(chat_id, text);
                async move { req.await }
            })
            .await
            .map_err(Error::from)?;
        Ok(i64::from(message.id.0))
    }

    async fn reply(&self, chat_id: i64, message_id: i64, text: &str) -> evalbot_eval::Result<i64> {
        let chat_id = ChatId(chat_id);
        let reply_to = to_message_id(message_id)?;
        let message = self
            .run_telegram_request_with_retry(chat_id, "script reply", || {
                let req = self
                    .bot
                    .send_message(chat_id, text)
                    .reply_parameters(reply_params(reply_to));
                async move { req.await }
            })
            .await
            .map_err(Error::from)?;
        Ok(i64::from(message.id.0))
    }

    async fn edit_message(&self, chat_id: i64, message_id: i64, text: &str) -> evalbot_eval::Result<()> {
        let chat_id = ChatId(chat_id);
        let message_id = to_message_id(message_id)?;
        let result = self
            .run_telegram_request_with_retry(chat_id, "script edit message", || {
                let req = self.bot.edit_message_text(chat_id, message_id, text);
                async move { req.await }
            })
            .await;
        match result {
            Ok(_) => Ok(()),
            Err(e) if is_message_not_modified_error(&e) => Ok(()),
            Err(e) => Err(Error::from(e).into()),
        }
    }

    async fn delete_message(&self, chat_id: i64, message_id: i64) -> evalbot_eval::Result<()> {
        let message_id = to_message_id(message_id)?;
        Ok(self.delete(ChatId(chat_id), message_id).await?)
    }
}

/// The "executing" placeholder of one `/run` and the command message it
/// answers.
pub struct PlaceholderReply {
    pub outbound: Arc<TelegramOutbound>,
    pub chat_id: ChatId,
    pub placeholder: MessageId,
    pub origin: MessageId,
}

#[async_trait]
impl ReplyTarget for PlaceholderReply {
    async fn edit_placeholder(&self, html: &str) -> evalbot_eval::Result<()> {
        Ok(self
            .outbound
            .edit_html(self.chat_id, self.placeholder, html)
            .await?)
    }

    async fn delete_placeholder(&self) -> evalbot_eval::Result<()> {
        Ok(self.outbound.delete(self.chat_id, self.placeholder).await?)
    }

    async fn send_file(&self, file: &FileReply) -> evalbot_eval::Result<()> {
        Ok(self
            .outbound
            .send_document(self.chat_id, self.origin, file)
            .await?)
    }
}
