//! Seams between the evaluation pipeline and the chat transport.

use async_trait::async_trait;

use crate::{Result, format::FileReply};

/// Outbound operations a script can perform through its `bot` binding.
///
/// Chat and message ids use the transport's numeric ids. Calls made from a
/// script are awaited before the script continues.
#[async_trait]
pub trait ScriptOutbound: Send + Sync {
    /// Send a plain-text message, returning the new message id.
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<i64>;

    /// Send a plain-text message as a reply to `message_id`.
    async fn reply(&self, chat_id: i64, message_id: i64, text: &str) -> Result<i64>;

    async fn edit_message(&self, chat_id: i64, message_id: i64, text: &str) -> Result<()>;

    async fn delete_message(&self, chat_id: i64, message_id: i64) -> Result<()>;
}

/// Where the formatted result of one `/run` goes: the "executing" placeholder
/// and the message that triggered it.
#[async_trait]
pub trait ReplyTarget: Send + Sync {
    /// Replace the placeholder text with rendered HTML.
    async fn edit_placeholder(&self, html: &str) -> Result<()>;

    async fn delete_placeholder(&self) -> Result<()>;

    /// Send `file` as a document replying to the original message.
    async fn send_file(&self, file: &FileReply) -> Result<()>;
}
