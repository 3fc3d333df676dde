//! Script evaluation pipeline.
//!
//! A `/run` request flows through [`Environment::build`], then
//! [`Evaluator::evaluate`], then [`format_reply`] and [`deliver`]. The chat
//! transport plugs in through the traits in [`transport`].

mod engine;
pub mod environment;
pub mod error;
pub mod evaluator;
pub mod format;
pub mod output;
pub mod traceback;
pub mod transport;

pub use {
    environment::{Binding, Environment},
    error::{Error, Result},
    evaluator::{Evaluator, ExecutionOutcome, ExecutionRequest},
    format::{FileReply, InlineReply, Reply, deliver, escape_html, format_reply, unescape_html},
    output::CapturedOutput,
    traceback::{Frame, RaisedError, Sanitizer},
    transport::{ReplyTarget, ScriptOutbound},
};
