//! Names visible to an executed script.

use std::sync::Arc;

use serde::Serialize;

use crate::{Error, Result, output::CapturedOutput, transport::ScriptOutbound};

pub const MESSAGE: &str = "message";
/// Short alias of [`MESSAGE`].
pub const MESSAGE_ALIAS: &str = "m";
pub const PRINT: &str = "print";
pub const REPLY: &str = "r";
pub const BOT: &str = "bot";
pub const USER: &str = "user";

/// A value bound to a name in the script environment.
pub enum Binding {
    /// Structured data, exposed to the script as maps/arrays/scalars.
    Value(serde_json::Value),
    /// Explicit "nothing" (e.g. `r` when the command was not a reply).
    Unit,
    /// The request's print sink.
    Print(CapturedOutput),
    /// Handle to the outbound transport.
    Transport(Arc<dyn ScriptOutbound>),
}

impl std::fmt::Debug for Binding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Self::Unit => f.write_str("Unit"),
            Self::Print(_) => f.write_str("Print"),
            Self::Transport(_) => f.write_str("Transport"),
        }
    }
}

/// Name → value mapping a single script executes against.
///
/// The names live in the script's top-level scope. Rhai functions declared
/// with `fn` do not see that scope, so scripts pass `bot`, `m` and friends
/// into their functions as arguments: `fn greet(b, chat) { ... } greet(bot, m.chat.id)`.
#[derive(Debug)]
pub struct Environment {
    bindings: Vec<(&'static str, Binding)>,
    output: CapturedOutput,
}

impl Environment {
    /// Bind the invoking message, the replied-to message (or unit), the
    /// calling user (or unit), a fresh print sink and the transport handle.
    ///
    /// Fails only when the transport objects cannot be serialized.
    pub fn build<M, U>(
        message: &M,
        reply_to: Option<&M>,
        user: Option<&U>,
        outbound: Arc<dyn ScriptOutbound>,
    ) -> Result<Self>
    where
        M: Serialize,
        U: Serialize,
    {
        let message = to_value(MESSAGE, message)?;
        let reply_to = reply_to
            .map(|r| to_value(REPLY, r))
            .transpose()?
            .map_or(Binding::Unit, Binding::Value);
        let user = user
            .map(|u| to_value(USER, u))
            .transpose()?
            .map_or(Binding::Unit, Binding::Value);
        let output = CapturedOutput::new();

        Ok(Self {
            bindings: vec![
                (MESSAGE, Binding::Value(message.clone())),
                (MESSAGE_ALIAS, Binding::Value(message)),
                (PRINT, Binding::Print(output.clone())),
                (REPLY, reply_to),
                (BOT, Binding::Transport(outbound)),
                (USER, user),
            ],
            output,
        })
    }

    pub fn bindings(&self) -> impl Iterator<Item = (&'static str, &Binding)> {
        self.bindings.iter().map(|(n, b)| (*n, b))
    }

    /// The sink that `print` writes into.
    #[must_use]
    pub fn output(&self) -> &CapturedOutput {
        &self.output
    }
}

fn to_value<T: Serialize>(name: &'static str, value: &T) -> Result<serde_json::Value> {
    serde_json::to_value(value).map_err(|source| Error::Binding { name, source })
}
