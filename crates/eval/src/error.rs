use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to bind `{name}` into the script environment: {source}")]
    Binding {
        name: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// A transport call failed; the text is what the script's traceback shows.
    #[error("{message}")]
    Message { message: String },
}

impl Error {
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
