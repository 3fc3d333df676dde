use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Telegram(#[from] teloxide::RequestError),

    #[error("failed to build the polling HTTP client: {0}")]
    Reqwest(#[from] reqwest::Error),

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

/// Transport failures surface inside scripts and reply delivery as
/// evaluation-side errors.
impl From<Error> for evalbot_eval::Error {
    fn from(err: Error) -> Self {
        Self::message(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
