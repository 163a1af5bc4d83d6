use reqwest::StatusCode;
use thiserror::Error;

/// All possible Mailgun backend errors
#[derive(Debug, Error)]
pub enum Error {
    /// A required setting could not be resolved at construction
    #[error("missing setting: {0}")]
    MissingSetting(&'static str),

    /// Send attempted on a backend built without credentials
    #[error("backend is not configured")]
    NotConfigured,

    #[error("settings error: {0}")]
    Settings(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("request timed out")]
    Timeout,

    #[error("request failed: {0}")]
    Transport(String),

    /// Mailgun answered with anything other than 200 OK.
    /// The raw response body is kept for diagnostics.
    #[error("Mailgun API error ({status}): {body}")]
    Api { status: StatusCode, body: String },
}

impl Error {
    /// True for network-level failures, where the request may never have
    /// reached Mailgun.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Timeout | Self::Transport(_))
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Transport(err.to_string())
        }
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Self::Settings(format!("bad API url: {}", err))
    }
}

impl From<::config::ConfigError> for Error {
    fn from(err: ::config::ConfigError) -> Self {
        Self::Settings(err.to_string())
    }
}
