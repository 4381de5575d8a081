use thiserror::Error;

#[derive(Debug, Error)]
pub enum PollError {
    #[error("no API key configured")]
    MissingCredential,
    #[error("{message}")]
    Api { status: u16, message: String },
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("invalid headlines payload: {0}")]
    Decode(#[from] serde_json::Error),
}

impl PollError {
    /// Text shown on the ticker for this failure.
    pub fn user_message(&self) -> String {
        match self {
            PollError::MissingCredential => {
                "Please set your NewsAPI key in the extension options.".to_owned()
            }
            PollError::Api { message, .. } => message.clone(),
            PollError::Network(e) if e.is_timeout() => {
                "News provider timed out. Please try again later.".to_owned()
            }
            PollError::Network(e) if e.is_connect() => {
                "Could not reach the news provider. Please try again later.".to_owned()
            }
            PollError::Network(_) => "Unable to fetch news. Please try again later.".to_owned(),
            PollError::Decode(_) => "News provider sent an unreadable response.".to_owned(),
        }
    }
}

#[derive(Debug, Error)]
pub enum CategoryError {
    #[error("failed to read category table: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse category table: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("store serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SettingsError {
    #[error("refresh interval must be at least one minute")]
    ZeroRefreshInterval,
    #[error("scroll speed must be between 1 and 100, got {0}")]
    ScrollSpeedOutOfRange(u32),
}

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("observer {0} is no longer reachable")]
    Gone(String),
    #[error("observer {0} is not keeping up")]
    Full(String),
    #[error("delivery to observer {0} timed out")]
    TimedOut(String),
}
