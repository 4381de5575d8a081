use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;
use url::Url;

use crate::settings::Settings;

pub const DEFAULT_ENDPOINT: &str = "https://newsapi.org/v2/top-headlines";

/// Where the API key travels on the headlines request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CredentialPlacement {
    /// `X-Api-Key` request header.
    #[default]
    Header,
    /// `apiKey` query parameter.
    Query,
}

/// Process-level settings for the poller, distinct from the user-editable
/// [`Settings`](crate::settings::Settings) kept in the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub endpoint: String,
    pub country: String,
    pub credential_placement: CredentialPlacement,
    pub request_timeout_seconds: u64,
    pub max_articles: usize,
    pub annotate_emoji: bool,
    /// Fixed timer period in milliseconds, replacing the user's refresh
    /// interval. Meant for local endpoints and tests.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_period_override_ms: Option<u64>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_owned(),
            country: "us".to_owned(),
            credential_placement: CredentialPlacement::default(),
            request_timeout_seconds: 10,
            max_articles: 10,
            annotate_emoji: true,
            refresh_period_override_ms: None,
        }
    }
}

impl ServiceConfig {
    /// Reads a JSON config file; a missing or unreadable file yields defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(error = %e, path = %path.display(), "failed to read service config, using defaults");
                }
                return Self::default();
            }
        };
        match serde_json::from_slice::<ServiceConfig>(&bytes) {
            Ok(config) => config.checked(),
            Err(e) => {
                warn!(error = %e, path = %path.display(), "failed to parse service config, using defaults");
                Self::default()
            }
        }
    }

    /// Falls back to the default endpoint when the configured one is not a URL.
    pub fn checked(mut self) -> Self {
        if let Err(e) = Url::parse(&self.endpoint) {
            warn!(error = %e, endpoint = %self.endpoint, "invalid endpoint, using default");
            self.endpoint = DEFAULT_ENDPOINT.to_owned();
        }
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds.max(1))
    }

    /// Timer period for the given settings, honouring the override.
    pub fn refresh_period(&self, settings: &Settings) -> Duration {
        match self.refresh_period_override_ms {
            Some(ms) => Duration::from_millis(ms.max(1)),
            None => settings.refresh_period(),
        }
    }
}
