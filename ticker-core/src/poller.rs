use std::future::Future;
use std::time::Duration;

use reqwest::{Client, RequestBuilder, StatusCode};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::config::{CredentialPlacement, ServiceConfig};
use crate::error::PollError;
use crate::headline::{HeadlinesResponse, ProviderArticle, ProviderErrorBody};

const API_KEY_HEADER: &str = "X-Api-Key";
const API_KEY_PARAM: &str = "apiKey";

/// Handle to the repeating timer task.
pub struct PollerHandle {
    cancel_tx: broadcast::Sender<()>,
    join: JoinHandle<()>,
    period: Duration,
}

impl PollerHandle {
    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Signals the task to stop after its current tick, without waiting.
    pub fn cancel(&self) {
        let _ = self.cancel_tx.send(());
    }

    pub async fn stop(self) -> Result<(), tokio::task::JoinError> {
        self.cancel();
        self.join.await
    }
}

/// Runs `on_tick` every `period`, starting one full period from now. The
/// loop ends on cancel or when `on_tick` returns `false`.
pub fn spawn_poller<F, Fut>(period: Duration, mut on_tick: F) -> PollerHandle
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = bool> + Send + 'static,
{
    let (cancel_tx, mut cancel_rx) = broadcast::channel(1);
    let join = tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel_rx.recv() => {
                    debug!("poller shutdown requested");
                    break;
                }
                _ = ticker.tick() => {
                    if !on_tick().await {
                        info!("poller target dropped, stopping timer");
                        break;
                    }
                }
            }
        }
    });

    PollerHandle {
        cancel_tx,
        join,
        period,
    }
}

fn headlines_request(client: &Client, config: &ServiceConfig, api_key: &str) -> RequestBuilder {
    let request = client
        .get(&config.endpoint)
        .query(&[("country", config.country.as_str())])
        .header(reqwest::header::ACCEPT, "application/json")
        .timeout(config.request_timeout());
    match config.credential_placement {
        CredentialPlacement::Header => request.header(API_KEY_HEADER, api_key),
        CredentialPlacement::Query => request.query(&[(API_KEY_PARAM, api_key)]),
    }
}

/// Provider message from an error body, or a generic status line.
fn error_message(status: StatusCode, body: &[u8]) -> String {
    serde_json::from_slice::<ProviderErrorBody>(body)
        .map(|body| body.message)
        .unwrap_or_else(|_| format!("HTTP status {}", status.as_u16()))
}

/// One request to the headlines endpoint. Returns the provider's items in
/// provider order, untruncated.
pub async fn fetch_headlines(
    client: &Client,
    config: &ServiceConfig,
    api_key: &str,
) -> Result<Vec<ProviderArticle>, PollError> {
    if api_key.trim().is_empty() {
        return Err(PollError::MissingCredential);
    }

    let response = headlines_request(client, config, api_key).send().await?;
    let status = response.status();
    let bytes = response.bytes().await?;

    if !status.is_success() {
        return Err(PollError::Api {
            status: status.as_u16(),
            message: error_message(status, &bytes),
        });
    }

    let payload: HeadlinesResponse = serde_json::from_slice(&bytes)?;
    debug!(
        received = payload.articles.len(),
        total = ?payload.total_results,
        "headlines fetched"
    );
    Ok(payload.articles)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValidation {
    pub valid: bool,
    pub message: String,
}

impl KeyValidation {
    fn valid() -> Self {
        Self {
            valid: true,
            message: "API Key is valid".to_owned(),
        }
    }

    fn invalid(message: impl Into<String>) -> Self {
        Self {
            valid: false,
            message: message.into(),
        }
    }
}

/// Probes the endpoint with `api_key` to tell whether the provider accepts it.
pub async fn validate_api_key(client: &Client, config: &ServiceConfig, api_key: &str) -> KeyValidation {
    let api_key = api_key.trim();
    if api_key.is_empty() {
        return KeyValidation::invalid("API Key is required");
    }

    let response = match headlines_request(client, config, api_key).send().await {
        Ok(response) => response,
        Err(e) => return KeyValidation::invalid(format!("Error validating API Key: {e}")),
    };
    if response.status().is_success() {
        return KeyValidation::valid();
    }
    let message = response
        .json::<ProviderErrorBody>()
        .await
        .map(|body| body.message)
        .unwrap_or_else(|_| "Invalid API Key".to_owned());
    KeyValidation::invalid(message)
}
