use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use ticker_core::{DeliveryError, Inbound, Observer, Outbound, TickerService};
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// One line on stdin: a message and the context that sent it.
#[derive(Debug, Deserialize)]
pub struct InboundEnvelope {
    #[serde(default)]
    pub observer: Option<String>,
    pub message: Inbound,
}

/// One line on stdout: a message and the context it is addressed to.
#[derive(Debug, Serialize)]
pub struct OutboundEnvelope {
    pub observer: String,
    pub message: Outbound,
}

/// Observer whose deliveries are written to stdout, tagged with its id.
pub struct StdoutObserver {
    id: String,
    tx: mpsc::Sender<OutboundEnvelope>,
}

impl StdoutObserver {
    pub fn new(id: impl Into<String>, tx: mpsc::Sender<OutboundEnvelope>) -> Self {
        Self { id: id.into(), tx }
    }
}

#[async_trait]
impl Observer for StdoutObserver {
    fn id(&self) -> &str {
        &self.id
    }

    async fn deliver(&self, message: &Outbound) -> Result<(), DeliveryError> {
        self.tx
            .send(OutboundEnvelope {
                observer: self.id.clone(),
                message: message.clone(),
            })
            .await
            .map_err(|_| DeliveryError::Gone(self.id.clone()))
    }
}

pub async fn write_stdout(rx: mpsc::Receiver<OutboundEnvelope>) {
    write_lines(rx, tokio::io::stdout()).await;
}

/// Writes one JSON line per envelope. Stops at the first write or flush
/// error, which drops `rx` so observers behind it report as gone.
async fn write_lines<W>(mut rx: mpsc::Receiver<OutboundEnvelope>, mut out: W)
where
    W: AsyncWrite + Unpin,
{
    while let Some(envelope) = rx.recv().await {
        let mut line = match serde_json::to_vec(&envelope) {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "failed to encode outbound message");
                continue;
            }
        };
        line.push(b'\n');
        if let Err(e) = out.write_all(&line).await {
            warn!(error = %e, "stdout closed");
            break;
        }
        if let Err(e) = out.flush().await {
            warn!(error = %e, "failed to flush stdout");
            break;
        }
    }
}

/// Reads envelopes from stdin until EOF and routes them to the service.
pub async fn read_stdin(
    service: &TickerService,
    tx: mpsc::Sender<OutboundEnvelope>,
    store_path: &Path,
) -> std::io::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<InboundEnvelope>(line) {
            Ok(envelope) => dispatch(service, &tx, store_path, envelope).await,
            Err(e) => warn!(error = %e, "ignoring malformed message"),
        }
    }
    debug!("stdin closed");
    Ok(())
}

async fn dispatch(
    service: &TickerService,
    tx: &mpsc::Sender<OutboundEnvelope>,
    store_path: &Path,
    envelope: InboundEnvelope,
) {
    let sender = envelope.observer.as_deref();

    match (&envelope.message, sender) {
        (Inbound::ContentScriptReady, Some(id)) => {
            if !service.observers().contains(id).await {
                info!(observer = id, "observer attached");
                service
                    .observers()
                    .register(Arc::new(StdoutObserver::new(id, tx.clone())))
                    .await;
            }
        }
        (Inbound::OpenOptions, _) => {
            info!(store = %store_path.display(), "settings live under the `settings` key of the store; send UPDATE_SETTINGS to change them");
        }
        _ => {}
    }

    if let Err(e) = service.handle(sender, envelope.message).await {
        warn!(error = %e, "rejected settings update");
        if let Some(id) = sender {
            service.observers().send_to(id, &Outbound::error(e.to_string())).await;
        }
    }
}
