use crate::pipeline::types::{IncomingEvent, RecordKind};
use crate::streamer_core::config::RuntimeConfig;
use crate::streamer_core::error_handler::{ExponentialBackoff, MaxRetriesExceeded};
use futures::StreamExt;
use serde::Deserialize;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};

/// Reconnect policy: 1s initial delay, 60s cap, 10 attempts
const BACKOFF_INITIAL_SECS: u64 = 1;
const BACKOFF_MAX_SECS: u64 = 60;
const BACKOFF_MAX_RETRIES: u32 = 10;

#[derive(Debug)]
pub enum ClientError {
    Connection(String),
    MaxRetries,
}

impl From<MaxRetriesExceeded> for ClientError {
    fn from(_: MaxRetriesExceeded) -> Self {
        ClientError::MaxRetries
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for ClientError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        ClientError::Connection(err.to_string())
    }
}

impl std::fmt::Display for ClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClientError::Connection(msg) => write!(f, "Connection error: {}", msg),
            ClientError::MaxRetries => write!(f, "Maximum retry attempts exceeded"),
        }
    }
}

impl std::error::Error for ClientError {}

/// One Jetstream frame
#[derive(Debug, Clone, Deserialize)]
pub struct JetstreamEvent {
    pub did: String,
    pub time_us: i64,
    pub kind: String,
    pub commit: Option<JetstreamCommit>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JetstreamCommit {
    pub operation: String,
    pub collection: String,
    pub rkey: String,
    #[serde(default)]
    pub cid: Option<String>,
    #[serde(default)]
    pub record: Option<serde_json::Value>,
}

/// How a session ended
#[derive(Debug, PartialEq, Eq)]
enum SessionEnd {
    /// Server closed or the socket dropped; reconnect
    Disconnected,
    /// Ingestion dropped its receiver; stop for good
    ReceiverClosed,
}

/// Subscription URL for the tracked collections, resuming at `cursor`
///
/// A non-positive cursor subscribes live without replay.
pub fn subscribe_url(base: &str, cursor: i64) -> String {
    let separator = if base.contains('?') { '&' } else { '?' };
    let mut url = format!("{}{}", base, separator);

    let collections: Vec<String> = RecordKind::all()
        .iter()
        .map(|kind| format!("wantedCollections={}", kind.collection()))
        .collect();
    url.push_str(&collections.join("&"));

    if cursor > 0 {
        url.push_str(&format!("&cursor={}", cursor));
    }
    url
}

/// Map a commit frame to an ingestion event
///
/// Identity, account and other non-commit frames yield `None`, as do
/// commits to collections outside the tracked set.
pub fn to_incoming_event(event: JetstreamEvent) -> Option<IncomingEvent> {
    if event.kind != "commit" {
        return None;
    }
    let commit = event.commit?;
    let kind = RecordKind::from_collection(&commit.collection)?;

    Some(IncomingEvent {
        uri: format!("at://{}/{}/{}", event.did, commit.collection, commit.rkey),
        kind: kind.as_str().to_string(),
        operation: commit.operation,
        author_id: event.did,
        content_hash: commit.cid.unwrap_or_default(),
        observed_at_micros: event.time_us,
        record_payload: commit.record,
    })
}

/// Parse one text frame; unparseable frames are logged and skipped
pub fn parse_frame(text: &str) -> Option<IncomingEvent> {
    match serde_json::from_str::<JetstreamEvent>(text) {
        Ok(event) => to_incoming_event(event),
        Err(e) => {
            log::warn!("⚠️  Skipping unparseable Jetstream frame: {}", e);
            None
        }
    }
}

async fn run_session(
    url: &str,
    tx: &mpsc::Sender<IncomingEvent>,
    backoff: &mut ExponentialBackoff,
) -> Result<SessionEnd, ClientError> {
    let (socket, _response) = connect_async(url).await?;
    log::info!("✅ Connected to Jetstream");
    backoff.reset();

    let (_write, mut read) = socket.split();

    while let Some(message) = read.next().await {
        let text = match message? {
            Message::Text(text) => text,
            Message::Close(frame) => {
                log::warn!("⚠️  Jetstream closed the connection: {:?}", frame);
                return Ok(SessionEnd::Disconnected);
            }
            _ => continue,
        };

        if let Some(event) = parse_frame(&text) {
            if tx.send(event).await.is_err() {
                return Ok(SessionEnd::ReceiverClosed);
            }
        }
    }

    Ok(SessionEnd::Disconnected)
}

/// Stream tracked commits into `tx` until the receiver goes away
///
/// Each (re)connection resumes from the current value of `cursor`, which
/// ingestion advances as events are handled. Gives up with
/// `ClientError::MaxRetries` after repeated consecutive failures.
pub async fn run_with_reconnect(
    config: &RuntimeConfig,
    cursor: Arc<AtomicI64>,
    tx: mpsc::Sender<IncomingEvent>,
) -> Result<(), ClientError> {
    let mut backoff =
        ExponentialBackoff::new(BACKOFF_INITIAL_SECS, BACKOFF_MAX_SECS, BACKOFF_MAX_RETRIES);

    loop {
        let resume_from = cursor.load(Ordering::SeqCst);
        let url = subscribe_url(&config.jetstream_url, resume_from);
        log::info!("🔗 Subscribing to Jetstream (cursor: {})", resume_from);
        log::debug!("   └─ {}", url);

        match run_session(&url, &tx, &mut backoff).await {
            Ok(SessionEnd::ReceiverClosed) => {
                log::info!("✅ Event channel closed, stopping Jetstream client");
                return Ok(());
            }
            Ok(SessionEnd::Disconnected) => {
                log::warn!("⚠️  Jetstream stream ended, reconnecting");
                backoff.sleep().await?;
            }
            Err(e) => {
                log::error!("❌ Jetstream error: {}", e);
                backoff.sleep().await?;
            }
        }

        if tx.is_closed() {
            return Ok(());
        }
    }
}
