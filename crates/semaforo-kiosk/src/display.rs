//! Presentation seam.
//!
//! The kiosk logic never draws anything itself. It publishes
//! [`DisplayUpdate`]s to a [`PresentationSink`]; the headless binary logs them,
//! a graphical front end would paint them, and tests record them.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use semaforo_core::{ConnectionState, StatusMessage};
use tokio::sync::watch;
use tracing::{info, warn};

/// Connection-bar text shown when the link reports an error.
pub const LINK_ERROR_LABEL: &str = "ERROR DE CONEXIÓN";

/// One change to what the kiosk screen shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayUpdate {
    /// Replace the status bar.
    Status(StatusMessage),

    /// Show a QR code (encoded image bytes as received).
    QrImage(Vec<u8>),

    /// Remove the QR code.
    ClearQr,

    /// The connection state changed.
    Connection(ConnectionState),

    /// The device link reported an error line.
    LinkError(String),
}

impl DisplayUpdate {
    /// Text of the status or connection bar this update sets, if any.
    pub fn label(&self) -> Option<String> {
        match self {
            Self::Status(status) => Some(status.text()),
            Self::Connection(state) => Some(state.label()),
            Self::LinkError(_) => Some(LINK_ERROR_LABEL.to_string()),
            Self::QrImage(_) | Self::ClearQr => None,
        }
    }
}

/// Receiver of display updates.
pub trait PresentationSink: Send + Sync {
    fn update(&self, update: DisplayUpdate);
}

impl<T: PresentationSink + ?Sized> PresentationSink for Arc<T> {
    fn update(&self, update: DisplayUpdate) {
        (**self).update(update);
    }
}

/// Sink that writes every update to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl PresentationSink for LogSink {
    fn update(&self, update: DisplayUpdate) {
        match &update {
            DisplayUpdate::Status(status) if status.is_error() => {
                warn!(tone = ?status.tone(), "Status: {}", status.text());
            }
            DisplayUpdate::Status(status) => {
                info!(tone = ?status.tone(), "Status: {}", status.text());
            }
            DisplayUpdate::QrImage(bytes) => info!(bytes = bytes.len(), "QR code shown"),
            DisplayUpdate::ClearQr => info!("QR code cleared"),
            DisplayUpdate::Connection(state) => info!("Connection: {}", state.label()),
            DisplayUpdate::LinkError(message) => {
                warn!(message = %message, "Connection: {}", LINK_ERROR_LABEL);
            }
        }
    }
}

/// Sink that keeps every update in memory.
///
/// Clones share the same record.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    updates: Arc<Mutex<Vec<DisplayUpdate>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<DisplayUpdate>> {
        self.updates.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// All updates so far, oldest first.
    pub fn updates(&self) -> Vec<DisplayUpdate> {
        self.lock().clone()
    }

    /// Status messages only, oldest first.
    pub fn statuses(&self) -> Vec<StatusMessage> {
        self.lock()
            .iter()
            .filter_map(|update| match update {
                DisplayUpdate::Status(status) => Some(status.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn last_status(&self) -> Option<StatusMessage> {
        self.statuses().pop()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}

impl PresentationSink for RecordingSink {
    fn update(&self, update: DisplayUpdate) {
        self.lock().push(update);
    }
}

/// Publish every connection state change until the supervisor goes away.
pub async fn forward_connection_state<P: PresentationSink>(
    mut states: watch::Receiver<ConnectionState>,
    sink: P,
) {
    let initial = states.borrow_and_update().clone();
    sink.update(DisplayUpdate::Connection(initial));

    while states.changed().await.is_ok() {
        let state = states.borrow_and_update().clone();
        sink.update(DisplayUpdate::Connection(state));
    }
}
