//! Decision documents.
//!
//! The service answers every request with a small JSON document:
//!
//! ```json
//! {
//!   "success": true,
//!   "is_green": false,
//!   "qr_image": "iVBORw0KGgo...",
//!   "result_command": "SUCCESS_YELLOW"
//! }
//! ```
//!
//! [`DecisionResponse`] is that document as sent; [`Decision`] is what the
//! kiosk acts on, with defaults applied and the image decoded.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use semaforo_core::{ResultCommand, StatusMessage};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{DecisionError, Result};

/// Raw decision document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionResponse {
    #[serde(default)]
    pub success: Option<bool>,

    #[serde(default)]
    pub is_green: Option<bool>,

    /// Base64-encoded QR code image.
    #[serde(default)]
    pub qr_image: Option<String>,

    #[serde(default)]
    pub result_command: Option<ResultCommand>,
}

/// A successful decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    /// Defaults to `true` when the service omits it.
    pub is_green: bool,

    /// Decoded image bytes; `None` if missing, empty or not valid base64.
    pub qr_image: Option<Vec<u8>>,

    /// Defaults to `SUCCESS_GREEN` when the service omits it.
    pub result_command: ResultCommand,
}

impl Decision {
    /// Apply defaults and decode the image.
    ///
    /// # Errors
    ///
    /// Returns [`DecisionError::Rejected`] unless `success` is `true`. An
    /// undecodable image is not an error; see [`Decision::qr_image`].
    pub fn from_response(response: DecisionResponse) -> Result<Self> {
        if response.success != Some(true) {
            return Err(DecisionError::Rejected);
        }

        let qr_image = response.qr_image.as_deref().and_then(|encoded| {
            STANDARD
                .decode(encoded.trim())
                .inspect_err(|e| warn!("QR image is not valid base64: {}", e))
                .ok()
                .filter(|bytes| {
                    if bytes.is_empty() {
                        warn!("QR image is empty");
                    }
                    !bytes.is_empty()
                })
        });

        Ok(Self {
            is_green: response.is_green.unwrap_or(true),
            qr_image,
            result_command: response.result_command.unwrap_or_default(),
        })
    }

    /// Status message for this decision.
    pub fn status(&self) -> StatusMessage {
        self.result_command.status()
    }
}
