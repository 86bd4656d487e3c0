//! Decision service client for the Semáforo kiosk.
//!
//! When the visitor presses the button the kiosk asks a remote service what
//! to do. The answer carries a QR code image for the screen and the command
//! to relay to the traffic light.
//!
//! - [`client`]: [`DecisionClient`] and the [`DecisionService`] seam.
//! - [`decision`]: the response document and the decoded [`Decision`].
//! - [`error`]: [`DecisionError`] and its mapping to status messages.

pub mod client;
pub mod decision;
pub mod error;

pub use client::{DecisionClient, DecisionConfig, DecisionService};
pub use decision::{Decision, DecisionResponse};
pub use error::{DecisionError, Result};
