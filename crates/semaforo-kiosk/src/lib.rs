//! Semáforo kiosk application layer.
//!
//! Ties the device link and the decision service together: a button press on
//! the traffic-light controller asks the service for a decision, the screen
//! shows the returned QR code and status, and the decision's command goes
//! back to the light.
//!
//! - [`flow`]: the [`DecisionFlow`] reacting to device events.
//! - [`display`]: the [`PresentationSink`] seam and its log and recording
//!   implementations.
//! - [`config`]: [`KioskConfig`] loading from JSON and the environment.
//! - [`runner`]: supervisor task and console command parsing for the binary.

pub mod config;
pub mod display;
pub mod flow;
pub mod runner;

pub use config::{BackendKind, KioskConfig, LinkProfile};
pub use display::{DisplayUpdate, LogSink, PresentationSink, RecordingSink};
pub use flow::{DecisionFlow, FlowOutcome};
pub use runner::{KioskCommand, SupervisorCommand};

/// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
