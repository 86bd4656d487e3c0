//! Shared domain types for the Semáforo kiosk.
//!
//! This crate holds the vocabulary every other crate speaks: serial
//! endpoints, the events a device produces, the connection states the
//! supervisor moves through, the commands relayed to the device and the
//! status messages shown to the user.

pub mod constants;
pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::*;

/// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
