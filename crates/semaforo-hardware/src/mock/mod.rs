//! Mock implementations for testing and development.
//!
//! This module provides simulated serial endpoints that can be controlled
//! programmatically without requiring a physical traffic-light controller.

pub mod port;

// Re-export commonly used types
pub use port::{MockBackend, MockBackendHandle, MockPort};
