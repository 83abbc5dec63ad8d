//! Mock device implementations for testing and development.
//!
//! This module provides simulated serial lines that can be scripted
//! programmatically without requiring physical hardware.

pub mod link;

// Re-export commonly used types
pub use link::{MockLink, MockLinkHandle};
