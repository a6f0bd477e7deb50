//! Shared building blocks for the solar usage tools.
//!
//! Error type, raw record coercion, the civil-time clock used for minute
//! rounding and display, and the command-line settings layer.

pub mod error;
pub mod models;
pub mod settings;
pub mod time_utils;

pub use error::{Result, UsageError};
