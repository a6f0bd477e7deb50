//! Data layer for the solar usage tools.
//!
//! Reads vendor JSON exports, orders and merges their channel arrays,
//! normalises `normalUsage`/`reverseUsage` into a thinned minute grid and
//! renders CSV.

pub mod csv_export;
pub mod merger;
pub mod naming;
pub mod normalizer;
pub mod pipeline;
pub mod reader;

pub use usage_core as core;
