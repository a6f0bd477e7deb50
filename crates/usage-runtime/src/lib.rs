//! Async runtime for the solar usage tools.
//!
//! - [`loader`] reads a batch of exports concurrently.
//! - [`retrieval`] drives paginated requests against the vendor API.
//! - [`request_log`] keeps the history of those requests.

pub mod loader;
pub mod request_log;
pub mod retrieval;
