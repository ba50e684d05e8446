//! Foundational low-level utilities shared across border crates.
//!
//! Provides the atomic file-write helper behind quarantine records and the
//! clock helpers used for record identifiers and classifier latency logging.

pub mod atomic_io;
pub mod time_utils;

pub use atomic_io::write_bytes_atomic;
pub use time_utils::{current_unix_timestamp_ms, elapsed_ms, unix_timestamp_ms};
