//! Foundational low-level utilities shared across namelock crates.
//!
//! Provides the atomic file-write helpers used by the credential slot and the
//! time helpers used to stamp activity-log entries.

pub mod atomic_io;
pub mod time_utils;

pub use atomic_io::{remove_file_if_exists, write_text_atomic};
pub use time_utils::current_unix_timestamp_ms;
