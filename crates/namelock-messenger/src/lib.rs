//! Messenger bridge adapter for the group name locker.
//!
//! The unofficial client libraries run behind a small HTTP bridge; this crate
//! implements `MessengerBackend` / `MessengerSession` on top of it and hides
//! the `setTitle` argument-order differences between client variants.

mod bridge_client;
mod client_variant;

pub use bridge_client::{BridgeClientConfig, HttpMessengerBackend, HttpMessengerSession};
pub use client_variant::{MessengerClientVariant, SetTitleArgumentOrder};
