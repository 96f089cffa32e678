//! Group name locker runtime.
//!
//! Hosts the credential slot, the messenger capability traits, the session
//! manager, the reconciliation loop and the bot controller that owns the
//! process-wide run state. `NameLockContext` wires them together for one
//! process (or one test case).

pub mod activity_log;
pub mod bot_controller;
pub mod context;
pub mod credential_store;
pub mod messenger;
pub mod reconciliation_loop;
pub mod runtime_config;
pub mod session_manager;
#[cfg(test)]
mod test_support;

pub use activity_log::{ActivityLog, LogEntry, LogLevel};
pub use bot_controller::{
    BotController, ControllerStatus, RunState, StartError, StartOutcome, StopOutcome,
};
pub use context::{CredentialSaveSource, NameLockContext, NameLockStatus};
pub use credential_store::{
    Credential, CredentialLoadOutcome, CredentialStore, CredentialStoreError,
};
pub use messenger::{
    extract_thread_name, FetchError, LoginError, MessengerBackend, MessengerSession,
    SetTitleError, THREAD_NAME_KEYS,
};
pub use reconciliation_loop::{
    LockConfig, LockConfigError, LoopCounters, LoopCountersSnapshot, LoopExit,
    ReconciliationLoop, ReconciliationLoopConfig, TickOutcome,
};
pub use runtime_config::NameLockRuntimeConfig;
pub use session_manager::SessionManager;
