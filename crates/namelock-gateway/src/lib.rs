//! HTTP control surface for the group name locker.
//!
//! Serves the operator panel, credential upload/paste/delete endpoints,
//! start/stop controls, a pull-style status endpoint and a server-sent event
//! stream of activity log entries and run-state changes.

mod control_server;

pub use control_server::{
    build_control_router, run_control_server, ControlServerConfig, ControlServerState,
    CONTROL_PANEL_ENDPOINT, DELETE_CREDENTIAL_ENDPOINT, EVENTS_ENDPOINT, SAVE_TEXT_ENDPOINT,
    START_ENDPOINT, STATUS_ENDPOINT, STOP_ENDPOINT, UPLOAD_ENDPOINT,
};
