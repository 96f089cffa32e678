use std::path::PathBuf;

use clap::{ArgAction, Args, Parser};

use crate::cli_types::CliMessengerClient;

#[derive(Debug, Parser)]
#[command(
    name = "namelock",
    about = "Keeps a messaging group's display name locked to a configured value",
    version
)]
pub struct Cli {
    #[command(flatten)]
    pub server: CliServerFlags,

    #[command(flatten)]
    pub messenger: CliMessengerFlags,

    #[command(flatten)]
    pub locker: CliLockerFlags,
}

/// Control panel listener and credential slot.
#[derive(Debug, Args)]
pub struct CliServerFlags {
    #[arg(
        long = "bind-host",
        env = "NAMELOCK_BIND_HOST",
        default_value = "0.0.0.0",
        help = "Host or IP address the control panel listens on"
    )]
    pub bind_host: String,

    #[arg(
        long = "port",
        env = "PORT",
        default_value_t = 3000,
        help = "TCP port for the control panel"
    )]
    pub port: u16,

    #[arg(
        long = "credential-path",
        env = "NAMELOCK_CREDENTIAL_PATH",
        default_value = "appstate.json",
        help = "JSON file holding the saved session appstate"
    )]
    pub credential_path: PathBuf,

    #[arg(
        long = "log-capacity",
        env = "NAMELOCK_LOG_CAPACITY",
        default_value_t = 500,
        help = "Activity log entries kept in memory before the oldest are evicted"
    )]
    pub log_capacity: usize,

    #[arg(
        long = "status-log-limit",
        env = "NAMELOCK_STATUS_LOG_LIMIT",
        default_value_t = 20,
        help = "Most recent activity log entries returned by /_status"
    )]
    pub status_log_limit: usize,
}

/// Messenger bridge connection.
#[derive(Debug, Args)]
pub struct CliMessengerFlags {
    #[arg(
        long = "messenger-api-base",
        env = "NAMELOCK_MESSENGER_API_BASE",
        help = "Base URL of the messenger bridge; without it the locker cannot log in"
    )]
    pub messenger_api_base: Option<String>,

    #[arg(
        long = "messenger-client",
        env = "NAMELOCK_MESSENGER_CLIENT",
        value_enum,
        default_value_t = CliMessengerClient::Auto,
        help = "Client library behind the bridge; decides the setTitle argument order"
    )]
    pub messenger_client: CliMessengerClient,

    #[arg(
        long = "request-timeout-ms",
        env = "NAMELOCK_REQUEST_TIMEOUT_MS",
        default_value_t = 10_000,
        help = "Timeout for each login, thread info and set title call"
    )]
    pub request_timeout_ms: u64,

    #[arg(
        long = "auto-login",
        env = "NAMELOCK_AUTO_LOGIN",
        default_value_t = true,
        action = ArgAction::Set,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true",
        help = "Validate a stored appstate with one login at startup (never starts the locker)"
    )]
    pub auto_login: bool,
}

/// Reconciliation loop pacing.
#[derive(Debug, Args)]
pub struct CliLockerFlags {
    #[arg(
        long = "poll-interval-ms",
        env = "NAMELOCK_POLL_INTERVAL_MS",
        default_value_t = 2_000,
        help = "Delay between group name checks"
    )]
    pub poll_interval_ms: u64,

    #[arg(
        long = "correction-delay-ms",
        env = "NAMELOCK_CORRECTION_DELAY_MS",
        default_value_t = 0,
        help = "Extra wait before resetting a changed name; 0 resets immediately"
    )]
    pub correction_delay_ms: u64,
}
