use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use namelock_gateway::{run_control_server, ControlServerConfig};
use namelock_messenger::{BridgeClientConfig, HttpMessengerBackend};
use namelock_runtime::{MessengerBackend, NameLockContext, NameLockRuntimeConfig};
use tracing::{info, warn};

use crate::cli_args::Cli;

pub(crate) fn build_runtime_config(cli: &Cli) -> Result<NameLockRuntimeConfig> {
    let config = NameLockRuntimeConfig {
        credential_path: cli.server.credential_path.clone(),
        poll_interval: Duration::from_millis(cli.locker.poll_interval_ms),
        correction_delay: Duration::from_millis(cli.locker.correction_delay_ms),
        call_timeout: Duration::from_millis(cli.messenger.request_timeout_ms),
        log_capacity: cli.server.log_capacity,
        status_log_limit: cli.server.status_log_limit,
    };
    config.validate().context("invalid locker configuration")?;
    Ok(config)
}

pub(crate) fn build_messenger_backend(cli: &Cli) -> Result<Option<Arc<dyn MessengerBackend>>> {
    let Some(api_base) = cli
        .messenger
        .messenger_api_base
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
    else {
        return Ok(None);
    };
    let backend = HttpMessengerBackend::new(BridgeClientConfig {
        api_base: api_base.to_string(),
        client: cli.messenger.messenger_client.into(),
        request_timeout_ms: cli.messenger.request_timeout_ms,
    })
    .context("failed to configure messenger bridge backend")?;
    info!(
        api_base = backend.api_base(),
        client = backend.name(),
        "messenger bridge backend configured"
    );
    Ok(Some(Arc::new(backend)))
}

pub(crate) fn bind_address(host: &str, port: u16) -> String {
    let host = host.trim();
    if host.contains(':') && !host.starts_with('[') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    }
}

pub(crate) async fn run_cli(cli: Cli) -> Result<()> {
    let config = build_runtime_config(&cli)?;
    let backend = build_messenger_backend(&cli)?;
    if backend.is_none() {
        warn!("no messenger api base configured; start requests will be refused");
    }
    let context = NameLockContext::new(config, backend);

    if cli.messenger.auto_login {
        let probe_context = context.clone();
        tokio::spawn(async move {
            let _ = probe_context.auto_login_probe().await;
        });
    }

    run_control_server(
        ControlServerConfig {
            bind: bind_address(&cli.server.bind_host, cli.server.port),
        },
        context,
    )
    .await
}
