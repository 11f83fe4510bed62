mod core;
mod daemon;
mod debug_log;
mod host;
mod icons;
mod inspector;
mod mutate;
mod render;

#[cfg(test)]
mod test_support;

use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::Context;
use dial_proto::config::Config;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::core::{Session, SessionEvent};
use crate::daemon::DaemonClient;
use crate::debug_log::DebugSinkLayer;
use crate::host::Args;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::from_env();

    // Unreadable config falls back to defaults; reported once logging is up.
    let loaded = match &args.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    };
    let (config, config_error) = match loaded {
        Ok(config) => (config, None),
        Err(e) => (Config::default(), Some(e)),
    };

    // File log + daemon console forwarding; stderr if the file can't be opened
    let data_dir = dial_proto::platform::data_dir();
    let (writer, log_file) = match open_log_file(&data_dir) {
        Ok((file, path)) => (BoxMakeWriter::new(file), Ok(path)),
        Err(e) => (BoxMakeWriter::new(std::io::stderr), Err(e)),
    };

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(false);

    let (log_tx, log_rx) = mpsc::unbounded_channel::<String>();
    let debug_layer = config
        .logging
        .forward_to_daemon
        .then(|| DebugSinkLayer::new(log_tx));

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(debug_layer)
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.filter)),
        )
        .init();

    info!("dial-mixer {} starting", env!("CARGO_PKG_VERSION"));
    match &log_file {
        Ok(path) => info!("Log file: {:?}", path),
        Err(e) => warn!("log file unavailable, logging to stderr: {:#}", e),
    }
    match config_error {
        Some(e) => warn!("config unreadable, using defaults: {:#}", e),
        None => info!("Config loaded from: {:?}", args.config.clone().unwrap_or_else(Config::config_path)),
    }
    if let Some(info) = &args.info {
        debug!("host info: {}", info);
    }

    let daemon = DaemonClient::from_config(&config)?;
    let cancel = CancellationToken::new();
    if config.logging.forward_to_daemon {
        debug_log::spawn_forwarder(log_rx, daemon.clone(), cancel.clone());
    }

    // Event channel: host frames and background results funnel into Session
    let (event_tx, event_rx) = mpsc::channel::<SessionEvent>(256);

    let sink = host::connect(&args, event_tx.clone(), cancel.clone()).await?;
    let session = Session::new(
        &config,
        daemon,
        sink,
        args.plugin_uuid.clone(),
        event_tx,
        cancel,
    );
    session.run(event_rx).await?;

    info!("dial-mixer exiting");
    Ok(())
}

fn open_log_file(data_dir: &Path) -> anyhow::Result<(File, PathBuf)> {
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("creating {}", data_dir.display()))?;
    let path = data_dir.join("plugin.log");
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("opening {}", path.display()))?;
    Ok((file, path))
}
