use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::Parser;
use librclone::{
    DaemonConfig, DaemonSupervisor, Operations, Rclone, RcloneVolume, StaticMetadataStore,
};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};

mod cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = cli.daemon.to_config();

    match cli.command {
        Commands::Run => run_daemon(config).await,
        Commands::Mount {
            volume_id,
            remote,
            remote_path,
            target,
            config_file,
            read_only,
            params,
        } => {
            let config_text = tokio::fs::read_to_string(&config_file)
                .await
                .with_context(|| format!("failed to read {}", config_file.display()))?;
            let volume = RcloneVolume {
                remote,
                remote_path,
                id: volume_id,
            };
            let params: HashMap<String, String> = params.into_iter().collect();
            operations(&config)?
                .mount(&volume, &target, &config_text, read_only, &params)
                .await?;
            Ok(())
        }
        Commands::Unmount { volume_id, target } => {
            operations(&config)?.unmount(&volume_id, &target).await?;
            Ok(())
        }
        Commands::Mkdir(cmd) => {
            let params = cmd.flag_map();
            operations(&config)?
                .create_volume(
                    &cmd.volume_name,
                    &cmd.remote,
                    &cmd.remote_path,
                    &cmd.config_path,
                    &params,
                )
                .await?;
            Ok(())
        }
        Commands::Purge(cmd) => {
            let params = cmd.flag_map();
            let volume = RcloneVolume {
                remote: cmd.remote,
                remote_path: cmd.remote_path,
                id: String::new(),
            };
            operations(&config)?
                .delete_volume(&volume, &cmd.config_path, &params)
                .await?;
            Ok(())
        }
    }
}

fn operations(config: &DaemonConfig) -> anyhow::Result<Rclone> {
    // The operator CLI works on explicit arguments, so no cluster metadata is needed.
    Rclone::new(config, Arc::new(StaticMetadataStore::new()))
        .context("failed to build rclone client")
}

/// Run the daemon until it exits on its own or a stop signal arrives.
async fn run_daemon(config: DaemonConfig) -> anyhow::Result<()> {
    let supervisor = DaemonSupervisor::new(config);
    let mut handle = supervisor
        .start()
        .context("failed to start rclone daemon")?;

    let exited = tokio::select! {
        status = handle.wait() => Some(status),
        _ = shutdown_signal() => None,
    };

    match exited {
        Some(status) => {
            let status = status.context("failed to wait for rclone daemon")?;
            if !status.success() {
                bail!("rclone daemon exited with {status}");
            }
            warn!("rclone daemon exited");
            Ok(())
        }
        None => {
            handle.kill().await.context("failed to stop rclone daemon")?;
            info!("rclone daemon stopped");
            Ok(())
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutting down");
}
