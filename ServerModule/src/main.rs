//! tabletop-server: serves the live scene over WebSocket and keeps it in sync
//! with the external state file.

use clap::Parser;
use log::{error, info};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;

use tabletop_server::{SceneResult, SceneServer, ServerConfig};

#[derive(Parser, Debug)]
#[command(name = "tabletop-server", version, about = "Authoritative tabletop scene server")]
struct Args {
    /// JSON config file; command-line flags override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// Address to listen on
    #[arg(long)]
    bind: Option<SocketAddr>,

    /// External state file to reconcile with
    #[arg(long)]
    state_file: Option<PathBuf>,

    /// State file poll interval in milliseconds
    #[arg(long)]
    poll_ms: Option<u64>,

    /// Attempts for each read/parse/validate step
    #[arg(long)]
    retry_attempts: Option<u32>,

    /// Delay between attempts in milliseconds
    #[arg(long)]
    retry_delay_ms: Option<u64>,

    /// Do not rewrite last_modified after reconciling
    #[arg(long)]
    no_write_back: bool,

    /// No table surface; every position counts as on-surface
    #[arg(long)]
    unbounded: bool,
}

impl Args {
    /// Config file (or defaults) with flags layered on top
    fn into_config(self) -> SceneResult<ServerConfig> {
        let mut config = match &self.config {
            Some(path) => ServerConfig::from_file(path)?,
            None => ServerConfig::default(),
        };

        if let Some(bind) = self.bind {
            config.bind = bind;
        }
        if let Some(state_file) = self.state_file {
            config.state_file = state_file;
        }
        if let Some(poll_ms) = self.poll_ms {
            config.poll_interval_ms = poll_ms;
        }
        if let Some(attempts) = self.retry_attempts {
            config.retry.attempts = attempts;
        }
        if let Some(delay_ms) = self.retry_delay_ms {
            config.retry.delay_ms = delay_ms;
        }
        if self.no_write_back {
            config.write_back = false;
        }
        if self.unbounded {
            config.surface = None;
        }

        Ok(config)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match Args::parse().into_config() {
        Ok(config) => config,
        Err(err) => {
            error!("Invalid configuration: {}", err);
            return ExitCode::FAILURE;
        }
    };

    let server = match SceneServer::init(config) {
        Ok(server) => server,
        Err(err) => {
            error!("Failed to initialize: {}", err);
            return ExitCode::FAILURE;
        }
    };

    let shutdown = server.shutdown_handle();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Ctrl-C received, shutting down");
                shutdown.trigger();
            }
            Err(err) => error!("Could not listen for Ctrl-C: {}", err),
        }
    });

    match server.run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("Server error: {}", err);
            ExitCode::FAILURE
        }
    }
}
