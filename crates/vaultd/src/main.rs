//! The vaultd daemon entry point.

#![forbid(unsafe_code)]

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{debug, error, info};

use vaultd::api::{self, ApiState};
use vaultd::chain::{Chain, ExplorerClient};
use vaultd::config::{self, Config};
use vaultd::logging;
use vaultd_core::Vault;
use vaultd_store::Store;

/// How long shutdown may take before the process is killed.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Parser)]
#[command(name = "vaultd", version, about = "An offline signing vault for the Sia network")]
struct Cli {
    /// The network whose chain tip to fetch (mainnet or zen).
    #[arg(long)]
    network: Option<String>,
}

/// Prints `context: err` to stderr and exits. A no-op for `Ok`.
fn check_fatal<T, E: std::fmt::Display>(context: &str, result: Result<T, E>) -> T {
    match result {
        Ok(value) => value,
        Err(err) => {
            eprintln!("{context}: {err}");
            std::process::exit(1);
        }
    }
}

/// Loads the config file from the first candidate path that exists.
fn try_load_config(cfg: &mut Config) {
    for path in config::try_config_paths() {
        if !path.exists() {
            continue;
        }
        check_fatal("failed to load config file", cfg.load_file(&path));
        return;
    }
}

fn main() {
    // Config file first, then environment variables, then flags.
    let mut cfg = Config::default();
    try_load_config(&mut cfg);
    cfg.apply_env();

    let cli = Cli::parse();
    if let Some(network) = cli.network {
        cfg.explorer.network = network;
    }

    let data_dir = config::default_data_directory(&cfg.directory);
    check_fatal(
        "failed to create data directory",
        std::fs::create_dir_all(&data_dir),
    );

    if cfg.http.password.is_empty() {
        check_fatal::<(), _>(
            "missing password",
            Err("HTTP auth password must be set using ENV variable or config file"),
        );
    } else if cfg.secret.is_empty() {
        check_fatal::<(), _>(
            "missing secret",
            Err("secret must be set using ENV variable or config file"),
        );
    }

    let _log_guard = check_fatal("failed to initialize logging", logging::init(&cfg.log, &data_dir));

    let runtime = check_fatal("failed to create runtime", tokio::runtime::Runtime::new());
    check_fatal("failed to run node", runtime.block_on(run(cfg, data_dir)));
}

async fn run(cfg: Config, data_dir: std::path::PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let listener = tokio::net::TcpListener::bind(&cfg.http.address)
        .await
        .map_err(|err| format!("failed to listen on {:?}: {err}", cfg.http.address))?;

    let store = Store::open(data_dir.join("vaultd.sqlite3"))
        .map_err(|err| format!("failed to open vault database: {err}"))?;
    let vault = Arc::new(Vault::new(Arc::new(store)));

    if !cfg.secret.is_empty() {
        vault
            .unlock(&cfg.secret)
            .map_err(|err| format!("failed to unlock vault: {err}"))?;
    }

    #[cfg(unix)]
    let terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        .map_err(|err| format!("failed to install signal handler: {err}"))?;

    let explorer_url = if cfg.explorer.url.is_empty() {
        ExplorerClient::preset_url(&cfg.explorer.network)
            .ok_or_else(|| format!("unknown explorer network {:?}", cfg.explorer.network))?
            .to_string()
    } else {
        cfg.explorer.url.clone()
    };
    let chain: Arc<dyn Chain> = Arc::new(ExplorerClient::new(explorer_url));

    let state = Arc::new(ApiState::new(
        Arc::clone(&vault),
        chain,
        cfg.http.password.clone(),
    ));

    #[cfg(unix)]
    let shutdown = shutdown_signal(terminate);
    #[cfg(not(unix))]
    let shutdown = shutdown_signal();

    info!(http = %cfg.http.address, "vaultd started");
    axum::serve(listener, api::router(state))
        .with_graceful_shutdown(shutdown)
        .await?;

    debug!("shutting down");
    std::thread::spawn(|| {
        std::thread::sleep(SHUTDOWN_TIMEOUT);
        error!("shutdown took too long");
        std::process::exit(1);
    });
    vault.close();
    Ok(())
}

/// Resolves when the process receives SIGINT or SIGTERM. The SIGTERM
/// receiver is registered by [`run`] so registration failures surface as
/// startup errors.
#[cfg(unix)]
async fn shutdown_signal(mut terminate: tokio::signal::unix::Signal) {
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = terminate.recv() => {}
    }
}

/// Resolves when the process receives Ctrl-C.
#[cfg(not(unix))]
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
