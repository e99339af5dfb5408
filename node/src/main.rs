// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # SQRL Node
//!
//! Entry point for the `sqrl-node` binary. Parses CLI arguments, initializes
//! logging and metrics, and serves the SQRL endpoints.
//!
//! Subcommands:
//!
//! - `run`: start the HTTP server
//! - `keygen`: print a fresh random AES key
//! - `sign`: sign a client request, for testing a deployment by hand
//! - `version`: print build version information

mod api;
mod cli;
mod logging;
mod metrics;

use anyhow::{bail, Context, Result};
use clap::Parser;
use rand::RngCore;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;

use sqrl_protocol::client::ClientSession;
use sqrl_protocol::config::AES_KEY_LENGTH;
use sqrl_protocol::identity::IdentityKeypair;
use sqrl_protocol::message::{Command, Opt};
use sqrl_protocol::store::MemoryStore;
use sqrl_protocol::transaction::IdentPolicy;
use sqrl_protocol::{SqrlConfig, SqrlService};

use cli::{Commands, SqrlNodeCli};
use logging::LogFormat;
use metrics::NodeMetrics;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = SqrlNodeCli::parse();

    match cli.command {
        Commands::Run(args) => run_node(args).await,
        Commands::Keygen => {
            let mut key = [0u8; AES_KEY_LENGTH];
            rand::thread_rng().fill_bytes(&mut key);
            println!("{}", hex::encode(key));
            Ok(())
        }
        Commands::Sign(args) => sign_request(args),
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Starts the SQRL API server and the metrics endpoint.
async fn run_node(args: cli::RunArgs) -> Result<()> {
    logging::init_logging(logging::DEFAULT_FILTER, LogFormat::from(args.log_format));

    let config = build_config(&args)?;
    tracing::info!(
        port = args.port,
        metrics_port = args.metrics_port,
        config = ?config,
        "starting sqrl-node"
    );

    let node_metrics = Arc::new(NodeMetrics::new().context("failed to register metrics")?);
    let service = SqrlService::new(config, Arc::new(MemoryStore::new()));

    let app_state = api::AppState {
        service: Arc::new(service),
        metrics: Arc::clone(&node_metrics),
        api_key: args.api_key.clone(),
    };
    if app_state.api_key.is_none() {
        tracing::warn!("no api key configured, /token is open to anyone");
    }

    // --- API server ---
    let api_router = api::create_router(app_state);
    let api_addr = format!("0.0.0.0:{}", args.port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("failed to bind API listener on {}", api_addr))?;
    tracing::info!("API server listening on {}", api_addr);

    // --- Metrics server ---
    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(Arc::clone(&node_metrics));
    let metrics_addr = format!("0.0.0.0:{}", args.metrics_port);
    let metrics_listener = tokio::net::TcpListener::bind(&metrics_addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {}", metrics_addr))?;
    tracing::info!("Metrics server listening on {}", metrics_addr);

    // --- Serve ---
    let api = axum::serve(
        api_listener,
        api_router.into_make_service_with_connect_info::<SocketAddr>(),
    );
    tokio::select! {
        res = api => {
            if let Err(e) = res {
                tracing::error!("API server error: {}", e);
            }
        }
        res = axum::serve(metrics_listener, metrics_router) => {
            if let Err(e) = res {
                tracing::error!("Metrics server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received");
        }
    }

    tracing::info!("sqrl-node stopped");
    Ok(())
}

fn build_config(args: &cli::RunArgs) -> Result<SqrlConfig> {
    let key = parse_key(&args.key).context("invalid --key")?;
    let mut config = SqrlConfig::new(key, args.redirect_url.clone())
        .with_nut_expiry(Duration::from_secs(args.nut_expiry_secs))
        .with_token_expiry(Duration::from_secs(args.token_expiry_secs));

    if let Some(token_key) = &args.token_key {
        config = config.with_token_key(parse_key(token_key).context("invalid --token-key")?);
    }
    if args.require_query_first {
        config = config.with_ident_policy(IdentPolicy::RequireQueryFirst);
    }
    Ok(config)
}

/// Decodes a 32-byte hex key.
fn parse_key(hex_key: &str) -> Result<[u8; AES_KEY_LENGTH]> {
    let bytes = hex::decode(hex_key.trim()).context("key is not valid hex")?;
    match <[u8; AES_KEY_LENGTH]>::try_from(bytes.as_slice()) {
        Ok(key) => Ok(key),
        Err(_) => bail!("key must be {} bytes, got {}", AES_KEY_LENGTH, bytes.len()),
    }
}

/// Prints the form body a SQRL app would post for the given identity.
fn sign_request(args: cli::SignArgs) -> Result<()> {
    let seed = parse_key(&args.seed).context("invalid --seed")?;
    let mut session = ClientSession::new(IdentityKeypair::from_seed(&seed));
    for opt in &args.opts {
        session = session.with_opt(Opt::parse(opt));
    }
    let command = Command::parse(&args.command);

    let signed = match (&args.login_url, &args.reply) {
        (Some(url), _) => session.first_request(command, url)?,
        (None, Some(reply)) => session.follow_up(command, reply.trim())?,
        (None, None) => bail!("either --login-url or --reply is required"),
    };

    println!("POST ?nut={}", signed.nut);
    println!("{}", signed.form_body());
    Ok(())
}

fn print_version() {
    println!("sqrl-node {}", env!("CARGO_PKG_VERSION"));
    println!("protocol  {}", sqrl_protocol::config::PROTOCOL_VERSION);
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {}", e);
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
                tracing::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
