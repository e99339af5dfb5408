//! # CLI Interface
//!
//! Command-line arguments for `sqrl-node`, via `clap` derive. Every `run`
//! option can also come from an `SQRL_*` environment variable so the binary
//! can be configured entirely from a container spec.

use clap::{Parser, Subcommand, ValueEnum};

/// SQRL authentication server.
///
/// Serves the `/cli.sqrl` endpoint SQRL apps talk to, plus the small set of
/// browser and resource-server endpoints a login needs.
#[derive(Parser, Debug)]
#[command(
    name = "sqrl-node",
    about = "SQRL authentication server",
    version,
    propagate_version = true
)]
pub struct SqrlNodeCli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the HTTP server.
    Run(RunArgs),
    /// Print a fresh random 32-byte key, hex encoded.
    Keygen,
    /// Sign a request the way a SQRL app would and print the form body.
    Sign(SignArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for the `run` subcommand.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Hex-encoded 32-byte AES key sealing nuts.
    ///
    /// Also seals tokens unless `--token-key` is given.
    #[arg(long, env = "SQRL_KEY")]
    pub key: String,

    /// Hex-encoded 32-byte AES key sealing ident tokens.
    #[arg(long, env = "SQRL_TOKEN_KEY")]
    pub token_key: Option<String>,

    /// Port for the SQRL and browser endpoints.
    #[arg(long, env = "SQRL_PORT", default_value_t = 8000)]
    pub port: u16,

    /// Port for the Prometheus metrics endpoint.
    #[arg(long, env = "SQRL_METRICS_PORT", default_value_t = 9100)]
    pub metrics_port: u16,

    /// Where the browser is sent with `?token=` once a login completes.
    #[arg(long, env = "SQRL_REDIRECT_URL")]
    pub redirect_url: String,

    /// Bearer key required on `/token`. Unauthenticated when omitted.
    #[arg(long, env = "SQRL_API_KEY")]
    pub api_key: Option<String>,

    /// Seconds an issued nut stays redeemable.
    #[arg(long, env = "SQRL_NUT_EXPIRY_SECS", default_value_t = 300)]
    pub nut_expiry_secs: u64,

    /// Seconds an ident token stays exchangeable.
    #[arg(long, env = "SQRL_TOKEN_EXPIRY_SECS", default_value_t = 60)]
    pub token_expiry_secs: u64,

    /// Reject `ident` requests that were not preceded by a `query`.
    #[arg(long)]
    pub require_query_first: bool,

    #[arg(long, env = "SQRL_LOG_FORMAT", value_enum, default_value_t = LogFormatArg::Pretty)]
    pub log_format: LogFormatArg,
}

/// Arguments for the `sign` subcommand.
#[derive(Parser, Debug)]
pub struct SignArgs {
    /// Hex-encoded 32-byte Ed25519 seed of the identity to sign with.
    #[arg(long)]
    pub seed: String,

    /// Command to send, e.g. `query` or `ident`.
    #[arg(long, default_value = "query")]
    pub command: String,

    /// The `sqrl://` login URL. Starts a new session.
    #[arg(long, conflicts_with = "reply", required_unless_present = "reply")]
    pub login_url: Option<String>,

    /// The server's previous raw reply body. Continues a session.
    #[arg(long)]
    pub reply: Option<String>,

    /// Options to assert (`noiptest`, `cps`, ...).
    #[arg(long = "opt")]
    pub opts: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormatArg {
    Pretty,
    Json,
}
