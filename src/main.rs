//! Tether authentication probe - in-workload credential verification

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tether::auth::check::MetadataServer;
use tether::auth::server::{serve_check, CheckState};
use tether::auth::AuthType;
use tether::AuthConfig;

/// Tether - authentication check endpoint for cluster-managed workloads
///
/// Runs inside the workload pod and answers the orchestrator's probe:
/// 200 when the provisioned authentication mode verifies (or cannot be
/// judged), 401 when the credentials are affirmatively broken.
#[derive(Parser, Debug)]
#[command(name = "tether-authcheck", version, about, long_about = None)]
struct Cli {
    /// Authentication mode this workload was provisioned with
    ///
    /// One of: secret, workload-identity-gsa, workload-identity, unknown.
    /// The control plane resolves this at provisioning time and passes it
    /// down; the probe never re-resolves it.
    #[arg(long, env = "AUTH_TYPE", default_value = "unknown")]
    auth_type: String,

    /// Port for the check endpoint
    #[arg(long, env = "CHECK_PORT", default_value_t = tether::DEFAULT_CHECK_PORT)]
    port: u16,

    /// Override the termination diagnostics path
    #[arg(long)]
    termination_log: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let auth_type: AuthType = cli.auth_type.parse()?;

    let mut config = AuthConfig::default();
    if let Some(path) = cli.termination_log {
        config.termination_log = path;
    }

    let metadata = Arc::new(MetadataServer::new(&config));
    let state = Arc::new(CheckState::new(
        auth_type,
        metadata.clone(),
        metadata,
        config,
    ));

    serve_check(state, cli.port).await?;
    Ok(())
}
