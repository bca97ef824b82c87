//! HTTP probe surface for the in-workload authentication check
//!
//! The orchestrator's probe drives a single GET endpoint: 200 means the
//! resolved mode verified (or could not be judged), 401 means affirmative
//! evidence of broken credentials. On failure the diagnostic is also
//! written as a small JSON object to the termination-log path, so the
//! control plane can read the cause from the container's termination
//! record instead of scraping logs.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use tracing::{info, warn};

use crate::auth::check::{self, CredentialSource, InstanceMetadata};
use crate::auth::AuthType;
use crate::config::AuthConfig;
use crate::Error;

/// Shared state for the check endpoint
pub struct CheckState {
    /// The mode this workload was provisioned with, passed down from the
    /// control plane's resolution - never re-resolved here
    pub auth_type: AuthType,
    /// Ambient credential source (secret mode)
    pub credentials: Arc<dyn CredentialSource>,
    /// Instance metadata reader (workload-identity mode)
    pub metadata: Arc<dyn InstanceMetadata>,
    /// Endpoints, scope, and termination-log path
    pub config: AuthConfig,
}

impl CheckState {
    /// Create state for the check endpoint
    pub fn new(
        auth_type: AuthType,
        credentials: Arc<dyn CredentialSource>,
        metadata: Arc<dyn InstanceMetadata>,
        config: AuthConfig,
    ) -> Self {
        Self {
            auth_type,
            credentials,
            metadata,
            config,
        }
    }
}

/// Create the check router
///
/// - GET /healthz - run the authentication check for the configured mode
pub fn check_router(state: Arc<CheckState>) -> Router {
    Router::new()
        .route("/healthz", get(check_handler))
        .with_state(state)
}

/// Serve the check endpoint until the process exits
pub async fn serve_check(state: Arc<CheckState>, port: u16) -> Result<(), Error> {
    let app = check_router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %addr, "Authentication check endpoint started");
    axum::serve(listener, app).await?;
    Ok(())
}

/// Run the configured check and translate the outcome for the probe
async fn check_handler(State(state): State<Arc<CheckState>>) -> StatusCode {
    match check::run_check(
        state.auth_type,
        state.credentials.as_ref(),
        state.metadata.as_ref(),
        &state.config,
    )
    .await
    {
        Ok(()) => StatusCode::OK,
        Err(e) => {
            warn!(error = %e, auth_type = %state.auth_type, "Authentication check failed");
            if let Err(write_err) =
                write_termination_diagnostic(&state.config.termination_log, &e.to_string())
            {
                warn!(error = %write_err, "Failed to write termination diagnostic");
            }
            StatusCode::UNAUTHORIZED
        }
    }
}

/// Record a check failure where the orchestrator will surface it
pub fn write_termination_diagnostic(path: &Path, message: &str) -> Result<(), Error> {
    let body = serde_json::to_vec(&serde_json::json!({ "error": message }))?;
    std::fs::write(path, body)?;
    Ok(())
}
