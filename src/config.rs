//! Well-known names and endpoints, injected where they are used
//!
//! Everything the subsystem needs to know about its environment - the
//! control plane's namespace, the gateway's identity, the metadata server
//! endpoints - lives here as one stationary value set so tests can
//! substitute alternate namespaces and endpoints instead of fighting
//! hard-coded literals.

use std::path::PathBuf;

use crate::auth::SecretKeyRef;

/// Namespace the control plane itself runs in
pub const CONTROL_PLANE_NAMESPACE: &str = "tether-system";

/// Service account used by the shared ingress gateway
pub const GATEWAY_SERVICE_ACCOUNT: &str = "gateway";

/// Name of the secret holding the gateway's cloud key
pub const GATEWAY_SECRET_NAME: &str = "gcp-gateway-key";

/// Key within the gateway secret that holds the JSON credential
pub const GATEWAY_SECRET_KEY: &str = "key.json";

/// Annotation binding a Kubernetes service account to a Google service account
pub const WORKLOAD_IDENTITY_ANNOTATION: &str = "iam.gke.io/gcp-service-account";

/// Metadata server path returning the default service-account email
pub const METADATA_EMAIL_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/email";

/// Metadata server path returning an access token for the default account
pub const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

/// Header name the metadata server requires on every request
pub const METADATA_FLAVOR_HEADER: &str = "Metadata-Flavor";

/// Header value the metadata server requires on every request
pub const METADATA_FLAVOR_VALUE: &str = "Google";

/// OAuth scope requested when fetching a token from ambient credentials
pub const TOKEN_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

/// Path the orchestrator reads container termination diagnostics from
pub const TERMINATION_LOG_PATH: &str = "/dev/termination-log";

/// Stationary configuration for authentication resolution and verification
#[derive(Clone, Debug)]
pub struct AuthConfig {
    /// Namespace the control plane runs in; secrets are only verifiable here
    pub control_plane_namespace: String,
    /// Annotation whose presence marks a service account as identity-bound
    pub workload_identity_annotation: String,
    /// Service account name the shared gateway runs as
    pub gateway_service_account: String,
    /// Secret reference holding the shared gateway's cloud key
    pub gateway_secret: SecretKeyRef,
    /// OAuth scope used when requesting tokens from ambient credentials
    pub token_scope: String,
    /// Metadata endpoint for the default service-account email
    pub metadata_email_url: String,
    /// Metadata endpoint for the default service-account token
    pub metadata_token_url: String,
    /// Where runtime check failures write their diagnostic
    pub termination_log: PathBuf,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            control_plane_namespace: CONTROL_PLANE_NAMESPACE.to_string(),
            workload_identity_annotation: WORKLOAD_IDENTITY_ANNOTATION.to_string(),
            gateway_service_account: GATEWAY_SERVICE_ACCOUNT.to_string(),
            gateway_secret: SecretKeyRef::new(GATEWAY_SECRET_NAME, GATEWAY_SECRET_KEY),
            token_scope: TOKEN_SCOPE.to_string(),
            metadata_email_url: METADATA_EMAIL_URL.to_string(),
            metadata_token_url: METADATA_TOKEN_URL.to_string(),
            termination_log: PathBuf::from(TERMINATION_LOG_PATH),
        }
    }
}

impl AuthConfig {
    /// Override the control-plane namespace
    pub fn with_control_plane_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.control_plane_namespace = namespace.into();
        self
    }

    /// Override the termination diagnostics path
    pub fn with_termination_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.termination_log = path.into();
        self
    }

    /// Override the metadata server endpoints (email and token)
    pub fn with_metadata_endpoints(
        mut self,
        email_url: impl Into<String>,
        token_url: impl Into<String>,
    ) -> Self {
        self.metadata_email_url = email_url.into();
        self.metadata_token_url = token_url.into();
        self
    }
}
