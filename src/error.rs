//! Error types for the Tether authentication subsystem

use thiserror::Error;

use crate::auth::AuthType;

/// Main error type for authentication resolution and verification
///
/// The variants follow the failure taxonomy the rest of the system relies
/// on: an object being absent (`NotFound`) is distinct from a lookup that
/// failed for other reasons (`Lookup`), which is distinct from an object
/// that exists but lacks required configuration (`MissingAnnotation`,
/// `MissingSecretKey`), which is distinct from a live credential failing
/// validation (`InvalidToken`, `MisboundServiceAccount`).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// A cluster object is absent
    #[error("can't find {kind} {name}")]
    NotFound {
        /// Object kind, e.g. "service account"
        kind: &'static str,
        /// Object name
        name: String,
    },

    /// A cluster lookup failed for a reason other than absence
    #[error("error getting {kind} {name}: {source}")]
    Lookup {
        /// Object kind, e.g. "secret"
        kind: &'static str,
        /// Object name
        name: String,
        /// Underlying API error
        source: kube::Error,
    },

    /// A service account exists but is not bound to a cloud identity
    #[error("the service account {name} does not have the required {annotation} annotation")]
    MissingAnnotation {
        /// Service account name
        name: String,
        /// The workload-identity binding annotation that was expected
        annotation: String,
    },

    /// A secret exists but does not carry the expected key
    #[error("the secret {name} does not have the required key {key}")]
    MissingSecretKey {
        /// Secret name
        name: String,
        /// The key that was expected
        key: String,
    },

    /// The resolution arguments themselves are unusable
    #[error("invalid authentication arguments: {0}")]
    InvalidArgs(String),

    /// Neither resolution strategy produced a usable mode
    ///
    /// Both sub-errors are carried verbatim so the operator sees both root
    /// causes at once instead of only the first.
    #[error("authentication is not configured, when checking service account {service_account}, got error: {workload_identity_error}, when checking secret {secret}, got error: {secret_error}")]
    NotConfigured {
        /// Service account name the workload-identity strategy checked
        service_account: String,
        /// Why workload-identity resolution failed
        workload_identity_error: Box<Error>,
        /// Secret name the secret strategy checked
        secret: String,
        /// Why secret resolution failed
        secret_error: Box<Error>,
    },

    /// A per-workload resolution failure on the workload-identity path
    #[error("using workload identity for authentication: {0}")]
    WorkloadIdentityContext(Box<Error>),

    /// A per-workload resolution failure on the secret path
    #[error("using a secret for authentication: {0}")]
    SecretContext(Box<Error>),

    /// Ambient credential material could not be obtained
    #[error("error fetching ambient credentials: {0}")]
    CredentialFetch(String),

    /// The instance metadata endpoint could not be read
    #[error("error reading instance metadata: {0}")]
    Metadata(String),

    /// A token was retrieved but failed validation
    #[error("using {mode} mode, the retrieved token is not valid, probably because the key stored in the Kubernetes Secret is expired or revoked")]
    InvalidToken {
        /// The authentication mode under check
        mode: AuthType,
    },

    /// The workload's bound identity is not a valid service account email
    #[error("using {mode} mode, the workload is not authenticated with a valid Google service account email, probably due to a mismatch between the Kubernetes service account and the Google service account")]
    MisboundServiceAccount {
        /// The authentication mode under check
        mode: AuthType,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a not-found error for the given object
    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            name: name.into(),
        }
    }

    /// Create a lookup error for the given object
    pub fn lookup(kind: &'static str, name: impl Into<String>, source: kube::Error) -> Self {
        Self::Lookup {
            kind,
            name: name.into(),
            source,
        }
    }

    /// Create an invalid-arguments error with the given message
    pub fn invalid_args(msg: impl Into<String>) -> Self {
        Self::InvalidArgs(msg.into())
    }
}
