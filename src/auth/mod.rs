//! Authentication modes, resolution, and runtime verification
//!
//! A workload reaching Google Cloud authenticates one of two ways: a
//! long-lived key mounted from a Kubernetes Secret, or workload identity,
//! where the pod borrows a Google service account through the cluster's
//! trusted mediation layer. This module owns the types describing that
//! choice and the two sides of making it work:
//!
//! - [`resolver`] - control-plane side: decide the mode at provisioning time
//! - [`check`] / [`server`] - workload side: confirm the decided mode
//!   actually yields usable credentials, behind an HTTP probe endpoint

pub mod check;
pub mod resolver;
pub mod server;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::Error;

/// The decided authentication mechanism, not the credential material itself
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum AuthType {
    /// A long-lived key stored in a Kubernetes Secret and mounted into the pod
    Secret,
    /// Workload identity bound to a Google service account via annotation
    WorkloadIdentityGsa,
    /// Next-generation workload identity; reserved, no resolution path yet
    WorkloadIdentity,
    /// Not yet resolved
    #[default]
    Unknown,
}

impl fmt::Display for AuthType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Secret => write!(f, "secret"),
            Self::WorkloadIdentityGsa => write!(f, "workload-identity-gsa"),
            Self::WorkloadIdentity => write!(f, "workload-identity"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

impl FromStr for AuthType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "secret" => Ok(Self::Secret),
            "workload-identity-gsa" => Ok(Self::WorkloadIdentityGsa),
            "workload-identity" => Ok(Self::WorkloadIdentity),
            "unknown" => Ok(Self::Unknown),
            _ => Err(Error::invalid_args(format!(
                "invalid auth type: {s}, expected one of: secret, workload-identity-gsa, workload-identity, unknown"
            ))),
        }
    }
}

/// Reference to a single key within a namespaced secret
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SecretKeyRef {
    /// Secret name
    pub name: String,
    /// Key within the secret's data
    pub key: String,
}

impl SecretKeyRef {
    /// Create a new secret key reference
    pub fn new(name: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key: key.into(),
        }
    }
}

/// Inputs to a single authentication-mode resolution
///
/// For a per-workload query exactly one of `service_account`/`secret` is
/// meaningful (admission validation enforces mutual exclusivity upstream).
/// For a shared-gateway query both are populated and the resolver weighs
/// them by precedence. Immutable per resolution call.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AuthTypeArgs {
    /// Namespace the workload (or gateway) runs in
    pub namespace: String,
    /// Kubernetes service account to try workload identity with
    pub service_account: Option<String>,
    /// Secret reference to try secret-backed authentication with
    pub secret: Option<SecretKeyRef>,
}

impl AuthTypeArgs {
    /// Arguments for a workload that declared a service-account binding
    pub fn for_service_account(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            service_account: Some(name.into()),
            secret: None,
        }
    }

    /// Arguments for a workload that declared a secret binding
    pub fn for_secret(namespace: impl Into<String>, secret: SecretKeyRef) -> Self {
        Self {
            namespace: namespace.into(),
            service_account: None,
            secret: Some(secret),
        }
    }

    /// Arguments for the shared gateway, which carries both bindings
    pub fn for_gateway(config: &crate::AuthConfig, namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            service_account: Some(config.gateway_service_account.clone()),
            secret: Some(config.gateway_secret.clone()),
        }
    }
}
