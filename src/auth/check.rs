//! In-workload verification that the resolved mode yields usable credentials
//!
//! These checks run inside the workload's own process, driven by the probe
//! endpoint in [`super::server`]. They are deliberately conservative about
//! what they can prove: a failure to *obtain* credentials or metadata is
//! indeterminate - the workload may be mid-rollout, the metadata server may
//! be briefly unreachable - and an indeterminate check must not take the
//! workload down. Only affirmative evidence of a broken credential (an
//! invalid token that was actually retrieved, an email that is structurally
//! not a service-account email) fails the check.

use std::sync::LazyLock;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use regex::Regex;
use serde::Deserialize;
use tracing::debug;

use crate::auth::AuthType;
use crate::config::{AuthConfig, METADATA_FLAVOR_HEADER, METADATA_FLAVOR_VALUE};
use crate::Error;

/// Shape of a valid Google service account email: a 6-30 character local
/// part and project id, each starting with a lowercase letter, over the
/// canonical domain suffix.
static EMAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z][a-z0-9-]{5,29}@[a-z][a-z0-9-]{5,29}\.iam\.gserviceaccount\.com$")
        .expect("service account email pattern is valid")
});

/// An access token retrieved from ambient credentials
#[derive(Clone, Debug, Deserialize)]
pub struct AccessToken {
    /// The bearer token itself
    #[serde(rename = "access_token")]
    pub token: String,
    /// Seconds until expiry, as reported by the credential source
    pub expires_in: i64,
}

impl AccessToken {
    /// Whether the token is usable right now
    pub fn is_valid(&self) -> bool {
        !self.token.is_empty() && self.expires_in > 0
    }
}

/// Source of tokens from the workload's ambient default credentials
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CredentialSource: Send + Sync {
    /// Obtain an access token for the given scope
    async fn ambient_token(&self, scope: &str) -> Result<AccessToken, Error>;
}

/// Read access to the platform's instance metadata
#[cfg_attr(test, automock)]
#[async_trait]
pub trait InstanceMetadata: Send + Sync {
    /// The default service-account email bound to this workload
    async fn default_service_account_email(&self) -> Result<String, Error>;
}

/// Both metadata traits backed by the real instance metadata server
///
/// The metadata server is an internal-only endpoint; it answers solely to
/// requests carrying the flavor header. The email endpoint's body is
/// returned as-is, error pages included - structural validation downstream
/// is what separates a real identity from a "Not Found" page.
#[derive(Clone)]
pub struct MetadataServer {
    http: reqwest::Client,
    email_url: String,
    token_url: String,
}

impl MetadataServer {
    /// Create a client over the endpoints in `config`
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            email_url: config.metadata_email_url.clone(),
            token_url: config.metadata_token_url.clone(),
        }
    }
}

#[async_trait]
impl CredentialSource for MetadataServer {
    async fn ambient_token(&self, scope: &str) -> Result<AccessToken, Error> {
        let response = self
            .http
            .get(&self.token_url)
            .query(&[("scopes", scope)])
            .header(METADATA_FLAVOR_HEADER, METADATA_FLAVOR_VALUE)
            .send()
            .await
            .map_err(|e| Error::CredentialFetch(e.to_string()))?
            .error_for_status()
            .map_err(|e| Error::CredentialFetch(e.to_string()))?;

        response
            .json::<AccessToken>()
            .await
            .map_err(|e| Error::CredentialFetch(e.to_string()))
    }
}

#[async_trait]
impl InstanceMetadata for MetadataServer {
    async fn default_service_account_email(&self) -> Result<String, Error> {
        let response = self
            .http
            .get(&self.email_url)
            .header(METADATA_FLAVOR_HEADER, METADATA_FLAVOR_VALUE)
            .send()
            .await
            .map_err(|e| Error::Metadata(e.to_string()))?;

        response.text().await.map_err(|e| Error::Metadata(e.to_string()))
    }
}

/// Run the check matching the workload's resolved authentication mode
///
/// Modes with no check defined pass unconditionally.
pub async fn run_check<C, M>(
    auth_type: AuthType,
    credentials: &C,
    metadata: &M,
    config: &AuthConfig,
) -> Result<(), Error>
where
    C: CredentialSource + ?Sized,
    M: InstanceMetadata + ?Sized,
{
    match auth_type {
        AuthType::Secret => check_secret_auth(credentials, config).await,
        AuthType::WorkloadIdentityGsa => check_workload_identity_auth(metadata).await,
        AuthType::WorkloadIdentity | AuthType::Unknown => Ok(()),
    }
}

/// Verify secret-backed authentication by exercising ambient credentials
///
/// Contract: inability to obtain a token at all is indeterminate and passes
/// the check. Only an explicitly invalid token that was successfully
/// retrieved fails it, pointing at the stored key as the likely cause.
pub async fn check_secret_auth<C>(credentials: &C, config: &AuthConfig) -> Result<(), Error>
where
    C: CredentialSource + ?Sized,
{
    let token = match credentials.ambient_token(&config.token_scope).await {
        Ok(token) => token,
        Err(e) => {
            // Indeterminate: no verdict without a token in hand.
            debug!(error = %e, "Could not obtain ambient token, passing check");
            return Ok(());
        }
    };

    if token.is_valid() {
        Ok(())
    } else {
        Err(Error::InvalidToken {
            mode: AuthType::Secret,
        })
    }
}

/// Verify workload identity by inspecting the bound service-account email
///
/// Contract: a metadata read failure is indeterminate and passes the check.
/// A retrieved value that doesn't match the structural email pattern fails
/// it, pointing at the account binding as the likely cause.
pub async fn check_workload_identity_auth<M>(metadata: &M) -> Result<(), Error>
where
    M: InstanceMetadata + ?Sized,
{
    let email = match metadata.default_service_account_email().await {
        Ok(email) => email,
        Err(e) => {
            // Indeterminate: the metadata server gave us nothing to judge.
            debug!(error = %e, "Could not read default service account email, passing check");
            return Ok(());
        }
    };

    if EMAIL_PATTERN.is_match(&email) {
        Ok(())
    } else {
        Err(Error::MisboundServiceAccount {
            mode: AuthType::WorkloadIdentityGsa,
        })
    }
}
