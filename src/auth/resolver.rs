//! Control-plane resolution of a workload's authentication mode
//!
//! Two entry points with different precedence policies:
//!
//! - [`auth_type_for_gateway`] serves the shared ingress gateway, where a
//!   service account and a secret reference are both plausible. Both
//!   strategies run unconditionally; workload identity wins when it
//!   resolves, and total failure reports both sub-errors at once.
//! - [`auth_type_for_workload`] serves a single workload that declared
//!   exactly one binding (admission validation enforces exclusivity).
//!   Failures propagate wrapped with the strategy that was in use.
//!
//! Resolution is deterministic given the current cluster state: no caching,
//! no memory across calls.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Secret, ServiceAccount};
#[cfg(test)]
use mockall::automock;
use tracing::debug;

use crate::auth::{AuthType, AuthTypeArgs};
use crate::config::AuthConfig;
use crate::Error;

/// Read-only cluster lookups the resolver depends on
///
/// This trait allows mocking the Kubernetes client in tests while using
/// the real client in production.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterReader: Send + Sync {
    /// Get a service account by namespace and name
    async fn service_account(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<ServiceAccount, kube::Error>;

    /// Get a secret by namespace and name
    async fn secret(&self, namespace: &str, name: &str) -> Result<Secret, kube::Error>;
}

/// [`ClusterReader`] backed by a live Kubernetes client
#[derive(Clone)]
pub struct KubeClusterReader {
    client: kube::Client,
}

impl KubeClusterReader {
    /// Create a reader over the given client
    pub fn new(client: kube::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ClusterReader for KubeClusterReader {
    async fn service_account(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<ServiceAccount, kube::Error> {
        let api: kube::Api<ServiceAccount> = kube::Api::namespaced(self.client.clone(), namespace);
        api.get(name).await
    }

    async fn secret(&self, namespace: &str, name: &str) -> Result<Secret, kube::Error> {
        let api: kube::Api<Secret> = kube::Api::namespaced(self.client.clone(), namespace);
        api.get(name).await
    }
}

/// Resolve the authentication mode for the shared ingress gateway
///
/// Both strategies run regardless of each other's outcome; only their
/// combination matters. Workload identity is strictly preferred because it
/// is the rotation-free, lower-operational-burden mechanism. If neither
/// resolves, the returned error concatenates both sub-resolution failures
/// verbatim.
pub async fn auth_type_for_gateway<R>(
    reader: &R,
    config: &AuthConfig,
    args: &AuthTypeArgs,
) -> Result<AuthType, Error>
where
    R: ClusterReader + ?Sized,
{
    let workload_identity = resolve_workload_identity(reader, config, args).await;
    let secret = resolve_secret(reader, config, args).await;

    match (workload_identity, secret) {
        (Ok(auth_type), _) => Ok(auth_type),
        (Err(_), Ok(auth_type)) => Ok(auth_type),
        (Err(workload_identity_error), Err(secret_error)) => Err(Error::NotConfigured {
            service_account: args.service_account.clone().unwrap_or_default(),
            workload_identity_error: Box::new(workload_identity_error),
            secret: args
                .secret
                .as_ref()
                .map(|s| s.name.clone())
                .unwrap_or_default(),
            secret_error: Box::new(secret_error),
        }),
    }
}

/// Resolve the authentication mode for a single workload
///
/// The workload declared exactly one binding. A service-account binding
/// resolves via workload identity with no fallback; failures come back
/// wrapped with a "using workload identity" context. A secret binding goes
/// through the namespace-aware secret resolution: references outside the
/// control plane's namespace are trusted without inspection (the resolver
/// has no read access there), references inside it are verified. Neither
/// binding is an invalid-arguments error.
pub async fn auth_type_for_workload<R>(
    reader: &R,
    config: &AuthConfig,
    args: &AuthTypeArgs,
) -> Result<AuthType, Error>
where
    R: ClusterReader + ?Sized,
{
    if args.service_account.is_some() {
        return resolve_workload_identity(reader, config, args)
            .await
            .map_err(|e| Error::WorkloadIdentityContext(Box::new(e)));
    }

    if args.secret.is_some() {
        return resolve_secret(reader, config, args)
            .await
            .map_err(|e| Error::SecretContext(Box::new(e)));
    }

    Err(Error::invalid_args(
        "neither a service account name nor a secret reference was provided",
    ))
}

/// Workload-identity sub-resolution shared by both entry points
///
/// Presence of the binding annotation with a non-empty value is the sole
/// eligibility signal. A missing account, a failed lookup, and a present
/// account without the annotation are three distinct errors.
async fn resolve_workload_identity<R>(
    reader: &R,
    config: &AuthConfig,
    args: &AuthTypeArgs,
) -> Result<AuthType, Error>
where
    R: ClusterReader + ?Sized,
{
    let name = args
        .service_account
        .as_deref()
        .ok_or_else(|| Error::invalid_args("no service account name provided"))?;

    let account = match reader.service_account(&args.namespace, name).await {
        Ok(account) => account,
        Err(kube::Error::Api(e)) if e.code == 404 => {
            return Err(Error::not_found("service account", name));
        }
        Err(e) => return Err(Error::lookup("service account", name, e)),
    };

    let bound = account
        .metadata
        .annotations
        .as_ref()
        .and_then(|annotations| annotations.get(&config.workload_identity_annotation))
        .is_some_and(|value| !value.is_empty());

    if bound {
        debug!(namespace = %args.namespace, service_account = %name, "Resolved workload identity binding");
        Ok(AuthType::WorkloadIdentityGsa)
    } else {
        Err(Error::MissingAnnotation {
            name: name.to_string(),
            annotation: config.workload_identity_annotation.clone(),
        })
    }
}

/// Secret sub-resolution, namespace-aware
///
/// The resolver can only read secrets in the control plane's own namespace;
/// a reference anywhere else is trusted as-is. Inside the control plane's
/// namespace the secret must exist and carry the expected key, and either
/// absence is its own error.
async fn resolve_secret<R>(
    reader: &R,
    config: &AuthConfig,
    args: &AuthTypeArgs,
) -> Result<AuthType, Error>
where
    R: ClusterReader + ?Sized,
{
    let secret_ref = args
        .secret
        .as_ref()
        .ok_or_else(|| Error::invalid_args("no secret reference provided"))?;

    if args.namespace != config.control_plane_namespace {
        // No permission to inspect tenant namespaces; trust the reference.
        return Ok(AuthType::Secret);
    }

    let secret = match reader.secret(&args.namespace, &secret_ref.name).await {
        Ok(secret) => secret,
        Err(kube::Error::Api(e)) if e.code == 404 => {
            return Err(Error::not_found("secret", secret_ref.name.clone()));
        }
        Err(e) => return Err(Error::lookup("secret", secret_ref.name.clone(), e)),
    };

    let has_key = secret
        .data
        .as_ref()
        .is_some_and(|data| data.contains_key(&secret_ref.key));

    if has_key {
        Ok(AuthType::Secret)
    } else {
        Err(Error::MissingSecretKey {
            name: secret_ref.name.clone(),
            key: secret_ref.key.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use k8s_openapi::ByteString;

    use super::*;
    use crate::auth::SecretKeyRef;

    fn config() -> AuthConfig {
        AuthConfig::default()
    }

    fn api_error(code: u16, reason: &str) -> kube::Error {
        kube::Error::Api(kube::core::ErrorResponse {
            status: "Failure".to_string(),
            message: reason.to_lowercase(),
            reason: reason.to_string(),
            code,
        })
    }

    fn bound_service_account() -> ServiceAccount {
        ServiceAccount {
            metadata: ObjectMeta {
                name: Some("gateway".to_string()),
                annotations: Some(BTreeMap::from([(
                    "iam.gke.io/gcp-service-account".to_string(),
                    "gateway@my-project99.iam.gserviceaccount.com".to_string(),
                )])),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn unbound_service_account() -> ServiceAccount {
        ServiceAccount {
            metadata: ObjectMeta {
                name: Some("gateway".to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn secret_with_key(key: &str) -> Secret {
        Secret {
            metadata: ObjectMeta {
                name: Some("gcp-gateway-key".to_string()),
                ..Default::default()
            },
            data: Some(BTreeMap::from([(
                key.to_string(),
                ByteString(b"{\"type\":\"service_account\"}".to_vec()),
            )])),
            ..Default::default()
        }
    }

    // ==========================================================================
    // Story: Gateway Resolution Precedence
    //
    // The gateway carries both bindings; workload identity wins whenever it
    // resolves, the secret is the fallback, and total failure reports both
    // causes.
    // ==========================================================================

    /// Workload identity resolving trumps whatever the secret lookup says.
    #[tokio::test]
    async fn when_workload_identity_resolves_gateway_prefers_it() {
        let mut reader = MockClusterReader::new();
        reader
            .expect_service_account()
            .withf(|ns, name| ns == "tether-system" && name == "gateway")
            .times(1)
            .returning(|_, _| Ok(bound_service_account()));
        // The secret lookup still runs; have it fail to prove precedence
        // doesn't depend on its outcome.
        reader
            .expect_secret()
            .times(1)
            .returning(|_, _| Err(api_error(404, "NotFound")));

        let args = AuthTypeArgs::for_gateway(&config(), "tether-system");
        let resolved = auth_type_for_gateway(&reader, &config(), &args).await.unwrap();
        assert_eq!(resolved, AuthType::WorkloadIdentityGsa);
    }

    /// With workload identity broken, a healthy secret carries the gateway.
    #[tokio::test]
    async fn when_workload_identity_fails_gateway_falls_back_to_secret() {
        let mut reader = MockClusterReader::new();
        reader
            .expect_service_account()
            .times(1)
            .returning(|_, _| Ok(unbound_service_account()));
        reader
            .expect_secret()
            .withf(|ns, name| ns == "tether-system" && name == "gcp-gateway-key")
            .times(1)
            .returning(|_, _| Ok(secret_with_key("key.json")));

        let args = AuthTypeArgs::for_gateway(&config(), "tether-system");
        let resolved = auth_type_for_gateway(&reader, &config(), &args).await.unwrap();
        assert_eq!(resolved, AuthType::Secret);
    }

    /// Total failure concatenates both sub-errors so the operator sees both
    /// root causes at once.
    #[tokio::test]
    async fn when_both_strategies_fail_error_names_both_objects() {
        let mut reader = MockClusterReader::new();
        reader
            .expect_service_account()
            .times(1)
            .returning(|_, _| Err(api_error(404, "NotFound")));
        reader
            .expect_secret()
            .times(1)
            .returning(|_, _| Ok(secret_with_key("wrong-key.json")));

        let args = AuthTypeArgs::for_gateway(&config(), "tether-system");
        let err = auth_type_for_gateway(&reader, &config(), &args).await.unwrap_err();

        let text = err.to_string();
        assert!(text.contains("authentication is not configured"));
        assert!(text.contains("when checking service account gateway,"));
        assert!(text.contains("can't find service account"));
        assert!(text.contains("when checking secret gcp-gateway-key,"));
        assert!(text.contains("key.json"));
    }

    // ==========================================================================
    // Story: Per-Workload Resolution
    // ==========================================================================

    /// A service-account binding resolves through workload identity.
    #[tokio::test]
    async fn when_workload_declares_service_account_identity_is_resolved() {
        let mut reader = MockClusterReader::new();
        reader
            .expect_service_account()
            .withf(|ns, name| ns == "tenant-a" && name == "sender")
            .times(1)
            .returning(|_, _| Ok(bound_service_account()));

        let args = AuthTypeArgs::for_service_account("tenant-a", "sender");
        let resolved = auth_type_for_workload(&reader, &config(), &args).await.unwrap();
        assert_eq!(resolved, AuthType::WorkloadIdentityGsa);
    }

    /// Workload-identity failures are wrapped with the strategy in use and
    /// never fall back to the secret path.
    #[tokio::test]
    async fn when_service_account_is_missing_failure_names_workload_identity() {
        let mut reader = MockClusterReader::new();
        reader
            .expect_service_account()
            .times(1)
            .returning(|_, _| Err(api_error(404, "NotFound")));

        let args = AuthTypeArgs::for_service_account("tenant-a", "sender");
        let err = auth_type_for_workload(&reader, &config(), &args).await.unwrap_err();
        assert!(err
            .to_string()
            .starts_with("using workload identity for authentication:"));
        assert!(err.to_string().contains("can't find service account sender"));
    }

    /// An annotation-less service account is a policy violation, phrased
    /// differently from absence.
    #[tokio::test]
    async fn when_annotation_is_missing_error_is_not_phrased_as_not_found() {
        let mut reader = MockClusterReader::new();
        reader
            .expect_service_account()
            .times(1)
            .returning(|_, _| Ok(unbound_service_account()));

        let args = AuthTypeArgs::for_service_account("tenant-a", "sender");
        let err = auth_type_for_workload(&reader, &config(), &args).await.unwrap_err();
        assert!(err.to_string().contains("does not have the required"));
        assert!(!err.to_string().contains("can't find"));
    }

    /// Outside the control plane's namespace the resolver has no read
    /// access, so a secret binding is trusted without any lookup: no
    /// expectations are set on the mock, and any call would panic.
    #[tokio::test]
    async fn when_secret_lives_in_tenant_namespace_it_is_trusted_unchecked() {
        let reader = MockClusterReader::new();

        let args = AuthTypeArgs::for_secret("tenant-a", SecretKeyRef::new("creds", "key.json"));
        let resolved = auth_type_for_workload(&reader, &config(), &args).await.unwrap();
        assert_eq!(resolved, AuthType::Secret);
    }

    /// Inside the control plane's namespace the secret is verifiable, so a
    /// missing key fails resolution.
    #[tokio::test]
    async fn when_control_plane_secret_lacks_key_resolution_fails() {
        let mut reader = MockClusterReader::new();
        reader
            .expect_secret()
            .withf(|ns, name| ns == "tether-system" && name == "creds")
            .times(1)
            .returning(|_, _| Ok(secret_with_key("unrelated.pem")));

        let args =
            AuthTypeArgs::for_secret("tether-system", SecretKeyRef::new("creds", "key.json"));
        let err = auth_type_for_workload(&reader, &config(), &args).await.unwrap_err();
        assert!(err.to_string().contains("does not have the required key key.json"));
    }

    /// ...and succeeds when the key is present.
    #[tokio::test]
    async fn when_control_plane_secret_has_key_resolution_succeeds() {
        let mut reader = MockClusterReader::new();
        reader
            .expect_secret()
            .times(1)
            .returning(|_, _| Ok(secret_with_key("key.json")));

        let args =
            AuthTypeArgs::for_secret("tether-system", SecretKeyRef::new("creds", "key.json"));
        let resolved = auth_type_for_workload(&reader, &config(), &args).await.unwrap();
        assert_eq!(resolved, AuthType::Secret);
    }

    /// Declaring neither binding is a caller bug.
    #[tokio::test]
    async fn when_no_binding_is_declared_arguments_are_invalid() {
        let reader = MockClusterReader::new();
        let args = AuthTypeArgs {
            namespace: "tenant-a".to_string(),
            service_account: None,
            secret: None,
        };
        let err = auth_type_for_workload(&reader, &config(), &args).await.unwrap_err();
        assert!(err.to_string().contains("invalid authentication arguments"));
    }

    /// A non-404 lookup failure is phrased as a broken read, not absence.
    #[tokio::test]
    async fn when_lookup_fails_for_other_reasons_error_is_distinct() {
        let mut reader = MockClusterReader::new();
        reader
            .expect_service_account()
            .times(1)
            .returning(|_, _| Err(api_error(403, "Forbidden")));

        let args = AuthTypeArgs::for_service_account("tenant-a", "sender");
        let err = auth_type_for_workload(&reader, &config(), &args).await.unwrap_err();
        assert!(err.to_string().contains("error getting service account sender"));
        assert!(!err.to_string().contains("can't find"));
    }
}
