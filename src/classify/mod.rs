//! Adapter deployment sync and health classification
//!
//! After a workload's managed adapter deployment is brought in sync with
//! its desired spec, an adapter that still can't reach minimum availability
//! leaves the operator with a generic "unavailable" status. This module
//! inspects the live signals the orchestrator already has - pod events and
//! container termination records - and, when they point at authentication,
//! writes a typed `AuthenticationCheckFailed` status instead.
//!
//! # Signal strength
//!
//! Not every signal deserves to end the scan:
//!
//! - A `FailedMount` event is the strongest, most structured evidence (the
//!   credential volume itself wouldn't mount) and halts everything.
//! - A *current* container termination mentioning authentication is live
//!   evidence and also halts.
//! - A *previous* termination mentioning authentication is retrospective:
//!   it is recorded, but the scan keeps looking for something stronger.
//!
//! The per-signal halting rules live in [`AuthSignal::halts_scan`] and are
//! applied by the [`SignalScan`] state machine; the pod/event/container
//! loops never decide control flow themselves.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::ControlFlow;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ContainerState, Event, Pod};
use kube::api::ListParams;
#[cfg(test)]
use mockall::automock;
use tracing::{debug, info, warn};

use crate::Error;

/// Event reason recorded when a volume (typically the credential secret)
/// fails to mount
pub const FAILED_MOUNT_REASON: &str = "FailedMount";

/// Substring marking a container termination message as
/// authentication-related
pub const AUTH_TERMINATION_MARKER: &str = "auth";

/// Typed reasons written into the owning resource's status
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusReason {
    /// Authentication has not been verified yet
    AuthenticationCheckPending,
    /// The adapter's unavailability is attributable to authentication
    AuthenticationCheckFailed,
    /// The adapter deployment could not be updated to the desired spec
    AdapterUpdateFailed,
}

impl fmt::Display for StatusReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AuthenticationCheckPending => write!(f, "AuthenticationCheckPending"),
            Self::AuthenticationCheckFailed => write!(f, "AuthenticationCheckFailed"),
            Self::AdapterUpdateFailed => write!(f, "AdapterUpdateFailed"),
        }
    }
}

/// Status surface exposed by the owning reconciler
///
/// This trait allows recording terminal failure conditions without this
/// module knowing anything about the owning resource's status layout.
#[cfg_attr(test, automock)]
pub trait StatusWriter: Send + Sync {
    /// Record a terminal deployment failure with a typed reason
    fn mark_deployed_failed(&mut self, reason: StatusReason, message: &str);
}

/// Store for the managed adapter deployment
///
/// Creation and updates are owned by the surrounding reconciler machinery;
/// this module only consumes them.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait DeploymentStore: Send + Sync {
    /// Get the adapter deployment, creating it from `desired` when absent
    async fn get_or_create(&self, desired: &Deployment) -> Result<Deployment, Error>;

    /// Replace the adapter deployment's spec
    async fn update(&self, deployment: &Deployment) -> Result<Deployment, Error>;
}

/// Read access to the pods and events behind an adapter deployment
#[cfg_attr(test, automock)]
#[async_trait]
pub trait PodInspector: Send + Sync {
    /// List pods owned by the adapter, by label selector
    async fn adapter_pods(&self, namespace: &str, selector: &str) -> Result<Vec<Pod>, Error>;

    /// List recent cluster events involving one pod
    async fn pod_events(&self, namespace: &str, pod_name: &str) -> Result<Vec<Event>, Error>;
}

/// [`PodInspector`] backed by a live Kubernetes client
#[derive(Clone)]
pub struct KubePodInspector {
    client: kube::Client,
}

impl KubePodInspector {
    /// Create an inspector over the given client
    pub fn new(client: kube::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PodInspector for KubePodInspector {
    async fn adapter_pods(&self, namespace: &str, selector: &str) -> Result<Vec<Pod>, Error> {
        let api: kube::Api<Pod> = kube::Api::namespaced(self.client.clone(), namespace);
        let pods = api.list(&ListParams::default().labels(selector)).await?;
        Ok(pods.items)
    }

    async fn pod_events(&self, namespace: &str, pod_name: &str) -> Result<Vec<Event>, Error> {
        let api: kube::Api<Event> = kube::Api::namespaced(self.client.clone(), namespace);
        let events = api
            .list(&ListParams::default().fields(&format!("involvedObject.name={pod_name}")))
            .await?;
        Ok(events.items)
    }
}

/// Diagnostic signals that can attribute unavailability to authentication
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthSignal {
    /// A `FailedMount` event on an owned pod
    CredentialMountFailed,
    /// The current termination record of a container mentions authentication
    TerminatedForAuth,
    /// Only the previous termination record mentions authentication
    PreviouslyTerminatedForAuth,
}

impl AuthSignal {
    /// Whether observing this signal ends the scan immediately
    ///
    /// Live signals halt; the retrospective one keeps the scan open in case
    /// stronger evidence follows.
    pub fn halts_scan(self) -> bool {
        match self {
            Self::CredentialMountFailed | Self::TerminatedForAuth => true,
            Self::PreviouslyTerminatedForAuth => false,
        }
    }
}

/// One authentication-related finding produced by a scan
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthFinding {
    /// Which signal matched
    pub signal: AuthSignal,
    /// The signal's message, verbatim - this is what the operator sees
    pub message: String,
}

/// State machine accumulating signal observations during one scan
///
/// Feed every candidate signal through [`observe`](Self::observe) and let
/// its return value drive the loop: `Break` means stop scanning. Recording
/// rules: the first finding wins, except that a halting signal replaces a
/// previously recorded non-halting one.
#[derive(Debug, Default)]
pub struct SignalScan {
    finding: Option<AuthFinding>,
}

impl SignalScan {
    /// Start a fresh scan
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an observation and decide whether the scan continues
    pub fn observe(&mut self, signal: AuthSignal, message: impl Into<String>) -> ControlFlow<()> {
        let records = match &self.finding {
            None => true,
            Some(existing) => signal.halts_scan() && !existing.signal.halts_scan(),
        };
        if records {
            self.finding = Some(AuthFinding {
                signal,
                message: message.into(),
            });
        }
        if signal.halts_scan() {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    }

    /// The finding this scan settled on, if any
    pub fn into_finding(self) -> Option<AuthFinding> {
        self.finding
    }
}

/// Sync the adapter deployment and classify it when it stays unavailable
///
/// Brings the live deployment in line with `desired` (recording an
/// `AdapterUpdateFailed` status when the update itself fails), then - only
/// if the result is below minimum availability - attempts authentication
/// classification. An adapter that is available needs nothing from here;
/// its status is left to the generic lifecycle.
pub async fn sync_adapter<D, P, S>(
    store: &D,
    inspector: &P,
    status: &mut S,
    desired: &Deployment,
) -> Result<(), Error>
where
    D: DeploymentStore + ?Sized,
    P: PodInspector + ?Sized,
    S: StatusWriter + ?Sized,
{
    let mut existing = store.get_or_create(desired).await?;

    if existing.spec != desired.spec {
        existing.spec = desired.spec.clone();
        existing = match store.update(&existing).await {
            Ok(updated) => updated,
            Err(e) => {
                status.mark_deployed_failed(
                    StatusReason::AdapterUpdateFailed,
                    &format!("Error updating the adapter: {e}"),
                );
                return Err(e);
            }
        };
    }

    if minimum_available(&existing) {
        return Ok(());
    }

    let namespace = existing.metadata.namespace.as_deref().unwrap_or_default();
    let selector = existing
        .spec
        .as_ref()
        .and_then(|spec| spec.selector.match_labels.as_ref())
        .map(label_selector)
        .unwrap_or_default();
    warn!(
        deployment = ?existing.metadata.name,
        namespace = %namespace,
        "Adapter deployment below minimum availability"
    );

    if let Some(finding) = classify_unavailable(inspector, namespace, &selector).await {
        info!(
            signal = ?finding.signal,
            "Attributing adapter unavailability to authentication"
        );
        status.mark_deployed_failed(StatusReason::AuthenticationCheckFailed, &finding.message);
    }

    Ok(())
}

/// Whether the deployment currently satisfies its minimum availability
pub fn minimum_available(deployment: &Deployment) -> bool {
    deployment
        .status
        .as_ref()
        .and_then(|status| status.conditions.as_ref())
        .into_iter()
        .flatten()
        .any(|condition| condition.type_ == "Available" && condition.status == "True")
}

/// Scan an unavailable adapter's pods for authentication signals
///
/// A failed or empty pod listing produces no classification: better a
/// generic unavailability status than a guessed diagnosis. Event listing
/// failures degrade the same way for the affected pod. Iteration is
/// sequential; the early-exit contract depends on observation order.
pub async fn classify_unavailable<P>(
    inspector: &P,
    namespace: &str,
    selector: &str,
) -> Option<AuthFinding>
where
    P: PodInspector + ?Sized,
{
    let pods = match inspector.adapter_pods(namespace, selector).await {
        Ok(pods) => pods,
        Err(e) => {
            debug!(error = %e, "Pod listing failed, skipping classification");
            return None;
        }
    };
    if pods.is_empty() {
        return None;
    }

    let mut scan = SignalScan::new();
    'pods: for pod in &pods {
        let pod_name = pod.metadata.name.as_deref().unwrap_or_default();

        let events = match inspector.pod_events(namespace, pod_name).await {
            Ok(events) => events,
            Err(e) => {
                debug!(error = %e, pod = %pod_name, "Event listing failed, continuing without events");
                Vec::new()
            }
        };
        for event in &events {
            if event.reason.as_deref() == Some(FAILED_MOUNT_REASON) {
                let message = event.message.clone().unwrap_or_default();
                if scan
                    .observe(AuthSignal::CredentialMountFailed, message)
                    .is_break()
                {
                    break 'pods;
                }
            }
        }

        let statuses = pod
            .status
            .iter()
            .flat_map(|status| status.container_statuses.iter().flatten());
        for container in statuses {
            if let Some(message) = auth_termination_message(container.state.as_ref()) {
                if scan
                    .observe(AuthSignal::TerminatedForAuth, message)
                    .is_break()
                {
                    break 'pods;
                }
            } else if let Some(message) = auth_termination_message(container.last_state.as_ref()) {
                if scan
                    .observe(AuthSignal::PreviouslyTerminatedForAuth, message)
                    .is_break()
                {
                    break 'pods;
                }
            }
        }
    }

    scan.into_finding()
}

/// The termination message of a container state, when it mentions
/// authentication
fn auth_termination_message(state: Option<&ContainerState>) -> Option<String> {
    state
        .and_then(|state| state.terminated.as_ref())
        .and_then(|terminated| terminated.message.clone())
        .filter(|message| message.contains(AUTH_TERMINATION_MARKER))
}

/// Render match labels as a label-selector query string
fn label_selector(labels: &BTreeMap<String, String>) -> String {
    labels
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join(",")
}
