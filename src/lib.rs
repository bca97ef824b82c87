//! Tether - cloud authentication for cluster-managed workloads
//!
//! Tether decides which authentication mechanism a managed workload should
//! use to reach Google Cloud, verifies at runtime that the chosen mechanism
//! actually yields usable credentials, and attributes unhealthy deployments
//! to authentication problems so operators aren't left staring at a generic
//! "unavailable" status.
//!
//! # Components
//!
//! Three components, used in this order across a workload's lifetime:
//!
//! 1. [`auth::resolver`] - control-plane resolution of the authentication
//!    mode for a workload identity (secret-backed key vs. workload identity)
//! 2. [`auth::check`] / [`auth::server`] - the in-workload credential check,
//!    exposed as an HTTP probe endpoint returning 200/401
//! 3. [`classify`] - post-reconcile inspection of an unavailable adapter
//!    deployment, correlating pod events and container termination records
//!    to decide whether authentication is the root cause
//!
//! # Modules
//!
//! - [`auth`] - authentication modes, resolution, and runtime verification
//! - [`classify`] - adapter deployment sync and health classification
//! - [`config`] - injected well-known names and endpoints
//! - [`error`] - error types for the subsystem

#![deny(missing_docs)]

pub mod auth;
pub mod classify;
pub mod config;
pub mod error;

pub use config::AuthConfig;
pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Default port for the in-workload authentication check endpoint
///
/// The orchestrator's probe drives this endpoint; 8080 keeps it clear of
/// the adapter's data-plane ports.
pub const DEFAULT_CHECK_PORT: u16 = 8080;
