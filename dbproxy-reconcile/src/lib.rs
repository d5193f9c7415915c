//! dbproxy-reconcile: resumable reconciliation of database proxies.
//!
//! A run converges one managed resource (proxy, proxy endpoint or proxy
//! target group) towards its declared state across many short invocations.
//! Each invocation receives the progress token returned by the previous one,
//! performs at most one unit of control-plane work and returns a new token
//! together with a scheduler hint for when to call again.
//!
//! The control plane is injected through the [`clients::ControlPlane`] trait;
//! [`clients::MemoryControlPlane`] is an in-process implementation used by the
//! local driver binary and the tests.

pub mod clients;
pub mod config;
pub mod diff;
pub mod error;
pub mod health;
pub mod model;
pub mod reconciler;
pub mod result;
pub mod token;

pub use config::ReconcilerConfig;
pub use error::{ControlPlaneError, ErrorCode, TokenError};
pub use reconciler::{Action, ReconcileRequest, Reconciler, ResourceFamily};
pub use result::{OperationStatus, RunResult};
pub use token::{ProgressToken, Step};
