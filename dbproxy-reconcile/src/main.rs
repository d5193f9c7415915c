//! dbproxy-reconcile: local scheduler for proxy reconciliation runs.
//!
//! Reads a request file, then plays the invocation scheduler:
//! - invokes the reconciler with the previous (JSON-encoded) progress token
//! - waits the requested re-invoke delay between invocations
//! - prints the final model once the run succeeds
//!
//! The control plane is simulated in process. Update and delete runs start
//! from a control plane seeded with the resource they operate on.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde::Deserialize;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dbproxy_reconcile::clients::MemoryControlPlane;
use dbproxy_reconcile::model::{EndpointModel, ProxyModel, TargetGroupModel};
use dbproxy_reconcile::reconciler::{EndpointFamily, ProxyFamily, TargetGroupFamily};
use dbproxy_reconcile::{Action, OperationStatus, Reconciler, ReconcilerConfig, ResourceFamily};

/// Drive a database proxy reconciliation run to completion
#[derive(Parser, Debug)]
#[command(name = "dbproxy-reconcile", version, about)]
struct Args {
    /// Request file (JSON): family, action, desired and previous state
    request: PathBuf,

    /// Delay between two stabilization polls in milliseconds
    #[arg(long, default_value = "5000")]
    poll_interval_ms: u64,

    /// Waiting polls allowed per phase before the run times out
    #[arg(long, default_value = "240")]
    max_retries: u32,

    /// Transitional statuses the simulated control plane reports before settling
    #[arg(long, default_value = "2")]
    settle_after: usize,

    /// Re-invoke immediately instead of honouring the requested delay
    #[arg(long)]
    no_wait: bool,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "family", rename_all = "snake_case")]
enum RequestFile {
    Proxy(Envelope<ProxyModel>),
    Endpoint(Envelope<EndpointModel>),
    TargetGroup(Envelope<TargetGroupModel>),
}

#[derive(Debug, Deserialize)]
struct Envelope<M> {
    action: Action,
    desired: M,
    previous: Option<M>,
}

impl<M> Envelope<M> {
    /// State the resource is in before the run starts.
    fn existing(&self) -> &M {
        self.previous.as_ref().unwrap_or(&self.desired)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dbproxy_reconcile=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let raw = tokio::fs::read_to_string(&args.request)
        .await
        .with_context(|| format!("failed to read {}", args.request.display()))?;
    let request: RequestFile = serde_json::from_str(&raw)
        .with_context(|| format!("invalid request file {}", args.request.display()))?;

    let config = ReconcilerConfig {
        poll_interval_ms: args.poll_interval_ms,
        max_stabilization_retries: args.max_retries,
    };
    let control_plane = Arc::new(MemoryControlPlane::new(args.settle_after));
    let wait = !args.no_wait;

    info!(
        "Poll interval {} ms, {} polls per phase",
        config.poll_interval_ms, config.max_stabilization_retries
    );

    match request {
        RequestFile::Proxy(envelope) => {
            if envelope.action != Action::Create {
                control_plane.seed_proxy(envelope.existing());
            }
            let reconciler = Reconciler::new(ProxyFamily, control_plane, config);
            drive(&reconciler, envelope, wait).await
        }
        RequestFile::Endpoint(envelope) => {
            let existing = envelope.existing();
            control_plane.seed_proxy(&ProxyModel {
                db_proxy_name: existing.db_proxy_name.clone(),
                ..Default::default()
            });
            if envelope.action != Action::Create {
                control_plane.seed_endpoint(existing);
            }
            let reconciler = Reconciler::new(EndpointFamily, control_plane, config);
            drive(&reconciler, envelope, wait).await
        }
        RequestFile::TargetGroup(envelope) => {
            let existing = if envelope.action == Action::Create {
                TargetGroupModel {
                    db_cluster_identifiers: Vec::new(),
                    db_instance_identifiers: Vec::new(),
                    ..envelope.desired.clone()
                }
            } else {
                envelope.existing().clone()
            };
            control_plane.seed_target_group(&existing);
            let reconciler = Reconciler::new(TargetGroupFamily, control_plane, config);
            drive(&reconciler, envelope, wait).await
        }
    }
}

/// Invoke until the run leaves IN_PROGRESS.
async fn drive<F: ResourceFamily>(
    reconciler: &Reconciler<F>,
    envelope: Envelope<F::Model>,
    wait: bool,
) -> Result<()> {
    let mut token: Option<String> = None;
    let mut invocations = 0u32;

    loop {
        invocations += 1;
        let result = reconciler
            .resume(
                envelope.action,
                envelope.desired.clone(),
                envelope.previous.clone(),
                token.as_deref(),
            )
            .await;

        match result.status {
            OperationStatus::InProgress => {
                token = result.token;
                if wait && !result.reinvoke_delay.is_zero() {
                    tokio::time::sleep(result.reinvoke_delay).await;
                }
            }
            OperationStatus::Success => {
                info!(
                    "{} of {} finished after {} invocation(s)",
                    envelope.action,
                    F::KIND,
                    invocations
                );
                println!("{}", serde_json::to_string_pretty(&result.model)?);
                return Ok(());
            }
            OperationStatus::Failed => {
                let code = result
                    .error_code
                    .map(|code| code.to_string())
                    .unwrap_or_default();
                bail!(
                    "{} of {} failed after {} invocation(s): {}: {}",
                    envelope.action,
                    F::KIND,
                    invocations,
                    code,
                    result.message.unwrap_or_default()
                );
            }
        }
    }
}
