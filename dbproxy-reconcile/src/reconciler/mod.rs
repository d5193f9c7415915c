//! Resumable reconcilers for the managed resource families.
//!
//! A run is a sequence of invocations. Each invocation walks the family's
//! plan for the requested action, skips the steps the progress token already
//! records as complete and executes the first open one. A step either falls
//! through to the next step in the same invocation or yields with an updated
//! token, which ends the invocation as IN_PROGRESS.
//!
//! Families only describe *what* to call; sequencing, retry budgets, status
//! polling and error classification live in [`Reconciler`].

pub mod endpoint;
pub mod poll;
pub mod proxy;
pub mod target_group;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::clients::ControlPlane;
use crate::config::ReconcilerConfig;
use crate::diff::diff;
use crate::error::{ControlPlaneError, ErrorCode, Result};
use crate::health;
use crate::model::{RegisteredTarget, Tag, Target};
use crate::result::RunResult;
use crate::token::{ProgressToken, Step};

pub use endpoint::EndpointFamily;
pub use poll::{Stability, StatusSets};
pub use proxy::ProxyFamily;
pub use target_group::TargetGroupFamily;

/// Lifecycle action requested for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Create,
    Update,
    Delete,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Create => write!(f, "create"),
            Action::Update => write!(f, "update"),
            Action::Delete => write!(f, "delete"),
        }
    }
}

/// Input of one invocation.
#[derive(Debug, Clone)]
pub struct ReconcileRequest<M, T> {
    pub action: Action,
    pub desired: M,
    /// Required for updates, ignored otherwise.
    pub previous: Option<M>,
    /// `None` on the first invocation of a run.
    pub token: Option<T>,
}

/// Progress token of a family.
pub type Token<F> = ProgressToken<<F as ResourceFamily>::Snapshot>;

/// Result of one invocation of a family's reconciler.
pub type Outcome<F> = RunResult<<F as ResourceFamily>::Model, Token<F>>;

/// Family-specific capabilities the generic reconciler drives.
///
/// Only the target-group family overrides the target hooks; only proxies and
/// endpoints carry tags.
#[async_trait]
pub trait ResourceFamily: Send + Sync {
    /// Declared state.
    type Model: Clone + PartialEq + fmt::Debug + Send + Sync + Serialize + DeserializeOwned;
    /// Control-plane view.
    type Snapshot: Clone + PartialEq + fmt::Debug + Send + Sync + Serialize + DeserializeOwned;

    /// Human-readable kind used in logs and messages.
    const KIND: &'static str;

    /// Ordered steps for `action`.
    fn plan(&self, action: Action) -> &'static [Step];

    fn identifier(&self, model: &Self::Model) -> String;

    /// Describe the first create-only field that differs, if any.
    fn create_only_violation(&self, previous: &Self::Model, desired: &Self::Model)
        -> Option<String>;

    async fn create(
        &self,
        cp: &dyn ControlPlane,
        desired: &Self::Model,
    ) -> Result<Option<Self::Snapshot>>;

    async fn modify(
        &self,
        cp: &dyn ControlPlane,
        previous: &Self::Model,
        desired: &Self::Model,
    ) -> Result<Option<Self::Snapshot>>;

    async fn delete(&self, cp: &dyn ControlPlane, model: &Self::Model)
        -> Result<Option<Self::Snapshot>>;

    async fn describe(&self, cp: &dyn ControlPlane, model: &Self::Model) -> Result<Self::Snapshot>;

    fn status<'a>(&self, snapshot: &'a Self::Snapshot) -> &'a str;

    fn status_sets(&self) -> StatusSets;

    fn arn<'a>(&self, snapshot: &'a Self::Snapshot) -> Option<&'a str>;

    /// Output model: the declared state with read-only fields filled from the
    /// last observation, or from the previous model when nothing was observed.
    fn output(
        &self,
        desired: &Self::Model,
        previous: Option<&Self::Model>,
        observed: Option<&Self::Snapshot>,
    ) -> Self::Model;

    fn tags<'a>(&self, _model: &'a Self::Model) -> &'a [Tag] {
        &[]
    }

    /// Status of the resource this one waits for before it is created.
    async fn describe_parent(&self, cp: &dyn ControlPlane, model: &Self::Model) -> Result<String> {
        let snapshot = self.describe(cp, model).await?;
        Ok(self.status(&snapshot).to_string())
    }

    fn targets(&self, _model: &Self::Model) -> Vec<Target> {
        Vec::new()
    }

    async fn register_targets(
        &self,
        _cp: &dyn ControlPlane,
        _model: &Self::Model,
        _targets: &[Target],
    ) -> Result<Vec<RegisteredTarget>> {
        Ok(Vec::new())
    }

    async fn deregister_targets(
        &self,
        _cp: &dyn ControlPlane,
        _model: &Self::Model,
        _targets: &[Target],
    ) -> Result<()> {
        Ok(())
    }

    async fn describe_targets(
        &self,
        _cp: &dyn ControlPlane,
        _model: &Self::Model,
    ) -> Result<Vec<RegisteredTarget>> {
        Ok(Vec::new())
    }
}

/// What a step asks the reconciler to do next.
enum Flow<S> {
    /// Continue with the next open step in this invocation.
    Next(ProgressToken<S>),
    /// End the invocation as IN_PROGRESS.
    Yield(ProgressToken<S>, Duration),
    /// End the run as FAILED.
    Fail(ErrorCode, String),
}

/// Generic step sequencer for one resource family.
pub struct Reconciler<F: ResourceFamily> {
    family: F,
    control_plane: Arc<dyn ControlPlane>,
    config: ReconcilerConfig,
}

impl<F: ResourceFamily> Reconciler<F> {
    pub fn new(family: F, control_plane: Arc<dyn ControlPlane>, config: ReconcilerConfig) -> Self {
        Self {
            family,
            control_plane,
            config,
        }
    }

    /// Run one invocation. Never fails: every outcome is a [`RunResult`].
    pub async fn reconcile(&self, request: ReconcileRequest<F::Model, Token<F>>) -> Outcome<F> {
        let ReconcileRequest {
            action,
            desired,
            previous,
            token,
        } = request;
        let name = self.family.identifier(&desired);

        if action == Action::Update && previous.is_none() {
            warn!("Rejecting update of {} {}: no previous state", F::KIND, name);
            return RunResult::failed(
                ErrorCode::InvalidRequest,
                format!("update of {} {} requires the previous state", F::KIND, name),
            );
        }

        let mut token = token.unwrap_or_else(|| {
            info!("Starting {} of {} {}", action, F::KIND, name);
            ProgressToken::fresh(self.config.max_stabilization_retries)
        });

        for &step in self.family.plan(action) {
            if token.is_complete(step) {
                continue;
            }
            debug!("{} {}: running {:?}", F::KIND, name, step);

            let flow = self
                .run_step(step, action, &name, &desired, previous.as_ref(), token)
                .await;
            match flow {
                Ok(Flow::Next(next)) => token = next,
                Ok(Flow::Yield(next, delay)) => {
                    let model = self.family.output(&desired, previous.as_ref(), next.observed());
                    return RunResult::in_progress(model, next, delay);
                }
                Ok(Flow::Fail(code, message)) => {
                    warn!("{} of {} {} failed ({}): {}", action, F::KIND, name, code, message);
                    return RunResult::failed(code, message);
                }
                Err(e) => {
                    warn!("{} of {} {} failed at {:?}: {}", action, F::KIND, name, step, e);
                    return RunResult::failed(e.code(), e.message());
                }
            }
        }

        info!("Finished {} of {} {}", action, F::KIND, name);
        match action {
            Action::Delete => RunResult::success(None),
            Action::Create | Action::Update => {
                let model = self.family.output(&desired, previous.as_ref(), token.observed());
                RunResult::success(Some(model))
            }
        }
    }

    /// Run one invocation with the token in its encoded form.
    ///
    /// A token that cannot be decoded fails the run with `InvalidRequest`.
    pub async fn resume(
        &self,
        action: Action,
        desired: F::Model,
        previous: Option<F::Model>,
        token: Option<&str>,
    ) -> RunResult<F::Model, String> {
        let token: Option<Token<F>> = match token.map(ProgressToken::decode).transpose() {
            Ok(token) => token,
            Err(e) => return RunResult::failed(ErrorCode::InvalidRequest, e.to_string()),
        };
        let outcome = self
            .reconcile(ReconcileRequest {
                action,
                desired,
                previous,
                token,
            })
            .await;
        outcome
            .try_map_token(|token| token.encode())
            .unwrap_or_else(|e| RunResult::failed(ErrorCode::InternalFailure, e.to_string()))
    }

    async fn run_step(
        &self,
        step: Step,
        action: Action,
        name: &str,
        desired: &F::Model,
        previous: Option<&F::Model>,
        token: Token<F>,
    ) -> Result<Flow<F::Snapshot>> {
        let cp = self.control_plane.as_ref();
        let budget = self.config.max_stabilization_retries;
        // Checked up front for updates.
        let previous = previous.unwrap_or(desired);

        match step {
            Step::ValidateImmutable => {
                match self.family.create_only_violation(previous, desired) {
                    Some(field) => Ok(Flow::Fail(
                        ErrorCode::NotUpdatable,
                        format!("{} {}: {} cannot be updated", F::KIND, name, field),
                    )),
                    None => Ok(Flow::Next(token)),
                }
            }

            Step::AwaitParent => {
                if let Some(flow) = self.out_of_budget(&token, name, step) {
                    return Ok(flow);
                }
                let status = self.family.describe_parent(cp, desired).await?;
                match self.family.status_sets().classify(&status) {
                    Stability::Ready => {
                        info!("{} {}: parent is {}", F::KIND, name, status);
                        Ok(Flow::Yield(token.complete(step, budget), Duration::ZERO))
                    }
                    Stability::Failed => Ok(Flow::Fail(
                        ErrorCode::NotFound,
                        format!("{} {}: parent reached status {}", F::KIND, name, status),
                    )),
                    Stability::Transitional => {
                        info!("{} {}: waiting for parent ({})", F::KIND, name, status);
                        Ok(Flow::Yield(token.waited(), self.config.poll_interval()))
                    }
                }
            }

            Step::MutatePrimary => {
                let snapshot = match action {
                    Action::Create => self.family.create(cp, desired).await?,
                    Action::Update | Action::Delete => {
                        self.family.modify(cp, previous, desired).await?
                    }
                };
                info!("{} {}: {} requested", F::KIND, name, action);
                Ok(Flow::Yield(
                    token.observe(snapshot).complete(step, budget),
                    Duration::ZERO,
                ))
            }

            Step::RemoveTags | Step::AddTags => {
                let tags = diff(self.family.tags(previous), self.family.tags(desired));
                let pending = if step == Step::RemoveTags {
                    tags.to_remove
                } else {
                    tags.to_add
                };
                if pending.is_empty() {
                    return Ok(Flow::Next(token.mark(step)));
                }

                let (token, arn) = self.resolve_arn(desired, token).await?;
                if step == Step::RemoveTags {
                    let keys: Vec<String> = pending.into_iter().map(|tag| tag.key).collect();
                    info!("{} {}: removing tags {:?}", F::KIND, name, keys);
                    cp.remove_tags(&arn, &keys).await?;
                } else {
                    info!("{} {}: adding {} tag(s)", F::KIND, name, pending.len());
                    cp.add_tags(&arn, &pending).await?;
                }
                Ok(Flow::Yield(token.complete(step, budget), Duration::ZERO))
            }

            Step::Stabilize => {
                if let Some(flow) = self.out_of_budget(&token, name, step) {
                    return Ok(flow);
                }
                let snapshot = self.family.describe(cp, desired).await?;
                let status = self.family.status(&snapshot).to_string();
                match self.family.status_sets().classify(&status) {
                    Stability::Ready => Ok(Flow::Next(token.observe(Some(snapshot)).mark(step))),
                    Stability::Failed => Ok(Flow::Fail(
                        ErrorCode::NotFound,
                        format!("{} {} reached status {}", F::KIND, name, status),
                    )),
                    Stability::Transitional => {
                        info!(
                            "{} {} is {} ({} polls left)",
                            F::KIND,
                            name,
                            status,
                            token.retries_remaining()
                        );
                        Ok(Flow::Yield(
                            token.observe(Some(snapshot)).waited(),
                            self.config.poll_interval(),
                        ))
                    }
                }
            }

            Step::RemoveTargets | Step::AddTargets => {
                let before = match action {
                    Action::Create => Vec::new(),
                    Action::Update | Action::Delete => self.family.targets(previous),
                };
                let targets = diff(&before, &self.family.targets(desired));
                if step == Step::RemoveTargets {
                    if targets.to_remove.is_empty() {
                        return Ok(Flow::Next(token.mark(step)));
                    }
                    info!(
                        "{} {}: deregistering {}",
                        F::KIND,
                        name,
                        ids(&targets.to_remove)
                    );
                    self.family
                        .deregister_targets(cp, desired, &targets.to_remove)
                        .await?;
                    Ok(Flow::Yield(token.complete(step, budget), Duration::ZERO))
                } else {
                    if targets.to_add.is_empty() {
                        return Ok(Flow::Next(token.mark(step)));
                    }
                    info!("{} {}: registering {}", F::KIND, name, ids(&targets.to_add));
                    let registered = self
                        .family
                        .register_targets(cp, desired, &targets.to_add)
                        .await?;
                    Ok(Flow::Yield(
                        token.observe_targets(registered).complete(step, budget),
                        Duration::ZERO,
                    ))
                }
            }

            Step::HealthGate => {
                if let Some(flow) = self.out_of_budget(&token, name, step) {
                    return Ok(flow);
                }
                let targets = self.family.describe_targets(cp, desired).await?;
                let unhealthy = health::first_unhealthy(&targets).map(|target| {
                    let state = target
                        .health
                        .as_ref()
                        .map(|h| h.state.clone())
                        .unwrap_or_else(|| "unknown".to_string());
                    (target.id.clone(), state)
                });
                let token = token.observe_targets(targets);
                match unhealthy {
                    None => Ok(Flow::Next(token.mark(step))),
                    Some((id, state)) => {
                        info!("{} {}: target {} is {}", F::KIND, name, id, state);
                        Ok(Flow::Yield(token.waited(), self.config.poll_interval()))
                    }
                }
            }

            Step::DeregisterDependents => {
                match self.deregister_all(desired).await {
                    Ok(0) => debug!("{} {}: no targets registered", F::KIND, name),
                    Ok(count) => info!("{} {}: deregistered {} target(s)", F::KIND, name, count),
                    Err(e @ (ControlPlaneError::NotFound(_) | ControlPlaneError::InvalidState(_))) => {
                        warn!("{} {}: ignoring {} while deregistering", F::KIND, name, e)
                    }
                    Err(e) => return Err(e),
                }
                Ok(Flow::Next(token.mark(step)))
            }

            Step::DeletePrimary => match self.family.delete(cp, desired).await {
                Ok(snapshot) => {
                    info!("{} {}: deletion requested", F::KIND, name);
                    Ok(Flow::Yield(
                        token.observe(snapshot).complete(step, budget),
                        Duration::ZERO,
                    ))
                }
                Err(ControlPlaneError::NotFound(_)) => {
                    info!("{} {} is already gone", F::KIND, name);
                    Ok(Flow::Next(token.mark(step).mark(Step::ConfirmDeleted)))
                }
                Err(e) => Err(e),
            },

            Step::ConfirmDeleted => {
                if let Some(flow) = self.out_of_budget(&token, name, step) {
                    return Ok(flow);
                }
                match self.family.describe(cp, desired).await {
                    Ok(snapshot) => {
                        info!(
                            "{} {} is {} ({} polls left)",
                            F::KIND,
                            name,
                            self.family.status(&snapshot),
                            token.retries_remaining()
                        );
                        Ok(Flow::Yield(
                            token.observe(Some(snapshot)).waited(),
                            self.config.poll_interval(),
                        ))
                    }
                    Err(ControlPlaneError::NotFound(_)) => {
                        info!("{} {} deleted", F::KIND, name);
                        Ok(Flow::Next(token.observe(None).mark(step)))
                    }
                    Err(e) => Err(e),
                }
            }
        }
    }

    /// Timeout check for polling steps, before any describe is issued.
    fn out_of_budget(
        &self,
        token: &Token<F>,
        name: &str,
        step: Step,
    ) -> Option<Flow<F::Snapshot>> {
        if token.retries_remaining() > 0 {
            return None;
        }
        Some(Flow::Fail(
            ErrorCode::Timeout,
            format!(
                "{} {} did not stabilize within {} polls ({:?})",
                F::KIND,
                name,
                self.config.max_stabilization_retries,
                step
            ),
        ))
    }

    /// ARN of the managed resource, describing it when the token has none.
    async fn resolve_arn(&self, desired: &F::Model, token: Token<F>) -> Result<(Token<F>, String)> {
        let known = token
            .observed()
            .and_then(|snapshot| self.family.arn(snapshot))
            .map(str::to_string);
        if let Some(arn) = known {
            return Ok((token, arn));
        }

        let snapshot = self
            .family
            .describe(self.control_plane.as_ref(), desired)
            .await?;
        let arn = self.family.arn(&snapshot).map(str::to_string).ok_or_else(|| {
            ControlPlaneError::NotFound(format!(
                "{} {} has no ARN",
                F::KIND,
                self.family.identifier(desired)
            ))
        })?;
        Ok((token.observe(Some(snapshot)), arn))
    }

    async fn deregister_all(&self, desired: &F::Model) -> Result<usize> {
        let cp = self.control_plane.as_ref();
        let registered = self.family.describe_targets(cp, desired).await?;
        if registered.is_empty() {
            return Ok(0);
        }
        let targets: Vec<Target> = registered.iter().map(RegisteredTarget::target).collect();
        self.family.deregister_targets(cp, desired, &targets).await?;
        Ok(targets.len())
    }
}

fn ids(targets: &[Target]) -> String {
    targets
        .iter()
        .map(|target| target.id.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}
