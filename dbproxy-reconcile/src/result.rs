//! Outcome of a single invocation.

use std::time::Duration;

use crate::error::ErrorCode;

/// Run status reported to the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationStatus {
    InProgress,
    Success,
    Failed,
}

/// Result of one invocation of a reconciler.
///
/// `token` is present iff the run is still in progress. `error_code` is
/// present iff the run failed. `reinvoke_delay` is zero unless a polling step
/// asked the scheduler to wait.
#[derive(Debug, Clone, PartialEq)]
pub struct RunResult<M, T> {
    pub status: OperationStatus,
    pub model: Option<M>,
    pub token: Option<T>,
    pub error_code: Option<ErrorCode>,
    pub message: Option<String>,
    pub reinvoke_delay: Duration,
}

impl<M, T> RunResult<M, T> {
    pub fn in_progress(model: M, token: T, reinvoke_delay: Duration) -> Self {
        Self {
            status: OperationStatus::InProgress,
            model: Some(model),
            token: Some(token),
            error_code: None,
            message: None,
            reinvoke_delay,
        }
    }

    pub fn success(model: Option<M>) -> Self {
        Self {
            status: OperationStatus::Success,
            model,
            token: None,
            error_code: None,
            message: None,
            reinvoke_delay: Duration::ZERO,
        }
    }

    pub fn failed(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            status: OperationStatus::Failed,
            model: None,
            token: None,
            error_code: Some(code),
            message: Some(message.into()),
            reinvoke_delay: Duration::ZERO,
        }
    }

    pub fn is_in_progress(&self) -> bool {
        self.status == OperationStatus::InProgress
    }

    /// Convert the token, e.g. into its encoded form.
    pub fn try_map_token<U, E>(
        self,
        f: impl FnOnce(T) -> Result<U, E>,
    ) -> Result<RunResult<M, U>, E> {
        let token = self.token.map(f).transpose()?;
        Ok(RunResult {
            status: self.status,
            model: self.model,
            token,
            error_code: self.error_code,
            message: self.message,
            reinvoke_delay: self.reinvoke_delay,
        })
    }
}
