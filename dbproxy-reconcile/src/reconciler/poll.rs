//! Status classification for stabilization polls.

/// Terminal status sets of a resource family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusSets {
    pub success: &'static [&'static str],
    pub failure: &'static [&'static str],
}

/// Statuses shared by proxies and proxy endpoints.
pub const PROXY_STATUSES: StatusSets = StatusSets {
    success: &["available"],
    failure: &["incompatible-network", "insufficient-resource-limits"],
};

/// Where a polled status sits relative to the terminal sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stability {
    Ready,
    Failed,
    Transitional,
}

impl StatusSets {
    /// Anything outside both terminal sets is transitional.
    pub fn classify(&self, status: &str) -> Stability {
        if self.success.iter().any(|s| *s == status) {
            Stability::Ready
        } else if self.failure.iter().any(|s| *s == status) {
            Stability::Failed
        } else {
            Stability::Transitional
        }
    }
}
