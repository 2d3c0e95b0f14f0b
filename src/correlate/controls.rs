//! Runtime controls for a correlation pass
//!
//! A pass without controls runs in legacy mode: unlimited concurrency, no
//! timeout, no budget. Supplying controls at all switches every bound on,
//! with each bound independently defaulted.

use crate::range::OffsetRange;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Resource bounds applied to oracle resolutions within one pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolutionBounds {
    /// Resolutions allowed in flight at once (values below 1 act as 1)
    pub max_concurrent: usize,
    /// Wall-clock budget for admitting resolutions, measured from pass start
    pub per_pass_budget_ms: u64,
    /// Time a single resolution may take before it counts as negative
    pub resolve_timeout_ms: u64,
    /// Maximum resolutions admitted per pass
    pub max_resolutions: usize,
}

impl Default for ResolutionBounds {
    fn default() -> Self {
        Self {
            max_concurrent: 6,
            per_pass_budget_ms: 2000,
            resolve_timeout_ms: 1500,
            max_resolutions: 30,
        }
    }
}

impl ResolutionBounds {
    pub fn concurrency(&self) -> usize {
        self.max_concurrent.max(1)
    }

    pub fn per_pass_budget(&self) -> Duration {
        Duration::from_millis(self.per_pass_budget_ms)
    }

    pub fn resolve_timeout(&self) -> Duration {
        Duration::from_millis(self.resolve_timeout_ms)
    }

    /// Whether a pass that started `elapsed` ago and has admitted `admitted`
    /// resolutions may admit another one
    pub fn exhausted(&self, elapsed: Duration, admitted: usize) -> bool {
        admitted >= self.max_resolutions || elapsed > self.per_pass_budget()
    }
}

/// Caller-supplied knobs for one pass
#[derive(Debug, Clone, Default)]
pub struct RuntimeControls {
    /// Candidates overlapping this range are resolved first
    pub visible_range: Option<OffsetRange>,
    pub bounds: ResolutionBounds,
    /// Cooperative cancellation; once cancelled no new resolutions start
    pub cancel: Option<CancellationToken>,
}

impl RuntimeControls {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_visible_range(mut self, range: OffsetRange) -> Self {
        self.visible_range = Some(range);
        self
    }

    pub fn with_bounds(mut self, bounds: ResolutionBounds) -> Self {
        self.bounds = bounds;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancellationToken::is_cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds_defaults_are_independent() {
        let bounds: ResolutionBounds = toml::from_str("max_concurrent = 2").unwrap();
        assert_eq!(bounds.max_concurrent, 2);
        assert_eq!(bounds.per_pass_budget_ms, 2000);
        assert_eq!(bounds.resolve_timeout_ms, 1500);
        assert_eq!(bounds.max_resolutions, 30);
    }

    #[test]
    fn test_exhaustion() {
        let bounds = ResolutionBounds { max_resolutions: 2, ..ResolutionBounds::default() };
        assert!(!bounds.exhausted(Duration::from_millis(10), 1));
        assert!(bounds.exhausted(Duration::from_millis(10), 2));
        assert!(bounds.exhausted(Duration::from_millis(2001), 0));
    }

    #[test]
    fn test_zero_concurrency_still_makes_progress() {
        let bounds = ResolutionBounds { max_concurrent: 0, ..ResolutionBounds::default() };
        assert_eq!(bounds.concurrency(), 1);
    }

    #[test]
    fn test_cancellation_flag() {
        let token = CancellationToken::new();
        let controls = RuntimeControls::new().with_cancellation(token.clone());
        assert!(!controls.is_cancelled());
        token.cancel();
        assert!(controls.is_cancelled());
    }
}
