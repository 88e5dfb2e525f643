//! Renderer configuration.

use core::time::Duration;

use serde::Deserialize;

use crate::reconcile::ReconcilePolicy;

/// Default remaining-time threshold below which the work loop yields.
pub const DEFAULT_YIELD_THRESHOLD: Duration = Duration::from_millis(1);

/// Tunables of a render session.
///
/// Deserializes from `{"yield_threshold_micros": 500, "policy": "keyed"}`; missing fields keep
/// their defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(from = "RawConfig")]
pub struct RendererConfig {
    /// The work loop yields once the deadline reports less time than this.
    pub yield_threshold: Duration,
    /// How children are matched against the committed tree.
    pub policy: ReconcilePolicy,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            yield_threshold: DEFAULT_YIELD_THRESHOLD,
            policy: ReconcilePolicy::default(),
        }
    }
}

impl RendererConfig {
    /// Sets the yield threshold.
    #[must_use]
    pub const fn with_yield_threshold(mut self, threshold: Duration) -> Self {
        self.yield_threshold = threshold;
        self
    }

    /// Sets the reconciliation policy.
    #[must_use]
    pub const fn with_policy(mut self, policy: ReconcilePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Parses a JSON configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if `json` is malformed or names an unknown policy.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[derive(Deserialize)]
#[serde(default)]
struct RawConfig {
    yield_threshold_micros: u64,
    policy: ReconcilePolicy,
}

impl Default for RawConfig {
    fn default() -> Self {
        Self {
            yield_threshold_micros: 1_000,
            policy: ReconcilePolicy::default(),
        }
    }
}

impl From<RawConfig> for RendererConfig {
    fn from(raw: RawConfig) -> Self {
        Self {
            yield_threshold: Duration::from_micros(raw.yield_threshold_micros),
            policy: raw.policy,
        }
    }
}
