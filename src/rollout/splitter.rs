//! Deterministic canary split.
//!
//! # Decision Order
//! 1. No identifier (or an empty one) → not in canary
//! 2. Identifier in the allow-list → canary
//! 3. `fnv1a_32(identifier) <= split_threshold` → canary
//!
//! The threshold is precomputed once, so a decision is one set lookup and at
//! most one hash. The splitter holds no mutable state and is shared across
//! request handlers behind an `Arc` without locking.

use std::collections::HashSet;

use axum::http::HeaderMap;

use crate::config::RolloutConfig;
use crate::rollout::cookie::rollout_identifier;
use crate::rollout::hash::fnv1a_32;

/// Largest value the rollout hash can produce, as a float for comparison.
const MAX_HASH_VALUE: f64 = u32::MAX as f64;

/// Which backend version a request is sent to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RolloutGroup {
    Active,
    Canary,
}

impl RolloutGroup {
    pub fn as_str(&self) -> &'static str {
        match self {
            RolloutGroup::Active => "active",
            RolloutGroup::Canary => "canary",
        }
    }
}

/// Splits clients between the active and canary backends.
#[derive(Debug, Clone)]
pub struct RolloutSplitter {
    percentage: u8,
    split_threshold: f64,
    allowlist: HashSet<String>,
}

impl RolloutSplitter {
    /// Build a splitter sending `percentage`% of identifiers to canary.
    ///
    /// Percentages above 100 are clamped to 100.
    pub fn new<I, S>(percentage: u8, allowlist: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let percentage = percentage.min(100);
        let split_threshold = MAX_HASH_VALUE * (f64::from(percentage) / 100.0);

        Self {
            percentage,
            split_threshold,
            allowlist: allowlist.into_iter().map(Into::into).collect(),
        }
    }

    pub fn from_config(config: &RolloutConfig) -> Self {
        Self::new(config.percentage, config.allowlist.iter().cloned())
    }

    /// Whether `identifier` belongs to the canary group.
    pub fn decide(&self, identifier: Option<&str>) -> bool {
        let Some(identifier) = identifier.filter(|id| !id.is_empty()) else {
            return false;
        };

        if self.allowlist.contains(identifier) {
            return true;
        }

        // A hash of exactly 0 would pass a 0.0 threshold; 0% admits nobody.
        self.percentage > 0 && f64::from(fnv1a_32(identifier.as_bytes())) <= self.split_threshold
    }

    /// Decide from the rollout cookie in `headers`.
    pub fn group_for(&self, headers: &HeaderMap) -> RolloutGroup {
        if self.decide(rollout_identifier(headers)) {
            RolloutGroup::Canary
        } else {
            RolloutGroup::Active
        }
    }

    pub fn percentage(&self) -> u8 {
        self.percentage
    }

    pub fn split_threshold(&self) -> f64 {
        self.split_threshold
    }

    pub fn allowlist(&self) -> &HashSet<String> {
        &self.allowlist
    }
}
