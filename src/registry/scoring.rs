//! Node Scoring System
//!
//! Pure transition rules for node records. A confirmed check rewards the
//! node and clears its failure streak; a failed check penalizes it by an
//! amount that grows with the streak. The backoff policy stretches the
//! re-probe interval for nodes that keep failing.

use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::config::RegistryConfig;
use crate::types::{NodeRecord, PeerNode};

/// Score given to a node on its first successful check
pub const INITIAL_SCORE: i32 = 1;

/// Confirm/fail transition rules
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoringPolicy {
    /// Score increase for a successful check
    pub success_reward: i32,

    /// Score decrease per consecutive failure
    pub failure_penalty: i32,

    /// Maximum score
    pub max_score: i32,

    /// Minimum score
    pub min_score: i32,

    /// Failure count above which a node is left out of bootstrap sets
    pub dead_threshold: u32,
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self::from_config(&RegistryConfig::default())
    }
}

impl ScoringPolicy {
    pub fn from_config(config: &RegistryConfig) -> Self {
        Self {
            success_reward: config.success_reward,
            failure_penalty: config.failure_penalty,
            max_score: config.max_score,
            min_score: config.min_score,
            dead_threshold: config.dead_threshold,
        }
    }

    /// Record for a node confirmed for the first time
    pub fn discovered(&self, node: &PeerNode, now: DateTime<Utc>) -> NodeRecord {
        NodeRecord {
            id: node.id,
            endpoint: node.endpoint,
            score: self.clamp_score(INITIAL_SCORE),
            check_failure_count: 0,
            first_response: Some(now),
            last_response: Some(now),
            last_check: Some(now),
        }
    }

    /// Apply a successful check to a known node
    pub fn on_success(&self, record: &mut NodeRecord, node: &PeerNode, now: DateTime<Utc>) {
        record.endpoint = node.endpoint;
        record.first_response = Some(record.first_response.map_or(now, |first| first.min(now)));
        record.last_response = Some(now);
        record.last_check = Some(now);
        record.check_failure_count = 0;
        record.score = self.clamp_score(record.score.saturating_add(self.success_reward));
    }

    /// Apply a failed check to a known node
    ///
    /// `last_check` never falls behind `last_response`, even when `now`
    /// comes from a clock that stepped back.
    pub fn on_failure(&self, record: &mut NodeRecord, now: DateTime<Utc>) {
        record.last_check = Some(record.last_response.map_or(now, |last| last.max(now)));
        record.check_failure_count = record.check_failure_count.saturating_add(1);
        record.score = self.clamp_score(record.score.saturating_sub(self.penalty(record.check_failure_count)));
    }

    /// Penalty for the given consecutive failure count
    pub fn penalty(&self, failures: u32) -> i32 {
        let failures = i32::try_from(failures).unwrap_or(i32::MAX);
        self.failure_penalty.saturating_mul(failures)
    }

    /// Clamp score to valid range
    pub fn clamp_score(&self, score: i32) -> i32 {
        score.max(self.min_score).min(self.max_score)
    }
}

/// Exponential re-probe backoff
///
/// A node becomes due `base * 2^min(failures, cap_exponent)` after its last
/// check. Never-checked nodes are always due.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub cap_exponent: u32,
}

impl BackoffPolicy {
    pub fn new(base: Duration, cap_exponent: u32) -> Self {
        Self { base, cap_exponent }
    }

    pub fn from_config(config: &RegistryConfig) -> Self {
        Self::new(config.backoff_base(), config.backoff_cap_exponent)
    }

    /// Wait required after a check with the given failure streak
    pub fn delay(&self, failures: u32) -> Duration {
        let exponent = failures.min(self.cap_exponent).min(31);
        self.base.saturating_mul(1u32 << exponent)
    }

    /// Whether the record may be probed at `now`
    pub fn is_due(&self, record: &NodeRecord, now: DateTime<Utc>) -> bool {
        let Some(last_check) = record.last_check else {
            return true;
        };

        // A check stamped in the future is never due early
        match (now - last_check).to_std() {
            Ok(elapsed) => elapsed >= self.delay(record.check_failure_count),
            Err(_) => false,
        }
    }
}
