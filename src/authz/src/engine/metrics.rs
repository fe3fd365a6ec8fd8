//! Gate metrics collection

use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;

use super::decision::{Decision, DenyReason};

/// Gate counters
#[derive(Debug, Clone, Default)]
pub struct GateMetrics {
    /// Total number of evaluations
    pub evaluations: u64,

    pub granted: u64,

    /// Denials caused by a deny-list role
    pub denied_by_deny_list: u64,

    /// Denials caused by missing roles or permissions
    pub denied_insufficient: u64,

    /// Denials caused by an unresolved role
    pub denied_unresolved: u64,

    pub unauthenticated: u64,

    pub pending: u64,

    /// Check cache hits
    pub cache_hits: u64,

    /// Check cache misses
    pub cache_misses: u64,

    /// Cached checks dropped for being past the TTL
    pub cache_expirations: u64,

    /// Mean evaluation time
    pub avg_latency_us: f64,
}

impl GateMetrics {
    pub fn denied(&self) -> u64 {
        self.denied_by_deny_list + self.denied_insufficient + self.denied_unresolved
    }

    /// Share of decided evaluations (granted or denied) that were granted
    pub fn grant_rate(&self) -> f64 {
        let total = self.granted + self.denied();
        if total == 0 {
            0.0
        } else {
            self.granted as f64 / total as f64
        }
    }

    /// Calculate cache hit rate
    pub fn cache_hit_rate(&self) -> f64 {
        let total = self.cache_hits + self.cache_misses;
        if total == 0 {
            0.0
        } else {
            self.cache_hits as f64 / total as f64
        }
    }

    /// Render counters in Prometheus text exposition format
    pub fn to_prometheus(&self) -> String {
        format!(
            "# HELP classgate_evaluations_total Gate evaluations by decision\n\
             # TYPE classgate_evaluations_total counter\n\
             classgate_evaluations_total{{decision=\"granted\"}} {}\n\
             classgate_evaluations_total{{decision=\"denied\",reason=\"denyRoles\"}} {}\n\
             classgate_evaluations_total{{decision=\"denied\",reason=\"insufficient\"}} {}\n\
             classgate_evaluations_total{{decision=\"denied\",reason=\"roleUnresolved\"}} {}\n\
             classgate_evaluations_total{{decision=\"unauthenticated\"}} {}\n\
             classgate_evaluations_total{{decision=\"pending\"}} {}\n\
             \n\
             # HELP classgate_check_cache_total Check cache lookups\n\
             # TYPE classgate_check_cache_total counter\n\
             classgate_check_cache_total{{result=\"hit\"}} {}\n\
             classgate_check_cache_total{{result=\"miss\"}} {}\n\
             \n\
             # HELP classgate_check_cache_expirations_total Cached checks dropped past the TTL\n\
             # TYPE classgate_check_cache_expirations_total counter\n\
             classgate_check_cache_expirations_total {}\n\
             \n\
             # HELP classgate_evaluation_latency_us_avg Mean evaluation time in microseconds\n\
             # TYPE classgate_evaluation_latency_us_avg gauge\n\
             classgate_evaluation_latency_us_avg {}\n",
            self.granted,
            self.denied_by_deny_list,
            self.denied_insufficient,
            self.denied_unresolved,
            self.unauthenticated,
            self.pending,
            self.cache_hits,
            self.cache_misses,
            self.cache_expirations,
            self.avg_latency_us,
        )
    }
}

/// Metrics collector shared by a gate and its hosts
#[derive(Clone, Default)]
pub struct MetricsCollector {
    metrics: Arc<RwLock<GateMetrics>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one evaluation and its duration
    pub fn record_decision(&self, decision: &Decision, latency: Duration) {
        let mut metrics = self.metrics.write();
        metrics.evaluations += 1;

        match decision {
            Decision::Granted => metrics.granted += 1,
            Decision::Denied { reason, .. } => match reason {
                DenyReason::DenyRoles => metrics.denied_by_deny_list += 1,
                DenyReason::Insufficient => metrics.denied_insufficient += 1,
                DenyReason::RoleUnresolved => metrics.denied_unresolved += 1,
            },
            Decision::Unauthenticated => metrics.unauthenticated += 1,
            Decision::Pending => metrics.pending += 1,
        }

        let latency_us = latency.as_secs_f64() * 1_000_000.0;
        let n = metrics.evaluations as f64;
        metrics.avg_latency_us += (latency_us - metrics.avg_latency_us) / n;
    }

    pub fn record_cache_hit(&self) {
        self.metrics.write().cache_hits += 1;
    }

    pub fn record_cache_miss(&self) {
        self.metrics.write().cache_misses += 1;
    }

    pub fn record_cache_expiration(&self) {
        self.metrics.write().cache_expirations += 1;
    }

    /// Snapshot of the current counters
    pub fn snapshot(&self) -> GateMetrics {
        self.metrics.read().clone()
    }

    pub fn reset(&self) {
        *self.metrics.write() = GateMetrics::default();
    }
}
