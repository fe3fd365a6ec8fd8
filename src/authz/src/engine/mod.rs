//! Role/permission gate
//!
//! Decides whether a principal may access a protected view, with an optional
//! per-gate cache of individual role and permission checks.

pub mod cache;
pub mod decision;
pub mod metrics;

pub use cache::{
    BoundCache, CacheLookup, CacheStats, CheckCache, CheckCacheEntry, CheckKey, DEFAULT_CHECK_TTL,
};
pub use decision::{Decision, DenyReason};
pub use metrics::{GateMetrics, MetricsCollector};

use crate::catalog::RoleCatalog;
use crate::requirement::AccessRequirement;
use crate::types::{CheckKind, Principal, PrincipalState};

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Gate configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GateConfig {
    /// Cache individual role/permission checks
    pub cache_checks: bool,

    /// Validity window of a cached check
    #[serde(with = "duration_ms", rename = "cacheTimeoutMs")]
    pub cache_timeout: Duration,

    /// Role to permission grants used by permission checks
    pub catalog: RoleCatalog,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            cache_checks: true,
            cache_timeout: DEFAULT_CHECK_TTL,
            catalog: RoleCatalog::education_defaults(),
        }
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

/// Role/permission gate
///
/// `evaluate` is synchronous and performs no I/O. The only state the gate
/// keeps is its check cache, which belongs to this instance alone.
///
/// ```text
/// Pending ──────────────────────────────► Pending
/// Anonymous ────────────────────────────► Unauthenticated
/// Authenticated ─► denyRoles ─► required roles/permissions ─► Granted | Denied
///                     │                       │
///                  [check cache] ◄────────────┘
/// ```
pub struct AccessGate {
    config: GateConfig,

    /// `None` when check caching is disabled
    cache: Option<CheckCache>,

    metrics: Option<MetricsCollector>,
}

impl AccessGate {
    /// Create a gate with the given configuration
    pub fn new(config: GateConfig) -> Self {
        let cache = if config.cache_checks {
            Some(CheckCache::new(config.cache_timeout))
        } else {
            None
        };

        debug!(
            cache_checks = config.cache_checks,
            cache_timeout_ms = config.cache_timeout.as_millis() as u64,
            "AccessGate initialized"
        );

        Self {
            config,
            cache,
            metrics: None,
        }
    }

    /// Record every evaluation into `metrics`
    pub fn with_metrics(mut self, metrics: MetricsCollector) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    /// Evaluate `requirement` for the current principal state
    pub fn evaluate(&self, state: &PrincipalState, requirement: &AccessRequirement) -> Decision {
        let start = Instant::now();
        let decision = self.decide(state, requirement);

        if let Some(metrics) = &self.metrics {
            metrics.record_decision(&decision, start.elapsed());
        }

        debug!(
            principal = state.principal().map(|p| p.id.as_str()).unwrap_or("-"),
            decision = decision.label(),
            "Gate evaluated"
        );

        decision
    }

    /// Whether `principal` holds `role`, through the check cache if enabled
    pub fn has_role(&self, principal: &Principal, role: &str) -> bool {
        let mut cache = self.bind(principal);
        self.check(&mut cache, principal, CheckKind::Role, role)
    }

    /// Whether `principal` holds `permission`, through the check cache if enabled
    pub fn has_permission(&self, principal: &Principal, permission: &str) -> bool {
        let mut cache = self.bind(principal);
        self.check(&mut cache, principal, CheckKind::Permission, permission)
    }

    /// Drop all cached checks, e.g. after sign-out or a role change
    pub fn invalidate_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.clear();
            info!("Check cache invalidated");
        }
    }

    /// Check cache statistics, if caching is enabled
    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.cache.as_ref().map(|cache| cache.stats())
    }

    /// Metrics snapshot, if a collector is attached
    pub fn metrics(&self) -> Option<GateMetrics> {
        self.metrics.as_ref().map(|metrics| metrics.snapshot())
    }

    fn decide(&self, state: &PrincipalState, requirement: &AccessRequirement) -> Decision {
        let principal = match state {
            PrincipalState::Pending => return Decision::Pending,
            PrincipalState::Anonymous => return Decision::Unauthenticated,
            PrincipalState::Authenticated(principal) => principal,
        };

        // Held until the decision is made so concurrent evaluations for other
        // principals cannot rebind the cache in between
        let mut cache = self.bind(principal);

        if let Some(role) = requirement
            .deny_roles()
            .iter()
            .find(|role| self.check(&mut cache, principal, CheckKind::Role, role))
        {
            warn!(principal = %principal.id, role = %role, "Access denied by deny-list role");
            return Decision::deny_listed();
        }

        let require_all = requirement.require_all();
        let has_required_roles = self.satisfies(
            &mut cache,
            principal,
            CheckKind::Role,
            requirement.required_roles(),
            require_all,
        );
        let has_required_permissions = self.satisfies(
            &mut cache,
            principal,
            CheckKind::Permission,
            requirement.required_permissions(),
            require_all,
        );

        if has_required_roles && has_required_permissions {
            return Decision::Granted;
        }

        let missing_roles = if has_required_roles {
            Vec::new()
        } else {
            self.missing(&mut cache, principal, CheckKind::Role, requirement.required_roles())
        };
        let missing_permissions = if has_required_permissions {
            Vec::new()
        } else {
            self.missing(
                &mut cache,
                principal,
                CheckKind::Permission,
                requirement.required_permissions(),
            )
        };

        debug!(
            principal = %principal.id,
            ?missing_roles,
            ?missing_permissions,
            "Access denied, requirement not met"
        );

        Decision::insufficient(missing_roles, missing_permissions)
    }

    /// Empty lists are vacuously satisfied
    fn satisfies(
        &self,
        cache: &mut Option<BoundCache<'_>>,
        principal: &Principal,
        kind: CheckKind,
        required: &[String],
        require_all: bool,
    ) -> bool {
        if required.is_empty() {
            return true;
        }

        if require_all {
            required
                .iter()
                .all(|value| self.check(cache, principal, kind, value))
        } else {
            required
                .iter()
                .any(|value| self.check(cache, principal, kind, value))
        }
    }

    fn missing(
        &self,
        cache: &mut Option<BoundCache<'_>>,
        principal: &Principal,
        kind: CheckKind,
        required: &[String],
    ) -> Vec<String> {
        required
            .iter()
            .filter(|value| !self.check(cache, principal, kind, value))
            .cloned()
            .collect()
    }

    fn bind(&self, principal: &Principal) -> Option<BoundCache<'_>> {
        self.cache.as_ref().map(|cache| cache.bind(&principal.id))
    }

    fn check(
        &self,
        cache: &mut Option<BoundCache<'_>>,
        principal: &Principal,
        kind: CheckKind,
        value: &str,
    ) -> bool {
        let Some(cache) = cache else {
            return self.compute(principal, kind, value);
        };

        let key = CheckKey::new(kind, value);
        let now = Instant::now();
        let lookup = cache.get_at(&key, now);

        if let Some(metrics) = &self.metrics {
            match lookup {
                CacheLookup::Hit(_) => metrics.record_cache_hit(),
                CacheLookup::Miss => metrics.record_cache_miss(),
                CacheLookup::Expired => {
                    metrics.record_cache_expiration();
                    metrics.record_cache_miss();
                }
            }
        }

        if let CacheLookup::Hit(result) = lookup {
            return result;
        }

        let result = self.compute(principal, kind, value);
        cache.put_at(key, result, now);
        result
    }

    fn compute(&self, principal: &Principal, kind: CheckKind, value: &str) -> bool {
        match kind {
            CheckKind::Role => principal.has_role(value),
            CheckKind::Permission => self.config.catalog.principal_has(principal, value),
        }
    }
}

impl Default for AccessGate {
    fn default() -> Self {
        Self::new(GateConfig::default())
    }
}
