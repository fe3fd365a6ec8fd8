//! Two-tier primary role resolution for role-only route protection
//!
//! Resolution order:
//!
//! 1. Role claim carried in the session metadata
//! 2. Cached result of a previous remote lookup (within TTL)
//! 3. Authoritative remote profile lookup ([`RoleSource`])
//! 4. Role claim carried by the session itself, when the remote source
//!    answered but had no role
//!
//! Resolution fails closed. A remote error, a missing role at every tier, or
//! a role outside the known set all resolve to [`RoleResolution::Unresolved`],
//! which denies access. No default role is ever substituted.

use crate::engine::{Decision, DenyReason};
use crate::error::Result;
use crate::redirect::{Outcome, Redirect, RedirectPolicy};
use crate::types::{PrincipalState, RoleId};

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, error, warn};

/// Remote profile store holding each user's role
#[async_trait]
pub trait RoleSource: Send + Sync {
    /// Role recorded for `user_id`, `None` when the profile has no role
    async fn fetch_role(&self, user_id: &str) -> Result<Option<RoleId>>;
}

/// In-memory role source
#[derive(Default)]
pub struct InMemoryRoleSource {
    roles: Arc<RwLock<HashMap<String, RoleId>>>,
}

impl InMemoryRoleSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_role(&self, user_id: impl Into<String>, role: impl Into<String>) {
        self.roles.write().await.insert(user_id.into(), role.into());
    }

    pub async fn remove(&self, user_id: &str) {
        self.roles.write().await.remove(user_id);
    }
}

#[async_trait]
impl RoleSource for InMemoryRoleSource {
    async fn fetch_role(&self, user_id: &str) -> Result<Option<RoleId>> {
        Ok(self.roles.read().await.get(user_id).cloned())
    }
}

/// Role claims available locally for a signed-in user
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityClaims {
    pub user_id: String,

    /// Role stored in the user's metadata
    #[serde(default)]
    pub metadata_role: Option<RoleId>,

    /// Role carried by the current session
    #[serde(default)]
    pub session_role: Option<RoleId>,
}

impl IdentityClaims {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            ..Default::default()
        }
    }

    pub fn with_metadata_role(mut self, role: impl Into<String>) -> Self {
        self.metadata_role = Some(role.into());
        self
    }

    pub fn with_session_role(mut self, role: impl Into<String>) -> Self {
        self.session_role = Some(role.into());
        self
    }
}

/// Tier that produced a resolved role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoleTier {
    Metadata,
    Cache,
    Remote,
    Session,
}

/// Result of role resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoleResolution {
    Resolved { role: RoleId, tier: RoleTier },
    Unresolved { reason: String },
}

impl RoleResolution {
    pub fn role(&self) -> Option<&str> {
        match self {
            RoleResolution::Resolved { role, .. } => Some(role.as_str()),
            RoleResolution::Unresolved { .. } => None,
        }
    }
}

/// Resolver configuration
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Validity window of cached remote lookups
    pub cache_ttl: Duration,

    /// Roles accepted from any tier; `None` accepts any non-empty role
    pub known_roles: Option<BTreeSet<RoleId>>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        let known_roles = ["admin", "teacher", "student", "school"]
            .into_iter()
            .map(String::from)
            .collect();

        Self {
            cache_ttl: Duration::from_secs(30),
            known_roles: Some(known_roles),
        }
    }
}

#[derive(Debug, Clone)]
struct CachedRole {
    role: RoleId,
    cached_at: Instant,
}

/// Primary role resolver with a short-TTL cache in front of the remote source
pub struct RoleResolver {
    source: Arc<dyn RoleSource>,
    cache: DashMap<String, CachedRole>,
    config: ResolverConfig,
}

impl RoleResolver {
    pub fn new(source: Arc<dyn RoleSource>) -> Self {
        Self::with_config(source, ResolverConfig::default())
    }

    pub fn with_config(source: Arc<dyn RoleSource>, config: ResolverConfig) -> Self {
        Self {
            source,
            cache: DashMap::new(),
            config,
        }
    }

    /// Resolve the primary role of `claims.user_id`
    pub async fn resolve(&self, claims: &IdentityClaims) -> RoleResolution {
        if let Some(role) = self.accept(claims.metadata_role.as_deref()) {
            debug!(user = %claims.user_id, role = %role, "Role resolved from metadata");
            return RoleResolution::Resolved {
                role,
                tier: RoleTier::Metadata,
            };
        }

        if let Some(role) = self.cached(&claims.user_id) {
            debug!(user = %claims.user_id, role = %role, "Role resolved from cache");
            return RoleResolution::Resolved {
                role,
                tier: RoleTier::Cache,
            };
        }

        match self.source.fetch_role(&claims.user_id).await {
            Ok(remote) => {
                if let Some(role) = self.accept(remote.as_deref()) {
                    self.cache.insert(
                        claims.user_id.clone(),
                        CachedRole {
                            role: role.clone(),
                            cached_at: Instant::now(),
                        },
                    );
                    debug!(user = %claims.user_id, role = %role, "Role resolved from profile");
                    return RoleResolution::Resolved {
                        role,
                        tier: RoleTier::Remote,
                    };
                }
            }
            Err(e) => {
                error!(user = %claims.user_id, error = %e, "Role lookup failed, denying access");
                return RoleResolution::Unresolved {
                    reason: format!("role lookup failed: {}", e),
                };
            }
        }

        if let Some(role) = self.accept(claims.session_role.as_deref()) {
            debug!(user = %claims.user_id, role = %role, "Role resolved from session");
            return RoleResolution::Resolved {
                role,
                tier: RoleTier::Session,
            };
        }

        warn!(user = %claims.user_id, "No role found at any tier, denying access");
        RoleResolution::Unresolved {
            reason: "no role found".to_string(),
        }
    }

    /// Drop the cached remote role of `user_id`
    pub fn invalidate(&self, user_id: &str) {
        self.cache.remove(user_id);
    }

    pub fn clear(&self) {
        self.cache.clear();
    }

    fn cached(&self, user_id: &str) -> Option<RoleId> {
        let entry = self.cache.get(user_id)?;
        if entry.cached_at.elapsed() >= self.config.cache_ttl {
            drop(entry);
            self.cache.remove(user_id);
            return None;
        }
        Some(entry.role.clone())
    }

    /// Accept a claimed role only when it is non-empty and known
    fn accept(&self, role: Option<&str>) -> Option<RoleId> {
        let role = role.map(str::trim).filter(|r| !r.is_empty())?;

        match &self.config.known_roles {
            Some(known) if !known.contains(role) => {
                warn!(role, "Ignoring unknown role claim");
                None
            }
            _ => Some(role.to_string()),
        }
    }
}

/// Role-only protection: the resolved primary role must be one of
/// `allowed_roles`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleProtection {
    pub allowed_roles: Vec<RoleId>,
}

impl Default for RoleProtection {
    fn default() -> Self {
        Self::new(["teacher", "student"])
    }
}

/// Decision of a role-only check plus the role it was made for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleCheck {
    pub decision: Decision,
    pub role: Option<RoleId>,
}

impl RoleProtection {
    pub fn new<I, S>(allowed_roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed_roles: allowed_roles.into_iter().map(Into::into).collect(),
        }
    }

    /// Decide from an already computed resolution
    pub fn decide(&self, resolution: &RoleResolution) -> RoleCheck {
        match resolution {
            RoleResolution::Unresolved { .. } => RoleCheck {
                decision: Decision::Denied {
                    reason: DenyReason::RoleUnresolved,
                    missing_roles: Vec::new(),
                    missing_permissions: Vec::new(),
                },
                role: None,
            },
            RoleResolution::Resolved { role, .. } => {
                let decision = if self.allowed_roles.iter().any(|allowed| allowed == role) {
                    Decision::Granted
                } else {
                    warn!(role = %role, allowed = ?self.allowed_roles, "Role not allowed on route");
                    Decision::insufficient(self.allowed_roles.clone(), Vec::new())
                };
                RoleCheck {
                    decision,
                    role: Some(role.clone()),
                }
            }
        }
    }

    /// Check `state`, resolving the role through `resolver` when signed in
    pub async fn check(
        &self,
        resolver: &RoleResolver,
        state: &PrincipalState,
        claims: &IdentityClaims,
    ) -> RoleCheck {
        match state {
            PrincipalState::Pending => RoleCheck {
                decision: Decision::Pending,
                role: None,
            },
            PrincipalState::Anonymous => RoleCheck {
                decision: Decision::Unauthenticated,
                role: None,
            },
            PrincipalState::Authenticated(_) => self.decide(&resolver.resolve(claims).await),
        }
    }
}

impl RoleCheck {
    /// Denied principals go to their role home rather than an error page
    pub fn outcome(&self, policy: &RedirectPolicy, from: &str) -> Outcome {
        match (&self.decision, &self.role) {
            (Decision::Denied { reason: DenyReason::Insufficient, .. }, Some(role)) => {
                Outcome::Redirect(Redirect {
                    to: policy.home_for_role(role).to_string(),
                    from: from.to_string(),
                    reason: Some(DenyReason::Insufficient),
                    missing_roles: Vec::new(),
                    missing_permissions: Vec::new(),
                })
            }
            (decision, _) => policy.resolve(decision, None, from),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AuthzError;

    struct FailingSource;

    #[async_trait]
    impl RoleSource for FailingSource {
        async fn fetch_role(&self, _user_id: &str) -> Result<Option<RoleId>> {
            Err(AuthzError::RoleResolution("permission denied for table profiles".to_string()))
        }
    }

    #[tokio::test]
    async fn test_metadata_tier_first() {
        let resolver = RoleResolver::new(Arc::new(FailingSource));
        let claims = IdentityClaims::new("u1").with_metadata_role("teacher");

        let resolution = resolver.resolve(&claims).await;
        assert_eq!(
            resolution,
            RoleResolution::Resolved {
                role: "teacher".to_string(),
                tier: RoleTier::Metadata
            }
        );
    }

    #[tokio::test]
    async fn test_remote_then_cache() {
        let source = Arc::new(InMemoryRoleSource::new());
        source.set_role("u1", "student").await;
        let resolver = RoleResolver::new(source.clone());
        let claims = IdentityClaims::new("u1");

        let first = resolver.resolve(&claims).await;
        assert!(matches!(first, RoleResolution::Resolved { tier: RoleTier::Remote, .. }));

        source.remove("u1").await;
        let second = resolver.resolve(&claims).await;
        assert!(matches!(second, RoleResolution::Resolved { tier: RoleTier::Cache, .. }));

        resolver.invalidate("u1");
        let third = resolver.resolve(&claims).await;
        assert!(matches!(third, RoleResolution::Unresolved { .. }));
    }

    #[tokio::test]
    async fn test_remote_error_fails_closed() {
        let resolver = RoleResolver::new(Arc::new(FailingSource));
        let claims = IdentityClaims::new("u1").with_session_role("student");

        let resolution = resolver.resolve(&claims).await;
        assert!(matches!(resolution, RoleResolution::Unresolved { .. }));
    }

    #[tokio::test]
    async fn test_session_tier_when_profile_empty() {
        let resolver = RoleResolver::new(Arc::new(InMemoryRoleSource::new()));
        let claims = IdentityClaims::new("u1").with_session_role("school");

        let resolution = resolver.resolve(&claims).await;
        assert_eq!(resolution.role(), Some("school"));
    }

    #[tokio::test]
    async fn test_unknown_role_rejected() {
        let resolver = RoleResolver::new(Arc::new(InMemoryRoleSource::new()));
        let claims = IdentityClaims::new("u1").with_metadata_role("superuser");

        assert!(resolver.resolve(&claims).await.role().is_none());
    }

    #[test]
    fn test_protection_decide() {
        let protection = RoleProtection::new(["teacher"]);

        let granted = protection.decide(&RoleResolution::Resolved {
            role: "teacher".to_string(),
            tier: RoleTier::Metadata,
        });
        assert!(granted.decision.is_granted());

        let denied = protection.decide(&RoleResolution::Resolved {
            role: "student".to_string(),
            tier: RoleTier::Remote,
        });
        assert!(denied.decision.is_denied());
        assert_eq!(
            denied.outcome(&RedirectPolicy::default(), "/dashboard").location(),
            Some("/students")
        );

        let unresolved = protection.decide(&RoleResolution::Unresolved {
            reason: "no role found".to_string(),
        });
        assert_eq!(unresolved.decision.deny_reason(), Some(DenyReason::RoleUnresolved));
        assert_eq!(
            unresolved.outcome(&RedirectPolicy::default(), "/dashboard").location(),
            Some("/")
        );
    }
}
