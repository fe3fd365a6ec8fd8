//! Role resolution integration tests
//!
//! Tier order, caching and the fail-closed behavior of role-only routes.

use async_trait::async_trait;
use classgate_authz::{
    engine::DenyReason,
    roles::{InMemoryRoleSource, ResolverConfig, RoleTier},
    AuthzError, Decision, IdentityClaims, Outcome, Principal, PrincipalState, RedirectPolicy,
    RoleId, RoleProtection, RoleResolution, RoleResolver, RoleSource,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Counts lookups, optionally failing every one
struct CountingSource {
    inner: InMemoryRoleSource,
    calls: AtomicUsize,
    fail: bool,
}

impl CountingSource {
    fn new(fail: bool) -> Self {
        Self {
            inner: InMemoryRoleSource::new(),
            calls: AtomicUsize::new(0),
            fail,
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RoleSource for CountingSource {
    async fn fetch_role(&self, user_id: &str) -> classgate_authz::Result<Option<RoleId>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(AuthzError::RoleResolution("connection reset".to_string()));
        }
        self.inner.fetch_role(user_id).await
    }
}

fn signed_in(id: &str) -> PrincipalState {
    PrincipalState::Authenticated(Principal::new(id))
}

// ============================================================================
// TIERS
// ============================================================================

#[tokio::test]
async fn test_remote_role_is_cached() {
    let source = Arc::new(CountingSource::new(false));
    source.inner.set_role("u1", "teacher").await;
    let resolver = RoleResolver::new(source.clone());
    let claims = IdentityClaims::new("u1");

    assert_eq!(
        resolver.resolve(&claims).await,
        RoleResolution::Resolved {
            role: "teacher".to_string(),
            tier: RoleTier::Remote,
        }
    );
    assert_eq!(
        resolver.resolve(&claims).await,
        RoleResolution::Resolved {
            role: "teacher".to_string(),
            tier: RoleTier::Cache,
        }
    );
    assert_eq!(source.calls(), 1);

    resolver.invalidate("u1");
    resolver.resolve(&claims).await;
    assert_eq!(source.calls(), 2);
}

#[tokio::test]
async fn test_cached_role_expires() {
    let source = Arc::new(CountingSource::new(false));
    source.inner.set_role("u1", "student").await;
    let resolver = RoleResolver::with_config(
        source.clone(),
        ResolverConfig {
            cache_ttl: Duration::from_millis(20),
            ..Default::default()
        },
    );
    let claims = IdentityClaims::new("u1");

    resolver.resolve(&claims).await;
    tokio::time::sleep(Duration::from_millis(30)).await;

    let resolution = resolver.resolve(&claims).await;
    assert!(matches!(
        resolution,
        RoleResolution::Resolved {
            tier: RoleTier::Remote,
            ..
        }
    ));
    assert_eq!(source.calls(), 2);
}

#[tokio::test]
async fn test_session_role_when_profile_has_none() {
    let source = Arc::new(CountingSource::new(false));
    let resolver = RoleResolver::new(source);
    let claims = IdentityClaims::new("u1").with_session_role("school");

    assert_eq!(
        resolver.resolve(&claims).await,
        RoleResolution::Resolved {
            role: "school".to_string(),
            tier: RoleTier::Session,
        }
    );
}

// ============================================================================
// FAIL CLOSED
// ============================================================================

#[tokio::test]
async fn test_remote_error_denies_even_with_session_role() {
    let resolver = RoleResolver::new(Arc::new(CountingSource::new(true)));
    let claims = IdentityClaims::new("u1").with_session_role("student");

    let resolution = resolver.resolve(&claims).await;
    assert!(matches!(resolution, RoleResolution::Unresolved { .. }));
    assert_eq!(resolution.role(), None);

    let check = RoleProtection::default()
        .check(&resolver, &signed_in("u1"), &claims)
        .await;
    assert_eq!(check.decision.deny_reason(), Some(DenyReason::RoleUnresolved));
    assert!(!check.decision.is_granted());
}

#[tokio::test]
async fn test_unknown_role_is_rejected() {
    let source = Arc::new(CountingSource::new(false));
    source.inner.set_role("u1", "superuser").await;
    let resolver = RoleResolver::new(source);

    let resolution = resolver.resolve(&IdentityClaims::new("u1")).await;
    assert!(matches!(resolution, RoleResolution::Unresolved { .. }));
}

#[tokio::test]
async fn test_unresolved_role_redirects_home() {
    let resolver = RoleResolver::new(Arc::new(CountingSource::new(true)));
    let claims = IdentityClaims::new("u1");
    let policy = RedirectPolicy::default().with_fallback("access-denied");

    let check = RoleProtection::default()
        .check(&resolver, &signed_in("u1"), &claims)
        .await;

    assert_eq!(check.outcome(&policy, "/dashboard").location(), Some("/"));
}

// ============================================================================
// ROLE PROTECTION
// ============================================================================

#[tokio::test]
async fn test_disallowed_role_goes_to_its_home() {
    let resolver = RoleResolver::new(Arc::new(CountingSource::new(true)));
    let claims = IdentityClaims::new("u1").with_metadata_role("school");
    let protection = RoleProtection::new(["teacher"]);

    let check = protection.check(&resolver, &signed_in("u1"), &claims).await;
    assert!(check.decision.is_denied());
    assert_eq!(check.role.as_deref(), Some("school"));
    assert_eq!(
        check.outcome(&RedirectPolicy::default(), "/dashboard").location(),
        Some("/school")
    );
}

#[tokio::test]
async fn test_pending_and_anonymous_skip_lookup() {
    let source = Arc::new(CountingSource::new(false));
    let resolver = RoleResolver::new(source.clone());
    let claims = IdentityClaims::new("u1");
    let protection = RoleProtection::default();

    let pending = protection
        .check(&resolver, &PrincipalState::Pending, &claims)
        .await;
    assert_eq!(pending.decision, Decision::Pending);
    assert_eq!(
        pending.outcome(&RedirectPolicy::default(), "/students"),
        Outcome::Loading
    );

    let anonymous = protection
        .check(&resolver, &PrincipalState::Anonymous, &claims)
        .await;
    assert_eq!(
        anonymous.outcome(&RedirectPolicy::default(), "/students").location(),
        Some("/login")
    );

    assert_eq!(source.calls(), 0);
}
