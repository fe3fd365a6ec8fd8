//! Route guard: gate + identity subscription + redirect policy

use crate::engine::{AccessGate, Decision};
use crate::identity::IdentityProvider;
use crate::redirect::{Outcome, RedirectPolicy};
use crate::requirement::AccessRequirement;
use crate::types::PrincipalState;

use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

/// Decision for one route check and what to do with it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardResult {
    pub decision: Decision,
    pub outcome: Outcome,
}

/// Host of a gate for one protected view
///
/// Every check reads the latest principal state. When the identity provider
/// reported a change since the previous check, the gate's check cache is
/// invalidated first so no decision outlives a sign-out.
pub struct RouteGuard {
    gate: Arc<AccessGate>,
    policy: Arc<RedirectPolicy>,
    identity: watch::Receiver<PrincipalState>,
}

impl RouteGuard {
    pub fn new(
        gate: Arc<AccessGate>,
        policy: Arc<RedirectPolicy>,
        provider: &dyn IdentityProvider,
    ) -> Self {
        Self {
            gate,
            policy,
            identity: provider.subscribe(),
        }
    }

    /// Principal state the next check will use
    pub fn current(&self) -> PrincipalState {
        self.identity.borrow().clone()
    }

    /// Evaluate `requirement` for the current principal, navigating from `from`
    pub fn check(&mut self, requirement: &AccessRequirement, from: &str) -> GuardResult {
        if self.identity.has_changed().unwrap_or(false) {
            debug!(from, "Principal changed since last check");
            self.gate.invalidate_cache();
        }

        let state = self.identity.borrow_and_update().clone();
        let decision = self.gate.evaluate(&state, requirement);
        let outcome = self.policy.resolve(&decision, state.principal(), from);

        GuardResult { decision, outcome }
    }

    /// Wait for the next principal change. Returns `false` once the provider
    /// is gone and no further changes can arrive.
    pub async fn changed(&mut self) -> bool {
        self.identity.changed().await.is_ok()
    }
}
