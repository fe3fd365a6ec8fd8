//! Identity provider contract
//!
//! The gate never fetches identities itself. A provider exposes the current
//! principal state and notifies subscribers whenever it changes, so hosts can
//! drop decisions made for a principal that has since signed out.

use crate::types::{Principal, PrincipalState};
use tokio::sync::watch;
use tracing::info;

/// Source of the signed-in principal
pub trait IdentityProvider: Send + Sync {
    /// Latest known principal state
    fn current_principal(&self) -> PrincipalState;

    /// Receiver notified on every principal change
    fn subscribe(&self) -> watch::Receiver<PrincipalState>;
}

/// Identity provider backed by a watch channel
///
/// Starts in [`PrincipalState::Pending`] until the session bootstrap
/// reports a result through [`sign_in`](Self::sign_in) or
/// [`sign_out`](Self::sign_out).
pub struct InMemoryIdentityProvider {
    sender: watch::Sender<PrincipalState>,
}

impl InMemoryIdentityProvider {
    pub fn new() -> Self {
        Self::with_state(PrincipalState::Pending)
    }

    /// Provider starting from `state`
    pub fn with_state(state: PrincipalState) -> Self {
        let (sender, _) = watch::channel(state);
        Self { sender }
    }

    /// Identity is being (re)loaded
    pub fn set_pending(&self) {
        self.sender.send_replace(PrincipalState::Pending);
    }

    /// A principal signed in
    pub fn sign_in(&self, principal: Principal) {
        info!(principal = %principal.id, "Principal signed in");
        self.sender.send_replace(PrincipalState::Authenticated(principal));
    }

    /// The principal signed out or its session expired
    pub fn sign_out(&self) {
        info!("Principal signed out");
        self.sender.send_replace(PrincipalState::Anonymous);
    }

    /// Replace the signed-in principal's roles/permissions (token refresh).
    /// Returns `false` when nobody is signed in.
    pub fn refresh(&self, principal: Principal) -> bool {
        self.sender.send_if_modified(|state| match state {
            PrincipalState::Authenticated(current) if *current != principal => {
                *current = principal;
                true
            }
            _ => false,
        })
    }
}

impl Default for InMemoryIdentityProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentityProvider for InMemoryIdentityProvider {
    fn current_principal(&self) -> PrincipalState {
        self.sender.borrow().clone()
    }

    fn subscribe(&self) -> watch::Receiver<PrincipalState> {
        self.sender.subscribe()
    }
}
