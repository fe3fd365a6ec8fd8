//! Mapping gate decisions to what a route renderer should do

use crate::engine::{Decision, DenyReason};
use crate::types::{Principal, RoleId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// What the route renderer should do with a decision
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum Outcome {
    /// Render the protected view
    Render,

    /// Identity still loading; show a loading indicator, do not redirect
    Loading,

    /// Render an inline fallback view in place of the protected one
    Fallback { view: String, decision: Decision },

    /// Navigate elsewhere, replacing the current history entry
    Redirect(Redirect),
}

impl Outcome {
    /// Redirect target, if redirecting
    pub fn location(&self) -> Option<&str> {
        match self {
            Outcome::Redirect(redirect) => Some(&redirect.to),
            _ => None,
        }
    }
}

/// Redirect target plus the navigation state handed to the target view
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Redirect {
    pub to: String,

    /// Path the user attempted to open
    pub from: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<DenyReason>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub missing_roles: Vec<String>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub missing_permissions: Vec<String>,
}

impl Redirect {
    fn new(to: impl Into<String>, from: &str) -> Self {
        Self {
            to: to.into(),
            from: from.to_string(),
            reason: None,
            missing_roles: Vec::new(),
            missing_permissions: Vec::new(),
        }
    }
}

/// Where denied and unauthenticated principals are sent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RedirectPolicy {
    /// Target for unauthenticated principals
    pub login_path: String,

    /// Target for denied principals
    pub unauthorized_path: String,

    /// Home route per role, used in role-home mode
    pub role_home: BTreeMap<RoleId, String>,

    /// Home route for roles without an entry
    pub default_home: String,

    /// Send principals lacking rights to their role home instead of
    /// `unauthorized_path`
    pub deny_to_role_home: bool,

    /// Inline fallback view rendered instead of a denied redirect
    pub fallback: Option<String>,
}

impl Default for RedirectPolicy {
    fn default() -> Self {
        let role_home = [
            ("student", "/students"),
            ("teacher", "/dashboard"),
            ("school", "/school"),
        ]
        .into_iter()
        .map(|(role, path)| (role.to_string(), path.to_string()))
        .collect();

        Self {
            login_path: "/login".to_string(),
            unauthorized_path: "/unauthorized".to_string(),
            role_home,
            default_home: "/".to_string(),
            deny_to_role_home: false,
            fallback: None,
        }
    }
}

impl RedirectPolicy {
    /// Render `view` inline instead of redirecting denied principals
    pub fn with_fallback(mut self, view: impl Into<String>) -> Self {
        self.fallback = Some(view.into());
        self
    }

    /// Send denied principals to their role home
    pub fn with_role_home_redirects(mut self) -> Self {
        self.deny_to_role_home = true;
        self
    }

    pub fn with_login_path(mut self, path: impl Into<String>) -> Self {
        self.login_path = path.into();
        self
    }

    /// Home route for `principal`: the first of its roles with an entry
    pub fn home_for(&self, principal: &Principal) -> &str {
        principal
            .roles
            .iter()
            .find_map(|role| self.role_home.get(role))
            .map(String::as_str)
            .unwrap_or(&self.default_home)
    }

    /// Home route for a single role
    pub fn home_for_role(&self, role: &str) -> &str {
        self.role_home
            .get(role)
            .map(String::as_str)
            .unwrap_or(&self.default_home)
    }

    /// Map `decision` for a request to `from` into an outcome
    pub fn resolve(&self, decision: &Decision, principal: Option<&Principal>, from: &str) -> Outcome {
        match decision {
            Decision::Granted => Outcome::Render,
            Decision::Pending => Outcome::Loading,
            Decision::Unauthenticated => Outcome::Redirect(Redirect::new(&self.login_path, from)),
            Decision::Denied {
                reason: DenyReason::RoleUnresolved,
                ..
            } => {
                let mut redirect = Redirect::new(&self.default_home, from);
                redirect.reason = Some(DenyReason::RoleUnresolved);
                Outcome::Redirect(redirect)
            }
            Decision::Denied {
                reason,
                missing_roles,
                missing_permissions,
            } => {
                if let Some(view) = &self.fallback {
                    return Outcome::Fallback {
                        view: view.clone(),
                        decision: decision.clone(),
                    };
                }

                let to = match (reason, principal) {
                    (DenyReason::Insufficient, Some(principal)) if self.deny_to_role_home => {
                        self.home_for(principal).to_string()
                    }
                    _ => self.unauthorized_path.clone(),
                };

                Outcome::Redirect(Redirect {
                    to,
                    from: from.to_string(),
                    reason: Some(*reason),
                    missing_roles: missing_roles.clone(),
                    missing_permissions: missing_permissions.clone(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unauthenticated_goes_to_login() {
        let policy = RedirectPolicy::default();
        let outcome = policy.resolve(&Decision::Unauthenticated, None, "/dashboard");

        match outcome {
            Outcome::Redirect(redirect) => {
                assert_eq!(redirect.to, "/login");
                assert_eq!(redirect.from, "/dashboard");
                assert!(redirect.reason.is_none());
            }
            other => panic!("expected redirect, got {:?}", other),
        }
    }

    #[test]
    fn test_pending_and_granted() {
        let policy = RedirectPolicy::default();
        assert_eq!(policy.resolve(&Decision::Pending, None, "/"), Outcome::Loading);
        assert_eq!(policy.resolve(&Decision::Granted, None, "/"), Outcome::Render);
    }

    #[test]
    fn test_denied_carries_missing_lists() {
        let policy = RedirectPolicy::default();
        let decision = Decision::insufficient(vec!["student".to_string()], vec![]);

        match policy.resolve(&decision, None, "/classes") {
            Outcome::Redirect(redirect) => {
                assert_eq!(redirect.to, "/unauthorized");
                assert_eq!(redirect.reason, Some(DenyReason::Insufficient));
                assert_eq!(redirect.missing_roles, vec!["student".to_string()]);
            }
            other => panic!("expected redirect, got {:?}", other),
        }
    }

    #[test]
    fn test_fallback_replaces_denied_redirect() {
        let policy = RedirectPolicy::default().with_fallback("upgrade-plan");

        let outcome = policy.resolve(&Decision::deny_listed(), None, "/premium");
        assert!(matches!(outcome, Outcome::Fallback { ref view, .. } if view == "upgrade-plan"));

        // Unauthenticated still goes to login
        let outcome = policy.resolve(&Decision::Unauthenticated, None, "/premium");
        assert_eq!(outcome.location(), Some("/login"));
    }

    #[test]
    fn test_role_home_mode() {
        let policy = RedirectPolicy::default().with_role_home_redirects();
        let student = Principal::new("s1").with_role("student");
        let decision = Decision::insufficient(vec!["teacher".to_string()], vec![]);

        let outcome = policy.resolve(&decision, Some(&student), "/dashboard");
        assert_eq!(outcome.location(), Some("/students"));

        let guest = Principal::new("g1").with_role("guest");
        let outcome = policy.resolve(&decision, Some(&guest), "/dashboard");
        assert_eq!(outcome.location(), Some("/"));

        // Deny-list denials keep the unauthorized page
        let outcome = policy.resolve(&Decision::deny_listed(), Some(&student), "/dashboard");
        assert_eq!(outcome.location(), Some("/unauthorized"));
    }

    #[test]
    fn test_unresolved_role_goes_home() {
        let policy = RedirectPolicy::default().with_fallback("ignored");
        let decision = Decision::Denied {
            reason: DenyReason::RoleUnresolved,
            missing_roles: vec![],
            missing_permissions: vec![],
        };

        assert_eq!(policy.resolve(&decision, None, "/school").location(), Some("/"));
    }
}
