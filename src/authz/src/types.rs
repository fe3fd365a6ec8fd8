//! Core gate types

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Unique role identifier
pub type RoleId = String;

/// Unique permission identifier
pub type PermissionId = String;

/// Principal (the signed-in user)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// Principal identifier (e.g., a user UUID)
    pub id: String,

    /// Roles held by the principal (e.g., "teacher", "student")
    #[serde(default)]
    pub roles: BTreeSet<RoleId>,

    /// Permissions granted directly to the principal
    #[serde(default)]
    pub permissions: BTreeSet<PermissionId>,
}

impl Principal {
    /// Create a principal with no roles or permissions
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            roles: BTreeSet::new(),
            permissions: BTreeSet::new(),
        }
    }

    /// Add a role to the principal
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.insert(role.into());
        self
    }

    /// Add several roles to the principal
    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles.extend(roles.into_iter().map(Into::into));
        self
    }

    /// Add a direct permission to the principal
    pub fn with_permission(mut self, permission: impl Into<String>) -> Self {
        self.permissions.insert(permission.into());
        self
    }

    /// Whether the principal holds `role`
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }
}

/// What the identity provider currently knows about the user
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", content = "principal", rename_all = "snake_case")]
pub enum PrincipalState {
    /// Identity still loading; callers should show a loading indicator
    #[default]
    Pending,

    /// No signed-in user
    Anonymous,

    /// Signed-in user
    Authenticated(Principal),
}

impl PrincipalState {
    /// The principal, if authenticated
    pub fn principal(&self) -> Option<&Principal> {
        match self {
            PrincipalState::Authenticated(p) => Some(p),
            _ => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, PrincipalState::Pending)
    }
}

impl From<Option<Principal>> for PrincipalState {
    fn from(principal: Option<Principal>) -> Self {
        match principal {
            Some(p) => PrincipalState::Authenticated(p),
            None => PrincipalState::Anonymous,
        }
    }
}

/// Kind of an individual access check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckKind {
    Role,
    Permission,
}

impl fmt::Display for CheckKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckKind::Role => write!(f, "role"),
            CheckKind::Permission => write!(f, "permission"),
        }
    }
}
