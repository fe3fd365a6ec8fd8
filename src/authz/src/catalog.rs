//! Role to permission catalog
//!
//! A principal holds a permission when it carries it directly or when one of
//! its roles grants it here.

use crate::types::{PermissionId, Principal, RoleId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Permissions granted by each role
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleCatalog {
    grants: HashMap<RoleId, BTreeSet<PermissionId>>,
}

impl RoleCatalog {
    /// Empty catalog: only direct permissions count
    pub fn new() -> Self {
        Self::default()
    }

    /// Platform defaults for admin, teacher, student and school accounts
    pub fn education_defaults() -> Self {
        Self::new()
            .grant("admin", ["read", "write", "delete", "admin"])
            .grant("teacher", ["read", "write", "grade"])
            .grant("school", ["read", "write", "analytics"])
            .grant("student", ["read"])
    }

    /// Grant `permissions` to `role`
    pub fn grant<I, S>(mut self, role: impl Into<String>, permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.grants
            .entry(role.into())
            .or_default()
            .extend(permissions.into_iter().map(Into::into));
        self
    }

    /// Whether `role` grants `permission`
    pub fn role_grants(&self, role: &str, permission: &str) -> bool {
        self.grants
            .get(role)
            .map(|perms| perms.contains(permission))
            .unwrap_or(false)
    }

    /// Whether `principal` holds `permission`, directly or through a role
    pub fn principal_has(&self, principal: &Principal, permission: &str) -> bool {
        principal.permissions.contains(permission)
            || principal
                .roles
                .iter()
                .any(|role| self.role_grants(role, permission))
    }

    /// All permissions held by `principal`
    pub fn effective_permissions(&self, principal: &Principal) -> BTreeSet<PermissionId> {
        let mut perms = principal.permissions.clone();
        for role in &principal.roles {
            if let Some(granted) = self.grants.get(role) {
                perms.extend(granted.iter().cloned());
            }
        }
        perms
    }

    pub fn is_empty(&self) -> bool {
        self.grants.is_empty()
    }
}
