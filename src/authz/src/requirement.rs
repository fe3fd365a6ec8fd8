//! Declarative access requirements attached to protected routes
//!
//! Requirements are validated once, when a route is declared. A malformed
//! entry is a configuration error and never reaches evaluation.

use crate::error::{AuthzError, Result};
use crate::types::{PermissionId, RoleId};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

fn name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9_.:*\-]+$").expect("requirement name pattern is valid")
    })
}

/// Role/permission constraint on a protected view
///
/// Built through [`AccessRequirement::builder`] or deserialized from JSON;
/// both paths validate every entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawRequirement", rename_all = "camelCase")]
pub struct AccessRequirement {
    required_roles: Vec<RoleId>,
    required_permissions: Vec<PermissionId>,
    require_all: bool,
    deny_roles: Vec<RoleId>,
}

impl AccessRequirement {
    /// Start declaring a requirement
    pub fn builder() -> RequirementBuilder {
        RequirementBuilder::default()
    }

    /// Requirement that any authenticated principal satisfies
    pub fn authenticated() -> Self {
        Self {
            required_roles: Vec::new(),
            required_permissions: Vec::new(),
            require_all: true,
            deny_roles: Vec::new(),
        }
    }

    pub fn required_roles(&self) -> &[RoleId] {
        &self.required_roles
    }

    pub fn required_permissions(&self) -> &[PermissionId] {
        &self.required_permissions
    }

    pub fn require_all(&self) -> bool {
        self.require_all
    }

    pub fn deny_roles(&self) -> &[RoleId] {
        &self.deny_roles
    }

    /// Whether neither roles nor permissions are required
    pub fn is_open(&self) -> bool {
        self.required_roles.is_empty() && self.required_permissions.is_empty()
    }
}

impl Default for AccessRequirement {
    fn default() -> Self {
        Self::authenticated()
    }
}

/// Builder for [`AccessRequirement`]
#[derive(Debug, Clone)]
pub struct RequirementBuilder {
    required_roles: Vec<String>,
    allow_roles: Option<Vec<String>>,
    required_permissions: Vec<String>,
    require_all: bool,
    deny_roles: Vec<String>,
}

impl Default for RequirementBuilder {
    fn default() -> Self {
        Self {
            required_roles: Vec::new(),
            allow_roles: None,
            required_permissions: Vec::new(),
            require_all: true,
            deny_roles: Vec::new(),
        }
    }
}

impl RequirementBuilder {
    /// Require a role
    pub fn role(mut self, role: impl Into<String>) -> Self {
        self.required_roles.push(role.into());
        self
    }

    /// Require several roles
    pub fn roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_roles.extend(roles.into_iter().map(Into::into));
        self
    }

    /// Alias for [`roles`](Self::roles); takes precedence over it when set
    pub fn allow_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allow_roles
            .get_or_insert_with(Vec::new)
            .extend(roles.into_iter().map(Into::into));
        self
    }

    /// Require a permission
    pub fn permission(mut self, permission: impl Into<String>) -> Self {
        self.required_permissions.push(permission.into());
        self
    }

    /// Require several permissions
    pub fn permissions<I, S>(mut self, permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_permissions
            .extend(permissions.into_iter().map(Into::into));
        self
    }

    /// `true`: every required entry must be held. `false`: at least one.
    pub fn require_all(mut self, require_all: bool) -> Self {
        self.require_all = require_all;
        self
    }

    /// Deny principals holding `role`, regardless of other grants
    pub fn deny_role(mut self, role: impl Into<String>) -> Self {
        self.deny_roles.push(role.into());
        self
    }

    /// Deny principals holding any of `roles`
    pub fn deny_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.deny_roles.extend(roles.into_iter().map(Into::into));
        self
    }

    /// Validate and freeze the requirement
    pub fn build(self) -> Result<AccessRequirement> {
        let roles = self.allow_roles.unwrap_or(self.required_roles);

        Ok(AccessRequirement {
            required_roles: normalize("requiredRoles", roles)?,
            required_permissions: normalize("requiredPermissions", self.required_permissions)?,
            require_all: self.require_all,
            deny_roles: normalize("denyRoles", self.deny_roles)?,
        })
    }
}

/// Trim, validate and de-duplicate entries, keeping first occurrence order
fn normalize(field: &str, entries: Vec<String>) -> Result<Vec<String>> {
    let mut out: Vec<String> = Vec::with_capacity(entries.len());

    for (index, entry) in entries.into_iter().enumerate() {
        let name = entry.trim();
        if name.is_empty() {
            return Err(AuthzError::Configuration(format!(
                "{}[{}] is empty",
                field, index
            )));
        }
        if !name_pattern().is_match(name) {
            return Err(AuthzError::Configuration(format!(
                "{}[{}] contains invalid characters: {:?}",
                field, index, name
            )));
        }
        if !out.iter().any(|existing| existing == name) {
            out.push(name.to_string());
        }
    }

    Ok(out)
}

/// Wire form accepted from route definitions
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRequirement {
    #[serde(default)]
    required_roles: Vec<String>,
    #[serde(default)]
    allow_roles: Option<Vec<String>>,
    #[serde(default)]
    required_permissions: Vec<String>,
    #[serde(default = "default_require_all")]
    require_all: bool,
    #[serde(default)]
    deny_roles: Vec<String>,
}

fn default_require_all() -> bool {
    true
}

impl TryFrom<RawRequirement> for AccessRequirement {
    type Error = AuthzError;

    fn try_from(raw: RawRequirement) -> Result<Self> {
        let mut builder = AccessRequirement::builder()
            .roles(raw.required_roles)
            .permissions(raw.required_permissions)
            .require_all(raw.require_all)
            .deny_roles(raw.deny_roles);

        if let Some(allow) = raw.allow_roles {
            builder = builder.allow_roles(allow);
        }

        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let req = AccessRequirement::builder().build().unwrap();
        assert!(req.is_open());
        assert!(req.require_all());
        assert!(req.deny_roles().is_empty());
    }

    #[test]
    fn test_allow_roles_takes_precedence() {
        let req = AccessRequirement::builder()
            .role("admin")
            .allow_roles(["teacher"])
            .build()
            .unwrap();

        assert_eq!(req.required_roles(), ["teacher".to_string()]);
    }

    #[test]
    fn test_duplicates_collapsed_in_order() {
        let req = AccessRequirement::builder()
            .roles(["teacher", "student", " teacher "])
            .build()
            .unwrap();

        assert_eq!(req.required_roles(), ["teacher".to_string(), "student".to_string()]);
    }

    #[test]
    fn test_empty_entry_rejected() {
        let err = AccessRequirement::builder()
            .permission("read")
            .permission("   ")
            .build()
            .unwrap_err();

        assert!(matches!(err, AuthzError::Configuration(_)));
        assert!(err.to_string().contains("requiredPermissions[1]"));
    }

    #[test]
    fn test_invalid_characters_rejected() {
        let err = AccessRequirement::builder()
            .deny_role("bad role")
            .build()
            .unwrap_err();

        assert!(matches!(err, AuthzError::Configuration(_)));
    }

    #[test]
    fn test_deserialize_validates() {
        let req: AccessRequirement = serde_json::from_str(
            r#"{"requiredRoles":["teacher","student"],"requireAll":false,"denyRoles":["banned"]}"#,
        )
        .unwrap();

        assert_eq!(req.required_roles().len(), 2);
        assert!(!req.require_all());
        assert_eq!(req.deny_roles(), ["banned".to_string()]);

        let bad = serde_json::from_str::<AccessRequirement>(r#"{"requiredRoles":[""]}"#);
        assert!(bad.is_err());

        let not_strings = serde_json::from_str::<AccessRequirement>(r#"{"requiredRoles":[1]}"#);
        assert!(not_strings.is_err());
    }
}
