//! Gate decision types

use crate::types::{PermissionId, RoleId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a principal was denied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DenyReason {
    /// Principal holds a role on the requirement's deny list
    #[serde(rename = "denyRoles")]
    DenyRoles,

    /// Principal lacks required roles or permissions
    #[serde(rename = "insufficient")]
    Insufficient,

    /// Principal's role could not be resolved (fail closed)
    #[serde(rename = "roleUnresolved")]
    RoleUnresolved,
}

impl DenyReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DenyReason::DenyRoles => "denyRoles",
            DenyReason::Insufficient => "insufficient",
            DenyReason::RoleUnresolved => "roleUnresolved",
        }
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of evaluating a requirement against a principal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "camelCase")]
pub enum Decision {
    /// Access allowed
    Granted,

    /// Principal present but lacking rights
    #[serde(rename_all = "camelCase")]
    Denied {
        reason: DenyReason,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        missing_roles: Vec<RoleId>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        missing_permissions: Vec<PermissionId>,
    },

    /// No signed-in principal
    Unauthenticated,

    /// Identity still loading
    Pending,
}

impl Decision {
    /// Deny decision caused by the deny list
    pub fn deny_listed() -> Self {
        Decision::Denied {
            reason: DenyReason::DenyRoles,
            missing_roles: Vec::new(),
            missing_permissions: Vec::new(),
        }
    }

    /// Deny decision listing what is missing
    pub fn insufficient(missing_roles: Vec<RoleId>, missing_permissions: Vec<PermissionId>) -> Self {
        Decision::Denied {
            reason: DenyReason::Insufficient,
            missing_roles,
            missing_permissions,
        }
    }

    pub fn is_granted(&self) -> bool {
        matches!(self, Decision::Granted)
    }

    pub fn is_denied(&self) -> bool {
        matches!(self, Decision::Denied { .. })
    }

    /// Deny reason, if denied
    pub fn deny_reason(&self) -> Option<DenyReason> {
        match self {
            Decision::Denied { reason, .. } => Some(*reason),
            _ => None,
        }
    }

    /// Short label used in logs and metrics
    pub fn label(&self) -> &'static str {
        match self {
            Decision::Granted => "granted",
            Decision::Denied { .. } => "denied",
            Decision::Unauthenticated => "unauthenticated",
            Decision::Pending => "pending",
        }
    }
}
