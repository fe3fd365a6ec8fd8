//! # Classgate Access Gate
//!
//! Role/permission gate for the protected views of an education platform.
//!
//! ## Features
//!
//! - **Synchronous evaluation** of declarative route requirements
//! - **Deny lists** that override every grant
//! - **Per-gate check cache** with lazy TTL invalidation
//! - **Three-state identity** (`Pending`, `Anonymous`, `Authenticated`) so
//!   callers never redirect while the session is still loading
//! - **Fail-closed role resolution** for role-only routes
//! - **axum middleware** turning decisions into redirects
//! - **Accessibility settings store** with validation and change events
//!
//! ## Example
//!
//! ```rust
//! use classgate_authz::{AccessGate, AccessRequirement, Decision, GateConfig, Principal, PrincipalState};
//!
//! let gate = AccessGate::new(GateConfig::default());
//!
//! let requirement = AccessRequirement::builder()
//!     .roles(["teacher", "student"])
//!     .require_all(true)
//!     .build()
//!     .unwrap();
//!
//! let teacher = PrincipalState::Authenticated(Principal::new("user-1").with_role("teacher"));
//!
//! match gate.evaluate(&teacher, &requirement) {
//!     Decision::Denied { missing_roles, .. } => assert_eq!(missing_roles, vec!["student"]),
//!     other => panic!("unexpected decision: {:?}", other),
//! }
//! ```

pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod guard;
pub mod http;
pub mod identity;
pub mod redirect;
pub mod requirement;
pub mod roles;
pub mod settings;
pub mod types;

// Re-export commonly used types
pub use catalog::RoleCatalog;
pub use config::{AppConfig, ServerConfig};
pub use engine::{AccessGate, CacheStats, Decision, DenyReason, GateConfig, GateMetrics, MetricsCollector};
pub use error::{AuthzError, Result};
pub use guard::{GuardResult, RouteGuard};
pub use identity::{IdentityProvider, InMemoryIdentityProvider};
pub use redirect::{Outcome, Redirect, RedirectPolicy};
pub use requirement::{AccessRequirement, RequirementBuilder};
pub use roles::{IdentityClaims, RoleProtection, RoleResolution, RoleResolver, RoleSource};
pub use settings::{AccessibilitySettings, SettingsRegistry, SettingsStore};
pub use types::{CheckKind, PermissionId, Principal, PrincipalState, RoleId};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
