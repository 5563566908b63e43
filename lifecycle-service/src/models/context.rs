//! Caller identity and per-request options.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Caller role. Authentication happens upstream; the engine only
/// authorizes gated transitions against this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Admin,
    Finance,
    Accountant,
    Viewer,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Admin => "admin",
            UserRole::Finance => "finance",
            UserRole::Accountant => "accountant",
            UserRole::Viewer => "viewer",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "admin" => UserRole::Admin,
            "finance" => UserRole::Finance,
            "accountant" => UserRole::Accountant,
            _ => UserRole::Viewer,
        }
    }

    /// Admin and finance pass role-gated transitions unconditionally.
    pub fn is_privileged(&self) -> bool {
        matches!(self, UserRole::Admin | UserRole::Finance)
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authenticated caller context, trusted as already verified upstream.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub user_id: Uuid,
    pub user_role: UserRole,
    pub company_id: Uuid,
}

/// Per-request options for a status update.
#[derive(Debug, Clone, Default)]
pub struct StatusUpdateOptions {
    pub reason: Option<String>,
    /// Accept a role-gated transition from an unprivileged caller; the
    /// resulting audit entry is flagged for approval.
    pub force_override: bool,
    pub automated: bool,
    pub batch: bool,
}

impl StatusUpdateOptions {
    pub fn with_reason(reason: impl Into<String>) -> Self {
        Self {
            reason: Some(reason.into()),
            ..Self::default()
        }
    }

    pub fn trimmed_reason(&self) -> Option<&str> {
        self.reason.as_deref().map(str::trim).filter(|r| !r.is_empty())
    }
}
