use core::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Canonical portal role.
///
/// Every legacy spelling (`Super_Admin`, `CUSTOMER_SERVICE`, ` manager `, ...)
/// folds into exactly one variant at the authentication boundary. Code past
/// that boundary matches on this enum, never on raw strings.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    Agent,
    Manager,
    CustomerService,
    Admin,
    SuperAdmin,
}

/// Redirect precedence, highest first.
const PRECEDENCE: [Role; 5] = [
    Role::SuperAdmin,
    Role::Admin,
    Role::Manager,
    Role::CustomerService,
    Role::Agent,
];

impl Role {
    pub const ALL: [Role; 5] = [
        Role::Agent,
        Role::Manager,
        Role::CustomerService,
        Role::Admin,
        Role::SuperAdmin,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Agent => "agent",
            Role::Manager => "manager",
            Role::CustomerService => "customer-service",
            Role::Admin => "admin",
            Role::SuperAdmin => "super-admin",
        }
    }

    /// Landing page for this role.
    pub fn dashboard_path(&self) -> &'static str {
        match self {
            Role::Agent => "/agent/dashboard",
            Role::Manager => "/manager/dashboard",
            Role::CustomerService => "/customer-service/dashboard",
            Role::Admin => "/admin/dashboard",
            Role::SuperAdmin => "/super-admin/dashboard",
        }
    }

    pub fn is_super_admin(&self) -> bool {
        matches!(self, Role::SuperAdmin)
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unrecognized role '{0}'")]
pub struct UnrecognizedRole(pub String);

impl FromStr for Role {
    type Err = UnrecognizedRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        normalize(s)
    }
}

/// Fold a raw role spelling into its canonical role.
///
/// Trims surrounding whitespace, lowercases, and treats `_` as `-`. Anything
/// that does not then match a canonical spelling exactly is rejected.
pub fn normalize(raw: &str) -> Result<Role, UnrecognizedRole> {
    let folded = raw.trim().to_lowercase().replace('_', "-");
    Role::ALL
        .into_iter()
        .find(|r| r.as_str() == folded)
        .ok_or_else(|| UnrecognizedRole(raw.to_string()))
}

/// What an absent (or blank) role claim resolves to.
///
/// `FallbackToAgent` preserves the portal's historical behavior of treating
/// role-less tokens as agents. It is the default but widens access for any
/// token minted without a role; `Reject` turns such tokens into
/// `RoleUnrecognized`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingRolePolicy {
    #[default]
    FallbackToAgent,
    Reject,
}

/// Resolve an optional raw role claim under `policy`.
pub fn resolve_claimed_role(
    raw: Option<&str>,
    policy: MissingRolePolicy,
) -> Result<Role, UnrecognizedRole> {
    match raw.map(str::trim).filter(|r| !r.is_empty()) {
        Some(r) => normalize(r),
        None => match policy {
            MissingRolePolicy::FallbackToAgent => {
                tracing::warn!("token carries no role claim; falling back to agent");
                Ok(Role::Agent)
            }
            MissingRolePolicy::Reject => Err(UnrecognizedRole(String::new())),
        },
    }
}

/// The set of roles a route admits.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RoleSet(Vec<Role>);

impl RoleSet {
    pub fn of(roles: &[Role]) -> Self {
        let mut v = roles.to_vec();
        v.sort();
        v.dedup();
        Self(v)
    }

    pub fn all() -> Self {
        Self::of(&Role::ALL)
    }

    pub fn contains(&self, role: Role) -> bool {
        self.0.contains(&role)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Role> {
        self.0.iter()
    }
}

/// Exact membership check of a canonical role against a route's allowed set.
pub fn is_allowed(role: Role, allowed: &RoleSet) -> bool {
    allowed.contains(role)
}

/// Pick the landing page for a list of raw role spellings.
///
/// The highest-precedence recognized role wins; unrecognized entries are
/// ignored. An empty or fully unrecognized list lands on the agent dashboard.
pub fn resolve_redirect_target<S: AsRef<str>>(roles: &[S]) -> &'static str {
    let recognized: Vec<Role> = roles
        .iter()
        .filter_map(|r| normalize(r.as_ref()).ok())
        .collect();

    PRECEDENCE
        .into_iter()
        .find(|r| recognized.contains(r))
        .unwrap_or(Role::Agent)
        .dashboard_path()
}
