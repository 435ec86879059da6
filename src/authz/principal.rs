use std::collections::HashSet;
use std::fmt;

use uuid::Uuid;

use crate::models::permission::{PermissionAction, PermissionModule, PermissionRef};
use crate::models::staff::{RoleLabel, Staff};

/// What a guarded operation requires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Capability {
    /// A permission name such as "orders-read".
    Named(String),
    /// A (module, action) pair.
    Pair(PermissionModule, PermissionAction),
    /// Only the top-tier account qualifies.
    TopTier,
}

impl Capability {
    pub fn named(name: impl Into<String>) -> Self {
        Self::Named(name.into())
    }

    pub fn pair(module: PermissionModule, action: PermissionAction) -> Self {
        Self::Pair(module, action)
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::Named(name) => f.write_str(name),
            Capability::Pair(module, action) => write!(f, "{module}:{action}"),
            Capability::TopTier => f.write_str("top-tier"),
        }
    }
}

/// The authenticated staff member a request acts as, with the permission
/// set materialized on their record.
#[derive(Debug, Clone)]
pub struct Principal {
    pub staff_id: Uuid,
    pub role: RoleLabel,
    pub is_active: bool,
    pub is_blocked: bool,
    pub permissions: HashSet<String>,
    pub capabilities: HashSet<(PermissionModule, PermissionAction)>,
}

impl Principal {
    pub fn new(staff_id: Uuid) -> Self {
        Self {
            staff_id,
            role: RoleLabel::Unassigned,
            is_active: true,
            is_blocked: false,
            permissions: HashSet::new(),
            capabilities: HashSet::new(),
        }
    }

    pub fn with_role(mut self, role: RoleLabel) -> Self {
        self.role = role;
        self
    }

    pub fn with_permissions<'a>(mut self, perms: impl IntoIterator<Item = &'a PermissionRef>) -> Self {
        self.permissions.clear();
        self.capabilities.clear();
        for perm in perms {
            self.permissions.insert(perm.name.clone());
            self.capabilities.insert((perm.module, perm.action));
        }
        self
    }

    pub fn with_status(mut self, is_active: bool, is_blocked: bool) -> Self {
        self.is_active = is_active;
        self.is_blocked = is_blocked;
        self
    }

    pub fn is_top_tier(&self) -> bool {
        self.role.is_top_tier()
    }

    pub fn is_disabled(&self) -> bool {
        !self.is_active || self.is_blocked
    }

    /// Top-tier holds every capability, including names that were never
    /// registered; everyone else needs the name in their permission set.
    pub fn has_capability(&self, capability_name: &str) -> bool {
        self.is_top_tier() || self.permissions.contains(capability_name)
    }

    /// Membership test against the materialized set only; does not apply
    /// the top-tier bypass.
    pub fn holds(&self, capability: &Capability) -> bool {
        match capability {
            Capability::Named(name) => self.permissions.contains(name),
            Capability::Pair(module, action) => self.capabilities.contains(&(*module, *action)),
            Capability::TopTier => false,
        }
    }
}

impl From<&Staff> for Principal {
    fn from(staff: &Staff) -> Self {
        Principal::new(staff.id)
            .with_role(staff.role.clone())
            .with_status(staff.is_active, staff.is_blocked)
            .with_permissions(&staff.permissions)
    }
}
