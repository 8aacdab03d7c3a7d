//! Role-based authorization gates
//!
//! Thin by design: the accounting never consults roles. The ledger checks them
//! at the entry points that need them (distribute, pause, configuration).

use crate::{types::AccountId, Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Ledger roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Role {
    /// Pause, unpause, configuration, role management
    Operator,
    /// May trigger reward distribution
    Distributor,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Operator => write!(f, "operator"),
            Role::Distributor => write!(f, "distributor"),
        }
    }
}

/// Role membership
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessControl {
    members: BTreeMap<Role, BTreeSet<AccountId>>,
}

impl AccessControl {
    /// Access control with a single operator
    pub fn with_operator(operator: AccountId) -> Self {
        let mut access = Self::default();
        access.members.entry(Role::Operator).or_default().insert(operator);
        access
    }

    /// Whether `account` holds `role`
    pub fn has_role(&self, role: Role, account: &AccountId) -> bool {
        self.members
            .get(&role)
            .is_some_and(|members| members.contains(account))
    }

    /// Fail with [`Error::Unauthorized`] unless `account` holds `role`
    pub fn require(&self, role: Role, account: &AccountId) -> Result<()> {
        if self.has_role(role, account) {
            Ok(())
        } else {
            Err(Error::Unauthorized(format!("{} is not a {}", account, role)))
        }
    }

    /// Distributors and operators may distribute
    pub fn require_distributor(&self, account: &AccountId) -> Result<()> {
        if self.has_role(Role::Distributor, account) || self.has_role(Role::Operator, account) {
            Ok(())
        } else {
            Err(Error::Unauthorized(format!("{} may not distribute", account)))
        }
    }

    /// Add `account` to `role`; returns false when it was already a member
    pub fn grant(&mut self, role: Role, account: AccountId) -> bool {
        self.members.entry(role).or_default().insert(account)
    }

    /// Remove `account` from `role`; the last operator cannot be removed
    pub fn revoke(&mut self, role: Role, account: &AccountId) -> Result<bool> {
        let Some(members) = self.members.get_mut(&role) else {
            return Ok(false);
        };

        if role == Role::Operator && members.len() == 1 && members.contains(account) {
            return Err(Error::Config("cannot revoke the last operator".to_string()));
        }
        Ok(members.remove(account))
    }

    /// Members of `role`
    pub fn members(&self, role: Role) -> impl Iterator<Item = &AccountId> {
        self.members.get(&role).into_iter().flatten()
    }
}
