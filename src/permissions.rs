//! Capability checks for mutating commands

use crate::error::SearchError;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Identity a query runs as
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    pub username: String,
    #[serde(default)]
    pub is_superuser: bool,
}

impl Caller {
    pub fn new(username: impl Into<String>) -> Self {
        Caller {
            username: username.into(),
            is_superuser: false,
        }
    }

    pub fn superuser(username: impl Into<String>) -> Self {
        Caller {
            username: username.into(),
            is_superuser: true,
        }
    }

    pub fn anonymous() -> Self {
        Self::new("anonymous")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Add,
    Change,
    Delete,
    View,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Add => "add",
            Action::Change => "change",
            Action::Delete => "delete",
            Action::View => "view",
        }
    }

    /// Permission codename for an entity type, e.g. `add_event`
    pub fn codename(&self, entity_type: &str) -> String {
        format!("{}_{}", self.as_str(), entity_type)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Injected into every mutating command
pub trait PermissionPolicy: Send + Sync {
    fn has_permission(&self, action: Action, entity_type: &str, caller: &Caller) -> bool;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl PermissionPolicy for AllowAll {
    fn has_permission(&self, _action: Action, _entity_type: &str, _caller: &Caller) -> bool {
        true
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DenyAll;

impl PermissionPolicy for DenyAll {
    fn has_permission(&self, _action: Action, _entity_type: &str, _caller: &Caller) -> bool {
        false
    }
}

/// Codename grants per user. `*` as a user applies to everyone; `*` as a codename grants everything.
#[derive(Debug, Clone, Default)]
pub struct GrantTable {
    superusers: BTreeSet<String>,
    grants: IndexMap<String, BTreeSet<String>>,
}

impl GrantTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn superuser(mut self, username: impl Into<String>) -> Self {
        self.superusers.insert(username.into());
        self
    }

    pub fn grant(mut self, username: impl Into<String>, codename: impl Into<String>) -> Self {
        self.grants
            .entry(username.into())
            .or_default()
            .insert(codename.into());
        self
    }

    fn granted(&self, username: &str, codename: &str) -> bool {
        self.grants
            .get(username)
            .is_some_and(|codes| codes.contains(codename) || codes.contains("*"))
    }
}

impl PermissionPolicy for GrantTable {
    fn has_permission(&self, action: Action, entity_type: &str, caller: &Caller) -> bool {
        if caller.is_superuser || self.superusers.contains(&caller.username) {
            return true;
        }
        let codename = action.codename(entity_type);
        self.granted(&caller.username, &codename) || self.granted("*", &codename)
    }
}

/// Fail with `PermissionDenied` unless the policy grants `action` on `entity_type`
pub fn require(
    policy: &dyn PermissionPolicy,
    action: Action,
    entity_type: &str,
    caller: &Caller,
) -> Result<(), SearchError> {
    if policy.has_permission(action, entity_type, caller) {
        return Ok(());
    }
    tracing::warn!(
        user = %caller.username,
        action = action.as_str(),
        entity = entity_type,
        "permission denied"
    );
    Err(SearchError::PermissionDenied {
        action: action.to_string(),
        entity: entity_type.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grant_table() {
        let policy = GrantTable::new()
            .superuser("root")
            .grant("alice", "add_event")
            .grant("*", "view_event");

        let alice = Caller::new("alice");
        let bob = Caller::new("bob");
        assert!(policy.has_permission(Action::Add, "event", &alice));
        assert!(!policy.has_permission(Action::Change, "event", &alice));
        assert!(policy.has_permission(Action::View, "event", &bob));
        assert!(!policy.has_permission(Action::Add, "event", &bob));
        assert!(policy.has_permission(Action::Delete, "event", &Caller::new("root")));
        assert!(policy.has_permission(Action::Delete, "event", &Caller::superuser("carol")));
    }

    #[test]
    fn test_require_reports_action_and_entity() {
        let err = require(&DenyAll, Action::Change, "event", &Caller::anonymous()).unwrap_err();
        assert_eq!(err.to_string(), "permission denied: change on event");
        assert!(require(&AllowAll, Action::Change, "event", &Caller::anonymous()).is_ok());
    }
}
