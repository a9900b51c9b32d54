use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::action::{AuthorizationAction, RoleAction};
use super::errors::{AuthzError, AuthzResult};
use super::uri::ResourceUri;

/// Role granted full access by the default policies.
pub const ADMIN_ROLE: &str = "admin";

/// Logical name of the grouping set that holds admin memberships.
pub const ADMIN_MEMBERS_SET: &str = "admins";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PolicyType {
    /// Permission rows, `p`.
    Permission,
    /// Role membership rows, `g`.
    Grouping,
}

impl PolicyType {
    pub fn as_str(self) -> &'static str {
        match self {
            PolicyType::Permission => "p",
            PolicyType::Grouping => "g",
        }
    }
}

impl fmt::Display for PolicyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PolicyType {
    type Err = AuthzError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "p" => Ok(PolicyType::Permission),
            "g" => Ok(PolicyType::Grouping),
            _ => Err(AuthzError::UnknownPolicyType(s.to_string())),
        }
    }
}

/// The flat `(subject, object, action)` row the engine consumes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct PolicyTuple {
    subject: String,
    object: String,
    action: String,
}

impl PolicyTuple {
    pub fn new(
        subject: impl Into<String>,
        object: impl Into<String>,
        action: impl Into<String>,
    ) -> AuthzResult<Self> {
        let tuple = Self {
            subject: subject.into(),
            object: object.into(),
            action: action.into(),
        };
        for (component, value) in [
            ("subject", &tuple.subject),
            ("object", &tuple.object),
            ("action", &tuple.action),
        ] {
            if value.trim().is_empty() {
                return Err(AuthzError::EmptyComponent { component });
            }
        }
        Ok(tuple)
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn object(&self) -> &str {
        &self.object
    }

    pub fn action(&self) -> &str {
        &self.action
    }
}

impl TryFrom<Vec<String>> for PolicyTuple {
    type Error = AuthzError;

    fn try_from(value: Vec<String>) -> Result<Self, Self::Error> {
        let [subject, object, action]: [String; 3] = value
            .try_into()
            .map_err(|v: Vec<String>| AuthzError::TupleArity(v.len()))?;
        Self::new(subject, object, action)
    }
}

impl From<PolicyTuple> for Vec<String> {
    fn from(tuple: PolicyTuple) -> Self {
        vec![tuple.subject, tuple.object, tuple.action]
    }
}

impl fmt::Display for PolicyTuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.subject, self.object, self.action)
    }
}

/// Subject holding the action on the object, both named by URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RbacPolicy {
    pub subject: ResourceUri,
    pub object: ResourceUri,
    pub action: AuthorizationAction,
}

/// Subjects selected by a rule expression. Object and action are kept as raw
/// patterns so they can carry wildcards and regular expressions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbacPolicy {
    pub subject_rule: String,
    pub object: String,
    pub action: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Policy {
    Rbac(RbacPolicy),
    Abac(AbacPolicy),
}

impl Policy {
    pub fn rbac(subject: ResourceUri, object: ResourceUri, action: AuthorizationAction) -> Self {
        Policy::Rbac(RbacPolicy {
            subject,
            object,
            action,
        })
    }

    pub fn abac(
        subject_rule: impl Into<String>,
        object: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Policy::Abac(AbacPolicy {
            subject_rule: subject_rule.into(),
            object: object.into(),
            action: action.into(),
        })
    }

    /// Membership of `member` in the role `name`. Belongs in a
    /// [`PolicyType::Grouping`] set.
    pub fn role_membership(member: ResourceUri, name: &str) -> Self {
        Self::rbac(member, ResourceUri::role(name), RoleAction::Assume.into())
    }

    pub fn description(&self) -> String {
        match self {
            Policy::Rbac(p) => format!("{} may {} on {}", p.subject, p.action, p.object),
            Policy::Abac(p) => format!(
                "subjects matching `{}` may {} on {}",
                p.subject_rule, p.action, p.object
            ),
        }
    }

    pub fn policy_tuple(&self) -> AuthzResult<PolicyTuple> {
        match self {
            Policy::Rbac(p) => PolicyTuple::new(
                p.subject.to_string(),
                p.object.to_string(),
                p.action.to_string(),
            ),
            Policy::Abac(p) => PolicyTuple::new(
                p.subject_rule.clone(),
                p.object.clone(),
                p.action.clone(),
            ),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NamedPolicySet {
    pub logical_name: String,
    pub policy_type: PolicyType,
    pub policies: Vec<Policy>,
}

impl NamedPolicySet {
    pub fn new(logical_name: impl Into<String>, policy_type: PolicyType) -> Self {
        Self {
            logical_name: logical_name.into(),
            policy_type,
            policies: Vec::new(),
        }
    }

    pub fn with(mut self, policy: Policy) -> Self {
        self.policies.push(policy);
        self
    }

    /// Fails on the first malformed policy; nothing is partially produced.
    pub fn tuples(&self) -> AuthzResult<Vec<PolicyTuple>> {
        self.policies.iter().map(Policy::policy_tuple).collect()
    }
}

/// Stored tuples grouped by type, each group in insertion order.
pub type PolicyRulesets = BTreeMap<PolicyType, Vec<PolicyTuple>>;
