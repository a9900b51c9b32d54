use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::config::{expandenv, CommonConfig, PathSet};

use super::policy::{NamedPolicySet, Policy, PolicyType};

/// Authorization related configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AuthzConfig {
    /// Policy sets stored at startup. Storing is idempotent, so sets that
    /// already exist are left alone.
    #[serde(default = "AuthzConfig::default_policies")]
    pub policies: Vec<PolicySetConfig>,

    /// Admin account created at startup if no user with that name exists.
    #[serde(default)]
    pub bootstrap_admin: Option<BootstrapAdminConfig>,

    #[serde(skip)]
    pub policy_sets: Vec<NamedPolicySet>,
}

/// A named group of policies, as written in config files and in the policy
/// admin API.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PolicySetConfig {
    pub logical_name: String,

    /// `p` for permissions, `g` for role memberships.
    pub policy_type: String,

    pub policies: Vec<PolicyConfig>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum PolicyConfig {
    Rbac {
        subject: String,
        object: String,
        action: String,
    },
    Abac {
        subject_rule: String,
        object: String,
        action: String,
    },
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct BootstrapAdminConfig {
    pub username: String,

    /// Supports env expansion, e.g. `${GAMEDEALS_ADMIN_PASSWORD}`. Never
    /// printed.
    #[serde(skip_serializing)]
    pub password: String,
}

impl CommonConfig for AuthzConfig {
    fn default() -> Self {
        Self {
            policies: Self::default_policies(),
            bootstrap_admin: None,
            policy_sets: vec![],
        }
    }

    fn complete(&mut self, _ps: &PathSet) -> Result<()> {
        self.policy_sets = self
            .policies
            .iter()
            .map(PolicySetConfig::to_named_set)
            .collect::<Result<Vec<_>>>()
            .context("policies")?;

        if let Some(admin) = self.bootstrap_admin.as_mut() {
            admin.username = expandenv("bootstrap_admin.username", &admin.username)?;
            admin.password = expandenv("bootstrap_admin.password", &admin.password)?;
            if admin.username.is_empty() {
                bail!("bootstrap_admin.username cannot be empty");
            }
            if admin.password.is_empty() {
                bail!("bootstrap_admin.password cannot be empty");
            }
        }

        Ok(())
    }
}

impl AuthzConfig {
    /// Public reads, login, and full access for the `admin` role.
    pub fn default_policies() -> Vec<PolicySetConfig> {
        let abac = |subject_rule: &str, object: &str, action: &str| PolicyConfig::Abac {
            subject_rule: subject_rule.to_string(),
            object: object.to_string(),
            action: action.to_string(),
        };
        vec![
            PolicySetConfig {
                logical_name: String::from("public"),
                policy_type: String::from("p"),
                policies: vec![
                    abac("any", "gamedeals://api-metadata/", "api-metadata#retrieve"),
                    abac("any", "gamedeals://user/*", "user#authenticate"),
                    abac("any", "gamedeals://game/*", "game#retrieve"),
                    abac("any", "gamedeals://deal/*", "deal#retrieve"),
                ],
            },
            PolicySetConfig {
                logical_name: String::from("members"),
                policy_type: String::from("p"),
                policies: vec![
                    abac("authenticated", "gamedeals://user/*", "user#retrieve_non_secure"),
                    abac("authenticated", "gamedeals://deal/", "deal#create"),
                ],
            },
            PolicySetConfig {
                logical_name: String::from("admin"),
                policy_type: String::from("p"),
                policies: vec![abac("role:admin", "*", "^.*$")],
            },
        ]
    }
}

impl PolicySetConfig {
    pub fn to_named_set(&self) -> Result<NamedPolicySet> {
        let policy_type: PolicyType = self
            .policy_type
            .parse()
            .with_context(|| format!("policy set '{}'", self.logical_name))?;

        let mut set = NamedPolicySet::new(self.logical_name.clone(), policy_type);
        for (idx, policy) in self.policies.iter().enumerate() {
            let policy = policy
                .to_policy()
                .with_context(|| format!("policy set '{}' #{idx}", self.logical_name))?;
            set.policies.push(policy);
        }
        set.tuples()
            .with_context(|| format!("policy set '{}'", self.logical_name))?;
        Ok(set)
    }
}

impl PolicyConfig {
    fn to_policy(&self) -> Result<Policy> {
        match self {
            PolicyConfig::Rbac {
                subject,
                object,
                action,
            } => Ok(Policy::rbac(
                subject.parse()?,
                object.parse()?,
                action.parse()?,
            )),
            PolicyConfig::Abac {
                subject_rule,
                object,
                action,
            } => Ok(Policy::abac(
                subject_rule.clone(),
                object.clone(),
                action.clone(),
            )),
        }
    }
}
