use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::info;

use crate::server::db::{Database, PolicyRecord};

use super::policy::{NamedPolicySet, PolicyRulesets, PolicyTuple, PolicyType};

/// Persistence for authorization policies.
#[async_trait]
pub trait PolicyStore: Send + Sync {
    /// All stored tuples grouped by type, each group in insertion order.
    /// Fails on any row the engine could not understand.
    async fn load_policies(&self) -> Result<PolicyRulesets>;

    /// Stores every policy of the set, returns how many rows were new.
    /// Rows identical to a stored `(policy_type, tuple)` are skipped.
    async fn add_named_policies(&self, set: &NamedPolicySet) -> Result<usize>;

    async fn list_policies(&self) -> Result<Vec<PolicyRecord>>;
}

pub struct DbPolicyStore {
    db: Arc<Database>,
}

impl DbPolicyStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl PolicyStore for DbPolicyStore {
    async fn load_policies(&self) -> Result<PolicyRulesets> {
        let records = self.db.with_transaction(|tx| tx.list_policies())?;

        let mut rulesets = PolicyRulesets::new();
        for record in records {
            let policy_type: PolicyType = record
                .policy_type
                .parse()
                .with_context(|| format!("load policy row {}", record.id))?;
            let tuple = PolicyTuple::try_from(record.policy)
                .with_context(|| format!("load policy row {}", record.id))?;
            rulesets.entry(policy_type).or_default().push(tuple);
        }
        Ok(rulesets)
    }

    async fn add_named_policies(&self, set: &NamedPolicySet) -> Result<usize> {
        let tuples = set
            .tuples()
            .with_context(|| format!("invalid policy set '{}'", set.logical_name))?;

        let added = self.db.with_transaction(|tx| {
            let mut added = 0;
            for tuple in tuples {
                let record = PolicyRecord {
                    id: 0,
                    logical_name: set.logical_name.clone(),
                    policy_type: set.policy_type.to_string(),
                    policy: tuple.into(),
                };
                if tx.create_policy(&record)? {
                    added += 1;
                }
            }
            Ok(added)
        })?;

        if added > 0 {
            info!(
                "Stored {added} new '{}' policies for '{}'",
                set.policy_type, set.logical_name
            );
        }
        Ok(added)
    }

    async fn list_policies(&self) -> Result<Vec<PolicyRecord>> {
        self.db.with_transaction(|tx| tx.list_policies())
    }
}

#[cfg(test)]
mod tests {
    use crate::server::authz::action::{DealAction, UserAction};
    use crate::server::authz::policy::Policy;
    use crate::server::authz::uri::{ResourceKind, ResourceUri};

    use super::*;

    fn signup_set() -> NamedPolicySet {
        NamedPolicySet::new("signup", PolicyType::Permission)
            .with(Policy::rbac(
                ResourceUri::untrusted_user(),
                ResourceUri::collection(ResourceKind::User),
                UserAction::Create.into(),
            ))
            .with(Policy::abac("any", "gamedeals://deal/*", "deal#retrieve"))
    }

    #[tokio::test]
    async fn test_add_and_load() {
        let store = DbPolicyStore::new(Arc::new(Database::new_test()));
        assert!(store.load_policies().await.unwrap().is_empty());

        assert_eq!(store.add_named_policies(&signup_set()).await.unwrap(), 2);
        // Idempotent.
        assert_eq!(store.add_named_policies(&signup_set()).await.unwrap(), 0);

        let admins = NamedPolicySet::new("admins", PolicyType::Grouping).with(
            Policy::role_membership(ResourceUri::instance(ResourceKind::User, 1), "admin"),
        );
        assert_eq!(store.add_named_policies(&admins).await.unwrap(), 1);

        let editors = NamedPolicySet::new("editors", PolicyType::Permission).with(Policy::rbac(
            ResourceUri::role("admin"),
            ResourceUri::wildcard(ResourceKind::Deal),
            DealAction::Create.into(),
        ));
        assert_eq!(store.add_named_policies(&editors).await.unwrap(), 1);

        let rulesets = store.load_policies().await.unwrap();
        let p = &rulesets[&PolicyType::Permission];
        assert_eq!(p.len(), 3);
        assert_eq!(p[0].subject(), "gamedeals://untrusted-user/");
        assert_eq!(p[1].subject(), "any");
        assert_eq!(p[2].action(), "deal#create");
        let g = &rulesets[&PolicyType::Grouping];
        assert_eq!(g.len(), 1);
        assert_eq!(g[0].object(), "gamedeals://role/admin");

        let records = store.list_policies().await.unwrap();
        assert_eq!(records.len(), 4);
        assert_eq!(records[2].logical_name, "admins");
    }

    #[tokio::test]
    async fn test_invalid_set_stores_nothing() {
        let store = DbPolicyStore::new(Arc::new(Database::new_test()));
        let set = signup_set().with(Policy::abac("any", " ", "deal#retrieve"));
        assert!(store.add_named_policies(&set).await.is_err());
        assert!(store.list_policies().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_load_rejects_unknown_type() {
        let db = Arc::new(Database::new_test());
        db.with_transaction(|tx| {
            tx.create_policy(&PolicyRecord {
                id: 0,
                logical_name: String::from("legacy"),
                policy_type: String::from("g2"),
                policy: vec![
                    String::from("a"),
                    String::from("b"),
                    String::from("c"),
                ],
            })
        })
        .unwrap();

        let store = DbPolicyStore::new(db);
        assert!(store.load_policies().await.is_err());
    }
}
