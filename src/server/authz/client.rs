use std::sync::{Arc, RwLock};

use anyhow::{bail, Context, Result};
use log::{error, info, warn};
use tokio::sync::{Mutex, OnceCell};

use crate::server::db::PolicyRecord;

use super::action::AuthorizationAction;
use super::enforcer::Enforcer;
use super::errors::AuthzResult;
use super::policy::{NamedPolicySet, PolicyRulesets};
use super::store::PolicyStore;
use super::uri::{AuthorizationUri, ResourceUri};

/// Actions a caller wants to perform on one object.
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    pub uri: ResourceUri,
    pub actions: Vec<AuthorizationAction>,
}

impl AuthorizationRequest {
    pub fn new(uri: ResourceUri, actions: Vec<AuthorizationAction>) -> Self {
        Self { uri, actions }
    }

    pub fn single(uri: ResourceUri, action: impl Into<AuthorizationAction>) -> Self {
        Self::new(uri, vec![action.into()])
    }
}

/// Entry point for every authorization decision.
///
/// The enforcer is built from the policy store on the first decision (or on
/// [`AuthorizationClient::init`]). Concurrent first callers share a single
/// load; a failed load is not remembered, so the next caller retries it.
pub struct AuthorizationClient {
    store: Arc<dyn PolicyStore>,
    enforcer: OnceCell<RwLock<Enforcer>>,
    /// Held from the store write until the rebuilt enforcer is swapped in, so
    /// an older snapshot never replaces a newer one.
    writes: Mutex<()>,
}

impl AuthorizationClient {
    pub fn new(store: Arc<dyn PolicyStore>) -> Self {
        Self {
            store,
            enforcer: OnceCell::new(),
            writes: Mutex::new(()),
        }
    }

    pub async fn init(&self) -> Result<()> {
        self.enforcer().await?;
        Ok(())
    }

    async fn enforcer(&self) -> Result<&RwLock<Enforcer>> {
        self.enforcer
            .get_or_try_init(|| async {
                let enforcer = self.build_enforcer().await?;
                Ok::<_, anyhow::Error>(RwLock::new(enforcer))
            })
            .await
    }

    async fn build_enforcer(&self) -> Result<Enforcer> {
        let rulesets = self
            .store
            .load_policies()
            .await
            .context("load authorization policies")?;
        let enforcer = Enforcer::new(&rulesets)
            .await
            .context("build authorization enforcer")?;
        info!(
            "Authorization enforcer loaded with {} permission rules and {} role memberships",
            enforcer.rules_len(),
            enforcer.groupings_len()
        );
        Ok(enforcer)
    }

    /// True iff `subject` may perform every action of every request. An empty
    /// request list is vacuously allowed; callers decide what that means.
    pub async fn is_allowed(
        &self,
        subject: &ResourceUri,
        requests: &[AuthorizationRequest],
    ) -> Result<bool> {
        let lock = self.enforcer().await?;
        let enforcer = match lock.read() {
            Ok(enforcer) => enforcer,
            Err(e) => bail!("authorization enforcer lock poisoned: {e}"),
        };

        let subject_str = subject.to_string();
        for req in requests.iter() {
            if req.actions.is_empty() {
                warn!("Deny {subject}: request for {} has no actions", req.uri);
                return Ok(false);
            }

            let object = req.uri.to_string();
            for action in req.actions.iter().copied() {
                let target = AuthorizationUri::new(req.uri.clone(), Some(action));
                if action.kind() != req.uri.kind() {
                    error!("Deny {subject} on {target}: action {action} does not apply to this kind");
                    return Ok(false);
                }
                if !enforcer.enforce(&subject_str, &object, &action.to_string())? {
                    info!("Deny {subject} on {target}");
                    return Ok(false);
                }
            }
        }

        Ok(true)
    }

    /// Checks that the enforcer could be built from `set`, so a stored set
    /// never breaks the next load.
    pub fn validate_policies(set: &NamedPolicySet) -> AuthzResult<()> {
        let mut rulesets = PolicyRulesets::new();
        rulesets.insert(set.policy_type, set.tuples()?);
        Enforcer::compile(&rulesets)?;
        Ok(())
    }

    /// Writes the set through the store and reloads the enforcer so the next
    /// decision sees the new rows.
    pub async fn add_named_policies(&self, set: &NamedPolicySet) -> Result<usize> {
        Self::validate_policies(set)
            .with_context(|| format!("invalid policy set '{}'", set.logical_name))?;

        let _guard = self.writes.lock().await;
        let added = self.store.add_named_policies(set).await?;
        if added == 0 {
            return Ok(added);
        }

        let lock = self.enforcer().await?;
        let enforcer = self.build_enforcer().await?;
        match lock.write() {
            Ok(mut current) => *current = enforcer,
            Err(e) => bail!("authorization enforcer lock poisoned: {e}"),
        }
        Ok(added)
    }

    pub async fn list_policies(&self) -> Result<Vec<PolicyRecord>> {
        self.store.list_policies().await
    }
}
