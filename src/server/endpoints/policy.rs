use std::sync::Arc;

use actix_web::http::Method;
use async_trait::async_trait;
use log::info;
use serde::de::IgnoredAny;
use serde::Serialize;

use crate::server::authz::action::PolicyAction;
use crate::server::authz::client::{AuthorizationClient, AuthorizationRequest};
use crate::server::authz::config::PolicySetConfig;
use crate::server::authz::uri::{ResourceKind, ResourceUri};
use crate::server::response::{EndpointError, Response};

use super::{Authorization, Endpoint, EndpointContext, EndpointRequest};

#[derive(Debug, Serialize)]
struct PolicyRow {
    id: u64,
    logical_name: String,
    policy_type: String,
    policy: Vec<String>,
}

#[derive(Debug, Serialize)]
struct ListPoliciesResponse {
    policies: Vec<PolicyRow>,
}

pub struct ListPoliciesEndpoint {
    ctx: Arc<EndpointContext>,
}

impl ListPoliciesEndpoint {
    pub fn new(ctx: Arc<EndpointContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Endpoint for ListPoliciesEndpoint {
    type Body = IgnoredAny;
    type Resolved = ();

    fn method(&self) -> Method {
        Method::GET
    }

    fn path(&self) -> &'static str {
        "/api/v1/authorization/policy"
    }

    async fn authorization(
        &self,
        _req: &EndpointRequest<IgnoredAny>,
    ) -> Result<Authorization<()>, EndpointError> {
        Ok(Authorization::require(AuthorizationRequest::single(
            ResourceUri::wildcard(ResourceKind::AuthorizationPolicy),
            PolicyAction::Retrieve,
        )))
    }

    async fn handle(
        &self,
        _req: EndpointRequest<IgnoredAny>,
        _resolved: (),
    ) -> Result<Response, EndpointError> {
        let policies = self
            .ctx
            .authz
            .list_policies()
            .await?
            .into_iter()
            .map(|record| PolicyRow {
                id: record.id,
                logical_name: record.logical_name,
                policy_type: record.policy_type,
                policy: record.policy,
            })
            .collect();
        Ok(Response::json(&ListPoliciesResponse { policies }))
    }
}

#[derive(Debug, Serialize)]
struct AddPoliciesResponse {
    added: usize,
}

/// Stores a named policy set, same shape as the `authz.policies` config
/// entries. Takes effect for the next decision.
pub struct AddPoliciesEndpoint {
    ctx: Arc<EndpointContext>,
}

impl AddPoliciesEndpoint {
    pub fn new(ctx: Arc<EndpointContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Endpoint for AddPoliciesEndpoint {
    type Body = PolicySetConfig;
    type Resolved = ();

    fn method(&self) -> Method {
        Method::POST
    }

    fn path(&self) -> &'static str {
        "/api/v1/authorization/policy"
    }

    async fn authorization(
        &self,
        _req: &EndpointRequest<PolicySetConfig>,
    ) -> Result<Authorization<()>, EndpointError> {
        Ok(Authorization::require(AuthorizationRequest::single(
            ResourceUri::collection(ResourceKind::AuthorizationPolicy),
            PolicyAction::Create,
        )))
    }

    async fn handle(
        &self,
        req: EndpointRequest<PolicySetConfig>,
        _resolved: (),
    ) -> Result<Response, EndpointError> {
        let set = req
            .body
            .to_named_set()
            .map_err(|e| EndpointError::bad_request(format!("invalid policy set: {e:#}")))?;
        AuthorizationClient::validate_policies(&set)
            .map_err(|e| EndpointError::bad_request(format!("invalid policy set: {e}")))?;

        let added = self.ctx.authz.add_named_policies(&set).await?;
        info!(
            "Stored {added} new policies for set '{}' ({})",
            set.logical_name, set.policy_type
        );
        Ok(Response::json(&AddPoliciesResponse { added }))
    }
}
