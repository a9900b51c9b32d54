use actix_web::http::Method;
use async_trait::async_trait;
use serde::de::IgnoredAny;
use serde::Serialize;

use crate::server::authz::action::MetadataAction;
use crate::server::authz::client::AuthorizationRequest;
use crate::server::authz::uri::{ResourceKind, ResourceUri};
use crate::server::response::{EndpointError, Response};

use super::{Authorization, Endpoint, EndpointRequest};

#[derive(Debug, Serialize)]
struct HealthResponse {
    ok: bool,
}

pub struct HealthEndpoint;

#[async_trait]
impl Endpoint for HealthEndpoint {
    type Body = IgnoredAny;
    type Resolved = ();

    fn method(&self) -> Method {
        Method::GET
    }

    fn path(&self) -> &'static str {
        "/api/v1/health"
    }

    async fn authorization(
        &self,
        _req: &EndpointRequest<IgnoredAny>,
    ) -> Result<Authorization<()>, EndpointError> {
        Ok(Authorization::require(AuthorizationRequest::single(
            ResourceUri::collection(ResourceKind::ApiMetadata),
            MetadataAction::Retrieve,
        )))
    }

    async fn handle(
        &self,
        _req: EndpointRequest<IgnoredAny>,
        _resolved: (),
    ) -> Result<Response, EndpointError> {
        Ok(Response::json(&HealthResponse { ok: true }))
    }
}
