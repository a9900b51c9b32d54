use std::sync::Arc;

use actix_web::http::Method;
use async_trait::async_trait;
use log::info;
use serde::Serialize;

use crate::server::authz::action::{PolicyAction, UserAction};
use crate::server::authz::client::AuthorizationRequest;
use crate::server::authz::policy::{
    NamedPolicySet, Policy, PolicyType, ADMIN_MEMBERS_SET, ADMIN_ROLE,
};
use crate::server::authz::uri::{ResourceKind, ResourceUri};
use crate::server::response::{EndpointError, Response};

use super::user::{create_invited_user, CreateUserRequest};
use super::{Authorization, Endpoint, EndpointContext, EndpointRequest};

#[derive(Debug, Serialize)]
struct CreateAdminResponse {
    new_admin_id: u64,
}

/// Creates an invited user and makes them a member of the admin role.
pub struct CreateAdminEndpoint {
    ctx: Arc<EndpointContext>,
}

impl CreateAdminEndpoint {
    pub fn new(ctx: Arc<EndpointContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Endpoint for CreateAdminEndpoint {
    type Body = CreateUserRequest;
    type Resolved = ();

    fn method(&self) -> Method {
        Method::POST
    }

    fn path(&self) -> &'static str {
        "/api/v1/admin"
    }

    async fn authorization(
        &self,
        _req: &EndpointRequest<CreateUserRequest>,
    ) -> Result<Authorization<()>, EndpointError> {
        Ok(Authorization::new(
            vec![
                AuthorizationRequest::single(
                    ResourceUri::collection(ResourceKind::User),
                    UserAction::Create,
                ),
                AuthorizationRequest::single(
                    ResourceUri::collection(ResourceKind::AuthorizationPolicy),
                    PolicyAction::Create,
                ),
            ],
            (),
        ))
    }

    async fn handle(
        &self,
        req: EndpointRequest<CreateUserRequest>,
        _resolved: (),
    ) -> Result<Response, EndpointError> {
        let user = create_invited_user(&self.ctx.db, &req.body)?;

        let member = ResourceUri::instance(ResourceKind::User, user.id);
        let set = NamedPolicySet::new(ADMIN_MEMBERS_SET, PolicyType::Grouping)
            .with(Policy::role_membership(member, ADMIN_ROLE));
        self.ctx.authz.add_named_policies(&set).await?;
        info!("User {} is now a member of role {ADMIN_ROLE}", user.id);

        Ok(Response::json(&CreateAdminResponse {
            new_admin_id: user.id,
        }))
    }
}

#[cfg(test)]
mod tests {
    use actix_web::http::StatusCode;
    use actix_web::{test, App};
    use serde_json::json;

    use crate::server::endpoints::register;
    use crate::server::endpoints::tests::{bearer, create_user, pipeline, read_json, setup};

    use super::*;

    #[actix_web::test]
    async fn test_create_admin() {
        let ctx = setup().await;
        let pipeline = pipeline(&ctx);
        let app = test::init_service(
            App::new()
                .configure(|cfg| register(cfg, &pipeline, CreateAdminEndpoint::new(ctx.clone()))),
        )
        .await;

        let root = create_user(&ctx, "root", "root-password");
        let set = NamedPolicySet::new(ADMIN_MEMBERS_SET, PolicyType::Grouping).with(
            Policy::role_membership(ResourceUri::instance(ResourceKind::User, root.id), ADMIN_ROLE),
        );
        ctx.authz.add_named_policies(&set).await.unwrap();

        let alice = create_user(&ctx, "alice", "alice-password");
        let body = json!({"username": "bob", "invite_password": "bob-invite"});

        let req = test::TestRequest::post()
            .uri("/api/v1/admin")
            .insert_header(bearer(&ctx, &alice))
            .set_json(&body)
            .to_request();
        let (status, _) = read_json(test::call_service(&app, req).await).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let req = test::TestRequest::post()
            .uri("/api/v1/admin")
            .insert_header(bearer(&ctx, &root))
            .set_json(&body)
            .to_request();
        let (status, resp) = read_json(test::call_service(&app, req).await).await;
        assert_eq!(status, StatusCode::OK);
        let bob_id = resp["new_admin_id"].as_u64().unwrap();

        // The new admin can create admins too.
        let bob = ctx
            .db
            .with_transaction(|tx| tx.get_user(bob_id))
            .unwrap()
            .unwrap();
        assert!(bob.must_reset_password);
        let req = test::TestRequest::post()
            .uri("/api/v1/admin")
            .insert_header(bearer(&ctx, &bob))
            .set_json(json!({"username": "carol", "invite_password": "carol-invite"}))
            .to_request();
        let (status, _) = read_json(test::call_service(&app, req).await).await;
        assert_eq!(status, StatusCode::OK);
    }
}
