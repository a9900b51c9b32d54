//! HTTP endpoints and the pipeline in front of them.
//!
//! Every endpoint is served in two phases. [`Endpoint::authorization`]
//! describes what the caller wants to do, the [`Pipeline`] asks the
//! authorization client whether that is allowed, and only then
//! [`Endpoint::handle`] runs. An endpoint that declares nothing is denied.

pub mod admin;
pub mod auth;
pub mod deal;
pub mod game;
pub mod health;
pub mod policy;
pub mod user;

use std::sync::Arc;

use actix_web::http::Method;
use actix_web::web::{self, Bytes};
use actix_web::{HttpRequest, HttpResponse};
use async_trait::async_trait;
use log::{error, info, warn};
use serde::de::DeserializeOwned;

use crate::server::authn::token::jwt::JwtTokenGenerator;
use crate::server::authn::{Authenticator, AuthnResponse};
use crate::server::authz::client::{AuthorizationClient, AuthorizationRequest};
use crate::server::authz::uri::{ResourceKind, ResourceUri};
use crate::server::db::{Database, UserRecord};
use crate::server::response::{EndpointError, Response};

/// Items per page of the listing endpoints.
pub const PAGE_SIZE: u64 = 20;

/// Trims a page fetched with `PAGE_SIZE + 1` rows and returns the offset of
/// the next page, `-1` when this is the last one.
pub fn paginate<T>(items: &mut Vec<T>, offset: u64) -> i64 {
    if items.len() as u64 > PAGE_SIZE {
        items.truncate(PAGE_SIZE as usize);
        (offset + PAGE_SIZE) as i64
    } else {
        -1
    }
}

/// Shared state handed to every endpoint.
pub struct EndpointContext {
    pub db: Arc<Database>,
    pub authz: Arc<AuthorizationClient>,
    pub tokens: JwtTokenGenerator,
}

pub struct EndpointRequest<B> {
    /// `None` for the untrusted user.
    pub user: Option<UserRecord>,
    pub body: B,
    query_string: String,
}

impl<B> EndpointRequest<B> {
    pub fn new(user: Option<UserRecord>, body: B, query_string: impl Into<String>) -> Self {
        Self {
            user,
            body,
            query_string: query_string.into(),
        }
    }

    pub fn query<T: DeserializeOwned>(&self) -> Result<T, EndpointError> {
        web::Query::<T>::from_query(&self.query_string)
            .map(web::Query::into_inner)
            .map_err(|e| EndpointError::bad_request(format!("invalid query parameters: {e}")))
    }

    /// The caller, for handlers that cannot serve the untrusted user.
    pub fn require_user(&self) -> Result<&UserRecord, EndpointError> {
        self.user
            .as_ref()
            .ok_or_else(|| EndpointError::unauthenticated("authentication required"))
    }
}

/// What an endpoint needs allowed, plus whatever it looked up to decide
/// that. `resolved` is passed on to [`Endpoint::handle`].
pub struct Authorization<R> {
    pub requests: Vec<AuthorizationRequest>,
    pub resolved: R,
}

impl<R> Authorization<R> {
    pub fn new(requests: Vec<AuthorizationRequest>, resolved: R) -> Self {
        Self { requests, resolved }
    }

    /// Declares nothing, which the pipeline always denies.
    pub fn deny(resolved: R) -> Self {
        Self::new(Vec::new(), resolved)
    }
}

impl Authorization<()> {
    pub fn require(request: AuthorizationRequest) -> Self {
        Self::new(vec![request], ())
    }
}

#[async_trait]
pub trait Endpoint: Send + Sync + 'static {
    /// Parsed from the JSON body. An empty body is parsed as `null`.
    type Body: DeserializeOwned + Send + Sync;
    type Resolved: Send;

    fn method(&self) -> Method;

    fn path(&self) -> &'static str;

    async fn authorization(
        &self,
        req: &EndpointRequest<Self::Body>,
    ) -> Result<Authorization<Self::Resolved>, EndpointError>;

    async fn handle(
        &self,
        req: EndpointRequest<Self::Body>,
        resolved: Self::Resolved,
    ) -> Result<Response, EndpointError>;
}

pub struct Pipeline {
    authn: Box<dyn Authenticator>,
    authz: Arc<AuthorizationClient>,
}

impl Pipeline {
    pub fn new(authn: Box<dyn Authenticator>, authz: Arc<AuthorizationClient>) -> Self {
        Self { authn, authz }
    }

    pub async fn serve<E: Endpoint>(
        &self,
        endpoint: &E,
        req: &HttpRequest,
        body: &[u8],
    ) -> Response {
        match self.run(endpoint, req, body).await {
            Ok(resp) => resp,
            Err(err) => err.into(),
        }
    }

    async fn run<E: Endpoint>(
        &self,
        endpoint: &E,
        req: &HttpRequest,
        body: &[u8],
    ) -> Result<Response, EndpointError> {
        let user = self.identify(req);
        let subject = match user.as_ref() {
            Some(user) => ResourceUri::instance(ResourceKind::User, user.id),
            None => ResourceUri::untrusted_user(),
        };

        let body: &[u8] = if body.is_empty() { b"null" } else { body };
        let body: E::Body = serde_json::from_slice(body)
            .map_err(|e| EndpointError::bad_request(format!("invalid request body: {e}")))?;
        let request = EndpointRequest::new(user, body, req.query_string());

        let authorization = endpoint.authorization(&request).await?;
        if authorization.requests.is_empty() {
            info!(
                "Deny {subject} on {} {}: no authorization requirements",
                endpoint.method(),
                endpoint.path()
            );
            return Err(EndpointError::unauthorized());
        }

        match self
            .authz
            .is_allowed(&subject, &authorization.requests)
            .await
        {
            Ok(true) => {}
            Ok(false) => return Err(EndpointError::unauthorized()),
            Err(e) => {
                error!("Authorization check for {subject} failed: {e:#}");
                return Err(EndpointError::unauthorized());
            }
        }

        endpoint.handle(request, authorization.resolved).await
    }

    fn identify(&self, req: &HttpRequest) -> Option<UserRecord> {
        match self.authn.authenticate_request(req) {
            Ok(AuthnResponse::Ok(user)) => Some(user),
            Ok(AuthnResponse::Continue) => None,
            Ok(AuthnResponse::Unauthenticated) => {
                warn!(
                    "Invalid credentials on {} {}, serving as untrusted user",
                    req.method(),
                    req.path()
                );
                None
            }
            Err(e) => {
                warn!("Resolve identity failed, serving as untrusted user: {e:#}");
                None
            }
        }
    }
}

/// Registers every endpoint on `cfg`.
pub fn configure(
    cfg: &mut web::ServiceConfig,
    ctx: &Arc<EndpointContext>,
    pipeline: &Arc<Pipeline>,
) {
    register(cfg, pipeline, health::HealthEndpoint);
    register(cfg, pipeline, auth::LoginEndpoint::new(ctx.clone()));
    register(cfg, pipeline, user::CreateUserEndpoint::new(ctx.clone()));
    register(cfg, pipeline, user::ListUsersEndpoint::new(ctx.clone()));
    register(cfg, pipeline, admin::CreateAdminEndpoint::new(ctx.clone()));
    register(cfg, pipeline, game::CreateGameEndpoint::new(ctx.clone()));
    register(cfg, pipeline, game::ListGamesEndpoint::new(ctx.clone()));
    register(cfg, pipeline, deal::CreateDealEndpoint::new(ctx.clone()));
    register(cfg, pipeline, deal::ListDealsEndpoint::new(ctx.clone()));
    register(cfg, pipeline, policy::ListPoliciesEndpoint::new(ctx.clone()));
    register(cfg, pipeline, policy::AddPoliciesEndpoint::new(ctx.clone()));
}

pub fn register<E: Endpoint>(cfg: &mut web::ServiceConfig, pipeline: &Arc<Pipeline>, endpoint: E) {
    let method = endpoint.method();
    let path = endpoint.path();
    let endpoint = Arc::new(endpoint);
    let pipeline = pipeline.clone();
    cfg.route(
        path,
        web::method(method).to(move |req: HttpRequest, body: Bytes| {
            let endpoint = endpoint.clone();
            let pipeline = pipeline.clone();
            async move {
                let resp = pipeline.serve(endpoint.as_ref(), &req, &body).await;
                HttpResponse::from(resp)
            }
        }),
    );
}

#[cfg(test)]
pub mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use actix_web::body::to_bytes;
    use actix_web::dev::ServiceResponse;
    use actix_web::http::StatusCode;
    use actix_web::{test, App};
    use anyhow::bail;
    use serde_json::Value;

    use crate::server::authn::bearer_token::BearerTokenAuthenticator;
    use crate::server::authn::token::jwt::JwtTokenValidator;
    use crate::server::authn::token::TokenGenerator;
    use crate::server::authz::action::{GameAction, MetadataAction};
    use crate::server::authz::config::{AuthzConfig, PolicySetConfig};
    use crate::server::authz::policy::{NamedPolicySet, PolicyRulesets};
    use crate::server::authz::store::{DbPolicyStore, PolicyStore};
    use crate::server::db::PolicyRecord;
    use crate::server::password::hash_password;

    use super::*;

    pub const SECRET: &[u8] = b"endpoint-test-secret";

    /// In-memory server state with the default policies stored.
    pub async fn setup() -> Arc<EndpointContext> {
        setup_with(AuthzConfig::default_policies()).await
    }

    pub async fn setup_with(policies: Vec<PolicySetConfig>) -> Arc<EndpointContext> {
        let db = Arc::new(Database::new_test());
        let authz = Arc::new(AuthorizationClient::new(Arc::new(DbPolicyStore::new(
            db.clone(),
        ))));
        for set in policies {
            authz
                .add_named_policies(&set.to_named_set().unwrap())
                .await
                .unwrap();
        }
        authz.init().await.unwrap();

        Arc::new(EndpointContext {
            db,
            authz,
            tokens: JwtTokenGenerator::new(SECRET, 3600).unwrap(),
        })
    }

    pub fn pipeline(ctx: &Arc<EndpointContext>) -> Arc<Pipeline> {
        let authn = BearerTokenAuthenticator::new(
            JwtTokenValidator::new(SECRET).unwrap(),
            ctx.db.clone(),
        );
        Arc::new(Pipeline::new(Box::new(authn), ctx.authz.clone()))
    }

    pub fn create_user(ctx: &EndpointContext, username: &str, password: &str) -> UserRecord {
        ctx.db
            .with_transaction(|tx| {
                tx.create_user(UserRecord {
                    id: 0,
                    username: username.to_string(),
                    password_hash: hash_password(password),
                    must_reset_password: false,
                    create_time: 0,
                    update_time: 0,
                })
            })
            .unwrap()
    }

    pub fn bearer(ctx: &EndpointContext, user: &UserRecord) -> (&'static str, String) {
        let token = ctx.tokens.generate_token(user.id).unwrap().auth_token;
        ("Authorization", format!("Bearer {token}"))
    }

    pub async fn read_json(resp: ServiceResponse) -> (StatusCode, Value) {
        let status = resp.status();
        let body = to_bytes(resp.into_body()).await.unwrap();
        let value = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body).unwrap()
        };
        (status, value)
    }

    struct SpyEndpoint {
        requests: Vec<AuthorizationRequest>,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Endpoint for SpyEndpoint {
        type Body = serde::de::IgnoredAny;
        type Resolved = ();

        fn method(&self) -> Method {
            Method::POST
        }

        fn path(&self) -> &'static str {
            "/spy"
        }

        async fn authorization(
            &self,
            _req: &EndpointRequest<Self::Body>,
        ) -> Result<Authorization<()>, EndpointError> {
            Ok(Authorization::new(self.requests.clone(), ()))
        }

        async fn handle(
            &self,
            _req: EndpointRequest<Self::Body>,
            _resolved: (),
        ) -> Result<Response, EndpointError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Response::json(&"called"))
        }
    }

    async fn call_spy(
        requests: Vec<AuthorizationRequest>,
        body: &str,
    ) -> (StatusCode, Value, usize) {
        call_spy_with(setup().await, requests, body).await
    }

    async fn call_spy_with(
        ctx: Arc<EndpointContext>,
        requests: Vec<AuthorizationRequest>,
        body: &str,
    ) -> (StatusCode, Value, usize) {
        let calls = Arc::new(AtomicUsize::new(0));
        let spy = SpyEndpoint {
            requests,
            calls: calls.clone(),
        };
        let pipeline = pipeline(&ctx);
        let app =
            test::init_service(App::new().configure(|cfg| register(cfg, &pipeline, spy))).await;

        let req = test::TestRequest::post()
            .uri("/spy")
            .set_payload(body.to_string())
            .to_request();
        let (status, value) = read_json(test::call_service(&app, req).await).await;
        (status, value, calls.load(Ordering::SeqCst))
    }

    #[::core::prelude::v1::test]
    fn test_paginate() {
        let mut items: Vec<u64> = (0..=PAGE_SIZE).collect();
        assert_eq!(paginate(&mut items, 40), 60);
        assert_eq!(items.len() as u64, PAGE_SIZE);

        let mut items: Vec<u64> = (0..PAGE_SIZE).collect();
        assert_eq!(paginate(&mut items, 0), -1);
        assert_eq!(items.len() as u64, PAGE_SIZE);

        let mut items: Vec<u64> = vec![];
        assert_eq!(paginate(&mut items, 0), -1);
    }

    #[actix_web::test]
    async fn test_empty_authorization_denied() {
        let (status, body, calls) = call_spy(vec![], "").await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body, serde_json::json!({"error": "unauthorized."}));
        assert_eq!(calls, 0);
    }

    #[actix_web::test]
    async fn test_allowed_requirement_runs_handler() {
        let metadata = AuthorizationRequest::single(
            ResourceUri::collection(ResourceKind::ApiMetadata),
            MetadataAction::Retrieve,
        );
        let (status, body, calls) = call_spy(vec![metadata], "{\"any\": [1, 2]}").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, Value::String(String::from("called")));
        assert_eq!(calls, 1);
    }

    #[actix_web::test]
    async fn test_denied_requirement_skips_handler() {
        let create_game = AuthorizationRequest::single(
            ResourceUri::collection(ResourceKind::Game),
            GameAction::Create,
        );
        let (status, body, calls) = call_spy(vec![create_game], "").await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body, serde_json::json!({"error": "unauthorized."}));
        assert_eq!(calls, 0);
    }

    #[actix_web::test]
    async fn test_invalid_body() {
        let metadata = AuthorizationRequest::single(
            ResourceUri::collection(ResourceKind::ApiMetadata),
            MetadataAction::Retrieve,
        );
        let (status, _, calls) = call_spy(vec![metadata], "{not json").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(calls, 0);
    }

    #[actix_web::test]
    async fn test_invalid_token_is_untrusted() {
        let ctx = setup().await;
        let user = create_user(&ctx, "alice", "alice-password");
        let pipeline = pipeline(&ctx);
        let app = test::init_service(
            App::new().configure(|cfg| register(cfg, &pipeline, health::HealthEndpoint)),
        )
        .await;

        // Health is public, so a broken token still gets through.
        let req = test::TestRequest::get()
            .uri("/api/v1/health")
            .insert_header(("Authorization", "Bearer broken"))
            .to_request();
        let (status, _) = read_json(test::call_service(&app, req).await).await;
        assert_eq!(status, StatusCode::OK);

        let req = test::TestRequest::get()
            .uri("/api/v1/health")
            .insert_header(bearer(&ctx, &user))
            .to_request();
        let (status, body) = read_json(test::call_service(&app, req).await).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, serde_json::json!({"ok": true}));
    }

    struct UnavailableStore;

    #[async_trait]
    impl PolicyStore for UnavailableStore {
        async fn load_policies(&self) -> anyhow::Result<PolicyRulesets> {
            bail!("policy store unavailable")
        }

        async fn add_named_policies(&self, _set: &NamedPolicySet) -> anyhow::Result<usize> {
            bail!("policy store unavailable")
        }

        async fn list_policies(&self) -> anyhow::Result<Vec<PolicyRecord>> {
            bail!("policy store unavailable")
        }
    }

    #[actix_web::test]
    async fn test_engine_error_denied() {
        let ctx = setup().await;
        let ctx = Arc::new(EndpointContext {
            db: ctx.db.clone(),
            authz: Arc::new(AuthorizationClient::new(Arc::new(UnavailableStore))),
            tokens: JwtTokenGenerator::new(SECRET, 3600).unwrap(),
        });

        // Granted by the default policies, but the engine cannot be loaded.
        let metadata = AuthorizationRequest::single(
            ResourceUri::collection(ResourceKind::ApiMetadata),
            MetadataAction::Retrieve,
        );
        let (status, body, calls) = call_spy_with(ctx, vec![metadata], "").await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body, serde_json::json!({"error": "unauthorized."}));
        assert_eq!(calls, 0);
    }
}
