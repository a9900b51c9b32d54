use std::sync::Arc;

use actix_web::http::Method;
use async_trait::async_trait;
use chrono::Utc;
use log::info;
use serde::de::IgnoredAny;
use serde::{Deserialize, Serialize};

use crate::server::authz::action::UserAction;
use crate::server::authz::client::AuthorizationRequest;
use crate::server::authz::uri::{ResourceKind, ResourceUri};
use crate::server::db::{Database, UserRecord};
use crate::server::password::{check_password_requirements, hash_password};
use crate::server::response::{EndpointError, ErrorCode, Response};

use super::{Authorization, Endpoint, EndpointContext, EndpointRequest};

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,

    /// First-login password. The new user must change it when logging in.
    pub invite_password: String,
}

#[derive(Debug, Serialize)]
struct CreateUserResponse {
    new_user_id: u64,
}

/// Stores a user that has to reset the invite password on first login.
pub fn create_invited_user(
    db: &Database,
    req: &CreateUserRequest,
) -> Result<UserRecord, EndpointError> {
    let username = req.username.trim();
    if username.is_empty() {
        return Err(EndpointError::bad_request("username cannot be empty"));
    }
    if let Some(reason) = check_password_requirements(username, &req.invite_password) {
        return Err(EndpointError::bad_request(format!(
            "failed to create new user: invite password is not allowed: {reason}"
        ))
        .with_code(ErrorCode::NotMeetPasswordRequirements));
    }

    let password_hash = hash_password(&req.invite_password);
    let now = Utc::now().timestamp() as u64;
    let user = db.with_transaction(|tx| {
        if tx.get_user_by_name(username)?.is_some() {
            return Ok(None);
        }
        let user = tx.create_user(UserRecord {
            id: 0,
            username: username.to_string(),
            password_hash,
            must_reset_password: true,
            create_time: now,
            update_time: now,
        })?;
        Ok(Some(user))
    })?;

    match user {
        Some(user) => {
            info!("Created user {} '{}'", user.id, user.username);
            Ok(user)
        }
        None => Err(EndpointError::bad_request(format!(
            "user '{username}' already exists"
        ))),
    }
}

pub struct CreateUserEndpoint {
    ctx: Arc<EndpointContext>,
}

impl CreateUserEndpoint {
    pub fn new(ctx: Arc<EndpointContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Endpoint for CreateUserEndpoint {
    type Body = CreateUserRequest;
    type Resolved = ();

    fn method(&self) -> Method {
        Method::POST
    }

    fn path(&self) -> &'static str {
        "/api/v1/user"
    }

    async fn authorization(
        &self,
        _req: &EndpointRequest<CreateUserRequest>,
    ) -> Result<Authorization<()>, EndpointError> {
        Ok(Authorization::require(AuthorizationRequest::single(
            ResourceUri::collection(ResourceKind::User),
            UserAction::Create,
        )))
    }

    async fn handle(
        &self,
        req: EndpointRequest<CreateUserRequest>,
        _resolved: (),
    ) -> Result<Response, EndpointError> {
        let user = create_invited_user(&self.ctx.db, &req.body)?;
        Ok(Response::json(&CreateUserResponse {
            new_user_id: user.id,
        }))
    }
}

#[derive(Debug, Deserialize)]
struct ListUsersQuery {
    /// Comma separated user ids. Absent means every user.
    #[serde(default)]
    id: Option<String>,
}

#[derive(Debug, Serialize)]
struct UserNonSecure {
    id: u64,
    username: String,
}

#[derive(Debug, Serialize)]
struct ListUsersResponse {
    users: Vec<UserNonSecure>,
}

/// Non-secure details of the users named by `?id=1,2`, or of everyone.
/// Sorted by id.
pub struct ListUsersEndpoint {
    ctx: Arc<EndpointContext>,
}

impl ListUsersEndpoint {
    pub fn new(ctx: Arc<EndpointContext>) -> Self {
        Self { ctx }
    }

    fn parse_ids(raw: &str) -> Result<Vec<u64>, EndpointError> {
        let mut ids = Vec::new();
        for part in raw.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let id: u64 = part
                .parse()
                .map_err(|_| EndpointError::bad_request(format!("invalid user id '{part}'")))?;
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        Ok(ids)
    }
}

#[async_trait]
impl Endpoint for ListUsersEndpoint {
    type Body = IgnoredAny;
    type Resolved = Vec<u64>;

    fn method(&self) -> Method {
        Method::GET
    }

    fn path(&self) -> &'static str {
        "/api/v1/user"
    }

    async fn authorization(
        &self,
        req: &EndpointRequest<IgnoredAny>,
    ) -> Result<Authorization<Vec<u64>>, EndpointError> {
        let query: ListUsersQuery = req.query()?;
        let ids = match query.id {
            Some(raw) => Self::parse_ids(&raw)?,
            None => Vec::new(),
        };

        let requests = if ids.is_empty() {
            vec![AuthorizationRequest::single(
                ResourceUri::wildcard(ResourceKind::User),
                UserAction::RetrieveNonSecure,
            )]
        } else {
            ids.iter()
                .map(|id| {
                    AuthorizationRequest::single(
                        ResourceUri::instance(ResourceKind::User, *id),
                        UserAction::RetrieveNonSecure,
                    )
                })
                .collect()
        };
        Ok(Authorization::new(requests, ids))
    }

    async fn handle(
        &self,
        _req: EndpointRequest<IgnoredAny>,
        ids: Vec<u64>,
    ) -> Result<Response, EndpointError> {
        let users = self.ctx.db.with_transaction(|tx| tx.list_users(&ids))?;
        let users = users
            .into_iter()
            .map(|user| UserNonSecure {
                id: user.id,
                username: user.username,
            })
            .collect();
        Ok(Response::json(&ListUsersResponse { users }))
    }
}
