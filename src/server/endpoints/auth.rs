use std::sync::Arc;

use actix_web::http::Method;
use async_trait::async_trait;
use log::{debug, info};
use serde::Deserialize;

use crate::server::authn::token::TokenGenerator;
use crate::server::authz::action::UserAction;
use crate::server::authz::client::AuthorizationRequest;
use crate::server::authz::uri::{ResourceKind, ResourceUri};
use crate::server::db::UserRecord;
use crate::server::password::{check_password_requirements, hash_password, verify_password};
use crate::server::response::{EndpointError, ErrorCode, Response};

use super::{Authorization, Endpoint, EndpointContext, EndpointRequest};

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,

    /// Replaces the password on success. Required while the user must reset
    /// their password.
    #[serde(default)]
    pub new_password: Option<String>,
}

/// Exchanges a username and password for an API token.
///
/// The user is looked up before the password is checked so the
/// `user#authenticate` grant is enforced first. Unknown users, users without
/// the grant and wrong passwords all get the same denial.
pub struct LoginEndpoint {
    ctx: Arc<EndpointContext>,
}

impl LoginEndpoint {
    pub fn new(ctx: Arc<EndpointContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Endpoint for LoginEndpoint {
    type Body = LoginRequest;
    type Resolved = Option<UserRecord>;

    fn method(&self) -> Method {
        Method::POST
    }

    fn path(&self) -> &'static str {
        "/api/v1/auth/login"
    }

    async fn authorization(
        &self,
        req: &EndpointRequest<LoginRequest>,
    ) -> Result<Authorization<Option<UserRecord>>, EndpointError> {
        let username = req.body.username.as_str();
        let user = self
            .ctx
            .db
            .with_transaction(|tx| tx.get_user_by_name(username))?;

        let Some(user) = user else {
            debug!("Login for unknown user '{username}'");
            return Ok(Authorization::deny(None));
        };

        let request = AuthorizationRequest::single(
            ResourceUri::instance(ResourceKind::User, user.id),
            UserAction::Authenticate,
        );
        Ok(Authorization::new(vec![request], Some(user)))
    }

    async fn handle(
        &self,
        req: EndpointRequest<LoginRequest>,
        resolved: Option<UserRecord>,
    ) -> Result<Response, EndpointError> {
        let Some(user) = resolved else {
            return Err(EndpointError::unauthorized());
        };
        let body = req.body;

        if !verify_password(&body.password, &user.password_hash)? {
            info!("Login for user {} rejected: wrong password", user.id);
            return Err(EndpointError::unauthorized());
        }

        match body.new_password {
            Some(new_password) => {
                if new_password == body.password {
                    return Err(EndpointError::bad_request(
                        "new password cannot be the same as the old password",
                    )
                    .with_code(ErrorCode::OldPasswordNotAllowed));
                }
                if let Some(reason) = check_password_requirements(&user.username, &new_password)
                {
                    return Err(EndpointError::bad_request(format!(
                        "new password is not allowed: {reason}"
                    ))
                    .with_code(ErrorCode::NotMeetPasswordRequirements));
                }

                let hash = hash_password(&new_password);
                self.ctx
                    .db
                    .with_transaction(|tx| tx.update_user_password(user.id, &hash, false))?;
                info!("User {} changed their password", user.id);
            }
            None if user.must_reset_password => {
                return Err(EndpointError::unauthenticated(
                    "password must be reset, provide new_password",
                )
                .with_code(ErrorCode::MustResetPassword));
            }
            None => {}
        }

        let token = self.ctx.tokens.generate_token(user.id)?;
        info!("User {} logged in", user.id);
        Ok(Response::json(&token))
    }
}
