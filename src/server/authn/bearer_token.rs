use std::sync::Arc;

use actix_web::HttpRequest;
use anyhow::Result;
use log::debug;

use crate::server::db::Database;

use super::token::TokenValidator;
use super::{Authenticator, AuthnResponse};

/// Resolves `Authorization: Bearer <jwt>` to the stored user record.
pub struct BearerTokenAuthenticator<T: TokenValidator> {
    validator: T,
    db: Arc<Database>,
}

impl<T: TokenValidator> BearerTokenAuthenticator<T> {
    pub fn new(validator: T, db: Arc<Database>) -> Self {
        Self { validator, db }
    }
}

impl<T: TokenValidator + Sync + Send> Authenticator for BearerTokenAuthenticator<T> {
    fn authenticate_request(&self, req: &HttpRequest) -> Result<AuthnResponse> {
        let auth = match req.headers().get("Authorization") {
            Some(auth) => match auth.to_str() {
                Ok(auth) => auth.trim().to_string(),
                Err(_) => return Ok(AuthnResponse::Unauthenticated),
            },
            None => return Ok(AuthnResponse::Continue),
        };

        if auth.is_empty() {
            return Ok(AuthnResponse::Continue);
        }

        let mut iter = auth.split_whitespace();
        match iter.next() {
            Some(scheme) if scheme.eq_ignore_ascii_case("bearer") => {}
            _ => return Ok(AuthnResponse::Unauthenticated),
        }

        let token = match iter.next() {
            Some(token) => token,
            None => return Ok(AuthnResponse::Unauthenticated),
        };

        let user_id = match self.validator.validate_token(token) {
            Ok(id) => id,
            Err(e) => {
                debug!("Reject bearer token: {e:#}");
                return Ok(AuthnResponse::Unauthenticated);
            }
        };

        // Tokens outlive deleted users.
        match self.db.with_transaction(|tx| tx.get_user(user_id))? {
            Some(user) => Ok(AuthnResponse::Ok(user)),
            None => Ok(AuthnResponse::Unauthenticated),
        }
    }
}
