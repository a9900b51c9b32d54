pub mod bearer_token;
pub mod config;
pub mod token;

use actix_web::HttpRequest;
use anyhow::Result;

use super::db::UserRecord;

pub trait Authenticator: Send + Sync {
    fn authenticate_request(&self, req: &HttpRequest) -> Result<AuthnResponse>;
}

#[derive(Debug, Clone)]
pub enum AuthnResponse {
    /// The request carries a valid identity.
    Ok(UserRecord),
    /// The request carries no credentials at all.
    Continue,
    /// Credentials were present but invalid.
    Unauthenticated,
}
