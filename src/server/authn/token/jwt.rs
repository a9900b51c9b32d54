use anyhow::{bail, Result};
use chrono::Local;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use super::{TokenGenerator, TokenResponse, TokenValidator};

/// Used as both issuer and audience.
const ISSUER: &str = "game-deals";

/// Claims represents public claim values (as specified in RFC 7519)
#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    pub aud: String, // The intended recipient of the token
    pub exp: usize,  // Token expiration time (timestamp)
    pub iat: usize,  // Time at which token was issued (timestamp)
    pub iss: String, // Token issuer
    pub nbf: usize,  // Time before which token must not be accepted (timestamp)
    pub sub: String, // User id
}

pub struct JwtTokenGenerator {
    key: EncodingKey,
    expiry: usize,
}

impl JwtTokenGenerator {
    pub fn new(secret: &[u8], expiry: u64) -> Result<Self> {
        if secret.is_empty() {
            bail!("jwt token secret cannot be empty");
        }
        Ok(Self {
            key: EncodingKey::from_secret(secret),
            expiry: expiry as usize,
        })
    }
}

impl TokenGenerator for JwtTokenGenerator {
    fn generate_token(&self, user_id: u64) -> Result<TokenResponse> {
        let now = Local::now().timestamp() as usize;

        let claims = Claims {
            aud: String::from(ISSUER),
            exp: now + self.expiry,
            iat: now,
            iss: String::from(ISSUER),
            nbf: now,
            sub: user_id.to_string(),
        };

        match encode(&Header::new(Algorithm::HS256), &claims, &self.key) {
            Ok(token) => Ok(TokenResponse {
                auth_token: token,
                expire_in: claims.exp,
            }),
            Err(e) => bail!("generate jwt token failed: {e}"),
        }
    }
}

pub struct JwtTokenValidator {
    key: DecodingKey,
}

impl JwtTokenValidator {
    pub fn new(secret: &[u8]) -> Result<Self> {
        if secret.is_empty() {
            bail!("jwt token secret cannot be empty");
        }
        Ok(Self {
            key: DecodingKey::from_secret(secret),
        })
    }
}

impl TokenValidator for JwtTokenValidator {
    fn validate_token(&self, token: &str) -> Result<u64> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[ISSUER]);
        validation.set_audience(&[ISSUER]);
        validation.set_required_spec_claims(&["exp", "iat", "iss", "nbf", "sub", "aud"]);

        let claims = match decode::<Claims>(token, &self.key, &validation) {
            Ok(data) => data.claims,
            Err(e) => bail!("validate jwt token failed: {e}"),
        };

        let now = Local::now().timestamp() as usize;
        if now >= claims.exp {
            bail!("validate jwt token failed: token expired");
        }
        if now < claims.nbf {
            bail!("validate jwt token failed: token not yet valid");
        }

        match claims.sub.parse::<u64>() {
            Ok(id) => Ok(id),
            Err(_) => bail!("validate jwt token failed: invalid subject '{}'", claims.sub),
        }
    }
}
