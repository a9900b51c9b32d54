pub mod config;
pub mod factory;
pub mod jwt;

use anyhow::Result;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub auth_token: String,
    /// Unix timestamp after which the token is rejected
    pub expire_in: usize,
}

pub trait TokenGenerator {
    fn generate_token(&self, user_id: u64) -> Result<TokenResponse>;
}

pub trait TokenValidator {
    /// Returns the user id the token was issued for.
    fn validate_token(&self, token: &str) -> Result<u64>;
}

#[cfg(test)]
mod tests {
    use super::*;

    pub fn run_token_tests<TG, TV>(generator: &TG, validator: &TV)
    where
        TG: TokenGenerator,
        TV: TokenValidator,
    {
        for user_id in [1, 2, 42, 7777] {
            let token = generator.generate_token(user_id).unwrap();
            let result = validator.validate_token(&token.auth_token).unwrap();
            assert_eq!(result, user_id);
        }

        assert!(validator.validate_token("").is_err());
        assert!(validator.validate_token("not-a-token").is_err());
    }
}

#[cfg(test)]
pub use tests::run_token_tests;
