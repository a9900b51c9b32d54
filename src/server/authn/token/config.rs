use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use crate::config::{expandenv, CommonConfig, PathSet};

/// Token configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TokenConfig {
    /// HMAC secret for signing tokens. Supports env expansion and defaults to
    /// `$GAMEDEALS_AUTH_TOKEN_SECRET`. When empty, a random secret is kept in
    /// `{config_path}/pki/token_secret` and generated on first start.
    #[serde(default = "TokenConfig::default_secret", skip_serializing)]
    pub secret: String,

    /// Token expiration time in seconds. Default: two weeks.
    #[serde(default = "TokenConfig::default_expiry")]
    pub expiry: u64,

    #[serde(skip)]
    pub secret_path: String,
}

impl CommonConfig for TokenConfig {
    fn default() -> Self {
        Self {
            secret: Self::default_secret(),
            expiry: Self::default_expiry(),
            secret_path: String::new(),
        }
    }

    fn complete(&mut self, ps: &PathSet) -> Result<()> {
        if self.expiry == 0 {
            bail!("token expiry should not be 0");
        }

        self.secret = expandenv("secret", &self.secret)?;
        if self.secret.is_empty() {
            let path = ps.pki_path.join("token_secret");
            self.secret_path = format!("{}", path.display());
        }

        Ok(())
    }
}

impl TokenConfig {
    pub fn default_secret() -> String {
        String::from("${GAMEDEALS_AUTH_TOKEN_SECRET:-}")
    }

    pub fn default_expiry() -> u64 {
        60 * 60 * 24 * 14
    }
}
