use std::path::Path;
use std::{fs, io};

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use log::info;
use rand::RngCore;

use crate::config::ensure_dir_exists;

use super::config::TokenConfig;
use super::jwt::{JwtTokenGenerator, JwtTokenValidator};

pub struct TokenFactory {
    secret: Vec<u8>,
    expiry: u64,
}

impl TokenFactory {
    pub fn new(cfg: &TokenConfig) -> Result<Self> {
        let secret = if cfg.secret_path.is_empty() {
            cfg.secret.as_bytes().to_vec()
        } else {
            Self::load_secret(Path::new(&cfg.secret_path))?
        };

        Ok(Self {
            secret,
            expiry: cfg.expiry,
        })
    }

    fn load_secret(path: &Path) -> Result<Vec<u8>> {
        match fs::read_to_string(path) {
            Ok(data) => Ok(data.trim().as_bytes().to_vec()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                info!("Token secret not found, generating a new one");
                if let Some(dir) = path.parent() {
                    ensure_dir_exists(dir)?;
                }

                let mut raw = [0u8; 32];
                rand::thread_rng().fill_bytes(&mut raw);
                let secret = BASE64.encode(raw);
                fs::write(path, &secret).context("write token secret")?;
                Ok(secret.into_bytes())
            }
            Err(err) => Err(err).context("read token secret failed"),
        }
    }

    pub fn build_token_generator(&self) -> Result<JwtTokenGenerator> {
        JwtTokenGenerator::new(&self.secret, self.expiry)
    }

    pub fn build_token_validator(&self) -> Result<JwtTokenValidator> {
        JwtTokenValidator::new(&self.secret)
    }
}
