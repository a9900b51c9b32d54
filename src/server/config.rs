use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::config::{expandenv, CommonConfig, PathSet};

use super::authn::config::AuthnConfig;
use super::authz::config::AuthzConfig;
use super::db::config::DbConfig;

/// Top level configuration of the deals API, loaded from
/// `{config_path}/server.toml`. Every section is optional.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    /// Listen address of the HTTP API. Default: `127.0.0.1:7881`.
    #[serde(default = "ServerConfig::default_bind")]
    pub bind: String,

    /// Serve HTTPS with `cert_path` and `key_path`. Both files must exist
    /// when enabled.
    #[serde(default = "ServerConfig::default_ssl")]
    pub ssl: bool,

    /// PEM certificate chain. Default: `{config_path}/pki/server.crt`.
    #[serde(default = "ServerConfig::default_cert_path")]
    pub cert_path: String,

    /// PEM private key. Default: `{config_path}/pki/server.key`.
    #[serde(default = "ServerConfig::default_key_path")]
    pub key_path: String,

    /// 0 keeps the actix-web default.
    #[serde(default = "ServerConfig::default_keep_alive_secs")]
    pub keep_alive_secs: u64,

    /// 0 uses one worker per CPU.
    #[serde(default = "ServerConfig::default_workers")]
    pub workers: u64,

    /// Largest accepted request body, between 1 and 10 MiB. Policy sets
    /// are the biggest bodies the API takes. Default: 3.
    #[serde(default = "ServerConfig::default_payload_limit_mib")]
    pub payload_limit_mib: usize,

    /// How callers prove who they are: the signing secret and lifetime of
    /// login tokens.
    #[serde(default = "AuthnConfig::default")]
    pub authn: AuthnConfig,

    /// What callers may do: policy sets stored at startup and the optional
    /// bootstrap admin account.
    #[serde(default = "AuthzConfig::default")]
    pub authz: AuthzConfig,

    /// Where users, games, deals and policies are kept.
    #[serde(default = "DbConfig::default")]
    pub db: DbConfig,
}

impl CommonConfig for ServerConfig {
    fn default() -> Self {
        Self {
            bind: Self::default_bind(),
            ssl: Self::default_ssl(),
            cert_path: Self::default_cert_path(),
            key_path: Self::default_key_path(),
            keep_alive_secs: Self::default_keep_alive_secs(),
            workers: Self::default_workers(),
            payload_limit_mib: Self::default_payload_limit_mib(),
            authn: AuthnConfig::default(),
            authz: AuthzConfig::default(),
            db: DbConfig::default(),
        }
    }

    fn complete(&mut self, ps: &PathSet) -> Result<()> {
        self.bind = expandenv("bind", &self.bind)?;
        if self.bind.is_empty() {
            bail!("bind cannot be empty");
        }

        self.cert_path = expandenv("cert_path", &self.cert_path)?;
        if self.cert_path.is_empty() {
            let path = ps.pki_path.join("server.crt");
            self.cert_path = format!("{}", path.display());
        }

        self.key_path = expandenv("key_path", &self.key_path)?;
        if self.key_path.is_empty() {
            let path = ps.pki_path.join("server.key");
            self.key_path = format!("{}", path.display());
        }

        if self.ssl {
            for (name, path) in [("cert_path", &self.cert_path), ("key_path", &self.key_path)] {
                if !Path::new(path).is_file() {
                    bail!("ssl is enabled but {name} '{path}' is not a file");
                }
            }
        }

        if self.payload_limit_mib < Self::MIN_PAYLOAD_LIMIT_MIB {
            bail!(
                "payload_limit_mib must be greater than or equal to {}",
                Self::MIN_PAYLOAD_LIMIT_MIB
            );
        }
        if self.payload_limit_mib > Self::MAX_PAYLOAD_LIMIT_MIB {
            bail!(
                "payload_limit_mib must be less than or equal to {}",
                Self::MAX_PAYLOAD_LIMIT_MIB
            );
        }

        self.authn.complete(ps).context("authn")?;
        self.authz.complete(ps).context("authz")?;
        self.db.complete(ps).context("db")?;

        Ok(())
    }
}

impl ServerConfig {
    const MAX_PAYLOAD_LIMIT_MIB: usize = 10;
    const MIN_PAYLOAD_LIMIT_MIB: usize = 1;

    pub fn default_bind() -> String {
        String::from("127.0.0.1:7881")
    }

    pub fn default_ssl() -> bool {
        false
    }

    pub fn default_cert_path() -> String {
        String::new()
    }

    pub fn default_key_path() -> String {
        String::new()
    }

    pub fn default_keep_alive_secs() -> u64 {
        0
    }

    pub fn default_workers() -> u64 {
        0
    }

    pub fn default_payload_limit_mib() -> usize {
        3
    }
}
