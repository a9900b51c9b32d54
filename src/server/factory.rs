use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use log::info;
use openssl::ssl::{SslAcceptor, SslAcceptorBuilder, SslMethod};

use crate::server::authn::bearer_token::BearerTokenAuthenticator;
use crate::server::authn::token::factory::TokenFactory;
use crate::server::authz::client::AuthorizationClient;
use crate::server::authz::config::BootstrapAdminConfig;
use crate::server::authz::policy::{
    NamedPolicySet, Policy, PolicyType, ADMIN_MEMBERS_SET, ADMIN_ROLE,
};
use crate::server::authz::store::DbPolicyStore;
use crate::server::authz::uri::{ResourceKind, ResourceUri};
use crate::server::db::factory::DbFactory;
use crate::server::db::UserRecord;
use crate::server::endpoints::{EndpointContext, Pipeline};
use crate::server::password::hash_password;

use super::config::ServerConfig;
use super::db::Database;
use super::restful::RestfulServer;

pub struct ServerFactory {
    db: Arc<Database>,
    cfg: ServerConfig,
}

impl ServerFactory {
    pub fn new(cfg: ServerConfig) -> Result<Self> {
        let db_factory = DbFactory::new();
        let db = db_factory.build_db(&cfg.db).context("init database")?;
        Ok(Self { cfg, db })
    }

    pub async fn build_server(&self) -> Result<RestfulServer> {
        let ssl = self.build_ssl()?;
        let authz = self.build_authorization().await?;
        let (ctx, pipeline) = self.build_context(authz)?;

        let mut srv = RestfulServer::new(
            self.cfg.bind.clone(),
            ssl,
            ctx,
            pipeline,
            self.cfg.payload_limit_mib,
        );
        if self.cfg.keep_alive_secs > 0 {
            srv.set_keep_alive_secs(self.cfg.keep_alive_secs);
        }
        if self.cfg.workers > 0 {
            srv.set_workers(self.cfg.workers);
        }

        Ok(srv)
    }

    pub fn build_ssl(&self) -> Result<Option<SslAcceptorBuilder>> {
        if !self.cfg.ssl {
            return Ok(None);
        }

        let mut builder =
            SslAcceptor::mozilla_intermediate(SslMethod::tls()).context("init ssl acceptor")?;

        builder
            .set_private_key_file(&self.cfg.key_path, openssl::ssl::SslFiletype::PEM)
            .context("load ssl key file")?;
        builder
            .set_certificate_chain_file(&self.cfg.cert_path)
            .context("load ssl cert file")?;

        Ok(Some(builder))
    }

    /// Stores the configured policy sets and the bootstrap admin, then
    /// builds the enforcer. Any failure here stops the server.
    pub async fn build_authorization(&self) -> Result<Arc<AuthorizationClient>> {
        let store = DbPolicyStore::new(self.db.clone());
        let client = Arc::new(AuthorizationClient::new(Arc::new(store)));

        for set in self.cfg.authz.policy_sets.iter() {
            let added = client
                .add_named_policies(set)
                .await
                .with_context(|| format!("store policy set '{}'", set.logical_name))?;
            if added > 0 {
                info!(
                    "Stored {added} new policies for set '{}'",
                    set.logical_name
                );
            }
        }

        if let Some(admin) = self.cfg.authz.bootstrap_admin.as_ref() {
            self.bootstrap_admin(&client, admin)
                .await
                .context("bootstrap admin")?;
        }

        client.init().await.context("init authorization")?;
        Ok(client)
    }

    async fn bootstrap_admin(
        &self,
        client: &AuthorizationClient,
        cfg: &BootstrapAdminConfig,
    ) -> Result<()> {
        let password_hash = hash_password(&cfg.password);
        let now = Utc::now().timestamp() as u64;
        let user = self.db.with_transaction(|tx| {
            if tx.get_user_by_name(&cfg.username)?.is_some() {
                return Ok(None);
            }
            let user = tx.create_user(UserRecord {
                id: 0,
                username: cfg.username.clone(),
                password_hash,
                must_reset_password: false,
                create_time: now,
                update_time: now,
            })?;
            Ok(Some(user))
        })?;

        let Some(user) = user else {
            return Ok(());
        };
        info!("Created bootstrap admin {} '{}'", user.id, user.username);

        let member = ResourceUri::instance(ResourceKind::User, user.id);
        let set = NamedPolicySet::new(ADMIN_MEMBERS_SET, PolicyType::Grouping)
            .with(Policy::role_membership(member, ADMIN_ROLE));
        client.add_named_policies(&set).await?;
        Ok(())
    }

    pub fn build_context(
        &self,
        authz: Arc<AuthorizationClient>,
    ) -> Result<(Arc<EndpointContext>, Arc<Pipeline>)> {
        let token_factory = TokenFactory::new(&self.cfg.authn.token).context("init token")?;

        let validator = token_factory
            .build_token_validator()
            .context("init token validator")?;
        let authn = BearerTokenAuthenticator::new(validator, self.db.clone());
        let pipeline = Pipeline::new(Box::new(authn), authz.clone());

        let tokens = token_factory
            .build_token_generator()
            .context("init token generator")?;
        let ctx = EndpointContext {
            db: self.db.clone(),
            authz,
            tokens,
        };
        Ok((Arc::new(ctx), Arc::new(pipeline)))
    }
}

#[cfg(test)]
mod tests {
    use crate::config::{CommonConfig, PathSet};
    use crate::server::authz::action::UserAction;
    use crate::server::authz::client::AuthorizationRequest;

    use super::*;

    fn test_config(admin: bool) -> ServerConfig {
        let ps = PathSet::new_test();
        let mut toml_str = String::from(
            r#"
            [authn.token]
            secret = "factory-secret"

            [db.sqlite]
            memory = true
            "#,
        );
        if admin {
            toml_str.push_str(
                r#"
                [authz.bootstrap_admin]
                username = "root"
                password = "root-password"
                "#,
            );
        }
        let mut cfg: ServerConfig = toml::from_str(&toml_str).unwrap();
        cfg.complete(&ps).unwrap();
        cfg
    }

    #[tokio::test]
    async fn test_bootstrap() {
        let factory = ServerFactory::new(test_config(true)).unwrap();
        let client = factory.build_authorization().await.unwrap();

        let root = factory
            .db
            .with_transaction(|tx| tx.get_user_by_name("root"))
            .unwrap()
            .unwrap();
        assert!(!root.must_reset_password);

        let subject = ResourceUri::instance(ResourceKind::User, root.id);
        let req = [AuthorizationRequest::single(
            ResourceUri::collection(ResourceKind::User),
            UserAction::Create,
        )];
        assert!(client.is_allowed(&subject, &req).await.unwrap());

        // Bootstrapping again changes nothing.
        let stored = client.list_policies().await.unwrap().len();
        let client = factory.build_authorization().await.unwrap();
        assert_eq!(client.list_policies().await.unwrap().len(), stored);
        let users = factory.db.with_transaction(|tx| tx.list_users(&[])).unwrap();
        assert_eq!(users.len(), 1);
    }

    #[tokio::test]
    async fn test_build_server() {
        let factory = ServerFactory::new(test_config(false)).unwrap();
        assert!(factory.build_ssl().unwrap().is_none());
        factory.build_server().await.unwrap();

        let users = factory.db.with_transaction(|tx| tx.list_users(&[])).unwrap();
        assert!(users.is_empty());
    }
}
