use std::{future::Future, time::Duration};

use config::{Config, ConfigReader};
use db::DbClient;
use errors::DbError;
use log::{info, warn};
use models::schema::DbUser;
use schema::diff::MissingMap;

pub mod config;
pub mod db;
pub mod errors;
pub mod models;
pub mod schema;
pub mod server;

/// Reads and validates the agent configuration. When `verify_config` is set
/// the live schema must already match every declared model.
pub async fn new_config<R: ConfigReader>(reader: &R) -> Result<Config, DbError> {
    let cfg = reader.read()?;
    cfg.model_list.validate()?;

    if cfg.verify_config {
        Agent::connect(cfg.clone()).await?.verify().await?;
    }

    Ok(cfg)
}

/// Outcome of a bootstrap reconciliation.
#[derive(Debug)]
pub struct Reconciliation {
    /// What was missing before migration, now applied.
    pub migrated: MissingMap,
    /// Provisioning does not abort bootstrap; its result is reported here.
    pub user: Result<DbUser, DbError>,
}

/// Reconciles one target store against the configuration.
pub struct Agent {
    cfg: Config,
    client: Box<dyn DbClient>,
}

impl Agent {
    pub async fn connect(cfg: Config) -> Result<Self, DbError> {
        let client = db::connect(&cfg.connection).await?;
        Ok(Self::with_client(cfg, client))
    }

    pub fn with_client(cfg: Config, client: Box<dyn DbClient>) -> Self {
        Agent { cfg, client }
    }

    pub async fn verify(&self) -> Result<(), DbError> {
        schema::verify::verify(
            self.client.as_ref(),
            self.cfg.schema_name(),
            &self.cfg.model_list,
        )
        .await
    }

    /// Creates missing tables and columns of auto-migratable models.
    pub async fn auto_migrate(&self) -> Result<MissingMap, DbError> {
        schema::migrate::auto_migrate(
            self.client.as_ref(),
            self.cfg.schema_name(),
            &self.cfg.model_list,
        )
        .await
    }

    /// `force_create` takes priority over `user_with_acl.force_recreate`.
    pub async fn create_user_with_acl(&self, force_create: bool) -> Result<DbUser, DbError> {
        let account = &self.cfg.user_with_acl;
        schema::acl::create_user_with_acl(
            self.client.as_ref(),
            self.cfg.schema_name(),
            &self.cfg.model_list,
            &account.username,
            &account.password,
            force_create || account.force_recreate,
        )
        .await
    }

    /// Migrates then provisions the restricted role, bounded by
    /// `migration_timeout_secs` when configured.
    pub async fn reconcile(&self, force_create: bool) -> Result<Reconciliation, DbError> {
        match self.cfg.migration_timeout() {
            Some(limit) => self.reconcile_within(limit, force_create).await,
            None => self.reconcile_unbounded(force_create).await,
        }
    }

    /// Statements already executed when the deadline hits stay applied.
    pub async fn reconcile_within(
        &self,
        limit: Duration,
        force_create: bool,
    ) -> Result<Reconciliation, DbError> {
        with_deadline(limit, self.reconcile_unbounded(force_create)).await
    }

    async fn reconcile_unbounded(&self, force_create: bool) -> Result<Reconciliation, DbError> {
        let migrated = self.auto_migrate().await?;

        let user = self.create_user_with_acl(force_create).await;
        match &user {
            Ok(u) => info!("restricted role {} is ready", u.username),
            Err(e) => warn!("failed to provision restricted role: {}", e),
        }

        Ok(Reconciliation { migrated, user })
    }
}

async fn with_deadline<T, F>(limit: Duration, fut: F) -> Result<T, DbError>
where
    F: Future<Output = Result<T, DbError>>,
{
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| DbError::Timeout(limit))?
}
