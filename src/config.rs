use std::{
    collections::BTreeMap,
    fs,
    net::{Ipv4Addr, SocketAddr},
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::{
    errors::DbError,
    models::{
        connections::{ConnectionInfo, DbType, ExecutiveAccount},
        schema::Models,
    },
};

/// Agent configuration: target store, managed models and the restricted role.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Config {
    #[serde(flatten)]
    pub connection: ConnectionInfo,
    /// Shared secret the dashboard sends in `Authorization`.
    #[serde(default)]
    pub secret_key: String,
    /// Run the strict verification gate at startup.
    #[serde(default)]
    pub verify_config: bool,
    #[serde(default)]
    pub model_list: Models,
    #[serde(default)]
    pub user_with_acl: ExecutiveAccount,
    #[serde(default)]
    pub migration_timeout_secs: Option<u64>,
}

impl Config {
    pub fn connection_string(&self) -> Result<String, DbError> {
        self.connection.connection_string()
    }

    pub fn schema_name(&self) -> &str {
        &self.connection.db_schema_name
    }

    pub fn migration_timeout(&self) -> Option<Duration> {
        self.migration_timeout_secs.map(Duration::from_secs)
    }

    /// Overrides connection secrets from `SMITHY_*` variables.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let conn = &mut self.connection;
        let fields: [(&str, &mut String); 7] = [
            ("SMITHY_DB_HOSTNAME", &mut conn.db_hostname),
            ("SMITHY_DB_PORT", &mut conn.db_port),
            ("SMITHY_DB_USERNAME", &mut conn.db_username),
            ("SMITHY_DB_PASSWORD", &mut conn.db_password),
            ("SMITHY_DB_NAME", &mut conn.db_name),
            ("SMITHY_DB_SCHEMA_NAME", &mut conn.db_schema_name),
            ("SMITHY_SECRET_KEY", &mut self.secret_key),
        ];
        for (key, field) in fields {
            if let Some(value) = lookup(key) {
                *field = value;
            }
        }
    }
}

/// Role name to table name to allowed actions, as read by the dashboard.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct Permission {
    #[serde(default)]
    pub roles: BTreeMap<String, BTreeMap<String, Vec<String>>>,
}

impl Permission {
    pub fn allows(&self, role: &str, table: &str, action: &str) -> bool {
        self.roles
            .get(role)
            .and_then(|tables| tables.get(table))
            .is_some_and(|actions| actions.iter().any(|a| a.eq_ignore_ascii_case(action)))
    }
}

pub trait ConfigReader {
    fn read(&self) -> Result<Config, DbError>;
    fn read_roles(&self) -> Result<Permission, DbError>;
}

/// Reads TOML files from disk.
#[derive(Debug, Clone)]
pub struct FileReader {
    pub config_path: PathBuf,
    pub roles_path: Option<PathBuf>,
}

impl FileReader {
    pub fn new(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
            roles_path: None,
        }
    }

    pub fn with_roles(mut self, roles_path: impl Into<PathBuf>) -> Self {
        self.roles_path = Some(roles_path.into());
        self
    }
}

fn read_toml<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, DbError> {
    let content = fs::read_to_string(path)
        .map_err(|e| DbError::Config(format!("failed to read {}: {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| DbError::Config(format!("failed to parse {}: {}", path.display(), e)))
}

/// Deserializes a parsed config table. A `db_type` naming a kind without a
/// driver is reported as such rather than as a parse failure.
fn config_from_table(path: &Path, table: toml::Table) -> Result<Config, DbError> {
    if let Some(kind) = table.get("db_type").and_then(toml::Value::as_str) {
        kind.parse::<DbType>()?;
    }
    toml::Value::Table(table)
        .try_into()
        .map_err(|e| DbError::Config(format!("failed to parse {}: {}", path.display(), e)))
}

impl ConfigReader for FileReader {
    fn read(&self) -> Result<Config, DbError> {
        let table: toml::Table = read_toml(&self.config_path)?;
        let mut cfg = config_from_table(&self.config_path, table)?;
        cfg.apply_env_overrides();
        Ok(cfg)
    }

    fn read_roles(&self) -> Result<Permission, DbError> {
        match &self.roles_path {
            Some(path) => read_toml(path),
            None => Ok(Permission::default()),
        }
    }
}

/// Listening address of the exposure endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerConfig {
    pub addr: SocketAddr,
}

impl ServerConfig {
    pub const DEFAULT_PORT: u16 = 3000;

    /// Reads `PORT`, falling back to [`Self::DEFAULT_PORT`].
    pub fn from_env() -> Result<Self, DbError> {
        Self::from_port(std::env::var("PORT").ok().as_deref())
    }

    fn from_port(port: Option<&str>) -> Result<Self, DbError> {
        let port = match port.map(str::trim).filter(|p| !p.is_empty()) {
            Some(p) => p
                .parse::<u16>()
                .map_err(|e| DbError::Config(format!("invalid PORT {:?}: {}", p, e)))?,
            None => Self::DEFAULT_PORT,
        };
        Ok(Self {
            addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)),
        })
    }
}
