use crate::{
    errors::DbError,
    models::{
        connections::{ConnectionInfo, DbType},
        schema::{Column, TableSchema},
    },
    schema::{acl::RoleGrant, migrate::TableMigration},
};
use async_trait::async_trait;

pub mod postgres;

/// Capabilities the reconciliation engine needs from one store engine.
#[async_trait]
pub trait DbClient: Send + Sync {
    fn db_type(&self) -> DbType;
    /// Base tables of `schema`, including tables without columns.
    async fn list_tables(&self, schema: &str) -> Result<Vec<String>, DbError>;
    async fn describe_table(&self, schema: &str, table_name: &str)
        -> Result<TableSchema, DbError>;
    /// Runs every statement of `migration` atomically.
    async fn migrate_table(&self, schema: &str, migration: &TableMigration)
        -> Result<(), DbError>;
    async fn role_exists(&self, role: &str) -> Result<bool, DbError>;
    /// Creates (or replaces, when `grant.replace` is set) the role and its grants atomically.
    async fn provision_role(&self, schema: &str, grant: &RoleGrant) -> Result<(), DbError>;
}

/// Opens a pooled client for the engine named by `info.db_type`.
pub async fn connect(info: &ConnectionInfo) -> Result<Box<dyn DbClient>, DbError> {
    match info.db_type {
        DbType::Postgres => {
            let client = postgres::PostgresClient::connect(&info.connection_string()?).await?;
            Ok(Box::new(client))
        }
    }
}

impl DbType {
    /// Resolves a declared column type to the engine's native type.
    pub fn native_type(&self, column: &Column) -> Option<String> {
        match self {
            DbType::Postgres => {
                postgres::native_type(&column.col_type, column.has_tag("auto_increment"))
                    .map(str::to_string)
            }
        }
    }
}
