#![allow(dead_code)]

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use smithy_agent::{
    config::Config,
    db::DbClient,
    errors::DbError,
    models::{
        connections::{ConnectionInfo, DbType, ExecutiveAccount},
        schema::{Column, ColumnSchema, Model, Models, TableSchema},
    },
    schema::{acl::RoleGrant, migrate::TableMigration},
};

#[derive(Debug, Clone, PartialEq)]
pub struct Role {
    pub password: String,
    pub tables: BTreeSet<String>,
}

#[derive(Default)]
struct State {
    tables: BTreeMap<String, TableSchema>,
    roles: BTreeMap<String, Role>,
    migrations: usize,
}

/// In-memory store with the same atomicity guarantees as the Postgres client.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
    delay: Option<Duration>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn create_table(&self, name: &str, columns: &[&str]) {
        let table = TableSchema {
            table_name: name.to_string(),
            columns: columns
                .iter()
                .map(|c| ColumnSchema {
                    name: c.to_string(),
                    data_type: "text".to_string(),
                    is_nullable: true,
                    default: None,
                    is_primary: false,
                })
                .collect(),
        };
        self.state
            .lock()
            .unwrap()
            .tables
            .insert(name.to_string(), table);
    }

    pub fn column_names(&self, table: &str) -> Option<Vec<String>> {
        self.state
            .lock()
            .unwrap()
            .tables
            .get(table)
            .map(|t| t.columns.iter().map(|c| c.name.clone()).collect())
    }

    pub fn role(&self, name: &str) -> Option<Role> {
        self.state.lock().unwrap().roles.get(name).cloned()
    }

    pub fn migrations(&self) -> usize {
        self.state.lock().unwrap().migrations
    }
}

#[async_trait]
impl DbClient for MemoryStore {
    fn db_type(&self) -> DbType {
        DbType::Postgres
    }

    async fn list_tables(&self, _schema: &str) -> Result<Vec<String>, DbError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.state.lock().unwrap().tables.keys().cloned().collect())
    }

    async fn describe_table(&self, _schema: &str, table_name: &str) -> Result<TableSchema, DbError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .tables
            .get(table_name)
            .cloned()
            .unwrap_or(TableSchema {
                table_name: table_name.to_string(),
                columns: vec![],
            }))
    }

    async fn migrate_table(&self, _schema: &str, migration: &TableMigration) -> Result<(), DbError> {
        let mut state = self.state.lock().unwrap();
        let columns: Vec<ColumnSchema> = migration
            .columns
            .iter()
            .map(|c| ColumnSchema {
                name: c.name.clone(),
                data_type: c.native_type.clone(),
                is_nullable: c.nullable,
                default: c.default.clone(),
                is_primary: c.primary,
            })
            .collect();

        if migration.create_table {
            if state.tables.contains_key(&migration.table) {
                return Err(DbError::AlreadyExists(format!(
                    "relation \"{}\" already exists",
                    migration.table
                )));
            }
            state.tables.insert(
                migration.table.clone(),
                TableSchema {
                    table_name: migration.table.clone(),
                    columns,
                },
            );
        } else {
            let table = state
                .tables
                .get_mut(&migration.table)
                .ok_or_else(|| DbError::Migration(format!("no table {}", migration.table)))?;
            if let Some(dup) = columns.iter().find(|c| table.has_column(&c.name)) {
                return Err(DbError::AlreadyExists(format!(
                    "column \"{}\" already exists",
                    dup.name
                )));
            }
            table.columns.extend(columns);
        }

        state.migrations += 1;
        Ok(())
    }

    async fn role_exists(&self, role: &str) -> Result<bool, DbError> {
        Ok(self.state.lock().unwrap().roles.contains_key(role))
    }

    async fn provision_role(&self, _schema: &str, grant: &RoleGrant) -> Result<(), DbError> {
        let mut state = self.state.lock().unwrap();
        if state.roles.contains_key(&grant.username) && !grant.replace {
            return Err(DbError::AlreadyExists(format!(
                "role \"{}\" already exists",
                grant.username
            )));
        }
        state.roles.insert(
            grant.username.clone(),
            Role {
                password: grant.password.clone(),
                tables: grant.tables.iter().cloned().collect(),
            },
        );
        Ok(())
    }
}

pub fn col(name: &str, col_type: &str, nullable: bool, primary: bool) -> Column {
    Column {
        name: name.to_string(),
        col_type: col_type.to_string(),
        is_nullable: nullable,
        is_primary: primary,
        ..Default::default()
    }
}

pub fn users(auto_migration: bool) -> Model {
    Model {
        table_name: "users".to_string(),
        columns: vec![
            col("id", "int", false, true),
            col("name", "string", false, false),
            col("email", "string", true, false),
        ],
        auto_migration,
        display_name: "Users".to_string(),
        name_display_column: "name".to_string(),
    }
}

pub fn posts(auto_migration: bool) -> Model {
    Model {
        table_name: "posts".to_string(),
        columns: vec![
            col("id", "bigint", false, true),
            col("title", "string", false, false),
            col("user_id", "int", true, false),
        ],
        auto_migration,
        ..Default::default()
    }
}

pub fn config(models: Vec<Model>) -> Config {
    Config {
        connection: ConnectionInfo {
            db_type: DbType::Postgres,
            db_username: "postgres".to_string(),
            db_password: "postgres".to_string(),
            db_name: "smithy".to_string(),
            db_ssl_mode_option: "disable".to_string(),
            db_hostname: "localhost".to_string(),
            db_port: "5432".to_string(),
            db_environment: "test".to_string(),
            db_schema_name: "public".to_string(),
        },
        secret_key: "lalala".to_string(),
        verify_config: false,
        model_list: Models(models),
        user_with_acl: ExecutiveAccount {
            username: "u".to_string(),
            password: "p".to_string(),
            force_recreate: false,
        },
        migration_timeout_secs: None,
    }
}
