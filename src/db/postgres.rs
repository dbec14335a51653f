use async_trait::async_trait;
use log::debug;
use sqlx::{postgres::PgPoolOptions, PgPool, Row};

use crate::{
    errors::DbError,
    models::{
        connections::DbType,
        schema::{ColumnSchema, TableSchema},
    },
    schema::{
        acl::RoleGrant,
        migrate::{PlannedColumn, TableMigration},
    },
};

use super::DbClient;

/// duplicate_table, duplicate_column, duplicate_object
const DUPLICATE_OBJECT_CODES: [&str; 3] = ["42P07", "42701", "42710"];

pub struct PostgresClient {
    pub pool: PgPool,
}

impl PostgresClient {
    pub async fn connect(database_url: &str) -> Result<Self, DbError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .map_err(|e| DbError::Connection(e.to_string()))?;

        Ok(Self { pool })
    }

    async fn owned_sequences(
        conn: &mut sqlx::PgConnection,
        schema: &str,
        table: &str,
    ) -> Result<Vec<String>, DbError> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT pg_get_serial_sequence(
                quote_ident($1) || '.' || quote_ident($2),
                column_name::text
            ) AS seq
            FROM information_schema.columns
            WHERE table_schema = $1 AND table_name = $2
            "#,
        )
        .bind(schema)
        .bind(table)
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| DbError::Grant(e.to_string()))?;

        let mut sequences = Vec::new();
        for row in rows {
            if let Some(seq) = row
                .try_get::<Option<String>, _>("seq")
                .map_err(|e| DbError::Grant(e.to_string()))?
            {
                sequences.push(seq);
            }
        }
        Ok(sequences)
    }
}

#[async_trait]
impl DbClient for PostgresClient {
    fn db_type(&self) -> DbType {
        DbType::Postgres
    }

    async fn list_tables(&self, schema: &str) -> Result<Vec<String>, DbError> {
        let query = r#"
            SELECT table_name::text AS table_name
            FROM information_schema.tables
            WHERE table_schema = $1 AND table_type = 'BASE TABLE'
            ORDER BY table_name
        "#;
        let rows = sqlx::query(query)
            .bind(schema)
            .fetch_all(&self.pool)
            .await
            .map_err(query_error)?;

        rows.iter()
            .map(|row| row.try_get::<String, _>("table_name").map_err(query_error))
            .collect()
    }

    async fn describe_table(&self, schema: &str, table_name: &str) -> Result<TableSchema, DbError> {
        let query = r#"
            SELECT c.column_name::text AS column_name,
                   c.data_type::text AS data_type,
                   c.is_nullable::text AS is_nullable,
                   c.column_default::text AS column_default,
                   EXISTS (
                       SELECT 1
                       FROM information_schema.table_constraints tc
                       JOIN information_schema.key_column_usage kcu
                         ON tc.constraint_name = kcu.constraint_name
                        AND tc.table_schema = kcu.table_schema
                        AND tc.table_name = kcu.table_name
                       WHERE tc.constraint_type = 'PRIMARY KEY'
                         AND tc.table_schema = c.table_schema
                         AND tc.table_name = c.table_name
                         AND kcu.column_name = c.column_name
                   ) AS is_primary
            FROM information_schema.columns c
            WHERE c.table_schema = $1 AND c.table_name = $2
            ORDER BY c.ordinal_position
        "#;
        let rows = sqlx::query(query)
            .bind(schema)
            .bind(table_name)
            .fetch_all(&self.pool)
            .await
            .map_err(query_error)?;

        let columns = rows
            .iter()
            .map(|row| -> Result<ColumnSchema, sqlx::Error> {
                Ok(ColumnSchema {
                    name: row.try_get("column_name")?,
                    data_type: row.try_get("data_type")?,
                    is_nullable: row.try_get::<String, _>("is_nullable")? == "YES",
                    default: row.try_get("column_default")?,
                    is_primary: row.try_get("is_primary")?,
                })
            })
            .collect::<Result<Vec<_>, _>>()
            .map_err(query_error)?;

        Ok(TableSchema {
            table_name: table_name.to_string(),
            columns,
        })
    }

    async fn migrate_table(&self, schema: &str, migration: &TableMigration) -> Result<(), DbError> {
        let mut tx = self.pool.begin().await.map_err(query_error)?;

        for stmt in migration_statements(schema, migration) {
            debug!("{}", stmt);
            sqlx::query(&stmt)
                .execute(&mut *tx)
                .await
                .map_err(migration_error)?;
        }

        tx.commit().await.map_err(migration_error)
    }

    async fn role_exists(&self, role: &str) -> Result<bool, DbError> {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM pg_roles WHERE rolname = $1)")
            .bind(role)
            .fetch_one(&self.pool)
            .await
            .map_err(query_error)
    }

    async fn provision_role(&self, schema: &str, grant: &RoleGrant) -> Result<(), DbError> {
        let mut tx = self.pool.begin().await.map_err(query_error)?;

        for stmt in role_statements(schema, grant) {
            // never log the password
            if !stmt.starts_with("CREATE ROLE") {
                debug!("{}", stmt);
            }
            sqlx::query(&stmt)
                .execute(&mut *tx)
                .await
                .map_err(grant_error)?;
        }

        for table in &grant.tables {
            for seq in Self::owned_sequences(&mut *tx, schema, table).await? {
                let stmt = format!(
                    "GRANT USAGE, SELECT ON SEQUENCE {} TO {}",
                    seq,
                    quote_ident(&grant.username)
                );
                debug!("{}", stmt);
                sqlx::query(&stmt)
                    .execute(&mut *tx)
                    .await
                    .map_err(grant_error)?;
            }
        }

        tx.commit().await.map_err(grant_error)
    }
}

fn query_error(e: sqlx::Error) -> DbError {
    match e {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed => DbError::Connection(e.to_string()),
        other => DbError::Query(other.to_string()),
    }
}

fn is_duplicate_object(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .and_then(|db| db.code())
        .is_some_and(|code| DUPLICATE_OBJECT_CODES.contains(&&*code))
}

fn migration_error(e: sqlx::Error) -> DbError {
    if is_duplicate_object(&e) {
        DbError::AlreadyExists(e.to_string())
    } else {
        DbError::Migration(e.to_string())
    }
}

fn grant_error(e: sqlx::Error) -> DbError {
    if is_duplicate_object(&e) {
        DbError::AlreadyExists(e.to_string())
    } else {
        DbError::Grant(e.to_string())
    }
}

/// Abstract column type to Postgres type. `auto_increment` turns integer
/// types into their serial counterparts.
pub fn native_type(abstract_type: &str, auto_increment: bool) -> Option<&'static str> {
    let native = match abstract_type.trim().to_ascii_lowercase().as_str() {
        "int" | "integer" | "int4" => {
            if auto_increment {
                "serial"
            } else {
                "integer"
            }
        }
        "bigint" | "int8" => {
            if auto_increment {
                "bigserial"
            } else {
                "bigint"
            }
        }
        "smallint" | "int2" => "smallint",
        "string" | "varchar" => "character varying",
        "text" => "text",
        "bool" | "boolean" => "boolean",
        "float" | "real" | "float4" => "real",
        "double" | "float8" => "double precision",
        "numeric" | "decimal" => "numeric",
        "date" => "date",
        "time" | "timestamp" | "datetime" => "timestamp with time zone",
        "uuid" => "uuid",
        "json" | "jsonb" => "jsonb",
        "bytes" | "bytea" => "bytea",
        _ => return None,
    };
    Some(native)
}

pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn qualified(schema: &str, table: &str) -> String {
    format!("{}.{}", quote_ident(schema), quote_ident(table))
}

pub fn column_definition(column: &PlannedColumn) -> String {
    let mut def = format!("{} {}", quote_ident(&column.name), column.native_type);
    if !column.nullable {
        def.push_str(" NOT NULL");
    }
    if let Some(default) = &column.default {
        def.push_str(&format!(" DEFAULT {}", default));
    }
    if column.unique {
        def.push_str(" UNIQUE");
    }
    if column.primary {
        def.push_str(" PRIMARY KEY");
    }
    def
}

pub fn migration_statements(schema: &str, migration: &TableMigration) -> Vec<String> {
    let table = qualified(schema, &migration.table);
    if migration.create_table {
        let columns: Vec<String> = migration.columns.iter().map(column_definition).collect();
        return vec![format!("CREATE TABLE {} ({})", table, columns.join(", "))];
    }

    migration
        .columns
        .iter()
        .map(|c| format!("ALTER TABLE {} ADD COLUMN {}", table, column_definition(c)))
        .collect()
}

/// Role statements up to the table grants. Sequence grants depend on the
/// live tables and are issued separately.
pub fn role_statements(schema: &str, grant: &RoleGrant) -> Vec<String> {
    let role = quote_ident(&grant.username);
    let mut stmts = Vec::new();

    if grant.replace {
        stmts.push(format!("DROP OWNED BY {}", role));
        stmts.push(format!("DROP ROLE {}", role));
    }
    stmts.push(format!(
        "CREATE ROLE {} LOGIN PASSWORD {}",
        role,
        quote_literal(&grant.password)
    ));
    stmts.push(format!("GRANT USAGE ON SCHEMA {} TO {}", quote_ident(schema), role));

    if !grant.tables.is_empty() && !grant.privileges.is_empty() {
        let privileges: Vec<String> = grant.privileges.iter().map(|p| p.to_string()).collect();
        for table in &grant.tables {
            stmts.push(format!(
                "GRANT {} ON TABLE {} TO {}",
                privileges.join(", "),
                qualified(schema, table),
                role
            ));
        }
    }

    stmts
}
