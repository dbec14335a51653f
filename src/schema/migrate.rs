use log::{debug, info, warn};

use crate::{
    db::DbClient,
    errors::DbError,
    models::{
        connections::DbType,
        schema::{LiveSchema, Models},
    },
    schema::{
        diff::{diff_table, missing_columns, MissingMap, TableDiff},
        introspect::{introspect, introspect_table},
    },
};

/// A declared column with its type resolved for the target engine.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedColumn {
    pub name: String,
    pub native_type: String,
    pub nullable: bool,
    pub primary: bool,
    pub unique: bool,
    pub default: Option<String>,
}

/// Statements to bring one table up to its declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct TableMigration {
    pub table: String,
    /// Create the table with every column instead of adding columns.
    pub create_table: bool,
    pub columns: Vec<PlannedColumn>,
}

/// Resolves every column of `diff`, failing before anything is executed.
pub fn plan_table(db_type: DbType, diff: &TableDiff) -> Result<TableMigration, DbError> {
    let mut columns = diff
        .columns
        .iter()
        .map(|col| -> Result<PlannedColumn, DbError> {
            let native_type = db_type.native_type(col).ok_or_else(|| DbError::UnsupportedType {
                table: diff.table.clone(),
                column: col.name.clone(),
                declared: col.col_type.clone(),
            })?;
            Ok(PlannedColumn {
                name: col.name.clone(),
                native_type,
                nullable: col.is_nullable && !col.is_primary,
                primary: col.is_primary,
                unique: col.has_tag("unique"),
                default: col.default_value().map(str::to_string),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    if diff.table_missing {
        // stable: primary key first, the rest keep declared order
        columns.sort_by_key(|c| !c.primary);
    }

    Ok(TableMigration {
        table: diff.table.clone(),
        create_table: diff.table_missing,
        columns,
    })
}

/// Applies `missing` table by table in declaration order. Each table is
/// migrated atomically; the first failing table stops the run.
pub async fn apply(client: &dyn DbClient, schema: &str, missing: &MissingMap) -> Result<(), DbError> {
    for diff in &missing.table_diffs {
        let migration = plan_table(client.db_type(), diff)?;
        debug!("migration plan for {}.{}: {:?}", schema, diff.table, migration);

        match client.migrate_table(schema, &migration).await {
            Ok(()) => {
                if migration.create_table {
                    info!("created table {}.{}", schema, migration.table);
                } else {
                    let names: Vec<&str> = migration.columns.iter().map(|c| c.name.as_str()).collect();
                    info!("added columns to {}.{}: {}", schema, migration.table, names.join(", "));
                }
            }
            Err(DbError::AlreadyExists(reason)) => {
                resolve_concurrent_creation(client, schema, diff, &reason).await?
            }
            Err(e) => return Err(e),
        }
    }

    Ok(())
}

/// A duplicate-object error is benign when another creator already brought
/// the table up to date.
async fn resolve_concurrent_creation(
    client: &dyn DbClient,
    schema: &str,
    diff: &TableDiff,
    reason: &str,
) -> Result<(), DbError> {
    let live: LiveSchema = introspect_table(client, schema, &diff.table)
        .await?
        .into_iter()
        .map(|t| (diff.table.clone(), t))
        .collect();

    match diff_table(&diff.table, &diff.columns, &live) {
        None => {
            warn!(
                "{}.{} was migrated concurrently ({}), nothing left to apply",
                schema, diff.table, reason
            );
            Ok(())
        }
        Some(still) => {
            let names: Vec<&str> = still.columns.iter().map(|c| c.name.as_str()).collect();
            Err(DbError::Migration(format!(
                "table {}: {} (still missing: {})",
                diff.table,
                reason,
                names.join(", ")
            )))
        }
    }
}

/// Diffs the auto-migratable models against the store and applies the
/// result. Models without `auto_migration` are never touched.
pub async fn auto_migrate(
    client: &dyn DbClient,
    schema: &str,
    models: &Models,
) -> Result<MissingMap, DbError> {
    let eligible = models.auto_migratable();
    if eligible.is_empty() {
        debug!("no models flagged for auto migration");
        return Ok(MissingMap::default());
    }

    let live = introspect(client, schema).await?;
    let missing = missing_columns(&eligible, &live);
    if missing.is_empty() {
        info!("schema {} is up to date", schema);
        return Ok(missing);
    }

    apply(client, schema, &missing).await?;
    Ok(missing)
}
