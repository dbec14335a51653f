use log::debug;

use crate::{
    db::DbClient,
    errors::DbError,
    models::schema::{LiveSchema, TableSchema},
};

/// Reads every table of `schema` with its columns.
pub async fn introspect(client: &dyn DbClient, schema: &str) -> Result<LiveSchema, DbError> {
    let mut live = LiveSchema::new();
    for table in client.list_tables(schema).await? {
        let described = client.describe_table(schema, &table).await?;
        live.insert(table, described);
    }
    debug!("introspected {} tables in schema {}", live.len(), schema);
    Ok(live)
}

/// Reads one table, `None` when it does not exist.
pub async fn introspect_table(
    client: &dyn DbClient,
    schema: &str,
    table: &str,
) -> Result<Option<TableSchema>, DbError> {
    if !client.list_tables(schema).await?.iter().any(|t| t == table) {
        return Ok(None);
    }
    client.describe_table(schema, table).await.map(Some)
}
