use log::info;

use crate::{
    db::DbClient,
    errors::DbError,
    models::schema::Models,
    schema::{diff::missing_columns, introspect::introspect},
};

/// Strict read-only check that every declared table and column exists,
/// whatever the model's `auto_migration` flag.
pub async fn verify(client: &dyn DbClient, schema: &str, models: &Models) -> Result<(), DbError> {
    let live = introspect(client, schema).await?;
    let missing = missing_columns(models, &live);
    if !missing.is_empty() {
        return Err(DbError::SchemaMismatch { missing });
    }

    info!("schema {} matches {} declared models", schema, models.len());
    Ok(())
}
