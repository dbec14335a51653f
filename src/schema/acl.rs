use std::fmt;

use log::{info, warn};

use crate::{
    db::DbClient,
    errors::DbError,
    models::schema::{DbUser, Models},
    schema::introspect::introspect,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Privilege {
    Select,
    Insert,
    Update,
    Delete,
}

impl fmt::Display for Privilege {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Privilege::Select => "SELECT",
            Privilege::Insert => "INSERT",
            Privilege::Update => "UPDATE",
            Privilege::Delete => "DELETE",
        })
    }
}

/// What the dashboard needs on every managed table.
pub const DASHBOARD_PRIVILEGES: [Privilege; 4] = [
    Privilege::Select,
    Privilege::Insert,
    Privilege::Update,
    Privilege::Delete,
];

/// A role and the exact set of tables it may touch.
#[derive(Debug, Clone, PartialEq)]
pub struct RoleGrant {
    pub username: String,
    pub password: String,
    pub tables: Vec<String>,
    pub privileges: Vec<Privilege>,
    /// Drop the existing role (and everything granted to it) first.
    pub replace: bool,
}

/// Provisions `username` with access to exactly the tables of `models`.
///
/// An existing role is only replaced when `force_recreate` is set, otherwise
/// the call fails with [`DbError::RoleExists`] and nothing changes.
pub async fn create_user_with_acl(
    client: &dyn DbClient,
    schema: &str,
    models: &Models,
    username: &str,
    password: &str,
    force_recreate: bool,
) -> Result<DbUser, DbError> {
    if username.trim().is_empty() {
        return Err(DbError::Config("user_with_acl.username is empty".to_string()));
    }

    let exists = client.role_exists(username).await?;
    if exists && !force_recreate {
        return Err(DbError::RoleExists(username.to_string()));
    }

    let tables = models.table_names();
    let live = introspect(client, schema).await?;
    let absent: Vec<&str> = tables
        .iter()
        .filter(|t| !live.contains_key(t.as_str()))
        .map(String::as_str)
        .collect();
    if !absent.is_empty() {
        return Err(DbError::Grant(format!(
            "tables do not exist in schema {}: {}",
            schema,
            absent.join(", ")
        )));
    }

    let grant = RoleGrant {
        username: username.to_string(),
        password: password.to_string(),
        tables,
        privileges: DASHBOARD_PRIVILEGES.to_vec(),
        replace: exists,
    };

    match client.provision_role(schema, &grant).await {
        Ok(()) => {}
        Err(DbError::AlreadyExists(reason)) => {
            warn!("role {} was created concurrently: {}", username, reason);
            return Err(DbError::RoleExists(username.to_string()));
        }
        Err(e) => return Err(e),
    }

    info!(
        "{} role {} with access to {} tables",
        if exists { "recreated" } else { "created" },
        username,
        grant.tables.len()
    );

    Ok(DbUser {
        username: grant.username,
        password: grant.password,
    })
}
