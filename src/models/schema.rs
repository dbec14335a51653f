use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::errors::DbError;

/// A declared column.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct Column {
    pub name: String,
    #[serde(rename = "type")]
    pub col_type: String,
    /// Free-form constraint hints, e.g. `"unique"` or `"auto_increment"`.
    #[serde(default)]
    pub tags: String,
    #[serde(default)]
    pub is_nullable: bool,
    #[serde(default)]
    pub is_primary: bool,
    #[serde(default)]
    pub default_value: String,
}

impl Column {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags
            .split(|c: char| c == ',' || c.is_whitespace())
            .any(|t| t.eq_ignore_ascii_case(tag))
    }

    pub fn default_value(&self) -> Option<&str> {
        let value = self.default_value.trim();
        (!value.is_empty()).then_some(value)
    }
}

/// A declared table the agent manages.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct Model {
    pub table_name: String,
    #[serde(default)]
    pub columns: Vec<Column>,
    /// Create the table or add its missing columns on startup.
    #[serde(default)]
    pub auto_migration: bool,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub name_display_column: String,
}

impl Model {
    pub fn validate(&self) -> Result<(), DbError> {
        if self.table_name.trim().is_empty() {
            return Err(DbError::Config("model with empty table_name".to_string()));
        }

        let mut seen = HashSet::new();
        let mut primary = 0;
        for col in &self.columns {
            if col.name.trim().is_empty() {
                return Err(DbError::Config(format!(
                    "table {}: column with empty name",
                    self.table_name
                )));
            }
            if !seen.insert(col.name.as_str()) {
                return Err(DbError::Config(format!(
                    "table {}: duplicate column {}",
                    self.table_name, col.name
                )));
            }
            if col.is_primary {
                primary += 1;
                if col.is_nullable {
                    return Err(DbError::Config(format!(
                        "table {}: primary key {} cannot be nullable",
                        self.table_name, col.name
                    )));
                }
            }
        }
        if primary > 1 {
            return Err(DbError::Config(format!(
                "table {}: more than one primary key column",
                self.table_name
            )));
        }

        Ok(())
    }
}

/// Ordered list of declared models.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(transparent)]
pub struct Models(pub Vec<Model>);

impl Models {
    pub fn iter(&self) -> std::slice::Iter<'_, Model> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Validates each model, then each table group merged from models that
    /// share a table name.
    pub fn validate(&self) -> Result<(), DbError> {
        self.iter().try_for_each(Model::validate)?;

        for (table, columns) in self.columns_by_table_name() {
            let primary: HashSet<&str> = columns
                .iter()
                .filter(|c| c.is_primary)
                .map(|c| c.name.as_str())
                .collect();
            if primary.len() > 1 {
                return Err(DbError::Config(format!(
                    "table {}: more than one primary key column across models",
                    table
                )));
            }
        }

        Ok(())
    }

    /// Models flagged for auto migration, in declaration order.
    pub fn auto_migratable(&self) -> Models {
        Models(self.iter().filter(|m| m.auto_migration).cloned().collect())
    }

    /// Columns grouped by table name in order of first appearance. Models
    /// sharing a table name append their columns to the same group.
    pub fn columns_by_table_name(&self) -> Vec<(String, Vec<Column>)> {
        let mut res: Vec<(String, Vec<Column>)> = Vec::new();
        for m in self.iter() {
            match res.iter_mut().find(|(name, _)| *name == m.table_name) {
                Some((_, cols)) => cols.extend(m.columns.iter().cloned()),
                None => res.push((m.table_name.clone(), m.columns.clone())),
            }
        }
        res
    }

    /// Distinct table names in order of first appearance.
    pub fn table_names(&self) -> Vec<String> {
        self.columns_by_table_name()
            .into_iter()
            .map(|(name, _)| name)
            .collect()
    }
}

/// A table as it exists in the store.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TableSchema {
    pub table_name: String,
    pub columns: Vec<ColumnSchema>,
}

impl TableSchema {
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ColumnSchema {
    pub name: String,
    pub data_type: String,
    pub is_nullable: bool,
    pub default: Option<String>,
    pub is_primary: bool,
}

/// Live tables of one schema keyed by name. A missing key means the table
/// does not exist; an empty column list means it exists without columns.
pub type LiveSchema = BTreeMap<String, TableSchema>;

/// Role descriptor returned after provisioning.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct DbUser {
    pub username: String,
    pub password: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(name: &str) -> Column {
        Column {
            name: name.to_string(),
            col_type: "string".to_string(),
            is_nullable: true,
            ..Default::default()
        }
    }

    fn model(table: &str, cols: &[&str]) -> Model {
        Model {
            table_name: table.to_string(),
            columns: cols.iter().map(|c| col(c)).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_columns_by_table_name_keeps_every_column() {
        let models = Models(vec![
            model("users", &["id", "name"]),
            model("posts", &["id"]),
            model("users", &["email", "name"]),
        ]);

        let grouped = models.columns_by_table_name();
        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped[0].0, "users");
        let names: Vec<&str> = grouped[0].1.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["id", "name", "email", "name"]);
        assert_eq!(grouped[1].0, "posts");

        let total: usize = grouped.iter().map(|(_, cols)| cols.len()).sum();
        let declared: usize = models.iter().map(|m| m.columns.len()).sum();
        assert_eq!(total, declared);
    }

    #[test]
    fn test_auto_migratable_filters() {
        let mut a = model("a", &["id"]);
        a.auto_migration = true;
        let models = Models(vec![a, model("b", &["id"])]);
        assert_eq!(models.auto_migratable().table_names(), vec!["a"]);
    }

    #[test]
    fn test_validate_rejects_nullable_primary_key() {
        let mut m = model("users", &["id"]);
        m.columns[0].is_primary = true;
        m.columns[0].is_nullable = true;
        assert!(matches!(m.validate(), Err(DbError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_two_primary_keys() {
        let mut m = model("users", &["id", "uid"]);
        for c in m.columns.iter_mut() {
            c.is_primary = true;
            c.is_nullable = false;
        }
        assert!(m.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_primary_keys_split_across_models() {
        let mut first = model("users", &["id", "name"]);
        first.columns[0].is_primary = true;
        first.columns[0].is_nullable = false;
        let mut second = model("users", &["uid"]);
        second.columns[0].is_primary = true;
        second.columns[0].is_nullable = false;
        assert!(first.validate().is_ok());
        assert!(second.validate().is_ok());

        let models = Models(vec![first.clone(), second]);
        match models.validate() {
            Err(DbError::Config(msg)) => assert!(msg.contains("users")),
            other => panic!("unexpected result: {:?}", other),
        }

        // The same primary key repeated across models is one column.
        assert!(Models(vec![first.clone(), first]).validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_duplicate_column() {
        assert!(model("users", &["id", "id"]).validate().is_err());
        assert!(model("users", &["id", "name"]).validate().is_ok());
    }

    #[test]
    fn test_has_tag() {
        let mut c = col("id");
        c.tags = "unique, auto_increment".to_string();
        assert!(c.has_tag("unique"));
        assert!(c.has_tag("AUTO_INCREMENT"));
        assert!(!c.has_tag("index"));
    }

    #[test]
    fn test_model_deserializes_type_field() {
        let m: Model = serde_json::from_str(
            r#"{"table_name":"users","columns":[{"name":"id","type":"int","is_primary":true}],"auto_migration":true}"#,
        )
        .unwrap();
        assert_eq!(m.columns[0].col_type, "int");
        assert!(m.columns[0].is_primary);
        assert!(!m.columns[0].is_nullable);
    }
}
