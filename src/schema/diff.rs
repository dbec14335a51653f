//! Structural diff between declared models and the live schema.
//!
//! The diff is additive only: it reports declared tables and columns that are
//! absent from the store. Extra live structures and type, nullability or
//! default mismatches on existing columns are never reported.
//!
//! Names are compared exactly. DDL quotes every identifier, so a declared
//! `Email` is created as `Email` and matches on the next run.

use std::{collections::HashSet, fmt};

use serde::Serialize;

use crate::models::schema::{Column, LiveSchema, Models};

/// Missing structure for one declared table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableDiff {
    pub table: String,
    /// The table itself does not exist.
    pub table_missing: bool,
    /// Missing columns in declared order.
    pub columns: Vec<Column>,
}

/// Declared table name to missing columns, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MissingMap {
    pub table_diffs: Vec<TableDiff>,
}

impl MissingMap {
    pub fn is_empty(&self) -> bool {
        self.table_diffs.is_empty()
    }

    pub fn get(&self, table: &str) -> Option<&TableDiff> {
        self.table_diffs.iter().find(|d| d.table == table)
    }

    pub fn tables(&self) -> Vec<&str> {
        self.table_diffs.iter().map(|d| d.table.as_str()).collect()
    }

    /// Every missing `(table, column)` pair.
    pub fn missing_pairs(&self) -> Vec<(&str, &str)> {
        self.table_diffs
            .iter()
            .flat_map(|d| {
                d.columns
                    .iter()
                    .map(move |c| (d.table.as_str(), c.name.as_str()))
            })
            .collect()
    }
}

impl fmt::Display for MissingMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .table_diffs
            .iter()
            .map(|d| {
                let cols: Vec<&str> = d.columns.iter().map(|c| c.name.as_str()).collect();
                if d.table_missing {
                    format!("missing table {} ({})", d.table, cols.join(", "))
                } else {
                    cols.iter()
                        .map(|c| format!("missing column {}.{}", d.table, c))
                        .collect::<Vec<_>>()
                        .join(", ")
                }
            })
            .collect();
        f.write_str(&parts.join("; "))
    }
}

/// Computes the missing tables and columns of `models` against `live`.
pub fn missing_columns(models: &Models, live: &LiveSchema) -> MissingMap {
    let table_diffs = models
        .columns_by_table_name()
        .into_iter()
        .filter_map(|(table, declared)| diff_table(&table, &declared, live))
        .collect();

    MissingMap { table_diffs }
}

/// Diffs one grouped table. Repeated declarations of a column name count once.
pub fn diff_table(table: &str, declared: &[Column], live: &LiveSchema) -> Option<TableDiff> {
    let mut seen = HashSet::new();
    let unique = declared.iter().filter(|c| seen.insert(c.name.clone()));

    match live.get(table) {
        None => Some(TableDiff {
            table: table.to_string(),
            table_missing: true,
            columns: unique.cloned().collect(),
        }),
        Some(existing) => {
            let columns: Vec<Column> = unique
                .filter(|c| !existing.has_column(&c.name))
                .cloned()
                .collect();
            (!columns.is_empty()).then(|| TableDiff {
                table: table.to_string(),
                table_missing: false,
                columns,
            })
        }
    }
}
