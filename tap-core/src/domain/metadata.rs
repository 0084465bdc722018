//! Service table metadata

use serde::{Deserialize, Serialize};

/// A column published by a service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMeta {
    pub name: String,
    pub datatype: Option<String>,
    pub unit: Option<String>,
    pub description: Option<String>,
}

/// A table published by a service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableMeta {
    pub schema: String,
    pub name: String,
    pub description: Option<String>,
    pub columns: Vec<ColumnMeta>,
}

impl TableMeta {
    /// Name as written in ADQL
    ///
    /// Services differ on whether the table name already carries its schema
    /// prefix, so the prefix is only added when missing.
    pub fn qualified_name(&self) -> String {
        if self.schema.is_empty() || self.name.contains('.') {
            self.name.clone()
        } else {
            format!("{}.{}", self.schema, self.name)
        }
    }

    pub fn column(&self, name: &str) -> Option<&ColumnMeta> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }
}
