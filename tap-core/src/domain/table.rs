//! Tabular query results

use serde::{Deserialize, Serialize};

/// Column description
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub datatype: Option<String>,
    pub unit: Option<String>,
}

impl Column {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            datatype: None,
            unit: None,
        }
    }
}

/// An in-memory result table
///
/// Cells are kept as the text the service sent; empty strings stand for
/// nulls. Every row has exactly one cell per column.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawTable")]
pub struct Table {
    columns: Vec<Column>,
    rows: Vec<Vec<String>>,
}

/// Unchecked wire shape of a `Table`
#[derive(Deserialize)]
struct RawTable {
    columns: Vec<Column>,
    rows: Vec<Vec<String>>,
}

impl TryFrom<RawTable> for Table {
    type Error = String;

    fn try_from(raw: RawTable) -> Result<Self, Self::Error> {
        let width = raw.columns.len();
        let mut table = Table::new(raw.columns);
        for (index, row) in raw.rows.into_iter().enumerate() {
            table.push_row(row).map_err(|row| {
                format!("row {} has {} cells, expected {}", index, row.len(), width)
            })?;
        }
        Ok(table)
    }
}

impl Table {
    pub fn new(columns: Vec<Column>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Append a row
    ///
    /// Returns the row back if its width does not match the column count.
    pub fn push_row(&mut self, row: Vec<String>) -> Result<(), Vec<String>> {
        if row.len() != self.columns.len() {
            return Err(row);
        }
        self.rows.push(row);
        Ok(())
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Position of a column, matched case-insensitively
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    /// Value of one cell
    pub fn cell(&self, row: usize, column: &str) -> Option<&str> {
        let index = self.column_index(column)?;
        self.rows.get(row)?.get(index).map(String::as_str)
    }

    /// All values of one column
    pub fn column(&self, name: &str) -> Option<Vec<&str>> {
        let index = self.column_index(name)?;
        Some(
            self.rows
                .iter()
                .filter_map(|r| r.get(index).map(String::as_str))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Table {
        let mut table = Table::new(vec![Column::new("source_id"), Column::new("ra")]);
        table
            .push_row(vec!["1".to_string(), "10.5".to_string()])
            .unwrap();
        table
            .push_row(vec!["2".to_string(), "11.0".to_string()])
            .unwrap();
        table
    }

    #[test]
    fn test_table_access() {
        let table = sample();
        assert_eq!(table.len(), 2);
        assert_eq!(table.column_names(), vec!["source_id", "ra"]);
        assert_eq!(table.cell(1, "RA"), Some("11.0"));
        assert_eq!(table.column("source_id"), Some(vec!["1", "2"]));
        assert_eq!(table.cell(5, "ra"), None);
        assert_eq!(table.column("dec"), None);
    }

    #[test]
    fn test_push_row_rejects_wrong_width() {
        let mut table = sample();
        let rejected = table.push_row(vec!["3".to_string()]);
        assert_eq!(rejected, Err(vec!["3".to_string()]));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_deserialize_checks_row_width() {
        let table: Table = serde_json::from_str(
            r#"{"columns":[{"name":"a","datatype":null,"unit":null}],"rows":[["1"],["2"]]}"#,
        )
        .unwrap();
        assert_eq!(table.column("a"), Some(vec!["1", "2"]));

        let ragged = serde_json::from_str::<Table>(
            r#"{"columns":[{"name":"a","datatype":null,"unit":null}],"rows":[[]]}"#,
        );
        let err = ragged.unwrap_err().to_string();
        assert!(err.contains("row 0 has 0 cells"), "{err}");
    }

    #[test]
    fn test_serialized_table_reads_back() {
        let table = sample();
        let json = serde_json::to_string(&table).unwrap();
        assert_eq!(serde_json::from_str::<Table>(&json).unwrap(), table);
    }
}
