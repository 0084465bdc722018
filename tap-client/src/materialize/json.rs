//! JSON reader
//!
//! Expects the layout TAP services use for `FORMAT=json`:
//! `{"metadata": [{"name": ..., "datatype": ..., "unit": ...}], "data": [[...], ...]}`.

use serde::Deserialize;
use serde_json::Value;
use tap_core::{Column, Table};

use super::{ParseError, ResultParser};

/// Reader for `json` results
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonParser;

#[derive(Debug, Deserialize)]
struct JsonResult {
    metadata: Vec<JsonColumn>,
    #[serde(default)]
    data: Vec<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
struct JsonColumn {
    name: String,
    datatype: Option<String>,
    unit: Option<String>,
}

impl ResultParser for JsonParser {
    fn parse(&self, payload: &[u8]) -> Result<Table, ParseError> {
        let result: JsonResult = serde_json::from_slice(payload)
            .map_err(|e| ParseError(format!("invalid JSON result: {}", e)))?;

        let columns = result
            .metadata
            .into_iter()
            .map(|c| Column {
                name: c.name,
                datatype: c.datatype,
                unit: c.unit,
            })
            .collect();
        let mut table = Table::new(columns);

        for (index, row) in result.data.into_iter().enumerate() {
            let row = row.into_iter().map(cell_text).collect();
            table
                .push_row(row)
                .map_err(|_| ParseError(format!("JSON row {} has the wrong number of cells", index)))?;
        }

        Ok(table)
    }
}

fn cell_text(value: Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s,
        other => other.to_string(),
    }
}
