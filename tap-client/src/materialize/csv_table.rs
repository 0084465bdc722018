//! CSV reader

use csv::ReaderBuilder;
use tap_core::{Column, Table};

use super::{ParseError, ResultParser};

/// Reader for `csv` results: a header line followed by data rows
#[derive(Debug, Clone, Copy, Default)]
pub struct CsvParser;

impl ResultParser for CsvParser {
    fn parse(&self, payload: &[u8]) -> Result<Table, ParseError> {
        let mut reader = ReaderBuilder::new().has_headers(true).from_reader(payload);

        let headers = reader
            .headers()
            .map_err(|e| ParseError(format!("invalid CSV header: {}", e)))?;
        if headers.is_empty() || headers.iter().all(str::is_empty) {
            return Err(ParseError::new("CSV payload has no header line"));
        }

        let mut table = Table::new(headers.iter().map(Column::new).collect());

        for (index, record) in reader.records().enumerate() {
            let record = record.map_err(|e| ParseError(format!("invalid CSV row {}: {}", index, e)))?;
            let row = record.iter().map(str::to_string).collect();
            table
                .push_row(row)
                .map_err(|_| ParseError(format!("CSV row {} has the wrong number of cells", index)))?;
        }

        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_header_and_rows() {
        let payload = b"source_id,ra,dec\n1,10.5,-3.25\n2,11.0,\n3,\"12,75\",4.0\n";
        let table = CsvParser.parse(payload).unwrap();
        assert_eq!(table.column_names(), vec!["source_id", "ra", "dec"]);
        assert_eq!(table.len(), 3);
        assert_eq!(table.cell(1, "dec"), Some(""));
        assert_eq!(table.cell(2, "ra"), Some("12,75"));
    }

    #[test]
    fn test_header_only_is_empty_table() {
        let table = CsvParser.parse(b"a,b\n").unwrap();
        assert!(table.is_empty());
        assert_eq!(table.column_names(), vec!["a", "b"]);
    }

    #[test]
    fn test_rejects_ragged_rows() {
        let err = CsvParser.parse(b"a,b\n1,2\n3\n").unwrap_err();
        assert!(err.0.contains("row 1"), "{}", err);
    }

    #[test]
    fn test_rejects_empty_payload() {
        assert!(CsvParser.parse(b"").is_err());
    }
}
