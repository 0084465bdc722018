//! VOTable reader
//!
//! Reads the first TABLE of a VOTable document serialized as TABLEDATA.
//! BINARY, BINARY2 and FITS serializations are reported as unsupported.

use tap_core::{Column, Table};

use super::{ParseError, ResultParser};
use crate::xml::{Node, attribute, walk};

/// Reader for `votable` results
#[derive(Debug, Clone, Copy, Default)]
pub struct VoTableParser;

#[derive(Default)]
struct State {
    seen_root: bool,
    table_depth: Option<usize>,
    finished: bool,
    depth: usize,
    columns: Vec<Column>,
    table: Option<Table>,
    row: Option<Vec<String>>,
    cell: Option<String>,
    status_error: Option<String>,
    status_info: bool,
}

impl ResultParser for VoTableParser {
    fn parse(&self, payload: &[u8]) -> Result<Table, ParseError> {
        let mut state = State::default();

        walk(payload, |node| visit(&mut state, node)).map_err(ParseError)?;

        if let Some(message) = state.status_error {
            return Err(ParseError(format!("service reported an error: {}", message)));
        }
        match state.table {
            Some(table) if state.finished => Ok(table),
            Some(_) => Err(ParseError::new("TABLE element not closed")),
            None if state.columns.is_empty() => Err(ParseError::new("document has no TABLE")),
            // A TABLE with fields but no DATA is an empty result
            None => Ok(Table::new(state.columns)),
        }
    }
}

fn visit(state: &mut State, node: Node) -> Result<(), String> {
    match node {
        Node::Open { name, attributes } => {
            if !state.seen_root {
                if name != "VOTABLE" {
                    return Err(format!("expected VOTABLE root element, found {}", name));
                }
                state.seen_root = true;
            }
            state.depth += 1;

            if name == "INFO" && attribute(&attributes, "name") == Some("QUERY_STATUS") {
                let value = attribute(&attributes, "value").unwrap_or_default();
                if value.eq_ignore_ascii_case("ERROR") {
                    state.status_error = Some("query failed".to_string());
                    state.status_info = true;
                }
                return Ok(());
            }

            if state.finished {
                return Ok(());
            }

            match name.as_str() {
                "TABLE" if state.table_depth.is_none() => state.table_depth = Some(state.depth),
                "FIELD" if state.table_depth.is_some() => {
                    let name = attribute(&attributes, "name")
                        .or_else(|| attribute(&attributes, "ID"))
                        .ok_or_else(|| "FIELD without name".to_string())?;
                    state.columns.push(Column {
                        name: name.to_string(),
                        datatype: attribute(&attributes, "datatype").map(str::to_string),
                        unit: attribute(&attributes, "unit").map(str::to_string),
                    });
                }
                "TABLEDATA" if state.table_depth.is_some() => {
                    state.table = Some(Table::new(state.columns.clone()));
                }
                "BINARY" | "BINARY2" | "FITS" if state.table_depth.is_some() => {
                    return Err(format!(
                        "{} serialization is not supported, request TABLEDATA",
                        name
                    ));
                }
                "TR" if state.table.is_some() => state.row = Some(Vec::new()),
                "TD" if state.row.is_some() => state.cell = Some(String::new()),
                _ => {}
            }
        }
        Node::Text(text) => {
            if let Some(cell) = state.cell.as_mut() {
                cell.push_str(&text);
            } else if state.status_info {
                state.status_error = Some(text);
            }
        }
        Node::Close(name) => {
            let closing_depth = state.depth;
            state.depth = state.depth.saturating_sub(1);

            match name.as_str() {
                "INFO" => state.status_info = false,
                "TD" => {
                    if let (Some(cell), Some(row)) = (state.cell.take(), state.row.as_mut()) {
                        row.push(cell);
                    }
                }
                "TR" => {
                    if let (Some(row), Some(table)) = (state.row.take(), state.table.as_mut()) {
                        let index = table.len();
                        let width = table.columns().len();
                        table.push_row(row).map_err(|row| {
                            format!(
                                "row {} has {} cells, expected {}",
                                index,
                                row.len(),
                                width
                            )
                        })?;
                    }
                }
                "TABLE" if state.table_depth == Some(closing_depth) && !state.finished => {
                    state.finished = true;
                    if state.table.is_none() && !state.columns.is_empty() {
                        state.table = Some(Table::new(state.columns.clone()));
                    }
                }
                _ => {}
            }
        }
    }
    Ok(())
}

/// Message of a `QUERY_STATUS=ERROR` INFO element, if the payload has one
///
/// Services answer failed synchronous queries with a VOTable that carries no
/// table and this INFO element instead.
pub fn query_status_error(payload: &[u8]) -> Option<String> {
    let mut in_status = false;
    let mut message: Option<String> = None;

    let result = walk(payload, |node| {
        match node {
            Node::Open { name, attributes } if name == "INFO" => {
                let is_status = attribute(&attributes, "name") == Some("QUERY_STATUS");
                let is_error = attribute(&attributes, "value")
                    .is_some_and(|v| v.eq_ignore_ascii_case("ERROR"));
                if is_status && is_error {
                    in_status = true;
                    message.get_or_insert_with(|| "query failed".to_string());
                }
            }
            Node::Text(text) if in_status => message = Some(text),
            Node::Close(name) if name == "INFO" => in_status = false,
            _ => {}
        }
        Ok(())
    });

    result.ok().and(message)
}
