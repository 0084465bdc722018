//! Table metadata (VOSI tables)
//!
//! `TapClient::tables` reads the service's table set on every call.
//! `MetadataCache` keeps one copy for callers that look tables up often;
//! the caller owns it and decides when it is invalidated.

use std::time::{Duration, Instant};
use tap_core::{ColumnMeta, TableMeta};
use tracing::debug;

use crate::TapClient;
use crate::error::{Result, TapError, snippet};
use crate::transport::HttpRequest;
use crate::xml::{Node, walk};

impl TapClient {
    /// List the tables published by the service
    ///
    /// Issues `GET <base>/tables` and reads the VOSI table set.
    pub async fn tables(&self) -> Result<Vec<TableMeta>> {
        let url = format!("{}/tables", self.base_url);
        let request = HttpRequest::get(url).with_timeout(self.request_timeout);
        let response = self.transport.execute(request).await?;
        if !response.is_success() {
            return Err(TapError::api_error(response.status, snippet(&response.body)));
        }

        let tables = parse_tableset(&response.body).map_err(TapError::Protocol)?;
        debug!(tables = tables.len(), "Read table metadata");
        Ok(tables)
    }
}

/// Caller-owned cache of a service's table metadata
#[derive(Debug, Clone, Default)]
pub struct MetadataCache {
    tables: Option<Vec<TableMeta>>,
    fetched_at: Option<Instant>,
    max_age: Option<Duration>,
}

impl MetadataCache {
    /// A cache that keeps its contents until invalidated
    pub fn new() -> Self {
        Self::default()
    }

    /// Refetch once the cached copy is older than `max_age`
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    pub fn is_cached(&self) -> bool {
        self.tables.is_some() && !self.is_expired()
    }

    /// Cached tables, fetched through `client` when missing or expired
    pub async fn get_or_fetch(&mut self, client: &TapClient) -> Result<&[TableMeta]> {
        if !self.is_cached() {
            let tables = client.tables().await?;
            self.tables = Some(tables);
            self.fetched_at = Some(Instant::now());
        }
        Ok(self.tables.as_deref().unwrap_or_default())
    }

    /// Look a table up by name, with or without its schema prefix
    pub async fn table(&mut self, client: &TapClient, name: &str) -> Result<Option<&TableMeta>> {
        let tables = self.get_or_fetch(client).await?;
        Ok(tables.iter().find(|table| matches_name(table, name)))
    }

    /// Drop the cached copy; the next lookup refetches
    pub fn invalidate(&mut self) {
        self.tables = None;
        self.fetched_at = None;
    }

    fn is_expired(&self) -> bool {
        match (self.max_age, self.fetched_at) {
            (Some(max_age), Some(fetched_at)) => fetched_at.elapsed() >= max_age,
            _ => false,
        }
    }
}

/// Services publish table names bare or already schema-qualified
fn matches_name(table: &TableMeta, name: &str) -> bool {
    let bare = table
        .name
        .rsplit_once('.')
        .map_or(table.name.as_str(), |(_, bare)| bare);
    table.qualified_name().eq_ignore_ascii_case(name)
        || table.name.eq_ignore_ascii_case(name)
        || bare.eq_ignore_ascii_case(name)
}

/// Read a VOSI `tableset` document
pub(crate) fn parse_tableset(document: &[u8]) -> std::result::Result<Vec<TableMeta>, String> {
    let mut tables = Vec::new();
    let mut stack: Vec<String> = Vec::new();
    let mut schema = String::new();
    let mut table: Option<TableMeta> = None;
    let mut column: Option<ColumnMeta> = None;
    let mut saw_tableset = false;

    walk(document, |node| {
        match node {
            Node::Open { name, .. } => {
                match name.as_str() {
                    "tableset" => saw_tableset = true,
                    "schema" => schema.clear(),
                    "table" => {
                        table = Some(TableMeta {
                            schema: schema.clone(),
                            name: String::new(),
                            description: None,
                            columns: Vec::new(),
                        })
                    }
                    "column" => {
                        column = Some(ColumnMeta {
                            name: String::new(),
                            datatype: None,
                            unit: None,
                            description: None,
                        })
                    }
                    _ => {}
                }
                stack.push(name);
            }
            Node::Text(text) => {
                let current = stack.last().map(String::as_str);
                let parent = stack.iter().rev().nth(1).map(String::as_str);
                match (parent, current) {
                    (Some("schema"), Some("name")) => schema = text,
                    (Some("table"), Some("name")) => {
                        if let Some(table) = table.as_mut() {
                            table.name = text;
                        }
                    }
                    (Some("table"), Some("description")) => {
                        if let Some(table) = table.as_mut() {
                            table.description = Some(text);
                        }
                    }
                    (Some("column"), Some(field)) => {
                        if let Some(column) = column.as_mut() {
                            match field {
                                "name" => column.name = text,
                                "unit" => column.unit = Some(text),
                                "description" => column.description = Some(text),
                                "dataType" => column.datatype = Some(text),
                                _ => {}
                            }
                        }
                    }
                    _ => {}
                }
            }
            Node::Close(name) => {
                match name.as_str() {
                    "column" => {
                        if let (Some(column), Some(table)) = (column.take(), table.as_mut()) {
                            table.columns.push(column);
                        }
                    }
                    "table" => {
                        if let Some(table) = table.take() {
                            if table.name.is_empty() {
                                return Err("table without a name".to_string());
                            }
                            tables.push(table);
                        }
                    }
                    _ => {}
                }
                stack.pop();
            }
        }
        Ok(())
    })?;

    if !saw_tableset {
        return Err("document is not a VOSI tableset".to_string());
    }
    Ok(tables)
}
