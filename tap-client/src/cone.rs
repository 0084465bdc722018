//! Cone and box searches
//!
//! Builds ADQL positional queries and runs them through `TapClient::query`.

use std::time::Duration;
use tap_core::{JobMode, QuerySpec, Table};

use crate::TapClient;
use crate::error::{Result, TapError};
use crate::job::Job;

/// Columns and table a positional query reads
#[derive(Debug, Clone, PartialEq)]
struct Target {
    table: String,
    ra_column: String,
    dec_column: String,
    columns: Vec<String>,
    top: Option<u64>,
    mode: JobMode,
}

impl Target {
    fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ra_column: "ra".to_string(),
            dec_column: "dec".to_string(),
            columns: Vec::new(),
            top: None,
            mode: JobMode::Sync,
        }
    }

    fn validate(&self) -> Result<()> {
        check_name("table", &self.table)?;
        check_name("RA column", &self.ra_column)?;
        check_name("Dec column", &self.dec_column)?;
        for column in &self.columns {
            check_name("column", column)?;
        }
        Ok(())
    }

    fn select_list(&self) -> String {
        let top = self.top.map(|n| format!("TOP {} ", n)).unwrap_or_default();
        let columns = if self.columns.is_empty() {
            "*".to_string()
        } else {
            self.columns.join(", ")
        };
        format!("SELECT {}{}", top, columns)
    }

    fn point(&self) -> String {
        format!("POINT('ICRS', {}, {})", self.ra_column, self.dec_column)
    }
}

/// Rows within `radius` degrees of a position, nearest first
#[derive(Debug, Clone, PartialEq)]
pub struct ConeQuery {
    target: Target,
    ra: f64,
    dec: f64,
    radius: f64,
}

impl ConeQuery {
    /// Position and radius in degrees (ICRS)
    pub fn new(table: impl Into<String>, ra: f64, dec: f64, radius: f64) -> Self {
        Self {
            target: Target::new(table),
            ra,
            dec,
            radius,
        }
    }

    /// Names of the position columns (default `ra`, `dec`)
    pub fn with_position_columns(
        mut self,
        ra_column: impl Into<String>,
        dec_column: impl Into<String>,
    ) -> Self {
        self.target.ra_column = ra_column.into();
        self.target.dec_column = dec_column.into();
        self
    }

    /// Columns to return instead of `*`
    pub fn with_columns(mut self, columns: Vec<String>) -> Self {
        self.target.columns = columns;
        self
    }

    pub fn with_top(mut self, top: u64) -> Self {
        self.target.top = Some(top);
        self
    }

    /// Run as a sync (default) or async job
    pub fn with_mode(mut self, mode: JobMode) -> Self {
        self.target.mode = mode;
        self
    }

    /// ADQL text of this search
    ///
    /// # Errors
    /// `TapError::InvalidQuery` if the position is out of range, the radius
    /// is not positive, or a name is not a plain identifier.
    pub fn to_adql(&self) -> Result<String> {
        check_position(self.ra, self.dec)?;
        check_size("radius", self.radius)?;
        self.target.validate()?;

        let target = &self.target;
        let center = format!("POINT('ICRS', {}, {})", self.ra, self.dec);
        Ok(format!(
            "{}, DISTANCE({}, {}) AS dist FROM {} WHERE 1 = CONTAINS({}, CIRCLE('ICRS', {}, {}, {})) ORDER BY dist ASC",
            target.select_list(),
            target.point(),
            center,
            target.table,
            target.point(),
            self.ra,
            self.dec,
            self.radius
        ))
    }

    pub fn to_spec(&self) -> Result<QuerySpec> {
        Ok(QuerySpec::new(self.to_adql()?, self.target.mode))
    }
}

/// Rows inside a `width` x `height` degree box centred on a position
#[derive(Debug, Clone, PartialEq)]
pub struct BoxQuery {
    target: Target,
    ra: f64,
    dec: f64,
    width: f64,
    height: f64,
}

impl BoxQuery {
    pub fn new(table: impl Into<String>, ra: f64, dec: f64, width: f64, height: f64) -> Self {
        Self {
            target: Target::new(table),
            ra,
            dec,
            width,
            height,
        }
    }

    pub fn with_position_columns(
        mut self,
        ra_column: impl Into<String>,
        dec_column: impl Into<String>,
    ) -> Self {
        self.target.ra_column = ra_column.into();
        self.target.dec_column = dec_column.into();
        self
    }

    pub fn with_columns(mut self, columns: Vec<String>) -> Self {
        self.target.columns = columns;
        self
    }

    pub fn with_top(mut self, top: u64) -> Self {
        self.target.top = Some(top);
        self
    }

    pub fn with_mode(mut self, mode: JobMode) -> Self {
        self.target.mode = mode;
        self
    }

    pub fn to_adql(&self) -> Result<String> {
        check_position(self.ra, self.dec)?;
        check_size("width", self.width)?;
        check_size("height", self.height)?;
        self.target.validate()?;

        let target = &self.target;
        Ok(format!(
            "{} FROM {} WHERE 1 = CONTAINS({}, BOX('ICRS', {}, {}, {}, {}))",
            target.select_list(),
            target.table,
            target.point(),
            self.ra,
            self.dec,
            self.width,
            self.height
        ))
    }

    pub fn to_spec(&self) -> Result<QuerySpec> {
        Ok(QuerySpec::new(self.to_adql()?, self.target.mode))
    }
}

impl TapClient {
    /// Run a cone search in the client's default format
    pub async fn cone_search(&self, cone: &ConeQuery, timeout: Duration) -> Result<(Job, Table)> {
        let spec = cone.to_spec()?.with_format(self.default_format.token());
        self.query(&spec, timeout).await
    }

    /// Run a box search in the client's default format
    pub async fn box_search(&self, query: &BoxQuery, timeout: Duration) -> Result<(Job, Table)> {
        let spec = query.to_spec()?.with_format(self.default_format.token());
        self.query(&spec, timeout).await
    }
}

fn check_position(ra: f64, dec: f64) -> Result<()> {
    if !(0.0..360.0).contains(&ra) {
        return Err(TapError::InvalidQuery(format!(
            "RA {} is outside [0, 360)",
            ra
        )));
    }
    if !(-90.0..=90.0).contains(&dec) {
        return Err(TapError::InvalidQuery(format!(
            "Dec {} is outside [-90, 90]",
            dec
        )));
    }
    Ok(())
}

fn check_size(what: &str, value: f64) -> Result<()> {
    if !(value.is_finite() && value > 0.0) {
        return Err(TapError::InvalidQuery(format!(
            "{} must be a positive number of degrees, got {}",
            what, value
        )));
    }
    Ok(())
}

/// Plain or schema-qualified identifier; nothing that could change the query
fn check_name(what: &str, name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name.split('.').all(|part| {
            let mut chars = part.chars();
            matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        });
    if !valid {
        return Err(TapError::InvalidQuery(format!(
            "{} name '{}' is not a valid identifier",
            what, name
        )));
    }
    Ok(())
}
