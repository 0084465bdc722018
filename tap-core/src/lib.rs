//! TAP Core
//!
//! Core types for the TAP (Table Access Protocol) job client.
//!
//! This crate contains:
//! - Domain types: phases, query specifications, job listings and tables
//!
//! Nothing here performs I/O; the protocol engine lives in `tap-client`.

pub mod domain;

pub use domain::job::{ErrorOrigin, JobList, JobMode, JobSummary, Phase};
pub use domain::metadata::{ColumnMeta, TableMeta};
pub use domain::query::{OutputFormat, QuerySpec, UploadTable};
pub use domain::table::{Column, Table};
