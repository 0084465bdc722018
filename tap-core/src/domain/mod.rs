//! Core domain types
//!
//! This module contains the value types shared by the protocol client and
//! the command-line front end. They describe what a caller asks for
//! (`QuerySpec`), what a service reports (`Phase`, `JobList`) and what a
//! completed query yields (`Table`).

pub mod job;
pub mod metadata;
pub mod query;
pub mod table;
