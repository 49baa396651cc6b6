//! Sage - answers natural-language questions about a relational database.
//!
//! The library exposes the pipeline modules for the `sage` binary and for
//! integration tests.

pub mod app;
pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod llm;
pub mod logging;
pub mod prompt;
pub mod relevance;
pub mod safety;
pub mod sanitize;
pub mod schema;
