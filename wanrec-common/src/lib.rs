//! # wanrec Common Library
//!
//! Shared code for the WAN reconciliation tooling:
//! - Error and result types
//! - TOML bootstrap configuration and root folder resolution
//! - SQLite schema initialization

pub mod config;
#[cfg(feature = "sqlx")]
pub mod db;
pub mod error;

pub use error::{Error, Result};
