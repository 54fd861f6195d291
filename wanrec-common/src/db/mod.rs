//! Database schema shared by all wanrec binaries

pub mod init;

pub use init::{create_schema, init_database};
