//! Utility modules for wanrec-enrich

pub mod db_retry;

pub use db_retry::{is_lock_error, retry_on_lock};
