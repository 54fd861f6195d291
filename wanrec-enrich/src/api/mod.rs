//! HTTP control surface for wanrec-enrich

pub mod enriched;
pub mod health;
pub mod runs;

pub use enriched::enriched_routes;
pub use health::health_routes;
pub use runs::run_routes;
