//! Data models for wanrec-enrich
//!
//! Typed records for every input and output of a reconciliation run.

pub mod circuit;
pub mod enriched;
pub mod interface;
pub mod provider_mapping;
pub mod registry;
pub mod run_report;
pub mod telemetry;

pub use circuit::{site_key, CircuitRecord};
pub use enriched::{EnrichedCircuitRecord, WanState};
pub use interface::{CircuitPurpose, WanInterface};
pub use provider_mapping::{MappingType, ProviderMapping};
pub use registry::{RegistryCacheEntry, PRIVATE_IP_ORG, UNKNOWN_ORG};
pub use run_report::{CircuitSyncProposal, PossibleProviderMatch, RunReport, RunState};
pub use telemetry::DeviceTelemetry;
