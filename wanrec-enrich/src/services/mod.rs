//! Reconciliation services
//!
//! Leaves first: note parsing, registry resolution and provider matching are
//! independent of each other; site reconciliation combines them and the
//! orchestrator drives it over every site.

pub mod circuit_sync;
pub mod ddns;
pub mod fuzzy;
pub mod note_parser;
pub mod provider_matcher;
pub mod rdap_parser;
pub mod reconciliation_orchestrator;
pub mod registry_client;
pub mod registry_resolver;
pub mod site_reconciler;

pub use circuit_sync::{plan_circuit_sync, CircuitSyncPolicy};
pub use ddns::{HostResolver, SystemHostResolver};
pub use fuzzy::{FuzzyThresholds, FuzzyVerdict};
pub use note_parser::{parse_raw_notes, ParsedInterfaceNote, ParsedNotes};
pub use provider_matcher::{normalize, MappingTable, MatchOutcome, MatchReason, ProviderMatcher};
pub use reconciliation_orchestrator::{is_excluded_site, ReconciliationOrchestrator};
pub use registry_client::{RdapClient, RegistryClient, RegistryError};
pub use registry_resolver::{RegistryCache, RegistryResolver, Resolution, ResolutionSource, ResolverSettings};
pub use site_reconciler::{reconcile_site, PrecedenceTier, SiteEvidence, SiteReconciliation};
