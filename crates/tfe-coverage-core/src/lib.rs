//! tfe-coverage engine
//!
//! Reconciles a live Azure resource inventory against the Terraform
//! workspace state that is supposed to manage it, and produces a coverage
//! report of resources that are managed, unmanaged in the cloud, or orphaned
//! in state.
//!
//! # Architecture
//!
//! ```text
//! InventoryFetcher ─▶ Normalizer ─▶ InventoryCache ─▶ Matcher ─▶ Classifier ─▶ Report
//!                                        │
//!                                   CacheStore (JSON file)
//! ```
//!
//! Everything that touches the network or the report file lives outside this
//! crate; upstream data arrives through [`InventoryFetcher`].

pub mod cache;
pub mod classify;
pub mod error;
pub mod matcher;
pub mod model;
pub mod normalize;
pub mod pipeline;
pub mod raw;
pub mod report;
pub mod resource_types;
pub mod tags;

// Re-exports
pub use cache::{
    CacheEntry, CacheKey, CacheOrigin, CacheStore, Clock, InventoryCache, LoadedCache,
    NormalizeStats, Snapshot, SystemClock,
};
pub use classify::{CoverageRecord, CoverageStatus, CoverageSummary, classify};
pub use error::{CoverageError, FetchError, Result};
pub use matcher::{MatchResult, match_inventories};
pub use model::{ArmResourceId, InventoryItem, Source, matching_key};
pub use normalize::{Normalized, NormalizationPolicy, Normalizer, SkippedRecord};
pub use pipeline::{
    CancelToken, CoverageRun, DEFAULT_TTL, InventoryFetcher, RunDiagnostics, RunOutcome,
    RunStatus,
};
pub use raw::{
    CloudInventoryBatch, CloudResourceRecord, IacResourceRecord, IacStateBatch, RawInventory,
    RawTags, TagRecord,
};
pub use report::{REPORT_COLUMNS, Report, ReportRow, emit};
pub use resource_types::{
    PRIMARY_PATTERNS, ProviderNamespace, ProviderResourceType, ResourceTypeFilter,
    collect_resource_types, filter_primary_resource_types,
};
pub use tags::{DecodedTags, TagSet, decode_tags, encode_tags};
