//! End-to-end coverage run
//!
//! Fetch (through the cache), match, classify, emit. A run either produces a
//! report or an error; there is no partial report.

use crate::cache::{CacheKey, CacheOrigin, InventoryCache};
use crate::classify::{CoverageSummary, classify};
use crate::error::{CoverageError, FetchError, Result};
use crate::matcher::match_inventories;
use crate::model::{InventoryItem, Source};
use crate::normalize::Normalizer;
use crate::raw::RawInventory;
use crate::report::{Report, emit};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default snapshot lifetime
pub const DEFAULT_TTL: Duration = Duration::from_secs(15 * 60);

/// Upstream lister for one inventory.
///
/// A fetch either yields a raw document or fails; the engine never retries.
pub trait InventoryFetcher {
    fn fetch(&self, scope: &str) -> std::result::Result<RawInventory, FetchError>;
}

impl<F> InventoryFetcher for F
where
    F: Fn(&str) -> std::result::Result<RawInventory, FetchError>,
{
    fn fetch(&self, scope: &str) -> std::result::Result<RawInventory, FetchError> {
        self(scope)
    }
}

/// Cooperative cancellation flag shared with a signal handler
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn check(&self, stage: &'static str) -> Result<()> {
        if self.is_cancelled() {
            warn!(stage, "Run cancelled");
            return Err(CoverageError::Cancelled { stage });
        }
        Ok(())
    }
}

/// Overall outcome of a run that produced a report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    /// Report produced, but records were skipped or stale data was served
    PartialSuccess,
}

/// Recoverable conditions absorbed during a run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunDiagnostics {
    pub skipped: usize,
    pub filtered: usize,
    pub malformed_tags: usize,
    /// Scopes answered from an expired snapshot after a failed fetch
    pub stale_scopes: Vec<CacheKey>,
    /// Scopes answered from a live cache entry
    pub cached_scopes: Vec<CacheKey>,
}

impl RunDiagnostics {
    pub fn status(&self) -> RunStatus {
        if self.skipped > 0 || !self.stale_scopes.is_empty() {
            RunStatus::PartialSuccess
        } else {
            RunStatus::Success
        }
    }
}

/// Result of a completed run
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub report: Report,
    pub summary: CoverageSummary,
    pub diagnostics: RunDiagnostics,
}

impl RunOutcome {
    pub fn status(&self) -> RunStatus {
        self.diagnostics.status()
    }
}

/// Scopes and settings of one coverage run
#[derive(Debug, Clone)]
pub struct CoverageRun {
    pub cloud_scopes: Vec<String>,
    pub iac_scopes: Vec<String>,
    pub ttl: Duration,
    /// Drop cached entries of the run's scopes before fetching
    pub refresh: bool,
    pub normalizer: Normalizer,
}

impl CoverageRun {
    /// Repeated scopes are kept once, at their first position
    pub fn new(cloud_scopes: Vec<String>, iac_scopes: Vec<String>) -> Self {
        Self {
            cloud_scopes: unique_scopes(Source::Cloud, cloud_scopes),
            iac_scopes: unique_scopes(Source::Iac, iac_scopes),
            ttl: DEFAULT_TTL,
            refresh: false,
            normalizer: Normalizer::default(),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_refresh(mut self, refresh: bool) -> Self {
        self.refresh = refresh;
        self
    }

    pub fn with_normalizer(mut self, normalizer: Normalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    /// Run every stage against `cache`, checking `cancel` between stages
    #[tracing::instrument(
        skip_all,
        fields(cloud_scopes = self.cloud_scopes.len(), iac_scopes = self.iac_scopes.len())
    )]
    pub fn execute(
        &self,
        cache: &mut InventoryCache,
        cloud: &dyn InventoryFetcher,
        iac: &dyn InventoryFetcher,
        cancel: &CancelToken,
    ) -> Result<RunOutcome> {
        let mut diagnostics = RunDiagnostics::default();

        let cloud_items =
            self.collect(Source::Cloud, &self.cloud_scopes, cache, cloud, cancel, &mut diagnostics)?;
        let iac_items =
            self.collect(Source::Iac, &self.iac_scopes, cache, iac, cancel, &mut diagnostics)?;

        cancel.check("match")?;
        let results = match_inventories(&cloud_items, &iac_items)?;

        cancel.check("classify")?;
        let (records, summary) = classify(&results);

        cancel.check("emit")?;
        let report = emit(&records, &summary);

        info!(
            managed = summary.managed,
            unmanaged_in_cloud = summary.unmanaged_in_cloud,
            orphaned_in_state = summary.orphaned_in_state,
            coverage_percent = summary.coverage_percent(),
            "Coverage run complete"
        );
        Ok(RunOutcome {
            report,
            summary,
            diagnostics,
        })
    }

    /// Concatenate the snapshots of every scope of one source, in scope order
    fn collect(
        &self,
        source: Source,
        scopes: &[String],
        cache: &mut InventoryCache,
        fetcher: &dyn InventoryFetcher,
        cancel: &CancelToken,
        diagnostics: &mut RunDiagnostics,
    ) -> Result<Vec<InventoryItem>> {
        let mut items = Vec::new();

        for scope in scopes {
            cancel.check("fetch")?;
            if self.refresh {
                cache.invalidate(source, scope);
            }

            let snapshot =
                cache.get_or_fetch(source, scope, self.ttl, &self.normalizer, || fetcher.fetch(scope))?;

            diagnostics.skipped += snapshot.stats.skipped;
            diagnostics.filtered += snapshot.stats.filtered;
            diagnostics.malformed_tags += snapshot.stats.malformed_tags;
            match snapshot.origin {
                CacheOrigin::Stale => diagnostics.stale_scopes.push(CacheKey::new(source, scope.as_str())),
                CacheOrigin::Cached => diagnostics.cached_scopes.push(CacheKey::new(source, scope.as_str())),
                CacheOrigin::Fresh => {}
            }

            debug!(%source, scope = %scope, origin = %snapshot.origin, items = snapshot.items.len(), "Collected scope");
            items.extend(snapshot.items.iter().cloned());
        }

        Ok(items)
    }
}

fn unique_scopes(source: Source, scopes: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    scopes
        .into_iter()
        .filter(|scope| {
            let first = seen.insert(scope.clone());
            if !first {
                warn!(%source, %scope, "Ignoring repeated scope");
            }
            first
        })
        .collect()
}
