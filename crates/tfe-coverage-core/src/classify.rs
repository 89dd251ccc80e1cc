//! Coverage classification

use crate::matcher::MatchResult;
use crate::model::InventoryItem;
use serde::{Deserialize, Serialize};

/// Coverage state of one matching key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CoverageStatus {
    /// Present in both inventories
    Managed,
    /// Present in the cloud only
    UnmanagedInCloud,
    /// Present in IaC state only
    OrphanedInState,
}

impl CoverageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CoverageStatus::Managed => "MANAGED",
            CoverageStatus::UnmanagedInCloud => "UNMANAGED_IN_CLOUD",
            CoverageStatus::OrphanedInState => "ORPHANED_IN_STATE",
        }
    }
}

impl std::fmt::Display for CoverageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified matching key
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoverageRecord<'a> {
    pub matching_key: &'a str,
    pub status: CoverageStatus,
    pub cloud: Option<&'a InventoryItem>,
    pub iac: Option<&'a InventoryItem>,
}

impl<'a> CoverageRecord<'a> {
    /// Item whose type and tags describe the row: the cloud item when present
    pub fn primary_item(&self) -> Option<&'a InventoryItem> {
        self.cloud.or(self.iac)
    }
}

/// Aggregate counts of a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageSummary {
    pub managed: usize,
    pub unmanaged_in_cloud: usize,
    pub orphaned_in_state: usize,
    pub total_cloud: usize,
    pub total_iac: usize,
}

impl CoverageSummary {
    /// Fraction of cloud resources under IaC management, 0 when the cloud inventory is empty
    pub fn coverage_ratio(&self) -> f64 {
        if self.total_cloud == 0 {
            return 0.0;
        }
        self.managed as f64 / self.total_cloud as f64
    }

    pub fn coverage_percent(&self) -> f64 {
        self.coverage_ratio() * 100.0
    }

    fn count(&mut self, status: CoverageStatus) {
        match status {
            CoverageStatus::Managed => {
                self.managed += 1;
                self.total_cloud += 1;
                self.total_iac += 1;
            }
            CoverageStatus::UnmanagedInCloud => {
                self.unmanaged_in_cloud += 1;
                self.total_cloud += 1;
            }
            CoverageStatus::OrphanedInState => {
                self.orphaned_in_state += 1;
                self.total_iac += 1;
            }
        }
    }
}

/// Classify match results, preserving their order
pub fn classify<'a>(results: &[MatchResult<'a>]) -> (Vec<CoverageRecord<'a>>, CoverageSummary) {
    let mut summary = CoverageSummary::default();
    let mut records = Vec::with_capacity(results.len());

    for result in results {
        let status = match (result.cloud, result.iac) {
            (Some(_), Some(_)) => CoverageStatus::Managed,
            (Some(_), None) => CoverageStatus::UnmanagedInCloud,
            (None, Some(_)) => CoverageStatus::OrphanedInState,
            // the matcher never yields an empty side pair
            (None, None) => continue,
        };
        summary.count(status);
        records.push(CoverageRecord {
            matching_key: result.matching_key,
            status,
            cloud: result.cloud,
            iac: result.iac,
        });
    }

    (records, summary)
}
