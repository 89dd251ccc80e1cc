//! Reads raw inventory documents exported to disk
//!
//! Layout: `<export_dir>/cloud/<scope>.json` and `<export_dir>/iac/<scope>.json`.

use std::path::{Path, PathBuf};
use tfe_coverage_core::{FetchError, InventoryFetcher, RawInventory, Source};

pub struct ExportDirFetcher {
    root: PathBuf,
}

impl ExportDirFetcher {
    pub fn new(export_dir: &Path, source: Source) -> Self {
        Self {
            root: export_dir.join(source.to_string()),
        }
    }

    pub fn document_path(&self, scope: &str) -> PathBuf {
        self.root.join(format!("{}.json", scope))
    }
}

impl InventoryFetcher for ExportDirFetcher {
    fn fetch(&self, scope: &str) -> Result<RawInventory, FetchError> {
        if scope.is_empty() || scope.contains(['/', '\\']) || scope == ".." {
            return Err(FetchError::new(format!("invalid scope name '{}'", scope)));
        }

        let path = self.document_path(scope);
        tracing::debug!(path = %path.display(), "Reading exported inventory");

        let content = std::fs::read_to_string(&path)
            .map_err(|e| FetchError::with_cause(format!("cannot read {}", path.display()), e))?;
        serde_json::from_str(&content)
            .map_err(|e| FetchError::with_cause(format!("cannot parse {}", path.display()), e))
    }
}
