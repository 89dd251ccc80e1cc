//! Cross-inventory matcher
//!
//! Pairs cloud and IaC items by exact matching key. No fuzzy matching.

use crate::error::{CoverageError, Result};
use crate::model::{InventoryItem, Source};
use std::collections::HashMap;

/// One matching key with whatever each side holds for it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchResult<'a> {
    pub matching_key: &'a str,
    pub cloud: Option<&'a InventoryItem>,
    pub iac: Option<&'a InventoryItem>,
}

/// Index items by key, rejecting a key that appears twice on one side
fn index_side<'a>(
    source: Source,
    items: &'a [InventoryItem],
) -> Result<HashMap<&'a str, &'a InventoryItem>> {
    let mut index: HashMap<&str, &InventoryItem> = HashMap::with_capacity(items.len());
    for item in items {
        if let Some(first) = index.insert(item.matching_key.as_str(), item) {
            return Err(CoverageError::DuplicateKey {
                origin: source,
                key: item.matching_key.clone(),
                first_id: first.id.clone(),
                second_id: item.id.clone(),
            });
        }
    }
    Ok(index)
}

/// Match the two inventories.
///
/// Results follow cloud discovery order, then IaC-only keys in IaC discovery
/// order. Every key of either side appears exactly once.
pub fn match_inventories<'a>(
    cloud: &'a [InventoryItem],
    iac: &'a [InventoryItem],
) -> Result<Vec<MatchResult<'a>>> {
    // both indexes are built first so a duplicate on either side fails the match
    let cloud_index = index_side(Source::Cloud, cloud)?;
    let iac_index = index_side(Source::Iac, iac)?;

    let mut results = Vec::with_capacity(cloud.len() + iac.len());
    for item in cloud {
        results.push(MatchResult {
            matching_key: &item.matching_key,
            cloud: Some(item),
            iac: iac_index.get(item.matching_key.as_str()).copied(),
        });
    }

    for item in iac {
        if !cloud_index.contains_key(item.matching_key.as_str()) {
            results.push(MatchResult {
                matching_key: &item.matching_key,
                cloud: None,
                iac: Some(item),
            });
        }
    }

    tracing::debug!(
        cloud = cloud.len(),
        iac = iac.len(),
        keys = results.len(),
        "Matched inventories"
    );
    Ok(results)
}
