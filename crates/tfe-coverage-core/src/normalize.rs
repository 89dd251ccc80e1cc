//! Resource normalizer
//!
//! Turns raw upstream records into [`InventoryItem`]s. This is the only place
//! that looks at provider-specific fields.

use crate::error::{CoverageError, Result};
use crate::model::{ArmResourceId, InventoryItem, Source, matching_key};
use crate::raw::{CloudInventoryBatch, IacStateBatch, RawInventory, RawTags, TagRecord};
use crate::resource_types::ResourceTypeFilter;
use crate::tags::{TagSet, decode_tags};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};

const UNKNOWN_TYPE: &str = "unknown";

/// What to do with a record that lacks its required identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormalizationPolicy {
    /// Abort the batch on the first invalid record
    Strict,
    /// Skip invalid records and count them
    #[default]
    Lenient,
}

impl std::fmt::Display for NormalizationPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NormalizationPolicy::Strict => write!(f, "strict"),
            NormalizationPolicy::Lenient => write!(f, "lenient"),
        }
    }
}

impl std::str::FromStr for NormalizationPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(NormalizationPolicy::Strict),
            "lenient" => Ok(NormalizationPolicy::Lenient),
            other => Err(format!(
                "unknown normalization policy '{}' (expected strict or lenient)",
                other
            )),
        }
    }
}

/// A record dropped under the lenient policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedRecord {
    pub reason: String,
    /// Offending raw record, rendered as JSON
    pub record: String,
}

/// Output of one normalization pass
#[derive(Debug, Clone, Default)]
pub struct Normalized {
    /// Items in upstream discovery order
    pub items: Vec<InventoryItem>,

    /// Records rejected under the lenient policy
    pub skipped: Vec<SkippedRecord>,

    /// Records dropped as out of scope (non-primary type, no cloud object)
    pub filtered: usize,

    /// Tag entries discarded as malformed
    pub malformed_tags: usize,
}

/// Converts raw records into inventory items
#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    policy: NormalizationPolicy,
    type_filter: Option<ResourceTypeFilter>,
}

impl Normalizer {
    pub fn new(policy: NormalizationPolicy) -> Self {
        Self {
            policy,
            type_filter: None,
        }
    }

    /// Restrict both inventories to the given ARM resource types
    pub fn with_type_filter(mut self, filter: ResourceTypeFilter) -> Self {
        self.type_filter = Some(filter);
        self
    }

    pub fn policy(&self) -> NormalizationPolicy {
        self.policy
    }

    /// Identifies the settings that shape a snapshot; cached snapshots are only
    /// reused by a normalizer with the same fingerprint
    pub fn fingerprint(&self) -> String {
        match &self.type_filter {
            Some(filter) => format!("{}/types:{}", self.policy, filter.fingerprint()),
            None => format!("{}/all", self.policy),
        }
    }

    /// Normalize one raw document into items of `source`
    pub fn normalize(&self, source: Source, raw: RawInventory) -> Result<Normalized> {
        if raw.source() != source {
            return Err(CoverageError::Normalization {
                origin: source,
                scope: None,
                reason: format!("{} document cannot feed the {} inventory", raw.schema(), source),
                record: format!("{{\"schema\":\"{}\"}}", raw.schema()),
            });
        }

        let normalized = match raw {
            RawInventory::AzureResourceGraphV1(batch) => self.normalize_cloud(batch)?,
            RawInventory::TfeWorkspaceStateV1(batch) => self.normalize_iac(batch)?,
        };

        debug!(
            %source,
            items = normalized.items.len(),
            skipped = normalized.skipped.len(),
            filtered = normalized.filtered,
            malformed_tags = normalized.malformed_tags,
            "Normalized inventory"
        );
        Ok(normalized)
    }

    fn normalize_cloud(&self, batch: CloudInventoryBatch) -> Result<Normalized> {
        let mut out = Normalized::default();
        // resource group names are case-insensitive in ARM
        let group_tags = scope_tag_index(&batch.resource_groups, &mut out, str::to_lowercase);

        for record in &batch.resources {
            let Some(id) = non_empty(record.id.as_deref()) else {
                self.reject(Source::Cloud, "missing resource id", record, &mut out)?;
                continue;
            };
            let arm = ArmResourceId::parse(id);

            let resource_type = non_empty(record.resource_type.as_deref())
                .map(str::to_string)
                .or_else(|| arm.as_ref().map(ArmResourceId::resource_type))
                .unwrap_or_else(|| UNKNOWN_TYPE.to_string());

            if self
                .type_filter
                .as_ref()
                .is_some_and(|filter| !filter.allows(&resource_type))
            {
                out.filtered += 1;
                continue;
            }

            let resource_group = non_empty(record.resource_group.as_deref())
                .or_else(|| arm.as_ref().map(|a| a.resource_group));
            let scope_tags = resource_group
                .and_then(|rg| group_tags.get(&rg.to_lowercase()))
                .cloned()
                .unwrap_or_default();
            let item_tags = tag_set(&record.tags, &mut out.malformed_tags);

            out.items.push(
                InventoryItem::new(Source::Cloud, id, matching_key(id), resource_type)
                    .with_scope_tags(scope_tags)
                    .with_item_tags(item_tags),
            );
        }

        Ok(out)
    }

    fn normalize_iac(&self, batch: IacStateBatch) -> Result<Normalized> {
        let mut out = Normalized::default();
        let workspace_tags = scope_tag_index(&batch.workspaces, &mut out, str::to_string);

        for record in &batch.resources {
            let Some(address) = non_empty(record.address.as_deref()) else {
                self.reject(Source::Iac, "missing state address", record, &mut out)?;
                continue;
            };

            // data sources and non-Azure resources have no cloud object to match
            let Some(cloud_id) = non_empty(record.cloud_id.as_deref()) else {
                out.filtered += 1;
                continue;
            };

            if let Some(filter) = &self.type_filter {
                let allowed = ArmResourceId::parse(cloud_id)
                    .is_some_and(|arm| filter.allows(&arm.resource_type()));
                if !allowed {
                    out.filtered += 1;
                    continue;
                }
            }

            let workspace = non_empty(record.workspace.as_deref());
            let id = match workspace {
                Some(ws) => format!("{}/{}", ws, address),
                None => address.to_string(),
            };
            let item_tags = workspace
                .and_then(|ws| workspace_tags.get(ws))
                .cloned()
                .unwrap_or_default();
            let resource_type = record.resource_type().unwrap_or(UNKNOWN_TYPE);

            out.items.push(
                InventoryItem::new(Source::Iac, id, matching_key(cloud_id), resource_type)
                    .with_item_tags(item_tags),
            );
        }

        Ok(out)
    }

    fn reject<T>(&self, source: Source, reason: &str, record: &T, out: &mut Normalized) -> Result<()>
    where
        T: Serialize + std::fmt::Debug,
    {
        let rendered = serde_json::to_string(record).unwrap_or_else(|_| format!("{:?}", record));

        match self.policy {
            NormalizationPolicy::Strict => Err(CoverageError::Normalization {
                origin: source,
                scope: None,
                reason: reason.to_string(),
                record: rendered,
            }),
            NormalizationPolicy::Lenient => {
                warn!(%source, reason, record = %rendered, "Skipping invalid record");
                out.skipped.push(SkippedRecord {
                    reason: reason.to_string(),
                    record: rendered,
                });
                Ok(())
            }
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn scope_tag_index(
    records: &[TagRecord],
    out: &mut Normalized,
    key_fn: fn(&str) -> String,
) -> HashMap<String, TagSet> {
    let mut index: HashMap<String, TagSet> = HashMap::new();
    for record in records {
        let tags = tag_set(&record.tags, &mut out.malformed_tags);
        index
            .entry(key_fn(record.name.trim()))
            .or_default()
            .extend_from(&tags);
    }
    index
}

/// Convert free-form raw tags, counting discarded entries into `malformed`
fn tag_set(raw: &RawTags, malformed: &mut usize) -> TagSet {
    match raw {
        RawTags::Absent => TagSet::new(),
        RawTags::Text(text) => {
            let decoded = decode_tags(text);
            *malformed += decoded.malformed;
            decoded.tags
        }
        RawTags::Map(entries) => {
            let mut tags = TagSet::new();
            for (key, value) in entries {
                let key = key.trim();
                let value = match value {
                    serde_json::Value::String(s) => Some(s.clone()),
                    serde_json::Value::Number(n) => Some(n.to_string()),
                    serde_json::Value::Bool(b) => Some(b.to_string()),
                    _ => None,
                };
                match value {
                    Some(value) if !key.is_empty() => tags.insert(key, value),
                    _ => *malformed += 1,
                }
            }
            tags
        }
        RawTags::List(items) => {
            let mut tags = TagSet::new();
            for item in items {
                match item.as_str() {
                    Some(text) => {
                        let decoded = decode_tags(text);
                        *malformed += decoded.malformed;
                        tags.extend_from(&decoded.tags);
                    }
                    None => *malformed += 1,
                }
            }
            tags
        }
    }
}
