//! Canonical inventory model shared by every engine stage

use crate::tags::TagSet;
use serde::{Deserialize, Serialize};

/// Origin inventory of an item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    /// Live cloud resource listing
    Cloud,
    /// Infrastructure-as-code workspace state
    Iac,
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Source::Cloud => write!(f, "cloud"),
            Source::Iac => write!(f, "iac"),
        }
    }
}

/// A resource from either inventory, normalized into a comparable shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryItem {
    /// Origin inventory
    pub source: Source,

    /// Provider-native identifier (ARM id for cloud items, state address for IaC items)
    pub id: String,

    /// Normalized key used for cross-inventory comparison
    pub matching_key: String,

    /// Resource type (ARM type or Terraform resource type)
    #[serde(rename = "type")]
    pub resource_type: String,

    /// Tags of the containing scope (resource group)
    #[serde(default)]
    pub scope_tags: TagSet,

    /// Tags of the resource itself; for IaC items, tags of the managing workspace
    #[serde(default)]
    pub item_tags: TagSet,
}

impl InventoryItem {
    pub fn new(
        source: Source,
        id: impl Into<String>,
        matching_key: impl Into<String>,
        resource_type: impl Into<String>,
    ) -> Self {
        Self {
            source,
            id: id.into(),
            matching_key: matching_key.into(),
            resource_type: resource_type.into(),
            scope_tags: TagSet::new(),
            item_tags: TagSet::new(),
        }
    }

    pub fn with_scope_tags(mut self, tags: TagSet) -> Self {
        self.scope_tags = tags;
        self
    }

    pub fn with_item_tags(mut self, tags: TagSet) -> Self {
        self.item_tags = tags;
        self
    }
}

/// Resource-group scoped Azure Resource Manager id
///
/// `/subscriptions/{sub}/resourceGroups/{rg}/providers/{namespace}/{type}/{name}`,
/// optionally followed by `/{child type}/{child name}` pairs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArmResourceId<'a> {
    pub subscription: &'a str,
    pub resource_group: &'a str,
    pub namespace: &'a str,
    /// Type and name segments after the namespace, alternating
    segments: Vec<&'a str>,
}

impl<'a> ArmResourceId<'a> {
    /// Parse an ARM id; returns `None` for ids that are not resource-group scoped
    pub fn parse(id: &'a str) -> Option<Self> {
        let parts: Vec<&str> = id.trim().trim_matches('/').split('/').collect();
        if parts.len() < 8 || parts.iter().any(|p| p.is_empty()) {
            return None;
        }
        if !parts[0].eq_ignore_ascii_case("subscriptions")
            || !parts[2].eq_ignore_ascii_case("resourcegroups")
            || !parts[4].eq_ignore_ascii_case("providers")
        {
            return None;
        }

        let segments = parts[6..].to_vec();
        // type/name pairs must be complete
        if segments.len() % 2 != 0 {
            return None;
        }

        Some(Self {
            subscription: parts[1],
            resource_group: parts[3],
            namespace: parts[5],
            segments,
        })
    }

    /// Full resource type, e.g. `Microsoft.Network/virtualNetworks/subnets`
    pub fn resource_type(&self) -> String {
        let mut resource_type = self.namespace.to_string();
        for type_segment in self.segments.iter().step_by(2) {
            resource_type.push('/');
            resource_type.push_str(type_segment);
        }
        resource_type
    }

    /// Name of the innermost resource
    pub fn name(&self) -> &'a str {
        self.segments.last().copied().unwrap_or_default()
    }

    /// `{sub}/{rg}/{namespace}/{type}/{name}[/{child type}/{child name}...]`, lowercased
    pub fn matching_key(&self) -> String {
        let mut key = format!(
            "{}/{}/{}",
            self.subscription, self.resource_group, self.namespace
        );
        for segment in &self.segments {
            key.push('/');
            key.push_str(segment);
        }
        key.to_lowercase()
    }
}

/// Derive the matching key for a provider id.
///
/// Resource-group scoped ARM ids use [`ArmResourceId::matching_key`]; any other
/// id falls back to its lowercase form with surrounding slashes trimmed.
pub fn matching_key(id: &str) -> String {
    match ArmResourceId::parse(id) {
        Some(arm) => arm.matching_key(),
        None => id.trim().trim_matches('/').to_lowercase(),
    }
}
