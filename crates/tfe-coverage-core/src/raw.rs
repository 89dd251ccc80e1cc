//! Raw upstream records, one variant per provider schema version
//!
//! These types mirror what the upstream listers export and are only read by
//! the normalizer. Every field a listing might omit is optional here so that
//! a single bad record can be reported instead of failing the whole document.

use crate::model::Source;
use serde::de::{MapAccess, SeqAccess, Visitor};
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Raw inventory document as delivered by a fetcher
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "schema")]
pub enum RawInventory {
    /// Azure Resource Graph listing of one subscription
    #[serde(rename = "azure-resource-graph/v1")]
    AzureResourceGraphV1(CloudInventoryBatch),

    /// Terraform Enterprise workspace state resources
    #[serde(rename = "tfe-workspace-state/v1")]
    TfeWorkspaceStateV1(IacStateBatch),
}

impl RawInventory {
    /// Inventory this document belongs to
    pub fn source(&self) -> Source {
        match self {
            RawInventory::AzureResourceGraphV1(_) => Source::Cloud,
            RawInventory::TfeWorkspaceStateV1(_) => Source::Iac,
        }
    }

    /// Schema tag, as written in the document
    pub fn schema(&self) -> &'static str {
        match self {
            RawInventory::AzureResourceGraphV1(_) => "azure-resource-graph/v1",
            RawInventory::TfeWorkspaceStateV1(_) => "tfe-workspace-state/v1",
        }
    }

    /// Number of resource records in the document
    pub fn record_count(&self) -> usize {
        match self {
            RawInventory::AzureResourceGraphV1(batch) => batch.resources.len(),
            RawInventory::TfeWorkspaceStateV1(batch) => batch.resources.len(),
        }
    }
}

/// Cloud resources plus the tags of their resource groups
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CloudInventoryBatch {
    #[serde(default)]
    pub resources: Vec<CloudResourceRecord>,

    #[serde(default, alias = "resourceGroups")]
    pub resource_groups: Vec<TagRecord>,
}

/// One resource as listed by Azure Resource Graph
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CloudResourceRecord {
    /// ARM resource id (required)
    #[serde(default)]
    pub id: Option<String>,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default, rename = "type")]
    pub resource_type: Option<String>,

    #[serde(default, alias = "resourceGroup")]
    pub resource_group: Option<String>,

    #[serde(default)]
    pub tags: RawTags,
}

/// Workspace state resources plus the tags of their workspaces
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IacStateBatch {
    #[serde(default)]
    pub resources: Vec<IacResourceRecord>,

    #[serde(default)]
    pub workspaces: Vec<TagRecord>,
}

/// One resource instance from a workspace's state
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IacResourceRecord {
    /// State address, e.g. `azurerm_linux_virtual_machine.vm1` (required)
    #[serde(default)]
    pub address: Option<String>,

    /// Managing workspace name
    #[serde(default)]
    pub workspace: Option<String>,

    /// Terraform resource type, e.g. `azurerm_linux_virtual_machine`
    #[serde(default, alias = "provider-type")]
    pub provider_type: Option<String>,

    /// ARM id of the cloud object this instance manages
    #[serde(default, alias = "cloud-id")]
    pub cloud_id: Option<String>,
}

impl IacResourceRecord {
    /// Resource type, falling back to the type prefix of the address
    pub fn resource_type(&self) -> Option<&str> {
        self.provider_type.as_deref().or_else(|| {
            let address = self.address.as_deref()?;
            // module.net.azurerm_subnet.a["x.y"] -> azurerm_subnet
            let mut parts = address_segments(address);
            parts.pop()?;
            parts.pop()
        })
    }
}

/// Split a state address on the dots outside `[...]` instance keys
fn address_segments(address: &str) -> Vec<&str> {
    let mut segments = Vec::new();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    let mut start = 0;

    for (i, c) in address.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' if depth > 0 => in_string = true,
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            '.' if depth == 0 => {
                segments.push(&address[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    segments.push(&address[start..]);
    segments
}

/// Tags attached to a scope (resource group or workspace)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagRecord {
    pub name: String,

    #[serde(default)]
    pub tags: RawTags,
}

/// Tags exactly as an upstream document wrote them
#[derive(Debug, Clone, Default, PartialEq)]
pub enum RawTags {
    #[default]
    Absent,
    /// JSON object, in document order
    Map(Vec<(String, serde_json::Value)>),
    /// List of `key:value` strings
    List(Vec<serde_json::Value>),
    /// Delimited string such as `env:prod|team:core`
    Text(String),
}

impl Serialize for RawTags {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            RawTags::Absent => serializer.serialize_none(),
            RawTags::Map(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (k, v) in entries {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
            RawTags::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            RawTags::Text(text) => serializer.serialize_str(text),
        }
    }
}

impl<'de> Deserialize<'de> for RawTags {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RawTagsVisitor;

        impl<'de> Visitor<'de> for RawTagsVisitor {
            type Value = RawTags;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a tag object, a list of tags, a delimited tag string, or null")
            }

            fn visit_unit<E: serde::de::Error>(self) -> Result<RawTags, E> {
                Ok(RawTags::Absent)
            }

            fn visit_none<E: serde::de::Error>(self) -> Result<RawTags, E> {
                Ok(RawTags::Absent)
            }

            fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<RawTags, D::Error> {
                deserializer.deserialize_any(RawTagsVisitor)
            }

            fn visit_str<E: serde::de::Error>(self, value: &str) -> Result<RawTags, E> {
                Ok(RawTags::Text(value.to_string()))
            }

            fn visit_string<E: serde::de::Error>(self, value: String) -> Result<RawTags, E> {
                Ok(RawTags::Text(value))
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut access: A) -> Result<RawTags, A::Error> {
                let mut items = Vec::new();
                while let Some(item) = access.next_element::<serde_json::Value>()? {
                    items.push(item);
                }
                Ok(RawTags::List(items))
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<RawTags, A::Error> {
                let mut entries = Vec::new();
                while let Some(entry) = access.next_entry::<String, serde_json::Value>()? {
                    entries.push(entry);
                }
                Ok(RawTags::Map(entries))
            }
        }

        deserializer.deserialize_any(RawTagsVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cloud_document() {
        let json = r#"{
            "schema": "azure-resource-graph/v1",
            "resources": [
                {
                    "id": "/subscriptions/s/resourceGroups/rg1/providers/Microsoft.Compute/virtualMachines/vm1",
                    "name": "vm1",
                    "type": "Microsoft.Compute/virtualMachines",
                    "resourceGroup": "rg1",
                    "tags": {"owner": "ops", "cost": 42}
                }
            ],
            "resourceGroups": [{"name": "rg1", "tags": "env:prod|team:core"}]
        }"#;

        let raw: RawInventory = serde_json::from_str(json).unwrap();
        assert_eq!(raw.source(), Source::Cloud);
        assert_eq!(raw.record_count(), 1);

        let RawInventory::AzureResourceGraphV1(batch) = raw else {
            panic!("expected cloud batch");
        };
        assert_eq!(batch.resources[0].resource_group.as_deref(), Some("rg1"));
        assert_eq!(
            batch.resources[0].tags,
            RawTags::Map(vec![
                ("owner".to_string(), serde_json::json!("ops")),
                ("cost".to_string(), serde_json::json!(42)),
            ])
        );
        assert_eq!(
            batch.resource_groups[0].tags,
            RawTags::Text("env:prod|team:core".to_string())
        );
    }

    #[test]
    fn test_parse_iac_document_with_missing_fields() {
        let json = r#"{
            "schema": "tfe-workspace-state/v1",
            "resources": [
                {"workspace": "net-prod", "provider-type": "azurerm_virtual_network"},
                {"address": "random_password.db", "tags": null}
            ],
            "workspaces": [{"name": "net-prod", "tags": ["team:network"]}]
        }"#;

        let raw: RawInventory = serde_json::from_str(json).unwrap();
        assert_eq!(raw.source(), Source::Iac);
        let RawInventory::TfeWorkspaceStateV1(batch) = raw else {
            panic!("expected iac batch");
        };
        assert!(batch.resources[0].address.is_none());
        assert_eq!(batch.resources[1].resource_type(), Some("random_password"));
        assert_eq!(batch.workspaces[0].tags, RawTags::List(vec![serde_json::json!("team:network")]));
    }

    #[test]
    fn test_unknown_schema_is_rejected() {
        let json = r#"{"schema": "aws-config/v1", "resources": []}"#;
        assert!(serde_json::from_str::<RawInventory>(json).is_err());
    }

    #[test]
    fn test_resource_type_from_module_address() {
        let record = IacResourceRecord {
            address: Some("module.net.azurerm_subnet.app[0]".to_string()),
            ..Default::default()
        };
        assert_eq!(record.resource_type(), Some("azurerm_subnet"));
    }

    #[test]
    fn test_resource_type_ignores_dots_in_instance_keys() {
        let record = IacResourceRecord {
            address: Some(r#"azurerm_subnet.app["a.b"]"#.to_string()),
            ..Default::default()
        };
        assert_eq!(record.resource_type(), Some("azurerm_subnet"));

        let record = IacResourceRecord {
            address: Some(r#"module.net["eu.west"].azurerm_subnet.app["x\"].y"]"#.to_string()),
            ..Default::default()
        };
        assert_eq!(record.resource_type(), Some("azurerm_subnet"));
    }
}
