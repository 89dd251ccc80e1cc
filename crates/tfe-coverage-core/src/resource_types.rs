//! Primary Azure resource types
//!
//! Coverage is only meaningful for resources that represent real
//! infrastructure. Azure lists hundreds of auxiliary types (operations,
//! locations, diagnostic settings, ...) that never appear in Terraform state,
//! so both inventories are restricted to a list of *primary* types. The list
//! is kept in a `PRIMARY_RESOURCE_TYPES.json` file that can be regenerated from
//! a provider listing with [`filter_primary_resource_types`].

use crate::error::{CoverageError, Result};
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use std::collections::{BTreeSet, HashSet};
use std::path::Path;

/// Resource types that are always primary
pub const PRIMARY_PATTERNS: &[&str] = &[
    // Compute
    "Microsoft.Compute/virtualMachines",
    "Microsoft.Compute/virtualMachineScaleSets",
    "Microsoft.Compute/disks",
    "Microsoft.Compute/availabilitySets",
    "Microsoft.Compute/snapshots",
    "Microsoft.Compute/images",
    "Microsoft.Compute/galleries",
    "Microsoft.Compute/proximityPlacementGroups",
    "Microsoft.Compute/hostGroups",
    "Microsoft.Compute/sshPublicKeys",
    // Web / App Services
    "Microsoft.Web/sites",
    "Microsoft.Web/serverFarms",
    "Microsoft.Web/staticSites",
    "Microsoft.Web/hostingEnvironments",
    "Microsoft.Web/certificates",
    "Microsoft.Web/customDomains",
    "Microsoft.Web/functions",
    // Storage
    "Microsoft.Storage/storageAccounts",
    // Database
    "Microsoft.Sql/servers",
    "Microsoft.Sql/databases",
    "Microsoft.Sql/managedInstances",
    "Microsoft.Sql/elasticPools",
    "Microsoft.Sql/failoverGroups",
    "Microsoft.DBforPostgreSQL/servers",
    "Microsoft.DBforMySQL/servers",
    "Microsoft.DBforMariaDB/servers",
    "Microsoft.DocumentDB/databaseAccounts",
    // Containers
    "Microsoft.ContainerService/managedClusters",
    "Microsoft.ContainerInstance/containerGroups",
    "Microsoft.ContainerRegistry/registries",
    // Networking
    "Microsoft.Network/virtualNetworks",
    "Microsoft.Network/applicationGateways",
    "Microsoft.Network/loadBalancers",
    "Microsoft.Network/publicIPAddresses",
    "Microsoft.Network/networkSecurityGroups",
    "Microsoft.Network/routeTables",
    "Microsoft.Network/networkInterfaces",
    "Microsoft.Network/virtualNetworkGateways",
    "Microsoft.Network/localNetworkGateways",
    "Microsoft.Network/connections",
    "Microsoft.Network/expressRouteCircuits",
    "Microsoft.Network/trafficManagerProfiles",
    "Microsoft.Network/networkWatchers",
    "Microsoft.Network/bastionHosts",
    "Microsoft.Network/firewallPolicies",
    "Microsoft.Network/webApplicationFirewallPolicies",
    // Security
    "Microsoft.KeyVault/vaults",
    // Analytics & data
    "Microsoft.Synapse/workspaces",
    "Microsoft.DataFactory/factories",
    "Microsoft.StreamAnalytics/streamingjobs",
    "Microsoft.DataLakeStore/accounts",
    "Microsoft.DataLakeAnalytics/accounts",
    // IoT
    "Microsoft.Devices/IotHubs",
    "Microsoft.IoTHub/hubs",
    // Media
    "Microsoft.Media/mediaservices",
    // Machine learning
    "Microsoft.MachineLearningServices/workspaces",
    // Search
    "Microsoft.Search/searchServices",
    // Messaging
    "Microsoft.EventHub/namespaces",
    "Microsoft.ServiceBus/namespaces",
    "Microsoft.NotificationHubs/namespaces",
    "Microsoft.Relay/namespaces",
    // Logic Apps
    "Microsoft.Logic/workflows",
    // API Management
    "Microsoft.ApiManagement/service",
    // App Configuration
    "Microsoft.AppConfiguration/configurationStores",
    // Cache
    "Microsoft.Cache/redis",
];

/// Fragments marking auxiliary endpoints rather than infrastructure
const SKIP_INDICATORS: &[&str] = &[
    "operations",
    "locations",
    "checknameavailability",
    "usages",
    "diagnostics",
    "metrics",
    "logs",
    "audits",
    "access",
    "permissions",
    "roles",
    "policies",
    "tags",
    "locks",
    "deployments",
    "templates",
    "scripts",
    "runcommands",
    "extensions",
    "patches",
    "assessments",
    "configurations",
    "settings",
    "properties",
    "metadata",
    "status",
    "state",
    "support",
    "cases",
    "tenants",
    "changes",
    "ownerships",
    "transfers",
    "moves",
    "validations",
    "checks",
    "availabilities",
    "quotas",
    "limits",
    "billings",
];

/// Fragments of infrastructure types missing from [`PRIMARY_PATTERNS`]
const INCLUDE_PATTERNS: &[&str] = &[
    "virtualmachines",
    "storageaccounts",
    "databases",
    "servers",
    "networks",
    "securitygroups",
    "keyvaults",
    "loadbalancers",
    "applicationgateways",
    "containers",
    "kubernetes",
    "webapps",
    "functions",
    "redis",
    "cosmosdb",
    "search",
    "eventhubs",
    "servicebus",
    "logicapps",
    "apimanagement",
];

/// Select the primary types out of every type a subscription exposes.
///
/// Exact [`PRIMARY_PATTERNS`] matches are always kept. Any other type is kept
/// when its resource part contains an include pattern and no skip indicator.
/// The result is deduplicated and sorted.
pub fn filter_primary_resource_types<I, S>(all_types: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let primary: HashSet<&str> = PRIMARY_PATTERNS.iter().copied().collect();
    let mut selected = BTreeSet::new();
    let mut heuristic = 0usize;

    for resource_type in all_types {
        let resource_type = resource_type.as_ref();
        if primary.contains(resource_type) {
            selected.insert(resource_type.to_string());
            continue;
        }

        let resource_name = resource_type
            .split_once('/')
            .map(|(_, name)| name)
            .unwrap_or(resource_type)
            .to_lowercase();

        if SKIP_INDICATORS.iter().any(|skip| resource_name.contains(skip)) {
            continue;
        }
        if INCLUDE_PATTERNS.iter().any(|p| resource_name.contains(p))
            && selected.insert(resource_type.to_string())
        {
            heuristic += 1;
        }
    }

    tracing::debug!(
        total = selected.len(),
        heuristic,
        "Filtered primary resource types"
    );
    selected.into_iter().collect()
}

/// One namespace of an `az provider list` style listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderNamespace {
    pub namespace: String,

    #[serde(default, rename = "resourceTypes")]
    pub resource_types: Vec<ProviderResourceType>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResourceType {
    #[serde(rename = "resourceType")]
    pub resource_type: String,
}

/// Flatten a provider listing into `Namespace/type` strings
pub fn collect_resource_types(providers: &[ProviderNamespace]) -> BTreeSet<String> {
    providers
        .iter()
        .flat_map(|p| {
            p.resource_types
                .iter()
                .map(move |rt| format!("{}/{}", p.namespace, rt.resource_type))
        })
        .collect()
}

/// Case-insensitive allow-list of resource types
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceTypeFilter {
    types: HashSet<String>,
}

impl ResourceTypeFilter {
    /// Filter over the built-in [`PRIMARY_PATTERNS`]
    pub fn builtin() -> Self {
        Self::from_types(PRIMARY_PATTERNS.iter().copied())
    }

    pub fn from_types<I, S>(types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            types: types
                .into_iter()
                .map(|t| t.as_ref().trim().to_lowercase())
                .filter(|t| !t.is_empty())
                .collect(),
        }
    }

    /// Load a `PRIMARY_RESOURCE_TYPES.json` file (a JSON array of type strings)
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let types: Vec<String> = serde_json::from_str(&content).map_err(|e| {
            CoverageError::InvalidResourceTypes(format!("{}: {}", path.display(), e))
        })?;
        if types.is_empty() {
            return Err(CoverageError::InvalidResourceTypes(format!(
                "{}: list is empty",
                path.display()
            )));
        }

        tracing::debug!(path = %path.display(), count = types.len(), "Loaded resource type list");
        Ok(Self::from_types(types))
    }

    pub fn allows(&self, resource_type: &str) -> bool {
        self.types.contains(&resource_type.trim().to_lowercase())
    }

    /// Stable digest of the allowed types, independent of input order and case
    pub fn fingerprint(&self) -> String {
        let mut types: Vec<&str> = self.types.iter().map(String::as_str).collect();
        types.sort_unstable();

        let mut hasher = Sha1::new();
        for t in types {
            hasher.update(t.as_bytes());
            hasher.update(b"\n");
        }
        format!("{:x}", hasher.finalize())
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_patterns_kept() {
        let result = filter_primary_resource_types([
            "Microsoft.Compute/virtualMachines",
            "Microsoft.KeyVault/vaults",
        ]);
        assert_eq!(
            result,
            vec!["Microsoft.Compute/virtualMachines", "Microsoft.KeyVault/vaults"]
        );
    }

    #[test]
    fn test_heuristic_include_and_skip() {
        let result = filter_primary_resource_types([
            // include pattern "servers"
            "Microsoft.DBforPostgreSQL/flexibleServers",
            // include pattern "networks" but skip indicator "operations"
            "Microsoft.Network/virtualNetworks/operations",
            // no include pattern
            "Microsoft.Insights/components",
            // skip indicator "locations"
            "Microsoft.Compute/locations",
        ]);
        assert_eq!(result, vec!["Microsoft.DBforPostgreSQL/flexibleServers"]);
    }

    #[test]
    fn test_result_is_sorted_and_deduplicated() {
        let result = filter_primary_resource_types([
            "Microsoft.Web/sites",
            "Microsoft.Cache/redis",
            "Microsoft.Web/sites",
        ]);
        assert_eq!(result, vec!["Microsoft.Cache/redis", "Microsoft.Web/sites"]);
    }

    #[test]
    fn test_collect_from_provider_listing() {
        let providers: Vec<ProviderNamespace> = serde_json::from_str(
            r#"[{"namespace": "Microsoft.Cache", "resourceTypes": [{"resourceType": "redis"}, {"resourceType": "locations"}]},
                {"namespace": "Microsoft.Empty"}]"#,
        )
        .unwrap();
        let all = collect_resource_types(&providers);
        assert_eq!(all.len(), 2);
        assert_eq!(filter_primary_resource_types(&all), vec!["Microsoft.Cache/redis"]);
    }

    #[test]
    fn test_filter_is_case_insensitive() {
        let filter = ResourceTypeFilter::builtin();
        assert!(filter.allows("microsoft.compute/VIRTUALMACHINES"));
        assert!(!filter.allows("Microsoft.Insights/components"));
    }

    #[test]
    fn test_filter_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("PRIMARY_RESOURCE_TYPES.json");
        std::fs::write(&path, r#"["Microsoft.Web/sites"]"#).unwrap();

        let filter = ResourceTypeFilter::from_file(&path).unwrap();
        assert_eq!(filter.len(), 1);
        assert!(filter.allows("Microsoft.Web/sites"));

        std::fs::write(&path, "[]").unwrap();
        assert!(matches!(
            ResourceTypeFilter::from_file(&path),
            Err(CoverageError::InvalidResourceTypes(_))
        ));
    }

    #[test]
    fn test_fingerprint_ignores_order_and_case() {
        let a = ResourceTypeFilter::from_types(["Microsoft.Web/sites", "Microsoft.Cache/redis"]);
        let b = ResourceTypeFilter::from_types(["microsoft.cache/REDIS", "Microsoft.Web/sites"]);
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint().len(), 40);

        let c = ResourceTypeFilter::from_types(["Microsoft.Web/sites"]);
        assert_ne!(a.fingerprint(), c.fingerprint());
    }
}
