use serde_json::json;
use std::cell::Cell;
use std::time::Duration;
use tfe_coverage_core::{
    CacheStore, CancelToken, CoverageError, CoverageRun, CoverageStatus, FetchError,
    InventoryCache, NormalizationPolicy, Normalizer, RawInventory, ResourceTypeFilter, RunStatus,
    Source,
};

type FetchResult = Result<RawInventory, FetchError>;

const RG1_VM1: &str =
    "/subscriptions/sub-1/resourceGroups/rg1/providers/Microsoft.Compute/virtualMachines/vm1";

fn cloud_doc(resources: serde_json::Value) -> RawInventory {
    serde_json::from_value(json!({
        "schema": "azure-resource-graph/v1",
        "resources": resources,
        "resourceGroups": [{"name": "rg1", "tags": {"env": "prod"}}]
    }))
    .unwrap()
}

fn iac_doc(resources: serde_json::Value) -> RawInventory {
    serde_json::from_value(json!({
        "schema": "tfe-workspace-state/v1",
        "resources": resources,
        "workspaces": [{"name": "app-prod", "tags": "team:app"}]
    }))
    .unwrap()
}

fn vm1_cloud() -> serde_json::Value {
    json!([{ "id": RG1_VM1, "type": "Microsoft.Compute/virtualMachines", "tags": {"owner": "ops"} }])
}

fn vm1_state() -> serde_json::Value {
    json!([{
        "address": "azurerm_linux_virtual_machine.vm1",
        "workspace": "app-prod",
        "provider_type": "azurerm_linux_virtual_machine",
        "cloud_id": RG1_VM1.to_uppercase()
    }])
}

fn run() -> CoverageRun {
    CoverageRun::new(vec!["sub-1".to_string()], vec!["app-prod".to_string()])
}

#[test]
fn test_cloud_only_resource_is_unmanaged() {
    let cloud = |_: &str| -> FetchResult { Ok(cloud_doc(vm1_cloud())) };
    let iac = |_: &str| -> FetchResult { Ok(iac_doc(json!([]))) };

    let outcome = run()
        .execute(&mut InventoryCache::new(), &cloud, &iac, &CancelToken::new())
        .unwrap();

    assert_eq!(outcome.report.rows.len(), 1);
    assert_eq!(outcome.report.rows[0].status, CoverageStatus::UnmanagedInCloud);
    assert_eq!(outcome.summary.coverage_percent(), 0.0);
    assert!(outcome.report.to_csv().contains("COVERAGE_PERCENT,0.00\r\n"));
}

#[test]
fn test_shared_resource_is_managed() {
    let cloud = |_: &str| -> FetchResult { Ok(cloud_doc(vm1_cloud())) };
    let iac = |_: &str| -> FetchResult { Ok(iac_doc(vm1_state())) };

    let outcome = run()
        .execute(&mut InventoryCache::new(), &cloud, &iac, &CancelToken::new())
        .unwrap();

    assert_eq!(outcome.report.rows.len(), 1);
    let row = &outcome.report.rows[0];
    assert_eq!(row.status, CoverageStatus::Managed);
    assert_eq!(row.resource_type, "Microsoft.Compute/virtualMachines");
    assert_eq!(row.scope_tags, "env:prod");
    assert_eq!(row.item_tags, "owner:ops");
    assert_eq!(outcome.summary.coverage_percent(), 100.0);
    assert_eq!(outcome.status(), RunStatus::Success);
}

#[test]
fn test_duplicate_cloud_key_fails_the_run() {
    let cloud = |_: &str| -> FetchResult {
        Ok(cloud_doc(json!([
            { "id": RG1_VM1 },
            { "id": RG1_VM1.to_lowercase() }
        ])))
    };
    let iac = |_: &str| -> FetchResult { Ok(iac_doc(json!([]))) };

    let err = run()
        .execute(&mut InventoryCache::new(), &cloud, &iac, &CancelToken::new())
        .unwrap_err();
    match err {
        CoverageError::DuplicateKey {
            origin,
            first_id,
            second_id,
            ..
        } => {
            assert_eq!(origin, Source::Cloud);
            assert_eq!(first_id, RG1_VM1);
            assert_eq!(second_id, RG1_VM1.to_lowercase());
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_strict_policy_fails_on_missing_id() {
    let cloud = |_: &str| -> FetchResult { Ok(cloud_doc(json!([{ "name": "no-id" }]))) };
    let iac = |_: &str| -> FetchResult { Ok(iac_doc(json!([]))) };

    let lenient = run()
        .execute(&mut InventoryCache::new(), &cloud, &iac, &CancelToken::new())
        .unwrap();
    assert_eq!(lenient.status(), RunStatus::PartialSuccess);

    let strict = run()
        .with_normalizer(Normalizer::new(NormalizationPolicy::Strict))
        .execute(&mut InventoryCache::new(), &cloud, &iac, &CancelToken::new());
    assert!(matches!(strict, Err(CoverageError::Normalization { .. })));
}

#[test]
fn test_fetch_failure_without_fallback_fails_the_run() {
    let cloud = |_: &str| -> FetchResult { Err(FetchError::new("subscription not found")) };
    let iac = |_: &str| -> FetchResult { Ok(iac_doc(json!([]))) };

    let err = run()
        .execute(&mut InventoryCache::new(), &cloud, &iac, &CancelToken::new())
        .unwrap_err();
    assert!(err.to_string().contains("sub-1"));
}

#[test]
fn test_persisted_cache_skips_fetch_on_next_run() {
    let dir = tempfile::tempdir().unwrap();
    let store = CacheStore::new(dir.path().join("inventory-cache.json"));
    let calls = Cell::new(0);
    let cloud = |_: &str| -> FetchResult {
        calls.set(calls.get() + 1);
        Ok(cloud_doc(vm1_cloud()))
    };
    let iac = |_: &str| -> FetchResult {
        calls.set(calls.get() + 1);
        Ok(iac_doc(vm1_state()))
    };
    let run = run().with_ttl(Duration::from_secs(3600));

    let mut cache = store.load().cache;
    let first = run.execute(&mut cache, &cloud, &iac, &CancelToken::new()).unwrap();
    store.save(&cache).unwrap();
    assert_eq!(calls.get(), 2);

    let mut reloaded = store.load().cache;
    let second = run
        .execute(&mut reloaded, &cloud, &iac, &CancelToken::new())
        .unwrap();
    assert_eq!(calls.get(), 2);
    assert_eq!(first.report.to_csv(), second.report.to_csv());
}

#[test]
fn test_multiple_scopes_are_concatenated() {
    let cloud = |scope: &str| -> FetchResult {
        Ok(cloud_doc(json!([{
            "id": format!("/subscriptions/{scope}/resourceGroups/rg1/providers/Microsoft.KeyVault/vaults/kv")
        }])))
    };
    let iac = |_: &str| -> FetchResult { Ok(iac_doc(json!([]))) };

    let outcome = CoverageRun::new(vec!["a".into(), "b".into()], vec![])
        .execute(&mut InventoryCache::new(), &cloud, &iac, &CancelToken::new())
        .unwrap();
    let keys: Vec<_> = outcome.report.rows.iter().map(|r| r.matching_key.as_str()).collect();
    assert_eq!(
        keys,
        vec![
            "a/rg1/microsoft.keyvault/vaults/kv",
            "b/rg1/microsoft.keyvault/vaults/kv"
        ]
    );
    assert_eq!(outcome.summary.total_cloud, 2);
}

#[test]
fn test_strict_run_does_not_reuse_lenient_snapshot() {
    let cloud = |_: &str| -> FetchResult {
        Ok(cloud_doc(json!([{ "id": RG1_VM1 }, { "name": "no-id" }])))
    };
    let iac = |_: &str| -> FetchResult { Ok(iac_doc(vm1_state())) };
    let mut cache = InventoryCache::new();

    let lenient = run()
        .with_ttl(Duration::from_secs(3600))
        .execute(&mut cache, &cloud, &iac, &CancelToken::new())
        .unwrap();
    assert_eq!(lenient.diagnostics.skipped, 1);

    let strict = run()
        .with_ttl(Duration::from_secs(3600))
        .with_normalizer(Normalizer::new(NormalizationPolicy::Strict))
        .execute(&mut cache, &cloud, &iac, &CancelToken::new());
    match strict {
        Err(CoverageError::Normalization { origin, scope, record, .. }) => {
            assert_eq!(origin, Source::Cloud);
            assert_eq!(scope.as_deref(), Some("sub-1"));
            assert!(record.contains("no-id"));
        }
        other => panic!("expected a normalization error, got {other:?}"),
    }
}

#[test]
fn test_type_filter_change_refetches_snapshot() {
    let cloud = |_: &str| -> FetchResult {
        Ok(cloud_doc(json!([
            { "id": RG1_VM1, "type": "Microsoft.Compute/virtualMachines" },
            {
                "id": "/subscriptions/sub-1/resourceGroups/rg1/providers/Microsoft.Insights/components/ai1",
                "type": "Microsoft.Insights/components"
            }
        ])))
    };
    let iac = |_: &str| -> FetchResult { Ok(iac_doc(json!([]))) };
    let mut cache = InventoryCache::new();

    let unfiltered = run()
        .with_ttl(Duration::from_secs(3600))
        .execute(&mut cache, &cloud, &iac, &CancelToken::new())
        .unwrap();
    assert_eq!(unfiltered.report.rows.len(), 2);

    let filtered = run()
        .with_ttl(Duration::from_secs(3600))
        .with_normalizer(Normalizer::default().with_type_filter(ResourceTypeFilter::builtin()))
        .execute(&mut cache, &cloud, &iac, &CancelToken::new())
        .unwrap();
    let types: Vec<&str> = filtered
        .report
        .rows
        .iter()
        .map(|row| row.resource_type.as_str())
        .collect();
    assert_eq!(types, vec!["Microsoft.Compute/virtualMachines"]);
    assert_eq!(filtered.diagnostics.filtered, 1);
    assert!(filtered.diagnostics.cached_scopes.is_empty());
}

#[test]
fn test_persisted_lenient_snapshot_is_not_used_by_strict_run() {
    let dir = tempfile::tempdir().unwrap();
    let store = CacheStore::new(dir.path().join("inventory-cache.json"));
    let cloud = |_: &str| -> FetchResult { Ok(cloud_doc(json!([{ "name": "no-id" }]))) };
    let iac = |_: &str| -> FetchResult { Ok(iac_doc(json!([]))) };

    let mut cache = store.load().cache;
    run().execute(&mut cache, &cloud, &iac, &CancelToken::new()).unwrap();
    store.save(&cache).unwrap();

    let mut cache = store.load().cache;
    let strict = run()
        .with_normalizer(Normalizer::new(NormalizationPolicy::Strict))
        .execute(&mut cache, &cloud, &iac, &CancelToken::new());
    assert!(matches!(strict, Err(CoverageError::Normalization { .. })));
}

