use assert_cmd::Command;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

pub const VM1: &str =
    "/subscriptions/sub-1/resourceGroups/rg1/providers/Microsoft.Compute/virtualMachines/vm1";

/// Working directory with an export dir, a config file, and a private cache file
pub struct TestProject {
    pub root: TempDir,
}

impl TestProject {
    pub fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        let project = Self { root };
        project.write_config("");
        project
    }

    pub fn path(&self) -> PathBuf {
        self.root.path().to_path_buf()
    }

    pub fn cache_path(&self) -> PathBuf {
        self.path().join("cache").join("inventory-cache.json")
    }

    pub fn report_path(&self) -> PathBuf {
        self.path().join("coverage-report.csv")
    }

    /// Write `coverage.yaml`; `extra` is appended to the base settings
    pub fn write_config(&self, extra: &str) {
        let content = format!(
            "export_dir: exports\ncache:\n  path: cache/inventory-cache.json\n{}",
            extra
        );
        fs::write(self.path().join("coverage.yaml"), content).unwrap();
    }

    pub fn write_cloud(&self, scope: &str, ids: &[&str]) {
        let resources: Vec<_> = ids
            .iter()
            .map(|id| serde_json::json!({ "id": id, "tags": {"owner": "ops"} }))
            .collect();
        self.write_export(
            "cloud",
            scope,
            serde_json::json!({ "schema": "azure-resource-graph/v1", "resources": resources }),
        );
    }

    pub fn write_iac(&self, workspace: &str, ids: &[&str]) {
        let resources: Vec<_> = ids
            .iter()
            .enumerate()
            .map(|(i, id)| {
                serde_json::json!({
                    "address": format!("azurerm_resource.r{}", i),
                    "workspace": workspace,
                    "cloud_id": id
                })
            })
            .collect();
        self.write_export(
            "iac",
            workspace,
            serde_json::json!({ "schema": "tfe-workspace-state/v1", "resources": resources }),
        );
    }

    pub fn write_export(&self, source: &str, scope: &str, document: serde_json::Value) {
        let dir = self.path().join("exports").join(source);
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join(format!("{}.json", scope)),
            serde_json::to_string_pretty(&document).unwrap(),
        )
        .unwrap();
    }

    /// Command running in the project with a clean environment
    pub fn command(&self) -> Command {
        let mut cmd = Command::cargo_bin("tfe-coverage").unwrap();
        cmd.current_dir(self.path())
            .env_remove("TFE_COVERAGE_CONFIG")
            .env_remove("AZURE_SUBSCRIPTION_ID")
            .env_remove("TFE_COVERAGE_CACHE_TTL")
            .env_remove("TFE_COVERAGE_SERVE_STALE")
            .env_remove("RUST_LOG")
            .env("NO_COLOR", "1");
        cmd
    }
}
