//! Coverage report emitter
//!
//! Rendering is deterministic: the same records always produce the same bytes.

use crate::classify::{CoverageRecord, CoverageStatus, CoverageSummary};
use crate::tags::encode_tags;
use serde::{Deserialize, Serialize};

/// Report header, in column order
pub const REPORT_COLUMNS: [&str; 5] = ["matching_key", "status", "type", "scope_tags", "item_tags"];

const BOM: &str = "\u{feff}";
const LINE_END: &str = "\r\n";

/// One report row; tag columns are already encoded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportRow {
    pub matching_key: String,
    pub status: CoverageStatus,
    #[serde(rename = "type")]
    pub resource_type: String,
    pub scope_tags: String,
    pub item_tags: String,
}

impl ReportRow {
    fn fields(&self) -> [&str; 5] {
        [
            &self.matching_key,
            self.status.as_str(),
            &self.resource_type,
            &self.scope_tags,
            &self.item_tags,
        ]
    }
}

/// Rows plus the summary they were built with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub rows: Vec<ReportRow>,
    pub summary: CoverageSummary,
}

impl Report {
    /// Summary block as `(metric, value)` pairs
    pub fn summary_metrics(&self) -> Vec<(&'static str, String)> {
        let s = &self.summary;
        vec![
            (CoverageStatus::Managed.as_str(), s.managed.to_string()),
            (CoverageStatus::UnmanagedInCloud.as_str(), s.unmanaged_in_cloud.to_string()),
            (CoverageStatus::OrphanedInState.as_str(), s.orphaned_in_state.to_string()),
            ("TOTAL_CLOUD", s.total_cloud.to_string()),
            ("TOTAL_IAC", s.total_iac.to_string()),
            ("COVERAGE_PERCENT", format!("{:.2}", s.coverage_percent())),
        ]
    }

    /// Render as CSV: BOM, header, rows, a blank line, then the summary block
    pub fn to_csv(&self) -> String {
        let mut out = String::from(BOM);
        write_record(&mut out, REPORT_COLUMNS);
        for row in &self.rows {
            write_record(&mut out, row.fields());
        }

        out.push_str(LINE_END);
        write_record(&mut out, ["metric", "value"]);
        for (metric, value) in self.summary_metrics() {
            write_record(&mut out, [metric, value.as_str()]);
        }
        out
    }
}

fn write_record<const N: usize>(out: &mut String, fields: [&str; N]) {
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        write_field(out, field);
    }
    out.push_str(LINE_END);
}

fn write_field(out: &mut String, field: &str) {
    if field.contains([',', '"', '\r', '\n']) {
        out.push('"');
        out.push_str(&field.replace('"', "\"\""));
        out.push('"');
    } else {
        out.push_str(field);
    }
}

/// Build the report for classified records
pub fn emit(records: &[CoverageRecord<'_>], summary: &CoverageSummary) -> Report {
    let rows = records
        .iter()
        .map(|record| {
            let primary = record.primary_item();
            ReportRow {
                matching_key: record.matching_key.to_string(),
                status: record.status,
                resource_type: primary.map(|i| i.resource_type.clone()).unwrap_or_default(),
                scope_tags: primary.map(|i| encode_tags(&i.scope_tags)).unwrap_or_default(),
                item_tags: primary.map(|i| encode_tags(&i.item_tags)).unwrap_or_default(),
            }
        })
        .collect();

    Report {
        rows,
        summary: *summary,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::classify;
    use crate::matcher::match_inventories;
    use crate::model::{InventoryItem, Source};
    use crate::tags::TagSet;

    fn sample() -> (Vec<InventoryItem>, Vec<InventoryItem>) {
        let cloud = vec![
            InventoryItem::new(Source::Cloud, "c1", "s/rg1/microsoft.web/sites/app", "Microsoft.Web/sites")
                .with_scope_tags(TagSet::from_iter([("env", "prod")]))
                .with_item_tags(TagSet::from_iter([("owner", "web,team")])),
        ];
        let iac = vec![
            InventoryItem::new(Source::Iac, "ws/azurerm_linux_web_app.app", "s/rg1/microsoft.web/sites/app", "azurerm_linux_web_app")
                .with_item_tags(TagSet::from_iter([("workspace", "ignored")])),
            InventoryItem::new(Source::Iac, "ws/azurerm_key_vault.kv", "s/rg1/microsoft.keyvault/vaults/kv", "azurerm_key_vault"),
        ];
        (cloud, iac)
    }

    fn render(cloud: &[InventoryItem], iac: &[InventoryItem]) -> String {
        let results = match_inventories(cloud, iac).unwrap();
        let (records, summary) = classify(&results);
        emit(&records, &summary).to_csv()
    }

    #[test]
    fn test_rows_use_primary_item() {
        let (cloud, iac) = sample();
        let results = match_inventories(&cloud, &iac).unwrap();
        let (records, summary) = classify(&results);
        let report = emit(&records, &summary);

        assert_eq!(report.rows.len(), 2);
        assert_eq!(report.rows[0].resource_type, "Microsoft.Web/sites");
        assert_eq!(report.rows[0].item_tags, "owner:web\\,team");
        assert_eq!(report.rows[1].status, CoverageStatus::OrphanedInState);
        assert_eq!(report.rows[1].resource_type, "azurerm_key_vault");
        assert_eq!(report.rows[1].scope_tags, "");
    }

    #[test]
    fn test_csv_layout() {
        let (cloud, iac) = sample();
        let csv = render(&cloud, &iac);

        assert!(csv.starts_with("\u{feff}matching_key,status,type,scope_tags,item_tags\r\n"));
        // escaped comma still forces quoting at the CSV layer
        assert!(csv.contains(
            "s/rg1/microsoft.web/sites/app,MANAGED,Microsoft.Web/sites,env:prod,\"owner:web\\,team\"\r\n"
        ));
        assert!(csv.contains("\r\n\r\nmetric,value\r\n"));
        assert!(csv.ends_with("TOTAL_IAC,2\r\nCOVERAGE_PERCENT,100.00\r\n"));
        assert!(!csv.contains("ignored"));
    }

    #[test]
    fn test_quoting_doubles_quotes() {
        let mut out = String::new();
        write_field(&mut out, "say \"hi\"");
        assert_eq!(out, "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn test_emit_is_byte_identical() {
        let (cloud, iac) = sample();
        assert_eq!(render(&cloud, &iac).as_bytes(), render(&cloud, &iac).as_bytes());
    }

    #[test]
    fn test_empty_report_has_zero_coverage() {
        let csv = render(&[], &[]);
        assert!(csv.contains("COVERAGE_PERCENT,0.00\r\n"));
    }
}
