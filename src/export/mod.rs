//! Marketplace CSV export of catalog and generated products.

pub mod filter;
pub mod normalize;
pub mod writer;

pub use filter::{ExportFilter, parse_bound};
pub use normalize::{ExportNormalizer, ExportRow};
pub use writer::{ExportError, export_filename, write_csv};

use crate::models::{CatalogRecord, GeneratedProduct};

/// Rows for every product passing `filter`: catalog products first, then
/// generated ones. `catalog` must be the unfiltered product table so parent
/// SKUs resolve.
pub fn collect_rows(
    catalog: &[CatalogRecord],
    generated: &[GeneratedProduct],
    filter: &ExportFilter,
) -> Vec<ExportRow> {
    let normalizer = ExportNormalizer::new(catalog);
    let regular = catalog
        .iter()
        .filter(|record| filter.accepts_record(record))
        .flat_map(|record| normalizer.normalize_record(record));
    let derived = generated
        .iter()
        .filter(|product| filter.accepts_generated(product))
        .flat_map(|product| normalizer.normalize_generated(product));
    regular.chain(derived).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use serde_json::json;

    #[test]
    fn end_to_end_export_csv() {
        let catalog: Vec<CatalogRecord> = vec![
            serde_json::from_value(json!({
                "id": 1,
                "product_name": "Tee",
                "item_sku": "TEE-1",
                "parent_child": "Parent",
                "created_at": "2025-01-01T00:00:00Z"
            }))
            .unwrap(),
        ];
        let generated: Vec<GeneratedProduct> = vec![
            serde_json::from_value(json!({
                "id": 1,
                "product_name": "Tee",
                "item_sku": "TEE-1-A1B2",
                "parent_sku": "TEE-1",
                "size": "[\"S\"]",
                "mockup_urls": "{\"#FF0000\":\"http://x/red.png\"}",
                "created_at": "2025-01-02T00:00:00Z",
                "updated_at": "2025-01-02T00:00:00Z"
            }))
            .unwrap(),
        ];

        let rows = collect_rows(&catalog, &generated, &ExportFilter::default());
        assert_eq!(rows.len(), 2);
        let csv = String::from_utf8(write_csv(&rows).unwrap()).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1], "Tee,TEE-1,Parent,,,,,,,0.00,0,");
        assert_eq!(
            lines[2],
            "Tee,,Child,TEE-1,S,Red,http://x/red.png,Tee - S - Red,Tee,,,"
        );

        let only_children = ExportFilter {
            kind: Some(Role::Child),
            ..ExportFilter::default()
        };
        let rows = collect_rows(&catalog, &generated, &only_children);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].parent_sku, "TEE-1");
    }
}
