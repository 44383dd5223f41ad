use super::normalize::ExportRow;
use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;

pub const REQUIRED_COLUMNS: [&str; 9] = [
    "product_name",
    "item_sku",
    "parent_child",
    "parent_sku",
    "size",
    "color",
    "image_url",
    "market_place_title",
    "category",
];

pub const PRICING_COLUMNS: [&str; 3] = ["price", "quantity", "tax_class"];

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("csv encoding failed: {0}")]
    Csv(#[from] csv::Error),
    #[error("csv buffer failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Header for `rows`: required columns, pricing columns when any regular
/// product is present, then extra columns in the order first seen.
pub fn header(rows: &[ExportRow]) -> Vec<String> {
    let mut columns: Vec<String> = REQUIRED_COLUMNS.iter().map(|c| c.to_string()).collect();
    if rows.iter().any(|row| row.pricing.is_some()) {
        columns.extend(PRICING_COLUMNS.iter().map(|c| c.to_string()));
    }
    for row in rows {
        for key in row.extra.keys() {
            if !columns.iter().any(|existing| existing == key) {
                columns.push(key.clone());
            }
        }
    }
    columns
}

pub fn write_csv(rows: &[ExportRow]) -> Result<Vec<u8>, ExportError> {
    let columns = header(rows);
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(&columns)?;
    for row in rows {
        writer.write_record(columns.iter().map(|column| cell(row, column)))?;
    }
    writer.flush()?;
    writer
        .into_inner()
        .map_err(|err| ExportError::Io(err.into_error()))
}

fn cell(row: &ExportRow, column: &str) -> String {
    match column {
        "product_name" => row.product_name.clone(),
        "item_sku" => row.item_sku.clone(),
        "parent_child" => row.parent_child.as_str().to_string(),
        "parent_sku" => row.parent_sku.clone(),
        "size" => row.size.clone(),
        "color" => row.color.clone(),
        "image_url" => row.image_url.clone(),
        "market_place_title" => row.marketplace_title.clone(),
        "category" => row.category.clone(),
        "price" => row
            .pricing
            .as_ref()
            .map(|p| format!("{:.2}", p.price))
            .unwrap_or_default(),
        "quantity" => row
            .pricing
            .as_ref()
            .map(|p| p.quantity.to_string())
            .unwrap_or_default(),
        "tax_class" => row
            .pricing
            .as_ref()
            .map(|p| p.tax_class.clone())
            .unwrap_or_default(),
        extra => match row.extra.get(extra) {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(text)) => text.clone(),
            Some(other) => other.to_string(),
        },
    }
}

pub fn export_filename(now: DateTime<Utc>) -> String {
    format!("product_export_{}.csv", now.format("%Y%m%d_%H%M%S"))
}
