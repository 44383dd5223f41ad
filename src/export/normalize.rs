use crate::catalog::color::{hex_to_name, is_hex_color};
use crate::catalog::fields::{
    MockupUrl, MockupUrls, VariantEntry, VariantField, coerce_price, coerce_quantity,
};
use crate::models::{CatalogRecord, GeneratedProduct, RecordId, Role};
use serde_json::{Map, Value};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub struct Pricing {
    pub price: f64,
    pub quantity: i64,
    pub tax_class: String,
}

/// One line of the marketplace export.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportRow {
    pub product_name: String,
    pub item_sku: String,
    pub parent_child: Role,
    pub parent_sku: String,
    pub size: String,
    pub color: String,
    pub image_url: String,
    pub marketplace_title: String,
    pub category: String,
    /// Present only for rows of regular catalog products.
    pub pricing: Option<Pricing>,
    pub extra: Map<String, Value>,
}

/// Flattens catalog and generated products into export rows. Parent SKUs of
/// generated products are resolved against the whole catalog, not just the
/// filtered slice being exported.
pub struct ExportNormalizer<'a> {
    by_id: HashMap<RecordId, &'a CatalogRecord>,
    by_sku: HashMap<&'a str, &'a CatalogRecord>,
}

impl<'a> ExportNormalizer<'a> {
    pub fn new(catalog: &'a [CatalogRecord]) -> Self {
        Self {
            by_id: catalog.iter().map(|record| (record.id, record)).collect(),
            by_sku: catalog
                .iter()
                .filter(|record| !record.item_sku.trim().is_empty())
                .map(|record| (record.item_sku.as_str(), record))
                .collect(),
        }
    }

    pub fn normalize_record(&self, record: &CatalogRecord) -> Vec<ExportRow> {
        let base = ExportRow {
            product_name: record.product_name.clone(),
            item_sku: record.item_sku.clone(),
            parent_child: record.role,
            parent_sku: String::new(),
            size: String::new(),
            color: String::new(),
            image_url: record.image_url.clone().unwrap_or_default(),
            marketplace_title: record.marketplace_title.clone().unwrap_or_default(),
            category: record.category.clone().unwrap_or_default(),
            pricing: Some(Pricing {
                price: coerce_price(record.price.as_ref()),
                quantity: coerce_quantity(record.quantity.as_ref()),
                tax_class: record.tax_class.clone().unwrap_or_default(),
            }),
            extra: record.extra.clone(),
        };

        if record.role == Role::Parent {
            return vec![base];
        }

        let parent_sku = record.parent_sku.clone().unwrap_or_default();
        variant_pairs(&record.size, &record.color)
            .into_iter()
            .map(|(size, color)| ExportRow {
                item_sku: size
                    .as_ref()
                    .and_then(VariantEntry::sku)
                    .map(str::to_string)
                    .unwrap_or_else(|| record.item_sku.clone()),
                parent_sku: parent_sku.clone(),
                size: display(size.as_ref()),
                color: display(color.as_ref()),
                ..base.clone()
            })
            .collect()
    }

    pub fn normalize_generated(&self, product: &GeneratedProduct) -> Vec<ExportRow> {
        let parent_sku = self.parent_sku_of(product);
        let default_image = product.original_design_url.clone().unwrap_or_default();

        let variants: Vec<(Option<VariantEntry>, String, String)> =
            if product.mockup_urls.is_empty() {
                variant_pairs(&product.size, &product.color)
                    .into_iter()
                    .map(|(size, color)| {
                        let color_name = display(color.as_ref());
                        (size, color_name, default_image.clone())
                    })
                    .collect()
            } else {
                let mockups = order_mockups(&product.color, &product.mockup_urls);
                sizes_or_blank(&product.size)
                    .into_iter()
                    .flat_map(|size| {
                        mockups.iter().map(move |mockup| {
                            (size.clone(), hex_to_name(&mockup.color), mockup.url.clone())
                        })
                    })
                    .collect()
            };

        variants
            .into_iter()
            .map(|(size, color, image_url)| {
                let size_name = display(size.as_ref());
                let title = product
                    .marketplace_title
                    .clone()
                    .filter(|title| !title.trim().is_empty())
                    .unwrap_or_else(|| synthesize_title(&product.product_name, &size_name, &color));
                ExportRow {
                    product_name: product.product_name.clone(),
                    item_sku: size
                        .as_ref()
                        .and_then(VariantEntry::sku)
                        .map(str::to_string)
                        .unwrap_or_default(),
                    parent_child: Role::Child,
                    parent_sku: parent_sku.clone(),
                    size: size_name,
                    color,
                    image_url,
                    marketplace_title: title,
                    category: product.product_name.clone(),
                    pricing: None,
                    extra: product.extra.clone(),
                }
            })
            .collect()
    }

    /// The linked product's `item_sku`, or the stored `parent_sku` when it
    /// names an existing product, else blank.
    fn parent_sku_of(&self, product: &GeneratedProduct) -> String {
        if let Some(parent) = product
            .parent_product_id
            .and_then(|id| self.by_id.get(&id))
            .filter(|parent| !parent.item_sku.trim().is_empty())
        {
            return parent.item_sku.clone();
        }
        product
            .parent_sku
            .as_deref()
            .map(str::trim)
            .filter(|sku| self.by_sku.contains_key(sku))
            .map(str::to_string)
            .unwrap_or_default()
    }
}

fn display(entry: Option<&VariantEntry>) -> String {
    entry.map(VariantEntry::display).unwrap_or_default()
}

fn sizes_or_blank(field: &VariantField) -> Vec<Option<VariantEntry>> {
    let sizes = field.entries();
    if sizes.is_empty() {
        vec![None]
    } else {
        sizes.into_iter().map(Some).collect()
    }
}

/// Size × colour cross product, degrading to whichever list exists, or a
/// single blank pair.
fn variant_pairs(
    sizes: &VariantField,
    colors: &VariantField,
) -> Vec<(Option<VariantEntry>, Option<VariantEntry>)> {
    let colors = colors.entries();
    let color_options: Vec<Option<VariantEntry>> = if colors.is_empty() {
        vec![None]
    } else {
        colors.into_iter().map(Some).collect()
    };
    sizes_or_blank(sizes)
        .into_iter()
        .flat_map(|size| {
            color_options
                .iter()
                .map(move |color| (size.clone(), color.clone()))
        })
        .collect()
}

/// Mockup entries in the order of the record's colour list, followed by any
/// entries no colour matched.
fn order_mockups<'m>(colors: &VariantField, urls: &'m MockupUrls) -> Vec<&'m MockupUrl> {
    let mut ordered: Vec<&MockupUrl> = Vec::with_capacity(urls.len());
    for color in colors.raw_values() {
        if let Some(found) = match_mockup(&color, urls, &ordered) {
            ordered.push(found);
        }
    }
    for entry in urls.iter() {
        if !ordered.iter().any(|taken| std::ptr::eq(*taken, entry)) {
            ordered.push(entry);
        }
    }
    ordered
}

/// Finds the mockup for `color`: exact key, `#`-prepended, `#`-stripped,
/// case-insensitive without `#`, then by resolved colour name.
pub fn match_mockup<'m>(
    color: &str,
    urls: &'m MockupUrls,
    taken: &[&MockupUrl],
) -> Option<&'m MockupUrl> {
    let color = color.trim();
    if color.is_empty() {
        return None;
    }
    let bare = color.trim_start_matches('#');
    let prefixed = format!("#{bare}");
    let wanted_name = if is_hex_color(color) {
        hex_to_name(color)
    } else {
        color.to_string()
    };

    let free: Vec<&MockupUrl> = urls
        .iter()
        .filter(|entry| !taken.iter().any(|t| std::ptr::eq(*t, *entry)))
        .collect();
    let strategies: [&dyn Fn(&MockupUrl) -> bool; 5] = [
        &|entry: &MockupUrl| entry.color == color,
        &|entry: &MockupUrl| entry.color == prefixed,
        &|entry: &MockupUrl| entry.color == bare,
        &|entry: &MockupUrl| entry.color.trim_start_matches('#').eq_ignore_ascii_case(bare),
        &|entry: &MockupUrl| hex_to_name(&entry.color).eq_ignore_ascii_case(&wanted_name),
    ];
    strategies
        .iter()
        .find_map(|matches| free.iter().copied().find(|entry| matches(*entry)))
}

fn synthesize_title(name: &str, size: &str, color: &str) -> String {
    [name, size, color]
        .into_iter()
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" - ")
}
