use crate::catalog::color::palette_name;
use rand::Rng;

const SKU_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

fn random_part<R: Rng + ?Sized>(rng: &mut R, length: usize) -> String {
    (0..length)
        .map(|_| SKU_CHARSET[rng.random_range(0..SKU_CHARSET.len())] as char)
        .collect()
}

/// `NAM-<colour initials>-<size count>-XXXX`, skipping segments that are empty.
pub fn generate_product_sku<R: Rng + ?Sized>(
    name: &str,
    colors: &[String],
    size_count: usize,
    rng: &mut R,
) -> String {
    let clean: String = name
        .chars()
        .filter(|ch| !ch.is_whitespace())
        .flat_map(char::to_uppercase)
        .collect();
    if clean.is_empty() {
        return String::new();
    }
    let mut sku: String = clean.chars().take(3).collect();
    sku.push('-');

    let initials: String = colors
        .iter()
        .filter_map(|hex| palette_name(hex))
        .filter_map(|name| name.chars().next())
        .collect();
    if !initials.is_empty() {
        sku.push_str(&initials);
        sku.push('-');
    }
    if size_count > 0 {
        sku.push_str(&format!("{size_count}-"));
    }
    sku.push_str(&random_part(rng, 4));
    sku
}

pub fn generate_size_sku<R: Rng + ?Sized>(size: &str, rng: &mut R) -> String {
    let prefix: String = size
        .trim()
        .chars()
        .next()
        .map(|ch| ch.to_lowercase().collect())
        .unwrap_or_default();
    if prefix.is_empty() {
        random_part(rng, 6)
    } else {
        format!("{prefix}-{}", random_part(rng, 6))
    }
}

pub fn generate_design_sku<R: Rng + ?Sized>(base: &str, rng: &mut R) -> String {
    let base = base.trim();
    if base.is_empty() {
        random_part(rng, 8)
    } else {
        format!("{base}-{}", random_part(rng, 4))
    }
}
