use once_cell::sync::Lazy;
use std::collections::HashMap;
use thiserror::Error;

/// Curated names used for display. Keys are uppercase hex without `#`.
const NAMED_COLORS: &[(&str, &str)] = &[
    ("000000", "Black"),
    ("FFFFFF", "White"),
    ("FF0000", "Red"),
    ("00FF00", "Green"),
    ("0000FF", "Blue"),
    ("FFFF00", "Yellow"),
    ("00FFFF", "Cyan"),
    ("FF00FF", "Magenta"),
    ("808080", "Gray"),
    ("800000", "Maroon"),
    ("808000", "Olive"),
    ("008000", "Dark Green"),
    ("800080", "Purple"),
    ("008080", "Teal"),
    ("000080", "Navy"),
    ("FFA500", "Orange"),
    ("A52A2A", "Brown"),
    ("FFC0CB", "Pink"),
    ("F5F5DC", "Beige"),
    ("E6E6FA", "Lavender"),
    ("D3D3D3", "Light Gray"),
    ("A9A9A9", "Dark Gray"),
    ("ADD8E6", "Light Blue"),
    ("90EE90", "Light Green"),
    ("FFB6C1", "Light Pink"),
    ("800020", "Burgundy"),
    ("FF7F50", "Coral"),
    ("F0E68C", "Khaki"),
    ("DDA0DD", "Plum"),
    ("B0C4DE", "Steel Blue"),
];

/// Base colours offered when picking product variants.
const PALETTE: &[(&str, &str)] = &[
    ("Black", "#000000"),
    ("White", "#FFFFFF"),
    ("Navy", "#000080"),
    ("Grey", "#808080"),
    ("Red", "#FF0000"),
    ("Blue", "#0000FF"),
    ("Green", "#008000"),
    ("Yellow", "#FFFF00"),
    ("Purple", "#800080"),
];

static NAME_INDEX: Lazy<HashMap<String, String>> = Lazy::new(|| {
    let mut index = HashMap::new();
    for (hex, name) in NAMED_COLORS {
        index.insert(name.to_lowercase(), format!("#{hex}"));
    }
    for (name, hex) in PALETTE {
        index
            .entry(name.to_lowercase())
            .or_insert_with(|| (*hex).to_string());
    }
    index
});

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown colour name `{0}`")]
pub struct UnknownColorError(pub String);

pub fn palette() -> &'static [(&'static str, &'static str)] {
    PALETTE
}

/// Uppercase `RRGGBB` digits when `value` is a 6-digit hex colour with or
/// without a leading `#`.
fn hex_digits(value: &str) -> Option<String> {
    let digits = value.trim().trim_start_matches('#');
    if digits.len() == 6 && digits.chars().all(|ch| ch.is_ascii_hexdigit()) {
        Some(digits.to_uppercase())
    } else {
        None
    }
}

pub fn is_hex_color(value: &str) -> bool {
    hex_digits(value).is_some()
}

/// Canonical `#RRGGBB` form, if `value` is a hex colour.
pub fn normalize_hex(value: &str) -> Option<String> {
    hex_digits(value).map(|digits| format!("#{digits}"))
}

fn rgb(digits: &str) -> Option<(i32, i32, i32)> {
    let channel = |range: std::ops::Range<usize>| {
        digits
            .get(range)
            .and_then(|part| i32::from_str_radix(part, 16).ok())
    };
    Some((channel(0..2)?, channel(2..4)?, channel(4..6)?))
}

pub fn hex_to_name(hex: &str) -> String {
    if hex.trim().is_empty() {
        return String::new();
    }
    let Some(digits) = hex_digits(hex) else {
        return hex.replace('#', "");
    };
    if let Some((_, name)) = NAMED_COLORS.iter().find(|(key, _)| *key == digits) {
        return (*name).to_string();
    }
    let Some((r, g, b)) = rgb(&digits) else {
        return digits;
    };
    NAMED_COLORS
        .iter()
        .filter_map(|(key, name)| {
            let (cr, cg, cb) = rgb(key)?;
            let distance = (r - cr).pow(2) + (g - cg).pow(2) + (b - cb).pow(2);
            Some((distance, *name))
        })
        .min_by_key(|(distance, _)| *distance)
        .map(|(_, name)| name.to_string())
        .unwrap_or(digits)
}

pub fn name_to_hex(name: &str) -> Result<String, UnknownColorError> {
    let key = name.trim().to_lowercase();
    NAME_INDEX
        .get(&key)
        .cloned()
        .ok_or_else(|| UnknownColorError(name.trim().to_string()))
}

/// Accepts either a colour name or a hex string. Palette names win over the
/// curated display names so a picked colour renders as listed.
pub fn resolve_color_input(value: &str) -> Result<String, UnknownColorError> {
    if let Some(hex) = normalize_hex(value) {
        return Ok(hex);
    }
    let key = value.trim();
    match PALETTE.iter().find(|(name, _)| name.eq_ignore_ascii_case(key)) {
        Some((_, hex)) => Ok((*hex).to_string()),
        None => name_to_hex(value),
    }
}

/// Palette name for a hex colour, used when building SKUs.
pub fn palette_name(hex: &str) -> Option<&'static str> {
    let hex = normalize_hex(hex)?;
    PALETTE
        .iter()
        .find(|(_, value)| value.eq_ignore_ascii_case(&hex))
        .map(|(name, _)| *name)
}
