pub mod color;
pub mod fields;
pub mod sku;

pub use color::{UnknownColorError, hex_to_name, name_to_hex, normalize_hex, resolve_color_input};
pub use fields::{LooseNumber, MockupUrls, SizeEntry, VariantField};
