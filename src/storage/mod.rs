//! Public object storage for uploaded designs and rendered mockups.

pub mod memory;
pub mod supabase;

pub use memory::MemoryObjectStore;
pub use supabase::SupabaseObjectStore;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ObjectStoreError {
    #[error("upload of `{key}` failed: {message}")]
    Put { key: String, message: String },
    #[error("download of `{url}` failed: {message}")]
    Get { url: String, message: String },
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Stores `bytes` under `key` (overwriting) and returns its public URL.
    async fn put_object(
        &self,
        bytes: Vec<u8>,
        key: &str,
        content_type: &str,
    ) -> Result<String, ObjectStoreError>;

    async fn get_object(&self, url: &str) -> Result<Vec<u8>, ObjectStoreError>;

    /// Whether `url` is reachable right now. Never errors.
    async fn probe(&self, url: &str) -> bool;
}

/// `original/<uuid>.<ext>` for an uploaded design.
pub fn original_key(content_type: &str) -> String {
    format!("original/{}.{}", Uuid::new_v4(), extension_for(content_type))
}

/// `mockups/<designSku>_<ColorName>[_<n>].png`. Pass the zero-based template
/// position only when the workflow renders more than one template; the key
/// carries it 1-based.
pub fn mockup_key(design_sku: &str, color_name: &str, template_index: Option<usize>) -> String {
    let color = color_name.trim().replace(' ', "-");
    match template_index {
        Some(index) => format!("mockups/{design_sku}_{color}_{}.png", index + 1),
        None => format!("mockups/{design_sku}_{color}.png"),
    }
}

pub fn extension_for(content_type: &str) -> &'static str {
    match content_type.trim().to_ascii_lowercase().as_str() {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/webp" => "webp",
        "image/gif" => "gif",
        _ => "png",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mockup_keys_follow_naming_scheme() {
        assert_eq!(mockup_key("TEE-AB12", "Black", None), "mockups/TEE-AB12_Black.png");
        assert_eq!(
            mockup_key("TEE-AB12", "Navy Blue", Some(1)),
            "mockups/TEE-AB12_Navy-Blue_2.png"
        );
    }

    #[test]
    fn original_keys_carry_extension() {
        let key = original_key("image/jpeg");
        assert!(key.starts_with("original/"));
        assert!(key.ends_with(".jpg"));
        assert!(original_key("application/octet-stream").ends_with(".png"));
    }
}
