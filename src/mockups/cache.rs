use crate::mockups::templates::MockupTemplate;
use std::collections::{BTreeMap, HashMap};

type TemplateKey = (String, String);

fn key(template: &MockupTemplate) -> TemplateKey {
    (
        template.mockup_uuid.clone(),
        template.smart_object_uuid.clone(),
    )
}

/// Rendered URLs for one workflow: template → `#RRGGBB` → URL.
#[derive(Debug, Clone, Default)]
pub struct RenderCache {
    entries: HashMap<TemplateKey, BTreeMap<String, String>>,
}

impl RenderCache {
    pub fn get(&self, template: &MockupTemplate, hex: &str) -> Option<&str> {
        self.entries
            .get(&key(template))
            .and_then(|colors| colors.get(hex))
            .map(String::as_str)
    }

    pub fn contains(&self, template: &MockupTemplate, hex: &str) -> bool {
        self.get(template, hex).is_some()
    }

    pub fn insert(&mut self, template: &MockupTemplate, hex: &str, url: impl Into<String>) {
        self.entries
            .entry(key(template))
            .or_default()
            .insert(hex.to_string(), url.into());
    }

    pub fn evict(&mut self, template: &MockupTemplate, hex: &str) -> Option<String> {
        let colors = self.entries.get_mut(&key(template))?;
        let removed = colors.remove(hex);
        if colors.is_empty() {
            self.entries.remove(&key(template));
        }
        removed
    }

    pub fn for_template(&self, template: &MockupTemplate) -> BTreeMap<String, String> {
        self.entries.get(&key(template)).cloned().unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_are_scoped_per_template() {
        let front = MockupTemplate::new("m-1", "so-front");
        let back = MockupTemplate::new("m-1", "so-back");
        let mut cache = RenderCache::default();
        cache.insert(&front, "#000000", "u1");
        cache.insert(&back, "#000000", "u2");
        assert_eq!(cache.get(&front, "#000000"), Some("u1"));
        assert_eq!(cache.get(&back, "#000000"), Some("u2"));
        assert_eq!(cache.len(), 2);

        assert_eq!(cache.evict(&front, "#000000").as_deref(), Some("u1"));
        assert!(!cache.contains(&front, "#000000"));
        assert!(cache.evict(&front, "#000000").is_none());
        assert_eq!(cache.len(), 1);
    }
}
