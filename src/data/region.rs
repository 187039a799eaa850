use std::{
    collections::{BTreeMap, HashMap},
    sync::RwLock,
};

use tracing::{debug, info, warn};

use super::countries;

/// Memo of region name to resolved code, failures included as `None`.
///
/// Entries are only ever appended; `clear` exists for dataset re-selection.
/// Reads take the shared lock, inserts the exclusive one.
#[derive(Debug, Default)]
pub struct RegionCodeCache {
    entries: RwLock<HashMap<String, Option<String>>>,
}

impl RegionCodeCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// `None` when the key was never resolved, `Some(None)` for a cached failure.
    pub fn get(&self, key: &str) -> Option<Option<String>> {
        match self.entries.read() {
            Ok(entries) => entries.get(key).cloned(),
            Err(poisoned) => poisoned.into_inner().get(key).cloned(),
        }
    }

    pub fn insert(&self, key: String, code: Option<String>) {
        let mut entries = match self.entries.write() {
            Ok(entries) => entries,
            Err(poisoned) => poisoned.into_inner(),
        };
        // First writer wins if two runs race on the same key.
        entries.entry(key).or_insert(code);
    }

    pub fn clear(&self) {
        let mut entries = match self.entries.write() {
            Ok(entries) => entries,
            Err(poisoned) => poisoned.into_inner(),
        };
        entries.clear();
        debug!("Region code cache cleared");
    }

    pub fn len(&self) -> usize {
        match self.entries.read() {
            Ok(entries) => entries.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Maps free-text region names to 2-letter codes through a borrowed cache.
#[derive(Debug, Clone, Copy)]
pub struct RegionCodeResolver<'a> {
    cache: &'a RegionCodeCache,
}

impl<'a> RegionCodeResolver<'a> {
    pub fn new(cache: &'a RegionCodeCache) -> Self {
        Self { cache }
    }

    /// Resolves a name or an existing code. Never fails: unknown names yield
    /// `None` and are remembered as such.
    pub fn resolve(&self, region: &str) -> Option<String> {
        let key = region.trim();
        if is_code(key) {
            return Some(key.to_string());
        }
        if let Some(cached) = self.cache.get(key) {
            return cached;
        }

        let code = countries::search(key).map(|c| c.alpha_2.to_string());
        match &code {
            Some(code) => debug!(region = key, code = %code, "Resolved region code"),
            None => warn!(region = key, "Could not resolve region code"),
        }
        self.cache.insert(key.to_string(), code.clone());
        code
    }

    /// Resolves every distinct region once. The returned map is ordered by
    /// name so downstream iteration is stable.
    pub fn build_mapping<'r, I>(&self, regions: I) -> BTreeMap<String, Option<String>>
    where
        I: IntoIterator<Item = &'r str>,
    {
        let mut mapping = BTreeMap::new();
        for region in regions {
            let key = region.trim();
            if !mapping.contains_key(key) {
                mapping.insert(key.to_string(), self.resolve(key));
            }
        }
        let resolved = mapping.values().filter(|c| c.is_some()).count();
        info!(
            distinct = mapping.len(),
            resolved,
            failed = mapping.len() - resolved,
            "Built region code mapping"
        );
        mapping
    }
}

fn is_code(value: &str) -> bool {
    value.len() == 2 && value.chars().all(|c| c.is_ascii_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_names_and_passes_codes_through() {
        let cache = RegionCodeCache::new();
        let resolver = RegionCodeResolver::new(&cache);
        assert_eq!(resolver.resolve("Portugal"), Some("PT".to_string()));
        assert_eq!(resolver.resolve("PT"), Some("PT".to_string()));
        assert_eq!(resolver.resolve("  Portugal "), Some("PT".to_string()));
        // Codes are not cached, names are keyed trimmed.
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn failures_are_cached() {
        let cache = RegionCodeCache::new();
        let resolver = RegionCodeResolver::new(&cache);
        assert_eq!(resolver.resolve("Atlantis"), None);
        assert_eq!(cache.get("Atlantis"), Some(None));
        assert_eq!(resolver.resolve("Atlantis"), None);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn cache_entries_are_never_overwritten() {
        let cache = RegionCodeCache::new();
        cache.insert("Portugal".to_string(), Some("PT".to_string()));
        cache.insert("Portugal".to_string(), None);
        assert_eq!(cache.get("Portugal"), Some(Some("PT".to_string())));
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn mapping_resolves_each_region_once() {
        let cache = RegionCodeCache::new();
        let resolver = RegionCodeResolver::new(&cache);
        let mapping = resolver.build_mapping(["Spain", "Atlantis", "Spain", "FR"]);
        assert_eq!(mapping.len(), 3);
        assert_eq!(mapping["Spain"], Some("ES".to_string()));
        assert_eq!(mapping["Atlantis"], None);
        assert_eq!(mapping["FR"], Some("FR".to_string()));
    }
}
