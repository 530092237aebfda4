use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::debug;

use crate::models::{Category, Document};

/// Consider cache stale after 1 hour.
const CACHE_STALE_MINUTES: i64 = 60;

const DOCUMENTS_CACHE: &str = "documents";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedData<T> {
    pub data: T,
    pub cached_at: DateTime<Utc>,
}

impl<T> CachedData<T> {
    pub fn new(data: T) -> Self {
        Self {
            data,
            cached_at: Utc::now(),
        }
    }

    pub fn age_minutes(&self) -> i64 {
        let now = Utc::now();
        (now - self.cached_at).num_minutes()
    }

    pub fn age_display(&self) -> String {
        let minutes = self.age_minutes();
        if minutes < 1 {
            // Also covers clock skew
            "just now".to_string()
        } else if minutes < 60 {
            format!("{}m ago", minutes)
        } else if minutes < 1440 {
            let hours = minutes / 60;
            let remaining_mins = minutes % 60;
            if remaining_mins >= 30 {
                // Round up: 1h 30m+ becomes 2h
                format!("{}h ago", hours + 1)
            } else {
                format!("{}h ago", hours)
            }
        } else {
            let days = minutes / 1440;
            let remaining_hours = (minutes % 1440) / 60;
            if remaining_hours >= 12 {
                format!("{}d ago", days + 1)
            } else {
                format!("{}d ago", days)
            }
        }
    }

    pub fn is_stale(&self) -> bool {
        self.age_minutes() > CACHE_STALE_MINUTES
    }
}

pub struct CacheManager {
    cache_dir: PathBuf,
}

impl CacheManager {
    pub fn new(cache_dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&cache_dir)?;
        Ok(Self { cache_dir })
    }

    fn cache_path(&self, name: &str) -> PathBuf {
        self.cache_dir.join(format!("{}.json", name))
    }

    fn load<T: DeserializeOwned>(&self, name: &str) -> Result<Option<CachedData<T>>> {
        let path = self.cache_path(name);
        if !path.exists() {
            return Ok(None);
        }

        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read cache file: {}", name))?;

        let cached: CachedData<T> = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse cache file: {}", name))?;

        Ok(Some(cached))
    }

    fn save<T: Serialize>(&self, name: &str, data: &T) -> Result<()> {
        let cached = CachedData::new(data);
        let path = self.cache_path(name);
        let contents = serde_json::to_string_pretty(&cached)?;
        std::fs::write(&path, contents)
            .with_context(|| format!("Failed to write cache file: {}", name))?;
        Ok(())
    }

    // ===== Documents =====

    pub fn load_documents(&self) -> Result<Option<CachedData<Vec<Document>>>> {
        self.load(DOCUMENTS_CACHE)
    }

    pub fn save_documents(&self, documents: &[Document]) -> Result<()> {
        debug!(count = documents.len(), "Caching documents");
        self.save(DOCUMENTS_CACHE, &documents)
    }

    /// Drop a deleted document from the cached list, keeping its timestamp
    pub fn remove_document(&self, id: i64) -> Result<()> {
        self.modify_documents(|docs| docs.retain(|d| d.id != id))
    }

    /// Mirror a category change into the cached list
    pub fn update_document_category(&self, id: i64, category: Category) -> Result<()> {
        self.modify_documents(|docs| {
            if let Some(doc) = docs.iter_mut().find(|d| d.id == id) {
                doc.category = category;
            }
        })
    }

    fn modify_documents(&self, f: impl FnOnce(&mut Vec<Document>)) -> Result<()> {
        let Some(mut cached) = self.load_documents()? else {
            return Ok(());
        };
        f(&mut cached.data);
        let contents = serde_json::to_string_pretty(&cached)?;
        std::fs::write(self.cache_path(DOCUMENTS_CACHE), contents)?;
        Ok(())
    }

    /// Remove all cached data, e.g. on logout
    pub fn clear(&self) -> Result<()> {
        let path = self.cache_path(DOCUMENTS_CACHE);
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample_docs() -> Vec<Document> {
        vec![
            Document {
                id: 1,
                file: "/media/w2.pdf".to_string(),
                category: Category::Tax,
                confidence_score: 0.91,
                uploaded_at: None,
            },
            Document {
                id: 2,
                file: "/media/passport.png".to_string(),
                category: Category::Other,
                confidence_score: 0.42,
                uploaded_at: None,
            },
        ]
    }

    #[test]
    fn test_cached_data_age_display_just_now() {
        let cached = CachedData::new(vec![1, 2, 3]);
        assert_eq!(cached.age_display(), "just now");
    }

    #[test]
    fn test_cached_data_age_display_rounding() {
        let mut cached = CachedData::new(());
        cached.cached_at = Utc::now() - Duration::minutes(95);
        assert_eq!(cached.age_display(), "2h ago");

        cached.cached_at = Utc::now() - Duration::minutes(15);
        assert_eq!(cached.age_display(), "15m ago");

        cached.cached_at = Utc::now() - Duration::hours(26);
        assert_eq!(cached.age_display(), "1d ago");
    }

    #[test]
    fn test_cached_data_is_stale() {
        let fresh = CachedData::new(vec![1]);
        assert!(!fresh.is_stale());

        let mut old = CachedData::new(vec![1]);
        old.cached_at = Utc::now() - Duration::minutes(61);
        assert!(old.is_stale());
    }

    #[test]
    fn test_documents_round_trip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheManager::new(dir.path().join("cache")).unwrap();
        assert!(cache.load_documents().unwrap().is_none());

        cache.save_documents(&sample_docs()).unwrap();
        let cached = cache.load_documents().unwrap().unwrap();
        assert_eq!(cached.data, sample_docs());
    }

    #[test]
    fn test_remove_and_recategorize() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheManager::new(dir.path().to_path_buf()).unwrap();
        cache.save_documents(&sample_docs()).unwrap();

        cache.update_document_category(2, Category::Identity).unwrap();
        cache.remove_document(1).unwrap();

        let docs = cache.load_documents().unwrap().unwrap().data;
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].id, 2);
        assert_eq!(docs[0].category, Category::Identity);

        cache.clear().unwrap();
        assert!(cache.load_documents().unwrap().is_none());
    }

    #[test]
    fn test_modify_without_cache_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheManager::new(dir.path().to_path_buf()).unwrap();
        cache.remove_document(1).unwrap();
        assert!(cache.load_documents().unwrap().is_none());
    }
}
