use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use parking_lot::RwLock;

use crate::config::SiteSpec;
use crate::wiki::WikiReference;

/// A shared value replaced wholesale; readers hold whichever version they loaded.
#[derive(Debug, Default)]
pub struct Snapshot<T> {
    current: RwLock<Arc<T>>,
}

impl<T> Snapshot<T> {
    pub fn new(value: T) -> Self {
        Self {
            current: RwLock::new(Arc::new(value)),
        }
    }

    pub fn load(&self) -> Arc<T> {
        Arc::clone(&self.current.read())
    }

    pub fn publish(&self, value: T) {
        *self.current.write() = Arc::new(value);
    }

    /// Derive the next version from the current one and swap it in.
    pub fn update(&self, next: impl FnOnce(&T) -> T) {
        let mut guard = self.current.write();
        let value = next(&guard);
        *guard = Arc::new(value);
    }
}

/// Latest known layout of every wiki seen so far, keyed by host and script path.
#[derive(Debug, Default)]
pub struct WikiCache {
    entries: Snapshot<HashMap<String, Arc<WikiReference>>>,
}

impl WikiCache {
    pub fn get(&self, key: &str) -> Option<Arc<WikiReference>> {
        self.entries.load().get(key).cloned()
    }

    /// Current reference for `wiki`, or `wiki` itself when nothing newer is cached.
    pub fn current(&self, wiki: &WikiReference) -> Arc<WikiReference> {
        self.get(&wiki.key())
            .unwrap_or_else(|| Arc::new(wiki.clone()))
    }

    pub fn publish(&self, wiki: WikiReference) -> Arc<WikiReference> {
        let wiki = Arc::new(wiki);
        let key = wiki.key();
        self.entries.update(|entries| {
            let mut next = entries.clone();
            next.insert(key, Arc::clone(&wiki));
            next
        });
        wiki
    }

    pub fn len(&self) -> usize {
        self.entries.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteEntry {
    pub name: String,
    pub wiki: WikiReference,
}

impl SiteEntry {
    pub fn from_spec(spec: &SiteSpec) -> Result<Self> {
        let mut wiki = WikiReference::from_base_url(&spec.url)?;
        if let Some(article_path) = spec.article_path.as_deref().filter(|path| path.contains("$1")) {
            wiki.article_path = article_path.to_string();
        }
        Ok(Self {
            name: spec.name.clone(),
            wiki,
        })
    }
}

/// Known standalone wikis outside any farm.
#[derive(Debug, Default)]
pub struct SiteDirectory {
    entries: Snapshot<Vec<SiteEntry>>,
}

impl SiteDirectory {
    pub fn from_specs(specs: &[SiteSpec]) -> Result<Self> {
        let entries = specs
            .iter()
            .map(SiteEntry::from_spec)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            entries: Snapshot::new(entries),
        })
    }

    /// Swap in a freshly fetched directory.
    pub fn refresh(&self, entries: Vec<SiteEntry>) {
        tracing::info!(count = entries.len(), "site directory refreshed");
        self.entries.publish(entries);
    }

    pub fn lookup(&self, host: &str) -> Option<WikiReference> {
        let host = host.to_ascii_lowercase();
        self.entries
            .load()
            .iter()
            .find(|entry| entry.wiki.host().eq_ignore_ascii_case(&host))
            .map(|entry| entry.wiki.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Barrier;
    use std::thread;

    #[test]
    fn snapshot_readers_keep_their_version() {
        let snapshot = Snapshot::new(vec![1, 2, 3]);
        let before = snapshot.load();
        snapshot.update(|values| values.iter().map(|value| value * 10).collect());
        assert_eq!(*before, vec![1, 2, 3]);
        assert_eq!(*snapshot.load(), vec![10, 20, 30]);
    }

    #[test]
    fn wiki_cache_publish_replaces_whole_reference() {
        let cache = WikiCache::default();
        assert!(cache.is_empty());
        let wiki = WikiReference::from_base_url("https://en.example.org/w/").expect("wiki");
        let stale = cache.current(&wiki);
        assert_eq!(stale.lang, "en");

        let mut refreshed = wiki.clone();
        refreshed.lang = "de".to_string();
        refreshed.main_page = Some("Hauptseite".to_string());
        cache.publish(refreshed);

        assert_eq!(stale.lang, "en");
        let current = cache.current(&wiki);
        assert_eq!(current.lang, "de");
        assert_eq!(current.main_page.as_deref(), Some("Hauptseite"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn concurrent_readers_never_observe_partial_references() {
        let cache = WikiCache::default();
        let wiki = WikiReference::from_base_url("https://en.example.org/w/").expect("wiki");
        cache.publish(wiki.clone());
        let barrier = Barrier::new(5);

        thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    barrier.wait();
                    for _ in 0..500 {
                        let seen = cache.current(&wiki);
                        match seen.lang.as_str() {
                            "en" => assert_eq!(seen.main_page, None),
                            "de" => assert_eq!(seen.main_page.as_deref(), Some("Hauptseite")),
                            other => panic!("unexpected language {other}"),
                        }
                    }
                });
            }
            barrier.wait();
            let mut refreshed = wiki.clone();
            refreshed.lang = "de".to_string();
            refreshed.main_page = Some("Hauptseite".to_string());
            cache.publish(refreshed);
        });

        assert_eq!(cache.current(&wiki).lang, "de");
    }

    #[test]
    fn site_directory_lookup_and_refresh() {
        let directory = SiteDirectory::from_specs(&[SiteSpec {
            name: "Standalone".to_string(),
            url: "https://standalone.example.com/".to_string(),
            article_path: Some("/$1".to_string()),
        }])
        .expect("directory");
        let wiki = directory.lookup("Standalone.example.com").expect("entry");
        assert_eq!(wiki.article_path, "/$1");

        directory.refresh(Vec::new());
        assert!(directory.lookup("standalone.example.com").is_none());
    }
}
