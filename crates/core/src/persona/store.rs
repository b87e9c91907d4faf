use crate::domain::persona::PersonaDefinition;
use anyhow::Context;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Read-only source of persona definitions.
#[async_trait::async_trait]
pub trait PersonaStore: Send + Sync {
    async fn load(&self, id: &str) -> anyhow::Result<Option<PersonaDefinition>>;

    async fn list_available_ids(&self) -> anyhow::Result<Vec<String>>;
}

/// Definitions stored as `<dir>/<id>.json`.
#[derive(Debug, Clone)]
pub struct FsPersonaStore {
    dir: PathBuf,
}

impl FsPersonaStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

#[async_trait::async_trait]
impl PersonaStore for FsPersonaStore {
    async fn load(&self, id: &str) -> anyhow::Result<Option<PersonaDefinition>> {
        if !is_valid_id(id) {
            return Ok(None);
        }
        let path = self.dir.join(format!("{id}.json"));
        let bytes = match tokio::fs::read(&path).await {
            Ok(b) => b,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(err).with_context(|| format!("failed to read {}", path.display()))
            }
        };
        let def = serde_json::from_slice::<PersonaDefinition>(&bytes)
            .with_context(|| format!("invalid persona definition in {}", path.display()))?;
        Ok(Some(def))
    }

    async fn list_available_ids(&self) -> anyhow::Result<Vec<String>> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(e) => e,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(dir = %self.dir.display(), "personas directory does not exist");
                return Ok(Vec::new());
            }
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to list {}", self.dir.display()))
            }
        };

        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if is_valid_id(stem) {
                    ids.push(stem.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }
}

/// Lazy-load-on-miss cache in front of a store. Entries live for the cache's lifetime.
pub struct PersonaCache {
    store: Arc<dyn PersonaStore>,
    loaded: RwLock<HashMap<String, Arc<PersonaDefinition>>>,
}

impl PersonaCache {
    pub fn new(store: Arc<dyn PersonaStore>) -> Self {
        Self {
            store,
            loaded: RwLock::new(HashMap::new()),
        }
    }

    pub async fn get(&self, id: &str) -> anyhow::Result<Option<Arc<PersonaDefinition>>> {
        if let Some(def) = self.loaded.read().await.get(id) {
            return Ok(Some(def.clone()));
        }

        let Some(def) = self.store.load(id).await? else {
            return Ok(None);
        };
        let def = Arc::new(def);
        let mut loaded = self.loaded.write().await;
        // Another task may have won the race; keep the first copy.
        let entry = loaded.entry(id.to_string()).or_insert(def);
        Ok(Some(entry.clone()))
    }

    pub async fn list_ids(&self) -> anyhow::Result<Vec<String>> {
        self.store.list_available_ids().await
    }

    /// Every loadable definition, in id order. Unreadable files are skipped with a warning.
    pub async fn all(&self) -> anyhow::Result<Vec<Arc<PersonaDefinition>>> {
        let mut out = Vec::new();
        for id in self.list_ids().await? {
            match self.get(&id).await {
                Ok(Some(def)) => out.push(def),
                Ok(None) => {}
                Err(err) => tracing::warn!(persona_id = %id, error = %err, "skipping persona"),
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{persona, InMemoryPersonaStore};

    #[tokio::test]
    async fn cache_loads_once() {
        let store = Arc::new(InMemoryPersonaStore::new(vec![persona("buffett", "Warren Buffett")]));
        let cache = PersonaCache::new(store.clone());

        let first = cache.get("buffett").await.unwrap().unwrap();
        let second = cache.get("buffett").await.unwrap().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(store.load_count(), 1);

        assert!(cache.get("soros").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn fs_store_reads_json_files() {
        let dir = std::env::temp_dir().join(format!("personas-{}", uuid::Uuid::new_v4()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        tokio::fs::write(
            dir.join("munger.json"),
            r#"{"investor_id": "munger", "name": "Charlie Munger", "philosophy": "Invert.",
                "phantom_memories": [{"context": "c", "decision": "d", "reasoning": "r",
                "outcome": "o", "lesson": "l"}]}"#,
        )
        .await
        .unwrap();
        tokio::fs::write(dir.join("notes.txt"), "ignore me").await.unwrap();

        let store = FsPersonaStore::new(&dir);
        assert_eq!(store.list_available_ids().await.unwrap(), vec!["munger"]);

        let def = store.load("munger").await.unwrap().unwrap();
        assert_eq!(def.id, "munger");
        assert_eq!(def.memories.len(), 1);
        assert!(def.blind_spots.is_empty());

        assert!(store.load("../munger").await.unwrap().is_none());
        assert!(store.load("lynch").await.unwrap().is_none());

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }

    #[tokio::test]
    async fn missing_directory_lists_nothing() {
        let store = FsPersonaStore::new("/nonexistent/personas/dir");
        assert!(store.list_available_ids().await.unwrap().is_empty());
    }
}
