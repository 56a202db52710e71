//! Schema caches, storage backends and fetchers.
//!
//! A [`SchemaCache`] maps schema ids to parsed documents. The in-memory
//! cache is enough for a single process; [`PersistentSchemaCache`] writes
//! through to a [`SchemaStorage`] backend and hydrates itself from it on
//! construction. [`SchemaRegistry`] combines a cache with a
//! [`SchemaFetcher`] so that misses are fetched once and remembered.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{CacheError, LoadError};
use crate::navigator::RefResolver;
use crate::pointer::pointer_get_ref;

/// The id a schema declares for itself, `id` first then `$id`.
pub fn schema_id(schema: &Value) -> Option<&str> {
    schema
        .get("id")
        .and_then(Value::as_str)
        .or_else(|| schema.get("$id").and_then(Value::as_str))
        .filter(|id| !id.is_empty())
}

/// Split `id#/fragment` into its document id and fragment pointer.
fn split_reference(reference: &str) -> (&str, &str) {
    match reference.split_once('#') {
        Some((base, fragment)) => (base, fragment),
        None => (reference, ""),
    }
}

/// A keyed store of parsed schemas.
pub trait SchemaCache: Send + Sync {
    fn get_schema(&self, id: &str) -> Option<Arc<Value>>;

    /// Store `schema` under an explicit id, replacing any previous entry.
    fn set_schema_as(&self, id: &str, schema: Arc<Value>) -> Result<(), CacheError>;

    /// Remove a schema. Returns true if it was present.
    fn remove_schema(&self, id: &str) -> Result<bool, CacheError>;

    /// The first schema, in id order, that satisfies `predicate`.
    fn get_schema_by(&self, predicate: &dyn Fn(&Value) -> bool) -> Option<Arc<Value>>;

    /// Visit every cached schema in id order.
    fn each(&self, visit: &mut dyn FnMut(&str, &Value));

    /// Store `schema` under its own `id`/`$id`. Returns that id.
    ///
    /// # Errors
    ///
    /// `CacheError::MissingId` if the schema declares no id.
    fn set_schema(&self, schema: Arc<Value>) -> Result<String, CacheError> {
        let id = schema_id(&schema).ok_or(CacheError::MissingId)?.to_string();
        self.set_schema_as(&id, schema)?;
        Ok(id)
    }
}

/// Resolve `id` or `id#/fragment` against a cache.
fn resolve_in(cache: &dyn SchemaCache, reference: &str) -> Option<Value> {
    let (base, fragment) = split_reference(reference);
    let schema = cache.get_schema(base)?;
    if fragment.is_empty() {
        return Some(schema.as_ref().clone());
    }
    pointer_get_ref(&schema, fragment).ok().cloned()
}

/// Process-local cache. Last write wins.
#[derive(Debug, Default)]
pub struct MemorySchemaCache {
    schemas: RwLock<BTreeMap<String, Arc<Value>>>,
}

impl MemorySchemaCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.schemas
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SchemaCache for MemorySchemaCache {
    fn get_schema(&self, id: &str) -> Option<Arc<Value>> {
        self.schemas
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    fn set_schema_as(&self, id: &str, schema: Arc<Value>) -> Result<(), CacheError> {
        self.schemas
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.to_string(), schema);
        Ok(())
    }

    fn remove_schema(&self, id: &str) -> Result<bool, CacheError> {
        Ok(self
            .schemas
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
            .is_some())
    }

    fn get_schema_by(&self, predicate: &dyn Fn(&Value) -> bool) -> Option<Arc<Value>> {
        self.schemas
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .find(|schema| predicate(schema))
            .cloned()
    }

    fn each(&self, visit: &mut dyn FnMut(&str, &Value)) {
        // Snapshot so `visit` may touch the cache without deadlocking.
        let snapshot: Vec<(String, Arc<Value>)> = self
            .schemas
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(id, schema)| (id.clone(), Arc::clone(schema)))
            .collect();
        for (id, schema) in &snapshot {
            visit(id, schema);
        }
    }
}

impl RefResolver for MemorySchemaCache {
    fn resolve_ref(&self, reference: &str) -> Option<Value> {
        resolve_in(self, reference)
    }
}

/// Key/value text storage behind a [`PersistentSchemaCache`].
pub trait SchemaStorage: Send + Sync {
    fn read(&self, key: &str) -> Result<Option<String>, CacheError>;
    fn write(&self, key: &str, value: &str) -> Result<(), CacheError>;
    fn delete(&self, key: &str) -> Result<(), CacheError>;
    fn keys(&self) -> Result<Vec<String>, CacheError>;
}

/// Storage held in memory. Useful in tests and as a stand-in backend.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: RwLock<BTreeMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SchemaStorage for MemoryStorage {
    fn read(&self, key: &str) -> Result<Option<String>, CacheError> {
        Ok(self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned())
    }

    fn write(&self, key: &str, value: &str) -> Result<(), CacheError> {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, CacheError> {
        Ok(self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect())
    }
}

/// One `<escaped key>.json` file per entry in a directory.
///
/// Bytes outside `[A-Za-z0-9._-]` are written as `%XX` so arbitrary ids
/// (URLs included) map to flat file names.
#[derive(Debug, Clone)]
pub struct DirectoryStorage {
    dir: PathBuf,
}

const STORAGE_EXTENSION: &str = ".json";

impl DirectoryStorage {
    /// Use `dir`, creating it if needed.
    ///
    /// # Errors
    ///
    /// `CacheError::Storage` if the directory cannot be created.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|source| CacheError::Storage {
            key: dir.display().to_string(),
            source,
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir
            .join(format!("{}{STORAGE_EXTENSION}", encode_key(key)))
    }
}

fn encode_key(key: &str) -> String {
    urlencoding::encode(key).into_owned()
}

fn decode_key(name: &str) -> Option<String> {
    urlencoding::decode(name).ok().map(|key| key.into_owned())
}

impl SchemaStorage for DirectoryStorage {
    fn read(&self, key: &str) -> Result<Option<String>, CacheError> {
        match std::fs::read_to_string(self.path_for(key)) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(CacheError::Storage {
                key: key.to_string(),
                source,
            }),
        }
    }

    fn write(&self, key: &str, value: &str) -> Result<(), CacheError> {
        std::fs::write(self.path_for(key), value).map_err(|source| CacheError::Storage {
            key: key.to_string(),
            source,
        })
    }

    fn delete(&self, key: &str) -> Result<(), CacheError> {
        match std::fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(CacheError::Storage {
                key: key.to_string(),
                source,
            }),
        }
    }

    fn keys(&self) -> Result<Vec<String>, CacheError> {
        let storage_err = |source| CacheError::Storage {
            key: self.dir.display().to_string(),
            source,
        };
        let mut keys = Vec::new();
        for entry in std::fs::read_dir(&self.dir).map_err(storage_err)? {
            let entry = entry.map_err(storage_err)?;
            let name = entry.file_name();
            let Some(stem) = name
                .to_str()
                .and_then(|n| n.strip_suffix(STORAGE_EXTENSION))
            else {
                continue;
            };
            match decode_key(stem) {
                Some(key) => keys.push(key),
                None => warn!(file = %entry.path().display(), "skipping undecodable cache file"),
            }
        }
        keys.sort();
        Ok(keys)
    }
}

/// Key prefix used by [`PersistentSchemaCache::new`].
pub const DEFAULT_KEY_PREFIX: &str = "schema:";

/// A memory cache that writes through to a storage backend.
#[derive(Debug)]
pub struct PersistentSchemaCache<S> {
    storage: S,
    prefix: String,
    memory: MemorySchemaCache,
}

impl<S: SchemaStorage> PersistentSchemaCache<S> {
    /// Hydrate from `storage` using [`DEFAULT_KEY_PREFIX`].
    ///
    /// # Errors
    ///
    /// Storage failures while listing or reading entries.
    pub fn new(storage: S) -> Result<Self, CacheError> {
        Self::with_prefix(storage, DEFAULT_KEY_PREFIX)
    }

    /// Hydrate from `storage`, owning only keys that start with `prefix`.
    ///
    /// Entries that aren't valid JSON are skipped with a warning.
    ///
    /// # Errors
    ///
    /// Storage failures while listing or reading entries.
    pub fn with_prefix(storage: S, prefix: impl Into<String>) -> Result<Self, CacheError> {
        let prefix = prefix.into();
        let memory = MemorySchemaCache::new();
        for key in storage.keys()? {
            let Some(id) = key.strip_prefix(prefix.as_str()) else {
                continue;
            };
            let Some(text) = storage.read(&key)? else {
                continue;
            };
            match serde_json::from_str::<Value>(&text) {
                Ok(schema) => memory.set_schema_as(id, Arc::new(schema))?,
                Err(source) => {
                    let err = CacheError::Corrupt { key, source };
                    warn!(error = %err, "skipping stored schema");
                }
            }
        }
        debug!(count = memory.len(), prefix = %prefix, "hydrated schema cache");
        Ok(Self {
            storage,
            prefix,
            memory,
        })
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    fn key(&self, id: &str) -> String {
        format!("{}{id}", self.prefix)
    }
}

impl<S: SchemaStorage> SchemaCache for PersistentSchemaCache<S> {
    fn get_schema(&self, id: &str) -> Option<Arc<Value>> {
        self.memory.get_schema(id)
    }

    fn set_schema_as(&self, id: &str, schema: Arc<Value>) -> Result<(), CacheError> {
        let key = self.key(id);
        let text = serde_json::to_string(schema.as_ref())
            .map_err(|source| CacheError::Corrupt {
                key: key.clone(),
                source,
            })?;
        self.storage.write(&key, &text)?;
        self.memory.set_schema_as(id, schema)
    }

    fn remove_schema(&self, id: &str) -> Result<bool, CacheError> {
        self.storage.delete(&self.key(id))?;
        self.memory.remove_schema(id)
    }

    fn get_schema_by(&self, predicate: &dyn Fn(&Value) -> bool) -> Option<Arc<Value>> {
        self.memory.get_schema_by(predicate)
    }

    fn each(&self, visit: &mut dyn FnMut(&str, &Value)) {
        self.memory.each(visit);
    }
}

impl<S: SchemaStorage> RefResolver for PersistentSchemaCache<S> {
    fn resolve_ref(&self, reference: &str) -> Option<Value> {
        resolve_in(self, reference)
    }
}

/// Fetches schemas the cache doesn't hold.
#[async_trait]
pub trait SchemaFetcher: Send + Sync {
    async fn fetch_schema(&self, id: &str) -> Result<Value, LoadError>;
}

/// Reads `<root>/<id>` from disk. Ids are treated as relative paths.
#[derive(Debug, Clone)]
pub struct FileSchemaFetcher {
    root: PathBuf,
}

impl FileSchemaFetcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl SchemaFetcher for FileSchemaFetcher {
    async fn fetch_schema(&self, id: &str) -> Result<Value, LoadError> {
        let path = self.root.join(id.trim_start_matches('/'));
        debug!(id, path = %path.display(), "fetching schema from file");
        match crate::loader::load_document(&path) {
            Err(LoadError::FileNotFound { .. }) => Err(LoadError::SchemaNotFound {
                id: id.to_string(),
            }),
            other => other,
        }
    }
}

/// Fetches schemas over HTTP. Relative ids are joined onto a base URL.
#[cfg(feature = "remote")]
#[derive(Debug, Clone)]
pub struct HttpSchemaFetcher {
    client: reqwest::Client,
    base_url: Option<String>,
}

#[cfg(feature = "remote")]
impl HttpSchemaFetcher {
    /// # Errors
    ///
    /// `LoadError::NetworkError` if the HTTP client cannot be built.
    pub fn new() -> Result<Self, LoadError> {
        Ok(Self {
            client: crate::loader::http_client()?,
            base_url: None,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    fn url_for(&self, id: &str) -> String {
        match &self.base_url {
            Some(base) if !crate::loader::is_url(id) => {
                format!(
                    "{}/{}",
                    base.trim_end_matches('/'),
                    id.trim_start_matches('/')
                )
            }
            _ => id.to_string(),
        }
    }
}

#[cfg(feature = "remote")]
#[async_trait]
impl SchemaFetcher for HttpSchemaFetcher {
    async fn fetch_schema(&self, id: &str) -> Result<Value, LoadError> {
        let url = self.url_for(id);
        debug!(id, url = %url, "fetching schema over http");
        crate::loader::fetch_json(&self.client, &url).await
    }
}

/// Cache-first schema lookup backed by a fetcher.
pub struct SchemaRegistry {
    cache: Arc<dyn SchemaCache>,
    fetcher: Arc<dyn SchemaFetcher>,
}

impl std::fmt::Debug for SchemaRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaRegistry").finish_non_exhaustive()
    }
}

impl SchemaRegistry {
    pub fn new(cache: Arc<dyn SchemaCache>, fetcher: Arc<dyn SchemaFetcher>) -> Self {
        Self { cache, fetcher }
    }

    pub fn cache(&self) -> &Arc<dyn SchemaCache> {
        &self.cache
    }

    /// Get the schema document for `id`, fetching and caching it on a miss.
    ///
    /// Any `#fragment` on `id` is ignored; the whole document is returned.
    /// A fetched schema is cached under the requested id.
    ///
    /// # Errors
    ///
    /// Whatever the fetcher returns.
    pub async fn schema(&self, id: &str) -> Result<Arc<Value>, LoadError> {
        let (base, _) = split_reference(id);
        if let Some(schema) = self.cache.get_schema(base) {
            debug!(id = base, "schema cache hit");
            return Ok(schema);
        }
        debug!(id = base, "schema cache miss");
        let schema = Arc::new(self.fetcher.fetch_schema(base).await?);
        if let Err(e) = self.cache.set_schema_as(base, Arc::clone(&schema)) {
            warn!(id = base, error = %e, "failed to cache fetched schema");
        }
        Ok(schema)
    }

    /// Load `id` and every document it reaches through external `$ref`s.
    ///
    /// Afterwards the cache can resolve all of those references
    /// synchronously. References are fetched breadth-first, each once.
    ///
    /// # Errors
    ///
    /// The first fetch failure.
    pub async fn load_with_refs(&self, id: &str) -> Result<Arc<Value>, LoadError> {
        let root = self.schema(id).await?;
        let mut seen = BTreeSet::from([split_reference(id).0.to_string()]);
        let mut queue = VecDeque::new();
        collect_external_refs(&root, &mut seen, &mut queue);
        while let Some(next) = queue.pop_front() {
            let schema = self.schema(&next).await?;
            collect_external_refs(&schema, &mut seen, &mut queue);
        }
        Ok(root)
    }
}

impl RefResolver for SchemaRegistry {
    fn resolve_ref(&self, reference: &str) -> Option<Value> {
        resolve_in(self.cache.as_ref(), reference)
    }
}

fn collect_external_refs(schema: &Value, seen: &mut BTreeSet<String>, queue: &mut VecDeque<String>) {
    match schema {
        Value::Object(map) => {
            if let Some(reference) = map.get("$ref").and_then(Value::as_str) {
                let (base, _) = split_reference(reference);
                if !base.is_empty() && seen.insert(base.to_string()) {
                    queue.push_back(base.to_string());
                }
            }
            for child in map.values() {
                collect_external_refs(child, seen, queue);
            }
        }
        Value::Array(items) => {
            for child in items {
                collect_external_refs(child, seen, queue);
            }
        }
        _ => {}
    }
}
