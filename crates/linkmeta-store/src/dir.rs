//! Directory-backed document store
//!
//! A `DirStore` scans one or more directories of metadata documents,
//! indexes them by the hardware addresses they claim, and keeps the
//! indexes coherent with filesystem mutations through a non-recursive
//! watcher on each added directory.
//!
//! Index shape: each file contributes one schema URI and a set of claimed
//! addresses. Per `(address, schema)` the store keeps the whole candidate
//! path list, not just a single winner: the most recently observed path is
//! active, and when it is removed the most recent survivor takes over
//! instead of stranding the binding.

use crate::cache::ArcCache;
use crate::codec;
use crate::document::Document;
use linkmeta_common::{Error, Result};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;
use tracing::{debug, error, warn};

/// What one file currently contributes to the indexes.
struct FileRecord {
    schema_uri: String,
    macs: Vec<String>,
}

#[derive(Default)]
struct Indexes {
    /// canonical address -> schema URIs with at least one candidate path,
    /// insertion-ordered and deduplicated
    schemas_by_mac: HashMap<String, Vec<String>>,
    /// path -> its last successfully parsed contribution
    records_by_path: HashMap<PathBuf, FileRecord>,
    /// canonical address -> schema URI -> candidate paths; the last entry
    /// is the active binding
    bindings: HashMap<String, HashMap<String, Vec<PathBuf>>>,
}

impl Indexes {
    fn bind(&mut self, mac: &str, schema_uri: &str, path: &Path) {
        let candidates = self
            .bindings
            .entry(mac.to_string())
            .or_default()
            .entry(schema_uri.to_string())
            .or_default();
        candidates.retain(|p| p != path);
        candidates.push(path.to_path_buf());

        let schemas = self.schemas_by_mac.entry(mac.to_string()).or_default();
        if !schemas.iter().any(|s| s == schema_uri) {
            schemas.push(schema_uri.to_string());
        }
    }

    /// Drop everything the previous observation of `path` contributed.
    fn remove_path(&mut self, path: &Path) {
        let Some(record) = self.records_by_path.remove(path) else {
            return;
        };
        for mac in &record.macs {
            let Some(by_schema) = self.bindings.get_mut(mac) else {
                continue;
            };
            if let Some(candidates) = by_schema.get_mut(&record.schema_uri) {
                candidates.retain(|p| p != path);
                if candidates.is_empty() {
                    by_schema.remove(&record.schema_uri);
                    if let Some(schemas) = self.schemas_by_mac.get_mut(mac) {
                        schemas.retain(|s| s != &record.schema_uri);
                        if schemas.is_empty() {
                            self.schemas_by_mac.remove(mac);
                        }
                    }
                }
            }
            if by_schema.is_empty() {
                self.bindings.remove(mac);
            }
        }
    }

    /// The active path for a `(address, schema)` binding.
    fn active_path(&self, mac: &str, schema_uri: &str) -> Option<&PathBuf> {
        self.bindings.get(mac)?.get(schema_uri)?.last()
    }
}

/// A store backed by one or more watched filesystem directories.
pub struct DirStore {
    indexes: RwLock<Indexes>,
    cache: ArcCache<PathBuf, Arc<Document>>,
    watcher: Mutex<Option<RecommendedWatcher>>,
    consumer: Mutex<Option<JoinHandle<()>>>,
}

impl DirStore {
    /// Create an empty store and start its filesystem-event consumer.
    pub fn new(cache_size: usize) -> Result<Arc<Self>> {
        let store = Arc::new(Self {
            indexes: RwLock::new(Indexes::default()),
            cache: ArcCache::new(cache_size),
            watcher: Mutex::new(None),
            consumer: Mutex::new(None),
        });

        let (tx, rx) = mpsc::channel::<notify::Result<notify::Event>>();
        let watcher = notify::recommended_watcher(move |event| {
            // receiver gone means the store is closing; nothing to do
            let _ = tx.send(event);
        })
        .map_err(|e| Error::Watch(e.to_string()))?;
        *store.watcher.lock() = Some(watcher);

        let weak = Arc::downgrade(&store);
        let consumer = std::thread::spawn(move || consume_events(&weak, &rx));
        *store.consumer.lock() = Some(consumer);

        Ok(store)
    }

    /// Recursively index every regular file under `path`, then watch the
    /// directory (non-recursively) for future mutations.
    pub fn add_directory(&self, path: &Path) -> Result<()> {
        std::fs::metadata(path)?;
        self.scan(path)?;

        let mut watcher = self.watcher.lock();
        let watcher = watcher.as_mut().ok_or(Error::Closed)?;
        watcher
            .watch(path, RecursiveMode::NonRecursive)
            .map_err(|e| Error::Watch(e.to_string()))?;
        Ok(())
    }

    fn scan(&self, dir: &Path) -> Result<()> {
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let file_type = entry.file_type()?;
            if file_type.is_dir() {
                self.scan(&entry.path())?;
            } else if file_type.is_file() {
                self.did_add_file(&entry.path());
            }
        }
        Ok(())
    }

    /// The schema URIs currently available for a canonical address.
    pub fn list_schemas(&self, mac: &str) -> Result<Vec<String>> {
        self.indexes
            .read()
            .schemas_by_mac
            .get(mac)
            .cloned()
            .ok_or(Error::NotFound)
    }

    /// Every document available for a canonical address, best-effort:
    /// paths are deduplicated and individual load failures are skipped.
    pub fn list_documents(&self, mac: &str) -> Result<Vec<Arc<Document>>> {
        let paths = {
            let indexes = self.indexes.read();
            let schemas = indexes.schemas_by_mac.get(mac).ok_or(Error::NotFound)?;
            let mut paths: Vec<PathBuf> = Vec::with_capacity(schemas.len());
            for schema_uri in schemas {
                if let Some(path) = indexes.active_path(mac, schema_uri) {
                    if !paths.contains(path) {
                        paths.push(path.clone());
                    }
                }
            }
            paths
        };

        let mut documents = Vec::with_capacity(paths.len());
        for path in paths {
            match self.load_document(&path) {
                Ok(doc) => documents.push(doc),
                Err(e) => debug!(path = %path.display(), error = %e, "skipping document"),
            }
        }
        Ok(documents)
    }

    /// The document bound to `(address, schema)`, through the cache.
    pub fn get_document(&self, mac: &str, schema_uri: &str) -> Result<Arc<Document>> {
        let path = self
            .indexes
            .read()
            .active_path(mac, schema_uri)
            .cloned()
            .ok_or(Error::NotFound)?;
        self.load_document(&path)
    }

    fn load_document(&self, path: &Path) -> Result<Arc<Document>> {
        if let Some(doc) = self.cache.get(&path.to_path_buf()) {
            return Ok(doc);
        }
        let doc = Arc::new(codec::read_document(path)?);
        // only currently-indexed paths may enter the cache
        let indexes = self.indexes.read();
        if indexes.records_by_path.contains_key(path) {
            self.cache.insert(path.to_path_buf(), doc.clone());
        }
        Ok(doc)
    }

    /// Stop the watcher and the event consumer. Idempotent.
    pub fn close(&self) {
        // dropping the watcher drops the event sender, which ends the
        // consumer's receive loop
        drop(self.watcher.lock().take());
        if let Some(consumer) = self.consumer.lock().take() {
            let _ = consumer.join();
        }
    }

    pub(crate) fn did_add_file(&self, path: &Path) {
        let doc = match codec::read_document(path) {
            Ok(doc) => doc,
            Err(e) => {
                error!(path = %path.display(), error = %e, "ignoring document");
                return;
            }
        };
        self.apply_observation(path, &doc);
        debug!(path = %path.display(), "indexed document");
    }

    pub(crate) fn did_change_file(&self, path: &Path) {
        // the prior parse is stale whether or not the new one succeeds
        self.cache.invalidate(&path.to_path_buf());
        let doc = match codec::read_document(path) {
            Ok(doc) => doc,
            Err(e) => {
                error!(path = %path.display(), error = %e, "ignoring changed document");
                return;
            }
        };
        self.apply_observation(path, &doc);
        debug!(path = %path.display(), "reindexed document");
    }

    pub(crate) fn did_remove_file(&self, path: &Path) {
        self.indexes.write().remove_path(path);
        self.cache.invalidate(&path.to_path_buf());
        debug!(path = %path.display(), "unindexed document");
    }

    fn apply_observation(&self, path: &Path, doc: &Document) {
        let macs: Vec<String> = doc
            .data_link_addrs()
            .iter()
            .map(|mac| mac.canonical())
            .collect();
        let schema_uri = doc.schema_uri().to_string();

        let mut indexes = self.indexes.write();
        indexes.remove_path(path);
        for mac in &macs {
            indexes.bind(mac, &schema_uri, path);
        }
        indexes
            .records_by_path
            .insert(path.to_path_buf(), FileRecord { schema_uri, macs });
        drop(indexes);

        self.cache.invalidate(&path.to_path_buf());
    }
}

impl Drop for DirStore {
    fn drop(&mut self) {
        drop(self.watcher.lock().take());
        // the consumer holds only a weak reference and exits on channel
        // disconnect; nothing to join from here
    }
}

fn consume_events(store: &Weak<DirStore>, rx: &mpsc::Receiver<notify::Result<notify::Event>>) {
    use notify::event::{EventKind, ModifyKind, RenameMode};

    for result in rx {
        let Some(store) = store.upgrade() else {
            return;
        };
        let event = match result {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "filesystem watch error");
                continue;
            }
        };
        match event.kind {
            EventKind::Create(_) => {
                for path in &event.paths {
                    store.did_add_file(path);
                }
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
                for path in &event.paths {
                    store.did_remove_file(path);
                }
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
                for path in &event.paths {
                    store.did_add_file(path);
                }
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
                if let [from, to] = event.paths.as_slice() {
                    store.did_remove_file(from);
                    store.did_add_file(to);
                }
            }
            EventKind::Modify(_) => {
                for path in &event.paths {
                    store.did_change_file(path);
                }
            }
            EventKind::Remove(_) => {
                for path in &event.paths {
                    store.did_remove_file(path);
                }
            }
            _ => {}
        }
    }
}
