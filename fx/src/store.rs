//! Rate persistence.
//!
//! [`DocumentStore`] is the boundary to the document database; [`RateStore`]
//! layers the exchange-rate documents on top of it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use nosco_common::{Currency, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, instrument};

use crate::error::StoreError;
use crate::snapshot::RateSnapshot;

/// Collection holding application settings documents.
pub const SETTINGS_COLLECTION: &str = "settings";
/// Document holding the [`RateSnapshot`].
pub const EXCHANGE_RATES_DOC: &str = "exchangeRates";
/// Document holding [`AdminPreferences`].
pub const ADMIN_PREFERENCES_DOC: &str = "adminPreferences";

/// Write options for [`DocumentStore::set`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SetOptions {
    /// Overwrite only the top-level fields present in the new document.
    pub merge: bool,
}

impl SetOptions {
    pub fn merge() -> Self {
        Self { merge: true }
    }

    pub fn replace() -> Self {
        Self { merge: false }
    }
}

/// Key/value document database.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch a document, `None` if it does not exist.
    async fn get(&self, collection: &str, key: &str) -> Result<Option<Value>, StoreError>;

    /// Write a document.
    async fn set(
        &self,
        collection: &str,
        key: &str,
        document: Value,
        options: SetOptions,
    ) -> Result<(), StoreError>;
}

/// Apply `incoming` on top of `existing` with the given options.
fn apply_write(existing: Option<Value>, incoming: Value, options: SetOptions) -> Value {
    match (existing, incoming) {
        (Some(Value::Object(mut current)), Value::Object(fields)) if options.merge => {
            for (field, value) in fields {
                current.insert(field, value);
            }
            Value::Object(current)
        }
        (_, incoming) => incoming,
    }
}

/// In-process document store.
#[derive(Default)]
pub struct InMemoryDocumentStore {
    documents: DashMap<(String, String), Value>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent reads fail with [`StoreError::Unavailable`].
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent writes fail with [`StoreError::Unavailable`].
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of stored documents.
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn get(&self, collection: &str, key: &str) -> Result<Option<Value>, StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("reads disabled".to_string()));
        }
        let id = (collection.to_string(), key.to_string());
        Ok(self.documents.get(&id).map(|doc| doc.value().clone()))
    }

    async fn set(
        &self,
        collection: &str,
        key: &str,
        document: Value,
        options: SetOptions,
    ) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("writes disabled".to_string()));
        }
        let id = (collection.to_string(), key.to_string());
        let existing = self.documents.remove(&id).map(|(_, doc)| doc);
        self.documents.insert(id, apply_write(existing, document, options));
        Ok(())
    }
}

type Collections = HashMap<String, HashMap<String, Value>>;

/// Document store persisted as a single JSON file.
///
/// The whole file is read on every access and replaced atomically on every
/// write (temp file + rename). Writers within the process are serialized;
/// concurrent processes get last-write-wins.
pub struct FileDocumentStore {
    path: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
}

impl FileDocumentStore {
    /// Open a store at `path`. The file is created on first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_all(&self) -> Result<Collections, StoreError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Collections::new()),
            Err(e) => return Err(StoreError::Unavailable(format!("{}: {}", self.path.display(), e))),
        };

        serde_json::from_slice(&bytes).map_err(|e| StoreError::Corrupt {
            collection: "*".to_string(),
            key: self.path.display().to_string(),
            reason: e.to_string(),
        })
    }

    async fn write_all(&self, collections: &Collections) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(collections).map_err(|e| StoreError::Corrupt {
            collection: "*".to_string(),
            key: self.path.display().to_string(),
            reason: e.to_string(),
        })?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        }

        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|e| StoreError::Unavailable(format!("{}: {}", tmp.display(), e)))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| StoreError::Unavailable(format!("{}: {}", self.path.display(), e)))
    }
}

#[async_trait]
impl DocumentStore for FileDocumentStore {
    async fn get(&self, collection: &str, key: &str) -> Result<Option<Value>, StoreError> {
        let collections = self.read_all().await?;
        Ok(collections
            .get(collection)
            .and_then(|docs| docs.get(key))
            .cloned())
    }

    async fn set(
        &self,
        collection: &str,
        key: &str,
        document: Value,
        options: SetOptions,
    ) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;

        let mut collections = self.read_all().await?;
        let docs = collections.entry(collection.to_string()).or_default();
        let existing = docs.remove(key);
        docs.insert(key.to_string(), apply_write(existing, document, options));

        self.write_all(&collections).await?;
        debug!(path = %self.path.display(), collection, key, "Document written");
        Ok(())
    }
}

/// Administrator display preferences.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminPreferences {
    /// Currency amounts are shown in by default.
    #[serde(default)]
    pub default_currency: Currency,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<Timestamp>,
}

impl Default for AdminPreferences {
    fn default() -> Self {
        Self {
            default_currency: Currency::base(),
            updated_at: None,
        }
    }
}

/// Persistence for the exchange-rate snapshot and display preferences.
pub struct RateStore {
    documents: Arc<dyn DocumentStore>,
    base_currency: Currency,
}

impl RateStore {
    /// Create a store over `documents` pivoting on the default base currency.
    pub fn new(documents: Arc<dyn DocumentStore>) -> Self {
        Self::with_base(documents, Currency::base())
    }

    /// Create a store whose default snapshot pivots on `base_currency`.
    pub fn with_base(documents: Arc<dyn DocumentStore>, base_currency: Currency) -> Self {
        Self {
            documents,
            base_currency,
        }
    }

    /// Base currency new snapshots are created with.
    pub fn base_currency(&self) -> &Currency {
        &self.base_currency
    }

    /// Load the snapshot, creating and persisting the default one if absent.
    #[instrument(skip(self))]
    pub async fn load(&self) -> Result<RateSnapshot, StoreError> {
        let stored = self
            .documents
            .get(SETTINGS_COLLECTION, EXCHANGE_RATES_DOC)
            .await?;

        let Some(document) = stored else {
            let snapshot = RateSnapshot::with_base(self.base_currency.clone());
            self.documents
                .set(
                    SETTINGS_COLLECTION,
                    EXCHANGE_RATES_DOC,
                    encode(&snapshot, EXCHANGE_RATES_DOC)?,
                    SetOptions::replace(),
                )
                .await?;
            info!(base = %self.base_currency, "Created default exchange-rate settings");
            return Ok(snapshot);
        };

        let document = with_default_base(document, &self.base_currency);
        let mut snapshot: RateSnapshot =
            serde_json::from_value(document).map_err(|e| corrupt(EXCHANGE_RATES_DOC, e))?;
        snapshot.normalize();
        Ok(snapshot)
    }

    /// Persist the full snapshot.
    #[instrument(skip(self, snapshot), fields(currencies = snapshot.tracked_currencies.len()))]
    pub async fn save(&self, snapshot: &RateSnapshot) -> Result<(), StoreError> {
        self.documents
            .set(
                SETTINGS_COLLECTION,
                EXCHANGE_RATES_DOC,
                encode(snapshot, EXCHANGE_RATES_DOC)?,
                SetOptions::merge(),
            )
            .await
    }

    /// Load display preferences, defaulting when the document is absent.
    pub async fn load_preferences(&self) -> Result<AdminPreferences, StoreError> {
        match self
            .documents
            .get(SETTINGS_COLLECTION, ADMIN_PREFERENCES_DOC)
            .await?
        {
            Some(document) => {
                serde_json::from_value(document).map_err(|e| corrupt(ADMIN_PREFERENCES_DOC, e))
            }
            None => Ok(AdminPreferences::default()),
        }
    }

    /// Persist display preferences.
    pub async fn save_preferences(&self, preferences: &AdminPreferences) -> Result<(), StoreError> {
        self.documents
            .set(
                SETTINGS_COLLECTION,
                ADMIN_PREFERENCES_DOC,
                encode(preferences, ADMIN_PREFERENCES_DOC)?,
                SetOptions::merge(),
            )
            .await
    }
}

/// Documents written before the base became configurable carry no
/// `baseCurrency`; they pivot on this store's base.
fn with_default_base(mut document: Value, base: &Currency) -> Value {
    if let Value::Object(fields) = &mut document {
        fields
            .entry("baseCurrency")
            .or_insert_with(|| Value::String(base.code().to_string()));
    }
    document
}

fn encode<T: Serialize>(value: &T, key: &str) -> Result<Value, StoreError> {
    serde_json::to_value(value).map_err(|e| corrupt(key, e))
}

fn corrupt(key: &str, e: serde_json::Error) -> StoreError {
    StoreError::Corrupt {
        collection: SETTINGS_COLLECTION.to_string(),
        key: key.to_string(),
        reason: e.to_string(),
    }
}
