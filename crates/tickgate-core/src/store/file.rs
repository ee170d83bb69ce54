use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde_json::Value;

use super::{Collection, DurableStore, StoreBackend};
use crate::sync::lock_or_recover;
use crate::StoreError;

type Documents = BTreeMap<String, Value>;

/// One JSON object file per collection under a data directory.
///
/// Files are rewritten through a temporary sibling and renamed into place so
/// a crash never leaves a half-written collection behind.
#[derive(Debug)]
pub struct FileStore {
    root: PathBuf,
    locks: [Mutex<()>; 3],
}

impl FileStore {
    pub fn open(root: impl AsRef<Path>) -> Result<Self, StoreError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            locks: [Mutex::new(()), Mutex::new(()), Mutex::new(())],
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, collection: Collection) -> PathBuf {
        self.root.join(format!("{}.json", collection.as_str()))
    }

    fn lock_for(&self, collection: Collection) -> &Mutex<()> {
        match collection {
            Collection::ApiConfig => &self.locks[0],
            Collection::RateLimits => &self.locks[1],
            Collection::CacheData => &self.locks[2],
        }
    }

    fn load(&self, collection: Collection) -> Result<Documents, StoreError> {
        let contents = match fs::read_to_string(self.path_for(collection)) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Documents::new()),
            Err(err) => return Err(err.into()),
        };

        if contents.trim().is_empty() {
            return Ok(Documents::new());
        }
        Ok(serde_json::from_str(&contents)?)
    }

    fn save(&self, collection: Collection, documents: &Documents) -> Result<(), StoreError> {
        let path = self.path_for(collection);
        let staging = path.with_extension("json.tmp");
        fs::write(&staging, serde_json::to_vec_pretty(documents)?)?;
        fs::rename(&staging, &path)?;
        Ok(())
    }

    fn modify<R>(
        &self,
        collection: Collection,
        change: impl FnOnce(&mut Documents) -> R,
    ) -> Result<R, StoreError> {
        let _guard = lock_or_recover(self.lock_for(collection), collection.as_str());
        let mut documents = self.load(collection)?;
        let result = change(&mut documents);
        self.save(collection, &documents)?;
        Ok(result)
    }
}

impl DurableStore for FileStore {
    fn backend(&self) -> StoreBackend {
        StoreBackend::File
    }

    fn read(&self, collection: Collection, key: &str) -> Result<Option<Value>, StoreError> {
        let _guard = lock_or_recover(self.lock_for(collection), collection.as_str());
        Ok(self.load(collection)?.remove(key))
    }

    fn upsert(&self, collection: Collection, key: &str, document: &Value) -> Result<(), StoreError> {
        self.modify(collection, |documents| {
            documents.insert(key.to_owned(), document.clone());
        })
    }

    fn remove(&self, collection: Collection, key: &str) -> Result<bool, StoreError> {
        self.modify(collection, |documents| documents.remove(key).is_some())
    }

    fn scan(&self, collection: Collection) -> Result<Vec<(String, Value)>, StoreError> {
        let _guard = lock_or_recover(self.lock_for(collection), collection.as_str());
        Ok(self.load(collection)?.into_iter().collect())
    }

    fn clear(&self, collection: Collection) -> Result<(), StoreError> {
        self.modify(collection, Documents::clear)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn documents_survive_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileStore::open(dir.path()).expect("open store");
        store
            .upsert(Collection::RateLimits, "finnhub", &json!({"requests": 3}))
            .expect("upsert");

        let reopened = FileStore::open(dir.path()).expect("reopen store");
        let document = reopened
            .read(Collection::RateLimits, "finnhub")
            .expect("read")
            .expect("document present");
        assert_eq!(document["requests"], 3);
        assert!(dir.path().join("rate_limits.json").exists());
    }

    #[test]
    fn collections_are_independent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileStore::open(dir.path()).expect("open store");
        store
            .upsert(Collection::ApiConfig, "polygon", &json!({"priority": 6}))
            .expect("upsert config");
        store
            .upsert(Collection::CacheData, "quote_AAPL", &json!({"price": 1}))
            .expect("upsert cache");

        store.clear(Collection::CacheData).expect("clear cache");

        assert!(store.scan(Collection::CacheData).expect("scan").is_empty());
        assert_eq!(store.scan(Collection::ApiConfig).expect("scan").len(), 1);
    }

    #[test]
    fn remove_reports_whether_a_document_existed() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileStore::open(dir.path()).expect("open store");
        store
            .upsert(Collection::CacheData, "quote_MSFT", &json!({}))
            .expect("upsert");

        assert!(store.remove(Collection::CacheData, "quote_MSFT").expect("remove"));
        assert!(!store.remove(Collection::CacheData, "quote_MSFT").expect("remove"));
    }

    #[test]
    fn corrupt_collection_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileStore::open(dir.path()).expect("open store");
        fs::write(dir.path().join("api_config.json"), b"{not json").expect("write");

        let err = store.scan(Collection::ApiConfig).expect_err("must fail");
        assert!(matches!(err, StoreError::Serialization(_)));
    }
}
