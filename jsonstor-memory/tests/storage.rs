use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};

use jsonstor_core::{
    backend::{DynPersistenceAdapter, PersistenceAdapter},
    config::StorageSettings,
    document::Document,
    error::{DocumentStoreError, DocumentStoreResult},
    query::{Filter, FindOptions, SortDirection},
    result::{DeleteResult, UpdateResult},
    update::Update,
};
use jsonstor_memory::{DynStorage, MemoryAdapter, Storage};

/// Counts flushes and can be told to fail them.
#[derive(Debug, Clone, Default)]
struct RecordingAdapter {
    flushes: Arc<AtomicUsize>,
    fail_flush: Arc<AtomicBool>,
    dropped: Arc<AtomicBool>,
    shut_down: Arc<AtomicBool>,
    initial: Vec<Value>,
}

impl RecordingAdapter {
    fn with_initial(initial: Vec<Value>) -> Self {
        Self { initial, ..Self::default() }
    }

    fn flushes(&self) -> usize {
        self.flushes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PersistenceAdapter for RecordingAdapter {
    fn name(&self) -> &str {
        "recording"
    }

    async fn load_initial(&self) -> DocumentStoreResult<Vec<Value>> {
        Ok(self.initial.clone())
    }

    async fn flush(&self, _documents: &[Document]) -> DocumentStoreResult<()> {
        if self.fail_flush.load(Ordering::SeqCst) {
            return Err(DocumentStoreError::Io("disk full".to_string()));
        }
        self.flushes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn drop_storage(&self) -> DocumentStoreResult<()> {
        self.dropped.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn shutdown(self) -> DocumentStoreResult<()> {
        self.shut_down.store(true, Ordering::SeqCst);
        Ok(())
    }
}

async fn people() -> Storage<MemoryAdapter> {
    let storage = Storage::open(MemoryAdapter::new(), StorageSettings::default())
        .await
        .unwrap();
    storage
        .insert_many(vec![
            json!({"_id": "a", "name": "Alice", "age": 30, "tags": ["admin"]}),
            json!({"_id": "b", "name": "Bob", "age": 25, "tags": []}),
            json!({"_id": "c", "name": "Carol", "age": 35, "address": {"city": "Denver"}}),
        ])
        .await
        .unwrap();
    storage
}

#[tokio::test]
async fn test_insert_and_find() {
    let storage = people().await;

    assert_eq!(storage.count(json!({})).await.unwrap(), 3);
    assert_eq!(storage.count(json!({"age": {"$gte": 30}})).await.unwrap(), 2);

    let carol = storage
        .find_one(json!({"address.city": "Denver"}), json!({"name": 1, "_id": 0}))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(Value::Object(carol), json!({"name": "Carol"}));

    let admins = storage.find_many(json!({"tags": "admin"}), None).await.unwrap();
    assert_eq!(admins.len(), 1);
    assert_eq!(admins[0]["_id"], json!("a"));
}

#[tokio::test]
async fn test_find_with_sort_skip_limit() {
    let storage = people().await;
    let options = FindOptions::builder().sort("age", SortDirection::Asc).skip(1).build();

    let names: Vec<_> = storage
        .find_many_with(json!({}), json!({"name": 1}), &options)
        .await
        .unwrap()
        .into_iter()
        .map(|d| d["name"].clone())
        .collect();

    assert_eq!(names, vec![json!("Alice"), json!("Carol")]);
}

#[tokio::test]
async fn test_insert_generates_unique_ids() {
    let storage = Storage::open(MemoryAdapter::new(), StorageSettings::default())
        .await
        .unwrap();

    let first = storage.insert_one(json!({"n": 1})).await.unwrap();
    let second = storage.insert_one(json!({"n": 2})).await.unwrap();

    assert_ne!(first["_id"], second["_id"]);
    assert_eq!(storage.count(Filter::eq("_id", first["_id"].clone())).await.unwrap(), 1);
}

#[tokio::test]
async fn test_duplicate_insert_is_rejected() {
    let storage = people().await;
    let err = storage.insert_one(json!({"_id": "a"})).await.unwrap_err();
    assert!(matches!(err, DocumentStoreError::DuplicateId(_)));
    assert_eq!(storage.len().await, 3);
}

#[tokio::test]
async fn test_update_and_replace() {
    let storage = people().await;

    let result = storage
        .update_many(json!({"age": {"$lt": 35}}), Update::builder().inc("age", 1).build())
        .await
        .unwrap();
    assert_eq!(result, UpdateResult::new(2, 2));

    let result = storage
        .update_one(json!({"_id": "b"}), json!({"$push": {"tags": "ops"}}))
        .await
        .unwrap();
    assert_eq!(result, UpdateResult::new(1, 1));

    let bob = storage.find_one(json!({"_id": "b"}), None).await.unwrap().unwrap();
    assert_eq!(bob["age"], json!(26));
    assert_eq!(bob["tags"], json!(["ops"]));

    let result = storage
        .replace_one(json!({"_id": "c"}), json!({"name": "Caroline"}))
        .await
        .unwrap();
    assert_eq!(result, UpdateResult::new(1, 1));
    let caroline = storage.find_one(json!({"_id": "c"}), None).await.unwrap().unwrap();
    assert_eq!(Value::Object(caroline), json!({"_id": "c", "name": "Caroline"}));
}

#[tokio::test]
async fn test_update_without_match() {
    let storage = people().await;
    let result = storage
        .update_one(json!({"name": "Nobody"}), json!({"$set": {"age": 1}}))
        .await
        .unwrap();
    assert_eq!(result, UpdateResult::default());
}

#[tokio::test]
async fn test_delete() {
    let storage = people().await;
    assert_eq!(
        storage.delete_one(json!({"age": {"$gt": 20}})).await.unwrap(),
        DeleteResult::new(1)
    );
    assert_eq!(
        storage.delete_many(json!({"$or": [{"_id": "b"}, {"_id": "c"}]})).await.unwrap(),
        DeleteResult::new(2)
    );
    assert!(storage.is_empty().await);
}

#[tokio::test]
async fn test_invalid_arguments_surface_errors() {
    let storage = people().await;

    let err = storage.find_many(json!({"age": {"$between": [1, 2]}}), None).await.unwrap_err();
    assert!(matches!(err, DocumentStoreError::InvalidCriteria(_)));

    let err = storage.find_many(json!({}), json!({"name": 1, "age": 0})).await.unwrap_err();
    assert!(matches!(err, DocumentStoreError::InvalidProjection(_)));

    let err = storage.update_one(json!({}), json!({"$frobnicate": {"a": 1}})).await.unwrap_err();
    assert!(matches!(err, DocumentStoreError::UnsupportedOperator(_)));
}

#[tokio::test]
async fn test_memory_adapter_round_trip() {
    let adapter = MemoryAdapter::new();
    let storage = Storage::open(adapter.clone(), StorageSettings::default()).await.unwrap();
    storage.insert_one(json!({"_id": 1, "name": "Alice"})).await.unwrap();
    assert_eq!(adapter.snapshot().await.len(), 1);
    storage.shutdown().await.unwrap();

    let reopened = Storage::open(adapter.clone(), StorageSettings::default()).await.unwrap();
    assert_eq!(reopened.count(json!({"name": "Alice"})).await.unwrap(), 1);
}

#[tokio::test]
async fn test_load_assigns_missing_ids() {
    let adapter = RecordingAdapter::with_initial(vec![json!({"name": "no id"}), json!({"_id": 7})]);
    let storage = Storage::open(adapter, StorageSettings::default()).await.unwrap();

    let docs = storage.documents().await;
    assert_eq!(docs.len(), 2);
    assert!(docs[0]["_id"].is_string());
    assert!(storage.is_dirty().await);
}

#[tokio::test]
async fn test_load_rejects_non_objects() {
    let adapter = RecordingAdapter::with_initial(vec![json!(42)]);
    let err = Storage::open(adapter, StorageSettings::default()).await.unwrap_err();
    assert!(matches!(err, DocumentStoreError::InvalidDocument(_)));
}

#[tokio::test]
async fn test_auto_flush_only_after_changes() {
    let adapter = RecordingAdapter::default();
    let storage = Storage::open(adapter.clone(), StorageSettings::default()).await.unwrap();

    storage.insert_one(json!({"_id": 1, "n": 1})).await.unwrap();
    assert_eq!(adapter.flushes(), 1);

    storage.find_many(json!({}), None).await.unwrap();
    storage.update_one(json!({"_id": 1}), json!({"$set": {"n": 1}})).await.unwrap();
    storage.delete_many(json!({"_id": 99})).await.unwrap();
    assert_eq!(adapter.flushes(), 1);

    storage.update_one(json!({"_id": 1}), json!({"$set": {"n": 2}})).await.unwrap();
    assert_eq!(adapter.flushes(), 2);
    assert!(!storage.is_dirty().await);
}

#[tokio::test]
async fn test_manual_flush() {
    let adapter = RecordingAdapter::default();
    let settings = StorageSettings::default().auto_flush(false);
    let storage = Storage::open(adapter.clone(), settings).await.unwrap();

    storage.insert_one(json!({"n": 1})).await.unwrap();
    storage.insert_one(json!({"n": 2})).await.unwrap();
    assert_eq!(adapter.flushes(), 0);
    assert!(storage.is_dirty().await);

    storage.flush().await.unwrap();
    assert_eq!(adapter.flushes(), 1);
    assert!(!storage.is_dirty().await);
}

#[tokio::test]
async fn test_failed_flush_keeps_changes_pending() {
    let adapter = RecordingAdapter::default();
    let storage = Storage::open(adapter.clone(), StorageSettings::default()).await.unwrap();

    adapter.fail_flush.store(true, Ordering::SeqCst);
    let err = storage.insert_one(json!({"_id": 1})).await.unwrap_err();
    assert!(matches!(err, DocumentStoreError::Io(_)));
    assert_eq!(storage.len().await, 1);
    assert!(storage.is_dirty().await);

    adapter.fail_flush.store(false, Ordering::SeqCst);
    storage.flush().await.unwrap();
    assert!(!storage.is_dirty().await);
}

#[tokio::test]
async fn test_drop_storage() {
    let adapter = RecordingAdapter::default();
    let storage = Storage::open(adapter.clone(), StorageSettings::default()).await.unwrap();
    storage.insert_one(json!({"n": 1})).await.unwrap();

    storage.drop_storage().await.unwrap();
    assert!(adapter.dropped.load(Ordering::SeqCst));
    assert!(storage.is_empty().await);
    assert!(!storage.is_dirty().await);

    storage.insert_one(json!({"n": 2})).await.unwrap();
    assert_eq!(storage.len().await, 1);
}

#[tokio::test]
async fn test_shutdown_flushes_pending_changes() {
    let adapter = RecordingAdapter::default();
    let settings = StorageSettings::default().auto_flush(false);
    let storage = Storage::open(adapter.clone(), settings).await.unwrap();
    storage.insert_one(json!({"n": 1})).await.unwrap();

    storage.shutdown().await.unwrap();
    assert_eq!(adapter.flushes(), 1);
    assert!(adapter.shut_down.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_dyn_storage() {
    let adapter: Box<dyn DynPersistenceAdapter> = Box::new(RecordingAdapter::default());
    let storage: DynStorage = Storage::open(adapter, StorageSettings::default()).await.unwrap();

    storage.insert_one(json!({"n": 1})).await.unwrap();
    let inner = storage.adapter().downcast_ref::<RecordingAdapter>().unwrap();
    assert_eq!(inner.flushes(), 1);

    storage.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_concurrent_inserts() {
    let storage = Arc::new(
        Storage::open(MemoryAdapter::new(), StorageSettings::default())
            .await
            .unwrap(),
    );

    let handles: Vec<_> = (0..16)
        .map(|i| {
            let storage = Arc::clone(&storage);
            tokio::spawn(async move { storage.insert_one(json!({"n": i})).await })
        })
        .collect();

    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(storage.len().await, 16);
}
