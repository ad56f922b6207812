//! The in-memory document engine.
//!
//! [`MemoryEngine`] owns a single collection of documents keyed by identity and
//! implements every query and mutation over it. It knows nothing about durable
//! storage; it only records whether the collection changed since the last flush.
//!
//! Every operation validates its whole input before changing anything, so a
//! failing call leaves the collection exactly as it was.

use indexmap::IndexMap;
use serde_json::Value;
use std::collections::HashSet;
use tracing::{debug, trace};

use jsonstor_core::{
    document::{Document, document_id, ensure_id, get_path, into_document},
    error::{DocumentStoreError, DocumentStoreResult},
    projection::IntoProjection,
    query::{Expr, FindOptions, IntoCriteria, SortDirection},
    result::{DeleteResult, UpdateResult},
    update::{IntoUpdate, Update},
};

use crate::{
    evaluator::{DocumentEvaluator, compare_values, matches},
    projector::project,
    updater::apply_update,
};

/// Lifecycle of an engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EngineState {
    /// Nothing loaded and nothing written yet.
    #[default]
    Empty,
    /// Populated by [`MemoryEngine::load`]; no mutation since.
    Loaded,
    /// At least one mutating operation has run.
    Ready,
}

/// A single in-memory collection.
///
/// Documents keep insertion order, which is the order results are returned in
/// when no sort is requested.
///
/// # Example
///
/// ```ignore
/// use jsonstor_memory::MemoryEngine;
/// use serde_json::json;
///
/// let mut engine = MemoryEngine::new();
/// engine.insert_one(json!({ "name": "Alice", "age": 30 }))?;
/// let adults = engine.find_many(json!({ "age": { "$gte": 18 } }), None)?;
/// ```
#[derive(Debug, Default)]
pub struct MemoryEngine {
    documents: IndexMap<String, Document>,
    state: EngineState,
    dirty: bool,
}

impl MemoryEngine {
    /// Creates an empty engine.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Number of stored documents.
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Whether the collection changed since the last [`clear_dirty`](Self::clear_dirty).
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Marks the current contents as persisted.
    pub fn clear_dirty(&mut self) {
        self.dirty = false;
    }

    /// A copy of every document in collection order.
    pub fn documents(&self) -> Vec<Document> {
        self.documents.values().cloned().collect()
    }

    /// Replaces the collection with `documents`.
    ///
    /// Documents without an identifier get one. If any identifier had to be
    /// generated the engine is left dirty, since the durable copy no longer
    /// matches memory.
    ///
    /// # Errors
    ///
    /// - [`DocumentStoreError::InvalidDocument`] if an entry is not an object or has an invalid identifier
    /// - [`DocumentStoreError::DuplicateId`] if two entries share an identifier
    pub fn load(&mut self, documents: Vec<Value>) -> DocumentStoreResult<usize> {
        let mut loaded = IndexMap::with_capacity(documents.len());
        let mut assigned = false;

        for value in documents {
            let document = into_document(value)?;
            assigned |= document_id(&document).is_none();
            let (key, document) = ensure_id(document)?;

            if loaded.contains_key(&key) {
                return Err(DocumentStoreError::DuplicateId(key));
            }

            loaded.insert(key, document);
        }

        let count = loaded.len();
        self.documents = loaded;
        self.state = EngineState::Loaded;
        self.dirty = assigned;

        debug!(count, assigned_ids = assigned, "loaded documents into engine");

        Ok(count)
    }

    /// Counts documents matching `criteria`.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::InvalidCriteria`] for malformed criteria.
    pub fn count(&self, criteria: impl IntoCriteria) -> DocumentStoreResult<usize> {
        let criteria = criteria.into_criteria()?;
        let mut count = 0;

        for document in self.documents.values() {
            if matches(document, &criteria)? {
                count += 1;
            }
        }

        Ok(count)
    }

    /// Inserts a document and returns it as stored, identifier included.
    ///
    /// # Errors
    ///
    /// - [`DocumentStoreError::InvalidDocument`] if `document` is not an object or has an invalid identifier
    /// - [`DocumentStoreError::DuplicateId`] if the identifier is already present
    pub fn insert_one(&mut self, document: Value) -> DocumentStoreResult<Document> {
        let mut inserted = self.insert_many(vec![document])?;
        inserted.pop().ok_or_else(|| DocumentStoreError::Backend("insert produced no document".to_string()))
    }

    /// Inserts every document or none of them.
    ///
    /// Identifiers are checked against the collection and against each other
    /// before anything is stored.
    ///
    /// # Errors
    ///
    /// Same as [`insert_one`](Self::insert_one), for any document in the batch.
    pub fn insert_many(&mut self, documents: Vec<Value>) -> DocumentStoreResult<Vec<Document>> {
        let mut prepared = Vec::with_capacity(documents.len());
        let mut batch_keys = HashSet::with_capacity(documents.len());

        for value in documents {
            let (key, document) = ensure_id(into_document(value)?)?;

            if self.documents.contains_key(&key) || !batch_keys.insert(key.clone()) {
                return Err(DocumentStoreError::DuplicateId(key));
            }

            prepared.push((key, document));
        }

        self.touch();

        let mut inserted = Vec::with_capacity(prepared.len());
        for (key, document) in prepared {
            trace!(id = %key, "inserting document");
            inserted.push(document.clone());
            self.documents.insert(key, document);
        }

        if !inserted.is_empty() {
            self.dirty = true;
        }

        debug!(count = inserted.len(), "inserted documents");

        Ok(inserted)
    }

    /// Returns the first matching document, projected.
    ///
    /// # Errors
    ///
    /// [`DocumentStoreError::InvalidCriteria`] or [`DocumentStoreError::InvalidProjection`]
    /// for malformed arguments.
    pub fn find_one(
        &self,
        criteria: impl IntoCriteria,
        projection: impl IntoProjection,
    ) -> DocumentStoreResult<Option<Document>> {
        let criteria = criteria.into_criteria()?;
        let projection = projection.into_projection()?;

        for document in self.documents.values() {
            if matches(document, &criteria)? {
                return project(document, projection.as_ref()).map(Some);
            }
        }

        Ok(None)
    }

    /// Returns every matching document in collection order, projected.
    pub fn find_many(
        &self,
        criteria: impl IntoCriteria,
        projection: impl IntoProjection,
    ) -> DocumentStoreResult<Vec<Document>> {
        self.find_many_with(criteria, projection, &FindOptions::default())
    }

    /// Returns matching documents with sorting and windowing applied before projection.
    ///
    /// Sorting is stable; documents missing the sort field sort first in ascending order.
    pub fn find_many_with(
        &self,
        criteria: impl IntoCriteria,
        projection: impl IntoProjection,
        options: &FindOptions,
    ) -> DocumentStoreResult<Vec<Document>> {
        let criteria = criteria.into_criteria()?;
        let projection = projection.into_projection()?;
        let mut matched = self.matching(&criteria)?;

        if let Some(sort) = &options.sort {
            matched.sort_by(|a, b| {
                let ordering = compare_values(get_path(a, &sort.field), get_path(b, &sort.field));
                match sort.direction {
                    SortDirection::Asc => ordering,
                    SortDirection::Desc => ordering.reverse(),
                }
            });
        }

        matched
            .into_iter()
            .skip(options.skip.unwrap_or(0))
            .take(options.limit.unwrap_or(usize::MAX))
            .map(|document| project(document, projection.as_ref()))
            .collect()
    }

    /// Updates the first matching document.
    ///
    /// # Errors
    ///
    /// Malformed criteria or update, or any error raised while applying the update.
    pub fn update_one(
        &mut self,
        criteria: impl IntoCriteria,
        update: impl IntoUpdate,
    ) -> DocumentStoreResult<UpdateResult> {
        let criteria = criteria.into_criteria()?;
        let update = update.into_update()?;
        self.apply(&criteria, &update, false)
    }

    /// Updates every matching document, or none if applying the update fails for any of them.
    pub fn update_many(
        &mut self,
        criteria: impl IntoCriteria,
        update: impl IntoUpdate,
    ) -> DocumentStoreResult<UpdateResult> {
        let criteria = criteria.into_criteria()?;
        let update = update.into_update()?;
        self.apply(&criteria, &update, true)
    }

    /// Replaces the first matching document, keeping its identifier.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::InvalidDocument`] if `replacement` is not an
    /// object, contains update operators, or names a different identifier.
    pub fn replace_one(
        &mut self,
        criteria: impl IntoCriteria,
        replacement: Value,
    ) -> DocumentStoreResult<UpdateResult> {
        let criteria = criteria.into_criteria()?;
        let replacement = into_document(replacement)?;

        if let Some(op) = replacement.keys().find(|k| k.starts_with('$')) {
            return Err(DocumentStoreError::InvalidDocument(format!(
                "replacement document cannot contain update operator {op}"
            )));
        }

        self.apply(&criteria, &Update::Replace(replacement), false)
    }

    /// Deletes the first matching document.
    pub fn delete_one(&mut self, criteria: impl IntoCriteria) -> DocumentStoreResult<DeleteResult> {
        let criteria = criteria.into_criteria()?;
        self.remove(&criteria, false)
    }

    /// Deletes every matching document.
    pub fn delete_many(&mut self, criteria: impl IntoCriteria) -> DocumentStoreResult<DeleteResult> {
        let criteria = criteria.into_criteria()?;
        self.remove(&criteria, true)
    }

    /// Removes every document and returns how many there were.
    pub fn drop_documents(&mut self) -> usize {
        let count = self.documents.len();
        self.touch();
        self.documents.clear();
        if count > 0 {
            self.dirty = true;
        }
        debug!(count, "dropped all documents");
        count
    }

    fn touch(&mut self) {
        self.state = EngineState::Ready;
    }

    fn matching(&self, criteria: &Expr) -> DocumentStoreResult<Vec<&Document>> {
        DocumentEvaluator::filter_documents(self.documents.values(), criteria)
    }

    fn matching_keys(&self, criteria: &Expr, many: bool) -> DocumentStoreResult<Vec<String>> {
        let mut keys = Vec::new();

        for (key, document) in &self.documents {
            if matches(document, criteria)? {
                keys.push(key.clone());
                if !many {
                    break;
                }
            }
        }

        Ok(keys)
    }

    fn apply(&mut self, criteria: &Expr, update: &Update, many: bool) -> DocumentStoreResult<UpdateResult> {
        let keys = self.matching_keys(criteria, many)?;
        let mut changes = Vec::with_capacity(keys.len());

        for key in &keys {
            if let Some(current) = self.documents.get(key) {
                let updated = apply_update(current, update)?;
                if &updated != current {
                    changes.push((key.clone(), updated));
                }
            }
        }

        self.touch();

        let result = UpdateResult::new(keys.len(), changes.len());
        for (key, updated) in changes {
            trace!(id = %key, "updating document");
            self.documents.insert(key, updated);
        }

        if result.modified_count > 0 {
            self.dirty = true;
        }

        debug!(
            matched = result.matched_count,
            modified = result.modified_count,
            replacement = update.is_replacement(),
            "updated documents"
        );

        Ok(result)
    }

    fn remove(&mut self, criteria: &Expr, many: bool) -> DocumentStoreResult<DeleteResult> {
        let keys = self.matching_keys(criteria, many)?;
        self.touch();

        for key in &keys {
            trace!(id = %key, "deleting document");
            self.documents.shift_remove(key);
        }

        if !keys.is_empty() {
            self.dirty = true;
        }

        debug!(count = keys.len(), "deleted documents");

        Ok(DeleteResult::new(keys.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonstor_core::{projection::Projection, query::Filter};
    use serde_json::json;

    fn seeded() -> MemoryEngine {
        let mut engine = MemoryEngine::new();
        engine
            .insert_many(vec![
                json!({"_id": 1, "name": "Alice", "age": 30}),
                json!({"_id": 2, "name": "Bob", "age": 25}),
                json!({"_id": 3, "name": "Carol", "age": 35}),
            ])
            .unwrap();
        engine.clear_dirty();
        engine
    }

    #[test]
    fn test_state_transitions() {
        let mut engine = MemoryEngine::new();
        assert_eq!(engine.state(), EngineState::Empty);

        engine.load(vec![json!({"_id": 1})]).unwrap();
        assert_eq!(engine.state(), EngineState::Loaded);
        assert!(!engine.is_dirty());

        engine.count(json!({})).unwrap();
        assert_eq!(engine.state(), EngineState::Loaded);

        engine.delete_many(json!({"_id": 99})).unwrap();
        assert_eq!(engine.state(), EngineState::Ready);
    }

    #[test]
    fn test_load_assigns_missing_ids() {
        let mut engine = MemoryEngine::new();
        assert_eq!(engine.load(vec![json!({"a": 1}), json!({"_id": "x"})]).unwrap(), 2);
        assert!(engine.is_dirty());
        assert!(engine.documents().iter().all(|d| d.contains_key("_id")));
    }

    #[test]
    fn test_load_rejects_duplicates() {
        let mut engine = MemoryEngine::new();
        let err = engine.load(vec![json!({"_id": 1}), json!({"_id": 1.0})]).unwrap_err();
        assert!(matches!(err, DocumentStoreError::DuplicateId(_)));
        assert_eq!(engine.state(), EngineState::Empty);
    }

    #[test]
    fn test_insert_generates_id() {
        let mut engine = MemoryEngine::new();
        let stored = engine.insert_one(json!({"name": "Dan"})).unwrap();
        let id = stored["_id"].as_str().unwrap();
        assert_eq!(id.len(), 32);
        assert_eq!(stored.keys().next().map(String::as_str), Some("_id"));
        assert!(engine.is_dirty());
    }

    #[test]
    fn test_insert_many_is_atomic() {
        let mut engine = seeded();
        let err = engine
            .insert_many(vec![json!({"_id": 10}), json!({"_id": 2})])
            .unwrap_err();
        assert!(matches!(err, DocumentStoreError::DuplicateId(_)));
        assert_eq!(engine.len(), 3);
        assert!(!engine.is_dirty());

        let err = engine
            .insert_many(vec![json!({"_id": 11}), json!({"_id": 11})])
            .unwrap_err();
        assert!(matches!(err, DocumentStoreError::DuplicateId(_)));
        assert_eq!(engine.len(), 3);
    }

    #[test]
    fn test_numerically_equal_ids_collide() {
        let mut engine = MemoryEngine::new();
        engine.insert_one(json!({"_id": 9_300_000_000_000_000_000u64})).unwrap();
        let err = engine.insert_one(json!({"_id": 9.3e18})).unwrap_err();
        assert!(matches!(err, DocumentStoreError::DuplicateId(_)));
        assert_eq!(engine.count(json!({"_id": 9.3e18})).unwrap(), 1);
    }

    #[test]
    fn test_insert_rejects_non_object() {
        let mut engine = MemoryEngine::new();
        let err = engine.insert_one(json!([1, 2])).unwrap_err();
        assert!(matches!(err, DocumentStoreError::InvalidDocument(_)));
        assert_eq!(engine.state(), EngineState::Empty);
    }

    #[test]
    fn test_find_and_count() {
        let engine = seeded();
        assert_eq!(engine.count(json!({"age": {"$gt": 26}})).unwrap(), 2);
        assert_eq!(engine.count(Filter::eq("name", "Bob")).unwrap(), 1);

        let found = engine.find_one(json!({"name": "Carol"}), None).unwrap().unwrap();
        assert_eq!(found["age"], json!(35));
        assert!(engine.find_one(json!({"name": "Zed"}), None).unwrap().is_none());

        let names: Vec<_> = engine
            .find_many(json!({}), Projection::include(["name"]).without_id())
            .unwrap()
            .into_iter()
            .map(Value::Object)
            .collect();
        assert_eq!(names, vec![json!({"name": "Alice"}), json!({"name": "Bob"}), json!({"name": "Carol"})]);
    }

    #[test]
    fn test_find_with_options() {
        let engine = seeded();
        let options = FindOptions::builder().sort("age", SortDirection::Desc).skip(1).limit(1).build();
        let found = engine.find_many_with(json!({}), json!({"name": 1}), &options).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0]["name"], json!("Alice"));
    }

    #[test]
    fn test_invalid_criteria() {
        let engine = seeded();
        let err = engine.count(json!({"$where": "1"})).unwrap_err();
        assert!(matches!(err, DocumentStoreError::InvalidCriteria(_)));
    }

    #[test]
    fn test_update_one_and_many() {
        let mut engine = seeded();
        let result = engine.update_one(json!({"age": {"$gte": 30}}), json!({"$inc": {"age": 1}})).unwrap();
        assert_eq!(result, UpdateResult::new(1, 1));
        assert!(engine.is_dirty());

        let result = engine.update_many(json!({}), json!({"$set": {"active": true}})).unwrap();
        assert_eq!(result, UpdateResult::new(3, 3));

        let result = engine.update_many(json!({}), json!({"$set": {"active": true}})).unwrap();
        assert_eq!(result, UpdateResult::new(3, 0));
    }

    #[test]
    fn test_set_far_past_array_end_fails() {
        let mut engine = MemoryEngine::new();
        engine.insert_one(json!({"_id": 1, "tags": ["a"]})).unwrap();
        engine.clear_dirty();

        let err = engine
            .update_one(json!({"_id": 1}), json!({"$set": {"tags.18446744073709551615": "x"}}))
            .unwrap_err();
        assert!(matches!(err, DocumentStoreError::TypeMismatch(_)));
        assert!(!engine.is_dirty());
        assert_eq!(engine.find_one(json!({"_id": 1}), None).unwrap().unwrap()["tags"], json!(["a"]));
    }

    #[test]
    fn test_unchanged_update_is_not_dirty() {
        let mut engine = seeded();
        let result = engine.update_one(json!({"_id": 1}), json!({"$set": {"name": "Alice"}})).unwrap();
        assert_eq!(result, UpdateResult::new(1, 0));
        assert!(!engine.is_dirty());
    }

    #[test]
    fn test_update_many_is_atomic() {
        let mut engine = seeded();
        engine.update_one(json!({"_id": 3}), json!({"$set": {"age": "old"}})).unwrap();
        engine.clear_dirty();

        let err = engine.update_many(json!({}), json!({"$inc": {"age": 1}})).unwrap_err();
        assert!(matches!(err, DocumentStoreError::TypeMismatch(_)));
        assert_eq!(engine.find_one(json!({"_id": 1}), None).unwrap().unwrap()["age"], json!(30));
        assert!(!engine.is_dirty());
    }

    #[test]
    fn test_replace_one() {
        let mut engine = seeded();
        let result = engine.replace_one(json!({"_id": 2}), json!({"name": "Robert"})).unwrap();
        assert_eq!(result, UpdateResult::new(1, 1));
        let replaced = engine.find_one(json!({"_id": 2}), None).unwrap().unwrap();
        assert_eq!(Value::Object(replaced), json!({"_id": 2, "name": "Robert"}));

        let err = engine.replace_one(json!({"_id": 2}), json!({"$set": {"a": 1}})).unwrap_err();
        assert!(matches!(err, DocumentStoreError::InvalidDocument(_)));

        let err = engine.replace_one(json!({"_id": 2}), json!({"_id": 7, "a": 1})).unwrap_err();
        assert!(matches!(err, DocumentStoreError::InvalidDocument(_)));

        let result = engine.replace_one(json!({"_id": 42}), json!({"a": 1})).unwrap();
        assert_eq!(result, UpdateResult::new(0, 0));
    }

    #[test]
    fn test_delete() {
        let mut engine = seeded();
        assert_eq!(engine.delete_one(json!({"age": {"$lt": 40}})).unwrap().deleted_count, 1);
        assert_eq!(engine.len(), 2);
        assert_eq!(engine.delete_many(json!({})).unwrap().deleted_count, 2);
        assert!(engine.is_empty());
    }

    #[test]
    fn test_delete_keeps_order() {
        let mut engine = seeded();
        engine.delete_one(json!({"_id": 2})).unwrap();
        let ids: Vec<_> = engine.documents().iter().map(|d| d["_id"].clone()).collect();
        assert_eq!(ids, vec![json!(1), json!(3)]);
    }

    #[test]
    fn test_drop_documents() {
        let mut engine = seeded();
        assert_eq!(engine.drop_documents(), 3);
        assert!(engine.is_empty());
        assert!(engine.is_dirty());
    }
}
