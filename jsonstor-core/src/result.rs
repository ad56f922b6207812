//! Result types returned by mutating operations.

use serde::{Deserialize, Serialize};

/// Outcome of `UpdateOne`, `UpdateMany` and `ReplaceOne`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UpdateResult {
    /// Number of documents the criteria matched.
    pub matched_count: usize,
    /// Number of matched documents whose value actually changed.
    pub modified_count: usize,
}

impl UpdateResult {
    pub fn new(matched_count: usize, modified_count: usize) -> Self {
        Self { matched_count, modified_count }
    }
}

/// Outcome of `DeleteOne` and `DeleteMany`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DeleteResult {
    /// Number of documents removed.
    pub deleted_count: usize,
}

impl DeleteResult {
    pub fn new(deleted_count: usize) -> Self {
        Self { deleted_count }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_serializes_camel_case() {
        assert_eq!(
            serde_json::to_value(UpdateResult::new(2, 1)).unwrap(),
            json!({"matchedCount": 2, "modifiedCount": 1})
        );
        assert_eq!(
            serde_json::to_value(DeleteResult::new(3)).unwrap(),
            json!({"deletedCount": 3})
        );
    }
}
