//! Question sets and rosters, owned by an external catalog.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use quizlive_protocol::{Question, QuestionSetId, RosterId, UserId};

use crate::StoreError;

/// An ordered list of questions with a title.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionSet {
    pub id: QuestionSetId,
    pub title: String,
    pub questions: Vec<Question>,
}

/// One member of a class roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterMember {
    pub user_id: UserId,
    pub display_name: String,
    #[serde(default)]
    pub avatar: String,
}

/// Read-only access to question sets and rosters.
#[async_trait]
pub trait QuestionSource: Send + Sync {
    /// Loads a question set, questions ordered by `position`.
    async fn question_set(&self, id: &QuestionSetId) -> Result<QuestionSet, StoreError>;

    /// Loads the members of a roster.
    async fn roster(&self, id: &RosterId) -> Result<Vec<RosterMember>, StoreError>;
}

/// In-memory catalog, built in code or loaded from JSON.
///
/// ```json
/// {
///   "question_sets": [{ "id": "geo", "title": "Geography", "questions": [] }],
///   "rosters": { "class-7b": [{ "user_id": "u1", "display_name": "Ada" }] }
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryCatalog {
    sets: HashMap<QuestionSetId, QuestionSet>,
    rosters: HashMap<RosterId, Vec<RosterMember>>,
}

#[derive(Deserialize)]
struct CatalogFile {
    #[serde(default)]
    question_sets: Vec<QuestionSet>,
    #[serde(default)]
    rosters: HashMap<RosterId, Vec<RosterMember>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a catalog document.
    ///
    /// # Errors
    /// Returns [`StoreError::Serialization`] if the JSON doesn't match.
    pub fn from_json(json: &str) -> Result<Self, StoreError> {
        let file: CatalogFile = serde_json::from_str(json)?;
        let mut catalog = Self::new();
        for set in file.question_sets {
            catalog = catalog.with_set(set);
        }
        catalog.rosters = file.rosters;
        Ok(catalog)
    }

    pub fn with_set(mut self, mut set: QuestionSet) -> Self {
        set.questions.sort_by_key(|q| q.position);
        self.sets.insert(set.id.clone(), set);
        self
    }

    pub fn with_roster(mut self, id: RosterId, members: Vec<RosterMember>) -> Self {
        self.rosters.insert(id, members);
        self
    }
}

#[async_trait]
impl QuestionSource for MemoryCatalog {
    async fn question_set(&self, id: &QuestionSetId) -> Result<QuestionSet, StoreError> {
        self.sets
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::QuestionSetNotFound(id.clone()))
    }

    async fn roster(&self, id: &RosterId) -> Result<Vec<RosterMember>, StoreError> {
        self.rosters
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::RosterNotFound(id.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATALOG: &str = r#"{
        "question_sets": [{
            "id": "geo",
            "title": "Geography",
            "questions": [
                {"id": 2, "position": 1, "prompt": "Second", "kind": "free_text",
                 "correct": {"kind": "text", "value": "b"}},
                {"id": 1, "position": 0, "prompt": "First", "kind": "free_text",
                 "correct": {"kind": "text", "value": "a"}}
            ]
        }],
        "rosters": {
            "7b": [{"user_id": "u1", "display_name": "Ada"}]
        }
    }"#;

    #[tokio::test]
    async fn test_from_json_orders_questions_by_position() {
        let catalog = MemoryCatalog::from_json(CATALOG).unwrap();
        let set = catalog
            .question_set(&QuestionSetId("geo".into()))
            .await
            .unwrap();
        assert_eq!(set.title, "Geography");
        assert_eq!(set.questions[0].prompt, "First");
        assert_eq!(set.questions[1].prompt, "Second");
    }

    #[tokio::test]
    async fn test_roster_lookup() {
        let catalog = MemoryCatalog::from_json(CATALOG).unwrap();
        let members = catalog.roster(&RosterId("7b".into())).await.unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].display_name, "Ada");
        assert!(members[0].avatar.is_empty());
    }

    #[tokio::test]
    async fn test_missing_set_is_not_found() {
        let catalog = MemoryCatalog::new();
        let err = catalog
            .question_set(&QuestionSetId("nope".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::QuestionSetNotFound(_)));
    }

    #[test]
    fn test_from_json_rejects_garbage() {
        assert!(MemoryCatalog::from_json("{not json").is_err());
    }
}
