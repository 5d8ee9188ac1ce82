//! Quiz value types: questions, canonical answers, and submitted answers.
//!
//! Both the canonical answer and the submitted answer are adjacently
//! tagged so a client can send any shape without guessing:
//!
//! ```json
//! { "kind": "choice",   "value": "2" }
//! { "kind": "choices",  "value": [0, 3] }
//! { "kind": "text",     "value": "Paris" }
//! { "kind": "blanks",   "value": ["red", "blue"] }
//! { "kind": "sequence", "value": [2, 0, 1] }
//! { "kind": "pairs",    "value": { "H": "Hydrogen" } }
//! ```
//!
//! Option indices are compared as text. Clients may send them as JSON
//! numbers or strings; both decode to the same `String`.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Deserializer, Serialize};

use crate::QuestionId;

/// The declared type of a question. Decides how answers are checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionKind {
    SingleChoice,
    MultiSelect,
    TrueFalse,
    FreeText,
    FillBlank,
    Ordering,
    Pairing,
    /// Anything the server doesn't know how to grade. Never correct.
    #[serde(other)]
    Unsupported,
}

/// The canonical correct answer for a question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum CorrectAnswer {
    /// Correct option indices (single-choice, true/false, multi-select).
    Choices(#[serde(deserialize_with = "index_texts")] Vec<String>),
    /// Expected free-text answer.
    Text(String),
    /// Expected value per blank, in order.
    Blanks(Vec<String>),
    /// Expected order of option indices.
    Sequence(Vec<u32>),
    /// Expected left → right matches.
    Pairs(BTreeMap<String, String>),
}

/// A player's submitted answer, as received on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum AnswerPayload {
    Choice(#[serde(deserialize_with = "index_text")] String),
    Choices(#[serde(deserialize_with = "index_texts")] Vec<String>),
    Text(String),
    Blanks(Vec<String>),
    Sequence(Vec<u32>),
    Pairs(BTreeMap<String, String>),
}

impl AnswerPayload {
    /// Distribution keys for the results screen.
    ///
    /// Choice answers count once per distinct picked option, and only for
    /// indices below `option_count`. Free-form shapes never expose their
    /// text: they count under `"correct"` or `"incorrect"`.
    pub fn tally_keys(&self, correct: bool, option_count: usize) -> Vec<String> {
        let option = |text: &str| {
            text.trim()
                .parse::<usize>()
                .ok()
                .filter(|&i| i < option_count)
        };
        match self {
            Self::Choice(index) => option(index.as_str()).map(|i| i.to_string()).into_iter().collect(),
            Self::Choices(indices) => indices
                .iter()
                .filter_map(|i| option(i.as_str()))
                .collect::<BTreeSet<_>>()
                .into_iter()
                .map(|i| i.to_string())
                .collect(),
            Self::Text(_) | Self::Blanks(_) | Self::Sequence(_) | Self::Pairs(_) => {
                let bucket = if correct { "correct" } else { "incorrect" };
                vec![bucket.to_string()]
            }
        }
    }
}

/// A question as loaded from the question set. Immutable during a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: QuestionId,
    /// 0-based ordinal position in the question set.
    pub position: u32,
    pub prompt: String,
    #[serde(default)]
    pub media: Option<String>,
    pub kind: QuestionKind,
    #[serde(default)]
    pub options: Vec<String>,
    pub correct: CorrectAnswer,
    /// Overrides the room's per-question limit when set.
    #[serde(default)]
    pub time_limit_secs: Option<u32>,
    #[serde(default = "default_points")]
    pub points: u32,
    #[serde(default)]
    pub explanation: Option<String>,
}

fn default_points() -> u32 {
    1000
}

impl Question {
    /// Strips the correct answer and explanation for broadcasting.
    pub fn to_public(&self, time_limit_secs: u32) -> PublicQuestion {
        PublicQuestion {
            id: self.id,
            position: self.position,
            prompt: self.prompt.clone(),
            media: self.media.clone(),
            kind: self.kind,
            options: self.options.clone(),
            time_limit_secs,
            points: self.points,
        }
    }
}

/// The sanitized question sent to players in `question_new`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicQuestion {
    pub id: QuestionId,
    pub position: u32,
    pub prompt: String,
    pub media: Option<String>,
    pub kind: QuestionKind,
    pub options: Vec<String>,
    pub time_limit_secs: u32,
    pub points: u32,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum IndexText {
    Text(String),
    Number(u64),
}

impl From<IndexText> for String {
    fn from(value: IndexText) -> Self {
        match value {
            IndexText::Text(s) => s,
            IndexText::Number(n) => n.to_string(),
        }
    }
}

fn index_text<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    IndexText::deserialize(d).map(String::from)
}

fn index_texts<'de, D: Deserializer<'de>>(
    d: D,
) -> Result<Vec<String>, D::Error> {
    Vec::<IndexText>::deserialize(d)
        .map(|v| v.into_iter().map(String::from).collect())
}
