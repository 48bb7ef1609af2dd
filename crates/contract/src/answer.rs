//! Answers collected across clarification rounds.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Answers keyed by question id.
pub type QuestionAnswers = BTreeMap<String, Answer>;

/// A single answer: free text or one or more selected choices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Answer {
    /// Free-text answer.
    Text(String),
    /// Selected option labels.
    Choices(Vec<String>),
}

impl From<&str> for Answer {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for Answer {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Vec<String>> for Answer {
    fn from(value: Vec<String>) -> Self {
        Self::Choices(value)
    }
}
