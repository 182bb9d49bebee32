//! Answer accumulator: the single growing record of a survey session.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::catalog::StepDefinition;
use super::rules::RuleBook;

/// Field name excluded from local snapshots.
pub const DATETIME_FIELD: &str = "datetime";

/// A stored answer: one string, or an ordered list for multi-select steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnswerValue {
    Text(String),
    Choices(Vec<String>),
}

impl AnswerValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Choices(_) => None,
        }
    }

    pub fn as_choices(&self) -> Option<&[String]> {
        match self {
            Self::Choices(c) => Some(c),
            Self::Text(_) => None,
        }
    }

    /// The value as a list of picks, for restoring a working selection.
    pub fn to_selection(&self) -> Vec<String> {
        match self {
            Self::Text(s) if s.is_empty() => Vec::new(),
            Self::Text(s) => vec![s.clone()],
            Self::Choices(c) => c.clone(),
        }
    }
}

impl From<&str> for AnswerValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<Vec<String>> for AnswerValue {
    fn from(v: Vec<String>) -> Self {
        Self::Choices(v)
    }
}

/// Read-only view of everything answered so far.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnswerRecord {
    pub fields: BTreeMap<String, AnswerValue>,
    /// Set only when the record is handed to submission.
    pub submitted_at: Option<DateTime<Utc>>,
}

impl AnswerRecord {
    pub fn get(&self, field: &str) -> Option<&AnswerValue> {
        self.fields.get(field)
    }

    pub fn text(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(AnswerValue::as_text)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Owns the answer record for one session. Only validated values reach it;
/// the sequencer is its only writer.
#[derive(Debug, Default)]
pub struct Accumulator {
    record: AnswerRecord,
}

impl Accumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from a stored snapshot.
    pub fn from_fields(fields: BTreeMap<String, AnswerValue>) -> Self {
        let mut acc = Self::new();
        for (field, value) in fields {
            if field != DATETIME_FIELD {
                acc.record.fields.insert(field, value);
            }
        }
        acc
    }

    /// Set a field, overwriting any previous value.
    pub fn merge(&mut self, field: &str, value: AnswerValue) {
        self.record.fields.insert(field.to_string(), value);
    }

    /// Merge a step's answer plus every field the rule book derives from it.
    /// Returns the names of the derived fields.
    pub fn merge_answer(
        &mut self,
        rules: &RuleBook,
        step: &StepDefinition,
        value: AnswerValue,
    ) -> Vec<String> {
        let derived = rules.derive(step, &value);
        self.merge(&step.id, value);
        derived
            .into_iter()
            .map(|(field, value)| {
                self.merge(&field, value);
                field
            })
            .collect()
    }

    pub fn get(&self, field: &str) -> Option<&AnswerValue> {
        self.record.get(field)
    }

    /// Timestamp the record for submission. Done at submit time only so a
    /// long session never ships a stale clock.
    pub fn stamp_submitted(&mut self, at: DateTime<Utc>) {
        self.record.submitted_at = Some(at);
    }

    pub fn snapshot(&self) -> AnswerRecord {
        self.record.clone()
    }

    /// Fields safe to persist locally: everything except the timestamps.
    pub fn session_view(&self) -> BTreeMap<String, AnswerValue> {
        let mut fields = self.record.fields.clone();
        fields.remove(DATETIME_FIELD);
        fields
    }

    pub fn clear(&mut self) {
        self.record = AnswerRecord::default();
    }
}
