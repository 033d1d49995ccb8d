use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::question::Variant;

/// Value submitted for a question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "kebab-case")]
pub enum AnswerValue {
    /// Selected option index of a single-choice question.
    Choice(usize),
    Boolean(bool),
    Text(String),
}

impl AnswerValue {
    /// Returns true when this value has the shape expected by `variant`.
    #[must_use]
    pub fn fits(&self, variant: Variant) -> bool {
        matches!(
            (self, variant),
            (AnswerValue::Choice(_), Variant::SingleChoice)
                | (AnswerValue::Boolean(_), Variant::TrueFalse)
                | (AnswerValue::Text(_), Variant::FreeText)
        )
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            AnswerValue::Text(text) => Some(text),
            _ => None,
        }
    }
}

/// Latest answer recorded for a question within a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answer {
    pub value: AnswerValue,
    pub submitted_at: DateTime<Utc>,
}

impl Answer {
    #[must_use]
    pub fn new(value: AnswerValue, submitted_at: DateTime<Utc>) -> Self {
        Self {
            value,
            submitted_at,
        }
    }
}
