use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use thiserror::Error;

use crate::model::ids::QuestionId;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

/// A single problem found while validating a question bank.
///
/// `position` is the zero-based index of the offending draft in the input.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Violation {
    #[error("question bank is empty")]
    EmptyBank,

    #[error("question #{position}: id is blank")]
    BlankId { position: usize },

    #[error("question #{position} ({id}): duplicate id")]
    DuplicateId { position: usize, id: String },

    #[error("question #{position} ({id}): unknown variant `{value}`")]
    UnknownVariant {
        position: usize,
        id: String,
        value: String,
    },

    #[error("question #{position} ({id}): unknown difficulty `{value}`")]
    UnknownDifficulty {
        position: usize,
        id: String,
        value: String,
    },

    #[error("question #{position} ({id}): points must be > 0, got {points}")]
    NonPositivePoints {
        position: usize,
        id: String,
        points: i64,
    },

    #[error("question #{position} ({id}): single-choice needs at least 2 options, got {count}")]
    TooFewOptions {
        position: usize,
        id: String,
        count: usize,
    },

    #[error("question #{position} ({id}): correct answer is missing")]
    MissingCorrectAnswer { position: usize, id: String },

    #[error("question #{position} ({id}): correct option {index} is out of range for {count} options")]
    OptionOutOfRange {
        position: usize,
        id: String,
        index: i64,
        count: usize,
    },

    #[error("question #{position} ({id}): correct answer `{text}` matches no option")]
    UnknownOption {
        position: usize,
        id: String,
        text: String,
    },

    #[error("question #{position} ({id}): true-false answer must be true or false")]
    InvalidTrueFalse { position: usize, id: String },

    #[error("question #{position} ({id}): free-text question must declare points")]
    MissingPoints { position: usize, id: String },

    #[error("question #{position} ({id}): free-text question must declare a time estimate")]
    MissingTimeEstimate { position: usize, id: String },
}

/// Returned when a question bank fails validation; lists every violation found.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("question bank has {} violation(s){}", .violations.len(), joined(.violations))]
pub struct ValidationError {
    violations: Vec<Violation>,
}

impl ValidationError {
    #[must_use]
    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }
}

fn joined(violations: &[Violation]) -> String {
    violations.iter().map(|v| format!("; {v}")).collect()
}

//
// ─── TAGS ──────────────────────────────────────────────────────────────────────
//

/// Kind of question; determines the scoring rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Variant {
    SingleChoice,
    TrueFalse,
    FreeText,
}

impl Variant {
    /// Parses a variant tag, tolerating case, `_` separators, and common aliases.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match normalize_tag(raw).as_str() {
            "single-choice" | "choice" => Some(Self::SingleChoice),
            "true-false" | "boolean" => Some(Self::TrueFalse),
            "free-text" | "essay" | "text" => Some(Self::FreeText),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Variant::SingleChoice => "single-choice",
            Variant::TrueFalse => "true-false",
            Variant::FreeText => "free-text",
        }
    }
}

/// Ordered difficulty tier: easy < medium < hard < expert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
    Expert,
}

impl Difficulty {
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match normalize_tag(raw).as_str() {
            "easy" => Some(Self::Easy),
            "medium" => Some(Self::Medium),
            "hard" => Some(Self::Hard),
            "expert" => Some(Self::Expert),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
            Difficulty::Expert => "expert",
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn normalize_tag(raw: &str) -> String {
    raw.trim().to_ascii_lowercase().replace(['_', ' '], "-")
}

//
// ─── QUESTION ──────────────────────────────────────────────────────────────────
//

/// Variant-specific payload of a validated question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuestionKind {
    SingleChoice {
        options: Vec<String>,
        correct: usize,
    },
    TrueFalse {
        correct: bool,
    },
    /// `grading_criteria` is advisory metadata for human reviewers; scoring ignores it.
    FreeText {
        time_estimate_minutes: u32,
        grading_criteria: Vec<String>,
    },
}

/// Immutable, validated question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    id: QuestionId,
    section: String,
    category: String,
    difficulty: Difficulty,
    prompt: String,
    explanation: String,
    points: u32,
    kind: QuestionKind,
}

impl Question {
    #[must_use]
    pub fn id(&self) -> &QuestionId {
        &self.id
    }

    #[must_use]
    pub fn variant(&self) -> Variant {
        match self.kind {
            QuestionKind::SingleChoice { .. } => Variant::SingleChoice,
            QuestionKind::TrueFalse { .. } => Variant::TrueFalse,
            QuestionKind::FreeText { .. } => Variant::FreeText,
        }
    }

    #[must_use]
    pub fn kind(&self) -> &QuestionKind {
        &self.kind
    }

    #[must_use]
    pub fn section(&self) -> &str {
        &self.section
    }

    #[must_use]
    pub fn category(&self) -> &str {
        &self.category
    }

    #[must_use]
    pub fn difficulty(&self) -> Difficulty {
        self.difficulty
    }

    #[must_use]
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    #[must_use]
    pub fn explanation(&self) -> &str {
        &self.explanation
    }

    #[must_use]
    pub fn points(&self) -> u32 {
        self.points
    }

    /// Options of a single-choice question; empty for other variants.
    #[must_use]
    pub fn options(&self) -> &[String] {
        match &self.kind {
            QuestionKind::SingleChoice { options, .. } => options,
            _ => &[],
        }
    }

    #[must_use]
    pub fn time_estimate_minutes(&self) -> Option<u32> {
        match &self.kind {
            QuestionKind::FreeText {
                time_estimate_minutes,
                ..
            } => Some(*time_estimate_minutes),
            _ => None,
        }
    }

    #[must_use]
    pub fn grading_criteria(&self) -> &[String] {
        match &self.kind {
            QuestionKind::FreeText {
                grading_criteria, ..
            } => grading_criteria,
            _ => &[],
        }
    }
}

//
// ─── DRAFT ─────────────────────────────────────────────────────────────────────
//

/// Raw correct-answer representation accepted from question-bank loaders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CorrectAnswerDraft {
    Flag(bool),
    Index(i64),
    Text(String),
}

/// Unvalidated question as supplied by an external loader.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QuestionDraft {
    pub id: String,
    pub variant: String,
    pub section: String,
    pub category: String,
    pub difficulty: String,
    pub prompt: String,
    pub options: Option<Vec<String>>,
    pub correct_answer: Option<CorrectAnswerDraft>,
    pub points: Option<i64>,
    pub explanation: String,
    pub time_estimate_minutes: Option<u32>,
    pub grading_criteria: Vec<String>,
}

impl QuestionDraft {
    fn base(id: impl Into<String>, variant: Variant) -> Self {
        Self {
            id: id.into(),
            variant: variant.as_str().to_owned(),
            section: "General".to_owned(),
            category: "General".to_owned(),
            difficulty: Difficulty::Medium.as_str().to_owned(),
            ..Self::default()
        }
    }

    /// Draft for a single-choice question with `correct` as option index.
    #[must_use]
    pub fn single_choice<S: Into<String>>(
        id: impl Into<String>,
        options: impl IntoIterator<Item = S>,
        correct: i64,
    ) -> Self {
        Self {
            options: Some(options.into_iter().map(Into::into).collect()),
            correct_answer: Some(CorrectAnswerDraft::Index(correct)),
            ..Self::base(id, Variant::SingleChoice)
        }
    }

    #[must_use]
    pub fn true_false(id: impl Into<String>, correct: bool) -> Self {
        Self {
            correct_answer: Some(CorrectAnswerDraft::Flag(correct)),
            ..Self::base(id, Variant::TrueFalse)
        }
    }

    #[must_use]
    pub fn free_text(id: impl Into<String>, points: i64, time_estimate_minutes: u32) -> Self {
        Self {
            points: Some(points),
            time_estimate_minutes: Some(time_estimate_minutes),
            ..Self::base(id, Variant::FreeText)
        }
    }

    #[must_use]
    pub fn with_points(mut self, points: i64) -> Self {
        self.points = Some(points);
        self
    }

    #[must_use]
    pub fn with_section(mut self, section: impl Into<String>) -> Self {
        self.section = section.into();
        self
    }

    #[must_use]
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    #[must_use]
    pub fn with_difficulty(mut self, difficulty: Difficulty) -> Self {
        self.difficulty = difficulty.as_str().to_owned();
        self
    }

    #[must_use]
    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    /// Validate a single draft; `position` is used for violation messages only.
    fn validate_at(self, position: usize, out: &mut Vec<Violation>) -> Option<Question> {
        let id = self.id.trim().to_owned();
        let before = out.len();

        if id.is_empty() {
            out.push(Violation::BlankId { position });
        }

        let variant = Variant::parse(&self.variant);
        if variant.is_none() {
            out.push(Violation::UnknownVariant {
                position,
                id: id.clone(),
                value: self.variant.clone(),
            });
        }

        let difficulty = Difficulty::parse(&self.difficulty);
        if difficulty.is_none() {
            out.push(Violation::UnknownDifficulty {
                position,
                id: id.clone(),
                value: self.difficulty.clone(),
            });
        }

        let points = match self.points {
            Some(p) if p <= 0 => {
                out.push(Violation::NonPositivePoints {
                    position,
                    id: id.clone(),
                    points: p,
                });
                None
            }
            Some(p) => match u32::try_from(p) {
                Ok(p) => Some(p),
                Err(_) => {
                    out.push(Violation::NonPositivePoints {
                        position,
                        id: id.clone(),
                        points: p,
                    });
                    None
                }
            },
            None => None,
        };

        let kind = match variant {
            Some(Variant::SingleChoice) => {
                single_choice_kind(position, &id, self.options, self.correct_answer, out)
            }
            Some(Variant::TrueFalse) => true_false_kind(position, &id, self.correct_answer, out),
            Some(Variant::FreeText) => {
                if self.points.is_none() {
                    out.push(Violation::MissingPoints {
                        position,
                        id: id.clone(),
                    });
                }
                match self.time_estimate_minutes {
                    Some(minutes) => Some(QuestionKind::FreeText {
                        time_estimate_minutes: minutes,
                        grading_criteria: self
                            .grading_criteria
                            .into_iter()
                            .map(|c| c.trim().to_owned())
                            .filter(|c| !c.is_empty())
                            .collect(),
                    }),
                    None => {
                        out.push(Violation::MissingTimeEstimate {
                            position,
                            id: id.clone(),
                        });
                        None
                    }
                }
            }
            None => None,
        };

        if out.len() != before {
            return None;
        }

        Some(Question {
            id: QuestionId::new(id),
            section: self.section.trim().to_owned(),
            category: self.category.trim().to_owned(),
            difficulty: difficulty?,
            prompt: self.prompt,
            explanation: self.explanation,
            points: points.unwrap_or(1),
            kind: kind?,
        })
    }
}

fn single_choice_kind(
    position: usize,
    id: &str,
    options: Option<Vec<String>>,
    correct: Option<CorrectAnswerDraft>,
    out: &mut Vec<Violation>,
) -> Option<QuestionKind> {
    let options = options.unwrap_or_default();
    if options.len() < 2 {
        out.push(Violation::TooFewOptions {
            position,
            id: id.to_owned(),
            count: options.len(),
        });
        return None;
    }

    let correct = match correct {
        Some(CorrectAnswerDraft::Index(index)) => match usize::try_from(index) {
            Ok(i) if i < options.len() => i,
            _ => {
                out.push(Violation::OptionOutOfRange {
                    position,
                    id: id.to_owned(),
                    index,
                    count: options.len(),
                });
                return None;
            }
        },
        Some(CorrectAnswerDraft::Text(text)) => {
            let wanted = text.trim();
            if let Some(i) = options.iter().position(|o| o.trim() == wanted) {
                i
            } else {
                out.push(Violation::UnknownOption {
                    position,
                    id: id.to_owned(),
                    text,
                });
                return None;
            }
        }
        Some(CorrectAnswerDraft::Flag(_)) | None => {
            out.push(Violation::MissingCorrectAnswer {
                position,
                id: id.to_owned(),
            });
            return None;
        }
    };

    Some(QuestionKind::SingleChoice { options, correct })
}

fn true_false_kind(
    position: usize,
    id: &str,
    correct: Option<CorrectAnswerDraft>,
    out: &mut Vec<Violation>,
) -> Option<QuestionKind> {
    let correct = match correct {
        Some(CorrectAnswerDraft::Flag(flag)) => Some(flag),
        Some(CorrectAnswerDraft::Text(text)) => match text.trim().to_ascii_lowercase().as_str() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        },
        Some(CorrectAnswerDraft::Index(_)) => None,
        None => {
            out.push(Violation::MissingCorrectAnswer {
                position,
                id: id.to_owned(),
            });
            return None;
        }
    };

    match correct {
        Some(correct) => Some(QuestionKind::TrueFalse { correct }),
        None => {
            out.push(Violation::InvalidTrueFalse {
                position,
                id: id.to_owned(),
            });
            None
        }
    }
}

//
// ─── BANK ──────────────────────────────────────────────────────────────────────
//

/// Validated, non-empty, ordered list of questions. Only built through validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionBank {
    questions: Vec<Question>,
}

impl QuestionBank {
    /// Validate and normalize raw drafts into a bank.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` listing every violation when any draft is malformed,
    /// ids collide, or the input is empty.
    pub fn validate(
        drafts: impl IntoIterator<Item = QuestionDraft>,
    ) -> Result<Self, ValidationError> {
        let mut violations = Vec::new();
        let mut seen = HashSet::new();
        let mut questions = Vec::new();
        let mut count = 0_usize;

        for (position, draft) in drafts.into_iter().enumerate() {
            count += 1;
            let id = draft.id.trim().to_owned();
            if !id.is_empty() && !seen.insert(id.clone()) {
                violations.push(Violation::DuplicateId { position, id });
            }
            if let Some(question) = draft.validate_at(position, &mut violations) {
                questions.push(question);
            }
        }

        if count == 0 {
            violations.push(Violation::EmptyBank);
        }

        if violations.is_empty() {
            Ok(Self { questions })
        } else {
            Err(ValidationError { violations })
        }
    }

    #[must_use]
    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.questions.len()
    }

    /// Always false for a validated bank; provided for API symmetry.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    #[must_use]
    pub fn get(&self, id: &QuestionId) -> Option<&Question> {
        self.questions.iter().find(|q| q.id() == id)
    }

    #[must_use]
    pub fn total_points(&self) -> u64 {
        self.questions.iter().map(|q| u64::from(q.points())).sum()
    }

    /// Sum of time estimates over free-text questions, in minutes.
    #[must_use]
    pub fn estimated_minutes(&self) -> u32 {
        self.questions
            .iter()
            .filter_map(Question::time_estimate_minutes)
            .fold(0_u32, u32::saturating_add)
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
