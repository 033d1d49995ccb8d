mod answer;
mod ids;
mod question;
mod result;
mod session;
mod settings;

pub use ids::{AttemptId, ParseAttemptIdError, QuestionId};

pub use answer::{Answer, AnswerValue};
pub use question::{
    CorrectAnswerDraft, Difficulty, Question, QuestionBank, QuestionDraft, QuestionKind,
    ValidationError, Variant, Violation,
};
pub use result::{
    AssessmentResult, AttemptSummary, AttemptSummaryError, Breakdown, ScoredAnswer,
    rounded_percentage,
};
pub use session::{Session, SessionStateError, SessionStatus};
pub use settings::{
    AssessmentSettings, AssessmentSettingsDraft, DEFAULT_AUTOSAVE_QUIET_MS,
    DEFAULT_PASS_THRESHOLD_PERCENT, FeedbackTier, SettingsError,
};
