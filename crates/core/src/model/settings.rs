use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::result::AssessmentResult;

/// Default pass threshold, in percent.
pub const DEFAULT_PASS_THRESHOLD_PERCENT: u8 = 70;

/// Default autosave quiet period, in milliseconds.
pub const DEFAULT_AUTOSAVE_QUIET_MS: u64 = 5_000;

/// Percentage at or above which a result is rated `Excellent`.
pub const EXCELLENT_PERCENT: u32 = 90;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SettingsError {
    #[error("time limit must be > 0 seconds")]
    InvalidTimeLimit,

    #[error("pass threshold must be between 0 and 100, got {0}")]
    InvalidPassThreshold(u8),

    #[error("autosave quiet period must be > 0 ms")]
    InvalidAutosaveQuiet,

    #[error("invalid settings file: {0}")]
    Parse(String),
}

/// Feedback band for a finished assessment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FeedbackTier {
    Excellent,
    Passed,
    NeedsReview,
}

/// Unvalidated engine options, e.g. as read from a TOML file.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AssessmentSettingsDraft {
    #[serde(alias = "time_limit_seconds")]
    pub time_limit_seconds: Option<u32>,
    #[serde(alias = "pass_threshold_percent")]
    pub pass_threshold_percent: Option<u8>,
    #[serde(alias = "autosave_quiet_ms")]
    pub autosave_quiet_ms: Option<u64>,
}

impl AssessmentSettingsDraft {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the draft, filling in defaults for omitted options.
    ///
    /// # Errors
    ///
    /// Returns `SettingsError` when a present option is out of range.
    pub fn validate(self) -> Result<AssessmentSettings, SettingsError> {
        if self.time_limit_seconds == Some(0) {
            return Err(SettingsError::InvalidTimeLimit);
        }
        let pass_threshold_percent = self
            .pass_threshold_percent
            .unwrap_or(DEFAULT_PASS_THRESHOLD_PERCENT);
        if pass_threshold_percent > 100 {
            return Err(SettingsError::InvalidPassThreshold(pass_threshold_percent));
        }
        let autosave_quiet_ms = self.autosave_quiet_ms.unwrap_or(DEFAULT_AUTOSAVE_QUIET_MS);
        if autosave_quiet_ms == 0 {
            return Err(SettingsError::InvalidAutosaveQuiet);
        }

        Ok(AssessmentSettings {
            time_limit_secs: self.time_limit_seconds,
            pass_threshold_percent,
            autosave_quiet_ms,
        })
    }
}

/// Validated engine options.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssessmentSettings {
    time_limit_secs: Option<u32>,
    pass_threshold_percent: u8,
    autosave_quiet_ms: u64,
}

impl Default for AssessmentSettings {
    fn default() -> Self {
        Self {
            time_limit_secs: None,
            pass_threshold_percent: DEFAULT_PASS_THRESHOLD_PERCENT,
            autosave_quiet_ms: DEFAULT_AUTOSAVE_QUIET_MS,
        }
    }
}

impl AssessmentSettings {
    /// Parse and validate settings from TOML text.
    ///
    /// # Errors
    ///
    /// Returns `SettingsError::Parse` for malformed TOML, or a validation error.
    pub fn from_toml_str(raw: &str) -> Result<Self, SettingsError> {
        let draft: AssessmentSettingsDraft =
            toml::from_str(raw).map_err(|e| SettingsError::Parse(e.to_string()))?;
        draft.validate()
    }

    /// Default settings with the given time limit.
    ///
    /// # Errors
    ///
    /// Returns `SettingsError::InvalidTimeLimit` for a zero limit.
    pub fn timed(time_limit_secs: u32) -> Result<Self, SettingsError> {
        AssessmentSettingsDraft {
            time_limit_seconds: Some(time_limit_secs),
            ..AssessmentSettingsDraft::default()
        }
        .validate()
    }

    #[must_use]
    pub fn time_limit_secs(&self) -> Option<u32> {
        self.time_limit_secs
    }

    #[must_use]
    pub fn pass_threshold_percent(&self) -> u8 {
        self.pass_threshold_percent
    }

    #[must_use]
    pub fn autosave_quiet_ms(&self) -> u64 {
        self.autosave_quiet_ms
    }

    /// Feedback band for a result under this configuration.
    #[must_use]
    pub fn feedback_tier(&self, result: &AssessmentResult) -> FeedbackTier {
        if result.percentage >= EXCELLENT_PERCENT.max(u32::from(self.pass_threshold_percent)) {
            FeedbackTier::Excellent
        } else if result.percentage >= u32::from(self.pass_threshold_percent) {
            FeedbackTier::Passed
        } else {
            FeedbackTier::NeedsReview
        }
    }

    #[must_use]
    pub fn passed(&self, result: &AssessmentResult) -> bool {
        self.feedback_tier(result) != FeedbackTier::NeedsReview
    }
}
