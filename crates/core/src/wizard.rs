//! Room creation wizard
//!
//! A linear five step form. Each step validates its own fields before the
//! wizard advances; stepping back never discards what was entered, and
//! editing a field clears that field's error.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{DebateFormat, DebateLevel, DebateType, RoomRules};
use crate::validation::FieldErrors;
use crate::{Error, Result};

pub const MIN_THEME_LEN: usize = 10;
pub const MAX_DESCRIPTION_LEN: usize = 500;
pub const MIN_TURN_DURATION: u32 = 30;
pub const MAX_TURN_DURATION: u32 = 1800;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WizardStep {
    Theme = 1,
    Description = 2,
    Format = 3,
    Mode = 4,
    Review = 5,
}

impl WizardStep {
    pub const COUNT: u8 = 5;

    pub fn number(&self) -> u8 {
        *self as u8
    }

    pub fn title(&self) -> &'static str {
        match self {
            WizardStep::Theme => "Theme",
            WizardStep::Description => "Description",
            WizardStep::Format => "Format",
            WizardStep::Mode => "Mode",
            WizardStep::Review => "Review",
        }
    }

    pub fn next(&self) -> Option<WizardStep> {
        match self {
            WizardStep::Theme => Some(WizardStep::Description),
            WizardStep::Description => Some(WizardStep::Format),
            WizardStep::Format => Some(WizardStep::Mode),
            WizardStep::Mode => Some(WizardStep::Review),
            WizardStep::Review => None,
        }
    }

    pub fn prev(&self) -> Option<WizardStep> {
        match self {
            WizardStep::Theme => None,
            WizardStep::Description => Some(WizardStep::Theme),
            WizardStep::Format => Some(WizardStep::Description),
            WizardStep::Mode => Some(WizardStep::Format),
            WizardStep::Review => Some(WizardStep::Mode),
        }
    }
}

/// Everything needed to create a room
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomDraft {
    pub theme: String,
    pub description: String,
    pub format: DebateFormat,
    pub debate_type: DebateType,
    pub level: DebateLevel,
    pub rules: RoomRules,
    pub tags: Vec<String>,
    pub scheduled_at: Option<DateTime<Utc>>,
}

impl Default for RoomDraft {
    fn default() -> Self {
        Self {
            theme: String::new(),
            description: String::new(),
            format: DebateFormat::Spoken,
            debate_type: DebateType::HumanVsHuman,
            level: DebateLevel::Intermediate,
            rules: RoomRules::default(),
            tags: Vec::new(),
            scheduled_at: None,
        }
    }
}

impl RoomDraft {
    pub fn new(theme: impl Into<String>) -> Self {
        Self {
            theme: theme.into(),
            ..Self::default()
        }
    }

    /// Errors for the fields owned by one step
    pub fn validate_step(&self, step: WizardStep) -> FieldErrors {
        let mut errors = FieldErrors::new();
        match step {
            WizardStep::Theme => {
                if self.theme.trim().is_empty() {
                    errors.add("theme", "A theme is required");
                } else if self.theme.chars().count() < MIN_THEME_LEN {
                    errors.add(
                        "theme",
                        format!("The theme must be at least {} characters", MIN_THEME_LEN),
                    );
                }
            }
            WizardStep::Description => {
                if self.description.chars().count() > MAX_DESCRIPTION_LEN {
                    errors.add(
                        "description",
                        format!(
                            "The description must be at most {} characters",
                            MAX_DESCRIPTION_LEN
                        ),
                    );
                }
            }
            WizardStep::Format | WizardStep::Mode => {}
            WizardStep::Review => {
                let duration = self.rules.turn_duration;
                if !(MIN_TURN_DURATION..=MAX_TURN_DURATION).contains(&duration) {
                    errors.add(
                        "turn_duration",
                        format!(
                            "Turns last between {} and {} seconds",
                            MIN_TURN_DURATION, MAX_TURN_DURATION
                        ),
                    );
                }
                if self.rules.max_turns == Some(0) {
                    errors.add("max_turns", "Allow at least one turn");
                }
            }
        }
        errors
    }

    /// Validate every step at once
    pub fn validate(&self) -> Result<()> {
        let mut errors = FieldErrors::new();
        let mut step = Some(WizardStep::Theme);
        while let Some(current) = step {
            errors.merge(self.validate_step(current));
            step = current.next();
        }
        errors.into_result()
    }
}

/// Split a comma separated tag list, dropping blanks
pub fn parse_tags(text: &str) -> Vec<String> {
    text.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Clone)]
pub struct RoomWizard {
    step: WizardStep,
    draft: RoomDraft,
    errors: FieldErrors,
}

impl Default for RoomWizard {
    fn default() -> Self {
        Self::new()
    }
}

impl RoomWizard {
    pub fn new() -> Self {
        Self {
            step: WizardStep::Theme,
            draft: RoomDraft::default(),
            errors: FieldErrors::new(),
        }
    }

    pub fn step(&self) -> WizardStep {
        self.step
    }

    pub fn draft(&self) -> &RoomDraft {
        &self.draft
    }

    pub fn errors(&self) -> &FieldErrors {
        &self.errors
    }

    pub fn progress_percent(&self) -> u8 {
        self.step.number() * 100 / WizardStep::COUNT
    }

    pub fn set_theme(&mut self, theme: impl Into<String>) {
        self.draft.theme = theme.into();
        self.errors.clear_field("theme");
    }

    pub fn set_description(&mut self, description: impl Into<String>) {
        self.draft.description = description.into();
        self.errors.clear_field("description");
    }

    pub fn set_tags(&mut self, text: &str) {
        self.draft.tags = parse_tags(text);
        self.errors.clear_field("tags");
    }

    pub fn set_format(&mut self, format: DebateFormat) {
        self.draft.format = format;
    }

    pub fn set_type(&mut self, debate_type: DebateType) {
        self.draft.debate_type = debate_type;
    }

    pub fn set_level(&mut self, level: DebateLevel) {
        self.draft.level = level;
    }

    pub fn set_turn_duration(&mut self, seconds: u32) {
        self.draft.rules.turn_duration = seconds;
        self.errors.clear_field("turn_duration");
    }

    pub fn set_max_turns(&mut self, max_turns: Option<u32>) {
        self.draft.rules.max_turns = max_turns;
        self.errors.clear_field("max_turns");
    }

    pub fn set_rules(&mut self, rules: RoomRules) {
        self.draft.rules = rules;
        self.errors.clear_field("turn_duration");
        self.errors.clear_field("max_turns");
    }

    pub fn set_scheduled_at(&mut self, at: Option<DateTime<Utc>>) {
        self.draft.scheduled_at = at;
        self.errors.clear_field("scheduled_at");
    }

    /// Validate the current step and advance. Returns false when blocked.
    pub fn next(&mut self) -> bool {
        self.errors = self.draft.validate_step(self.step);
        if !self.errors.is_empty() {
            return false;
        }
        match self.step.next() {
            Some(next) => {
                self.step = next;
                true
            }
            None => false,
        }
    }

    /// Go back one step, keeping all entered data
    pub fn back(&mut self) -> bool {
        match self.step.prev() {
            Some(prev) => {
                self.step = prev;
                self.errors = FieldErrors::new();
                true
            }
            None => false,
        }
    }

    /// Validate everything and hand out the finished draft.
    /// On failure the wizard jumps to the first step with an error.
    pub fn submit(&mut self, now: DateTime<Utc>) -> Result<RoomDraft> {
        let mut step = Some(WizardStep::Theme);
        while let Some(current) = step {
            let errors = self.draft.validate_step(current);
            if !errors.is_empty() {
                self.step = current;
                self.errors = errors.clone();
                return Err(Error::Validation(errors));
            }
            step = current.next();
        }

        if let Some(at) = self.draft.scheduled_at {
            if at <= now {
                let mut errors = FieldErrors::new();
                errors.add("scheduled_at", "The start time must be in the future");
                self.step = WizardStep::Review;
                self.errors = errors.clone();
                return Err(Error::Validation(errors));
            }
        }

        self.errors = FieldErrors::new();
        Ok(self.draft.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_theme_boundary() {
        let mut wizard = RoomWizard::new();
        wizard.set_theme("123456789");
        assert!(!wizard.next());
        assert_eq!(wizard.step(), WizardStep::Theme);
        assert!(wizard.errors().contains("theme"));

        wizard.set_theme("1234567890");
        assert!(!wizard.errors().contains("theme"));
        assert!(wizard.next());
        assert_eq!(wizard.step(), WizardStep::Description);
    }

    #[test]
    fn test_blank_theme() {
        let mut wizard = RoomWizard::new();
        wizard.set_theme("            ");
        assert!(!wizard.next());
        assert_eq!(wizard.errors().get("theme"), Some("A theme is required"));
    }

    #[test]
    fn test_description_limit() {
        let mut wizard = RoomWizard::new();
        wizard.set_theme("Free will and determinism");
        assert!(wizard.next());

        wizard.set_description("d".repeat(MAX_DESCRIPTION_LEN + 1));
        assert!(!wizard.next());
        wizard.set_description("d".repeat(MAX_DESCRIPTION_LEN));
        assert!(wizard.next());
        assert_eq!(wizard.step(), WizardStep::Format);
    }

    #[test]
    fn test_back_keeps_data() {
        let mut wizard = RoomWizard::new();
        wizard.set_theme("Free will and determinism");
        assert!(wizard.next());
        wizard.set_description("Compatibilism on trial");
        wizard.set_tags("philosophy, , ethics ");
        assert!(wizard.next());

        assert!(wizard.back());
        assert!(wizard.back());
        assert!(!wizard.back());
        assert_eq!(wizard.step(), WizardStep::Theme);
        assert_eq!(wizard.draft().theme, "Free will and determinism");
        assert_eq!(wizard.draft().description, "Compatibilism on trial");
        assert_eq!(wizard.draft().tags, vec!["philosophy", "ethics"]);
    }

    #[test]
    fn test_walk_to_review() {
        let mut wizard = RoomWizard::new();
        wizard.set_theme("Free will and determinism");
        while wizard.next() {}
        assert_eq!(wizard.step(), WizardStep::Review);
        assert_eq!(wizard.progress_percent(), 100);

        let draft = wizard.submit(Utc::now()).unwrap();
        assert_eq!(draft.level, DebateLevel::Intermediate);
        assert_eq!(draft.rules.turn_duration, 180);
    }

    #[test]
    fn test_submit_jumps_to_failing_step() {
        let mut wizard = RoomWizard::new();
        wizard.set_theme("Short");
        wizard.set_turn_duration(5);

        let result = wizard.submit(Utc::now());
        assert!(matches!(result, Err(Error::Validation(_))));
        assert_eq!(wizard.step(), WizardStep::Theme);
        assert!(wizard.draft().validate().is_err());
    }

    #[test]
    fn test_schedule_must_be_future() {
        let now = Utc::now();
        let mut wizard = RoomWizard::new();
        wizard.set_theme("Free will and determinism");
        wizard.set_scheduled_at(Some(now - Duration::minutes(5)));

        assert!(wizard.submit(now).is_err());
        assert!(wizard.errors().contains("scheduled_at"));

        wizard.set_scheduled_at(Some(now + Duration::hours(1)));
        assert!(wizard.submit(now).is_ok());
    }
}
