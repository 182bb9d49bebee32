//! Per-step validation of candidate answers.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::answers::AnswerValue;
use super::catalog::{StepDefinition, StepKind, NONE_OF_THE_ABOVE};

/// Message shown for the age-gate rejection.
pub const UNDERAGE_MESSAGE: &str = "Oops! You are not allowed to join if you are under 18";

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap());

/// Why a candidate answer was refused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Rejection {
    /// Nothing chosen or typed. Carries the step's prompt.
    Empty { message: String },
    /// A value that is not among the step's options.
    UnknownOption { option: String },
    /// A single-choice step received a list, or vice versa.
    WrongShape,
    /// An exclusive option picked together with others.
    ExclusiveConflict { option: String },
    /// Text that is not `local@domain.tld`.
    InvalidEmail,
    /// The age gate's blocked option.
    Underage,
}

impl Rejection {
    /// Whether this is a policy block rather than a field error.
    pub fn is_underage(&self) -> bool {
        matches!(self, Self::Underage)
    }
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty { message } => write!(f, "{message}"),
            Self::UnknownOption { option } => write!(f, "\"{option}\" is not one of the choices"),
            Self::WrongShape => write!(f, "Unexpected answer shape for this step"),
            Self::ExclusiveConflict { option } => {
                write!(f, "\"{option}\" cannot be combined with other choices")
            }
            Self::InvalidEmail => write!(f, "Please enter a valid email address"),
            Self::Underage => write!(f, "{UNDERAGE_MESSAGE}"),
        }
    }
}

/// Result of validating a candidate answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Accepted,
    Rejected(Rejection),
}

impl Verdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }
}

/// Check `value` against `step`. Passive steps accept anything, including
/// no value at all.
pub fn validate(step: &StepDefinition, value: Option<&AnswerValue>) -> Verdict {
    match verdict(step, value) {
        Ok(()) => Verdict::Accepted,
        Err(rejection) => Verdict::Rejected(rejection),
    }
}

fn verdict(step: &StepDefinition, value: Option<&AnswerValue>) -> Result<(), Rejection> {
    let empty = || Rejection::Empty {
        message: step.empty_message.clone(),
    };

    match step.kind {
        StepKind::InformationalDisplay | StepKind::ComputedTransition => Ok(()),

        StepKind::SingleChoice | StepKind::GenderChoice | StepKind::AgeGate => {
            let choice = match value {
                None => return Err(empty()),
                Some(AnswerValue::Text(s)) => s,
                Some(AnswerValue::Choices(_)) => return Err(Rejection::WrongShape),
            };
            if choice.is_empty() {
                return Err(empty());
            }
            if !step.has_option(choice) {
                return Err(Rejection::UnknownOption {
                    option: choice.clone(),
                });
            }
            if step.kind == StepKind::AgeGate
                && step.underage_option.as_deref() == Some(choice.as_str())
            {
                return Err(Rejection::Underage);
            }
            Ok(())
        }

        StepKind::MultiSelect | StepKind::CompactMultiSelect | StepKind::GridMultiSelect => {
            let picks = match value {
                None => return Err(empty()),
                Some(AnswerValue::Choices(picks)) => picks,
                Some(AnswerValue::Text(_)) => return Err(Rejection::WrongShape),
            };
            if picks.is_empty() {
                return Err(empty());
            }
            if let Some(unknown) = picks.iter().find(|p| !step.has_option(p)) {
                return Err(Rejection::UnknownOption {
                    option: unknown.clone(),
                });
            }
            if picks.len() > 1 && picks.iter().any(|p| p == NONE_OF_THE_ABOVE) {
                return Err(Rejection::ExclusiveConflict {
                    option: NONE_OF_THE_ABOVE.to_string(),
                });
            }
            Ok(())
        }

        StepKind::FreeText => {
            let text = match value {
                None => "",
                Some(AnswerValue::Text(s)) => s.as_str(),
                Some(AnswerValue::Choices(_)) => return Err(Rejection::WrongShape),
            };
            if step.required && text.trim().is_empty() {
                return Err(empty());
            }
            Ok(())
        }

        StepKind::EmailInput => {
            let text = match value {
                None => return Err(empty()),
                Some(AnswerValue::Text(s)) => s.trim(),
                Some(AnswerValue::Choices(_)) => return Err(Rejection::WrongShape),
            };
            if text.is_empty() {
                return Err(empty());
            }
            if !is_valid_email(text) {
                return Err(Rejection::InvalidEmail);
            }
            Ok(())
        }
    }
}

/// `local@domain.tld` with no whitespace.
pub fn is_valid_email(candidate: &str) -> bool {
    !candidate.is_empty() && EMAIL_RE.is_match(candidate)
}
