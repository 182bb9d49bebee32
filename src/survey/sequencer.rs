//! Step sequencer: the wizard's state machine.
//!
//! Owns the position, the working selection for the current step and the
//! accumulator. All transitions go through here so position changes,
//! selection resets and submission gating stay in one place. Timing
//! (auto-advance, analysis phases) is layered on by the session.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;

use super::answers::{Accumulator, AnswerRecord, AnswerValue};
use super::catalog::{StepCatalog, StepDefinition};
use super::rules::RuleBook;
use super::submission::{SubmitFailure, SubmitOutcome};
use super::validator::{validate, Rejection, Verdict};
use crate::error::WizardError;

/// Submission lifecycle of the final step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SubmissionStatus {
    Idle,
    InFlight,
    Succeeded { id: String },
    Failed { failure: SubmitFailure },
}

impl SubmissionStatus {
    /// While locked the sequencer ignores every user intent.
    pub fn is_locked(&self) -> bool {
        matches!(self, Self::InFlight | Self::Succeeded { .. })
    }
}

/// Which auto-advance delay applies to a pick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoDelay {
    /// A single-choice pick.
    Choice,
    /// The exclusive option on a compact or grid step.
    Exclusive,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectOutcome {
    /// Selection changed; waits for an explicit commit.
    Updated,
    /// Selection changed; the step should commit after the given delay.
    AutoCommit(AutoDelay),
    /// The pick was refused. Nothing will advance.
    Rejected(Rejection),
    /// A submission is running or finished.
    Ignored,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    Advanced { position: usize },
    Rejected(Rejection),
    /// The final step was committed. The record is stamped and the
    /// sequencer stays locked until `finish_submission`.
    Submit(AnswerRecord),
    Ignored,
}

/// Everything a renderer needs for the current step.
#[derive(Debug, Clone, Serialize)]
pub struct StepView {
    pub position: usize,
    pub total_steps: usize,
    pub progress_percent: u8,
    pub step: StepDefinition,
    pub selection: Vec<String>,
    pub text: String,
    /// Whether committing now would be accepted.
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection: Option<Rejection>,
    pub submission: SubmissionStatus,
}

pub struct Sequencer {
    catalog: Arc<StepCatalog>,
    rules: Arc<RuleBook>,
    answers: Accumulator,
    position: usize,
    selection: Vec<String>,
    draft: String,
    notice: Option<Rejection>,
    /// Step id of an age gate whose underage option was picked. Cleared only
    /// by picking a different option on that step.
    underage_step: Option<String>,
    status: SubmissionStatus,
}

impl Sequencer {
    pub fn new(catalog: Arc<StepCatalog>, rules: Arc<RuleBook>) -> Self {
        Self {
            catalog,
            rules,
            answers: Accumulator::new(),
            position: 1,
            selection: Vec::new(),
            draft: String::new(),
            notice: None,
            underage_step: None,
            status: SubmissionStatus::Idle,
        }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn total_steps(&self) -> usize {
        self.catalog.total_steps()
    }

    pub fn current_step(&self) -> &StepDefinition {
        &self.catalog.steps()[self.position - 1]
    }

    pub fn status(&self) -> &SubmissionStatus {
        &self.status
    }

    pub fn record(&self) -> AnswerRecord {
        self.answers.snapshot()
    }

    /// Fields for a local snapshot.
    pub fn session_fields(&self) -> BTreeMap<String, AnswerValue> {
        self.answers.session_view()
    }

    /// Pick an option on a choice step.
    pub fn select(&mut self, option: &str) -> Result<SelectOutcome, WizardError> {
        if self.status.is_locked() {
            return Ok(SelectOutcome::Ignored);
        }
        let catalog = Arc::clone(&self.catalog);
        let step = &catalog.steps()[self.position - 1];

        if !step.kind.is_single_choice() && !step.kind.is_multi_select() {
            return Err(WizardError::NotAChoiceStep {
                step_id: step.id.clone(),
            });
        }
        if !step.has_option(option) {
            let rejection = Rejection::UnknownOption {
                option: option.to_string(),
            };
            self.notice = Some(rejection.clone());
            return Ok(SelectOutcome::Rejected(rejection));
        }
        self.notice = None;

        if step.kind.is_single_choice() {
            self.selection = vec![option.to_string()];
            if step.underage_option.as_deref() == Some(option) {
                tracing::info!(step = %step.id, "Underage option picked, blocking");
                self.underage_step = Some(step.id.clone());
                return Ok(SelectOutcome::Rejected(Rejection::Underage));
            }
            if self.underage_step.as_deref() == Some(step.id.as_str()) {
                self.underage_step = None;
            }
            return Ok(SelectOutcome::AutoCommit(AutoDelay::Choice));
        }

        if self.rules.toggle(step, &mut self.selection, option) {
            Ok(SelectOutcome::AutoCommit(AutoDelay::Exclusive))
        } else {
            Ok(SelectOutcome::Updated)
        }
    }

    /// Replace the typed draft on a text step. Returns false while locked.
    pub fn set_text(&mut self, value: &str) -> Result<bool, WizardError> {
        if self.status.is_locked() {
            return Ok(false);
        }
        let step = self.current_step();
        if !step.kind.is_text() {
            return Err(WizardError::NotATextStep {
                step_id: step.id.clone(),
            });
        }
        self.draft = value.to_string();
        self.notice = None;
        Ok(true)
    }

    /// Validate the current candidate and advance, or submit on the last
    /// step.
    pub fn commit(&mut self) -> CommitOutcome {
        if self.status.is_locked() {
            return CommitOutcome::Ignored;
        }
        let catalog = Arc::clone(&self.catalog);
        let step = &catalog.steps()[self.position - 1];

        if self.underage_step.as_deref() == Some(step.id.as_str()) {
            return self.reject(step, Rejection::Underage);
        }
        let candidate = self.candidate(step);
        if let Verdict::Rejected(rejection) = validate(step, candidate.as_ref()) {
            if rejection.is_underage() {
                self.underage_step = Some(step.id.clone());
            }
            return self.reject(step, rejection);
        }

        if let Some(value) = candidate {
            let derived = self.answers.merge_answer(&self.rules, step, value);
            if !derived.is_empty() {
                tracing::debug!(step = %step.id, ?derived, "Derived fields merged");
            }
        }
        self.notice = None;

        if self.position == catalog.total_steps() {
            self.answers.stamp_submitted(Utc::now());
            self.status = SubmissionStatus::InFlight;
            tracing::info!(step = %step.id, "Final step committed, submitting");
            return CommitOutcome::Submit(self.answers.snapshot());
        }

        self.move_to(self.position + 1);
        CommitOutcome::Advanced {
            position: self.position,
        }
    }

    /// Advance past a step that takes no input.
    pub fn proceed(&mut self) -> Result<CommitOutcome, WizardError> {
        let step = self.current_step();
        if !step.kind.is_passive() {
            return Err(WizardError::NotProceedable {
                step_id: step.id.clone(),
            });
        }
        Ok(self.commit())
    }

    /// Go back one step. Answers already merged are kept. Returns whether
    /// the position moved.
    pub fn back(&mut self) -> bool {
        if self.status.is_locked() || self.position == 1 {
            return false;
        }
        if matches!(self.status, SubmissionStatus::Failed { .. }) {
            self.status = SubmissionStatus::Idle;
        }
        self.move_to(self.position - 1);
        true
    }

    /// Record the outcome of the submission started by `commit`.
    pub fn finish_submission(&mut self, outcome: SubmitOutcome) -> &SubmissionStatus {
        if self.status != SubmissionStatus::InFlight {
            tracing::warn!("Submission outcome arrived with no submission in flight");
            return &self.status;
        }
        self.status = match outcome {
            Ok(id) => SubmissionStatus::Succeeded { id },
            Err(failure) => SubmissionStatus::Failed { failure },
        };
        &self.status
    }

    /// Resume from a stored position and answers. Stored answers that no
    /// longer validate against their step are dropped.
    pub fn restore(
        &mut self,
        position: usize,
        fields: BTreeMap<String, AnswerValue>,
    ) -> Result<(), WizardError> {
        self.catalog.step_at(position)?;

        let kept = fields
            .into_iter()
            .filter(|(field, value)| match self.catalog.step(field) {
                Some(step) => validate(step, Some(value)).is_accepted(),
                None => true,
            })
            .collect();
        self.answers = Accumulator::from_fields(kept);
        self.status = SubmissionStatus::Idle;
        self.underage_step = None;
        self.move_to(position);
        Ok(())
    }

    /// Start over with an empty record. Refused while a submission is in
    /// flight; returns whether the reset happened.
    pub fn reset(&mut self) -> bool {
        if self.status == SubmissionStatus::InFlight {
            return false;
        }
        self.answers.clear();
        self.status = SubmissionStatus::Idle;
        self.underage_step = None;
        self.move_to(1);
        true
    }

    pub fn view(&self) -> StepView {
        let step = self.current_step();
        let total = self.catalog.total_steps();
        let rejection = if self.underage_step.as_deref() == Some(step.id.as_str()) {
            Some(Rejection::Underage)
        } else {
            self.notice.clone()
        };
        let ready = !self.status.is_locked()
            && rejection.as_ref().is_none_or(|r| !r.is_underage())
            && validate(step, self.candidate(step).as_ref()).is_accepted();

        StepView {
            position: self.position,
            total_steps: total,
            progress_percent: ((self.position * 100 + total / 2) / total) as u8,
            step: step.clone(),
            selection: self.selection.clone(),
            text: self.draft.clone(),
            ready,
            rejection,
            submission: self.status.clone(),
        }
    }

    fn candidate(&self, step: &StepDefinition) -> Option<AnswerValue> {
        if step.kind.is_single_choice() {
            self.selection.first().cloned().map(AnswerValue::Text)
        } else if step.kind.is_multi_select() {
            Some(AnswerValue::Choices(self.selection.clone()))
        } else if step.kind.is_text() {
            let text = self.draft.trim();
            if text.is_empty() && !step.required {
                None
            } else {
                Some(AnswerValue::Text(text.to_string()))
            }
        } else {
            None
        }
    }

    fn reject(&mut self, step: &StepDefinition, rejection: Rejection) -> CommitOutcome {
        tracing::debug!(step = %step.id, %rejection, "Commit rejected");
        self.notice = Some(rejection.clone());
        CommitOutcome::Rejected(rejection)
    }

    /// Jump to `position` and reload the working selection from the record.
    fn move_to(&mut self, position: usize) {
        self.position = position;
        let step = &self.catalog.steps()[position - 1];
        let stored = self.answers.get(&step.id);
        self.selection = match stored {
            Some(value) if !step.kind.is_text() => value.to_selection(),
            _ => Vec::new(),
        };
        self.draft = stored
            .filter(|_| step.kind.is_text())
            .and_then(AnswerValue::as_text)
            .unwrap_or_default()
            .to_string();
        self.notice = None;
        tracing::debug!(position, step = %step.id, "Moved to step");
    }
}
