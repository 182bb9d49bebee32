//! Wizard session: one actor task per survey run.
//!
//! A `WizardSession` is a cheap, cloneable handle. Every intent is sent to
//! the actor over an mpsc channel and answered over a oneshot, so intents
//! are applied one at a time in arrival order. The actor owns the
//! `Sequencer` and layers the timed behaviour on top of it:
//!
//! - debounced auto-advance after single-choice and exclusive picks
//! - the analysis animation on computed-transition steps
//! - the submission round trip, run on its own task
//! - snapshot writes, handed to a background writer
//!
//! Timer and submission tasks report back as internal intents. A timer that
//! fires after the position moved on is ignored.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info, warn};

use super::answers::AnswerRecord;
use super::catalog::{StepCatalog, StepKind};
use super::persistence::{spawn_snapshot_writer, SessionSnapshot, SessionStore, SnapshotWrite};
use super::rules::RuleBook;
use super::sequencer::{
    AutoDelay, CommitOutcome, SelectOutcome, Sequencer, StepView, SubmissionStatus,
};
use super::submission::{SubmissionAdapter, SubmitFailure, SubmitOutcome};
use super::timers::AutoAdvance;
use super::validator::Rejection;
use crate::config::WizardConfig;
use crate::error::{Error, WizardError};

/// Labels of the analysis animation, in display order.
pub const ANALYSIS_PHASES: [&str; 5] = [
    "Analyzing your preferences...",
    "Finding compatible personalities...",
    "Matching with potential partners...",
    "Calculating compatibility scores...",
    "Finalizing your matches...",
];

const INTENT_CAPACITY: usize = 32;
const EVENT_CAPACITY: usize = 128;

/// Something observers of a session may want to render.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WizardEvent {
    StepChanged { position: usize, step_id: String },
    Rejected { step_id: String, rejection: Rejection },
    AnalysisPhase { index: usize, label: String },
    SubmissionStarted,
    Submitted { id: String },
    SubmissionFailed { failure: SubmitFailure },
}

/// Collaborators a session is built from.
pub struct SessionDeps {
    pub catalog: Arc<StepCatalog>,
    pub rules: Arc<RuleBook>,
    pub adapter: Arc<SubmissionAdapter>,
    pub store: Arc<dyn SessionStore>,
    pub config: WizardConfig,
}

enum Intent {
    Select {
        option: String,
        reply: oneshot::Sender<Result<SelectOutcome, WizardError>>,
    },
    SetText {
        value: String,
        reply: oneshot::Sender<Result<bool, WizardError>>,
    },
    Commit {
        reply: oneshot::Sender<CommitOutcome>,
    },
    Proceed {
        reply: oneshot::Sender<Result<CommitOutcome, WizardError>>,
    },
    Back {
        reply: oneshot::Sender<bool>,
    },
    View {
        reply: oneshot::Sender<StepView>,
    },
    Record {
        reply: oneshot::Sender<AnswerRecord>,
    },
    Reset {
        reply: oneshot::Sender<bool>,
    },
    ScheduledCommit {
        position: usize,
    },
    AnalysisPhase {
        position: usize,
        index: usize,
    },
    SubmissionDone {
        outcome: SubmitOutcome,
    },
}

/// Handle to a running wizard session.
#[derive(Clone)]
pub struct WizardSession {
    intents: mpsc::Sender<Intent>,
    events: broadcast::Sender<WizardEvent>,
}

impl WizardSession {
    /// Load any stored snapshot for `session_key` and spawn the session.
    pub async fn start(deps: SessionDeps, session_key: impl Into<String>) -> Result<Self, Error> {
        let session_key = session_key.into();
        let mut sequencer = Sequencer::new(deps.catalog, deps.rules);

        if let Some(snapshot) = deps.store.load(&session_key).await? {
            let position = snapshot.position;
            sequencer.restore(position, snapshot.answers)?;
            info!(session = %session_key, position, "Resuming saved session");
        } else {
            info!(session = %session_key, "Starting new session");
        }

        let (tx, rx) = mpsc::channel(INTENT_CAPACITY);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        let actor = SessionActor {
            sequencer,
            adapter: deps.adapter,
            config: deps.config,
            timers: AutoAdvance::new(),
            intents: tx.downgrade(),
            events: events.clone(),
            snapshots: spawn_snapshot_writer(deps.store, session_key.clone()),
            session_key,
        };
        tokio::spawn(actor.run(rx));

        Ok(Self {
            intents: tx,
            events,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WizardEvent> {
        self.events.subscribe()
    }

    pub async fn select(&self, option: &str) -> Result<SelectOutcome, WizardError> {
        let option = option.to_string();
        self.request(|reply| Intent::Select { option, reply }).await?
    }

    pub async fn set_text(&self, value: &str) -> Result<bool, WizardError> {
        let value = value.to_string();
        self.request(|reply| Intent::SetText { value, reply }).await?
    }

    pub async fn commit(&self) -> Result<CommitOutcome, WizardError> {
        self.request(|reply| Intent::Commit { reply }).await
    }

    pub async fn proceed(&self) -> Result<CommitOutcome, WizardError> {
        self.request(|reply| Intent::Proceed { reply }).await?
    }

    pub async fn back(&self) -> Result<bool, WizardError> {
        self.request(|reply| Intent::Back { reply }).await
    }

    pub async fn view(&self) -> Result<StepView, WizardError> {
        self.request(|reply| Intent::View { reply }).await
    }

    pub async fn record(&self) -> Result<AnswerRecord, WizardError> {
        self.request(|reply| Intent::Record { reply }).await
    }

    /// Start over and forget the stored snapshot. Returns `false` while a
    /// submission is in flight.
    pub async fn reset(&self) -> Result<bool, WizardError> {
        self.request(|reply| Intent::Reset { reply }).await
    }

    async fn request<T>(
        &self,
        intent: impl FnOnce(oneshot::Sender<T>) -> Intent,
    ) -> Result<T, WizardError> {
        let (reply, rx) = oneshot::channel();
        self.intents
            .send(intent(reply))
            .await
            .map_err(|_| WizardError::SessionClosed)?;
        rx.await.map_err(|_| WizardError::SessionClosed)
    }
}

struct SessionActor {
    session_key: String,
    sequencer: Sequencer,
    adapter: Arc<SubmissionAdapter>,
    config: WizardConfig,
    timers: AutoAdvance,
    /// Weak: only `WizardSession` handles keep the actor running.
    intents: mpsc::WeakSender<Intent>,
    events: broadcast::Sender<WizardEvent>,
    snapshots: mpsc::UnboundedSender<SnapshotWrite>,
}

impl SessionActor {
    async fn run(mut self, mut rx: mpsc::Receiver<Intent>) {
        self.enter_step();
        while let Some(intent) = rx.recv().await {
            self.handle(intent);
        }
        self.timers.cancel_all();
        debug!(session = %self.session_key, "Session closed");
    }

    fn handle(&mut self, intent: Intent) {
        match intent {
            Intent::Select { option, reply } => {
                let step_id = self.sequencer.current_step().id.clone();
                let result = self.sequencer.select(&option);
                match &result {
                    Ok(SelectOutcome::AutoCommit(delay)) => self.schedule_commit(&step_id, *delay),
                    Ok(SelectOutcome::Rejected(rejection)) => {
                        self.timers.cancel(&step_id);
                        self.emit(WizardEvent::Rejected {
                            step_id,
                            rejection: rejection.clone(),
                        });
                    }
                    Ok(SelectOutcome::Updated) => {
                        self.timers.cancel(&step_id);
                    }
                    Ok(SelectOutcome::Ignored) | Err(_) => {}
                }
                let _ = reply.send(result);
            }
            Intent::SetText { value, reply } => {
                let _ = reply.send(self.sequencer.set_text(&value));
            }
            Intent::Commit { reply } => {
                let step_id = self.sequencer.current_step().id.clone();
                self.timers.cancel(&step_id);
                let outcome = self.sequencer.commit();
                self.after_commit(&outcome);
                let _ = reply.send(outcome);
            }
            Intent::Proceed { reply } => {
                let step_id = self.sequencer.current_step().id.clone();
                let result = self.sequencer.proceed();
                if let Ok(outcome) = &result {
                    self.timers.cancel(&step_id);
                    self.after_commit(outcome);
                }
                let _ = reply.send(result);
            }
            Intent::Back { reply } => {
                let moved = self.sequencer.back();
                if moved {
                    self.timers.cancel_all();
                    self.persist();
                    self.emit_step_changed();
                    self.enter_step();
                }
                let _ = reply.send(moved);
            }
            Intent::View { reply } => {
                let _ = reply.send(self.sequencer.view());
            }
            Intent::Record { reply } => {
                let _ = reply.send(self.sequencer.record());
            }
            Intent::Reset { reply } => {
                let reset = self.sequencer.reset();
                if reset {
                    self.timers.cancel_all();
                    let _ = self.snapshots.send(SnapshotWrite::Clear);
                    info!(session = %self.session_key, "Session reset");
                    self.emit_step_changed();
                    self.enter_step();
                } else {
                    debug!(session = %self.session_key, "Reset refused while submitting");
                }
                let _ = reply.send(reset);
            }
            Intent::ScheduledCommit { position } => {
                if position != self.sequencer.position() {
                    debug!(position, current = self.sequencer.position(), "Stale auto-advance ignored");
                    return;
                }
                let outcome = self.sequencer.commit();
                self.after_commit(&outcome);
            }
            Intent::AnalysisPhase { position, index } => {
                if position == self.sequencer.position() {
                    self.emit(WizardEvent::AnalysisPhase {
                        index,
                        label: ANALYSIS_PHASES[index].to_string(),
                    });
                }
            }
            Intent::SubmissionDone { outcome } => {
                match self.sequencer.finish_submission(outcome).clone() {
                    SubmissionStatus::Succeeded { id } => {
                        let _ = self.snapshots.send(SnapshotWrite::Clear);
                        self.emit(WizardEvent::Submitted { id });
                    }
                    SubmissionStatus::Failed { failure } => {
                        self.emit(WizardEvent::SubmissionFailed { failure });
                    }
                    SubmissionStatus::Idle | SubmissionStatus::InFlight => {}
                }
            }
        }
    }

    fn after_commit(&mut self, outcome: &CommitOutcome) {
        match outcome {
            CommitOutcome::Advanced { .. } => {
                self.persist();
                self.emit_step_changed();
                self.enter_step();
            }
            CommitOutcome::Rejected(rejection) => {
                self.emit(WizardEvent::Rejected {
                    step_id: self.sequencer.current_step().id.clone(),
                    rejection: rejection.clone(),
                });
            }
            CommitOutcome::Submit(record) => {
                self.emit(WizardEvent::SubmissionStarted);
                self.spawn_submission(record.clone());
            }
            CommitOutcome::Ignored => {}
        }
    }

    /// Start whatever runs on its own when a step is entered.
    fn enter_step(&mut self) {
        let step = self.sequencer.current_step();
        if step.kind != StepKind::ComputedTransition {
            return;
        }
        let step_id = step.id.clone();
        let position = self.sequencer.position();
        let phase_delay = self.config.analysis_phase_delay;
        let settle_delay = self.config.analysis_settle_delay;
        let intents = self.intents.clone();

        self.timers.schedule(&step_id, async move {
            for index in 0..ANALYSIS_PHASES.len() {
                if index > 0 {
                    tokio::time::sleep(phase_delay).await;
                }
                if !send_weak(&intents, Intent::AnalysisPhase { position, index }).await {
                    return;
                }
            }
            tokio::time::sleep(settle_delay).await;
            send_weak(&intents, Intent::ScheduledCommit { position }).await;
        });
    }

    fn schedule_commit(&mut self, step_id: &str, delay: AutoDelay) {
        let delay: Duration = match delay {
            AutoDelay::Choice => self.config.choice_delay,
            AutoDelay::Exclusive => self.config.exclusive_delay,
        };
        let position = self.sequencer.position();
        let intents = self.intents.clone();
        self.timers.schedule_after(step_id, delay, async move {
            send_weak(&intents, Intent::ScheduledCommit { position }).await;
        });
    }

    fn spawn_submission(&self, record: AnswerRecord) {
        let Some(intents) = self.intents.upgrade() else {
            warn!(session = %self.session_key, "Session closing, submission dropped");
            return;
        };
        let adapter = Arc::clone(&self.adapter);
        tokio::spawn(async move {
            let outcome = adapter.submit(&record).await;
            let _ = intents.send(Intent::SubmissionDone { outcome }).await;
        });
    }

    fn persist(&self) {
        let snapshot = SessionSnapshot {
            position: self.sequencer.position(),
            answers: self.sequencer.session_fields(),
        };
        let _ = self.snapshots.send(SnapshotWrite::Save(snapshot));
    }

    fn emit_step_changed(&self) {
        self.emit(WizardEvent::StepChanged {
            position: self.sequencer.position(),
            step_id: self.sequencer.current_step().id.clone(),
        });
    }

    fn emit(&self, event: WizardEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

async fn send_weak(intents: &mpsc::WeakSender<Intent>, intent: Intent) -> bool {
    match intents.upgrade() {
        Some(tx) => tx.send(intent).await.is_ok(),
        None => false,
    }
}
