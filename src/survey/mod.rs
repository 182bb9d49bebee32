//! Survey wizard: step catalog, validation, answer accumulation and the
//! session that sequences a user through the steps.
//!
//! The sequencer is a synchronous state machine; `WizardSession` wraps it in
//! an actor task that adds debounced auto-advance, the analysis animation,
//! local snapshots and the submission round trip.

pub mod answers;
pub mod catalog;
pub mod persistence;
pub mod rules;
pub mod sequencer;
pub mod session;
pub mod submission;
pub mod timers;
pub mod validator;

pub use answers::{Accumulator, AnswerRecord, AnswerValue};
pub use catalog::{StepCatalog, StepDefinition, StepKind};
pub use persistence::{MemorySessionStore, SessionSnapshot, SessionStore, SettingsSessionStore};
pub use rules::{RuleBook, StepRule};
pub use sequencer::{CommitOutcome, SelectOutcome, Sequencer, StepView, SubmissionStatus};
pub use session::{SessionDeps, WizardEvent, WizardSession};
pub use submission::{HttpTransport, SubmissionAdapter, SubmitFailure, SubmitOutcome, SurveyTransport};
pub use validator::{Rejection, Verdict};
