//! Terminal driver: runs a wizard session over stdin/stdout.
//!
//! Steps are rendered to stderr. Each input line becomes one intent:
//! a number picks an option, text answers a text step, an empty line
//! continues, `/back`, `/reset` and `/quit` do what they say.

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::error;

use crate::error::{Error, WizardError};
use crate::survey::catalog::StepKind;
use crate::survey::sequencer::{SelectOutcome, StepView, SubmissionStatus};
use crate::survey::session::{WizardEvent, WizardSession};
use crate::survey::submission::SubmitFailure;

/// One parsed input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Next,
    Back,
    Reset,
    Quit,
    Pick(String),
    Text(String),
}

/// Map an input line to a command for the step on screen. `None` means the
/// line made no sense here.
pub fn parse_command(view: &StepView, line: &str) -> Option<Command> {
    let line = line.trim();
    match line {
        "/back" | "/b" => return Some(Command::Back),
        "/reset" => return Some(Command::Reset),
        "/quit" | "/q" => return Some(Command::Quit),
        "" => return Some(Command::Next),
        _ => {}
    }

    let step = &view.step;
    if step.kind.is_single_choice() || step.kind.is_multi_select() {
        if let Ok(n) = line.parse::<usize>() {
            return step
                .options
                .get(n.checked_sub(1)?)
                .map(|o| Command::Pick(o.clone()));
        }
        return step
            .options
            .iter()
            .find(|o| o.eq_ignore_ascii_case(line))
            .map(|o| Command::Pick(o.clone()));
    }
    if step.kind.is_text() {
        return Some(Command::Text(line.to_string()));
    }
    Some(Command::Next)
}

/// Render the current step.
pub fn render(view: &StepView) -> String {
    let step = &view.step;
    let filled = usize::from(view.progress_percent) / 5;
    let mut out = format!(
        "\n[{}/{}] {}{} {}%\n{}\n",
        view.position,
        view.total_steps,
        "#".repeat(filled),
        ".".repeat(20 - filled),
        view.progress_percent,
        step.title,
    );
    if let Some(description) = &step.description {
        out.push_str(&format!("{description}\n"));
    }

    for (i, option) in step.options.iter().enumerate() {
        let picked = view.selection.contains(option);
        let marker = match (step.kind.is_multi_select(), picked) {
            (true, true) => "[x] ",
            (true, false) => "[ ] ",
            (false, true) => "> ",
            (false, false) => "  ",
        };
        out.push_str(&format!("  {:>2}. {marker}{option}\n", i + 1));
    }

    if step.kind.is_text() && !view.text.is_empty() {
        out.push_str(&format!("  current: {}\n", view.text));
    }
    if let Some(rejection) = &view.rejection {
        out.push_str(&format!("  ! {rejection}\n"));
    }
    if let SubmissionStatus::Failed { failure } = &view.submission {
        out.push_str(&describe_failure(failure));
    }

    let hint = match step.kind {
        StepKind::MultiSelect | StepKind::CompactMultiSelect | StepKind::GridMultiSelect => {
            "Type a number to toggle it, Enter to continue"
        }
        StepKind::SingleChoice | StepKind::GenderChoice | StepKind::AgeGate => "Type a number",
        StepKind::FreeText | StepKind::EmailInput => "Type your answer and press Enter",
        StepKind::ComputedTransition => "Please wait...",
        StepKind::InformationalDisplay => {
            if view.position == view.total_steps {
                "Press Enter to submit"
            } else {
                "Press Enter to continue"
            }
        }
    };
    out.push_str(&format!("({hint}, /back to go back)\n"));
    out
}

/// One-line rendering of an event, if it is worth printing on its own.
pub fn describe_event(event: &WizardEvent) -> Option<String> {
    match event {
        WizardEvent::StepChanged { .. } => None,
        WizardEvent::Rejected { rejection, .. } => Some(format!("⚠️  {rejection}")),
        WizardEvent::AnalysisPhase { label, .. } => Some(format!("⏳ {label}")),
        WizardEvent::SubmissionStarted => Some("Submitting...".to_string()),
        WizardEvent::Submitted { id } => Some(format!("✅ Survey submitted (id {id})")),
        WizardEvent::SubmissionFailed { failure } => Some(describe_failure(failure)),
    }
}

fn describe_failure(failure: &SubmitFailure) -> String {
    match failure {
        SubmitFailure::ValidationFailed { errors } => {
            let mut out = String::from("❌ Some answers were not accepted:\n");
            for e in errors {
                out.push_str(&format!("   {}: {}\n", e.field, e.message));
            }
            out.push_str("   Use /back to fix them.\n");
            out
        }
        SubmitFailure::TransportFailed { message } => {
            format!("❌ Could not submit: {message}\n   Press Enter to retry.\n")
        }
    }
}

/// Drive `session` from stdin until it is submitted, stdin closes or the
/// user quits.
pub async fn run(session: WizardSession) -> Result<(), Error> {
    let mut events = session.subscribe();
    let mut view = session.view().await?;
    eprint!("{}", render(&view));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(e) => {
                        error!("Error reading stdin: {}", e);
                        break;
                    }
                };
                let Some(command) = parse_command(&view, &line) else {
                    eprintln!("⚠️  Not one of the choices");
                    continue;
                };
                if command == Command::Quit {
                    break;
                }
                match apply(&session, &view, command).await {
                    Ok(true) => {
                        view = session.view().await?;
                        eprint!("{}", render(&view));
                    }
                    Ok(false) => {}
                    Err(WizardError::SessionClosed) => return Err(WizardError::SessionClosed.into()),
                    Err(e) => eprintln!("⚠️  {e}"),
                }
            }
            event = events.recv() => {
                let event = match event {
                    Ok(event) => event,
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => break,
                };
                if let Some(text) = describe_event(&event) {
                    eprintln!("{text}");
                }
                match event {
                    WizardEvent::StepChanged { .. } => {
                        view = session.view().await?;
                        eprint!("{}", render(&view));
                    }
                    WizardEvent::Submitted { .. } => break,
                    _ => {}
                }
            }
        }
    }
    Ok(())
}

/// Send one command to the session. Returns whether the step should be
/// redrawn without waiting for an event.
async fn apply(
    session: &WizardSession,
    view: &StepView,
    command: Command,
) -> Result<bool, WizardError> {
    match command {
        Command::Pick(option) => {
            let outcome = session.select(&option).await?;
            Ok(outcome == SelectOutcome::Updated)
        }
        Command::Text(value) => {
            session.set_text(&value).await?;
            session.commit().await?;
            Ok(false)
        }
        Command::Next => {
            if view.step.kind.is_passive() {
                session.proceed().await?;
            } else {
                session.commit().await?;
            }
            Ok(false)
        }
        Command::Back => {
            session.back().await?;
            Ok(false)
        }
        Command::Reset => {
            if !session.reset().await? {
                eprintln!("⚠️  Still submitting, try again in a moment");
            }
            Ok(false)
        }
        Command::Quit => Ok(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldError;
    use crate::survey::catalog::StepCatalog;
    use crate::survey::rules::RuleBook;
    use crate::survey::sequencer::Sequencer;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn view_at(step_id: &str) -> StepView {
        let catalog = Arc::new(StepCatalog::standard().unwrap());
        let position = catalog.position_of(step_id).unwrap();
        let mut seq = Sequencer::new(catalog, Arc::new(RuleBook::standard()));
        seq.restore(position, BTreeMap::new()).unwrap();
        seq.view()
    }

    #[test]
    fn numbers_pick_options() {
        let view = view_at("gender");
        assert_eq!(parse_command(&view, "2"), Some(Command::Pick("Woman".into())));
        assert_eq!(parse_command(&view, "woman"), Some(Command::Pick("Woman".into())));
        assert_eq!(parse_command(&view, "0"), None);
        assert_eq!(parse_command(&view, "3"), None);
        assert_eq!(parse_command(&view, "robot"), None);
    }

    #[test]
    fn navigation_commands() {
        let view = view_at("goals");
        assert_eq!(parse_command(&view, "/back"), Some(Command::Back));
        assert_eq!(parse_command(&view, "  "), Some(Command::Next));
        assert_eq!(parse_command(&view, "/reset"), Some(Command::Reset));
        assert_eq!(parse_command(&view, "/q"), Some(Command::Quit));
    }

    #[test]
    fn text_steps_take_the_line() {
        let view = view_at("email");
        assert_eq!(
            parse_command(&view, " sam@example.com "),
            Some(Command::Text("sam@example.com".into()))
        );
        assert_eq!(parse_command(&view_at("welcome"), "anything"), Some(Command::Next));
    }

    #[test]
    fn render_marks_multi_select_picks() {
        let mut view = view_at("topics");
        view.selection = vec!["Cars".into()];
        let out = render(&view);
        assert!(out.contains("[8/18]"));
        assert!(out.contains("[x] Cars"));
        assert!(out.contains("[ ] Books"));
        assert!(out.contains("toggle"));
    }

    #[test]
    fn render_shows_rejection_and_failure() {
        let mut view = view_at("age");
        view.rejection = Some(crate::survey::validator::Rejection::Underage);
        assert!(render(&view).contains("under 18"));

        let mut last = view_at("success");
        last.submission = SubmissionStatus::Failed {
            failure: SubmitFailure::ValidationFailed {
                errors: vec![FieldError::new("email", "Required")],
            },
        };
        let out = render(&last);
        assert!(out.contains("email: Required"));
        assert!(out.contains("Press Enter to submit"));
    }

    #[test]
    fn step_changes_are_not_printed_as_text() {
        assert!(describe_event(&WizardEvent::StepChanged {
            position: 2,
            step_id: "gender".into()
        })
        .is_none());
        assert_eq!(
            describe_event(&WizardEvent::AnalysisPhase {
                index: 0,
                label: "Analyzing your preferences...".into()
            })
            .as_deref(),
            Some("⏳ Analyzing your preferences...")
        );
    }
}
