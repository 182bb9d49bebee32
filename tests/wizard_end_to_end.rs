//! Drives a wizard session over real HTTP into the in-process survey API.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::time::timeout;

use survey_wizard::api::survey_routes;
use survey_wizard::config::WizardConfig;
use survey_wizard::store::{Database, LibSqlBackend};
use survey_wizard::survey::catalog::{NONE_OF_THE_ABOVE, StepCatalog};
use survey_wizard::survey::persistence::{SessionStore, SettingsSessionStore};
use survey_wizard::survey::rules::RuleBook;
use survey_wizard::survey::session::{SessionDeps, WizardEvent, WizardSession};
use survey_wizard::survey::submission::{HttpTransport, SubmissionAdapter, SubmitFailure};

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Start an Axum server on a random port, return (port, db).
async fn start_server() -> (u16, Arc<dyn Database>) {
    let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
    let app = survey_routes(Arc::clone(&db));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    tokio::time::sleep(Duration::from_millis(50)).await;

    (port, db)
}

fn fast_config(api_url: String) -> WizardConfig {
    WizardConfig {
        api_url,
        submit_timeout: Duration::from_secs(5),
        choice_delay: Duration::from_millis(5),
        exclusive_delay: Duration::from_millis(5),
        analysis_phase_delay: Duration::from_millis(5),
        analysis_settle_delay: Duration::from_millis(5),
    }
}

async fn start_session(url: String, db: &Arc<dyn Database>) -> WizardSession {
    let config = fast_config(url);
    let transport = HttpTransport::new(config.api_url.clone(), config.submit_timeout).unwrap();
    let deps = SessionDeps {
        catalog: Arc::new(StepCatalog::standard().unwrap()),
        rules: Arc::new(RuleBook::standard()),
        adapter: Arc::new(SubmissionAdapter::new(Arc::new(transport))),
        store: Arc::new(SettingsSessionStore::new(Arc::clone(db))),
        config,
    };
    WizardSession::start(deps, "e2e").await.unwrap()
}

/// Wait until the session lands on `step_id`.
async fn reach(events: &mut broadcast::Receiver<WizardEvent>, step_id: &str) {
    loop {
        match events.recv().await.unwrap() {
            WizardEvent::StepChanged { step_id: id, .. } if id == step_id => return,
            _ => {}
        }
    }
}

/// Walk from the welcome screen to the success screen.
async fn walk_to_success(session: &WizardSession, events: &mut broadcast::Receiver<WizardEvent>) {
    session.proceed().await.unwrap();
    session.select("Man").await.unwrap();
    reach(events, "stats").await;
    session.proceed().await.unwrap();
    session.select("Yes, I have experience").await.unwrap();
    reach(events, "goals").await;

    session.select("Casual dating").await.unwrap();
    session.commit().await.unwrap();
    session.select("Creative").await.unwrap();
    session.select("Athletic").await.unwrap();
    session.commit().await.unwrap();
    session.select("Cooking & Food").await.unwrap();
    session.commit().await.unwrap();
    session.select(NONE_OF_THE_ABOVE).await.unwrap();
    reach(events, "lifestyle").await;

    for (option, next) in [
        ("I'm always up for new adventures", "hair_color"),
        ("Blonde", "age_preference"),
        ("Much older", "age"),
        ("Age 18-34", "location"),
        ("Australia", "traffic_source"),
        ("Instagram", "analyzing"),
    ] {
        session.select(option).await.unwrap();
        reach(events, next).await;
    }
    reach(events, "name").await;

    session.set_text("Jordan").await.unwrap();
    session.commit().await.unwrap();
    session.set_text("jordan@example.com").await.unwrap();
    session.commit().await.unwrap();
    assert_eq!(session.view().await.unwrap().step.id, "success");
}

#[tokio::test]
async fn wizard_submits_to_the_api() {
    timeout(TEST_TIMEOUT, async {
        let (port, db) = start_server().await;
        let session = start_session(format!("http://127.0.0.1:{port}/api/survey"), &db).await;
        let mut events = session.subscribe();

        walk_to_success(&session, &mut events).await;
        session.proceed().await.unwrap();

        let id = loop {
            match events.recv().await.unwrap() {
                WizardEvent::Submitted { id } => break id,
                WizardEvent::SubmissionFailed { failure } => panic!("submission failed: {failure}"),
                _ => {}
            }
        };

        let stored = db.get_survey(&id).await.unwrap().unwrap();
        let submission = stored.submission;
        assert_eq!(submission.gender, "Man");
        assert_eq!(submission.personality, vec!["Creative", "Athletic"]);
        assert_eq!(submission.topics, vec![NONE_OF_THE_ABOVE]);
        assert_eq!(submission.traffic_source, "Instagram");
        assert_eq!(submission.utm_source.as_deref(), Some("instagram"));
        assert_eq!(submission.name.as_deref(), Some("Jordan"));
        assert_eq!(submission.email, "jordan@example.com");

        tokio::time::sleep(Duration::from_millis(50)).await;
        let snapshots = SettingsSessionStore::new(Arc::clone(&db));
        assert!(snapshots.load("e2e").await.unwrap().is_none());
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn unreachable_api_keeps_the_answers() {
    timeout(TEST_TIMEOUT, async {
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());

        // Nothing listens on this port once the listener is dropped.
        let dead = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let dead_port = dead.local_addr().unwrap().port();
        drop(dead);

        let session = start_session(format!("http://127.0.0.1:{dead_port}/api/survey"), &db).await;
        let mut events = session.subscribe();

        walk_to_success(&session, &mut events).await;
        session.proceed().await.unwrap();

        loop {
            match events.recv().await.unwrap() {
                WizardEvent::SubmissionFailed { failure } => {
                    assert!(matches!(failure, SubmitFailure::TransportFailed { .. }));
                    break;
                }
                WizardEvent::Submitted { .. } => panic!("nothing should accept the survey"),
                _ => {}
            }
        }

        let view = session.view().await.unwrap();
        assert_eq!(view.step.id, "success");
        assert_eq!(session.record().await.unwrap().text("email"), Some("jordan@example.com"));
        assert!(db.list_surveys(10).await.unwrap().is_empty());
    })
    .await
    .expect("test timed out");
}
