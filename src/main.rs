use std::sync::Arc;

use anyhow::Context;

use survey_wizard::api::survey_routes;
use survey_wizard::config::{ServerConfig, WizardConfig};
use survey_wizard::store::{Database, LibSqlBackend};
use survey_wizard::survey::catalog::StepCatalog;
use survey_wizard::survey::persistence::SettingsSessionStore;
use survey_wizard::survey::rules::RuleBook;
use survey_wizard::survey::session::{SessionDeps, WizardSession};
use survey_wizard::survey::submission::{HttpTransport, SubmissionAdapter};
use survey_wizard::terminal;

/// Snapshot key used by the terminal wizard.
const TERMINAL_SESSION: &str = "local";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let server_config = ServerConfig::from_env()?;
    let wizard_config = WizardConfig::from_env()?;

    eprintln!("📝 Survey Wizard v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Survey API: http://0.0.0.0:{}/api/survey", server_config.port);
    eprintln!("   Health: http://0.0.0.0:{}/health", server_config.port);

    // ── Database ─────────────────────────────────────────────────────────
    let db: Arc<dyn Database> = Arc::new(
        LibSqlBackend::new_local(std::path::Path::new(&server_config.db_path))
            .await
            .with_context(|| format!("failed to open database at {}", server_config.db_path))?,
    );
    eprintln!("   Database: {}", server_config.db_path);

    // ── HTTP server ──────────────────────────────────────────────────────
    let app = survey_routes(Arc::clone(&db));
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", server_config.port))
        .await
        .with_context(|| format!("failed to bind port {}", server_config.port))?;
    tracing::info!(port = server_config.port, "Survey API started");

    if !server_config.terminal {
        eprintln!();
        axum::serve(listener, app).await?;
        return Ok(());
    }

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "Survey API stopped");
        }
    });

    // ── Terminal wizard ──────────────────────────────────────────────────
    eprintln!("   Wizard posts to: {}", wizard_config.api_url);
    eprintln!("   Type a number to pick, Enter to continue. /back, /reset, /quit.\n");

    let transport = HttpTransport::new(wizard_config.api_url.clone(), wizard_config.submit_timeout)?;
    let deps = SessionDeps {
        catalog: Arc::new(StepCatalog::standard()?),
        rules: Arc::new(RuleBook::standard()),
        adapter: Arc::new(SubmissionAdapter::new(Arc::new(transport))),
        store: Arc::new(SettingsSessionStore::new(Arc::clone(&db))),
        config: wizard_config,
    };
    let session = WizardSession::start(deps, TERMINAL_SESSION).await?;
    terminal::run(session).await?;

    Ok(())
}
