//! Configuration types.

use std::time::Duration;

use crate::error::ConfigError;

/// HTTP server and storage configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port the survey API listens on.
    pub port: u16,
    /// Path of the libSQL database file.
    pub db_path: String,
    /// Run the terminal wizard alongside the server.
    pub terminal: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            db_path: "./data/survey-wizard.db".to_string(),
            terminal: false,
        }
    }
}

impl ServerConfig {
    /// Load from `SURVEY_PORT`, `SURVEY_DB_PATH` and `SURVEY_CLI`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            port: parse_env("SURVEY_PORT")?.unwrap_or(defaults.port),
            db_path: std::env::var("SURVEY_DB_PATH").unwrap_or(defaults.db_path),
            terminal: std::env::var("SURVEY_CLI")
                .map(|v| matches!(v.as_str(), "1" | "true" | "yes"))
                .unwrap_or(defaults.terminal),
        })
    }
}

/// Client-side wizard behaviour: debounce delays, analysis animation and
/// the submission endpoint.
#[derive(Debug, Clone)]
pub struct WizardConfig {
    /// Endpoint the submission adapter posts to.
    pub api_url: String,
    /// Upper bound on a single submission round trip.
    pub submit_timeout: Duration,
    /// Auto-advance delay after a single-answer pick.
    pub choice_delay: Duration,
    /// Auto-advance delay after picking the exclusive sentinel option.
    pub exclusive_delay: Duration,
    /// Duration of each analysis phase.
    pub analysis_phase_delay: Duration,
    /// Pause after the last analysis phase before moving on.
    pub analysis_settle_delay: Duration,
}

impl Default for WizardConfig {
    fn default() -> Self {
        Self {
            api_url: "http://127.0.0.1:3000/api/survey".to_string(),
            submit_timeout: Duration::from_secs(10),
            choice_delay: Duration::from_millis(500),
            exclusive_delay: Duration::from_millis(300),
            analysis_phase_delay: Duration::from_millis(800),
            analysis_settle_delay: Duration::from_millis(1500),
        }
    }
}

impl WizardConfig {
    /// Load from `SURVEY_*` environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let d = Self::default();
        Ok(Self {
            api_url: std::env::var("SURVEY_API_URL").unwrap_or(d.api_url),
            submit_timeout: parse_env("SURVEY_SUBMIT_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(d.submit_timeout),
            choice_delay: parse_env("SURVEY_CHOICE_DELAY_MS")?
                .map(Duration::from_millis)
                .unwrap_or(d.choice_delay),
            exclusive_delay: parse_env("SURVEY_EXCLUSIVE_DELAY_MS")?
                .map(Duration::from_millis)
                .unwrap_or(d.exclusive_delay),
            analysis_phase_delay: parse_env("SURVEY_ANALYSIS_PHASE_MS")?
                .map(Duration::from_millis)
                .unwrap_or(d.analysis_phase_delay),
            analysis_settle_delay: parse_env("SURVEY_ANALYSIS_SETTLE_MS")?
                .map(Duration::from_millis)
                .unwrap_or(d.analysis_settle_delay),
        })
    }
}

/// Read and parse an optional environment variable.
fn parse_env<T>(key: &str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => parse_value(key, &raw).map(Some),
        Err(_) => Ok(None),
    }
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("{raw:?}: {e}"),
        })
}
