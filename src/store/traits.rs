//! `Database` trait: single async interface for all persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::DatabaseError;
use crate::schema::SurveySubmission;

/// A submission as stored, with the bookkeeping the store adds.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredSurvey {
    pub id: String,
    pub submission: SurveySubmission,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Backend-agnostic database trait covering survey documents and settings.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run all pending schema migrations.
    async fn run_migrations(&self) -> Result<(), DatabaseError>;

    // ── Surveys ─────────────────────────────────────────────────────

    /// Store a validated submission as one document. Returns the stored
    /// record with its generated id.
    async fn insert_survey(&self, submission: &SurveySubmission) -> Result<StoredSurvey, DatabaseError>;

    /// Get a survey by id.
    async fn get_survey(&self, id: &str) -> Result<Option<StoredSurvey>, DatabaseError>;

    /// Most recent surveys first, up to `limit`.
    async fn list_surveys(&self, limit: usize) -> Result<Vec<StoredSurvey>, DatabaseError>;

    // ── Settings ────────────────────────────────────────────────────

    /// Get a setting value.
    async fn get_setting(
        &self,
        user_id: &str,
        key: &str,
    ) -> Result<Option<serde_json::Value>, DatabaseError>;

    /// Set a setting value (upsert).
    async fn set_setting(
        &self,
        user_id: &str,
        key: &str,
        value: &serde_json::Value,
    ) -> Result<(), DatabaseError>;

    /// Delete a setting. Returns whether a row was removed.
    async fn delete_setting(&self, user_id: &str, key: &str) -> Result<bool, DatabaseError>;
}
