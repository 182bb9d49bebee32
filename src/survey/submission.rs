//! Submission adapter: hands a completed answer record to the survey
//! endpoint and classifies the reply.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::SubmissionError;
use crate::schema::{FieldError, SurveySubmission};
use crate::survey::answers::AnswerRecord;

/// Status and JSON body of a reply from the survey endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundaryResponse {
    pub status: u16,
    pub body: Value,
}

/// How a submission reaches the persistence boundary.
#[async_trait]
pub trait SurveyTransport: Send + Sync {
    async fn post(&self, submission: &SurveySubmission) -> Result<BoundaryResponse, SubmissionError>;
}

/// POSTs submissions as JSON to the survey endpoint.
pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, SubmissionError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SubmissionError::Http(format!("client build: {e}")))?;
        Ok(Self {
            client,
            url: url.into(),
            timeout,
        })
    }
}

#[async_trait]
impl SurveyTransport for HttpTransport {
    async fn post(&self, submission: &SurveySubmission) -> Result<BoundaryResponse, SubmissionError> {
        let response = self
            .client
            .post(&self.url)
            .json(submission)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SubmissionError::Timeout {
                        timeout: self.timeout,
                    }
                } else {
                    SubmissionError::Http(e.to_string())
                }
            })?;

        let status = response.status().as_u16();
        let bytes = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                SubmissionError::Timeout {
                    timeout: self.timeout,
                }
            } else {
                SubmissionError::Http(e.to_string())
            }
        })?;
        // Non-JSON bodies (proxies, HTML error pages) still carry a status.
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);

        Ok(BoundaryResponse { status, body })
    }
}

/// Why a submission did not produce a stored record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SubmitFailure {
    /// The record was rejected field by field. The user can fix and retry.
    ValidationFailed { errors: Vec<FieldError> },
    /// Network, timeout, server or malformed-reply failure.
    TransportFailed { message: String },
}

impl std::fmt::Display for SubmitFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ValidationFailed { errors } => {
                let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
                write!(f, "Invalid form data: {}", fields.join(", "))
            }
            Self::TransportFailed { message } => write!(f, "Submission failed: {message}"),
        }
    }
}

/// `Ok(id)` of the stored record, or why it was not stored.
pub type SubmitOutcome = Result<String, SubmitFailure>;

/// Flattens, checks and sends answer records. Never retries on its own.
pub struct SubmissionAdapter {
    transport: Arc<dyn SurveyTransport>,
}

impl SubmissionAdapter {
    pub fn new(transport: Arc<dyn SurveyTransport>) -> Self {
        Self { transport }
    }

    pub async fn submit(&self, record: &AnswerRecord) -> SubmitOutcome {
        let submission = SurveySubmission::from_record(record).map_err(|errors| {
            tracing::warn!(fields = errors.len(), "Submission failed local shape check");
            SubmitFailure::ValidationFailed { errors }
        })?;

        let response = self.transport.post(&submission).await.map_err(|e| {
            tracing::warn!(error = %e, "Submission transport failed");
            SubmitFailure::TransportFailed {
                message: e.to_string(),
            }
        })?;

        let outcome = classify(response);
        match &outcome {
            Ok(id) => tracing::info!(id = %id, "Survey submitted"),
            Err(failure) => tracing::warn!(%failure, "Survey submission rejected"),
        }
        outcome
    }
}

fn classify(response: BoundaryResponse) -> SubmitOutcome {
    let BoundaryResponse { status, body } = response;
    let message_of = |body: &Value| {
        body.get("error")
            .or_else(|| body.get("message"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("HTTP {status}"))
    };

    match status {
        200..=299 => body
            .get("id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| SubmitFailure::TransportFailed {
                message: SubmissionError::MalformedResponse(format!(
                    "HTTP {status} without a record id"
                ))
                .to_string(),
            }),
        400..=499 => {
            let errors = body
                .get("errors")
                .cloned()
                .and_then(|v| serde_json::from_value::<Vec<FieldError>>(v).ok())
                .filter(|errors| !errors.is_empty());
            match errors {
                Some(errors) => Err(SubmitFailure::ValidationFailed { errors }),
                None => Err(SubmitFailure::TransportFailed {
                    message: message_of(&body),
                }),
            }
        }
        _ => Err(SubmitFailure::TransportFailed {
            message: message_of(&body),
        }),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::survey::answers::{Accumulator, AnswerValue};
    use serde_json::json;
    use std::sync::Mutex;

    /// Transport that answers every post with a fixed reply and records
    /// what it was sent.
    pub(crate) struct StubTransport {
        reply: Result<BoundaryResponse, String>,
        delay: Duration,
        pub(crate) sent: Mutex<Vec<SurveySubmission>>,
    }

    impl StubTransport {
        pub(crate) fn accepting(id: &str) -> Self {
            Self::replying(200, json!({"success": true, "message": "Survey submitted successfully", "id": id}))
        }

        pub(crate) fn replying(status: u16, body: Value) -> Self {
            Self {
                reply: Ok(BoundaryResponse { status, body }),
                delay: Duration::ZERO,
                sent: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn failing(message: &str) -> Self {
            Self {
                reply: Err(message.to_string()),
                delay: Duration::ZERO,
                sent: Mutex::new(Vec::new()),
            }
        }

        /// Hold every reply for `delay`.
        pub(crate) fn after(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        pub(crate) fn sent_count(&self) -> usize {
            self.sent.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl SurveyTransport for StubTransport {
        async fn post(&self, submission: &SurveySubmission) -> Result<BoundaryResponse, SubmissionError> {
            self.sent.lock().unwrap().push(submission.clone());
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.reply.clone().map_err(SubmissionError::Http)
        }
    }

    pub(crate) fn complete_record() -> AnswerRecord {
        let mut acc = Accumulator::new();
        let picks = |items: &[&str]| AnswerValue::Choices(items.iter().map(|s| s.to_string()).collect());
        acc.merge("gender", "Woman".into());
        acc.merge("dating_experience", "Yes, I have experience".into());
        acc.merge("goals", picks(&["Friendship"]));
        acc.merge("personality", picks(&["Funny"]));
        acc.merge("interests", picks(&["Technology"]));
        acc.merge("topics", picks(&["Books"]));
        acc.merge("lifestyle", "I enjoy a mix of both".into());
        acc.merge("hair_color", "Brown".into());
        acc.merge("age_preference", "Same age as me".into());
        acc.merge("age", "Age 18-34".into());
        acc.merge("location", "Europe".into());
        acc.merge("traffic_source", "Google Search".into());
        acc.merge("utm_source", "google".into());
        acc.merge("utm_campaign", "organic_search_2025".into());
        acc.merge("utm_content", "search_results".into());
        acc.merge("name", "Sam".into());
        acc.merge("email", "sam@example.com".into());
        acc.stamp_submitted(chrono::Utc::now());
        acc.snapshot()
    }

    #[tokio::test]
    async fn accepted_reply_yields_id() {
        let transport = Arc::new(StubTransport::accepting("abc123"));
        let adapter = SubmissionAdapter::new(transport.clone());

        assert_eq!(adapter.submit(&complete_record()).await, Ok("abc123".to_string()));
        assert_eq!(transport.sent_count(), 1);
        let sent = transport.sent.lock().unwrap()[0].clone();
        assert_eq!(sent.utm_source.as_deref(), Some("google"));
        assert!(!sent.datetime.is_empty());
    }

    #[tokio::test]
    async fn local_shape_check_runs_before_sending() {
        let transport = Arc::new(StubTransport::accepting("never"));
        let adapter = SubmissionAdapter::new(transport.clone());
        let mut record = complete_record();
        record.fields.remove("email");

        let outcome = adapter.submit(&record).await;

        let Err(SubmitFailure::ValidationFailed { errors }) = outcome else {
            panic!("expected validation failure, got {outcome:?}");
        };
        assert_eq!(errors, vec![FieldError::new("email", "Required")]);
        assert_eq!(transport.sent_count(), 0);
    }

    #[tokio::test]
    async fn field_errors_from_server_are_validation_failures() {
        let transport = Arc::new(StubTransport::replying(
            400,
            json!({
                "success": false,
                "message": "Invalid form data",
                "errors": [{"field": "age", "message": "Required"}]
            }),
        ));
        let adapter = SubmissionAdapter::new(transport);

        assert_eq!(
            adapter.submit(&complete_record()).await,
            Err(SubmitFailure::ValidationFailed {
                errors: vec![FieldError::new("age", "Required")]
            })
        );
    }

    #[tokio::test]
    async fn server_error_is_transport_failure() {
        let transport = Arc::new(StubTransport::replying(
            500,
            json!({"success": false, "message": "Internal server error", "error": "db down"}),
        ));
        let adapter = SubmissionAdapter::new(transport);

        assert_eq!(
            adapter.submit(&complete_record()).await,
            Err(SubmitFailure::TransportFailed {
                message: "db down".into()
            })
        );
    }

    #[tokio::test]
    async fn network_error_is_transport_failure() {
        let adapter = SubmissionAdapter::new(Arc::new(StubTransport::failing("connection refused")));
        let outcome = adapter.submit(&complete_record()).await;
        assert!(matches!(outcome, Err(SubmitFailure::TransportFailed { message }) if message.contains("connection refused")));
    }

    #[test]
    fn success_without_id_is_malformed() {
        let outcome = classify(BoundaryResponse {
            status: 200,
            body: json!({"success": true}),
        });
        assert!(matches!(outcome, Err(SubmitFailure::TransportFailed { message }) if message.contains("Malformed response")));
    }

    #[test]
    fn client_error_without_field_list_is_transport_failure() {
        let outcome = classify(BoundaryResponse {
            status: 404,
            body: Value::Null,
        });
        assert_eq!(
            outcome,
            Err(SubmitFailure::TransportFailed {
                message: "HTTP 404".into()
            })
        );
    }
}
