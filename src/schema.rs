//! Wire shape of a survey submission and the whole-record check shared by
//! the client-side submission adapter and the `/api/survey` route.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::survey::answers::{AnswerRecord, AnswerValue};
use crate::survey::validator::is_valid_email;

/// One rejected field in a submitted record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// The flattened record posted to the survey endpoint and stored as one
/// document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurveySubmission {
    pub datetime: String,
    pub gender: String,
    pub dating_experience: String,
    pub goals: Vec<String>,
    pub personality: Vec<String>,
    pub interests: Vec<String>,
    pub topics: Vec<String>,
    pub lifestyle: String,
    pub hair_color: String,
    pub age_preference: String,
    pub age: String,
    pub location: String,
    pub traffic_source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utm_campaign: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utm_content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utm_source: Option<String>,
}

impl SurveySubmission {
    /// Flatten an answer record and run the same check the server runs.
    /// Unanswered fields stay absent so they are reported as `Required`.
    pub fn from_record(record: &AnswerRecord) -> Result<Self, Vec<FieldError>> {
        validate_payload(&record_payload(record))
    }
}

/// The JSON body for a record: every answered field, plus `datetime` once
/// the record has been stamped.
pub fn record_payload(record: &AnswerRecord) -> Value {
    let mut body = Map::new();
    if let Some(at) = record.submitted_at {
        body.insert(
            "datetime".to_string(),
            Value::String(at.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)),
        );
    }
    for (field, value) in &record.fields {
        let value = match value {
            AnswerValue::Text(s) => Value::String(s.clone()),
            AnswerValue::Choices(items) => {
                Value::Array(items.iter().cloned().map(Value::String).collect())
            }
        };
        body.insert(field.clone(), value);
    }
    Value::Object(body)
}

#[derive(Debug, Clone, Copy)]
enum FieldRule {
    DateTime,
    Text,
    List,
    Email,
    OptionalText,
}

/// Every field of the record, in schema order.
const FIELDS: &[(&str, FieldRule)] = &[
    ("datetime", FieldRule::DateTime),
    ("gender", FieldRule::Text),
    ("dating_experience", FieldRule::Text),
    ("goals", FieldRule::List),
    ("personality", FieldRule::List),
    ("interests", FieldRule::List),
    ("topics", FieldRule::List),
    ("lifestyle", FieldRule::Text),
    ("hair_color", FieldRule::Text),
    ("age_preference", FieldRule::Text),
    ("age", FieldRule::Text),
    ("location", FieldRule::Text),
    ("traffic_source", FieldRule::Text),
    ("name", FieldRule::OptionalText),
    ("email", FieldRule::Email),
    ("utm_campaign", FieldRule::OptionalText),
    ("utm_content", FieldRule::OptionalText),
    ("utm_source", FieldRule::OptionalText),
];

/// Validate an arbitrary JSON body against the submission schema,
/// collecting every failing field.
pub fn validate_payload(value: &Value) -> Result<SurveySubmission, Vec<FieldError>> {
    let Some(obj) = value.as_object() else {
        return Err(vec![FieldError::new(
            "body",
            format!("Expected object, received {}", type_name(value)),
        )]);
    };

    let mut errors = Vec::new();
    for (field, rule) in FIELDS {
        check_field(obj, field, *rule, &mut errors);
    }
    if !errors.is_empty() {
        return Err(errors);
    }

    serde_json::from_value(value.clone()).map_err(|e| vec![FieldError::new("body", e.to_string())])
}

fn check_field(obj: &Map<String, Value>, field: &str, rule: FieldRule, errors: &mut Vec<FieldError>) {
    let value = obj.get(field);

    if let FieldRule::OptionalText = rule {
        match value {
            None | Some(Value::Null) | Some(Value::String(_)) => {}
            Some(other) => errors.push(expected(field, "string", other)),
        }
        return;
    }

    let Some(value) = value.filter(|v| !v.is_null()) else {
        errors.push(FieldError::new(field, "Required"));
        return;
    };

    match rule {
        FieldRule::List => {
            let Some(items) = value.as_array() else {
                errors.push(expected(field, "array", value));
                return;
            };
            if items.is_empty() {
                errors.push(FieldError::new(field, "Array must contain at least 1 element(s)"));
            }
            for (i, item) in items.iter().enumerate() {
                if !item.is_string() {
                    errors.push(expected(&format!("{field}.{i}"), "string", item));
                }
            }
        }
        FieldRule::DateTime | FieldRule::Text | FieldRule::Email => {
            let Some(s) = value.as_str() else {
                errors.push(expected(field, "string", value));
                return;
            };
            match rule {
                FieldRule::DateTime => {
                    if chrono::DateTime::parse_from_rfc3339(s).is_err() {
                        errors.push(FieldError::new(field, "Invalid datetime"));
                    }
                }
                FieldRule::Email => {
                    if !is_valid_email(s) {
                        errors.push(FieldError::new(field, "Invalid email"));
                    }
                }
                _ => {
                    if s.is_empty() {
                        errors.push(FieldError::new(
                            field,
                            "String must contain at least 1 character(s)",
                        ));
                    }
                }
            }
        }
        FieldRule::OptionalText => {}
    }
}

fn expected(field: &str, wanted: &str, got: &Value) -> FieldError {
    FieldError::new(field, format!("Expected {wanted}, received {}", type_name(got)))
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::survey::answers::{Accumulator, AnswerValue};
    use chrono::TimeZone;
    use serde_json::json;

    fn valid_body() -> Value {
        json!({
            "datetime": "2025-06-01T12:00:00.000Z",
            "gender": "Woman",
            "dating_experience": "No, this is my first time",
            "goals": ["Friendship"],
            "personality": ["Funny", "Caring"],
            "interests": ["Technology"],
            "topics": ["None of the above"],
            "lifestyle": "I enjoy a mix of both",
            "hair_color": "Red",
            "age_preference": "Age doesn't matter",
            "age": "Age 35-44",
            "location": "Europe",
            "traffic_source": "TikTok",
            "name": "Sam",
            "email": "sam@example.com",
            "utm_source": "tiktok",
            "utm_campaign": "social_media_2025",
            "utm_content": "tiktok_video"
        })
    }

    fn fields(errors: &[FieldError]) -> Vec<&str> {
        errors.iter().map(|e| e.field.as_str()).collect()
    }

    #[test]
    fn valid_payload_parses() {
        let submission = validate_payload(&valid_body()).unwrap();
        assert_eq!(submission.gender, "Woman");
        assert_eq!(submission.personality.len(), 2);
        assert_eq!(submission.utm_source.as_deref(), Some("tiktok"));
    }

    #[test]
    fn optional_fields_may_be_absent() {
        let mut body = valid_body();
        let obj = body.as_object_mut().unwrap();
        obj.remove("name");
        obj.remove("utm_source");
        obj.remove("utm_campaign");
        obj.remove("utm_content");
        assert!(validate_payload(&body).is_ok());
    }

    #[test]
    fn missing_email_is_reported() {
        let mut body = valid_body();
        body.as_object_mut().unwrap().remove("email");
        let errors = validate_payload(&body).unwrap_err();
        assert_eq!(errors, vec![FieldError::new("email", "Required")]);
    }

    #[test]
    fn every_failing_field_is_reported() {
        let mut body = valid_body();
        let obj = body.as_object_mut().unwrap();
        obj.insert("gender".into(), json!(""));
        obj.insert("goals".into(), json!([]));
        obj.insert("topics".into(), json!(["Books", 7]));
        obj.insert("email".into(), json!("not-an-email"));
        obj.insert("datetime".into(), json!("yesterday"));
        obj.insert("name".into(), json!(42));

        let errors = validate_payload(&body).unwrap_err();
        assert_eq!(
            fields(&errors),
            vec!["datetime", "gender", "goals", "topics.1", "name", "email"]
        );
        assert_eq!(errors[3].message, "Expected string, received number");
    }

    #[test]
    fn non_object_body_is_rejected() {
        let errors = validate_payload(&json!([1, 2])).unwrap_err();
        assert_eq!(errors[0].field, "body");
    }

    #[test]
    fn record_payload_keeps_only_answered_fields() {
        let mut acc = Accumulator::new();
        acc.merge("gender", "Man".into());
        acc.merge("goals", AnswerValue::Choices(vec!["Marriage".into()]));
        acc.merge("utm_source", "google".into());
        acc.stamp_submitted(chrono::Utc.with_ymd_and_hms(2025, 3, 4, 5, 6, 7).unwrap());

        let body = record_payload(&acc.snapshot());
        assert_eq!(
            body,
            json!({
                "datetime": "2025-03-04T05:06:07.000Z",
                "gender": "Man",
                "goals": ["Marriage"],
                "utm_source": "google"
            })
        );
    }

    #[test]
    fn complete_record_converts() {
        let record = crate::survey::submission::tests::complete_record();
        let submission = SurveySubmission::from_record(&record).unwrap();
        assert_eq!(submission.gender, "Woman");
        assert_eq!(submission.goals, vec!["Friendship"]);
        assert_eq!(submission.name.as_deref(), Some("Sam"));
        assert!(submission.datetime.ends_with('Z'));
    }

    #[test]
    fn unanswered_email_is_required_not_invalid() {
        let mut record = crate::survey::submission::tests::complete_record();
        record.fields.remove("email");
        assert_eq!(
            SurveySubmission::from_record(&record).unwrap_err(),
            vec![FieldError::new("email", "Required")]
        );

        record.fields.insert("email".into(), "sam@example".into());
        assert_eq!(
            SurveySubmission::from_record(&record).unwrap_err(),
            vec![FieldError::new("email", "Invalid email")]
        );
    }

    #[test]
    fn unstamped_record_misses_datetime() {
        let mut record = crate::survey::submission::tests::complete_record();
        record.submitted_at = None;
        assert_eq!(
            SurveySubmission::from_record(&record).unwrap_err(),
            vec![FieldError::new("datetime", "Required")]
        );
    }
}
