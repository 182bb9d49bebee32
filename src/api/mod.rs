//! HTTP API: the survey persistence boundary.

pub mod routes;

pub use routes::{ApiState, survey_routes};
