//! Survey Wizard: multi-step lead-capture survey engine and its intake API.

pub mod api;
pub mod config;
pub mod error;
pub mod schema;
pub mod store;
pub mod survey;
pub mod terminal;
