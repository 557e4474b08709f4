//! Registries, schemes and codes.

// Field names mirror the JSON wire format
#![allow(missing_docs)]

use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Labels, Status};
use crate::error::ValidationError;

static CODE_VALUE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9_\-.+&#*]+$").expect("valid code value pattern"));

/// Returns the case-insensitive natural key of a code value.
pub fn natural_key(code_value: &str) -> String {
    code_value.to_lowercase()
}

/// Checks a code value against the allowed character set.
pub fn validate_code_value(code_value: &str) -> Result<(), ValidationError> {
    if CODE_VALUE_PATTERN.is_match(code_value) {
        Ok(())
    } else {
        Err(ValidationError::InvalidCodeValue {
            code_value: code_value.to_string(),
        })
    }
}

/// A registry owning a set of code schemes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeRegistry {
    pub id: Uuid,
    pub code_value: String,
    pub uri: String,
    #[serde(default)]
    pub pref_label: Labels,
    #[serde(default)]
    pub description: Labels,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
}

/// A versioned scheme of codes inside a registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeScheme {
    pub id: Uuid,
    pub code_registry_id: Uuid,
    pub code_value: String,
    pub uri: String,
    pub status: Status,
    #[serde(default)]
    pub pref_label: Labels,
    #[serde(default)]
    pub description: Labels,
    #[serde(default)]
    pub definition: Labels,
    #[serde(default)]
    pub prev_codescheme_id: Option<Uuid>,
    #[serde(default)]
    pub cumulative: bool,
    #[serde(default)]
    pub default_code_id: Option<Uuid>,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
}

/// A single classification code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Code {
    pub id: Uuid,
    pub code_scheme_id: Uuid,
    pub code_value: String,
    pub uri: String,
    pub order: i32,
    pub hierarchy_level: u32,
    #[serde(default)]
    pub broader_code_id: Option<Uuid>,
    pub status: Status,
    #[serde(default)]
    pub short_name: Option<String>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub pref_label: Labels,
    #[serde(default)]
    pub description: Labels,
    #[serde(default)]
    pub definition: Labels,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
}

impl Code {
    /// Returns the case-insensitive natural key of this code.
    pub fn key(&self) -> String {
        natural_key(&self.code_value)
    }
}
