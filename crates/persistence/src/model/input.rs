//! Upsert payloads.
//!
//! Inputs are matched against persisted records by identity first and by
//! natural key second. Fields absent from the input are left untouched only
//! where noted; everything else is overwritten.

// Field names mirror the JSON wire format
#![allow(missing_docs)]

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Labels, PropertyType, Status};

/// A reference to another record by id, code value or URI.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityRef {
    #[serde(default)]
    pub id: Option<Uuid>,
    #[serde(default)]
    pub code_value: Option<String>,
    #[serde(default)]
    pub uri: Option<String>,
}

impl EntityRef {
    /// Reference by identity.
    pub fn id(id: Uuid) -> Self {
        Self {
            id: Some(id),
            ..Default::default()
        }
    }

    /// Reference by code value.
    pub fn code_value(value: impl Into<String>) -> Self {
        Self {
            code_value: Some(value.into()),
            ..Default::default()
        }
    }

    /// Reference by URI.
    pub fn uri(uri: impl Into<String>) -> Self {
        Self {
            uri: Some(uri.into()),
            ..Default::default()
        }
    }

    /// Human readable form used in error messages.
    pub fn describe(&self) -> String {
        self.code_value
            .clone()
            .or_else(|| self.uri.clone())
            .or_else(|| self.id.map(|id| id.to_string()))
            .unwrap_or_default()
    }
}

/// Registry upsert payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryInput {
    /// May be omitted when the code value comes from the request path.
    #[serde(default)]
    pub code_value: String,
    #[serde(default)]
    pub pref_label: Labels,
    #[serde(default)]
    pub description: Labels,
}

/// Scheme upsert payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemeInput {
    #[serde(default)]
    pub id: Option<Uuid>,
    /// May be omitted when the code value comes from the request path.
    #[serde(default)]
    pub code_value: String,
    #[serde(default)]
    pub status: Option<Status>,
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
    pub default_code: Option<EntityRef>,
}

/// Code upsert payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeInput {
    #[serde(default)]
    pub id: Option<Uuid>,
    pub code_value: String,
    /// Requested order. When absent an existing code keeps its order.
    #[serde(default)]
    pub order: Option<i32>,
    #[serde(default)]
    pub broader_code: Option<EntityRef>,
    /// When absent a new code starts as `DRAFT` and an existing code keeps its status.
    #[serde(default)]
    pub status: Option<Status>,
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
}

impl CodeInput {
    /// Creates a minimal input for a code value.
    pub fn new(code_value: impl Into<String>) -> Self {
        Self {
            code_value: code_value.into(),
            ..Default::default()
        }
    }

    /// Sets the broader code by code value.
    pub fn with_broader(mut self, broader: impl Into<String>) -> Self {
        self.broader_code = Some(EntityRef::code_value(broader));
        self
    }

    /// Sets the requested order.
    pub fn with_order(mut self, order: i32) -> Self {
        self.order = Some(order);
        self
    }

    /// Sets the status.
    pub fn with_status(mut self, status: Status) -> Self {
        self.status = Some(status);
        self
    }

    /// Sets a preferred label.
    pub fn with_label(mut self, language: &str, value: &str) -> Self {
        self.pref_label.set(language, value);
        self
    }
}

/// Extension upsert payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtensionInput {
    #[serde(default)]
    pub id: Option<Uuid>,
    pub code_value: String,
    pub property_type: PropertyType,
    #[serde(default)]
    pub status: Option<Status>,
    #[serde(default)]
    pub pref_label: Labels,
    /// Linked schemes other than the parent.
    #[serde(default)]
    pub code_schemes: Vec<EntityRef>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
}

impl ExtensionInput {
    /// Creates a minimal input.
    pub fn new(code_value: impl Into<String>, property_type: PropertyType) -> Self {
        Self {
            id: None,
            code_value: code_value.into(),
            property_type,
            status: None,
            pref_label: Labels::new(),
            code_schemes: Vec::new(),
            start_date: None,
            end_date: None,
        }
    }
}

/// Member upsert payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberInput {
    #[serde(default)]
    pub id: Option<Uuid>,
    pub code: EntityRef,
    #[serde(default)]
    pub related_member: Option<EntityRef>,
    #[serde(default)]
    pub order: Option<i32>,
    #[serde(default)]
    pub sequence_id: Option<i32>,
    #[serde(default)]
    pub member_values: BTreeMap<String, String>,
    #[serde(default)]
    pub pref_label: Labels,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_input_from_json() {
        let input: CodeInput = serde_json::from_value(serde_json::json!({
            "codeValue": "B",
            "order": 4,
            "broaderCode": { "codeValue": "A" },
            "status": "VALID",
            "prefLabel": { "fi": "Bee" }
        }))
        .unwrap();

        assert_eq!(input.code_value, "B");
        assert_eq!(input.order, Some(4));
        assert_eq!(input.broader_code, Some(EntityRef::code_value("A")));
        assert_eq!(input.status, Some(Status::Valid));
        assert_eq!(input.pref_label.get("fi"), Some("Bee"));
    }

    #[test]
    fn test_entity_ref_describe() {
        assert_eq!(EntityRef::code_value("A").describe(), "A");
        assert_eq!(EntityRef::uri("http://x/y").describe(), "http://x/y");
    }
}
