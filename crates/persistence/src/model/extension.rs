//! Extensions and their members.

// Field names mirror the JSON wire format
#![allow(missing_docs)]

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Labels, Status};

/// Where an extension's property type applies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PropertyContext {
    /// Scheme-level extension (hierarchies, cross references).
    #[default]
    Extension,
    /// Code-level extension. A scheme holds at most one per property type.
    CodeExtension,
}

/// The kind of an extension, e.g. `definitionHierarchy`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyType {
    pub local_name: String,
    #[serde(default)]
    pub context: PropertyContext,
}

impl PropertyType {
    /// Creates a scheme-level property type.
    pub fn extension(local_name: impl Into<String>) -> Self {
        Self {
            local_name: local_name.into(),
            context: PropertyContext::Extension,
        }
    }

    /// Creates a code-level property type.
    pub fn code_extension(local_name: impl Into<String>) -> Self {
        Self {
            local_name: local_name.into(),
            context: PropertyContext::CodeExtension,
        }
    }

    /// Returns true for code-level property types.
    pub fn is_code_context(&self) -> bool {
        self.context == PropertyContext::CodeExtension
    }
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.local_name)
    }
}

/// An extension of a code scheme scoping a set of members.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Extension {
    pub id: Uuid,
    pub parent_code_scheme_id: Uuid,
    pub code_value: String,
    pub uri: String,
    pub property_type: PropertyType,
    pub status: Status,
    #[serde(default)]
    pub pref_label: Labels,
    /// Linked schemes other than the parent.
    #[serde(default)]
    pub code_scheme_ids: Vec<Uuid>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
}

/// A member of an extension referencing one code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub id: Uuid,
    pub extension_id: Uuid,
    pub code_id: Uuid,
    #[serde(default)]
    pub related_member_id: Option<Uuid>,
    pub order: i32,
    pub sequence_id: i32,
    /// Typed values keyed by value type local name.
    #[serde(default)]
    pub member_values: BTreeMap<String, String>,
    #[serde(default)]
    pub pref_label: Labels,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    pub uri: String,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
}
