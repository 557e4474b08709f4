//! Index documents and index mappings.
//!
//! Every entity is projected into one denormalized JSON document tagged with
//! its [`DocumentType`]. Localized label maps are declared `nested` so that
//! per-language term queries match within a single language entry.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::error::IndexError;
use crate::model::{Code, CodeRegistry, CodeScheme, Extension, Member};

/// The kind of entity a document projects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentType {
    /// A code registry.
    #[serde(rename = "coderegistry")]
    Registry,
    /// A code scheme, indexed as a register item of its registry.
    #[serde(rename = "codescheme")]
    Scheme,
    /// A code.
    Code,
    /// An extension.
    Extension,
    /// An extension member.
    Member,
}

impl DocumentType {
    /// Every document type in reindex order.
    pub const ALL: [DocumentType; 5] = [
        DocumentType::Registry,
        DocumentType::Scheme,
        DocumentType::Code,
        DocumentType::Extension,
        DocumentType::Member,
    ];

    /// Document types stored in the main index.
    pub const MAIN: [DocumentType; 3] = [
        DocumentType::Code,
        DocumentType::Extension,
        DocumentType::Member,
    ];

    /// Returns the wire name used in the `documentType` field.
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::Registry => "coderegistry",
            DocumentType::Scheme => "codescheme",
            DocumentType::Code => "code",
            DocumentType::Extension => "extension",
            DocumentType::Member => "member",
        }
    }

    /// Localized fields declared as `nested` in the mapping.
    pub fn localized_fields(&self) -> &'static [&'static str] {
        match self {
            DocumentType::Registry => &["prefLabel", "description"],
            DocumentType::Scheme | DocumentType::Code => &["prefLabel", "description", "definition"],
            DocumentType::Extension | DocumentType::Member => &["prefLabel"],
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentType {
    type Err = IndexError;

    /// Accepts the wire name, its plural, or the camel-cased API name
    /// (`codeRegistry`, `codeSchemes`, ...), case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.to_ascii_lowercase();
        let singular = normalized
            .strip_suffix("ies")
            .map(|stem| format!("{}y", stem))
            .or_else(|| normalized.strip_suffix('s').map(str::to_string))
            .unwrap_or_else(|| normalized.clone());

        DocumentType::ALL
            .into_iter()
            .find(|t| t.as_str() == normalized || t.as_str() == singular)
            .ok_or(IndexError::UnknownEntityType {
                name: s.to_string(),
            })
    }
}

/// One document ready for a bulk write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDocument {
    /// Document id, the entity's UUID.
    pub id: String,
    /// Kind of the projected entity.
    pub document_type: DocumentType,
    /// Registry code value for documents stored in per-registry indices.
    pub partition: Option<String>,
    /// The document body.
    pub body: Value,
}

impl IndexDocument {
    /// Creates a document from a prepared body. The `documentType` field is
    /// added to object bodies.
    pub fn new(id: impl Into<String>, document_type: DocumentType, mut body: Value) -> Self {
        if let Value::Object(map) = &mut body {
            map.insert(
                "documentType".to_string(),
                Value::String(document_type.as_str().to_string()),
            );
        }
        Self {
            id: id.into(),
            document_type,
            partition: None,
            body,
        }
    }

    /// Projects a registry.
    pub fn registry(registry: &CodeRegistry) -> Self {
        Self::new(
            registry.id.to_string(),
            DocumentType::Registry,
            json!({
                "id": registry.id,
                "codeValue": registry.code_value,
                "uri": registry.uri,
                "prefLabel": registry.pref_label,
                "description": registry.description,
                "created": registry.created,
                "modified": registry.modified,
            }),
        )
    }

    /// Projects a scheme into its registry's partition.
    pub fn scheme(scheme: &CodeScheme, registry: &CodeRegistry) -> Self {
        let mut document = Self::new(
            scheme.id.to_string(),
            DocumentType::Scheme,
            json!({
                "id": scheme.id,
                "codeValue": scheme.code_value,
                "uri": scheme.uri,
                "status": scheme.status,
                "prefLabel": scheme.pref_label,
                "description": scheme.description,
                "definition": scheme.definition,
                "cumulative": scheme.cumulative,
                "prevCodeschemeId": scheme.prev_codescheme_id,
                "defaultCode": scheme.default_code_id.map(|id| json!({ "id": id })),
                "codeRegistry": {
                    "id": registry.id,
                    "codeValue": registry.code_value,
                    "uri": registry.uri,
                },
                "created": scheme.created,
                "modified": scheme.modified,
            }),
        );
        document.partition = Some(registry.code_value.clone());
        document
    }

    /// Projects a code.
    pub fn code(code: &Code, scheme: &CodeScheme) -> Self {
        Self::new(
            code.id.to_string(),
            DocumentType::Code,
            json!({
                "id": code.id,
                "codeValue": code.code_value,
                "uri": code.uri,
                "order": code.order,
                "hierarchyLevel": code.hierarchy_level,
                "broaderCode": code.broader_code_id.map(|id| json!({ "id": id })),
                "status": code.status,
                "shortName": code.short_name,
                "startDate": code.start_date,
                "endDate": code.end_date,
                "prefLabel": code.pref_label,
                "description": code.description,
                "definition": code.definition,
                "codeScheme": {
                    "id": scheme.id,
                    "codeValue": scheme.code_value,
                    "uri": scheme.uri,
                },
                "created": code.created,
                "modified": code.modified,
            }),
        )
    }

    /// Projects an extension.
    pub fn extension(extension: &Extension, parent: &CodeScheme) -> Self {
        Self::new(
            extension.id.to_string(),
            DocumentType::Extension,
            json!({
                "id": extension.id,
                "codeValue": extension.code_value,
                "uri": extension.uri,
                "status": extension.status,
                "propertyType": extension.property_type,
                "prefLabel": extension.pref_label,
                "startDate": extension.start_date,
                "endDate": extension.end_date,
                "parentCodeScheme": {
                    "id": parent.id,
                    "codeValue": parent.code_value,
                    "uri": parent.uri,
                },
                "codeSchemes": extension
                    .code_scheme_ids
                    .iter()
                    .map(|id| json!({ "id": id }))
                    .collect::<Vec<_>>(),
                "created": extension.created,
                "modified": extension.modified,
            }),
        )
    }

    /// Projects a member.
    pub fn member(member: &Member, extension: &Extension, code: &Code) -> Self {
        Self::new(
            member.id.to_string(),
            DocumentType::Member,
            json!({
                "id": member.id,
                "uri": member.uri,
                "order": member.order,
                "sequenceId": member.sequence_id,
                "memberValues": member.member_values,
                "prefLabel": member.pref_label,
                "startDate": member.start_date,
                "endDate": member.end_date,
                "code": {
                    "id": code.id,
                    "codeValue": code.code_value,
                    "uri": code.uri,
                },
                "relatedMember": member.related_member_id.map(|id| json!({ "id": id })),
                "extension": {
                    "id": extension.id,
                    "codeValue": extension.code_value,
                },
                "created": member.created,
                "modified": member.modified,
            }),
        )
    }
}

/// Index-level settings applied on create.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSettings {
    /// Primary shard count.
    pub number_of_shards: u32,
    /// Replica count.
    pub number_of_replicas: u32,
    /// Refresh interval, e.g. `1s`.
    pub refresh_interval: String,
    /// Deepest result window a query may page to.
    pub max_result_window: u64,
}

/// Result window raised on every created index.
pub const MAX_RESULT_WINDOW: u64 = 500_000;

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            number_of_shards: 1,
            number_of_replicas: 0,
            refresh_interval: "1s".to_string(),
            max_result_window: MAX_RESULT_WINDOW,
        }
    }
}

impl IndexSettings {
    /// Renders the `settings` section of a create-index body.
    pub fn to_json(&self) -> Value {
        json!({
            "index": {
                "number_of_shards": self.number_of_shards,
                "number_of_replicas": self.number_of_replicas,
                "refresh_interval": self.refresh_interval,
                "max_result_window": self.max_result_window,
            }
        })
    }
}

/// Builds the `mappings` section covering the given document types.
pub fn mapping_for(types: &[DocumentType]) -> Value {
    let mut properties = Map::new();
    for field in ["id", "codeValue", "uri", "status", "documentType"] {
        properties.insert(field.to_string(), json!({ "type": "keyword" }));
    }
    for field in ["created", "modified", "startDate", "endDate"] {
        properties.insert(field.to_string(), json!({ "type": "date" }));
    }
    if types
        .iter()
        .any(|t| matches!(t, DocumentType::Code | DocumentType::Member))
    {
        properties.insert("order".to_string(), json!({ "type": "integer" }));
    }
    if types.contains(&DocumentType::Code) {
        properties.insert("hierarchyLevel".to_string(), json!({ "type": "integer" }));
    }
    for document_type in types {
        for field in document_type.localized_fields() {
            properties.insert(field.to_string(), json!({ "type": "nested" }));
        }
    }
    json!({ "properties": Value::Object(properties) })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    use crate::model::{Labels, Status};

    #[test]
    fn test_document_type_parsing() {
        assert_eq!("code".parse::<DocumentType>().unwrap(), DocumentType::Code);
        assert_eq!("codes".parse::<DocumentType>().unwrap(), DocumentType::Code);
        assert_eq!(
            "codeRegistries".parse::<DocumentType>().unwrap(),
            DocumentType::Registry
        );
        assert_eq!(
            "CodeScheme".parse::<DocumentType>().unwrap(),
            DocumentType::Scheme
        );
        assert!("patients".parse::<DocumentType>().is_err());
    }

    #[test]
    fn test_code_document_shape() {
        let now = Utc::now();
        let scheme = CodeScheme {
            id: Uuid::new_v4(),
            code_registry_id: Uuid::new_v4(),
            code_value: "kunnat".to_string(),
            uri: "http://u/jhs/kunnat".to_string(),
            status: Status::Valid,
            pref_label: Labels::new(),
            description: Labels::new(),
            definition: Labels::new(),
            prev_codescheme_id: None,
            cumulative: false,
            default_code_id: None,
            created: now,
            modified: now,
        };
        let broader = Uuid::new_v4();
        let code = Code {
            id: Uuid::new_v4(),
            code_scheme_id: scheme.id,
            code_value: "091".to_string(),
            uri: "http://u/jhs/kunnat/091".to_string(),
            order: 3,
            hierarchy_level: 2,
            broader_code_id: Some(broader),
            status: Status::Valid,
            short_name: None,
            start_date: None,
            end_date: None,
            pref_label: Labels::new().with("fi", "Helsinki"),
            description: Labels::new(),
            definition: Labels::new(),
            created: now,
            modified: now,
        };

        let document = IndexDocument::code(&code, &scheme);
        assert_eq!(document.id, code.id.to_string());
        assert_eq!(document.body["documentType"], "code");
        assert_eq!(document.body["order"], 3);
        assert_eq!(document.body["hierarchyLevel"], 2);
        assert_eq!(document.body["broaderCode"]["id"], broader.to_string());
        assert_eq!(document.body["prefLabel"]["fi"], "Helsinki");
        assert_eq!(document.body["codeScheme"]["codeValue"], "kunnat");
        assert_eq!(document.body["status"], "VALID");
        assert!(document.partition.is_none());
    }

    #[test]
    fn test_mapping_declares_nested_labels() {
        let mapping = mapping_for(&DocumentType::MAIN);
        assert_eq!(mapping["properties"]["prefLabel"]["type"], "nested");
        assert_eq!(mapping["properties"]["definition"]["type"], "nested");
        assert_eq!(mapping["properties"]["documentType"]["type"], "keyword");
        assert_eq!(mapping["properties"]["hierarchyLevel"]["type"], "integer");

        let registry_mapping = mapping_for(&[DocumentType::Registry]);
        assert!(registry_mapping["properties"].get("definition").is_none());
    }

    #[test]
    fn test_settings_raise_result_window() {
        let settings = IndexSettings::default().to_json();
        assert_eq!(settings["index"]["max_result_window"], 500_000);
    }
}
