//! Capability checks consumed by the mutation services.
//!
//! Authentication happens elsewhere; the services only ask yes/no questions
//! about the caller.

use std::collections::HashSet;
use std::fmt::Debug;

use crate::model::{CodeRegistry, natural_key};

/// Answers capability questions about the current caller.
pub trait AuthorizationPolicy: Send + Sync + Debug {
    /// Returns true for callers with unrestricted access.
    fn is_superuser(&self) -> bool;

    /// Returns true if the caller may modify the registry and its content.
    fn can_modify_registry(&self, registry: &CodeRegistry) -> bool;
}

/// Unrestricted caller.
#[derive(Debug, Clone, Copy, Default)]
pub struct Superuser;

impl AuthorizationPolicy for Superuser {
    fn is_superuser(&self) -> bool {
        true
    }

    fn can_modify_registry(&self, _registry: &CodeRegistry) -> bool {
        true
    }
}

/// Caller allowed to edit the content of a fixed set of registries.
#[derive(Debug, Clone, Default)]
pub struct RegistryEditor {
    registries: HashSet<String>,
}

impl RegistryEditor {
    /// Creates an editor for the given registry code values.
    pub fn new<I, T>(registries: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        Self {
            registries: registries
                .into_iter()
                .map(|registry| natural_key(registry.as_ref()))
                .collect(),
        }
    }
}

impl AuthorizationPolicy for RegistryEditor {
    fn is_superuser(&self) -> bool {
        false
    }

    fn can_modify_registry(&self, registry: &CodeRegistry) -> bool {
        self.registries.contains(&natural_key(&registry.code_value))
    }
}

/// Caller without write access.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadOnly;

impl AuthorizationPolicy for ReadOnly {
    fn is_superuser(&self) -> bool {
        false
    }

    fn can_modify_registry(&self, _registry: &CodeRegistry) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    use crate::model::Labels;

    fn registry(code_value: &str) -> CodeRegistry {
        CodeRegistry {
            id: Uuid::new_v4(),
            code_value: code_value.to_string(),
            uri: format!("http://uri.suomi.fi/codelist/{}", code_value),
            pref_label: Labels::new(),
            description: Labels::new(),
            created: Utc::now(),
            modified: Utc::now(),
        }
    }

    #[test]
    fn test_registry_editor_is_case_insensitive() {
        let editor = RegistryEditor::new(["JHS"]);
        assert!(editor.can_modify_registry(&registry("jhs")));
        assert!(!editor.can_modify_registry(&registry("other")));
        assert!(!editor.is_superuser());
    }

    #[test]
    fn test_superuser_and_read_only() {
        let jhs = registry("jhs");
        assert!(Superuser.is_superuser());
        assert!(Superuser.can_modify_registry(&jhs));
        assert!(!ReadOnly.can_modify_registry(&jhs));
    }
}
