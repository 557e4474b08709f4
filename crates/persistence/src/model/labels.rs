//! Localized label maps.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Language used when a label has no value for the requested language.
pub const FALLBACK_LANGUAGE: &str = "en";

/// An ordered map of language tag to localized text.
///
/// Lookups fall back to [`FALLBACK_LANGUAGE`]. Setting an empty value removes
/// the language from the map, and deserialized maps are filtered the same way.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    from = "BTreeMap<String, String>",
    into = "BTreeMap<String, String>"
)]
pub struct Labels(BTreeMap<String, String>);

impl Labels {
    /// Creates an empty label map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style setter.
    pub fn with(mut self, language: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(language, value);
        self
    }

    /// Sets the value for a language. An empty or blank value removes it.
    pub fn set(&mut self, language: impl Into<String>, value: impl Into<String>) {
        let language = language.into();
        let value = value.into();
        if value.trim().is_empty() {
            self.0.remove(&language);
        } else {
            self.0.insert(language, value);
        }
    }

    /// Returns the value for the language, falling back to English.
    pub fn get(&self, language: &str) -> Option<&str> {
        self.0
            .get(language)
            .or_else(|| self.0.get(FALLBACK_LANGUAGE))
            .map(String::as_str)
    }

    /// Returns true if no language has a value.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates the entries in language order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl From<BTreeMap<String, String>> for Labels {
    fn from(map: BTreeMap<String, String>) -> Self {
        map.into_iter().collect()
    }
}

impl From<Labels> for BTreeMap<String, String> {
    fn from(labels: Labels) -> Self {
        labels.0
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Labels {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut labels = Labels::new();
        for (k, v) in iter {
            labels.set(k, v);
        }
        labels
    }
}
