//! Canonical resource URIs.

use uuid::Uuid;

/// Builds canonical URIs from a configured base.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UriBuilder {
    base: String,
}

impl UriBuilder {
    /// Creates a builder. A trailing slash on the base is ignored.
    pub fn new(base: impl Into<String>) -> Self {
        let base = base.into();
        Self {
            base: base.trim_end_matches('/').to_string(),
        }
    }

    /// Returns the base URI.
    pub fn base(&self) -> &str {
        &self.base
    }

    /// `{base}/{registry}`
    pub fn registry(&self, registry: &str) -> String {
        format!("{}/{}", self.base, registry)
    }

    /// `{base}/{registry}/{scheme}`
    pub fn scheme(&self, registry: &str, scheme: &str) -> String {
        format!("{}/{}", self.registry(registry), scheme)
    }

    /// `{base}/{registry}/{scheme}/{code}`
    pub fn code(&self, registry: &str, scheme: &str, code: &str) -> String {
        format!("{}/{}", self.scheme(registry, scheme), code)
    }

    /// `{base}/{registry}/{scheme}/extension/{extension}`
    pub fn extension(&self, registry: &str, scheme: &str, extension: &str) -> String {
        format!("{}/extension/{}", self.scheme(registry, scheme), extension)
    }

    /// `{base}/{registry}/{scheme}/extension/{extension}/member/{id}`
    pub fn member(&self, registry: &str, scheme: &str, extension: &str, id: Uuid) -> String {
        format!("{}/member/{}", self.extension(registry, scheme, extension), id)
    }
}

impl Default for UriBuilder {
    fn default() -> Self {
        Self::new("http://uri.suomi.fi/codelist")
    }
}
