//! Lifecycle status of schemes, codes and extensions.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Lifecycle status.
///
/// Variants are declared in their ordinal order, so the derived `Ord` matches
/// `INCOMPLETE < DRAFT < SUGGESTED < SUBMITTED < VALID < SUPERSEDED < RETIRED < INVALID`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    /// Incomplete content.
    Incomplete,
    /// Work in progress.
    #[default]
    Draft,
    /// Suggested for publication.
    Suggested,
    /// Submitted for review.
    Submitted,
    /// Published and valid.
    Valid,
    /// Replaced by a newer version.
    Superseded,
    /// No longer in use.
    Retired,
    /// Published in error.
    Invalid,
}

impl Status {
    /// All statuses in ordinal order.
    pub const ALL: [Status; 8] = [
        Status::Incomplete,
        Status::Draft,
        Status::Suggested,
        Status::Submitted,
        Status::Valid,
        Status::Superseded,
        Status::Retired,
        Status::Invalid,
    ];

    /// Returns the wire name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Incomplete => "INCOMPLETE",
            Status::Draft => "DRAFT",
            Status::Suggested => "SUGGESTED",
            Status::Submitted => "SUBMITTED",
            Status::Valid => "VALID",
            Status::Superseded => "SUPERSEDED",
            Status::Retired => "RETIRED",
            Status::Invalid => "INVALID",
        }
    }

    /// Returns true for statuses at or above `VALID`.
    pub fn is_published(&self) -> bool {
        *self >= Status::Valid
    }

    /// Returns true if moving from `self` to `to` demotes published content
    /// back into an unpublished state.
    pub fn is_demotion_to(&self, to: Status) -> bool {
        self.is_published() && !to.is_published()
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Status::ALL
            .iter()
            .copied()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ValidationError::MissingRequiredField {
                field: format!("status (unknown value '{}')", s),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_ordering() {
        assert!(Status::Incomplete < Status::Draft);
        assert!(Status::Submitted < Status::Valid);
        assert!(Status::Retired < Status::Invalid);
    }

    #[test]
    fn test_demotion() {
        assert!(Status::Valid.is_demotion_to(Status::Draft));
        assert!(Status::Retired.is_demotion_to(Status::Submitted));
        assert!(!Status::Valid.is_demotion_to(Status::Retired));
        assert!(!Status::Draft.is_demotion_to(Status::Valid));
    }

    #[test]
    fn test_parse_and_display() {
        assert_eq!("valid".parse::<Status>().unwrap(), Status::Valid);
        assert_eq!(Status::Superseded.to_string(), "SUPERSEDED");
        assert!("bogus".parse::<Status>().is_err());
    }

    #[test]
    fn test_serde_wire_name() {
        let json = serde_json::to_string(&Status::Incomplete).unwrap();
        assert_eq!(json, "\"INCOMPLETE\"");
    }
}
