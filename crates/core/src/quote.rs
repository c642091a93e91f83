//! Quote (devis) status vocabulary.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The accept/refuse lifecycle of a single quote, independent of the
/// project stage. Wire names are the French forms used by all consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum QuoteStatus {
    #[default]
    #[serde(rename = "en_attente")]
    Pending,
    #[serde(rename = "accepte")]
    Accepted,
    #[serde(rename = "refuse")]
    Refused,
}

impl QuoteStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            QuoteStatus::Pending => "en_attente",
            QuoteStatus::Accepted => "accepte",
            QuoteStatus::Refused => "refuse",
        }
    }

    /// Whether this status is a terminal validation (accepted or refused).
    /// The first transition into a validated status stamps the quote's
    /// `validated_at`.
    pub fn is_validated(self) -> bool {
        matches!(self, QuoteStatus::Accepted | QuoteStatus::Refused)
    }
}

impl fmt::Display for QuoteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_names() {
        assert_eq!(
            serde_json::to_string(&QuoteStatus::Pending).unwrap(),
            "\"en_attente\""
        );
        assert_eq!(
            serde_json::from_str::<QuoteStatus>("\"accepte\"").unwrap(),
            QuoteStatus::Accepted
        );
        assert!(serde_json::from_str::<QuoteStatus>("\"accepted\"").is_err());
    }

    #[test]
    fn default_is_pending() {
        assert_eq!(QuoteStatus::default(), QuoteStatus::Pending);
        assert!(!QuoteStatus::Pending.is_validated());
        assert!(QuoteStatus::Refused.is_validated());
    }
}
