//! The fixed project lifecycle enum and its classification sets.
//!
//! Stage names, ordering, and the classification sets below are
//! intentionally hard-coded to this business's pipeline; they are not
//! user-configurable.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// One value of the fixed project lifecycle.
///
/// Serializes to the exact wire name (e.g. `"needs_assessment"`); these
/// strings are shared with every reporting and aggregation collaborator
/// and must never drift.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Qualified,
    NeedsAssessment,
    DepositReceived,
    Design,
    Negotiation,
    Accepted,
    #[serde(rename = "deposit_1")]
    Deposit1,
    InProgress,
    SiteWork,
    InvoiceSettled,
    Delivery,
    DeliveryDone,
    Completed,
    Refused,
    Lost,
    Cancelled,
    Suspended,
}

impl Stage {
    /// All stage values, in pipeline order.
    pub const ALL: [Stage; 17] = [
        Stage::Qualified,
        Stage::NeedsAssessment,
        Stage::DepositReceived,
        Stage::Design,
        Stage::Negotiation,
        Stage::Accepted,
        Stage::Deposit1,
        Stage::InProgress,
        Stage::SiteWork,
        Stage::InvoiceSettled,
        Stage::Delivery,
        Stage::DeliveryDone,
        Stage::Completed,
        Stage::Refused,
        Stage::Lost,
        Stage::Cancelled,
        Stage::Suspended,
    ];

    /// The wire name of this stage.
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Qualified => "qualified",
            Stage::NeedsAssessment => "needs_assessment",
            Stage::DepositReceived => "deposit_received",
            Stage::Design => "design",
            Stage::Negotiation => "negotiation",
            Stage::Accepted => "accepted",
            Stage::Deposit1 => "deposit_1",
            Stage::InProgress => "in_progress",
            Stage::SiteWork => "site_work",
            Stage::InvoiceSettled => "invoice_settled",
            Stage::Delivery => "delivery",
            Stage::DeliveryDone => "delivery_done",
            Stage::Completed => "completed",
            Stage::Refused => "refused",
            Stage::Lost => "lost",
            Stage::Cancelled => "cancelled",
            Stage::Suspended => "suspended",
        }
    }

    /// Early pipeline stages from which an accepted quote promotes the
    /// project straight to `accepted`.
    pub fn is_early(self) -> bool {
        matches!(
            self,
            Stage::Qualified
                | Stage::DepositReceived
                | Stage::Design
                | Stage::Negotiation
                | Stage::Refused
        )
    }

    /// Stages that a quote reverting to pending may roll back to
    /// `negotiation`.
    pub fn is_revertible(self) -> bool {
        matches!(self, Stage::Accepted | Stage::Refused)
    }

    /// Stages where physical work is in progress (or done). Quote data
    /// alone can never regress the project out of a locked stage.
    pub fn is_locked(self) -> bool {
        matches!(
            self,
            Stage::Deposit1
                | Stage::InProgress
                | Stage::SiteWork
                | Stage::InvoiceSettled
                | Stage::Delivery
                | Stage::DeliveryDone
                | Stage::Completed
        )
    }

    /// Stages from which full settlement of all accepted quotes promotes
    /// the project to `invoice_settled`.
    pub fn is_pre_settlement(self) -> bool {
        matches!(
            self,
            Stage::Qualified
                | Stage::NeedsAssessment
                | Stage::DepositReceived
                | Stage::Design
                | Stage::Negotiation
                | Stage::Accepted
                | Stage::Deposit1
                | Stage::InProgress
        )
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown stage name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageParseError {
    pub name: String,
}

impl fmt::Display for StageParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown stage name: '{}'", self.name)
    }
}

impl std::error::Error for StageParseError {}

impl FromStr for Stage {
    type Err = StageParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Stage::ALL
            .iter()
            .copied()
            .find(|stage| stage.as_str() == s)
            .ok_or_else(|| StageParseError { name: s.to_string() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_names_round_trip() {
        for stage in Stage::ALL {
            let parsed: Stage = stage.as_str().parse().unwrap();
            assert_eq!(parsed, stage);
            let json = serde_json::to_string(&stage).unwrap();
            assert_eq!(json, format!("\"{}\"", stage.as_str()));
            let back: Stage = serde_json::from_str(&json).unwrap();
            assert_eq!(back, stage);
        }
    }

    #[test]
    fn unknown_name_is_rejected() {
        assert!("deposit_2".parse::<Stage>().is_err());
        assert!(serde_json::from_str::<Stage>("\"on_hold\"").is_err());
    }

    #[test]
    fn classification_sets_match_the_pipeline() {
        let early: Vec<Stage> = Stage::ALL.iter().copied().filter(|s| s.is_early()).collect();
        assert_eq!(
            early,
            vec![
                Stage::Qualified,
                Stage::DepositReceived,
                Stage::Design,
                Stage::Negotiation,
                Stage::Refused,
            ]
        );

        let locked: Vec<Stage> = Stage::ALL.iter().copied().filter(|s| s.is_locked()).collect();
        assert_eq!(
            locked,
            vec![
                Stage::Deposit1,
                Stage::InProgress,
                Stage::SiteWork,
                Stage::InvoiceSettled,
                Stage::Delivery,
                Stage::DeliveryDone,
                Stage::Completed,
            ]
        );

        // Revertible and locked are disjoint.
        for stage in Stage::ALL {
            assert!(!(stage.is_revertible() && stage.is_locked()));
        }
    }
}
