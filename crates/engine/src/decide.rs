//! The pure stage decision table.
//!
//! `decide` receives the full, just-persisted quote list for the client
//! (never a delta), because every rule depends on aggregate state ("are all
//! quotes refused", "are all accepted quotes settled"). Each rule is gated
//! on a distinct trigger event; within the revert event, rules A, B, C are
//! evaluated in order and the first match wins.
//!
//! A decision whose target equals the current stage is suppressed, so
//! re-running the engine on the same persisted quote set is a no-op.

use chantier_core::{QuoteStatus, Stage};
use chantier_storage::QuoteRecord;

/// The quote/settlement fact change that triggers a re-evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerEvent {
    /// A quote's statut became `accepte` (including accepted at creation).
    QuoteAccepted,
    /// A quote's statut became `refuse`.
    QuoteRefused,
    /// A quote's statut went from accepte/refuse back to `en_attente`.
    QuoteReverted {
        was_accepted: bool,
        was_settled: bool,
    },
    /// `facture_reglee` flipped false -> true on an accepted quote.
    SettlementSet,
    /// `facture_reglee` flipped true -> false on an accepted quote.
    SettlementCleared,
}

/// Identifies which rule of the decision table fired; keys the audit
/// description template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleId {
    /// A quote was accepted while the project was in an early stage.
    AcceptanceProgression,
    /// Every quote for the client is now refused.
    AllQuotesRefused,
    /// Revert rule A: a settled quote went back to pending.
    SettledQuoteUnpaid,
    /// Revert rule B: every quote is back to pending.
    AllQuotesPending,
    /// Revert rule C: the last accepted quote went back to pending.
    LastAcceptedReverted,
    /// Settlement cleared while the project sat at invoice_settled.
    SettlementIncomplete,
    /// Every accepted quote is now settled.
    SettlementComplete,
}

impl RuleId {
    /// Human-readable audit description for this rule, interpolating the
    /// title of the quote that triggered the mutation.
    pub fn describe(self, quote_title: &str) -> String {
        match self {
            RuleId::AcceptanceProgression => format!(
                "Stage updated automatically following acceptance of quote '{quote_title}'"
            ),
            RuleId::AllQuotesRefused => {
                "Stage updated automatically: every quote has been refused".to_string()
            }
            RuleId::SettledQuoteUnpaid => format!(
                "Stage reverted automatically: settled quote '{quote_title}' returned to pending"
            ),
            RuleId::AllQuotesPending => format!(
                "Stage reverted automatically: all quotes back to pending after '{quote_title}' was reverted"
            ),
            RuleId::LastAcceptedReverted => format!(
                "Stage reverted automatically: last accepted quote '{quote_title}' returned to pending"
            ),
            RuleId::SettlementIncomplete => format!(
                "Stage reverted automatically: invoice settlement cleared on quote '{quote_title}'"
            ),
            RuleId::SettlementComplete => {
                "Stage updated automatically: all accepted quotes settled".to_string()
            }
        }
    }
}

/// The outcome of one rule firing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub target: Stage,
    pub rule: RuleId,
}

/// Decide whether `event` warrants a stage change.
///
/// `quotes` must be the full quote set for the client as just persisted.
/// Returns `None` when no rule matches or when the matched target equals
/// the current stage (idempotence).
pub fn decide(current: Stage, quotes: &[QuoteRecord], event: &TriggerEvent) -> Option<Decision> {
    let decision = match event {
        TriggerEvent::QuoteAccepted => on_accepted(current),
        TriggerEvent::QuoteRefused => on_refused(current, quotes),
        TriggerEvent::QuoteReverted {
            was_accepted,
            was_settled,
        } => on_reverted(current, quotes, *was_accepted, *was_settled),
        TriggerEvent::SettlementCleared => on_settlement_cleared(current, quotes),
        TriggerEvent::SettlementSet => on_settlement_set(current, quotes),
    }?;
    (decision.target != current).then_some(decision)
}

fn on_accepted(current: Stage) -> Option<Decision> {
    current.is_early().then_some(Decision {
        target: Stage::Accepted,
        rule: RuleId::AcceptanceProgression,
    })
}

/// LOCKED stages are immune here too: a refusal is quote data alone, and
/// quote data never regresses the project out of a locked stage.
fn on_refused(current: Stage, quotes: &[QuoteRecord]) -> Option<Decision> {
    let all_refused = !quotes.is_empty()
        && quotes.iter().all(|q| q.statut == QuoteStatus::Refused);
    (all_refused && !current.is_locked()).then_some(Decision {
        target: Stage::Refused,
        rule: RuleId::AllQuotesRefused,
    })
}

/// Revert rules, evaluated A -> B -> C; the first match wins.
fn on_reverted(
    current: Stage,
    quotes: &[QuoteRecord],
    was_accepted: bool,
    was_settled: bool,
) -> Option<Decision> {
    let accepted: Vec<&QuoteRecord> = quotes
        .iter()
        .filter(|q| q.statut == QuoteStatus::Accepted)
        .collect();
    let any_refused = quotes.iter().any(|q| q.statut == QuoteStatus::Refused);
    let all_pending = quotes.iter().all(|q| q.statut == QuoteStatus::Pending);

    // A: a paid quote was un-paid by the revert.
    if was_accepted && was_settled && current == Stage::InvoiceSettled {
        let all_settled = !accepted.is_empty() && accepted.iter().all(|q| q.is_settled());
        if accepted.is_empty() || !all_settled {
            let target = if accepted.is_empty() {
                Stage::Negotiation
            } else {
                Stage::Accepted
            };
            return Some(Decision {
                target,
                rule: RuleId::SettledQuoteUnpaid,
            });
        }
    }

    // B: everything is back to pending. LOCKED stages are immune to
    // quote-driven regression.
    if all_pending && current.is_revertible() && !current.is_locked() {
        return Some(Decision {
            target: Stage::Negotiation,
            rule: RuleId::AllQuotesPending,
        });
    }

    // C: the reverted quote was the last accepted one.
    if accepted.is_empty() && !any_refused && current == Stage::Accepted {
        return Some(Decision {
            target: Stage::Negotiation,
            rule: RuleId::LastAcceptedReverted,
        });
    }

    None
}

fn on_settlement_cleared(current: Stage, quotes: &[QuoteRecord]) -> Option<Decision> {
    // Refused quotes are ignored: only the accepted set matters here.
    let accepted: Vec<&QuoteRecord> = quotes
        .iter()
        .filter(|q| q.statut == QuoteStatus::Accepted)
        .collect();
    let not_all_settled = !accepted.is_empty() && !accepted.iter().all(|q| q.is_settled());
    (not_all_settled && current == Stage::InvoiceSettled).then_some(Decision {
        target: Stage::Accepted,
        rule: RuleId::SettlementIncomplete,
    })
}

fn on_settlement_set(current: Stage, quotes: &[QuoteRecord]) -> Option<Decision> {
    let accepted: Vec<&QuoteRecord> = quotes
        .iter()
        .filter(|q| q.statut == QuoteStatus::Accepted)
        .collect();
    let all_settled = !accepted.is_empty() && accepted.iter().all(|q| q.is_settled());
    (all_settled && current.is_pre_settlement()).then_some(Decision {
        target: Stage::InvoiceSettled,
        rule: RuleId::SettlementComplete,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use time::macros::datetime;

    fn quote(statut: QuoteStatus, settled: bool) -> QuoteRecord {
        QuoteRecord {
            devis_id: "devis-1".to_string(),
            client_id: "client-1".to_string(),
            title: "Veranda".to_string(),
            montant: Decimal::new(800_000, 2),
            description: None,
            statut,
            facture_reglee: settled,
            notes: None,
            fichier: None,
            created_by: None,
            date_creation: datetime!(2026-01-01 00:00:00 UTC),
            validated_at: None,
        }
    }

    // ── Acceptance progression ────────────────────────────────────────────

    #[test]
    fn acceptance_from_every_early_stage_targets_accepted() {
        let quotes = [quote(QuoteStatus::Accepted, false)];
        for stage in [
            Stage::Qualified,
            Stage::DepositReceived,
            Stage::Design,
            Stage::Negotiation,
            Stage::Refused,
        ] {
            let d = decide(stage, &quotes, &TriggerEvent::QuoteAccepted).unwrap();
            assert_eq!(d.target, Stage::Accepted);
            assert_eq!(d.rule, RuleId::AcceptanceProgression);
        }
    }

    #[test]
    fn acceptance_from_non_early_stage_is_ignored() {
        let quotes = [quote(QuoteStatus::Accepted, false)];
        for stage in [
            Stage::NeedsAssessment,
            Stage::Accepted,
            Stage::InProgress,
            Stage::SiteWork,
            Stage::InvoiceSettled,
            Stage::Completed,
            Stage::Lost,
        ] {
            assert!(decide(stage, &quotes, &TriggerEvent::QuoteAccepted).is_none());
        }
    }

    // ── All refused ───────────────────────────────────────────────────────

    #[test]
    fn refusal_of_last_quote_targets_refused() {
        let quotes = [
            quote(QuoteStatus::Refused, false),
            quote(QuoteStatus::Refused, false),
        ];
        let d = decide(Stage::Negotiation, &quotes, &TriggerEvent::QuoteRefused).unwrap();
        assert_eq!(d.target, Stage::Refused);
        assert_eq!(d.rule, RuleId::AllQuotesRefused);
    }

    #[test]
    fn refusal_with_a_pending_quote_remaining_is_ignored() {
        let quotes = [
            quote(QuoteStatus::Refused, false),
            quote(QuoteStatus::Pending, false),
        ];
        assert!(decide(Stage::Negotiation, &quotes, &TriggerEvent::QuoteRefused).is_none());
    }

    #[test]
    fn refusal_from_a_locked_stage_never_regresses() {
        let quotes = [quote(QuoteStatus::Refused, false)];
        for stage in [
            Stage::Deposit1,
            Stage::InProgress,
            Stage::SiteWork,
            Stage::InvoiceSettled,
            Stage::Delivery,
            Stage::DeliveryDone,
            Stage::Completed,
        ] {
            assert!(
                decide(stage, &quotes, &TriggerEvent::QuoteRefused).is_none(),
                "stage {stage}"
            );
        }
    }

    #[test]
    fn refusal_while_already_refused_is_a_no_op() {
        let quotes = [quote(QuoteStatus::Refused, false)];
        assert!(decide(Stage::Refused, &quotes, &TriggerEvent::QuoteRefused).is_none());
    }

    // ── Revert rules A, B, C ──────────────────────────────────────────────

    #[test]
    fn rule_a_unpaid_revert_with_accepted_quotes_remaining_targets_accepted() {
        // The settled quote went back to pending; another accepted, unsettled
        // quote remains.
        let quotes = [
            quote(QuoteStatus::Pending, false),
            quote(QuoteStatus::Accepted, false),
        ];
        let event = TriggerEvent::QuoteReverted {
            was_accepted: true,
            was_settled: true,
        };
        let d = decide(Stage::InvoiceSettled, &quotes, &event).unwrap();
        assert_eq!(d.target, Stage::Accepted);
        assert_eq!(d.rule, RuleId::SettledQuoteUnpaid);
    }

    #[test]
    fn rule_a_unpaid_revert_with_no_accepted_quotes_targets_negotiation() {
        let quotes = [quote(QuoteStatus::Pending, false)];
        let event = TriggerEvent::QuoteReverted {
            was_accepted: true,
            was_settled: true,
        };
        let d = decide(Stage::InvoiceSettled, &quotes, &event).unwrap();
        assert_eq!(d.target, Stage::Negotiation);
        assert_eq!(d.rule, RuleId::SettledQuoteUnpaid);
    }

    #[test]
    fn rule_a_does_not_fire_when_remaining_accepted_quotes_are_all_settled() {
        let quotes = [
            quote(QuoteStatus::Pending, false),
            quote(QuoteStatus::Accepted, true),
        ];
        let event = TriggerEvent::QuoteReverted {
            was_accepted: true,
            was_settled: true,
        };
        assert!(decide(Stage::InvoiceSettled, &quotes, &event).is_none());
    }

    #[test]
    fn rule_b_all_pending_rolls_back_to_negotiation() {
        let quotes = [
            quote(QuoteStatus::Pending, false),
            quote(QuoteStatus::Pending, false),
        ];
        let event = TriggerEvent::QuoteReverted {
            was_accepted: false,
            was_settled: false,
        };
        for stage in [Stage::Accepted, Stage::Refused] {
            let d = decide(stage, &quotes, &event).unwrap();
            assert_eq!(d.target, Stage::Negotiation);
            assert_eq!(d.rule, RuleId::AllQuotesPending);
        }
    }

    #[test]
    fn locked_stages_are_immune_to_quote_driven_regression() {
        let quotes = [quote(QuoteStatus::Pending, false)];
        let event = TriggerEvent::QuoteReverted {
            was_accepted: false,
            was_settled: false,
        };
        for stage in [
            Stage::Deposit1,
            Stage::InProgress,
            Stage::SiteWork,
            Stage::Delivery,
            Stage::DeliveryDone,
            Stage::Completed,
        ] {
            assert!(decide(stage, &quotes, &event).is_none(), "stage {stage}");
        }
    }

    #[test]
    fn reverting_last_accepted_quote_rolls_back_to_negotiation() {
        // With the last accepted quote reverted, every quote is pending, so
        // rule B matches before rule C in the A -> B -> C order. Either way
        // the target is negotiation.
        let quotes = [
            quote(QuoteStatus::Pending, false),
            quote(QuoteStatus::Pending, false),
        ];
        let event = TriggerEvent::QuoteReverted {
            was_accepted: true,
            was_settled: false,
        };
        let d = decide(Stage::Accepted, &quotes, &event).unwrap();
        assert_eq!(d.rule, RuleId::AllQuotesPending);
        assert_eq!(d.target, Stage::Negotiation);
    }

    #[test]
    fn rule_order_is_a_then_b_then_c() {
        // Conditions for both A and B: current = invoice_settled is not
        // revertible, so only A can fire; target negotiation.
        let quotes = [quote(QuoteStatus::Pending, false)];
        let event = TriggerEvent::QuoteReverted {
            was_accepted: true,
            was_settled: true,
        };
        let d = decide(Stage::InvoiceSettled, &quotes, &event).unwrap();
        assert_eq!(d.rule, RuleId::SettledQuoteUnpaid);
    }

    // ── Settlement rules ──────────────────────────────────────────────────

    #[test]
    fn settlement_cleared_reverts_invoice_settled_to_accepted() {
        let quotes = [quote(QuoteStatus::Accepted, false)];
        let d = decide(
            Stage::InvoiceSettled,
            &quotes,
            &TriggerEvent::SettlementCleared,
        )
        .unwrap();
        assert_eq!(d.target, Stage::Accepted);
        assert_eq!(d.rule, RuleId::SettlementIncomplete);
    }

    #[test]
    fn settlement_cleared_ignores_refused_quotes() {
        let quotes = [
            quote(QuoteStatus::Accepted, false),
            quote(QuoteStatus::Refused, false),
        ];
        let d = decide(
            Stage::InvoiceSettled,
            &quotes,
            &TriggerEvent::SettlementCleared,
        )
        .unwrap();
        assert_eq!(d.target, Stage::Accepted);
    }

    #[test]
    fn settlement_cleared_outside_invoice_settled_is_ignored() {
        let quotes = [quote(QuoteStatus::Accepted, false)];
        assert!(decide(Stage::Accepted, &quotes, &TriggerEvent::SettlementCleared).is_none());
    }

    #[test]
    fn full_settlement_promotes_pre_settlement_stages() {
        let quotes = [
            quote(QuoteStatus::Accepted, true),
            quote(QuoteStatus::Refused, false),
        ];
        for stage in [
            Stage::Qualified,
            Stage::NeedsAssessment,
            Stage::DepositReceived,
            Stage::Design,
            Stage::Negotiation,
            Stage::Accepted,
            Stage::Deposit1,
            Stage::InProgress,
        ] {
            let d = decide(stage, &quotes, &TriggerEvent::SettlementSet).unwrap();
            assert_eq!(d.target, Stage::InvoiceSettled);
            assert_eq!(d.rule, RuleId::SettlementComplete);
        }
    }

    #[test]
    fn partial_settlement_does_not_promote() {
        let quotes = [
            quote(QuoteStatus::Accepted, true),
            quote(QuoteStatus::Accepted, false),
        ];
        assert!(decide(Stage::Accepted, &quotes, &TriggerEvent::SettlementSet).is_none());
    }

    #[test]
    fn settlement_with_no_accepted_quotes_does_not_promote() {
        let quotes = [quote(QuoteStatus::Refused, false)];
        assert!(decide(Stage::Accepted, &quotes, &TriggerEvent::SettlementSet).is_none());
    }

    // ── Idempotence ───────────────────────────────────────────────────────

    #[test]
    fn second_evaluation_on_same_quote_set_is_a_no_op() {
        let quotes = [quote(QuoteStatus::Accepted, false)];
        let d = decide(Stage::Negotiation, &quotes, &TriggerEvent::QuoteAccepted).unwrap();
        assert_eq!(d.target, Stage::Accepted);
        // Re-running from the new stage with the unchanged quote set.
        assert!(decide(d.target, &quotes, &TriggerEvent::QuoteAccepted).is_none());
    }
}
