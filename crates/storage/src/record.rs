use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use chantier_core::{QuoteStatus, Stage};

/// A client/project as stored in the backend.
///
/// `stage` is the single source of truth read by every other subsystem;
/// it is only mutated through the engine's apply path (OCC on `version`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientRecord {
    #[serde(rename = "clientId")]
    pub client_id: String,
    pub stage: Stage,
    pub version: i64,
    #[serde(rename = "lastModifiedAt", with = "time::serde::rfc3339")]
    pub last_modified_at: OffsetDateTime,
}

/// A quote (devis) attached to a client.
///
/// Invariant: `facture_reglee == true` implies `statut == Accepted`.
/// `validated_at` is stamped the first time `statut` becomes
/// accepte/refuse and never cleared afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteRecord {
    #[serde(rename = "devisId")]
    pub devis_id: String,
    #[serde(rename = "clientId")]
    pub client_id: String,
    pub title: String,
    pub montant: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub statut: QuoteStatus,
    pub facture_reglee: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fichier: Option<String>,
    #[serde(rename = "createdBy", default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    #[serde(rename = "dateCreation", with = "time::serde::rfc3339")]
    pub date_creation: OffsetDateTime,
    #[serde(
        rename = "validatedAt",
        default,
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub validated_at: Option<OffsetDateTime>,
}

impl QuoteRecord {
    /// Whether this quote is accepted and its invoice fully paid.
    pub fn is_settled(&self) -> bool {
        self.statut == QuoteStatus::Accepted && self.facture_reglee
    }
}

/// One row of the append-only stage duration ledger.
///
/// At most one row per client is open (`ended_at == None`) at any time.
/// Closing a row computes `duration_seconds = ended_at - started_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageHistoryRecord {
    pub id: String,
    #[serde(rename = "clientId")]
    pub client_id: String,
    #[serde(rename = "stageName")]
    pub stage_name: Stage,
    #[serde(rename = "startedAt", with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    #[serde(
        rename = "endedAt",
        default,
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub ended_at: Option<OffsetDateTime>,
    #[serde(rename = "durationSeconds", skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<i64>,
    #[serde(rename = "changedBy")]
    pub changed_by: String,
}

/// One row of the append-only human-readable audit trail. Never mutated
/// or deleted by this core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: String,
    #[serde(rename = "clientId")]
    pub client_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub date: OffsetDateTime,
    #[serde(rename = "type")]
    pub kind: String,
    pub description: String,
    pub author: String,
    #[serde(rename = "previousStatus")]
    pub previous_status: Stage,
    #[serde(rename = "newStatus")]
    pub new_status: Stage,
}
