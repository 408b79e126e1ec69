use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::models::timestamp;

/// The status value the server records for successful operations.
pub const STATUS_SUCCESS: &str = "SUCCESS";

/// One entry of the audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: i64,
    #[serde(rename = "accion")]
    pub action: String,
    #[serde(rename = "tipo_recurso", default)]
    pub resource_type: Option<String>,
    #[serde(rename = "recurso_id", default)]
    pub resource_id: Option<String>,
    #[serde(rename = "estado")]
    pub status: String,
    #[serde(rename = "creado_en", with = "timestamp::option", default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl AuditEvent {
    pub fn succeeded(&self) -> bool {
        self.status == STATUS_SUCCESS
    }
}

/// Optional filters forwarded as query parameters.
#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    /// Free-text search (`busqueda`).
    pub search: Option<String>,
    /// Action filter (`accion`).
    pub action: Option<String>,
    /// Status filter (`estado`).
    pub status: Option<String>,
}

impl AuditFilter {
    /// Returns the non-blank filters as query pairs.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        [
            ("busqueda", &self.search),
            ("accion", &self.action),
            ("estado", &self.status),
        ]
        .into_iter()
        .filter_map(|(name, value)| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(|v| (name, v.to_string()))
        })
        .collect()
    }
}

/// Counters derived from a list of audit events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AuditSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Events created on the given day (UTC).
    pub today: usize,
}

impl AuditSummary {
    /// Tallies `events`, counting those created on `today`.
    pub fn from_events(events: &[AuditEvent], today: NaiveDate) -> Self {
        events.iter().fold(Self::default(), |mut summary, event| {
            summary.total += 1;
            if event.succeeded() {
                summary.succeeded += 1;
            } else {
                summary.failed += 1;
            }
            if event.created_at.is_some_and(|at| at.date_naive() == today) {
                summary.today += 1;
            }
            summary
        })
    }
}
