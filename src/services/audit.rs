use chrono::NaiveDate;

use crate::client::ApiClient;
use crate::error::Result;
use crate::models::audit::{AuditEvent, AuditFilter, AuditSummary};
use crate::services::authz::{self, Capability};

/// Queries the audit trail.
///
/// Administrative only: the check happens before any request is sent, so a
/// non-admin session never reaches the server.
///
/// # Arguments
///
/// * `client` - The API client.
/// * `filter` - Optional filters, forwarded as query parameters.
///
/// # Returns
///
/// The events in server order.
pub async fn query(client: &ApiClient, filter: &AuditFilter) -> Result<Vec<AuditEvent>> {
    authz::require(client.session().identity().as_ref(), Capability::AdminViews)?;

    let events: Vec<AuditEvent> = client
        .get_json_with_query("/auditoria/", &filter.query_pairs())
        .await?;

    tracing::debug!("📜 Audit query returned {} events", events.len());
    Ok(events)
}

pub fn summarize(events: &[AuditEvent], today: NaiveDate) -> AuditSummary {
    AuditSummary::from_events(events, today)
}
