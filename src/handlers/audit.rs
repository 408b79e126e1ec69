use anyhow::Result;
use chrono::Utc;

use securevault_client::{
    models::audit::AuditFilter,
    services::audit as audit_service,
    state::AppState,
};

/// Handles `audit`.
pub async fn list(
    state: &AppState,
    search: Option<String>,
    action: Option<String>,
    status: Option<String>,
) -> Result<()> {
    let filter = AuditFilter { search, action, status };
    let events = audit_service::query(&state.client, &filter).await?;

    for event in &events {
        println!(
            "{:>6}  {:<25}  {:<10}  {:<12}  {}",
            event.id,
            event
                .created_at
                .map(|at| at.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_default(),
            event.status,
            event.action,
            match (&event.resource_type, &event.resource_id) {
                (Some(kind), Some(id)) => format!("{} {}", kind, id),
                (Some(kind), None) => kind.clone(),
                _ => String::new(),
            }
        );
    }

    let summary = audit_service::summarize(&events, Utc::now().date_naive());
    println!(
        "{} events: {} succeeded, {} failed, {} today",
        summary.total, summary.succeeded, summary.failed, summary.today
    );
    Ok(())
}
