use serde::Deserialize;

use crate::client::ApiClient;
use crate::error::Result;
use crate::models::file::{DashboardStats, FileDescriptor};

#[derive(Deserialize)]
struct DeleteResponse {
    #[serde(rename = "mensaje", default)]
    message: Option<String>,
}

/// Lists the caller's files.
pub async fn list(client: &ApiClient) -> Result<Vec<FileDescriptor>> {
    let files: Vec<FileDescriptor> = client.get_json("/archivos/").await?;
    tracing::debug!("📂 Listed {} files", files.len());
    Ok(files)
}

/// Fetches one file's metadata.
pub async fn get(client: &ApiClient, file_id: i64) -> Result<FileDescriptor> {
    client.get_json(&format!("/archivos/{}", file_id)).await
}

/// Deletes a file.
pub async fn delete(client: &ApiClient, file_id: i64) -> Result<()> {
    let response: DeleteResponse = client.delete_json(&format!("/archivos/{}", file_id)).await?;
    tracing::info!(
        "🗑️ Deleted file {}: {}",
        file_id,
        response.message.as_deref().unwrap_or("ok")
    );
    Ok(())
}

/// Deletes a file, then re-fetches the listing.
///
/// The returned list is the server's view; nothing is patched locally.
pub async fn delete_and_refresh(client: &ApiClient, file_id: i64) -> Result<Vec<FileDescriptor>> {
    delete(client, file_id).await?;
    list(client).await
}

/// Fetches the dashboard counters.
pub async fn dashboard_stats(client: &ApiClient) -> Result<DashboardStats> {
    client.get_json("/dashboard/stats").await
}
