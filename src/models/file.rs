use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::timestamp;

/// Metadata of a stored (encrypted) file, as returned by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileDescriptor {
    /// The server-assigned identifier.
    pub id: i64,
    /// The file name as uploaded.
    #[serde(rename = "nombre_original")]
    pub original_name: String,
    /// The declared MIME type.
    #[serde(rename = "tipo_mime", default)]
    pub mime_type: Option<String>,
    /// The plaintext size in bytes.
    #[serde(rename = "tamano_bytes")]
    pub size_bytes: u64,
    /// When the file was stored.
    #[serde(rename = "creado_en", with = "timestamp::option", default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// The per-user counters shown on the dashboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardStats {
    #[serde(rename = "totalArchivos")]
    pub total_files: u64,
    #[serde(rename = "archivosCifrados")]
    pub encrypted_files: u64,
    #[serde(rename = "clavesActivas")]
    pub active_keys: u64,
    /// Human-readable, e.g. "Hace 3 horas".
    #[serde(rename = "ultimaActividad", default)]
    pub last_activity: String,
    /// Human-readable, e.g. "0.25 GB".
    #[serde(rename = "espacioUsado", default)]
    pub space_used: String,
    #[serde(rename = "sistemaEstado", default)]
    pub system_status: String,
}
