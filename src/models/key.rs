use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::timestamp;

/// Metadata of the server-held wrapping key. Never carries key material.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyDescriptor {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(rename = "etiqueta", default)]
    pub label: String,
    #[serde(rename = "activa")]
    pub is_active: bool,
    #[serde(rename = "creada_en", with = "timestamp::option", default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// The body of a key generation request.
#[derive(Debug, Default, Serialize)]
pub struct GenerateKeyRequest {
    #[serde(rename = "etiqueta", skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl GenerateKeyRequest {
    /// Builds a request, dropping blank labels.
    pub fn new(label: Option<&str>) -> Self {
        Self {
            label: label
                .map(str::trim)
                .filter(|label| !label.is_empty())
                .map(str::to_string),
        }
    }
}
