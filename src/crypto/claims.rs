//! Reads the claims of an access token without verifying its signature.
//!
//! The server stays authoritative for token validity; the client only needs
//! the subject, display name, roles and expiry to drive its own views.

use base64::{Engine as _, engine::general_purpose};
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;

use crate::models::identity::Identity;

/// The `sub` claim. Issuers put either a scalar or an identity object here.
#[derive(Deserialize)]
#[serde(untagged)]
enum Subject {
    Text(String),
    Number(i64),
    Object(SubjectObject),
}

#[derive(Deserialize)]
struct SubjectObject {
    id: Option<SubjectId>,
    usuario: Option<String>,
    roles: Option<Vec<String>>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SubjectId {
    Text(String),
    Number(i64),
}

#[derive(Deserialize)]
struct RawClaims {
    sub: Option<Subject>,
    usuario: Option<String>,
    nombre_usuario: Option<String>,
    roles: Option<Vec<String>>,
    exp: Option<f64>,
}

/// Decodes the payload segment of a three-segment token.
fn decode_segment(segment: &str) -> Option<Vec<u8>> {
    let trimmed = segment.trim_end_matches('=');
    general_purpose::URL_SAFE_NO_PAD
        .decode(trimmed)
        .or_else(|_| general_purpose::STANDARD_NO_PAD.decode(trimmed))
        .ok()
}

fn expiry(exp: f64) -> Option<DateTime<Utc>> {
    if !exp.is_finite() {
        return None;
    }
    Utc.timestamp_opt(exp.floor() as i64, 0).single()
}

/// Decodes the identity carried by `token`.
///
/// # Arguments
///
/// * `token` - The access token, as issued by the server.
///
/// # Returns
///
/// `None` when the token is not three dot-separated segments, the payload is
/// not a JSON object, or the subject or role claim is missing. Never panics.
pub fn decode(token: &str) -> Option<Identity> {
    let mut segments = token.split('.');
    let (Some(_header), Some(payload), Some(_signature), None) =
        (segments.next(), segments.next(), segments.next(), segments.next())
    else {
        tracing::debug!("Token rejected: expected three segments");
        return None;
    };

    let bytes = decode_segment(payload)?;
    let claims: RawClaims = match sonic_rs::from_slice(&bytes) {
        Ok(claims) => claims,
        Err(e) => {
            tracing::debug!("Token rejected: payload is not valid claims JSON: {}", e);
            return None;
        }
    };

    let (subject_id, subject_usuario, subject_roles) = match claims.sub? {
        Subject::Text(id) => (id, None, None),
        Subject::Number(id) => (id.to_string(), None, None),
        Subject::Object(obj) => {
            let id = match obj.id? {
                SubjectId::Text(id) => id,
                SubjectId::Number(id) => id.to_string(),
            };
            (id, obj.usuario, obj.roles)
        }
    };

    if subject_id.is_empty() {
        return None;
    }

    let roles = claims.roles.or(subject_roles)?;

    Some(Identity {
        subject_id,
        username: claims
            .usuario
            .or(claims.nombre_usuario)
            .or(subject_usuario)
            .unwrap_or_default(),
        roles: roles.into_iter().collect(),
        expires_at: claims.exp.and_then(expiry),
    })
}
