use garde::Validate;
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::validation::auth::{validate_password, validate_username};

/// Login credentials.
#[derive(Serialize, Validate, Zeroize, ZeroizeOnDrop)]
pub struct LoginRequest {
    #[serde(rename = "correo")]
    #[garde(email)]
    pub email: String,
    #[serde(rename = "contrasena")]
    #[garde(length(min = 1))]
    pub password: String,
}

/// Registration data.
#[derive(Serialize, Validate, Zeroize, ZeroizeOnDrop)]
pub struct RegisterRequest {
    #[serde(rename = "correo")]
    #[garde(email)]
    pub email: String,
    #[serde(rename = "nombre_usuario")]
    #[garde(custom(validate_username))]
    pub username: String,
    #[serde(rename = "contrasena")]
    #[garde(custom(validate_password))]
    pub password: String,
}

impl RegisterRequest {
    /// The credentials to log in with once registered.
    pub fn login_request(&self) -> LoginRequest {
        LoginRequest {
            email: self.email.clone(),
            password: self.password.clone(),
        }
    }
}

/// The token pair issued at login.
#[derive(Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct LoginResponse {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token expiry as a Unix timestamp, when the server reports it.
    #[serde(rename = "expira_en", default)]
    #[zeroize(skip)]
    pub expires_at: Option<i64>,
}

/// The result of a registration.
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterResponse {
    #[serde(rename = "usuario_id")]
    pub user_id: i64,
    #[serde(rename = "mensaje", default)]
    pub message: Option<String>,
}

impl std::fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginRequest")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}
