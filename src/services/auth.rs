use chrono::{DateTime, Utc};
use garde::Validate;

use crate::client::ApiClient;
use crate::error::{AppError, Result};
use crate::models::session::{Session, TokenPair};
use crate::models::user::{LoginRequest, LoginResponse, RegisterRequest, RegisterResponse};

/// Logs in and establishes the session.
///
/// A successful login replaces any session already in place.
///
/// # Arguments
///
/// * `client` - The API client.
/// * `request` - The credentials.
///
/// # Returns
///
/// A `Result` containing the new `Session`.
pub async fn login(client: &ApiClient, request: &LoginRequest) -> Result<Session> {
    request.validate()?;

    tracing::info!("🔑 Logging in as {}", request.email);
    let mut response: LoginResponse = client.post_credentials("/auth/login", request).await?;

    if response.access_token.is_empty() {
        tracing::error!("❌ Login response carried no access token");
        return Err(AppError::Decode("login response carried no access token".into()));
    }

    if let Some(expires_at) = response
        .expires_at
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
    {
        tracing::debug!("Access token valid until {}", expires_at.to_rfc3339());
    }

    let tokens = TokenPair::new(
        std::mem::take(&mut response.access_token),
        std::mem::take(&mut response.refresh_token),
    );

    client.session().establish(tokens)
}

/// Registers a new account. Does not log in.
pub async fn register(client: &ApiClient, request: &RegisterRequest) -> Result<RegisterResponse> {
    request.validate()?;

    tracing::info!("📝 Registering {} <{}>", request.username, request.email);
    let response: RegisterResponse = client.post_credentials("/auth/registro", request).await?;
    tracing::info!("✅ Registered user {}", response.user_id);

    Ok(response)
}

/// Registers a new account, then logs in with the same credentials.
pub async fn register_and_login(
    client: &ApiClient,
    request: &RegisterRequest,
) -> Result<(RegisterResponse, Session)> {
    let registered = register(client, request).await?;
    let session = login(client, &request.login_request()).await?;
    Ok((registered, session))
}

/// Ends the session locally. The server keeps no session state to revoke.
pub fn logout(client: &ApiClient) -> Result<()> {
    client.session().logout()
}
