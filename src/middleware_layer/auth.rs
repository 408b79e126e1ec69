use chrono::Utc;
use reqwest::{RequestBuilder, StatusCode};
use zeroize::Zeroizing;

use crate::{
    crypto::claims,
    error::{AppError, Result},
    services::session::SessionController,
};

/// How the outgoing side treats access-token expiry.
#[derive(Debug, Clone, Copy)]
pub struct ExpiryCheck {
    /// Whether to check expiry before sending.
    pub enabled: bool,
    /// Tokens expiring within this many seconds count as expired.
    pub grace_secs: i64,
}

/// What a request does when the pre-check finds the stored token expiring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OnExpired {
    /// Fail the request without sending it.
    Reject,
    /// Send it without credentials. Used by login and registration, which
    /// replace the session rather than depend on it.
    SendAnonymous,
}

/// Reads the access token for one request.
///
/// The token is read fresh from the session on every call. When the expiry
/// pre-check is enabled and the token's `exp` claim falls within the grace
/// window, the session is terminated here. The request is then either
/// refused or sent anonymously, per `on_expired`.
///
/// # Arguments
///
/// * `session` - The session controller.
/// * `check` - The expiry pre-check policy.
/// * `on_expired` - What to do with the request once the session is ended.
///
/// # Returns
///
/// The token to present, or `None` when there is no session.
pub(crate) fn authorize(
    session: &SessionController,
    check: ExpiryCheck,
    on_expired: OnExpired,
) -> Result<Option<Zeroizing<String>>> {
    let Some(tokens) = session.tokens() else {
        tracing::debug!("No session, sending request without credentials");
        return Ok(None);
    };

    let presented = Zeroizing::new(tokens.access_token.clone());

    if check.enabled {
        let expiring = claims::decode(&presented)
            .is_some_and(|identity| identity.expires_within(Utc::now(), check.grace_secs));

        if expiring {
            session.fail_authentication(&presented, "access token expired");
            return match on_expired {
                OnExpired::Reject => {
                    tracing::warn!("⚠️ Access token expired or about to expire, not sending request");
                    Err(AppError::Authentication(
                        "session expired, please log in again".to_string(),
                    ))
                }
                OnExpired::SendAnonymous => {
                    tracing::info!("Access token expired, sending without credentials");
                    Ok(None)
                }
            };
        }
    }

    Ok(Some(presented))
}

/// Attaches `Authorization: Bearer <token>` when a token is presented.
pub(crate) fn attach(builder: RequestBuilder, presented: Option<&str>) -> RequestBuilder {
    match presented {
        Some(token) => builder.bearer_auth(token),
        None => builder,
    }
}

/// Interprets the status of a response.
///
/// A 401 is the one place a dead session is detected: the controller is told
/// which token was rejected and the failure is returned to the caller. The
/// request is never retried.
pub(crate) fn inspect(
    session: &SessionController,
    status: StatusCode,
    presented: Option<&str>,
    body: &[u8],
) -> Result<()> {
    if status != StatusCode::UNAUTHORIZED {
        return Ok(());
    }

    let message = crate::error::server_message(status.as_u16(), body);
    tracing::warn!("🔒 Server rejected credentials (401): {}", message);
    session.fail_authentication(presented.unwrap_or_default(), "server returned 401");

    Err(AppError::Authentication(message))
}
