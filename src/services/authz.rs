use crate::error::{AppError, Result};
use crate::models::identity::{ADMIN_ROLE, Identity};

/// A capability a view or service may require.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// Render general user views: any decodable identity.
    UserViews,
    /// Render administrative views: identity holds the `ADMIN` role.
    AdminViews,
}

/// Decides whether `identity` holds `capability`.
///
/// Pure and fail-closed: an absent identity holds nothing.
pub fn can(identity: Option<&Identity>, capability: Capability) -> bool {
    let Some(identity) = identity else {
        return false;
    };

    match capability {
        Capability::UserViews => true,
        Capability::AdminViews => identity.has_role(ADMIN_ROLE),
    }
}

/// Like [`can`], but returns an access-restricted error on denial.
pub fn require(identity: Option<&Identity>, capability: Capability) -> Result<()> {
    if can(identity, capability) {
        return Ok(());
    }

    tracing::debug!("Capability {:?} denied", capability);
    Err(AppError::Forbidden(match capability {
        Capability::UserViews => "an active session is required".to_string(),
        Capability::AdminViews => "administrator role required".to_string(),
    }))
}
