use std::collections::BTreeSet;
use chrono::{DateTime, Utc};

/// The role granting administrative views. Compared exactly.
pub const ADMIN_ROLE: &str = "ADMIN";
/// The role every registered user receives.
pub const USER_ROLE: &str = "USER";

/// The identity carried by an access token.
///
/// Derived, never stored: always recomputed from the current token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// The token's subject.
    pub subject_id: String,
    /// The display name, empty when the token carries none.
    pub username: String,
    /// The role set.
    pub roles: BTreeSet<String>,
    /// The token's expiration instant, if it states one.
    pub expires_at: Option<DateTime<Utc>>,
}

impl Identity {
    /// Whether the role set contains `role` (exact, case-sensitive).
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }

    /// Whether the token expires at or before `now + grace_secs`.
    ///
    /// A token without an expiration claim is never reported as expiring.
    pub fn expires_within(&self, now: DateTime<Utc>, grace_secs: i64) -> bool {
        match self.expires_at {
            Some(expires_at) => expires_at <= now + chrono::Duration::seconds(grace_secs),
            None => false,
        }
    }
}
