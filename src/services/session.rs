use std::sync::Arc;
use chrono::Utc;
use tokio::sync::watch;

use crate::crypto::claims;
use crate::error::Result;
use crate::models::identity::Identity;
use crate::models::session::{Session, SessionState, TokenPair};
use crate::repositories::token::TokenStore;

/// Owns the AUTHENTICATED / ANONYMOUS transition.
///
/// The token store is written only from here: on login or registration
/// (`establish`), on `logout`, and on an authentication failure reported by
/// the transport middleware. Every transition to ANONYMOUS clears the store
/// before the new state is published, so subscribers never observe a stale
/// session.
#[derive(Clone)]
pub struct SessionController {
    store: Arc<dyn TokenStore>,
    state: Arc<watch::Sender<SessionState>>,
}

impl SessionController {
    /// Creates a controller over `store`, computing the initial state.
    ///
    /// # Arguments
    ///
    /// * `store` - The token store.
    /// * `grace_secs` - Tokens expiring within this window count as expired.
    ///
    /// # Returns
    ///
    /// A `SessionController`. A stored token that does not decode, or that has
    /// expired, is cleared and the controller starts ANONYMOUS.
    pub fn new(store: Arc<dyn TokenStore>, grace_secs: i64) -> Self {
        let initial = match store.get() {
            None => SessionState::Anonymous,
            Some(pair) => match claims::decode(&pair.access_token) {
                Some(identity) if !identity.expires_within(Utc::now(), grace_secs) => {
                    tracing::info!("✅ Restored session for subject {}", identity.subject_id);
                    SessionState::Authenticated
                }
                Some(_) => {
                    tracing::info!("Stored session has expired, clearing");
                    if let Err(e) = store.clear() {
                        tracing::error!("❌ Failed to clear expired session: {}", e);
                    }
                    SessionState::Anonymous
                }
                None => {
                    tracing::warn!("⚠️ Stored access token does not decode, clearing");
                    if let Err(e) = store.clear() {
                        tracing::error!("❌ Failed to clear undecodable session: {}", e);
                    }
                    SessionState::Anonymous
                }
            },
        };

        let (state, _) = watch::channel(initial);

        Self {
            store,
            state: Arc::new(state),
        }
    }

    /// Returns the current lifecycle state.
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Whether the controller is AUTHENTICATED.
    pub fn is_authenticated(&self) -> bool {
        self.state() == SessionState::Authenticated
    }

    /// Subscribes to lifecycle transitions.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Returns a fresh copy of the session, decoded from the stored tokens.
    pub fn session(&self) -> Option<Session> {
        self.store.get().map(Session::from_tokens)
    }

    /// Returns the identity decoded from the current access token.
    pub fn identity(&self) -> Option<Identity> {
        self.session().and_then(|session| session.identity)
    }

    fn publish(&self, next: SessionState) {
        self.state.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        });
    }

    /// Returns the stored token pair, read fresh.
    pub(crate) fn tokens(&self) -> Option<TokenPair> {
        self.store.get()
    }

    /// Replaces the session with a freshly issued token pair.
    ///
    /// # Arguments
    ///
    /// * `tokens` - The pair returned by a successful login.
    ///
    /// # Returns
    ///
    /// The new `Session`.
    pub fn establish(&self, tokens: TokenPair) -> Result<Session> {
        self.store.set(tokens.clone())?;
        let session = Session::from_tokens(tokens);

        match &session.identity {
            Some(identity) => tracing::info!(
                "🔐 Session established for {} ({})",
                identity.username,
                identity.subject_id
            ),
            None => tracing::warn!("⚠️ Session established with an undecodable access token"),
        }

        self.publish(SessionState::Authenticated);
        Ok(session)
    }

    /// Ends the session explicitly.
    pub fn logout(&self) -> Result<()> {
        let cleared = self.store.clear();
        self.publish(SessionState::Anonymous);
        tracing::info!("👋 Logged out");
        cleared
    }

    /// Terminates the session after the server rejected `presented`.
    ///
    /// Only the transport middleware calls this. If the store already holds a
    /// different token (a newer login replaced it while the request was in
    /// flight), the newer session is left untouched.
    pub(crate) fn fail_authentication(&self, presented: &str, reason: &str) {
        match self.store.clear_if_current(presented) {
            Ok(true) => {
                tracing::warn!("🔒 Session terminated: {}", reason);
                self.publish(SessionState::Anonymous);
            }
            Ok(false) if self.store.get().is_none() => {
                self.publish(SessionState::Anonymous);
            }
            Ok(false) => {
                tracing::debug!("Ignoring authentication failure for a superseded token");
            }
            Err(e) => {
                tracing::error!("❌ Failed to clear session after {}: {}", reason, e);
                self.publish(SessionState::Anonymous);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::claims::tests::token_with_payload;
    use crate::repositories::token::MemoryTokenStore;

    fn token(exp: i64) -> String {
        token_with_payload(&format!(
            r#"{{"sub":"5","usuario":"eva","roles":["USER"],"exp":{}}}"#,
            exp
        ))
    }

    fn store_with(access: Option<String>) -> Arc<dyn TokenStore> {
        let store = MemoryTokenStore::new();
        if let Some(access) = access {
            store.set(TokenPair::new(access, "refresh")).unwrap();
        }
        Arc::new(store)
    }

    #[test]
    fn starts_authenticated_with_a_live_token() {
        let live = token(Utc::now().timestamp() + 3600);
        let controller = SessionController::new(store_with(Some(live)), 60);
        assert_eq!(controller.state(), SessionState::Authenticated);
        assert_eq!(controller.identity().map(|i| i.username), Some("eva".to_string()));
    }

    #[test]
    fn starts_anonymous_and_clears_expired_or_broken_tokens() {
        let expired = store_with(Some(token(Utc::now().timestamp() + 30)));
        let controller = SessionController::new(expired.clone(), 60);
        assert_eq!(controller.state(), SessionState::Anonymous);
        assert!(expired.get().is_none());

        let broken = store_with(Some("garbage".into()));
        let controller = SessionController::new(broken.clone(), 60);
        assert_eq!(controller.state(), SessionState::Anonymous);
        assert!(broken.get().is_none());

        let empty = SessionController::new(store_with(None), 60);
        assert_eq!(empty.state(), SessionState::Anonymous);
    }

    #[test]
    fn establish_and_logout_transition_and_notify() {
        let controller = SessionController::new(store_with(None), 60);
        let mut rx = controller.subscribe();

        let session = controller
            .establish(TokenPair::new(token(Utc::now().timestamp() + 3600), "r"))
            .unwrap();
        assert!(session.identity.is_some());
        assert_eq!(*rx.borrow_and_update(), SessionState::Authenticated);

        controller.logout().unwrap();
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), SessionState::Anonymous);
        assert!(controller.session().is_none());
    }

    #[test]
    fn authentication_failure_for_superseded_token_keeps_new_session() {
        let controller = SessionController::new(store_with(None), 60);
        let old = token(Utc::now().timestamp() + 3600);
        let new = token_with_payload(r#"{"sub":"6","roles":["USER"]}"#);

        controller.establish(TokenPair::new(old.clone(), "r")).unwrap();
        controller.establish(TokenPair::new(new.clone(), "r")).unwrap();

        controller.fail_authentication(&old, "stale 401");
        assert_eq!(controller.state(), SessionState::Authenticated);

        controller.fail_authentication(&new, "401");
        assert_eq!(controller.state(), SessionState::Anonymous);
        assert!(controller.session().is_none());
    }

    #[test]
    fn identity_follows_token_replacement() {
        let controller = SessionController::new(store_with(None), 60);
        controller
            .establish(TokenPair::new(token_with_payload(r#"{"sub":"1","roles":["USER"]}"#), "r"))
            .unwrap();
        assert_eq!(controller.identity().map(|i| i.subject_id), Some("1".into()));

        controller
            .establish(TokenPair::new(token_with_payload(r#"{"sub":"2","roles":["ADMIN"]}"#), "r"))
            .unwrap();
        let identity = controller.identity().unwrap();
        assert_eq!(identity.subject_id, "2");
        assert!(identity.has_role("ADMIN"));
    }
}
