//! Auth provider seam.
//!
//! The provider owns tokens and sessions; this crate only reads the current
//! token, listens for session changes and reports rejected sessions.

use aula_core::{UserId, UserSession};
use tokio::sync::{broadcast, watch};
use tracing::{info, warn};

use crate::config::AuthConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    SignedIn(UserSession),
    TokenRefreshed,
    /// The backend rejected the session (401).
    SessionExpired,
    SignedOut,
}

pub trait AuthProvider: Send + Sync {
    /// Bearer token for the next request, if any.
    fn access_token(&self) -> Option<String>;

    fn session(&self) -> Option<UserSession>;

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent>;

    /// Called when the backend answers 401. Never retried by this crate.
    fn report_unauthorized(&self);
}

/// In-process provider holding one session at a time.
pub struct SessionAuthProvider {
    token: watch::Sender<Option<String>>,
    session: watch::Sender<Option<UserSession>>,
    events: broadcast::Sender<AuthEvent>,
}

impl SessionAuthProvider {
    pub fn signed_out() -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            token: watch::Sender::new(None),
            session: watch::Sender::new(None),
            events,
        }
    }

    pub fn new(session: UserSession, token: Option<String>) -> Self {
        let provider = Self::signed_out();
        provider.session.send_replace(Some(session));
        provider.token.send_replace(token);
        provider
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        let session = UserSession {
            user_id: UserId::new(config.user_id),
            role: config.role,
            email: None,
        };
        Self::new(session, config.access_token.clone())
    }

    pub fn sign_in(&self, session: UserSession, token: Option<String>) {
        info!(user_id = %session.user_id, "signed in");
        self.token.send_replace(token);
        self.session.send_replace(Some(session.clone()));
        self.emit(AuthEvent::SignedIn(session));
    }

    pub fn refresh_token(&self, token: String) {
        self.token.send_replace(Some(token));
        self.emit(AuthEvent::TokenRefreshed);
    }

    pub fn sign_out(&self) {
        info!("signed out");
        self.token.send_replace(None);
        self.session.send_replace(None);
        self.emit(AuthEvent::SignedOut);
    }

    fn emit(&self, event: AuthEvent) {
        // Nobody listening is fine before the context starts.
        let _ = self.events.send(event);
    }
}

impl AuthProvider for SessionAuthProvider {
    fn access_token(&self) -> Option<String> {
        self.token.borrow().clone()
    }

    fn session(&self) -> Option<UserSession> {
        self.session.borrow().clone()
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }

    fn report_unauthorized(&self) {
        warn!("backend rejected the session");
        self.token.send_replace(None);
        self.emit(AuthEvent::SessionExpired);
    }
}
