//! Application context: the one place the cache, stores, API and sink live.
//!
//! Built once at startup and shared behind an `Arc`. Sign-out calls
//! [`AppContext::reset`], which drops every cached entry and every UI
//! preference belonging to the ending session.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use aula_cache::{MutationOptions, QueryClient, QueryState};
use aula_core::{Entity, ErrorKind, RemoteError, Role, UserId, UserSession};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::api_client::{AulaApi, RestTransport, Transport};
use crate::auth::{AuthEvent, AuthProvider};
use crate::config::AulaConfig;
use crate::error::ClientError;
use crate::hooks::{failure_notification, MutationFailure, MutationOutcome};
use crate::nav::Tab;
use crate::notifications::{Notification, NotificationLevel, NotificationSink};
use crate::ui_state::{ModalStore, TabStore, UiStore};

pub const PREFERENCES_NOT_CLEARED: &str = "Saved preferences could not be cleared";

pub struct AppContext {
    pub(crate) queries: QueryClient,
    pub(crate) api: AulaApi,
    ui: UiStore,
    tabs: TabStore,
    modals: ModalStore,
    sink: Arc<dyn NotificationSink>,
    pub(crate) auth: Arc<dyn AuthProvider>,
    /// User whose data the cache currently holds.
    cached_user: watch::Sender<Option<UserId>>,
    listening: AtomicBool,
}

impl AppContext {
    pub fn new(
        queries: QueryClient,
        transport: Arc<dyn Transport>,
        ui: UiStore,
        sink: Arc<dyn NotificationSink>,
        auth: Arc<dyn AuthProvider>,
    ) -> Arc<Self> {
        let session = auth.session();
        let default_tab = default_tab(session.as_ref());
        let tabs = TabStore::new(&ui, default_tab);
        Arc::new(Self {
            queries,
            api: AulaApi::new(transport),
            ui,
            tabs,
            modals: ModalStore::new(),
            sink,
            auth,
            cached_user: watch::Sender::new(session.map(|s| s.user_id)),
            listening: AtomicBool::new(false),
        })
    }

    pub fn from_config(
        config: &AulaConfig,
        auth: Arc<dyn AuthProvider>,
        sink: Arc<dyn NotificationSink>,
    ) -> Result<Arc<Self>, ClientError> {
        let transport = RestTransport::new(config, Arc::clone(&auth))?;
        let ui = UiStore::restore(&config.persistence_path)?;
        let queries = QueryClient::new(config.cache_config());
        Ok(Self::new(queries, Arc::new(transport), ui, sink, auth))
    }

    pub fn queries(&self) -> &QueryClient {
        &self.queries
    }

    pub fn api(&self) -> &AulaApi {
        &self.api
    }

    pub fn ui(&self) -> &UiStore {
        &self.ui
    }

    pub fn tabs(&self) -> &TabStore {
        &self.tabs
    }

    pub fn modals(&self) -> &ModalStore {
        &self.modals
    }

    pub fn session(&self) -> Option<UserSession> {
        self.auth.session()
    }

    pub fn active_tab(&self) -> Tab {
        self.tabs.active_tab()
    }

    pub fn set_active_tab(&self, tab: Tab) {
        self.tabs.set_active_tab(&self.ui, tab);
    }

    pub fn notify(&self, notification: Notification) {
        self.sink.notify(notification);
    }

    /// Re-issue the read cached under `key` (the retry affordance of a failed read).
    pub async fn retry(&self, key: &aula_core::QueryKey) -> bool {
        self.queries.refresh(key).await
    }

    /// Drop all session state: cache entries, UI preferences (memory and disk),
    /// modal flags. Completes before returning.
    pub fn reset(&self) {
        self.queries.reset();
        if let Err(err) = self.ui.reset() {
            error!(error = %err, "failed to clear persisted preferences");
            self.sink.notify(
                Notification::error(PREFERENCES_NOT_CLEARED).with_description(err.to_string()),
            );
        }
        self.modals.reset();
        let session = self.auth.session();
        self.tabs.reset(default_tab(session.as_ref()));
        self.cached_user.send_replace(session.map(|s| s.user_id));
        info!("session state cleared");
    }

    pub fn handle_auth_event(&self, event: &AuthEvent) {
        match event {
            AuthEvent::SignedOut => {
                info!("sign-out received");
                self.reset();
            }
            AuthEvent::SessionExpired => {
                warn!("session expired");
                self.reset();
            }
            AuthEvent::SignedIn(session) => {
                let previous = self.cached_user.send_replace(Some(session.user_id));
                if previous.is_some_and(|user| user != session.user_id) {
                    info!(user_id = %session.user_id, "different user signed in");
                    self.reset();
                }
            }
            AuthEvent::TokenRefreshed => debug!("access token refreshed"),
        }
    }

    /// Subscribe to auth events. Only the first call starts a listener.
    pub fn spawn_auth_listener(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        if self.listening.swap(true, Ordering::SeqCst) {
            warn!("auth listener already running");
            return None;
        }
        let mut events = self.auth.subscribe();
        let context = Arc::clone(self);
        Some(tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => context.handle_auth_event(&event),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        // A missed sign-out must not leak the previous session.
                        warn!(skipped, "auth events lagged; clearing session state");
                        context.reset();
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!("auth provider closed its event channel");
                        break;
                    }
                }
            }
        }))
    }

    pub(crate) fn require_session(&self) -> Result<UserSession, MutationFailure> {
        self.auth.session().ok_or(MutationFailure::NoSession)
    }

    /// State returned by a user-scoped read when nobody is signed in.
    pub(crate) fn signed_out<T>(&self, entity: Entity) -> QueryState<T> {
        QueryState::idle(entity.namespace(), false)
    }

    /// Read through the cache with `call` as the fetcher.
    pub(crate) async fn query<T, F, Fut>(&self, options: aula_cache::QueryOptions, call: F) -> QueryState<T>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: Fn(AulaApi) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, RemoteError>> + Send + 'static,
    {
        let api = self.api.clone();
        let state = self.queries.fetch(options, move || call(api.clone())).await;
        // Cached errors were already reported when their request failed.
        if !state.from_cache()
            && state
                .error()
                .is_some_and(|err| err.kind() == ErrorKind::Unauthorized)
        {
            self.auth.report_unauthorized();
        }
        state
    }

    /// Run a write once, invalidate on success and report the outcome.
    pub(crate) async fn run_mutation<T, Fut, S>(
        &self,
        options: MutationOptions,
        request: Fut,
        on_success: S,
        failure_title: &'static str,
    ) -> MutationOutcome<T>
    where
        T: Send + 'static,
        Fut: Future<Output = Result<T, RemoteError>> + Send + 'static,
        S: FnOnce(&T) -> Notification,
    {
        let name = options.name;
        match self.queries.mutate(options, request).await {
            Ok(value) => {
                self.sink.notify(on_success(&value));
                Ok(value)
            }
            Err(err) => {
                let notification = failure_notification(&err, failure_title);
                if notification.level == NotificationLevel::Warning {
                    warn!(mutation = name, error = %err, "mutation conflicted");
                } else {
                    error!(mutation = name, error = %err, "mutation failed");
                }
                if err.kind() == ErrorKind::Unauthorized {
                    self.auth.report_unauthorized();
                }
                self.sink.notify(notification);
                Err(MutationFailure::Remote(err))
            }
        }
    }
}

fn default_tab(session: Option<&UserSession>) -> Tab {
    Tab::default_for(session.map_or(Role::Student, |s| s.role))
}
