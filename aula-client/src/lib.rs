//! Aula Client - Data Layer
//!
//! Remote access functions for the academic-support backend, domain hooks
//! that bind them to the query cache, UI-state stores, the notification sink
//! and the session coordinator that ties them together.

pub mod api_client;
pub mod auth;
pub mod config;
pub mod context;
pub mod error;
pub mod hooks;
pub mod nav;
pub mod notifications;
pub mod persistence;
pub mod telemetry;
pub mod ui_state;

pub use api_client::{ApiRequest, AulaApi, RequestBody, RestTransport, Transport};
pub use auth::{AuthEvent, AuthProvider, SessionAuthProvider};
pub use config::{AulaConfig, ConfigError};
pub use context::AppContext;
pub use error::ClientError;
pub use hooks::{MutationFailure, MutationOutcome};
pub use nav::Tab;
pub use notifications::{ChannelSink, Notification, NotificationLevel, NotificationSink, TracingSink};
pub use ui_state::{ModalStore, TabStore, UiStore};
