//! Infrastructure layer: credential storage, token issuance, notification
//! dispatch, configuration and the auth workflows that compose them.

pub mod config;
pub mod notify;
pub mod orchestrator;
pub mod store;
pub mod token_issuer;

pub use config::{ConfigError, Settings};
pub use notify::{
    spawn_dispatcher, DispatchNotifier, Notification, NotificationPayload, NotificationSink,
    Notifier, RecordingNotifier, Template, TracingSink, WorkerHandle,
};
pub use orchestrator::{AuthOrchestrator, RefreshedSession};
pub use store::{
    AttemptOutcome, CredentialStore, IdentityFilter, InMemoryCredentialStore, PostgresCredentialStore, StoreError,
};
pub use token_issuer::{IssuerError, SecurityTokenIssuer, ValidatedToken};
