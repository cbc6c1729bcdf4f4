use std::sync::Arc;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;

use learnhub_auth::{Argon2PasswordHasher, PasswordHasher};
use learnhub_core::{Clock, SystemClock};
use learnhub_infra::{
    spawn_dispatcher, AuthOrchestrator, CredentialStore, InMemoryCredentialStore, Notifier,
    PostgresCredentialStore, Settings, TracingSink, WorkerHandle,
};

pub type Orchestrator = AuthOrchestrator<dyn CredentialStore>;

/// Everything the handlers need.
pub struct AppServices {
    pub auth: Orchestrator,
}

impl AppServices {
    pub fn new(auth: Orchestrator) -> Self {
        Self { auth }
    }
}

/// Wire the production collaborators.
///
/// Postgres when `DATABASE_URL` is set (migrations are applied on start),
/// the in-memory store otherwise. Notifications go through the background
/// dispatcher; the returned handle drains it on shutdown.
pub async fn build_services(settings: &Settings) -> anyhow::Result<(AppServices, WorkerHandle)> {
    let store: Arc<dyn CredentialStore> = match &settings.database_url {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(10)
                .connect(url)
                .await
                .context("failed to connect to postgres")?;
            let store = PostgresCredentialStore::new(pool);
            store.migrate().await.context("failed to apply migrations")?;
            tracing::info!("using postgres credential store");
            Arc::new(store)
        }
        None => {
            tracing::warn!("DATABASE_URL not set; identities live in memory only");
            Arc::new(InMemoryCredentialStore::new())
        }
    };

    let (notifier, worker) = spawn_dispatcher(TracingSink);
    let notifier: Arc<dyn Notifier> = Arc::new(notifier);
    let hasher: Arc<dyn PasswordHasher> = Arc::new(Argon2PasswordHasher::new());
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let auth = AuthOrchestrator::new(
        store,
        settings.policy.clone(),
        settings.jwt_secret.as_bytes(),
        hasher,
        notifier,
        clock,
    )
    .context("failed to build auth orchestrator")?;

    Ok((AppServices::new(auth), worker))
}
