//! Order pipeline core for the logistics dashboard.
//!
//! Status-to-phase classification, the role/phase access table, duplicate
//! order detection, customer notification triggers and the chat send limiter.
//! [`AppState`] wires them to the local order store and configuration.

use std::path::Path;
use std::sync::Arc;

use serde_json::Value;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub mod api;
pub mod board;
pub mod config;
pub mod db;
pub mod duplicates;
pub mod error;
pub mod logging;
pub mod models;
pub mod notifications;
pub mod phase;
pub mod profile_cache;
pub mod rate_limit;
pub mod roles;

pub use error::{Error, Result};
pub use phase::{classify_phase, is_same_phase, Phase};

use crate::api::FunctionsClient;
use crate::config::AppConfig;
use crate::duplicates::DuplicateCheckResult;
use crate::models::OrderCandidate;
use crate::notifications::NotifyOutcome;
use crate::profile_cache::ProfileCache;
use crate::rate_limit::ChatRateLimiter;

/// Application-scoped state, created once and handed to callers.
pub struct AppState {
    pub db: Arc<db::DbState>,
    pub config: AppConfig,
    pub profiles: ProfileCache,
    pub chat_limiter: Arc<ChatRateLimiter>,
    functions: Option<FunctionsClient>,
    cancel: CancellationToken,
    sweeper: Option<JoinHandle<()>>,
}

impl AppState {
    /// Open the store under `data_dir`, load configuration and start the
    /// chat limiter sweep. Fails with [`Error::Config`] outside a tokio
    /// runtime.
    pub fn open(data_dir: &Path) -> Result<Self> {
        let db = Arc::new(db::init(data_dir)?);
        Self::with_db(db)
    }

    pub fn with_db(db: Arc<db::DbState>) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|e| {
            Error::Config(format!("no tokio runtime for the chat limiter sweep: {e}"))
        })?;
        let config = config::load(&*db.lock()?)?;

        let functions = if config.notifications.is_configured() {
            Some(FunctionsClient::new(
                &config.notifications.functions_url,
                &config.notifications.api_key,
            )?)
        } else {
            info!("Notification functions not configured; customer notifications disabled");
            None
        };

        let chat_limiter = Arc::new(ChatRateLimiter::new(config.rate_limit.clone()));
        let cancel = CancellationToken::new();
        let sweeper = Some(chat_limiter.spawn_sweeper(&runtime, cancel.clone()));

        info!("Order pipeline v{} ready", env!("CARGO_PKG_VERSION"));

        Ok(Self {
            db,
            config,
            profiles: ProfileCache::default(),
            chat_limiter,
            functions,
            cancel,
            sweeper,
        })
    }

    /// Send a chat message through the functions client, gated by the
    /// shared limiter.
    pub async fn send_chat(&self, function_name: &str, payload: Value) -> Result<Value> {
        let Some(client) = &self.functions else {
            return Err(Error::Config("functions endpoint is not configured".into()));
        };
        self.chat_limiter
            .send_through(client, function_name, payload)
            .await
    }

    pub fn check_duplicate(&self, candidate: &OrderCandidate) -> DuplicateCheckResult {
        duplicates::check_for_duplicate_order(&*self.db, candidate, &self.config.duplicates)
    }

    /// Move an order to `new_status` and notify the customer if enabled.
    ///
    /// Returns `None` when the order does not exist.
    pub async fn transition_order(
        &self,
        order_id: &str,
        new_status: &str,
    ) -> Result<Option<NotifyOutcome>> {
        let updated = db::update_order_status(&*self.db.lock()?, order_id, new_status)?;
        if !updated {
            return Ok(None);
        }
        Ok(Some(self.notify_status_change(order_id, new_status).await))
    }

    pub async fn notify_status_change(&self, order_id: &str, new_status: &str) -> NotifyOutcome {
        let n = &self.config.notifications;
        match &self.functions {
            Some(client) => {
                notifications::notify_status_change(
                    client,
                    &n.function_name,
                    order_id,
                    new_status,
                    &n.enabled_phases,
                )
                .await
            }
            None => NotifyOutcome::Skipped {
                reason: "notifications are not configured".into(),
            },
        }
    }

    /// Stop background work and wait for it to finish.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.sweeper.take() {
            let _ = handle.await;
        }
        info!("Order pipeline stopped");
    }
}

impl Drop for AppState {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
