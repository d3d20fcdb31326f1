//! # Notifier dispatcher (C7)
//!
//! Looks up notification services bound to an endpoint and hands off
//! state-change events to each in isolation. One service's failure must
//! never block another, and none propagate past this module (spec.md §4.7).
//! Gated by the role manager: dependents never emit (§4.8's table).

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, warn};

use crate::role::RoleManager;
use crate::store::Store;
use crate::types::{Endpoint, Status};

#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &str;
    async fn notify(&self, endpoint: &Endpoint, message: &str) -> anyhow::Result<()>;
}

/// Logs-only transport; stands in for Telegram/Slack/email/webhook, which
/// are explicitly out of scope (spec.md §1) beyond this single-method
/// interface.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    async fn notify(&self, endpoint: &Endpoint, message: &str) -> anyhow::Result<()> {
        tracing::info!(endpoint = endpoint.id, %message, "notification");
        Ok(())
    }
}

/// A transport that always fails, useful for exercising C7's isolation
/// guarantee in tests.
pub struct FailingNotifier;

#[async_trait]
impl Notifier for FailingNotifier {
    fn name(&self) -> &str {
        "failing"
    }

    async fn notify(&self, _endpoint: &Endpoint, _message: &str) -> anyhow::Result<()> {
        anyhow::bail!("transport unavailable")
    }
}

pub struct NotifierDispatcher {
    store: Arc<Store>,
    role: Arc<RoleManager>,
    transports: Vec<Arc<dyn Notifier>>,
}

impl NotifierDispatcher {
    pub fn new(store: Arc<Store>, role: Arc<RoleManager>, transports: Vec<Arc<dyn Notifier>>) -> Self {
        Self { store, role, transports }
    }

    pub async fn notify_status_change(&self, endpoint: &Endpoint, new_status: Status) {
        let message = format!("{} is now {new_status}", endpoint.name);
        self.notify_message(endpoint, message).await;
    }

    pub async fn notify_message(&self, endpoint: &Endpoint, message: impl Into<String>) {
        if !self.role.emits_notifications().await {
            return;
        }
        let message = message.into();

        let bound = match self.store.notifiers_for_endpoint(endpoint.id).await {
            Ok(rows) => rows,
            Err(e) => {
                error!(endpoint = endpoint.id, error = %e, "failed to look up notifiers");
                return;
            }
        };

        // No join rows configured: fall through to the default log
        // transport so state transitions are never silently swallowed.
        if bound.is_empty() {
            for transport in &self.transports {
                if let Err(e) = transport.notify(endpoint, &message).await {
                    warn!(endpoint = endpoint.id, transport = transport.name(), error = %e, "notifier failed");
                }
            }
            return;
        }

        for row in bound {
            let transport = self.transports.iter().find(|t| t.name() == row.kind);
            let Some(transport) = transport else {
                warn!(endpoint = endpoint.id, kind = %row.kind, "no transport registered for notifier kind");
                continue;
            };
            if let Err(e) = transport.notify(endpoint, &message).await {
                warn!(endpoint = endpoint.id, transport = transport.name(), error = %e, "notifier failed");
            }
        }
    }
}
