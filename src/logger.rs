//! # Logger (C14)
//!
//! Leveled logging with a runtime-settable threshold persisted under
//! `instance_config['log_level']`. On top of the teacher's stdout
//! `tracing_subscriber` setup (`lib.rs::init()`), this layer additionally
//! persists each record into the bounded `application_logs` table so the
//! "recent N" / "clear" read API in spec.md §4.14 has somewhere to read
//! from.

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::field::{Field, Visit};
use tracing::{Level, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

use crate::error::MonitorResult;
use crate::store::models::ApplicationLogRow;
use crate::store::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }

    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "debug" => Some(LogLevel::Debug),
            "info" => Some(LogLevel::Info),
            "warn" | "warning" => Some(LogLevel::Warn),
            "error" => Some(LogLevel::Error),
            _ => None,
        }
    }

    fn from_tracing(level: &Level) -> Self {
        match *level {
            Level::TRACE | Level::DEBUG => LogLevel::Debug,
            Level::INFO => LogLevel::Info,
            Level::WARN => LogLevel::Warn,
            Level::ERROR => LogLevel::Error,
        }
    }
}

/// Default recent-N read count, per spec.md §4.14.
pub const DEFAULT_RECENT_LIMIT: i64 = 1000;

pub struct Logger {
    level: RwLock<LogLevel>,
    store: Arc<Store>,
}

impl Logger {
    pub async fn load(store: Arc<Store>) -> MonitorResult<Arc<Self>> {
        let level = store
            .config_get("log_level")
            .await?
            .and_then(|s| LogLevel::from_str_loose(&s))
            .unwrap_or(LogLevel::Info);
        Ok(Arc::new(Self {
            level: RwLock::new(level),
            store,
        }))
    }

    pub async fn get_level(&self) -> LogLevel {
        *self.level.read().await
    }

    pub async fn set_level(&self, level: LogLevel) -> MonitorResult<()> {
        self.store.config_set("log_level", level.as_str()).await?;
        *self.level.write().await = level;
        Ok(())
    }

    pub async fn recent(&self, n: i64) -> MonitorResult<Vec<ApplicationLogRow>> {
        self.store.recent_logs(n).await
    }

    pub async fn clear(&self) -> MonitorResult<()> {
        self.store.clear_logs().await
    }
}

/// Bridges `tracing` events into the persisted log table, subject to the
/// runtime-configurable threshold. Printing to stdout is handled by the
/// usual `fmt` layer set up alongside this one in `main.rs`.
pub struct PersistLayer {
    logger: Arc<Logger>,
    handle: tokio::runtime::Handle,
}

impl PersistLayer {
    pub fn new(logger: Arc<Logger>, handle: tokio::runtime::Handle) -> Self {
        Self { logger, handle }
    }
}

#[derive(Default)]
struct MessageVisitor(String);

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.0 = format!("{value:?}");
        }
    }
}

impl<S: Subscriber> Layer<S> for PersistLayer {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let level = LogLevel::from_tracing(event.metadata().level());
        if level < self.logger_level_blocking() {
            return;
        }
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        let component = event.metadata().target().to_string();
        let message = visitor.0;
        let logger = self.logger.clone();
        self.handle.spawn(async move {
            let _ = logger
                .store
                .append_log(level.as_str(), &message, &component)
                .await;
        });
    }
}

impl PersistLayer {
    fn logger_level_blocking(&self) -> LogLevel {
        // `on_event` is not async; reading the level synchronously is safe
        // because the `RwLock` is only ever held briefly by `set_level`.
        self.logger
            .level
            .try_read()
            .map(|g| *g)
            .unwrap_or(LogLevel::Info)
    }
}
