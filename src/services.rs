//! # Services bundle
//!
//! Startup wiring for every component in spec.md §2, assembled explicitly
//! instead of living behind module-level globals or captured closures —
//! the "state passed through a services bundle constructed at startup"
//! pattern from spec.md §9. `main.rs` builds one `Services` and starts the
//! subsystems the current role gates in (§4.8's table).

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::aggregator::Aggregator;
use crate::clock::{Clock, SystemClock};
use crate::error::MonitorResult;
use crate::failover::{FailoverController, PromotionHandle};
use crate::kafka_pool::KafkaPool;
use crate::logger::Logger;
use crate::notifier::{LogNotifier, Notifier, NotifierDispatcher};
use crate::reaper::Reaper;
use crate::role::{Role, RoleManager};
use crate::scheduler::Scheduler;
use crate::store::Store;
use crate::sync::client::SyncClient;
use crate::sync::server::{self, SyncServerState};
use crate::types::InstanceId;

/// Configuration read once at startup from the environment, per spec.md §6.
#[derive(Debug, Clone)]
pub struct StartupConfig {
    pub db_path: String,
    pub port: u16,
    pub primary_sync_url: Option<String>,
    pub explicit_primary: bool,
    pub instance_name: String,
    pub instance_location: Option<String>,
    pub shared_secret: Option<String>,
    pub failover_order: u32,
    pub sync_interval_secs: u64,
    pub connection_timeout_ms: u64,
}

impl StartupConfig {
    /// Reads the environment table from spec.md §6. `SYNC_INTERVAL` is
    /// floored at 10s per the boundary behavior in spec.md §8.
    pub fn from_env() -> Self {
        let primary_sync_url = std::env::var("PRIMARY_SYNC_URL").ok().filter(|s| !s.is_empty());
        let explicit_primary = std::env::var("INSTANCE_ROLE")
            .map(|v| v == "primary")
            .unwrap_or(false);
        let sync_interval_secs = std::env::var("SYNC_INTERVAL")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(30)
            .max(10);
        let failover_order = std::env::var("FAILOVER_ORDER")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(99);
        let connection_timeout_ms = std::env::var("CONNECTION_TIMEOUT")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(30_000);
        let port = std::env::var("PORT")
            .ok()
            .and_then(|v| v.parse::<u16>().ok())
            .unwrap_or(3001);

        Self {
            db_path: std::env::var("DATABASE_PATH").unwrap_or_else(|_| "monitor.db".to_string()),
            port,
            primary_sync_url,
            explicit_primary,
            instance_name: std::env::var("INSTANCE_NAME").unwrap_or_else(|_| "monitor".to_string()),
            instance_location: std::env::var("INSTANCE_LOCATION").ok(),
            shared_secret: std::env::var("SHARED_SECRET").ok(),
            failover_order,
            sync_interval_secs,
            connection_timeout_ms,
        }
    }
}

/// Every collaborator named in spec.md §9's "source patterns to
/// re-architect" note: `Store, Logger, Notifier, KafkaPool, Clock`, plus
/// the subsystems built on top of them.
pub struct Services {
    pub store: Arc<Store>,
    pub logger: Arc<Logger>,
    pub clock: Arc<dyn Clock>,
    pub kafka_pool: Arc<KafkaPool>,
    pub role: Arc<RoleManager>,
    pub notifier: Arc<NotifierDispatcher>,
    pub scheduler: Arc<Scheduler>,
    pub aggregator: Arc<Aggregator>,
    pub instance_id: InstanceId,
    pub config: StartupConfig,
    pub sync_client: Option<Arc<SyncClient>>,
    /// Handles for the dependent-only background loops (C10 refresh and
    /// debounce), aborted once this instance promotes itself to primary.
    dependent_tasks: tokio::sync::Mutex<Vec<tokio::task::JoinHandle<()>>>,
}

struct PromotionCallback {
    services: Arc<Services>,
}

#[async_trait::async_trait]
impl PromotionHandle for PromotionCallback {
    async fn promote_self(&self) {
        if let Err(e) = self.services.role.promote_to_primary().await {
            warn!(error = %e, "failed to persist promotion to primary");
            return;
        }
        info!("promoted to primary");
        self.services.stop_dependent_tasks().await;
        if let Err(e) = self.services.run_as_primary().await {
            warn!(error = %e, "failed to start primary subsystems after promotion");
        }
    }
}

impl Services {
    /// Connects the store and loads the logger, without starting any
    /// background subsystem. Split out from `bootstrap` so `main.rs` can
    /// install the log-persisting `tracing` layer before anything else
    /// emits a log record.
    pub async fn connect(db_path: &str) -> MonitorResult<(Arc<Store>, Arc<Logger>)> {
        let store = Arc::new(Store::connect(db_path).await?);
        let logger = Logger::load(store.clone()).await?;
        Ok((store, logger))
    }

    pub async fn bootstrap(
        config: StartupConfig,
        store: Arc<Store>,
        logger: Arc<Logger>,
    ) -> MonitorResult<Arc<Self>> {
        let identity = store.init_identity(config.shared_secret.clone()).await?;
        let instance_id = identity.instance_id;

        if let Some(url) = &config.primary_sync_url {
            store.config_set("primarySyncURL", url).await?;
        }
        if config.explicit_primary {
            store.config_set("instanceRole", "primary").await?;
        }

        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let kafka_pool = Arc::new(KafkaPool::new());
        let role = Arc::new(RoleManager::load(store.clone()).await?);

        let transports: Vec<Arc<dyn Notifier>> = vec![Arc::new(LogNotifier)];
        let notifier = Arc::new(NotifierDispatcher::new(store.clone(), role.clone(), transports));

        let location = config.instance_location.clone().unwrap_or_else(|| "local".to_string());

        let sync_client = if let Role::Dependent { primary_sync_url } = role.role().await {
            Some(SyncClient::new(
                store.clone(),
                primary_sync_url,
                identity.shared_secret.clone().unwrap_or_default(),
                instance_id,
                config.instance_name.clone(),
                config.instance_location.clone(),
                config.failover_order,
            ))
        } else {
            None
        };

        let scheduler = Scheduler::new(
            store.clone(),
            kafka_pool.clone(),
            notifier.clone(),
            clock.clone(),
            instance_id,
            location,
            sync_client.clone(),
        );

        if let Some(sync_client) = &sync_client {
            sync_client.attach_scheduler(scheduler.clone()).await;
        }

        let aggregator = Arc::new(Aggregator::new(store.clone()));

        Ok(Arc::new(Self {
            store,
            logger,
            clock,
            kafka_pool,
            role,
            notifier,
            scheduler,
            aggregator,
            instance_id,
            config,
            sync_client,
            dependent_tasks: tokio::sync::Mutex::new(Vec::new()),
        }))
    }

    /// Aborts the dependent-only background loops (C10 refresh/debounce) so
    /// a freshly promoted primary doesn't keep syncing from its former self.
    async fn stop_dependent_tasks(&self) {
        for handle in self.dependent_tasks.lock().await.drain(..) {
            handle.abort();
        }
    }

    /// Starts exactly the subsystems the current role gates in, per the
    /// table in spec.md §4.8.
    pub async fn run(self: &Arc<Self>) -> MonitorResult<()> {
        match self.role.role().await {
            Role::Primary => self.run_as_primary().await,
            Role::Dependent { primary_sync_url } => self.run_as_dependent(primary_sync_url).await,
            Role::Standalone => self.run_as_standalone().await,
        }
    }

    async fn schedule_local_endpoints(self: &Arc<Self>) -> MonitorResult<()> {
        for endpoint in self.store.list_endpoints(false).await? {
            self.scheduler.start(endpoint);
        }
        Ok(())
    }

    async fn run_as_standalone(self: &Arc<Self>) -> MonitorResult<()> {
        info!("running as standalone");
        self.schedule_local_endpoints().await?;
        Ok(())
    }

    async fn run_as_primary(self: &Arc<Self>) -> MonitorResult<()> {
        info!("running as primary");
        self.schedule_local_endpoints().await?;

        let reaper = Reaper::new(self.store.clone());
        tokio::spawn(reaper.run());

        let state = SyncServerState {
            store: self.store.clone(),
            role: self.role.clone(),
            aggregator: self.aggregator.clone(),
            scheduler: self.scheduler.clone(),
            self_instance_id: self.instance_id,
            jwt_secret: self
                .store
                .config_get("jwt_secret")
                .await?
                .unwrap_or_default(),
        };
        let app = axum::Router::new()
            .route("/health", axum::routing::get(server::health))
            .nest("/api/sync", server::router(state));

        let addr = std::net::SocketAddr::from(([0, 0, 0, 0], self.config.port));
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| crate::error::MonitorError::Config(format!("bind {addr}: {e}")))?;
        info!(%addr, "sync server listening");
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                warn!(error = %e, "sync server exited");
            }
        });
        Ok(())
    }

    async fn run_as_dependent(self: &Arc<Self>, primary_sync_url: String) -> MonitorResult<()> {
        info!(%primary_sync_url, "running as dependent");
        let sync_client = self
            .sync_client
            .clone()
            .expect("sync_client wired during bootstrap for dependent role");

        sync_client.register_with_primary().await?;
        sync_client.fetch_endpoints_from_primary().await?;
        if let Err(e) = sync_client.refresh_instance_registry().await {
            warn!(error = %e, "initial instance registry fetch failed");
        }

        let refresh_handle =
            tokio::spawn(sync_client.clone().run_refresh_loop(Duration::from_secs(self.config.sync_interval_secs)));
        let debounce_handle = tokio::spawn(sync_client.clone().run_debounce_loop());
        *self.dependent_tasks.lock().await = vec![refresh_handle, debounce_handle];

        let promoter: Arc<dyn PromotionHandle> = Arc::new(PromotionCallback { services: self.clone() });
        let failover = FailoverController::new(
            self.store.clone(),
            sync_client,
            primary_sync_url,
            self.instance_id,
            self.config.failover_order,
            promoter,
        );
        tokio::spawn(failover.run());
        Ok(())
    }
}
