// shelf-server/src/state.rs

use crate::catalog::{CatalogStore, MemoryCatalog, PgCatalog};
use crate::config::AppConfig;
use crate::delivery::{DeliveryQueue, DeliveryWorker, FileQueue};
use crate::errors::{AppError, Result};
use crate::locks::EntityLocks;
use crate::pipelines;
use crate::services::{
  CustomerNotices, FulfillmentGateway, HttpFulfillmentGateway, HttpNotifier, HttpOrderMirror, LogNotifier,
  LogOrderMirror, MockFulfillmentGateway, Notifier, OrderCommitter, OrderMirror, OrderValidator, PaidOrderHandoff,
};
use shelf_flow::Registry;
use sqlx::PgPool;
use std::sync::Arc;

/// The swappable collaborators of the order pipeline.
pub struct Backends {
  pub catalog: Arc<dyn CatalogStore>,
  pub queue: Arc<dyn DeliveryQueue>,
  pub fulfillment: Arc<dyn FulfillmentGateway>,
  pub notifier: Arc<dyn Notifier>,
  pub mirror: Arc<dyn OrderMirror>,
}

impl Backends {
  /// Real implementations where configured, local stand-ins elsewhere.
  pub async fn from_config(config: &AppConfig) -> Result<Self> {
    let catalog: Arc<dyn CatalogStore> = match &config.database_url {
      Some(url) => {
        let pool = PgPool::connect(url).await?;
        tracing::info!("Successfully connected to the database.");
        Arc::new(PgCatalog::new(pool))
      }
      None => {
        tracing::warn!("DATABASE_URL not set; using the in-memory catalog.");
        Arc::new(MemoryCatalog::new())
      }
    };

    let queue: Arc<dyn DeliveryQueue> = Arc::new(FileQueue::open(&config.delivery_queue_dir).await?);

    let fulfillment: Arc<dyn FulfillmentGateway> = match &config.fulfillment {
      Some(endpoint) => Arc::new(HttpFulfillmentGateway::new(endpoint.clone())?),
      None => {
        tracing::warn!("FULFILLMENT_API_URL not set; using the mock fulfillment gateway.");
        Arc::new(MockFulfillmentGateway)
      }
    };

    let notifier: Arc<dyn Notifier> = match &config.notify.endpoint {
      Some(endpoint) => Arc::new(HttpNotifier::new(endpoint.clone(), config.notify.sender_email.clone())?),
      None => Arc::new(LogNotifier::new(config.notify.sender_email.clone())),
    };

    let mirror: Arc<dyn OrderMirror> = match &config.erp {
      Some(endpoint) => Arc::new(HttpOrderMirror::new(endpoint.clone())?),
      None => Arc::new(LogOrderMirror),
    };

    Ok(Self {
      catalog,
      queue,
      fulfillment,
      notifier,
      mirror,
    })
  }
}

#[derive(Clone)]
pub struct AppState {
  pub catalog: Arc<dyn CatalogStore>,
  pub locks: Arc<EntityLocks>,
  pub queue: Arc<dyn DeliveryQueue>,
  pub fulfillment: Arc<dyn FulfillmentGateway>,
  pub notices: CustomerNotices,
  pub validator: Arc<OrderValidator>,
  pub committer: Arc<OrderCommitter>,
  pub handoff: Arc<PaidOrderHandoff>,
  pub flows: Arc<Registry<AppError>>,
  pub config: Arc<AppConfig>,
}

impl AppState {
  /// Wires the services over `backends` and registers the order pipelines.
  pub fn assemble(config: AppConfig, backends: Backends) -> Self {
    let Backends {
      catalog,
      queue,
      fulfillment,
      notifier,
      mirror,
    } = backends;

    let locks = Arc::new(EntityLocks::new());
    let notices = CustomerNotices::new(notifier, &config.notify);
    let handoff = PaidOrderHandoff::new(
      Arc::clone(&catalog),
      Arc::clone(&queue),
      Arc::clone(&fulfillment),
      notices.clone(),
      mirror,
      config.delivery_retry_budget,
    );

    let state = AppState {
      validator: Arc::new(OrderValidator::new(Arc::clone(&catalog))),
      committer: Arc::new(OrderCommitter::new(Arc::clone(&catalog), Arc::clone(&locks))),
      handoff: Arc::new(handoff),
      catalog,
      locks,
      queue,
      fulfillment,
      notices,
      flows: Arc::new(Registry::new()),
      config: Arc::new(config),
    };

    pipelines::register_all_pipelines(&state.flows, &state);
    state
  }

  pub fn delivery_worker(&self) -> DeliveryWorker {
    DeliveryWorker::new(
      Arc::clone(&self.queue),
      Arc::clone(&self.fulfillment),
      self.notices.clone(),
      Arc::clone(&self.catalog),
      self.config.delivery_poll_interval,
    )
  }
}
