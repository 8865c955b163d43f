// shelf-server/src/services/handoff.rs

//! Hand-off of a paid order to the ERP mirror and, for download titles, the delivery queue.

use crate::catalog::CatalogStore;
use crate::delivery::queue::DeliveryQueue;
use crate::errors::{AppError, Result};
use crate::models::{DeliveryJob, JobItem, Order};
use crate::services::erp_mirror::OrderMirror;
use crate::services::fulfillment_gateway::FulfillmentGateway;
use crate::services::notifier::CustomerNotices;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

/// What the hand-off did about digital delivery. Reported back to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryOutcome {
  /// Nothing to deliver digitally, or the order is not paid.
  None,
  Enqueued,
  /// The job went straight to dead-letter and the customer was notified.
  DeadLettered,
  /// The order could not be read, or the dead-letter write itself failed. The order stays
  /// committed.
  Failed,
}

pub struct PaidOrderHandoff {
  catalog: Arc<dyn CatalogStore>,
  queue: Arc<dyn DeliveryQueue>,
  fulfillment: Arc<dyn FulfillmentGateway>,
  notices: CustomerNotices,
  mirror: Arc<dyn OrderMirror>,
  retry_budget: u32,
}

impl PaidOrderHandoff {
  pub fn new(
    catalog: Arc<dyn CatalogStore>,
    queue: Arc<dyn DeliveryQueue>,
    fulfillment: Arc<dyn FulfillmentGateway>,
    notices: CustomerNotices,
    mirror: Arc<dyn OrderMirror>,
    retry_budget: u32,
  ) -> Self {
    Self {
      catalog,
      queue,
      fulfillment,
      notices,
      mirror,
      retry_budget,
    }
  }

  /// Re-reads the order, mirrors it to the ERP (errors logged only) and hands its download
  /// titles to delivery with a single gateway call.
  ///
  /// Once the order is read, a digital hand-off ends either enqueued or dead-lettered with a
  /// failure notice. A gateway failure dead-letters without retry: with no handle there is
  /// nothing to retry against.
  #[instrument(name = "handoff::run", skip(self))]
  pub async fn run(&self, order_id: &str) -> Result<DeliveryOutcome> {
    let order = self
      .catalog
      .order(order_id)
      .await?
      .ok_or_else(|| AppError::NotFound(format!("order {} doesn't exist", order_id)))?;

    if let Err(e) = self.mirror.mirror(&order).await {
      warn!(error = %e, "ERP mirror failed; order state unaffected.");
    }

    let Snapshot { mut job, unreadable } = self.snapshot(order).await;
    if !unreadable.is_empty() {
      error!(products = ?unreadable, "Order snapshot incomplete; dead-lettering for inspection.");
      let reason = format!("snapshot incomplete, unreadable products: {}", unreadable.join(", "));
      return self.dead_letter(&job, &reason).await;
    }
    if !job.has_digital_items() {
      info!("No download titles on order.");
      return Ok(DeliveryOutcome::None);
    }
    let product_ids = job.digital_product_ids();

    let handle = match self.fulfillment.create_order(&product_ids).await {
      Ok(handle) => handle,
      Err(e) => {
        error!(error = %e, "Fulfillment order creation failed; dead-lettering without retry.");
        let reason = match &e {
          AppError::GatewayUnavailable(_) => e.to_string(),
          other => AppError::GatewayUnavailable(other.to_string()).to_string(),
        };
        return self.dead_letter(&job, &reason).await;
      }
    };

    job.order.external_order_id = Some(handle.clone());
    job.ebooks_count = product_ids.len();
    if let Err(e) = self.catalog.set_external_order_id(&job.order.id, &handle).await {
      warn!(error = %e, %handle, "Failed to store fulfillment handle on the order.");
    }

    match self.queue.enqueue(&job).await {
      Ok(key) => {
        info!(job_key = %key, ebooks = job.ebooks_count, "Delivery job enqueued.");
        Ok(DeliveryOutcome::Enqueued)
      }
      Err(e) => {
        error!(error = %e, %handle, "Enqueue failed after the fulfillment handle was issued.");
        let reason = format!("enqueue failed for fulfillment handle {}: {}", handle, e);
        self.dead_letter(&job, &reason).await
      }
    }
  }

  /// Notifies the customer first, so a failing dead-letter write still leaves them informed.
  async fn dead_letter(&self, job: &DeliveryJob, reason: &str) -> Result<DeliveryOutcome> {
    self.notices.failed(&job.order).await;
    let key = self.queue.bury(job, reason).await?;
    warn!(job_key = %key, %reason, "Delivery job dead-lettered at hand-off.");
    Ok(DeliveryOutcome::DeadLettered)
  }

  /// Freezes the order with the product data the notifications need. Prices come from the
  /// line items, never from the live catalog.
  ///
  /// A line whose product can't be read keeps its line data, with the product id as title.
  async fn snapshot(&self, order: Order) -> Snapshot {
    let mut items = Vec::with_capacity(order.items.len());
    let mut unreadable = Vec::new();
    for line in &order.items {
      let product = match self.catalog.product(&line.product_id).await {
        Ok(Some(product)) => Some(product),
        Ok(None) => None,
        Err(e) => {
          warn!(product_id = %line.product_id, error = %e, "Product lookup failed during snapshot.");
          None
        }
      };
      let (title, subtitle, is_download_title) = match product {
        Some(product) => (product.title, product.subtitle, product.is_download_title),
        None => {
          unreadable.push(line.product_id.clone());
          (line.product_id.clone(), String::new(), false)
        }
      };
      items.push(JobItem {
        line_item_id: line.id.clone(),
        product_id: line.product_id.clone(),
        title,
        subtitle,
        is_download_title,
        quantity: line.quantity,
        price_cents: line.current_price_cents,
        download_url: None,
      });
    }
    Snapshot {
      job: DeliveryJob {
        order,
        items,
        ebooks_count: 0,
        retry_budget: self.retry_budget,
      },
      unreadable,
    }
  }
}

struct Snapshot {
  job: DeliveryJob,
  /// Product ids that could not be read from the catalog.
  unreadable: Vec<String>,
}
