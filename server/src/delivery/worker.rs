// shelf-server/src/delivery/worker.rs

//! The single background loop that drains the delivery queue.
//!
//! Per job and poll: `Pending(n > 0)` decrements and persists the budget, then asks the gateway
//! for links. Success notifies the customer and removes the job (`Delivered`); failure leaves
//! `Pending(n - 1)` for the next poll. `Pending(0)` moves to dead-letter and notifies the
//! customer (`DeadLettered`). Terminal jobs never come back.

use crate::catalog::CatalogStore;
use crate::delivery::queue::DeliveryQueue;
use crate::errors::{AppError, Result};
use crate::models::DeliveryJob;
use crate::services::fulfillment_gateway::FulfillmentGateway;
use crate::services::notifier::CustomerNotices;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// What one poll did to one job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobTransition {
  Delivered,
  /// Attempt failed; the job stays pending with this budget.
  Retrying { retry_budget: u32 },
  DeadLettered,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollReport {
  pub delivered: usize,
  pub retrying: usize,
  pub dead_lettered: usize,
  /// Jobs whose queue bookkeeping failed; they are picked up again next poll.
  pub errored: usize,
}

impl PollReport {
  fn record(&mut self, transition: JobTransition) {
    match transition {
      JobTransition::Delivered => self.delivered += 1,
      JobTransition::Retrying { .. } => self.retrying += 1,
      JobTransition::DeadLettered => self.dead_lettered += 1,
    }
  }

  pub fn is_idle(&self) -> bool {
    *self == PollReport::default()
  }
}

pub struct DeliveryWorker {
  queue: Arc<dyn DeliveryQueue>,
  fulfillment: Arc<dyn FulfillmentGateway>,
  notices: CustomerNotices,
  catalog: Arc<dyn CatalogStore>,
  poll_interval: Duration,
}

impl DeliveryWorker {
  pub fn new(
    queue: Arc<dyn DeliveryQueue>,
    fulfillment: Arc<dyn FulfillmentGateway>,
    notices: CustomerNotices,
    catalog: Arc<dyn CatalogStore>,
    poll_interval: Duration,
  ) -> Self {
    Self {
      queue,
      fulfillment,
      notices,
      catalog,
      poll_interval,
    }
  }

  /// Polls every `poll_interval` until `shutdown` fires. A poll in progress finishes first.
  pub async fn run(self, shutdown: CancellationToken) {
    info!(interval_secs = self.poll_interval.as_secs(), "Delivery worker started.");
    loop {
      tokio::select! {
        _ = shutdown.cancelled() => {
          info!("Delivery worker received shutdown signal.");
          break;
        }
        _ = tokio::time::sleep(self.poll_interval) => {
          match self.poll_once().await {
            Ok(report) if report.is_idle() => {}
            Ok(report) => info!(?report, "Delivery poll finished."),
            Err(e) => error!(error = %e, "Failed to list pending delivery jobs."),
          }
        }
      }
    }
    info!("Delivery worker stopped.");
  }

  /// One pass over every pending job, in listing order.
  pub async fn poll_once(&self) -> Result<PollReport> {
    let pending = self.queue.list_pending().await?;
    let mut report = PollReport::default();
    for queued in pending {
      let mut job = queued.job;
      match self.process(&queued.key, &mut job).await {
        Ok(transition) => report.record(transition),
        Err(e) => {
          error!(job_key = %queued.key, order_id = %job.order.id, error = %e, "Delivery job bookkeeping failed.");
          report.errored += 1;
        }
      }
    }
    Ok(report)
  }

  #[instrument(
    name = "worker::process",
    skip(self, job),
    fields(order_id = %job.order.id, retry_budget = job.retry_budget)
  )]
  async fn process(&self, key: &str, job: &mut DeliveryJob) -> Result<JobTransition> {
    if job.retry_budget == 0 {
      let reason = AppError::RetryExhausted(job.order.id.clone()).to_string();
      self.queue.move_to_dead_letter(key, job, &reason).await?;
      warn!(%reason, "Delivery job dead-lettered.");
      self.notices.failed(&job.order).await;
      return Ok(JobTransition::DeadLettered);
    }

    // Persist first: a crash mid-attempt resumes with the reduced budget.
    job.retry_budget -= 1;
    self.queue.update(key, job).await?;

    let mut attempt = job.clone();
    if let Err(e) = self.fulfillment.resolve_downloads(&mut attempt).await {
      warn!(error = %e, remaining = job.retry_budget, "Download links not ready.");
      return Ok(JobTransition::Retrying {
        retry_budget: job.retry_budget,
      });
    }
    *job = attempt;

    self.notices.delivered(job).await;
    if let Err(e) = self.catalog.record_delivery(&job.order.id, &job.resolved_downloads()).await {
      warn!(error = %e, "Failed to record delivery on the order.");
    }
    self.queue.remove(key).await?;
    debug!("Delivery job completed.");
    Ok(JobTransition::Delivered)
  }
}
