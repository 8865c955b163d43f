// shelf-server/src/models/delivery_job.rs

use crate::models::order::Order;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Product data frozen into a delivery job at hand-off.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobItem {
  pub line_item_id: String,
  pub product_id: String,
  pub title: String,
  pub subtitle: String,
  pub is_download_title: bool,
  pub quantity: i32,
  /// The line item's locked price, not the catalog price at hand-off time.
  pub price_cents: i64,
  pub download_url: Option<String>,
}

/// Queue-resident snapshot of a paid order awaiting download links.
///
/// Self-contained: nothing in here is re-read from the catalog while the job is in flight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryJob {
  pub order: Order,
  pub items: Vec<JobItem>,
  /// Number of download titles still to resolve.
  pub ebooks_count: usize,
  pub retry_budget: u32,
}

impl DeliveryJob {
  pub fn digital_product_ids(&self) -> Vec<String> {
    self
      .items
      .iter()
      .filter(|item| item.is_download_title)
      .map(|item| item.product_id.clone())
      .collect()
  }

  pub fn has_digital_items(&self) -> bool {
    self.items.iter().any(|item| item.is_download_title)
  }

  /// `(line_item_id, download_url)` for every resolved item.
  pub fn resolved_downloads(&self) -> Vec<(String, String)> {
    self
      .items
      .iter()
      .filter_map(|item| {
        item
          .download_url
          .as_ref()
          .map(|url| (item.line_item_id.clone(), url.clone()))
      })
      .collect()
  }
}

/// A pending job together with its queue key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedJob {
  pub key: String,
  pub job: DeliveryJob,
}

/// Terminal record kept for manual inspection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadLetter {
  pub key: String,
  pub reason: String,
  pub dead_lettered_at: DateTime<Utc>,
  pub job: DeliveryJob,
}
