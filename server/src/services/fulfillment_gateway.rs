// shelf-server/src/services/fulfillment_gateway.rs

//! The external e-book fulfillment service.
//!
//! One `create_order` call per paid order buys a handle covering all of its download titles;
//! `resolve_downloads` is then retried by the delivery worker until every title has a link.

use crate::config::GatewayEndpoint;
use crate::errors::{AppError, Result};
use crate::models::DeliveryJob;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, instrument};

#[async_trait]
pub trait FulfillmentGateway: Send + Sync {
  /// Returns the external order handle. Errors are `GatewayUnavailable`.
  async fn create_order(&self, product_ids: &[String]) -> Result<String>;

  /// Fills `download_url` on the job's digital items. Errors are `DeliveryAttemptFailed`; on
  /// error the job may be partly filled and must not be persisted as delivered.
  async fn resolve_downloads(&self, job: &mut DeliveryJob) -> Result<()>;
}

#[derive(Serialize)]
struct CreateOrderRequest<'a> {
  product_ids: &'a [String],
}

#[derive(Deserialize)]
struct CreateOrderResponse {
  order_id: String,
}

#[derive(Deserialize)]
struct DownloadLink {
  product_id: String,
  url: String,
}

#[derive(Deserialize)]
struct DownloadsResponse {
  #[serde(default)]
  downloads: Vec<DownloadLink>,
}

pub struct HttpFulfillmentGateway {
  client: reqwest::Client,
  endpoint: GatewayEndpoint,
}

impl HttpFulfillmentGateway {
  pub fn new(endpoint: GatewayEndpoint) -> Result<Self> {
    let client = reqwest::Client::builder()
      .timeout(std::time::Duration::from_secs(30))
      .build()?;
    Ok(Self { client, endpoint })
  }
}

#[async_trait]
impl FulfillmentGateway for HttpFulfillmentGateway {
  #[instrument(name = "fulfillment::create_order", skip(self), fields(titles = product_ids.len()))]
  async fn create_order(&self, product_ids: &[String]) -> Result<String> {
    let response = self
      .client
      .post(format!("{}/orders", self.endpoint.base_url))
      .bearer_auth(&self.endpoint.token)
      .json(&CreateOrderRequest { product_ids })
      .send()
      .await
      .map_err(|e| AppError::GatewayUnavailable(e.to_string()))?;

    if !response.status().is_success() {
      return Err(AppError::GatewayUnavailable(format!(
        "create order returned {}",
        response.status()
      )));
    }
    let created: CreateOrderResponse = response
      .json()
      .await
      .map_err(|e| AppError::GatewayUnavailable(format!("unreadable create order response: {}", e)))?;
    Ok(created.order_id)
  }

  #[instrument(
    name = "fulfillment::resolve_downloads",
    skip(self, job),
    fields(order_id = %job.order.id, expected = job.ebooks_count)
  )]
  async fn resolve_downloads(&self, job: &mut DeliveryJob) -> Result<()> {
    let handle = job
      .order
      .external_order_id
      .clone()
      .ok_or_else(|| AppError::DeliveryAttemptFailed("job has no fulfillment handle".to_string()))?;

    let response = self
      .client
      .get(format!("{}/orders/{}/downloads", self.endpoint.base_url, handle))
      .bearer_auth(&self.endpoint.token)
      .send()
      .await
      .map_err(|e| AppError::DeliveryAttemptFailed(e.to_string()))?;

    if !response.status().is_success() {
      return Err(AppError::DeliveryAttemptFailed(format!(
        "download lookup returned {}",
        response.status()
      )));
    }
    let body: DownloadsResponse = response
      .json()
      .await
      .map_err(|e| AppError::DeliveryAttemptFailed(format!("unreadable downloads response: {}", e)))?;

    let links: HashMap<String, String> = body.downloads.into_iter().map(|d| (d.product_id, d.url)).collect();
    apply_links(job, &links)
  }
}

/// Attaches links to digital items; fails unless every one of them got a link.
pub fn apply_links(job: &mut DeliveryJob, links: &HashMap<String, String>) -> Result<()> {
  let mut resolved = 0usize;
  for item in job.items.iter_mut().filter(|item| item.is_download_title) {
    if let Some(url) = links.get(&item.product_id) {
      item.download_url = Some(url.clone());
      resolved += 1;
    }
  }
  if resolved < job.ebooks_count {
    return Err(AppError::DeliveryAttemptFailed(format!(
      "{} of {} download links ready",
      resolved, job.ebooks_count
    )));
  }
  debug!(resolved, "All download links attached.");
  Ok(())
}

/// Stands in for the fulfillment service on local runs: handles and links are derived from ids.
#[derive(Default)]
pub struct MockFulfillmentGateway;

#[async_trait]
impl FulfillmentGateway for MockFulfillmentGateway {
  async fn create_order(&self, product_ids: &[String]) -> Result<String> {
    let handle = format!("mock_ebook_order_{}", uuid::Uuid::new_v4());
    tracing::info!(%handle, titles = product_ids.len(), "Mock fulfillment order created.");
    Ok(handle)
  }

  async fn resolve_downloads(&self, job: &mut DeliveryJob) -> Result<()> {
    let handle = job.order.external_order_id.clone().unwrap_or_default();
    let links = job
      .digital_product_ids()
      .into_iter()
      .map(|id| {
        let url = format!("https://downloads.example.com/{}/{}", handle, id);
        (id, url)
      })
      .collect();
    apply_links(job, &links)
  }
}
