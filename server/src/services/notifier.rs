// shelf-server/src/services/notifier.rs

//! Templated customer e-mail.
//!
//! [`Notifier`] is the transport; [`CustomerNotices`] builds the delivered/failed template data
//! and applies the [`NotificationPolicy`]. Under `BestEffort` a failed send is logged and
//! reported as [`NoticeOutcome::Swallowed`], and never changes order or job state.

use crate::config::{GatewayEndpoint, NotifyConfig};
use crate::errors::{AppError, Result};
use crate::models::{format_price, DeliveryJob, Order};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, instrument, warn};

#[async_trait]
pub trait Notifier: Send + Sync {
  async fn send(&self, template_id: &str, recipient: &str, template_data: Value) -> Result<()>;
}

/// Dynamic-template mail API (SendGrid v3 `mail/send` body).
pub struct HttpNotifier {
  client: reqwest::Client,
  endpoint: GatewayEndpoint,
  sender_email: String,
}

impl HttpNotifier {
  pub fn new(endpoint: GatewayEndpoint, sender_email: String) -> Result<Self> {
    let client = reqwest::Client::builder()
      .timeout(std::time::Duration::from_secs(30))
      .build()?;
    Ok(Self {
      client,
      endpoint,
      sender_email,
    })
  }
}

#[async_trait]
impl Notifier for HttpNotifier {
  #[instrument(name = "notifier::http::send", skip(self, template_data))]
  async fn send(&self, template_id: &str, recipient: &str, template_data: Value) -> Result<()> {
    let body = json!({
      "from": { "email": self.sender_email, "name": "Bookbox" },
      "personalizations": [{
        "to": [{ "email": recipient }],
        "dynamic_template_data": template_data,
      }],
      "template_id": template_id,
    });

    let response = self
      .client
      .post(format!("{}/v3/mail/send", self.endpoint.base_url))
      .bearer_auth(&self.endpoint.token)
      .json(&body)
      .send()
      .await
      .map_err(|e| AppError::NotificationFailed(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
      let detail = response.text().await.unwrap_or_default();
      return Err(AppError::NotificationFailed(format!(
        "response status code: {}, response: {}",
        status.as_u16(),
        detail
      )));
    }
    Ok(())
  }
}

/// Logs instead of sending. Used when no mail API is configured.
pub struct LogNotifier {
  sender_email: String,
}

impl LogNotifier {
  pub fn new(sender_email: impl Into<String>) -> Self {
    Self {
      sender_email: sender_email.into(),
    }
  }
}

#[async_trait]
impl Notifier for LogNotifier {
  async fn send(&self, template_id: &str, recipient: &str, template_data: Value) -> Result<()> {
    info!(
      from = %self.sender_email,
      to = %recipient,
      template_id,
      data = %template_data,
      "Simulating templated email."
    );
    Ok(())
  }
}

/// How notification errors affect the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationPolicy {
  /// Log the error and carry on as if the mail went out.
  BestEffort,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeOutcome {
  Sent,
  Swallowed,
}

#[derive(Clone)]
pub struct CustomerNotices {
  notifier: Arc<dyn Notifier>,
  delivered_template: String,
  failed_template: String,
  policy: NotificationPolicy,
}

impl CustomerNotices {
  pub fn new(notifier: Arc<dyn Notifier>, config: &NotifyConfig) -> Self {
    Self {
      notifier,
      delivered_template: config.order_template_id.clone(),
      failed_template: config.failed_template_id.clone(),
      policy: NotificationPolicy::BestEffort,
    }
  }

  pub fn policy(&self) -> NotificationPolicy {
    self.policy
  }

  /// Download links are ready.
  #[instrument(name = "notices::delivered", skip(self, job), fields(order_id = %job.order.id))]
  pub async fn delivered(&self, job: &DeliveryJob) -> NoticeOutcome {
    let result = self
      .notifier
      .send(&self.delivered_template, &job.order.email, delivered_template_data(job))
      .await;
    self.settle(result, &job.order.id)
  }

  /// Digital delivery gave up on this order.
  #[instrument(name = "notices::failed", skip(self, order), fields(order_id = %order.id))]
  pub async fn failed(&self, order: &Order) -> NoticeOutcome {
    let result = self
      .notifier
      .send(&self.failed_template, &order.email, json!({ "order_id": order.id }))
      .await;
    self.settle(result, &order.id)
  }

  fn settle(&self, result: Result<()>, order_id: &str) -> NoticeOutcome {
    match (result, self.policy) {
      (Ok(()), _) => NoticeOutcome::Sent,
      (Err(e), NotificationPolicy::BestEffort) => {
        warn!(%order_id, error = %e, "Customer notification failed; continuing.");
        NoticeOutcome::Swallowed
      }
    }
  }
}

pub fn delivered_template_data(job: &DeliveryJob) -> Value {
  let lines: Vec<Value> = job
    .items
    .iter()
    .map(|item| {
      json!({
        "title": item.title,
        "subtitle": item.subtitle,
        "ebook_url": item.download_url.clone().unwrap_or_default(),
        "price": format_price(item.price_cents),
      })
    })
    .collect();

  json!({
    "address": job.order.delivery_address,
    "order_id": job.order.id,
    "order": lines,
    "total_price": format_price(job.order.total_price_cents),
  })
}
