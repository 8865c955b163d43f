// shelf-server/src/models/order.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type as SqlxType};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, SqlxType)]
#[sqlx(type_name = "payment_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
  Pending,
  Paid,
  Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, SqlxType)]
#[sqlx(type_name = "delivery_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
  Open,
  Delivered,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, SqlxType)]
#[sqlx(type_name = "order_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
  InProgress,
  Completed,
  Cancelled,
}

impl fmt::Display for PaymentStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      PaymentStatus::Pending => "pending",
      PaymentStatus::Paid => "paid",
      PaymentStatus::Failed => "failed",
    })
  }
}

/// The three status columns an order is created with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderStatuses {
  pub payment: PaymentStatus,
  pub delivery: DeliveryStatus,
  pub order: OrderStatus,
}

impl Default for OrderStatuses {
  fn default() -> Self {
    Self {
      payment: PaymentStatus::Pending,
      delivery: DeliveryStatus::Open,
      order: OrderStatus::InProgress,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct OrderLineItem {
  pub id: String,
  pub order_id: String,
  pub product_id: String,
  pub quantity: i32,
  /// Unit price captured at validation. Never recomputed.
  pub current_price_cents: i64,
  pub download_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Order {
  pub id: String,
  /// `None` for guest orders.
  pub user_id: Option<String>,
  pub sales_channel_id: String,
  pub email: String,
  pub first_name: String,
  pub last_name: String,
  pub delivery_address: String,
  pub invoice_address: String,
  pub payment_method: Option<String>,
  pub total_price_cents: i64,
  pub payment_status: PaymentStatus,
  pub delivery_status: DeliveryStatus,
  pub order_status: OrderStatus,
  /// Handle issued by the digital fulfillment gateway on hand-off.
  pub external_order_id: Option<String>,
  pub active: bool,
  pub created_at: DateTime<Utc>,
  #[sqlx(skip)]
  pub items: Vec<OrderLineItem>,
}

impl Order {
  pub fn product_ids(&self) -> impl Iterator<Item = &str> {
    self.items.iter().map(|item| item.product_id.as_str())
  }
}

/// Who submits an order. Only admins may set statuses on creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssuerRole {
  Admin,
  Customer,
}

impl IssuerRole {
  pub fn is_privileged(self) -> bool {
    matches!(self, IssuerRole::Admin)
  }
}

impl FromStr for IssuerRole {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "admin" => Ok(IssuerRole::Admin),
      "customer" => Ok(IssuerRole::Customer),
      other => Err(format!("unknown issuer role '{}'", other)),
    }
  }
}

/// One `{product_id, quantity}` pair of an order submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineRequest {
  #[serde(default)]
  pub product_id: String,
  pub quantity: i32,
}

/// Order submission body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderRequest {
  pub sales_channel_id: Option<String>,
  #[serde(default)]
  pub products: Vec<LineRequest>,
  #[serde(default)]
  pub email: String,
  #[serde(default)]
  pub first_name: String,
  #[serde(default)]
  pub last_name: String,
  #[serde(default)]
  pub delivery_address: String,
  #[serde(default)]
  pub invoice_address: String,
  pub payment_method: Option<String>,
  // Honoured for admins only.
  pub payment_status: Option<PaymentStatus>,
  pub delivery_status: Option<DeliveryStatus>,
  pub order_status: Option<OrderStatus>,
}

impl OrderRequest {
  pub fn requested_statuses(&self) -> OrderStatuses {
    let defaults = OrderStatuses::default();
    OrderStatuses {
      payment: self.payment_status.unwrap_or(defaults.payment),
      delivery: self.delivery_status.unwrap_or(defaults.delivery),
      order: self.order_status.unwrap_or(defaults.order),
    }
  }
}

/// `1399` -> `"13.99€"`.
pub fn format_price(cents: i64) -> String {
  let sign = if cents < 0 { "-" } else { "" };
  let abs = cents.unsigned_abs();
  format!("{}{}.{:02}€", sign, abs / 100, abs % 100)
}
