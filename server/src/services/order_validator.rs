// shelf-server/src/services/order_validator.rs

//! Validation and pricing of an order submission. Reads the catalog, writes nothing.

use crate::catalog::CatalogStore;
use crate::errors::{AppError, Result};
use crate::models::{IssuerRole, LineRequest, Order, OrderLineItem, OrderRequest, OrderStatuses};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, instrument};
use uuid::Uuid;

/// Added to orders with a physical item below the free-shipping threshold.
pub const SHIPPING_SURCHARGE_CENTS: i64 = 399;
pub const FREE_SHIPPING_THRESHOLD_CENTS: i64 = 4000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricedLine {
  pub product_id: String,
  pub quantity: i32,
  pub current_price_cents: i64,
  pub is_download_title: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricedOrder {
  pub sales_channel_id: String,
  pub lines: Vec<PricedLine>,
  pub total_price_cents: i64,
  pub all_digital: bool,
  pub statuses: OrderStatuses,
}

impl PricedOrder {
  /// Builds the order row to commit, with fresh ids.
  pub fn into_order(self, request: &OrderRequest, user_id: Option<String>) -> Order {
    let order_id = Uuid::new_v4().to_string();
    let items = self
      .lines
      .into_iter()
      .map(|line| OrderLineItem {
        id: Uuid::new_v4().to_string(),
        order_id: order_id.clone(),
        product_id: line.product_id,
        quantity: line.quantity,
        current_price_cents: line.current_price_cents,
        download_url: None,
      })
      .collect();

    Order {
      id: order_id,
      user_id,
      sales_channel_id: self.sales_channel_id,
      email: request.email.clone(),
      first_name: request.first_name.clone(),
      last_name: request.last_name.clone(),
      delivery_address: request.delivery_address.clone(),
      invoice_address: request.invoice_address.clone(),
      payment_method: request.payment_method.clone(),
      total_price_cents: self.total_price_cents,
      payment_status: self.statuses.payment,
      delivery_status: self.statuses.delivery,
      order_status: self.statuses.order,
      external_order_id: None,
      active: true,
      created_at: Utc::now(),
      items,
    }
  }
}

/// Digital-only orders never pay shipping.
pub fn apply_shipping_surcharge(subtotal_cents: i64, all_digital: bool) -> i64 {
  if !all_digital && subtotal_cents < FREE_SHIPPING_THRESHOLD_CENTS {
    subtotal_cents + SHIPPING_SURCHARGE_CENTS
  } else {
    subtotal_cents
  }
}

pub struct OrderValidator {
  catalog: Arc<dyn CatalogStore>,
}

impl OrderValidator {
  pub fn new(catalog: Arc<dyn CatalogStore>) -> Self {
    Self { catalog }
  }

  /// Checks every line against live stock and locks in its channel price.
  ///
  /// Statuses other than the defaults are only kept for privileged issuers.
  #[instrument(name = "validator::validate", skip(self, lines, requested), fields(lines = lines.len()))]
  pub async fn validate(
    &self,
    sales_channel_id: Option<&str>,
    lines: &[LineRequest],
    issuer: IssuerRole,
    requested: OrderStatuses,
  ) -> Result<PricedOrder> {
    let sales_channel_id = sales_channel_id
      .map(str::trim)
      .filter(|id| !id.is_empty())
      .ok_or_else(|| AppError::InvalidInput("sales channel cannot be unspecified".to_string()))?;

    if lines.is_empty() {
      return Err(AppError::InvalidInput("no products present in order".to_string()));
    }

    let mut priced = Vec::with_capacity(lines.len());
    let mut subtotal_cents: i64 = 0;
    let mut all_digital = true;

    for line in lines {
      if line.product_id.trim().is_empty() {
        return Err(AppError::InvalidInput("no product_id present in orderItem".to_string()));
      }
      if line.quantity <= 0 {
        return Err(AppError::InvalidInput(format!(
          "quantity for product {} must be a positive integer",
          line.product_id
        )));
      }

      let product = self
        .catalog
        .product(&line.product_id)
        .await?
        .ok_or_else(|| AppError::NotFound("that product doesn't exist".to_string()))?;

      if !product.active {
        return Err(AppError::Inactive("invalid product found in order".to_string()));
      }
      if product.stock == 0 {
        return Err(AppError::OutOfStock(format!("product: {} is out of stock", product.title)));
      }
      if product.stock - line.quantity < 0 {
        return Err(AppError::InsufficientStock(
          "not enough product is available in stock".to_string(),
        ));
      }

      let channel_override = self.catalog.channel_override(&product.id, sales_channel_id).await?;
      let unit_price = product.effective_price_cents(channel_override.as_ref());
      if !product.is_download_title {
        all_digital = false;
      }

      subtotal_cents += unit_price * i64::from(line.quantity);
      debug!(product_id = %product.id, unit_price, quantity = line.quantity, "Line priced.");
      priced.push(PricedLine {
        product_id: product.id,
        quantity: line.quantity,
        current_price_cents: unit_price,
        is_download_title: product.is_download_title,
      });
    }

    let statuses = if issuer.is_privileged() {
      requested
    } else {
      OrderStatuses::default()
    };

    Ok(PricedOrder {
      sales_channel_id: sales_channel_id.to_string(),
      lines: priced,
      total_price_cents: apply_shipping_surcharge(subtotal_cents, all_digital),
      all_digital,
      statuses,
    })
  }
}
