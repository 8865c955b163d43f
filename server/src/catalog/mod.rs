// shelf-server/src/catalog/mod.rs

//! Product and order storage as seen by the order pipeline.
//!
//! Reads go straight to the store. Stock decrements and the order insert go through a
//! [`CatalogTx`]: nothing staged on it is visible until `commit`, and dropping it without
//! committing discards everything.

pub mod memory;
pub mod postgres;

use crate::errors::Result;
use crate::models::{ChannelOverride, Order, PaymentStatus, Product};
use async_trait::async_trait;

pub use memory::MemoryCatalog;
pub use postgres::PgCatalog;

#[async_trait]
pub trait CatalogStore: Send + Sync {
  async fn product(&self, product_id: &str) -> Result<Option<Product>>;

  async fn channel_override(&self, product_id: &str, sales_channel_id: &str) -> Result<Option<ChannelOverride>>;

  /// The order with its line items.
  async fn order(&self, order_id: &str) -> Result<Option<Order>>;

  async fn begin(&self) -> Result<Box<dyn CatalogTx>>;

  /// Inserts or replaces a product. Callers hold the product's lock.
  async fn save_product(&self, product: &Product) -> Result<()>;

  async fn set_payment_status(&self, order_id: &str, status: PaymentStatus) -> Result<()>;

  async fn set_external_order_id(&self, order_id: &str, external_order_id: &str) -> Result<()>;

  /// Stores download links per line item and marks the order delivered.
  async fn record_delivery(&self, order_id: &str, downloads: &[(String, String)]) -> Result<()>;
}

#[async_trait]
pub trait CatalogTx: Send {
  /// Reads the product inside the transaction, seeing this transaction's own writes.
  async fn product_for_update(&mut self, product_id: &str) -> Result<Option<Product>>;

  async fn set_stock(&mut self, product_id: &str, stock: i32) -> Result<()>;

  async fn insert_order(&mut self, order: &Order) -> Result<()>;

  async fn commit(self: Box<Self>) -> Result<()>;
}

/// Product title as a sales channel shows it.
pub async fn display_title(catalog: &dyn CatalogStore, product: &Product, sales_channel_id: &str) -> Result<String> {
  let channel_override = catalog.channel_override(&product.id, sales_channel_id).await?;
  Ok(product.display_title(channel_override.as_ref()))
}
