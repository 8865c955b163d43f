// shelf-server/src/catalog/memory.rs

use crate::catalog::{CatalogStore, CatalogTx};
use crate::errors::{AppError, Result};
use crate::models::{ChannelOverride, DeliveryStatus, Order, PaymentStatus, Product};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Default)]
struct Tables {
  products: HashMap<String, Product>,
  overrides: HashMap<(String, String), ChannelOverride>,
  orders: HashMap<String, Order>,
}

/// In-process catalog used when no database is configured, and by tests.
#[derive(Clone, Default)]
pub struct MemoryCatalog {
  tables: Arc<Mutex<Tables>>,
}

impl MemoryCatalog {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_products(products: impl IntoIterator<Item = Product>) -> Self {
    let catalog = Self::new();
    {
      let mut tables = catalog.tables.lock();
      for product in products {
        tables.products.insert(product.id.clone(), product);
      }
    }
    catalog
  }

  pub fn put_override(&self, channel_override: ChannelOverride) {
    let key = (
      channel_override.product_id.clone(),
      channel_override.sales_channel_id.clone(),
    );
    self.tables.lock().overrides.insert(key, channel_override);
  }

  pub fn stock_of(&self, product_id: &str) -> Option<i32> {
    self.tables.lock().products.get(product_id).map(|p| p.stock)
  }

  pub fn order_count(&self) -> usize {
    self.tables.lock().orders.len()
  }
}

#[async_trait]
impl CatalogStore for MemoryCatalog {
  async fn product(&self, product_id: &str) -> Result<Option<Product>> {
    Ok(self.tables.lock().products.get(product_id).cloned())
  }

  async fn channel_override(&self, product_id: &str, sales_channel_id: &str) -> Result<Option<ChannelOverride>> {
    let key = (product_id.to_string(), sales_channel_id.to_string());
    Ok(self.tables.lock().overrides.get(&key).cloned())
  }

  async fn order(&self, order_id: &str) -> Result<Option<Order>> {
    Ok(self.tables.lock().orders.get(order_id).cloned())
  }

  async fn begin(&self) -> Result<Box<dyn CatalogTx>> {
    Ok(Box::new(MemoryTx {
      tables: Arc::clone(&self.tables),
      staged_stock: HashMap::new(),
      staged_orders: Vec::new(),
    }))
  }

  async fn save_product(&self, product: &Product) -> Result<()> {
    self.tables.lock().products.insert(product.id.clone(), product.clone());
    Ok(())
  }

  async fn set_payment_status(&self, order_id: &str, status: PaymentStatus) -> Result<()> {
    let mut tables = self.tables.lock();
    let order = tables
      .orders
      .get_mut(order_id)
      .ok_or_else(|| AppError::NotFound(format!("order {} doesn't exist", order_id)))?;
    order.payment_status = status;
    Ok(())
  }

  async fn set_external_order_id(&self, order_id: &str, external_order_id: &str) -> Result<()> {
    let mut tables = self.tables.lock();
    let order = tables
      .orders
      .get_mut(order_id)
      .ok_or_else(|| AppError::NotFound(format!("order {} doesn't exist", order_id)))?;
    order.external_order_id = Some(external_order_id.to_string());
    Ok(())
  }

  async fn record_delivery(&self, order_id: &str, downloads: &[(String, String)]) -> Result<()> {
    let mut tables = self.tables.lock();
    let order = tables
      .orders
      .get_mut(order_id)
      .ok_or_else(|| AppError::NotFound(format!("order {} doesn't exist", order_id)))?;
    for (line_item_id, url) in downloads {
      if let Some(item) = order.items.iter_mut().find(|i| &i.id == line_item_id) {
        item.download_url = Some(url.clone());
      }
    }
    order.delivery_status = DeliveryStatus::Delivered;
    Ok(())
  }
}

/// Writes are staged locally and applied under one lock on commit.
struct MemoryTx {
  tables: Arc<Mutex<Tables>>,
  staged_stock: HashMap<String, i32>,
  staged_orders: Vec<Order>,
}

#[async_trait]
impl CatalogTx for MemoryTx {
  async fn product_for_update(&mut self, product_id: &str) -> Result<Option<Product>> {
    let mut product = self.tables.lock().products.get(product_id).cloned();
    if let (Some(p), Some(stock)) = (product.as_mut(), self.staged_stock.get(product_id)) {
      p.stock = *stock;
    }
    Ok(product)
  }

  async fn set_stock(&mut self, product_id: &str, stock: i32) -> Result<()> {
    self.staged_stock.insert(product_id.to_string(), stock);
    Ok(())
  }

  async fn insert_order(&mut self, order: &Order) -> Result<()> {
    self.staged_orders.push(order.clone());
    Ok(())
  }

  async fn commit(self: Box<Self>) -> Result<()> {
    let MemoryTx {
      tables,
      staged_stock,
      staged_orders,
    } = *self;
    let mut tables = tables.lock();
    if let Some(missing) = staged_stock.keys().find(|id| !tables.products.contains_key(*id)) {
      return Err(AppError::CommitConflict(format!("product {} was removed during commit", missing)));
    }
    for (product_id, stock) in staged_stock {
      if let Some(product) = tables.products.get_mut(&product_id) {
        product.stock = stock;
      }
    }
    for order in staged_orders {
      tables.orders.insert(order.id.clone(), order);
    }
    Ok(())
  }
}
