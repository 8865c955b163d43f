// shelf-server/src/services/order_committer.rs

//! Persists an order and its stock decrements as one unit.

use crate::catalog::CatalogStore;
use crate::errors::{AppError, Result};
use crate::locks::EntityLocks;
use crate::models::{Order, Product};
use std::sync::Arc;
use tracing::{info, instrument};

pub struct OrderCommitter {
  catalog: Arc<dyn CatalogStore>,
  locks: Arc<EntityLocks>,
}

impl OrderCommitter {
  pub fn new(catalog: Arc<dyn CatalogStore>, locks: Arc<EntityLocks>) -> Self {
    Self { catalog, locks }
  }

  /// Re-checks and decrements stock for every line, then inserts the order, in one
  /// transaction under the locks of all products on the order.
  ///
  /// On any error the transaction is dropped uncommitted: no stock moves and no order exists.
  #[instrument(name = "committer::commit", skip(self, order), fields(order_id = %order.id, lines = order.items.len()))]
  pub async fn commit(&self, order: &Order) -> Result<String> {
    let _locked = self.locks.products.acquire(order.product_ids()).await;
    let mut tx = self.catalog.begin().await?;

    for item in &order.items {
      let product = tx
        .product_for_update(&item.product_id)
        .await?
        .ok_or_else(|| AppError::CommitConflict("product does not exist".to_string()))?;

      let remaining = product.stock - item.quantity;
      if remaining < 0 {
        return Err(AppError::CommitConflict(format!("product: {} is out of stock", product.title)));
      }
      tx.set_stock(&product.id, remaining).await?;
    }

    tx.insert_order(order).await?;
    tx.commit().await?;

    info!(total_price_cents = order.total_price_cents, "Order committed.");
    Ok(order.id.clone())
  }

  /// Product edit path; shares the per-product lock with `commit`.
  #[instrument(name = "committer::save_product", skip(self, product), fields(product_id = %product.id))]
  pub async fn save_product(&self, product: &Product) -> Result<()> {
    if product.stock < 0 {
      return Err(AppError::InvalidInput("stock cannot be negative".to_string()));
    }
    let _locked = self.locks.products.acquire([product.id.as_str()]).await;
    self.catalog.save_product(product).await
  }
}
