// shelf-server/src/catalog/postgres.rs

//! Postgres catalog. Table layout lives in `schema.sql`.

use crate::catalog::{CatalogStore, CatalogTx};
use crate::errors::{AppError, Result};
use crate::models::{ChannelOverride, DeliveryStatus, Order, OrderLineItem, PaymentStatus, Product};
use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::instrument;

const PRODUCT_COLUMNS: &str = "id, title, subtitle, stock, selling_price_cents, is_download_title, active";

const ORDER_COLUMNS: &str = "id, user_id, sales_channel_id, email, first_name, last_name, delivery_address, \
   invoice_address, payment_method, total_price_cents, payment_status, delivery_status, order_status, \
   external_order_id, active, created_at";

#[derive(Clone)]
pub struct PgCatalog {
  pool: PgPool,
}

impl PgCatalog {
  pub fn new(pool: PgPool) -> Self {
    Self { pool }
  }

  fn missing_order(order_id: &str, rows_affected: u64) -> Result<()> {
    if rows_affected == 0 {
      return Err(AppError::NotFound(format!("order {} doesn't exist", order_id)));
    }
    Ok(())
  }
}

#[async_trait]
impl CatalogStore for PgCatalog {
  async fn product(&self, product_id: &str) -> Result<Option<Product>> {
    let sql = format!("SELECT {} FROM products WHERE id = $1", PRODUCT_COLUMNS);
    let product = sqlx::query_as::<_, Product>(&sql)
      .bind(product_id)
      .fetch_optional(&self.pool)
      .await?;
    Ok(product)
  }

  async fn channel_override(&self, product_id: &str, sales_channel_id: &str) -> Result<Option<ChannelOverride>> {
    let found = sqlx::query_as::<_, ChannelOverride>(
      "SELECT product_id, sales_channel_id, changed_price_cents, changed_title \
       FROM sales_channel_products WHERE product_id = $1 AND sales_channel_id = $2",
    )
    .bind(product_id)
    .bind(sales_channel_id)
    .fetch_optional(&self.pool)
    .await?;
    Ok(found)
  }

  #[instrument(name = "catalog::pg::order", skip(self))]
  async fn order(&self, order_id: &str) -> Result<Option<Order>> {
    let sql = format!("SELECT {} FROM orders WHERE id = $1", ORDER_COLUMNS);
    let Some(mut order) = sqlx::query_as::<_, Order>(&sql)
      .bind(order_id)
      .fetch_optional(&self.pool)
      .await?
    else {
      return Ok(None);
    };

    order.items = sqlx::query_as::<_, OrderLineItem>(
      "SELECT id, order_id, product_id, quantity, current_price_cents, download_url \
       FROM order_items WHERE order_id = $1 ORDER BY position",
    )
    .bind(order_id)
    .fetch_all(&self.pool)
    .await?;
    Ok(Some(order))
  }

  async fn begin(&self) -> Result<Box<dyn CatalogTx>> {
    let tx = self.pool.begin().await?;
    Ok(Box::new(PgCatalogTx { tx }))
  }

  async fn save_product(&self, product: &Product) -> Result<()> {
    sqlx::query(
      "INSERT INTO products (id, title, subtitle, stock, selling_price_cents, is_download_title, active) \
       VALUES ($1, $2, $3, $4, $5, $6, $7) \
       ON CONFLICT (id) DO UPDATE SET title = EXCLUDED.title, subtitle = EXCLUDED.subtitle, \
       stock = EXCLUDED.stock, selling_price_cents = EXCLUDED.selling_price_cents, \
       is_download_title = EXCLUDED.is_download_title, active = EXCLUDED.active",
    )
    .bind(&product.id)
    .bind(&product.title)
    .bind(&product.subtitle)
    .bind(product.stock)
    .bind(product.selling_price_cents)
    .bind(product.is_download_title)
    .bind(product.active)
    .execute(&self.pool)
    .await?;
    Ok(())
  }

  async fn set_payment_status(&self, order_id: &str, status: PaymentStatus) -> Result<()> {
    let result = sqlx::query("UPDATE orders SET payment_status = $2 WHERE id = $1")
      .bind(order_id)
      .bind(status)
      .execute(&self.pool)
      .await?;
    Self::missing_order(order_id, result.rows_affected())
  }

  async fn set_external_order_id(&self, order_id: &str, external_order_id: &str) -> Result<()> {
    let result = sqlx::query("UPDATE orders SET external_order_id = $2 WHERE id = $1")
      .bind(order_id)
      .bind(external_order_id)
      .execute(&self.pool)
      .await?;
    Self::missing_order(order_id, result.rows_affected())
  }

  #[instrument(name = "catalog::pg::record_delivery", skip(self, downloads), fields(links = downloads.len()))]
  async fn record_delivery(&self, order_id: &str, downloads: &[(String, String)]) -> Result<()> {
    let mut tx = self.pool.begin().await?;
    for (line_item_id, url) in downloads {
      sqlx::query("UPDATE order_items SET download_url = $3 WHERE id = $1 AND order_id = $2")
        .bind(line_item_id)
        .bind(order_id)
        .bind(url)
        .execute(&mut *tx)
        .await?;
    }
    let result = sqlx::query("UPDATE orders SET delivery_status = $2 WHERE id = $1")
      .bind(order_id)
      .bind(DeliveryStatus::Delivered)
      .execute(&mut *tx)
      .await?;
    Self::missing_order(order_id, result.rows_affected())?;
    tx.commit().await?;
    Ok(())
  }
}

/// Rolled back by sqlx when dropped uncommitted.
struct PgCatalogTx {
  tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl CatalogTx for PgCatalogTx {
  async fn product_for_update(&mut self, product_id: &str) -> Result<Option<Product>> {
    let sql = format!("SELECT {} FROM products WHERE id = $1 FOR UPDATE", PRODUCT_COLUMNS);
    let product = sqlx::query_as::<_, Product>(&sql)
      .bind(product_id)
      .fetch_optional(&mut *self.tx)
      .await?;
    Ok(product)
  }

  async fn set_stock(&mut self, product_id: &str, stock: i32) -> Result<()> {
    sqlx::query("UPDATE products SET stock = $2 WHERE id = $1")
      .bind(product_id)
      .bind(stock)
      .execute(&mut *self.tx)
      .await?;
    Ok(())
  }

  async fn insert_order(&mut self, order: &Order) -> Result<()> {
    let sql = format!(
      "INSERT INTO orders ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)",
      ORDER_COLUMNS
    );
    sqlx::query(&sql)
      .bind(&order.id)
      .bind(&order.user_id)
      .bind(&order.sales_channel_id)
      .bind(&order.email)
      .bind(&order.first_name)
      .bind(&order.last_name)
      .bind(&order.delivery_address)
      .bind(&order.invoice_address)
      .bind(&order.payment_method)
      .bind(order.total_price_cents)
      .bind(order.payment_status)
      .bind(order.delivery_status)
      .bind(order.order_status)
      .bind(&order.external_order_id)
      .bind(order.active)
      .bind(order.created_at)
      .execute(&mut *self.tx)
      .await?;

    for (position, item) in order.items.iter().enumerate() {
      sqlx::query(
        "INSERT INTO order_items (id, order_id, product_id, quantity, current_price_cents, download_url, position) \
         VALUES ($1, $2, $3, $4, $5, $6, $7)",
      )
      .bind(&item.id)
      .bind(&item.order_id)
      .bind(&item.product_id)
      .bind(item.quantity)
      .bind(item.current_price_cents)
      .bind(&item.download_url)
      .bind(position as i32)
      .execute(&mut *self.tx)
      .await?;
    }
    Ok(())
  }

  async fn commit(self: Box<Self>) -> Result<()> {
    let PgCatalogTx { tx } = *self;
    tx.commit().await?;
    Ok(())
  }
}
