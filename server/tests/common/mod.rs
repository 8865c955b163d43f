// tests/common/mod.rs
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use serde_json::Value;
use shelf_server::catalog::{CatalogStore, CatalogTx, MemoryCatalog};
use shelf_server::config::AppConfig;
use shelf_server::delivery::{DeliveryQueue, MemoryQueue};
use shelf_server::errors::{AppError, Result};
use shelf_server::models::{
  ChannelOverride, DeadLetter, DeliveryJob, DeliveryStatus, IssuerRole, JobItem, LineRequest, Order, OrderLineItem,
  OrderRequest, OrderStatus, OrderStatuses, PaymentStatus, Product, QueuedJob,
};
use shelf_server::services::fulfillment_gateway::apply_links;
use shelf_server::services::{CustomerNotices, FulfillmentGateway, Notifier, OrderMirror};
use shelf_server::state::{AppState, Backends};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::Level;

pub const CHANNEL: &str = "web-shop";

static TRACING: Lazy<()> = Lazy::new(|| {
  let _ = tracing_subscriber::fmt()
    .with_max_level(Level::DEBUG)
    .with_test_writer()
    .try_init();
});

pub fn setup_tracing() {
  Lazy::force(&TRACING);
}

// --- Catalog fixtures ---

pub fn ebook(id: &str, title: &str, price_cents: i64, stock: i32) -> Product {
  Product {
    id: id.to_string(),
    title: title.to_string(),
    subtitle: format!("{} (e-book)", title),
    stock,
    selling_price_cents: price_cents,
    is_download_title: true,
    active: true,
  }
}

pub fn paperback(id: &str, title: &str, price_cents: i64, stock: i32) -> Product {
  Product {
    is_download_title: false,
    subtitle: format!("{} (paperback)", title),
    ..ebook(id, title, price_cents, stock)
  }
}

pub fn line(product_id: &str, quantity: i32) -> LineRequest {
  LineRequest {
    product_id: product_id.to_string(),
    quantity,
  }
}

pub fn order_request(lines: Vec<LineRequest>) -> OrderRequest {
  OrderRequest {
    sales_channel_id: Some(CHANNEL.to_string()),
    products: lines,
    email: "reader@example.com".to_string(),
    first_name: "Ada".to_string(),
    last_name: "Reader".to_string(),
    delivery_address: "1 Library Lane".to_string(),
    invoice_address: "1 Library Lane".to_string(),
    payment_method: Some("card".to_string()),
    ..OrderRequest::default()
  }
}

/// Validates and commits `request` as a customer, returning the stored order.
pub async fn place(state: &AppState, request: &OrderRequest) -> Result<Order> {
  let priced = state
    .validator
    .validate(
      request.sales_channel_id.as_deref(),
      &request.products,
      IssuerRole::Customer,
      OrderStatuses::default(),
    )
    .await?;
  let order = priced.into_order(request, None);
  state.committer.commit(&order).await?;
  Ok(order)
}

pub fn paid_order(order_id: &str) -> Order {
  Order {
    id: order_id.to_string(),
    user_id: None,
    sales_channel_id: CHANNEL.to_string(),
    email: "reader@example.com".to_string(),
    first_name: "Ada".to_string(),
    last_name: "Reader".to_string(),
    delivery_address: "1 Library Lane".to_string(),
    invoice_address: "1 Library Lane".to_string(),
    payment_method: Some("card".to_string()),
    total_price_cents: 1000,
    payment_status: PaymentStatus::Paid,
    delivery_status: DeliveryStatus::Open,
    order_status: OrderStatus::InProgress,
    external_order_id: None,
    active: true,
    created_at: Utc::now(),
    items: vec![OrderLineItem {
      id: format!("{}-line-1", order_id),
      order_id: order_id.to_string(),
      product_id: "ebook-1".to_string(),
      quantity: 1,
      current_price_cents: 1000,
      download_url: None,
    }],
  }
}

/// A pending job for one e-book line, already holding a fulfillment handle.
pub fn digital_job(order_id: &str, retry_budget: u32) -> DeliveryJob {
  let mut order = paid_order(order_id);
  order.external_order_id = Some(format!("handle-{}", order_id));
  DeliveryJob {
    items: vec![JobItem {
      line_item_id: format!("{}-line-1", order_id),
      product_id: "ebook-1".to_string(),
      title: "Rust in Depth".to_string(),
      subtitle: "Rust in Depth (e-book)".to_string(),
      is_download_title: true,
      quantity: 1,
      price_cents: 1000,
      download_url: None,
    }],
    order,
    ebooks_count: 1,
    retry_budget,
  }
}

// --- Gateway doubles ---

#[derive(Debug, Clone, PartialEq)]
pub struct SentMail {
  pub template_id: String,
  pub recipient: String,
  pub data: Value,
}

/// Records every send; fails all of them while `failing` is set.
#[derive(Default)]
pub struct RecordingNotifier {
  pub sent: Mutex<Vec<SentMail>>,
  pub failing: AtomicBool,
}

impl RecordingNotifier {
  pub fn failing() -> Self {
    let notifier = Self::default();
    notifier.failing.store(true, Ordering::SeqCst);
    notifier
  }

  pub fn templates(&self) -> Vec<String> {
    self.sent.lock().iter().map(|m| m.template_id.clone()).collect()
  }
}

#[async_trait]
impl Notifier for RecordingNotifier {
  async fn send(&self, template_id: &str, recipient: &str, template_data: Value) -> Result<()> {
    self.sent.lock().push(SentMail {
      template_id: template_id.to_string(),
      recipient: recipient.to_string(),
      data: template_data,
    });
    if self.failing.load(Ordering::SeqCst) {
      return Err(AppError::NotificationFailed("mail api down".to_string()));
    }
    Ok(())
  }
}

/// Fulfillment gateway with scripted failures.
#[derive(Default)]
pub struct ScriptedFulfillment {
  pub fail_create: bool,
  /// Number of `resolve_downloads` calls that fail before links appear.
  pub resolve_failures: AtomicUsize,
  pub create_calls: AtomicUsize,
  pub resolve_calls: AtomicUsize,
}

impl ScriptedFulfillment {
  pub fn unavailable() -> Self {
    Self {
      fail_create: true,
      ..Self::default()
    }
  }

  pub fn failing_resolves(times: usize) -> Self {
    Self {
      resolve_failures: AtomicUsize::new(times),
      ..Self::default()
    }
  }
}

#[async_trait]
impl FulfillmentGateway for ScriptedFulfillment {
  async fn create_order(&self, product_ids: &[String]) -> Result<String> {
    self.create_calls.fetch_add(1, Ordering::SeqCst);
    if self.fail_create {
      return Err(AppError::GatewayUnavailable("connection refused".to_string()));
    }
    Ok(format!("handle-{}", product_ids.join("+")))
  }

  async fn resolve_downloads(&self, job: &mut DeliveryJob) -> Result<()> {
    self.resolve_calls.fetch_add(1, Ordering::SeqCst);
    let pending_failures = self.resolve_failures.load(Ordering::SeqCst);
    if pending_failures > 0 {
      self.resolve_failures.store(pending_failures - 1, Ordering::SeqCst);
      return Err(AppError::DeliveryAttemptFailed("links not ready".to_string()));
    }
    let links: HashMap<String, String> = job
      .digital_product_ids()
      .into_iter()
      .map(|id| {
        let url = format!("https://dl.test/{}", id);
        (id, url)
      })
      .collect();
    apply_links(job, &links)
  }
}

#[derive(Default)]
pub struct RecordingMirror {
  pub mirrored: Mutex<Vec<String>>,
  pub fail: bool,
}

#[async_trait]
impl OrderMirror for RecordingMirror {
  async fn mirror(&self, order: &Order) -> Result<()> {
    self.mirrored.lock().push(order.id.clone());
    if self.fail {
      return Err(AppError::MirrorFailed("ERP import returned 503".to_string()));
    }
    Ok(())
  }
}

/// Catalog view that can hide products after the fact, as if delisted or unreadable.
pub struct FaultyCatalog {
  inner: MemoryCatalog,
  hidden: Arc<Mutex<HashSet<String>>>,
}

#[async_trait]
impl CatalogStore for FaultyCatalog {
  async fn product(&self, product_id: &str) -> Result<Option<Product>> {
    if self.hidden.lock().contains(product_id) {
      return Ok(None);
    }
    self.inner.product(product_id).await
  }

  async fn channel_override(&self, product_id: &str, sales_channel_id: &str) -> Result<Option<ChannelOverride>> {
    self.inner.channel_override(product_id, sales_channel_id).await
  }

  async fn order(&self, order_id: &str) -> Result<Option<Order>> {
    self.inner.order(order_id).await
  }

  async fn begin(&self) -> Result<Box<dyn CatalogTx>> {
    self.inner.begin().await
  }

  async fn save_product(&self, product: &Product) -> Result<()> {
    self.inner.save_product(product).await
  }

  async fn set_payment_status(&self, order_id: &str, status: PaymentStatus) -> Result<()> {
    self.inner.set_payment_status(order_id, status).await
  }

  async fn set_external_order_id(&self, order_id: &str, external_order_id: &str) -> Result<()> {
    self.inner.set_external_order_id(order_id, external_order_id).await
  }

  async fn record_delivery(&self, order_id: &str, downloads: &[(String, String)]) -> Result<()> {
    self.inner.record_delivery(order_id, downloads).await
  }
}

/// Queue whose `enqueue` can be switched to fail, as on a full disk. Everything else passes
/// through to the wrapped queue.
pub struct FaultyQueue {
  inner: Arc<MemoryQueue>,
  fail_enqueue: Arc<AtomicBool>,
}

#[async_trait]
impl DeliveryQueue for FaultyQueue {
  async fn enqueue(&self, job: &DeliveryJob) -> Result<String> {
    if self.fail_enqueue.load(Ordering::SeqCst) {
      return Err(AppError::Queue(std::io::Error::new(std::io::ErrorKind::Other, "disk full")));
    }
    self.inner.enqueue(job).await
  }

  async fn list_pending(&self) -> Result<Vec<QueuedJob>> {
    self.inner.list_pending().await
  }

  async fn update(&self, key: &str, job: &DeliveryJob) -> Result<()> {
    self.inner.update(key, job).await
  }

  async fn move_to_dead_letter(&self, key: &str, job: &DeliveryJob, reason: &str) -> Result<()> {
    self.inner.move_to_dead_letter(key, job, reason).await
  }

  async fn bury(&self, job: &DeliveryJob, reason: &str) -> Result<String> {
    self.inner.bury(job, reason).await
  }

  async fn remove(&self, key: &str) -> Result<()> {
    self.inner.remove(key).await
  }

  async fn list_dead_letters(&self) -> Result<Vec<DeadLetter>> {
    self.inner.list_dead_letters().await
  }
}

/// An assembled application over in-memory stores and the given doubles.
pub struct Harness {
  pub state: AppState,
  pub catalog: MemoryCatalog,
  pub queue: Arc<MemoryQueue>,
  pub fulfillment: Arc<ScriptedFulfillment>,
  pub notifier: Arc<RecordingNotifier>,
  pub mirror: Arc<RecordingMirror>,
  hidden_products: Arc<Mutex<HashSet<String>>>,
  fail_enqueue: Arc<AtomicBool>,
  _queue_dir: tempfile::TempDir,
}

impl Harness {
  pub fn new(products: Vec<Product>) -> Self {
    Self::with_doubles(
      products,
      ScriptedFulfillment::default(),
      RecordingNotifier::default(),
      RecordingMirror::default(),
    )
  }

  pub fn with_doubles(
    products: Vec<Product>,
    fulfillment: ScriptedFulfillment,
    notifier: RecordingNotifier,
    mirror: RecordingMirror,
  ) -> Self {
    setup_tracing();
    let queue_dir = tempfile::tempdir().expect("temp dir");
    let catalog = MemoryCatalog::with_products(products);
    let queue = Arc::new(MemoryQueue::new());
    let fulfillment = Arc::new(fulfillment);
    let notifier = Arc::new(notifier);
    let mirror = Arc::new(mirror);
    let hidden_products = Arc::new(Mutex::new(HashSet::new()));
    let fail_enqueue = Arc::new(AtomicBool::new(false));

    let mut config = AppConfig::local(queue_dir.path());
    config.delivery_retry_budget = 3;

    let state = AppState::assemble(
      config,
      Backends {
        catalog: Arc::new(FaultyCatalog {
          inner: catalog.clone(),
          hidden: hidden_products.clone(),
        }),
        queue: Arc::new(FaultyQueue {
          inner: queue.clone(),
          fail_enqueue: fail_enqueue.clone(),
        }),
        fulfillment: fulfillment.clone(),
        notifier: notifier.clone(),
        mirror: mirror.clone(),
      },
    );

    Self {
      state,
      catalog,
      queue,
      fulfillment,
      notifier,
      mirror,
      hidden_products,
      fail_enqueue,
      _queue_dir: queue_dir,
    }
  }

  pub fn notices(&self) -> CustomerNotices {
    self.state.notices.clone()
  }

  /// From now on the application reads `product_id` as missing.
  pub fn hide_product(&self, product_id: &str) {
    self.hidden_products.lock().insert(product_id.to_string());
  }

  /// From now on every enqueue fails with an I/O error.
  pub fn fail_enqueues(&self) {
    self.fail_enqueue.store(true, Ordering::SeqCst);
  }
}
