// tests/delivery_tests.rs
mod common;

use async_trait::async_trait;
use common::*;
use parking_lot::Mutex;
use shelf_server::delivery::{DeliveryQueue, DeliveryWorker, FileQueue, PollReport};
use shelf_server::errors::{AppError, Result};
use shelf_server::models::{DeliveryJob, DeliveryStatus, PaymentStatus};
use shelf_server::services::{DeliveryOutcome, FulfillmentGateway, NoticeOutcome, NotificationPolicy};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const DELIVERED_TEMPLATE: &str = "order-delivered";
const FAILED_TEMPLATE: &str = "order-failed";

async fn place_paid(harness: &Harness, lines: Vec<shelf_server::models::LineRequest>) -> String {
  let order = place(&harness.state, &order_request(lines)).await.unwrap();
  harness
    .state
    .catalog
    .set_payment_status(&order.id, PaymentStatus::Paid)
    .await
    .unwrap();
  order.id
}

#[tokio::test]
async fn physical_order_is_mirrored_without_delivery_job() {
  let harness = Harness::new(vec![paperback("a", "Product A", 500, 10)]);
  let order_id = place_paid(&harness, vec![line("a", 2)]).await;

  let outcome = harness.state.handoff.run(&order_id).await.unwrap();

  assert_eq!(outcome, DeliveryOutcome::None);
  assert_eq!(*harness.mirror.mirrored.lock(), vec![order_id]);
  assert_eq!(harness.fulfillment.create_calls.load(Ordering::SeqCst), 0);
  assert!(harness.queue.list_pending().await.unwrap().is_empty());
}

#[tokio::test]
async fn digital_order_is_enqueued_with_handle() {
  let harness = Harness::new(vec![ebook("b", "Product B", 1000, 10), paperback("a", "Product A", 500, 10)]);
  let order_id = place_paid(&harness, vec![line("b", 1), line("a", 1)]).await;

  let outcome = harness.state.handoff.run(&order_id).await.unwrap();
  assert_eq!(outcome, DeliveryOutcome::Enqueued);

  let pending = harness.queue.list_pending().await.unwrap();
  assert_eq!(pending.len(), 1);
  let job = &pending[0].job;
  assert_eq!(job.ebooks_count, 1);
  assert_eq!(job.retry_budget, 3);
  assert_eq!(job.order.external_order_id.as_deref(), Some("handle-b"));
  assert_eq!(job.items.len(), 2);

  let stored = harness.state.catalog.order(&order_id).await.unwrap().unwrap();
  assert_eq!(stored.external_order_id.as_deref(), Some("handle-b"));
}

#[tokio::test]
async fn erp_failure_does_not_block_handoff() {
  let harness = Harness::with_doubles(
    vec![ebook("b", "Product B", 1000, 10)],
    ScriptedFulfillment::default(),
    RecordingNotifier::default(),
    RecordingMirror {
      fail: true,
      ..RecordingMirror::default()
    },
  );
  let order_id = place_paid(&harness, vec![line("b", 1)]).await;

  let outcome = harness.state.handoff.run(&order_id).await.unwrap();
  assert_eq!(outcome, DeliveryOutcome::Enqueued);
  assert_eq!(harness.mirror.mirrored.lock().len(), 1);
}

#[tokio::test]
async fn gateway_failure_dead_letters_without_retry() {
  let harness = Harness::with_doubles(
    vec![ebook("b", "Product B", 1000, 10)],
    ScriptedFulfillment::unavailable(),
    RecordingNotifier::default(),
    RecordingMirror::default(),
  );
  let order_id = place_paid(&harness, vec![line("b", 1)]).await;

  let outcome = harness.state.handoff.run(&order_id).await.unwrap();

  assert_eq!(outcome, DeliveryOutcome::DeadLettered);
  assert!(harness.queue.list_pending().await.unwrap().is_empty());
  let dead = harness.queue.list_dead_letters().await.unwrap();
  assert_eq!(dead.len(), 1);
  assert_eq!(dead[0].job.order.id, order_id);
  assert!(dead[0].reason.contains("connection refused"));
  assert_eq!(harness.notifier.templates(), vec![FAILED_TEMPLATE.to_string()]);
  assert_eq!(harness.fulfillment.create_calls.load(Ordering::SeqCst), 1);

  // Nothing pending means the worker never touches it.
  let report = harness.state.delivery_worker().poll_once().await.unwrap();
  assert!(report.is_idle());
  assert_eq!(harness.fulfillment.resolve_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn successful_delivery_notifies_records_and_removes() {
  let harness = Harness::new(vec![ebook("b", "Product B", 1000, 10)]);
  let order_id = place_paid(&harness, vec![line("b", 1)]).await;
  harness.state.handoff.run(&order_id).await.unwrap();

  let report = harness.state.delivery_worker().poll_once().await.unwrap();

  assert_eq!(
    report,
    PollReport {
      delivered: 1,
      ..PollReport::default()
    }
  );
  assert!(harness.queue.list_pending().await.unwrap().is_empty());
  assert!(harness.queue.list_dead_letters().await.unwrap().is_empty());

  let sent = harness.notifier.sent.lock().clone();
  assert_eq!(sent.len(), 1);
  assert_eq!(sent[0].template_id, DELIVERED_TEMPLATE);
  assert_eq!(sent[0].recipient, "reader@example.com");
  assert_eq!(sent[0].data["order"][0]["ebook_url"], "https://dl.test/b");
  assert_eq!(sent[0].data["order"][0]["price"], "10.00€");
  assert_eq!(sent[0].data["total_price"], "10.00€");

  let stored = harness.state.catalog.order(&order_id).await.unwrap().unwrap();
  assert_eq!(stored.delivery_status, DeliveryStatus::Delivered);
  assert_eq!(stored.items[0].download_url.as_deref(), Some("https://dl.test/b"));
}

#[tokio::test]
async fn failed_attempts_only_ever_lower_the_budget() {
  let harness = Harness::with_doubles(
    vec![],
    ScriptedFulfillment::failing_resolves(10),
    RecordingNotifier::default(),
    RecordingMirror::default(),
  );
  harness.queue.enqueue(&digital_job("o-1", 3)).await.unwrap();
  let worker = harness.state.delivery_worker();

  let mut budgets = Vec::new();
  for _ in 0..3 {
    let report = worker.poll_once().await.unwrap();
    assert_eq!(report.retrying, 1);
    let pending = harness.queue.list_pending().await.unwrap();
    budgets.push(pending[0].job.retry_budget);
  }
  assert_eq!(budgets, vec![2, 1, 0]);
  assert!(harness.notifier.templates().is_empty());
}

/// Gateway that reads the durable queue while an attempt is in flight, then fails it.
struct BudgetCheckingFulfillment {
  queue: Arc<FileQueue>,
  seen_budgets: Mutex<Vec<u32>>,
}

#[async_trait]
impl FulfillmentGateway for BudgetCheckingFulfillment {
  async fn create_order(&self, product_ids: &[String]) -> Result<String> {
    Ok(format!("handle-{}", product_ids.join("+")))
  }

  async fn resolve_downloads(&self, _job: &mut DeliveryJob) -> Result<()> {
    let pending = self.queue.list_pending().await?;
    self
      .seen_budgets
      .lock()
      .extend(pending.iter().map(|queued| queued.job.retry_budget));
    Err(AppError::DeliveryAttemptFailed("links not ready".to_string()))
  }
}

#[tokio::test]
async fn reduced_budget_is_on_disk_before_the_gateway_call() {
  setup_tracing();
  let harness = Harness::new(vec![]);
  let dir = tempfile::tempdir().unwrap();
  let queue = Arc::new(FileQueue::open(dir.path()).await.unwrap());
  queue.enqueue(&digital_job("o-x", 3)).await.unwrap();

  let gateway = Arc::new(BudgetCheckingFulfillment {
    queue: queue.clone(),
    seen_budgets: Mutex::new(Vec::new()),
  });
  let worker = DeliveryWorker::new(
    queue.clone(),
    gateway.clone(),
    harness.notices(),
    Arc::new(harness.catalog.clone()),
    Duration::from_millis(10),
  );

  let report = worker.poll_once().await.unwrap();
  assert_eq!(report.retrying, 1);
  assert_eq!(*gateway.seen_budgets.lock(), vec![2]);

  // A restart picks the job up with the reduced budget.
  drop(worker);
  drop(gateway);
  drop(queue);
  let reopened = FileQueue::open(dir.path()).await.unwrap();
  let pending = reopened.list_pending().await.unwrap();
  assert_eq!(pending.len(), 1);
  assert_eq!(pending[0].job.order.id, "o-x");
  assert_eq!(pending[0].job.retry_budget, 2);
}

#[tokio::test]
async fn exhausted_budget_dead_letters_on_next_poll() {
  let harness = Harness::with_doubles(
    vec![],
    ScriptedFulfillment::failing_resolves(10),
    RecordingNotifier::default(),
    RecordingMirror::default(),
  );
  harness.queue.enqueue(&digital_job("o-2", 1)).await.unwrap();
  let worker = harness.state.delivery_worker();

  let first = worker.poll_once().await.unwrap();
  assert_eq!(first.retrying, 1);
  let pending = harness.queue.list_pending().await.unwrap();
  assert_eq!(pending.len(), 1);
  assert_eq!(pending[0].job.retry_budget, 0);

  let second = worker.poll_once().await.unwrap();
  assert_eq!(second.dead_lettered, 1);
  assert!(harness.queue.list_pending().await.unwrap().is_empty());
  assert_eq!(harness.notifier.templates(), vec![FAILED_TEMPLATE.to_string()]);
  // The exhausted job is not attempted again.
  assert_eq!(harness.fulfillment.resolve_calls.load(Ordering::SeqCst), 1);

  // Terminal: later polls never bring it back.
  let third = worker.poll_once().await.unwrap();
  assert!(third.is_idle());
  let dead = harness.queue.list_dead_letters().await.unwrap();
  assert_eq!(dead.len(), 1);
  assert_eq!(dead[0].job.order.id, "o-2");
  assert!(dead[0].reason.contains("o-2"));
}

#[tokio::test]
async fn retry_then_success_delivers() {
  let harness = Harness::with_doubles(
    vec![],
    ScriptedFulfillment::failing_resolves(2),
    RecordingNotifier::default(),
    RecordingMirror::default(),
  );
  harness.queue.enqueue(&digital_job("o-3", 3)).await.unwrap();
  let worker = harness.state.delivery_worker();

  assert_eq!(worker.poll_once().await.unwrap().retrying, 1);
  assert_eq!(worker.poll_once().await.unwrap().retrying, 1);
  assert_eq!(worker.poll_once().await.unwrap().delivered, 1);
  assert!(harness.queue.list_pending().await.unwrap().is_empty());
  assert_eq!(harness.notifier.templates(), vec![DELIVERED_TEMPLATE.to_string()]);
}

#[tokio::test]
async fn notification_failure_still_completes_the_job() {
  let harness = Harness::with_doubles(
    vec![],
    ScriptedFulfillment::default(),
    RecordingNotifier::failing(),
    RecordingMirror::default(),
  );
  assert_eq!(harness.notices().policy(), NotificationPolicy::BestEffort);
  harness.queue.enqueue(&digital_job("o-4", 2)).await.unwrap();

  let report = harness.state.delivery_worker().poll_once().await.unwrap();

  assert_eq!(report.delivered, 1);
  assert!(harness.queue.list_pending().await.unwrap().is_empty());
  assert!(harness.queue.list_dead_letters().await.unwrap().is_empty());
  assert_eq!(harness.notifier.sent.lock().len(), 1);
}

#[tokio::test]
async fn swallowed_notices_are_reported() {
  let harness = Harness::with_doubles(
    vec![],
    ScriptedFulfillment::default(),
    RecordingNotifier::failing(),
    RecordingMirror::default(),
  );
  let outcome = harness.notices().failed(&paid_order("o-5")).await;
  assert_eq!(outcome, NoticeOutcome::Swallowed);

  let ok = Harness::new(vec![]);
  assert_eq!(ok.notices().failed(&paid_order("o-6")).await, NoticeOutcome::Sent);
}

#[tokio::test]
async fn worker_loop_drains_queue_until_cancelled() {
  let harness = Harness::new(vec![]);
  harness.queue.enqueue(&digital_job("o-7", 2)).await.unwrap();
  harness.queue.enqueue(&digital_job("o-8", 2)).await.unwrap();

  let worker = DeliveryWorker::new(
    harness.queue.clone(),
    harness.fulfillment.clone(),
    harness.notices(),
    Arc::new(harness.catalog.clone()),
    Duration::from_millis(10),
  );
  let shutdown = CancellationToken::new();
  let handle = tokio::spawn(worker.run(shutdown.clone()));

  let drained = tokio::time::timeout(Duration::from_secs(5), async {
    while !harness.queue.list_pending().await.unwrap().is_empty() {
      tokio::time::sleep(Duration::from_millis(5)).await;
    }
  })
  .await;
  assert!(drained.is_ok(), "worker did not drain the queue");

  shutdown.cancel();
  tokio::time::timeout(Duration::from_secs(5), handle)
    .await
    .expect("worker did not stop")
    .unwrap();
  assert_eq!(harness.notifier.templates().len(), 2);
}
