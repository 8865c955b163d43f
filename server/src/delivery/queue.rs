// shelf-server/src/delivery/queue.rs

use crate::errors::Result;
use crate::models::{DeadLetter, DeliveryJob, QueuedJob};
use async_trait::async_trait;
use chrono::Utc;

/// Durable store of pending and dead-lettered delivery jobs.
///
/// Written by one actor at a time: the hand-off enqueues new keys, the single worker owns
/// every existing pending key.
#[async_trait]
pub trait DeliveryQueue: Send + Sync {
  /// Stores a new pending job and returns its key.
  async fn enqueue(&self, job: &DeliveryJob) -> Result<String>;

  /// All pending jobs, oldest first.
  async fn list_pending(&self) -> Result<Vec<QueuedJob>>;

  /// Overwrites a pending job in place.
  async fn update(&self, key: &str, job: &DeliveryJob) -> Result<()>;

  /// Moves a pending job to dead-letter. Afterwards it is never listed as pending.
  async fn move_to_dead_letter(&self, key: &str, job: &DeliveryJob, reason: &str) -> Result<()>;

  /// Writes a job that was never pending straight to dead-letter.
  async fn bury(&self, job: &DeliveryJob, reason: &str) -> Result<String>;

  async fn remove(&self, key: &str) -> Result<()>;

  async fn list_dead_letters(&self) -> Result<Vec<DeadLetter>>;
}

/// `<millis>-<uuid>`: sorts by creation time and never collides.
pub fn new_job_key() -> String {
  format!("{:013}-{}", Utc::now().timestamp_millis(), uuid::Uuid::new_v4().simple())
}
