// shelf-server/src/delivery/memory_queue.rs

use crate::delivery::queue::DeliveryQueue;
use crate::errors::{AppError, Result};
use crate::models::{DeadLetter, DeliveryJob, QueuedJob};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Non-durable [`DeliveryQueue`] for tests and throwaway runs.
#[derive(Default)]
pub struct MemoryQueue {
  seq: AtomicU64,
  pending: Mutex<BTreeMap<String, DeliveryJob>>,
  dead: Mutex<BTreeMap<String, DeadLetter>>,
}

impl MemoryQueue {
  pub fn new() -> Self {
    Self::default()
  }

  fn next_key(&self) -> String {
    format!("{:020}", self.seq.fetch_add(1, Ordering::Relaxed))
  }

  fn dead_letter(&self, key: String, job: &DeliveryJob, reason: &str) {
    let record = DeadLetter {
      key: key.clone(),
      reason: reason.to_string(),
      dead_lettered_at: Utc::now(),
      job: job.clone(),
    };
    self.dead.lock().insert(key, record);
  }
}

#[async_trait]
impl DeliveryQueue for MemoryQueue {
  async fn enqueue(&self, job: &DeliveryJob) -> Result<String> {
    let key = self.next_key();
    self.pending.lock().insert(key.clone(), job.clone());
    Ok(key)
  }

  async fn list_pending(&self) -> Result<Vec<QueuedJob>> {
    Ok(
      self
        .pending
        .lock()
        .iter()
        .map(|(key, job)| QueuedJob {
          key: key.clone(),
          job: job.clone(),
        })
        .collect(),
    )
  }

  async fn update(&self, key: &str, job: &DeliveryJob) -> Result<()> {
    match self.pending.lock().get_mut(key) {
      Some(slot) => {
        *slot = job.clone();
        Ok(())
      }
      None => Err(AppError::NotFound(format!("no pending delivery job {}", key))),
    }
  }

  async fn move_to_dead_letter(&self, key: &str, job: &DeliveryJob, reason: &str) -> Result<()> {
    self.dead_letter(key.to_string(), job, reason);
    self.pending.lock().remove(key);
    Ok(())
  }

  async fn bury(&self, job: &DeliveryJob, reason: &str) -> Result<String> {
    let key = self.next_key();
    self.dead_letter(key.clone(), job, reason);
    Ok(key)
  }

  async fn remove(&self, key: &str) -> Result<()> {
    self.pending.lock().remove(key);
    Ok(())
  }

  async fn list_dead_letters(&self) -> Result<Vec<DeadLetter>> {
    Ok(self.dead.lock().values().cloned().collect())
  }
}
