// shelf-server/src/delivery/file_queue.rs

//! Directory-backed [`DeliveryQueue`].
//!
//! ```text
//! <root>/pending/<key>.json       DeliveryJob
//! <root>/dead-letter/<key>.json   DeadLetter
//! ```
//!
//! Every write goes to a dot-prefixed temp file first and is renamed into place, so a reader
//! never sees a half-written record. Moving to dead-letter writes the dead-letter record before
//! deleting the pending one; a crash in between leaves both, and the next listing drops the
//! pending copy.

use crate::delivery::queue::{new_job_key, DeliveryQueue};
use crate::errors::{AppError, Result};
use crate::models::{DeadLetter, DeliveryJob, QueuedJob};
use async_trait::async_trait;
use chrono::Utc;
use serde::de::DeserializeOwned;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, instrument, warn};

const PENDING_DIR: &str = "pending";
const DEAD_LETTER_DIR: &str = "dead-letter";
const RECORD_EXT: &str = "json";

pub struct FileQueue {
  pending_dir: PathBuf,
  dead_letter_dir: PathBuf,
}

impl FileQueue {
  /// Creates both directories if needed and clears temp files left by an interrupted write.
  #[instrument(name = "file_queue::open", skip(root), fields(root = %root.as_ref().display()))]
  pub async fn open(root: impl AsRef<Path>) -> Result<Self> {
    let root = root.as_ref();
    let queue = Self {
      pending_dir: root.join(PENDING_DIR),
      dead_letter_dir: root.join(DEAD_LETTER_DIR),
    };
    for dir in [&queue.pending_dir, &queue.dead_letter_dir] {
      fs::create_dir_all(dir).await?;
      remove_stale_temp_files(dir).await?;
    }
    info!("Delivery queue opened.");
    Ok(queue)
  }

  pub fn pending_dir(&self) -> &Path {
    &self.pending_dir
  }

  pub fn dead_letter_dir(&self) -> &Path {
    &self.dead_letter_dir
  }

  fn record_path(dir: &Path, key: &str) -> PathBuf {
    dir.join(format!("{}.{}", key, RECORD_EXT))
  }
}

/// Keys are generated here, but they also end up in file names: refuse anything path-like.
fn check_key(key: &str) -> Result<()> {
  let valid = !key.is_empty() && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
  if valid {
    Ok(())
  } else {
    Err(AppError::InvalidInput(format!("invalid delivery job key '{}'", key)))
  }
}

async fn write_atomically(dir: &Path, key: &str, bytes: Vec<u8>) -> Result<()> {
  check_key(key)?;
  let tmp = dir.join(format!(".{}.tmp", key));
  fs::write(&tmp, bytes).await?;
  fs::rename(&tmp, FileQueue::record_path(dir, key)).await?;
  Ok(())
}

async fn remove_if_present(path: &Path) -> Result<()> {
  match fs::remove_file(path).await {
    Ok(()) => Ok(()),
    Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
    Err(e) => Err(e.into()),
  }
}

async fn remove_stale_temp_files(dir: &Path) -> Result<()> {
  let mut entries = fs::read_dir(dir).await?;
  while let Some(entry) = entries.next_entry().await? {
    let name = entry.file_name().to_string_lossy().into_owned();
    if name.starts_with('.') && name.ends_with(".tmp") {
      warn!(file = %name, "Removing temp file from interrupted queue write.");
      remove_if_present(&entry.path()).await?;
    }
  }
  Ok(())
}

/// Record keys in `dir`, sorted.
async fn record_keys(dir: &Path) -> Result<Vec<String>> {
  let mut keys = Vec::new();
  let mut entries = fs::read_dir(dir).await?;
  while let Some(entry) = entries.next_entry().await? {
    let path = entry.path();
    if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXT) {
      continue;
    }
    if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
      if !stem.starts_with('.') {
        keys.push(stem.to_string());
      }
    }
  }
  keys.sort();
  Ok(keys)
}

/// `None` when the record can't be read or parsed; the caller skips it.
async fn read_record<T: DeserializeOwned>(path: &Path) -> Option<T> {
  let raw = match fs::read(path).await {
    Ok(raw) => raw,
    Err(e) => {
      warn!(path = %path.display(), error = %e, "Failed to read queue record.");
      return None;
    }
  };
  match serde_json::from_slice(&raw) {
    Ok(record) => Some(record),
    Err(e) => {
      warn!(path = %path.display(), error = %e, "Skipping unparseable queue record.");
      None
    }
  }
}

#[async_trait]
impl DeliveryQueue for FileQueue {
  #[instrument(name = "file_queue::enqueue", skip(self, job), fields(order_id = %job.order.id))]
  async fn enqueue(&self, job: &DeliveryJob) -> Result<String> {
    let key = new_job_key();
    write_atomically(&self.pending_dir, &key, serde_json::to_vec_pretty(job)?).await?;
    debug!(job_key = %key, "Delivery job enqueued.");
    Ok(key)
  }

  async fn list_pending(&self) -> Result<Vec<QueuedJob>> {
    let mut jobs = Vec::new();
    for key in record_keys(&self.pending_dir).await? {
      let pending_path = Self::record_path(&self.pending_dir, &key);
      if fs::try_exists(Self::record_path(&self.dead_letter_dir, &key)).await? {
        warn!(job_key = %key, "Pending job already dead-lettered; finishing the interrupted move.");
        remove_if_present(&pending_path).await?;
        continue;
      }
      if let Some(job) = read_record::<DeliveryJob>(&pending_path).await {
        jobs.push(QueuedJob { key, job });
      }
    }
    Ok(jobs)
  }

  async fn update(&self, key: &str, job: &DeliveryJob) -> Result<()> {
    write_atomically(&self.pending_dir, key, serde_json::to_vec_pretty(job)?).await
  }

  #[instrument(name = "file_queue::move_to_dead_letter", skip(self, job), fields(order_id = %job.order.id))]
  async fn move_to_dead_letter(&self, key: &str, job: &DeliveryJob, reason: &str) -> Result<()> {
    let record = DeadLetter {
      key: key.to_string(),
      reason: reason.to_string(),
      dead_lettered_at: Utc::now(),
      job: job.clone(),
    };
    write_atomically(&self.dead_letter_dir, key, serde_json::to_vec_pretty(&record)?).await?;
    remove_if_present(&Self::record_path(&self.pending_dir, key)).await
  }

  #[instrument(name = "file_queue::bury", skip(self, job), fields(order_id = %job.order.id))]
  async fn bury(&self, job: &DeliveryJob, reason: &str) -> Result<String> {
    let key = new_job_key();
    let record = DeadLetter {
      key: key.clone(),
      reason: reason.to_string(),
      dead_lettered_at: Utc::now(),
      job: job.clone(),
    };
    write_atomically(&self.dead_letter_dir, &key, serde_json::to_vec_pretty(&record)?).await?;
    Ok(key)
  }

  async fn remove(&self, key: &str) -> Result<()> {
    check_key(key)?;
    remove_if_present(&Self::record_path(&self.pending_dir, key)).await
  }

  async fn list_dead_letters(&self) -> Result<Vec<DeadLetter>> {
    let mut records = Vec::new();
    for key in record_keys(&self.dead_letter_dir).await? {
      if let Some(record) = read_record::<DeadLetter>(&Self::record_path(&self.dead_letter_dir, &key)).await {
        records.push(record);
      }
    }
    Ok(records)
  }
}
