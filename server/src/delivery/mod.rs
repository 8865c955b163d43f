// shelf-server/src/delivery/mod.rs

//! Persistent delivery queue and the worker that drains it.

pub mod file_queue;
pub mod memory_queue;
pub mod queue;
pub mod worker;

pub use file_queue::FileQueue;
pub use memory_queue::MemoryQueue;
pub use queue::DeliveryQueue;
pub use worker::{DeliveryWorker, JobTransition, PollReport};
