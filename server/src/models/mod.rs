// shelf-server/src/models/mod.rs

//! Catalog, order and delivery-queue records.

pub mod delivery_job;
pub mod order;
pub mod product;

pub use delivery_job::{DeadLetter, DeliveryJob, JobItem, QueuedJob};
pub use order::{
  format_price, DeliveryStatus, IssuerRole, LineRequest, Order, OrderLineItem, OrderRequest, OrderStatus,
  OrderStatuses, PaymentStatus,
};
pub use product::{ChannelOverride, Product};
