// shelf-server/src/services/mod.rs

//! Order services and the outbound gateways they call.

pub mod erp_mirror;
pub mod fulfillment_gateway;
pub mod handoff;
pub mod notifier;
pub mod order_committer;
pub mod order_validator;

pub use erp_mirror::{HttpOrderMirror, LogOrderMirror, OrderMirror};
pub use fulfillment_gateway::{FulfillmentGateway, HttpFulfillmentGateway, MockFulfillmentGateway};
pub use handoff::{DeliveryOutcome, PaidOrderHandoff};
pub use notifier::{CustomerNotices, HttpNotifier, LogNotifier, NoticeOutcome, NotificationPolicy, Notifier};
pub use order_committer::OrderCommitter;
pub use order_validator::{OrderValidator, PricedOrder};
