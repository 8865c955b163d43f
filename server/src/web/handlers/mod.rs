// shelf-server/src/web/handlers/mod.rs

pub mod order_handlers;
pub mod payment_handlers;
