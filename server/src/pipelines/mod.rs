// shelf-server/src/pipelines/mod.rs

//! The order workflows, one pipeline per context type.

use crate::errors::AppError;
use crate::state::AppState;
use shelf_flow::Registry;

pub mod common_steps;
pub mod contexts;

pub mod order_pipeline;
pub mod payment_pipeline;

/// Called once while the application state is assembled.
pub fn register_all_pipelines(registry: &Registry<AppError>, app_state: &AppState) {
  tracing::info!("Registering order pipelines...");

  order_pipeline::register_place_order_pipeline(registry, app_state);
  payment_pipeline::register_confirm_payment_pipeline(registry, app_state);

  tracing::info!("All order pipelines registered.");
}
