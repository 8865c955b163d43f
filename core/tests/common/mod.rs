// tests/common/mod.rs
#![allow(dead_code)]

use once_cell::sync::Lazy;
use shelf_flow::{ContextData, FlowError, PipelineControl};
use tracing::Level;

/// A toy checkout context: every handler appends to `trail` and moves `reserved` units.
#[derive(Clone, Debug, Default)]
pub struct CheckoutContext {
  pub reserved: i32,
  pub trail: Vec<String>,
  pub notes: String,
  pub halt_at: Option<String>,
  pub paid: bool,
}

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum TestError {
  #[error("engine error: {0}")]
  Flow(String),

  #[error("handler failed: {0}")]
  Handler(String),
}

impl From<FlowError> for TestError {
  fn from(err: FlowError) -> Self {
    TestError::Flow(format!("{:?}", err))
  }
}

/// Records `step_name`, reserves one unit and appends `note`; stops if `halt_at` matches.
pub fn recording_handler(step_name: &'static str, note: &'static str) -> shelf_flow::Handler<CheckoutContext, TestError> {
  Box::new(move |ctx: ContextData<CheckoutContext>| {
    Box::pin(async move {
      let mut guard = ctx.write();
      guard.reserved += 1;
      guard.notes.push_str(note);
      guard.trail.push(step_name.to_string());
      tracing::debug!(target: "test_handlers", step = step_name, reserved = guard.reserved, "handler ran");
      if guard.halt_at.as_deref() == Some(step_name) {
        return Ok(PipelineControl::Stop);
      }
      Ok(PipelineControl::Continue)
    })
  })
}

pub fn failing_handler(step_name: &'static str, message: &'static str) -> shelf_flow::Handler<CheckoutContext, TestError> {
  Box::new(move |ctx: ContextData<CheckoutContext>| {
    Box::pin(async move {
      ctx.write().trail.push(step_name.to_string());
      Err(TestError::Handler(message.to_string()))
    })
  })
}

static TRACING_INIT: Lazy<()> = Lazy::new(|| {
  tracing_subscriber::fmt()
    .with_max_level(Level::DEBUG)
    .with_test_writer()
    .try_init()
    .ok();
});

pub fn setup_tracing() {
  Lazy::force(&TRACING_INIT);
}
