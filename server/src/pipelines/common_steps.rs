// shelf-server/src/pipelines/common_steps.rs
use crate::errors::Result as AppResult;
use crate::models::PaymentStatus;
use crate::pipelines::contexts::PaidOrderCtx;
use crate::services::DeliveryOutcome;
use shelf_flow::{ContextData, PipelineControl};
use tracing::{error, instrument};

/// Skip condition for the hand-off step.
pub fn order_not_paid<T: PaidOrderCtx>(ctx_data: ContextData<T>) -> bool {
  ctx_data.with(|ctx| {
    ctx
      .order()
      .map_or(true, |order| order.payment_status != PaymentStatus::Paid)
  })
}

/// Runs the paid-order hand-off. Its errors are logged and reported as
/// `DeliveryOutcome::Failed`; the committed order is never undone because of them.
#[instrument(name = "common_step::hand_off_paid_order", skip(ctx_data))]
pub async fn hand_off_paid_order_step<T: PaidOrderCtx>(ctx_data: ContextData<T>) -> AppResult<PipelineControl> {
  let (state, order_id) = {
    let guard = ctx_data.read();
    (guard.app_state().clone(), guard.order().map(|o| o.id.clone()))
  };
  let Some(order_id) = order_id else {
    return Ok(PipelineControl::Continue);
  };

  let outcome = match state.handoff.run(&order_id).await {
    Ok(outcome) => outcome,
    Err(e) => {
      error!(%order_id, error = %e, "Paid-order hand-off failed; order stays committed.");
      DeliveryOutcome::Failed
    }
  };
  ctx_data.write().set_delivery(outcome);
  Ok(PipelineControl::Continue)
}
