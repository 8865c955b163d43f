// shelf-server/src/pipelines/payment_pipeline.rs
use crate::errors::AppError;
use crate::models::PaymentStatus;
use crate::pipelines::common_steps::{hand_off_paid_order_step, order_not_paid};
use crate::pipelines::contexts::ConfirmPaymentCtxData;
use crate::state::AppState;
use shelf_flow::{ContextData, Pipeline, PipelineControl, Registry, SkipCondition};
use std::sync::Arc;
use tracing::{info, instrument};

#[instrument(name = "pipelines::register_confirm_payment", skip_all)]
pub fn register_confirm_payment_pipeline(registry: &Registry<AppError>, _app_state: &AppState) {
  let skip_unpaid: SkipCondition<ConfirmPaymentCtxData> = Arc::new(order_not_paid::<ConfirmPaymentCtxData>);
  let mut p = Pipeline::<ConfirmPaymentCtxData, AppError>::new(&[
    ("apply_payment_status", false, None),
    ("hand_off_paid_order", true, Some(skip_unpaid)),
  ]);

  // pending -> paid | failed, exactly once per order.
  p.on("apply_payment_status", |ctx_data: ContextData<ConfirmPaymentCtxData>| {
    Box::pin(async move {
      let (state, order_id, requested) = {
        let guard = ctx_data.read();
        (guard.app_state.clone(), guard.order_id.clone(), guard.requested)
      };

      if requested == PaymentStatus::Pending {
        return Err(AppError::InvalidTransition(
          "payment status can only be confirmed as paid or failed".to_string(),
        ));
      }

      let _locked = state.locks.orders.acquire([order_id.as_str()]).await;
      let mut order = state
        .catalog
        .order(&order_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("order {} doesn't exist", order_id)))?;

      if order.payment_status != PaymentStatus::Pending {
        return Err(AppError::InvalidTransition(format!(
          "payment status of order {} is already {}",
          order_id, order.payment_status
        )));
      }

      state.catalog.set_payment_status(&order_id, requested).await?;
      order.payment_status = requested;
      info!(%order_id, status = %requested, "Payment status applied.");

      ctx_data.write().order = Some(order);
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });

  p.on("hand_off_paid_order", hand_off_paid_order_step::<ConfirmPaymentCtxData>);

  registry.register_pipeline(p);
}
