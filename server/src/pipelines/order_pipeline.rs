// shelf-server/src/pipelines/order_pipeline.rs
use crate::errors::AppError;
use crate::pipelines::common_steps::{hand_off_paid_order_step, order_not_paid};
use crate::pipelines::contexts::PlaceOrderCtxData;
use crate::state::AppState;
use shelf_flow::{ContextData, Pipeline, PipelineControl, Registry, SkipCondition};
use std::sync::Arc;
use tracing::{info, instrument};

#[instrument(name = "pipelines::register_place_order", skip_all)]
pub fn register_place_order_pipeline(registry: &Registry<AppError>, _app_state: &AppState) {
  let skip_unpaid: SkipCondition<PlaceOrderCtxData> = Arc::new(order_not_paid::<PlaceOrderCtxData>);
  let mut p = Pipeline::<PlaceOrderCtxData, AppError>::new(&[
    ("validate_order", false, None),
    ("commit_order", false, None),
    // Only admins can create an order already paid.
    ("hand_off_paid_order", true, Some(skip_unpaid)),
  ]);

  // Step 1: price every line against live stock. Nothing is written.
  p.on("validate_order", |ctx_data: ContextData<PlaceOrderCtxData>| {
    Box::pin(async move {
      let (state, request, issuer) = {
        let guard = ctx_data.read();
        (guard.app_state.clone(), guard.request.clone(), guard.issuer)
      };

      let priced = state
        .validator
        .validate(
          request.sales_channel_id.as_deref(),
          &request.products,
          issuer,
          request.requested_statuses(),
        )
        .await?;

      info!(
        total_price_cents = priced.total_price_cents,
        all_digital = priced.all_digital,
        "Order validated."
      );
      ctx_data.write().priced = Some(priced);
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });

  // Step 2: stock decrement and order insert in one transaction.
  p.on("commit_order", |ctx_data: ContextData<PlaceOrderCtxData>| {
    Box::pin(async move {
      let (state, priced, request, user_id) = {
        let guard = ctx_data.read();
        (
          guard.app_state.clone(),
          guard.priced.clone(),
          guard.request.clone(),
          guard.user_id.clone(),
        )
      };
      let priced = priced.ok_or_else(|| AppError::Internal("order reached commit without pricing".to_string()))?;

      let order = priced.into_order(&request, user_id);
      state.committer.commit(&order).await?;

      ctx_data.write().order = Some(order);
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });

  // Step 3
  p.on("hand_off_paid_order", hand_off_paid_order_step::<PlaceOrderCtxData>);

  registry.register_pipeline(p);
}
