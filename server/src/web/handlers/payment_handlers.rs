// shelf-server/src/web/handlers/payment_handlers.rs

use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument, warn};

use crate::errors::AppError;
use crate::models::PaymentStatus;
use crate::pipelines::contexts::ConfirmPaymentCtxData;
use crate::state::AppState;
use shelf_flow::{ContextData, PipelineResult};

#[derive(Deserialize, Debug)]
pub struct PaymentConfirmation {
  pub payment_status: PaymentStatus,
}

#[instrument(
  name = "handler::confirm_payment",
  skip(app_state, path, req_payload),
  fields(order_id = %path.as_str(), status = %req_payload.payment_status)
)]
pub async fn confirm_payment_handler(
  app_state: web::Data<AppState>,
  path: web::Path<String>,
  req_payload: web::Json<PaymentConfirmation>,
) -> Result<HttpResponse, AppError> {
  let ctx = ConfirmPaymentCtxData::new(
    app_state.get_ref().clone(),
    path.into_inner(),
    req_payload.payment_status,
  );
  let ctx_data = ContextData::new(ctx);

  match app_state.flows.run(ctx_data.clone()).await {
    Ok(PipelineResult::Completed) => {
      let guard = ctx_data.read();
      info!(delivery = ?guard.delivery, "Payment confirmation processed.");
      Ok(HttpResponse::Ok().json(json!({
        "order": guard.order,
        "delivery": guard.delivery,
      })))
    }
    Ok(PipelineResult::Stopped) => Err(AppError::Internal("payment processing was halted".to_string())),
    Err(app_err) => {
      warn!(error = %app_err, "Payment confirmation rejected.");
      Err(app_err)
    }
  }
}
