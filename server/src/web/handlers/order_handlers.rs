// shelf-server/src/web/handlers/order_handlers.rs

use actix_web::{web, FromRequest, HttpRequest, HttpResponse};
use serde_json::json;
use tracing::{info, instrument, warn};

use crate::catalog;
use crate::errors::AppError;
use crate::models::{IssuerRole, OrderRequest};
use crate::pipelines::contexts::PlaceOrderCtxData;
use crate::state::AppState;
use shelf_flow::{ContextData, PipelineResult};

// --- Issuer extractor ---
// Identity is established upstream; this service trusts the role and user headers it is given.
#[derive(Debug, Clone)]
pub struct Issuer {
  pub role: IssuerRole,
  pub user_id: Option<String>,
}

impl FromRequest for Issuer {
  type Error = AppError;
  type Future = futures_util::future::Ready<Result<Self, Self::Error>>;

  fn from_request(req: &HttpRequest, _payload: &mut actix_web::dev::Payload) -> Self::Future {
    let header = |name: &str| {
      req
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
    };

    let role = match header("X-Issuer-Role") {
      None => IssuerRole::Customer,
      Some(raw) => match raw.parse::<IssuerRole>() {
        Ok(role) => role,
        Err(e) => {
          warn!(error = %e, "Issuer extractor: rejected X-Issuer-Role header.");
          return futures_util::future::ready(Err(AppError::Unauthorized(e)));
        }
      },
    };

    futures_util::future::ready(Ok(Issuer {
      role,
      user_id: header("X-User-ID"),
    }))
  }
}

#[instrument(
  name = "handler::place_order",
  skip(app_state, issuer, req_payload),
  fields(role = ?issuer.role, lines = req_payload.products.len())
)]
pub async fn place_order_handler(
  app_state: web::Data<AppState>,
  issuer: Issuer,
  req_payload: web::Json<OrderRequest>,
) -> Result<HttpResponse, AppError> {
  let ctx = PlaceOrderCtxData::new(
    app_state.get_ref().clone(),
    issuer.role,
    issuer.user_id,
    req_payload.into_inner(),
  );
  let ctx_data = ContextData::new(ctx);

  match app_state.flows.run(ctx_data.clone()).await {
    Ok(PipelineResult::Completed) => {
      let guard = ctx_data.read();
      let order = guard
        .order
        .as_ref()
        .ok_or_else(|| AppError::Internal("order pipeline completed without an order".to_string()))?;
      info!(order_id = %order.id, delivery = ?guard.delivery, "Order placed.");
      Ok(HttpResponse::Created().json(json!({
        "order": order,
        "delivery": guard.delivery,
      })))
    }
    Ok(PipelineResult::Stopped) => {
      warn!("Order pipeline was stopped by a handler.");
      Err(AppError::Internal("order processing was halted".to_string()))
    }
    Err(app_err) => {
      warn!(error = %app_err, "Order rejected.");
      Err(app_err)
    }
  }
}

/// The order with locked prices; titles are shown as the order's sales channel presents them.
#[instrument(name = "handler::get_order", skip(app_state))]
pub async fn get_order_handler(
  app_state: web::Data<AppState>,
  path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
  let order_id = path.into_inner();
  let order = app_state
    .catalog
    .order(&order_id)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("order {} doesn't exist", order_id)))?;

  let mut items = Vec::with_capacity(order.items.len());
  for item in &order.items {
    let title = match app_state.catalog.product(&item.product_id).await? {
      Some(product) => catalog::display_title(app_state.catalog.as_ref(), &product, &order.sales_channel_id).await?,
      None => String::new(),
    };
    let mut view = serde_json::to_value(item)?;
    view["title"] = json!(title);
    items.push(view);
  }

  let mut body = serde_json::to_value(&order)?;
  body["items"] = json!(items);
  Ok(HttpResponse::Ok().json(body))
}
