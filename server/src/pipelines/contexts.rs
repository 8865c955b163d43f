// shelf-server/src/pipelines/contexts.rs

//! Context data of the order pipelines. Handlers receive these wrapped in `ContextData`.

use crate::models::{IssuerRole, Order, OrderRequest, PaymentStatus};
use crate::services::{DeliveryOutcome, PricedOrder};
use crate::state::AppState;

/// Order submission: validate, commit, hand off if created paid.
#[derive(Clone)]
pub struct PlaceOrderCtxData {
  pub app_state: AppState,
  pub issuer: IssuerRole,
  /// `None` for guest checkouts.
  pub user_id: Option<String>,
  pub request: OrderRequest,
  pub priced: Option<PricedOrder>,
  pub order: Option<Order>,
  pub delivery: DeliveryOutcome,
}

impl PlaceOrderCtxData {
  pub fn new(app_state: AppState, issuer: IssuerRole, user_id: Option<String>, request: OrderRequest) -> Self {
    Self {
      app_state,
      issuer,
      user_id,
      request,
      priced: None,
      order: None,
      delivery: DeliveryOutcome::None,
    }
  }
}

/// Payment callback for an existing order.
#[derive(Clone)]
pub struct ConfirmPaymentCtxData {
  pub app_state: AppState,
  pub order_id: String,
  pub requested: PaymentStatus,
  pub order: Option<Order>,
  pub delivery: DeliveryOutcome,
}

impl ConfirmPaymentCtxData {
  pub fn new(app_state: AppState, order_id: String, requested: PaymentStatus) -> Self {
    Self {
      app_state,
      order_id,
      requested,
      order: None,
      delivery: DeliveryOutcome::None,
    }
  }
}

/// Contexts that end with the paid-order hand-off step.
pub trait PaidOrderCtx: Send + Sync + 'static {
  fn app_state(&self) -> &AppState;
  fn order(&self) -> Option<&Order>;
  fn set_delivery(&mut self, outcome: DeliveryOutcome);
}

impl PaidOrderCtx for PlaceOrderCtxData {
  fn app_state(&self) -> &AppState {
    &self.app_state
  }

  fn order(&self) -> Option<&Order> {
    self.order.as_ref()
  }

  fn set_delivery(&mut self, outcome: DeliveryOutcome) {
    self.delivery = outcome;
  }
}

impl PaidOrderCtx for ConfirmPaymentCtxData {
  fn app_state(&self) -> &AppState {
    &self.app_state
  }

  fn order(&self) -> Option<&Order> {
    self.order.as_ref()
  }

  fn set_delivery(&mut self, outcome: DeliveryOutcome) {
    self.delivery = outcome;
  }
}

// `AppState` holds trait objects without `Debug`, so it is left out of the output.
impl std::fmt::Debug for PlaceOrderCtxData {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("PlaceOrderCtxData")
      .field("issuer", &self.issuer)
      .field("user_id", &self.user_id)
      .field("request", &self.request)
      .field("priced", &self.priced)
      .field("order", &self.order)
      .field("delivery", &self.delivery)
      .finish_non_exhaustive()
  }
}

impl std::fmt::Debug for ConfirmPaymentCtxData {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ConfirmPaymentCtxData")
      .field("order_id", &self.order_id)
      .field("requested", &self.requested)
      .field("order", &self.order)
      .field("delivery", &self.delivery)
      .finish_non_exhaustive()
  }
}
