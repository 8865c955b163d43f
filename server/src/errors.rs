// shelf-server/src/errors.rs

use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use shelf_flow::FlowError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
  // --- Rejected before any storage is touched ---
  #[error("{0}")]
  InvalidInput(String),

  // --- Rejected during validation, no side effects ---
  #[error("{0}")]
  NotFound(String),

  #[error("{0}")]
  Inactive(String),

  #[error("{0}")]
  OutOfStock(String),

  #[error("{0}")]
  InsufficientStock(String),

  /// Stock re-check at commit time failed; the transaction was rolled back.
  #[error("{0}")]
  CommitConflict(String),

  // --- Asynchronous delivery path ---
  #[error("Fulfillment gateway unavailable: {0}")]
  GatewayUnavailable(String),

  #[error("Delivery attempt failed: {0}")]
  DeliveryAttemptFailed(String),

  #[error("Retry budget exhausted for order {0}")]
  RetryExhausted(String),

  #[error("Notification failed: {0}")]
  NotificationFailed(String),

  /// The ERP rejected the import or could not be reached.
  #[error("ERP mirror failed: {0}")]
  MirrorFailed(String),

  // --- Plumbing ---
  #[error("{0}")]
  InvalidTransition(String),

  #[error("Unauthorized: {0}")]
  Unauthorized(String),

  #[error("Delivery queue error: {0}")]
  Queue(#[from] std::io::Error),

  #[error("Serialization error: {0}")]
  Serialization(#[from] serde_json::Error),

  #[error("Database error: {0}")]
  Sqlx(#[from] sqlx::Error),

  #[error("HTTP client error: {0}")]
  Http(#[from] reqwest::Error),

  #[error("Configuration error: {0}")]
  Config(String),

  #[error("Workflow error: {source}")]
  Workflow {
    #[from]
    source: FlowError,
  },

  #[error("Internal server error: {0}")]
  Internal(String),
}

impl From<anyhow::Error> for AppError {
  fn from(err: anyhow::Error) -> Self {
    match err.downcast::<sqlx::Error>() {
      Ok(sqlx_err) => AppError::Sqlx(sqlx_err),
      Err(other) => AppError::Internal(format!("{:#}", other)),
    }
  }
}

impl ResponseError for AppError {
  fn error_response(&self) -> HttpResponse {
    match self {
      AppError::InvalidInput(m) | AppError::Inactive(m) => HttpResponse::BadRequest().json(json!({"error": m})),
      AppError::NotFound(m) => HttpResponse::NotFound().json(json!({"error": m})),
      AppError::OutOfStock(m)
      | AppError::InsufficientStock(m)
      | AppError::CommitConflict(m)
      | AppError::InvalidTransition(m) => HttpResponse::Conflict().json(json!({"error": m})),
      AppError::Unauthorized(m) => HttpResponse::Unauthorized().json(json!({"error": m})),
      AppError::GatewayUnavailable(_)
      | AppError::DeliveryAttemptFailed(_)
      | AppError::MirrorFailed(_)
      | AppError::Http(_) => {
        tracing::error!(application_error = %self, "Responding with gateway error");
        HttpResponse::BadGateway().json(json!({"error": "Upstream service error", "detail": self.to_string()}))
      }
      AppError::Sqlx(_) => {
        tracing::error!(application_error = %self, "Responding with database error");
        HttpResponse::InternalServerError().json(json!({"error": "Database operation failed"}))
      }
      AppError::Workflow { source } => {
        tracing::error!(flow_error = ?source, "Workflow error details");
        HttpResponse::InternalServerError()
          .json(json!({"error": "Workflow processing error", "detail": source.to_string()}))
      }
      _ => {
        tracing::error!(application_error = %self, "Responding with internal error");
        HttpResponse::InternalServerError()
          .json(json!({"error": "An internal error occurred", "detail": self.to_string()}))
      }
    }
  }
}

pub type Result<T, E = AppError> = std::result::Result<T, E>;
