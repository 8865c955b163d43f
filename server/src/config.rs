// shelf-server/src/config.rs

use crate::errors::{AppError, Result};
use dotenvy::dotenv;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Base URL plus bearer credential of an outbound HTTP gateway.
#[derive(Debug, Clone)]
pub struct GatewayEndpoint {
  pub base_url: String,
  pub token: String,
}

#[derive(Debug, Clone)]
pub struct NotifyConfig {
  /// `None` selects the logging notifier.
  pub endpoint: Option<GatewayEndpoint>,
  pub sender_email: String,
  pub order_template_id: String,
  pub failed_template_id: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
  pub server_host: String,
  pub server_port: u16,
  /// `None` selects the in-memory catalog.
  pub database_url: Option<String>,

  pub delivery_queue_dir: PathBuf,
  pub delivery_poll_interval: Duration,
  pub delivery_retry_budget: u32,

  pub notify: NotifyConfig,
  /// `None` selects the mock fulfillment gateway.
  pub fulfillment: Option<GatewayEndpoint>,
  /// `None` selects the logging order mirror.
  pub erp: Option<GatewayEndpoint>,
}

impl AppConfig {
  pub fn from_env() -> Result<Self> {
    dotenv().ok();

    let server_host = optional_env("SERVER_HOST").unwrap_or_else(|| "127.0.0.1".to_string());
    let server_port = parse_env("SERVER_PORT", 8080u16)?;
    let database_url = optional_env("DATABASE_URL");

    let delivery_queue_dir =
      PathBuf::from(optional_env("DELIVERY_QUEUE_DIR").unwrap_or_else(|| "./var/delivery-queue".to_string()));
    let poll_secs = parse_env("DELIVERY_POLL_INTERVAL_SECS", 5u64)?;
    if poll_secs == 0 {
      return Err(AppError::Config("DELIVERY_POLL_INTERVAL_SECS must be at least 1".to_string()));
    }
    let delivery_retry_budget = parse_env("DELIVERY_RETRY_BUDGET", 25u32)?;

    let notify = NotifyConfig {
      endpoint: endpoint_env("NOTIFY_API_URL", "NOTIFY_API_KEY")?,
      sender_email: optional_env("NOTIFY_SENDER_EMAIL").unwrap_or_else(|| "noreply@example.com".to_string()),
      order_template_id: optional_env("NOTIFY_ORDER_TEMPLATE_ID").unwrap_or_else(|| "order-delivered".to_string()),
      failed_template_id: optional_env("NOTIFY_FAILED_TEMPLATE_ID").unwrap_or_else(|| "order-failed".to_string()),
    };

    let config = Self {
      server_host,
      server_port,
      database_url,
      delivery_queue_dir,
      delivery_poll_interval: Duration::from_secs(poll_secs),
      delivery_retry_budget,
      notify,
      fulfillment: endpoint_env("FULFILLMENT_API_URL", "FULFILLMENT_API_TOKEN")?,
      erp: endpoint_env("ERP_API_URL", "ERP_API_TOKEN")?,
    };

    tracing::info!(
      catalog = if config.database_url.is_some() { "postgres" } else { "memory" },
      queue_dir = %config.delivery_queue_dir.display(),
      retry_budget = config.delivery_retry_budget,
      "Application configuration loaded successfully."
    );
    Ok(config)
  }

  /// Defaults for tests and local runs: memory catalog, mock gateways, queue under `queue_dir`.
  pub fn local(queue_dir: impl Into<PathBuf>) -> Self {
    Self {
      server_host: "127.0.0.1".to_string(),
      server_port: 8080,
      database_url: None,
      delivery_queue_dir: queue_dir.into(),
      delivery_poll_interval: Duration::from_secs(5),
      delivery_retry_budget: 25,
      notify: NotifyConfig {
        endpoint: None,
        sender_email: "noreply@example.com".to_string(),
        order_template_id: "order-delivered".to_string(),
        failed_template_id: "order-failed".to_string(),
      },
      fulfillment: None,
      erp: None,
    }
  }
}

fn optional_env(var_name: &str) -> Option<String> {
  env::var(var_name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<T>(var_name: &str, default: T) -> Result<T>
where
  T: FromStr,
  T::Err: std::fmt::Display,
{
  match optional_env(var_name) {
    Some(raw) => raw
      .trim()
      .parse::<T>()
      .map_err(|e| AppError::Config(format!("Invalid {} value '{}': {}", var_name, raw, e))),
    None => Ok(default),
  }
}

/// A URL without its credential is a configuration mistake, not a request for the mock.
fn endpoint_env(url_var: &str, token_var: &str) -> Result<Option<GatewayEndpoint>> {
  match optional_env(url_var) {
    Some(base_url) => {
      let token = optional_env(token_var)
        .ok_or_else(|| AppError::Config(format!("{} is set but {} is missing", url_var, token_var)))?;
      Ok(Some(GatewayEndpoint {
        base_url: base_url.trim_end_matches('/').to_string(),
        token,
      }))
    }
    None => Ok(None),
  }
}
