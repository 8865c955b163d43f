// shelf-server/src/services/erp_mirror.rs

//! Forwards paid orders to the ERP. The mirror is eventually consistent: callers log failures
//! and never roll back local state because of them.

use crate::config::GatewayEndpoint;
use crate::errors::{AppError, Result};
use crate::models::Order;
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{info, instrument};

#[async_trait]
pub trait OrderMirror: Send + Sync {
  async fn mirror(&self, order: &Order) -> Result<()>;
}

pub struct HttpOrderMirror {
  client: reqwest::Client,
  endpoint: GatewayEndpoint,
}

impl HttpOrderMirror {
  pub fn new(endpoint: GatewayEndpoint) -> Result<Self> {
    let client = reqwest::Client::builder()
      .timeout(std::time::Duration::from_secs(30))
      .build()?;
    Ok(Self { client, endpoint })
  }
}

fn payment_method_id(method: Option<&str>) -> &'static str {
  match method {
    Some("card") => "15",
    Some("bank") => "13",
    _ => "1",
  }
}

/// Sales-order import body for one order.
pub fn sales_order_payload(order: &Order) -> Value {
  let name = format!("{} {}", order.first_name, order.last_name).trim().to_string();
  let positions: Vec<Value> = order
    .items
    .iter()
    .map(|item| {
      json!({
        "product": { "number": item.product_id },
        "price": {
          "amount": format!("{}.{:02}", item.current_price_cents / 100, item.current_price_cents % 100),
          "currency": "EUR",
        },
        "quantity": item.quantity,
      })
    })
    .collect();

  json!({
    "externalOrderId": order.id,
    "date": order.created_at.format("%Y-%m-%d").to_string(),
    "customer": { "email": order.email, "name": name },
    "financials": {
      "paymentMethod": { "id": payment_method_id(order.payment_method.as_deref()) },
      "billingAddress": { "name": name, "street": order.invoice_address },
      "currency": "EUR",
    },
    "delivery": {
      "shippingAddress": { "name": name, "street": order.delivery_address },
    },
    "positions": positions,
  })
}

#[async_trait]
impl OrderMirror for HttpOrderMirror {
  #[instrument(name = "erp::mirror", skip(self, order), fields(order_id = %order.id))]
  async fn mirror(&self, order: &Order) -> Result<()> {
    let response = self
      .client
      .post(format!("{}/api/salesOrders/actions/import", self.endpoint.base_url))
      .bearer_auth(&self.endpoint.token)
      .json(&sales_order_payload(order))
      .send()
      .await
      .map_err(|e| AppError::MirrorFailed(format!("ERP unreachable: {}", e)))?;

    let status = response.status();
    if !status.is_success() {
      let detail = response.text().await.unwrap_or_default();
      return Err(AppError::MirrorFailed(format!("ERP import returned {}: {}", status, detail)));
    }
    info!("Order mirrored to ERP.");
    Ok(())
  }
}

/// Logs the payload instead of calling an ERP.
#[derive(Default)]
pub struct LogOrderMirror;

#[async_trait]
impl OrderMirror for LogOrderMirror {
  async fn mirror(&self, order: &Order) -> Result<()> {
    info!(order_id = %order.id, payload = %sales_order_payload(order), "Simulating ERP order import.");
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::models::{DeliveryStatus, OrderLineItem, OrderStatus, PaymentStatus};
  use chrono::Utc;
  use tokio::io::{AsyncReadExt, AsyncWriteExt};
  use tokio::net::TcpListener;

  fn order() -> Order {
    Order {
      id: "o-1".to_string(),
      user_id: None,
      sales_channel_id: "web".to_string(),
      email: "reader@example.com".to_string(),
      first_name: "Ada".to_string(),
      last_name: "Reader".to_string(),
      delivery_address: "1 Library Lane".to_string(),
      invoice_address: "1 Library Lane".to_string(),
      payment_method: Some("card".to_string()),
      total_price_cents: 1399,
      payment_status: PaymentStatus::Paid,
      delivery_status: DeliveryStatus::Open,
      order_status: OrderStatus::InProgress,
      external_order_id: None,
      active: true,
      created_at: Utc::now(),
      items: vec![OrderLineItem {
        id: "o-1-line-1".to_string(),
        order_id: "o-1".to_string(),
        product_id: "p1".to_string(),
        quantity: 1,
        current_price_cents: 1399,
        download_url: None,
      }],
    }
  }

  fn mirror_at(base_url: String) -> HttpOrderMirror {
    HttpOrderMirror::new(GatewayEndpoint {
      base_url,
      token: "t".to_string(),
    })
    .unwrap()
  }

  /// Serves one request, consuming its body first, then answers with `response`.
  async fn serve_once(response: &'static str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
      let (mut socket, _) = listener.accept().await.unwrap();
      let mut request = Vec::new();
      let mut chunk = [0u8; 4096];
      loop {
        let n = socket.read(&mut chunk).await.unwrap();
        if n == 0 {
          break;
        }
        request.extend_from_slice(&chunk[..n]);
        let text = String::from_utf8_lossy(&request).to_string();
        if let Some(end) = text.find("\r\n\r\n") {
          let length = text[..end]
            .lines()
            .find_map(|l| l.to_ascii_lowercase().strip_prefix("content-length:").map(|v| v.trim().to_string()))
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(0);
          if request.len() >= end + 4 + length {
            break;
          }
        }
      }
      socket.write_all(response.as_bytes()).await.unwrap();
      socket.shutdown().await.unwrap();
    });
    format!("http://{}", addr)
  }

  #[tokio::test]
  async fn rejected_import_is_a_mirror_failure() {
    let base = serve_once("HTTP/1.1 503 Service Unavailable\r\ncontent-length: 4\r\nconnection: close\r\n\r\ndown").await;

    let err = mirror_at(base).mirror(&order()).await.unwrap_err();

    match err {
      AppError::MirrorFailed(detail) => {
        assert!(detail.contains("503"));
        assert!(detail.contains("down"));
      }
      other => panic!("unexpected error: {:?}", other),
    }
  }

  #[tokio::test]
  async fn accepted_import_succeeds() {
    let base = serve_once("HTTP/1.1 200 OK\r\ncontent-length: 2\r\nconnection: close\r\n\r\n{}").await;
    mirror_at(base).mirror(&order()).await.unwrap();
  }

  #[tokio::test]
  async fn unreachable_erp_is_a_mirror_failure() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = mirror_at(format!("http://{}", addr)).mirror(&order()).await.unwrap_err();

    assert!(matches!(err, AppError::MirrorFailed(ref detail) if detail.starts_with("ERP unreachable")));
  }
}
