// shelf-server/src/models/product.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Product {
  pub id: String,
  pub title: String,
  pub subtitle: String,
  /// Never negative once committed.
  pub stock: i32,
  pub selling_price_cents: i64,
  pub is_download_title: bool,
  pub active: bool,
}

/// Per-sales-channel substitute price and title for one product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct ChannelOverride {
  pub product_id: String,
  pub sales_channel_id: String,
  pub changed_price_cents: Option<i64>,
  pub changed_title: Option<String>,
}

impl ChannelOverride {
  /// A zero price is stored by channels that only override the title.
  pub fn price_cents(&self) -> Option<i64> {
    self.changed_price_cents.filter(|cents| *cents != 0)
  }

  pub fn title(&self) -> Option<&str> {
    self.changed_title.as_deref().filter(|t| !t.is_empty())
  }
}

impl Product {
  pub fn effective_price_cents(&self, channel_override: Option<&ChannelOverride>) -> i64 {
    channel_override
      .and_then(ChannelOverride::price_cents)
      .unwrap_or(self.selling_price_cents)
  }

  pub fn display_title(&self, channel_override: Option<&ChannelOverride>) -> String {
    channel_override
      .and_then(ChannelOverride::title)
      .unwrap_or(&self.title)
      .to_string()
  }
}
