//! Order records as stored in the `orders` / `order_items` collections.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::phase::{classify_phase, Phase, STOCK_CATEGORY};

/// Statuses that take an order out of the active pipeline.
pub const INACTIVE_STATUSES: &[&str] = &["cancelled", "completed", "delivered"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: String,
    pub order_number: String,
    pub customer_name: String,
    #[serde(default)]
    pub customer_document: Option<String>,
    #[serde(default)]
    pub delivery_date: Option<NaiveDate>,
    pub status: String,
    /// `"estoque"` for stock replenishment, `"vendas"` for customer sales.
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub order_type: Option<String>,
    /// ERP (TOTVS) order reference.
    #[serde(default, alias = "totvs_order_number")]
    pub external_ref: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub items: Vec<OrderItem>,
}

impl Order {
    /// Build a new order with a fresh id and `pending` status.
    pub fn new(order_number: &str, customer_name: &str) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            order_number: order_number.to_string(),
            customer_name: customer_name.to_string(),
            customer_document: None,
            delivery_date: None,
            status: "pending".to_string(),
            category: None,
            order_type: None,
            external_ref: None,
            created_at: now,
            updated_at: now,
            items: Vec::new(),
        }
    }

    pub fn phase(&self) -> Phase {
        classify_phase(&self.status, self.category.as_deref())
    }

    pub fn is_active(&self) -> bool {
        !INACTIVE_STATUSES.contains(&self.status.as_str())
    }

    pub fn is_stock(&self) -> bool {
        self.category.as_deref() == Some(STOCK_CATEGORY)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub id: String,
    pub order_id: String,
    pub item_code: String,
    pub description: String,
    pub requested_quantity: f64,
    #[serde(default)]
    pub delivered_quantity: f64,
    /// Where the item comes from: `in_stock`, `production` or `purchase`.
    pub source_type: String,
    pub status: String,
}

impl OrderItem {
    pub fn new(order_id: &str, item_code: &str, description: &str, requested: f64) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            order_id: order_id.to_string(),
            item_code: item_code.to_string(),
            description: description.to_string(),
            requested_quantity: requested,
            delivered_quantity: 0.0,
            source_type: "in_stock".to_string(),
            status: "pending".to_string(),
        }
    }

    pub fn is_fully_delivered(&self) -> bool {
        self.delivered_quantity >= self.requested_quantity
    }
}

/// Fields of a new order submission checked for duplicates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCandidate {
    pub order_number: String,
    pub customer_name: String,
    #[serde(default)]
    pub delivery_date: Option<NaiveDate>,
    #[serde(default, alias = "totvs_order_number")]
    pub external_ref: Option<String>,
}

impl From<&Order> for OrderCandidate {
    fn from(order: &Order) -> Self {
        Self {
            order_number: order.order_number.clone(),
            customer_name: order.customer_name.clone(),
            delivery_date: order.delivery_date,
            external_ref: order.external_ref.clone(),
        }
    }
}
