//! Order persistence.
//!
//! The bridge only ever creates orders; status transitions after `new` belong
//! to the kitchen side. Two stores are provided: an HTTP client for the real
//! order service and an in-memory store used when no service is configured.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::{debug, info};
use uuid::Uuid;

/// Default timeout for order service requests.
pub const DEFAULT_ORDER_STORE_TIMEOUT_MS: u64 = 5000;

// =============================================================================
// Model
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSize {
    Small,
    Medium,
    Large,
}

impl OrderSize {
    /// Parse a size, ignoring case and surrounding whitespace.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "small" => Some(Self::Small),
            "medium" => Some(Self::Medium),
            "large" => Some(Self::Large),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Small => "small",
            Self::Medium => "medium",
            Self::Large => "large",
        }
    }
}

impl fmt::Display for OrderSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kitchen workflow status: new → preparing → ready → delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    #[default]
    New,
    Preparing,
    Ready,
    Delivered,
}

impl OrderStatus {
    /// The status that follows this one, if any.
    pub fn next(&self) -> Option<Self> {
        match self {
            Self::New => Some(Self::Preparing),
            Self::Preparing => Some(Self::Ready),
            Self::Ready => Some(Self::Delivered),
            Self::Delivered => None,
        }
    }
}

/// A validated order ready to be stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewOrder {
    pub flavour: String,
    pub size: OrderSize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub drink: Option<String>,
    pub address: String,
    pub customer_name: String,
    /// Caller phone, "unknown" when the call could not be resolved
    pub phone: String,
}

/// A stored order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Order {
    pub id: String,
    #[serde(flatten)]
    pub details: NewOrder,
    pub status: OrderStatus,
    pub created_at: String,
}

/// What the store reports back after a successful write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderReceipt {
    pub order_id: String,
    pub created_at: String,
}

// =============================================================================
// Store
// =============================================================================

/// Errors from an order store.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("Order service request failed: {0}")]
    Request(String),

    #[error("Order service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid order service response: {0}")]
    InvalidResponse(String),

    #[error("Order store unavailable: {0}")]
    Unavailable(String),
}

/// Persistence collaborator for completed orders.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Store a new order with status `new`.
    async fn create_order(&self, order: NewOrder) -> Result<OrderReceipt, PersistenceError>;
}

/// Current UTC time as RFC 3339.
pub fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| OffsetDateTime::now_utc().unix_timestamp().to_string())
}

/// Process-local store. Orders are lost on restart.
#[derive(Debug, Default)]
pub struct InMemoryOrderStore {
    orders: Mutex<Vec<Order>>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of stored orders, oldest first.
    pub fn orders(&self) -> Vec<Order> {
        self.orders.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.orders.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.lock().is_empty()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn create_order(&self, order: NewOrder) -> Result<OrderReceipt, PersistenceError> {
        let stored = Order {
            id: Uuid::new_v4().to_string(),
            details: order,
            status: OrderStatus::New,
            created_at: now_rfc3339(),
        };
        let receipt = OrderReceipt {
            order_id: stored.id.clone(),
            created_at: stored.created_at.clone(),
        };
        debug!(order_id = %receipt.order_id, "Stored order in memory");
        self.orders.lock().push(stored);
        Ok(receipt)
    }
}

/// Body sent to the order service.
#[derive(Debug, Serialize)]
struct CreateOrderRequest<'a> {
    #[serde(flatten)]
    order: &'a NewOrder,
    status: OrderStatus,
}

/// Body returned by the order service.
#[derive(Debug, Deserialize)]
struct CreateOrderResponse {
    id: serde_json::Value,
    #[serde(default)]
    created_at: Option<String>,
}

/// Client for an HTTP order service exposing `POST {base}/orders`.
#[derive(Debug, Clone)]
pub struct HttpOrderStore {
    client: Client,
    endpoint: String,
}

impl HttpOrderStore {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, PersistenceError> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| PersistenceError::Unavailable(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: format!("{}/orders", base_url.trim_end_matches('/')),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl OrderStore for HttpOrderStore {
    async fn create_order(&self, order: NewOrder) -> Result<OrderReceipt, PersistenceError> {
        let body = CreateOrderRequest {
            order: &order,
            status: OrderStatus::New,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| PersistenceError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PersistenceError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let created: CreateOrderResponse = response
            .json()
            .await
            .map_err(|e| PersistenceError::InvalidResponse(e.to_string()))?;

        let order_id = match created.id {
            serde_json::Value::String(id) => id,
            serde_json::Value::Number(id) => id.to_string(),
            other => {
                return Err(PersistenceError::InvalidResponse(format!(
                    "unexpected order id {other}"
                )));
            }
        };

        info!(order_id = %order_id, phone = %order.phone, "Order stored");
        Ok(OrderReceipt {
            order_id,
            created_at: created.created_at.unwrap_or_else(now_rfc3339),
        })
    }
}
