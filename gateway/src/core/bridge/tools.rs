//! Function-call handling.
//!
//! The assistant streams function-call arguments in fragments keyed by
//! `call_id`. When a call completes its arguments are validated, the order is
//! persisted, and a `function_call_output` item is sent back followed by a
//! `response.create` so the assistant can speak the outcome.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map, Value, json};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::core::orders::{NewOrder, OrderSize, OrderStore};
use crate::core::realtime::openai::CREATE_ORDER_TOOL;
use crate::core::realtime::{ClientEvent, ConversationItem};
use crate::errors::{BridgeError, BridgeResult};

/// Required `create_order` arguments, in the order they are reported.
pub const REQUIRED_ORDER_FIELDS: [&str; 4] = ["flavour", "size", "address", "customer_name"];

/// A function call whose arguments are still streaming.
#[derive(Debug, Clone, Default)]
struct PendingCall {
    name: Option<String>,
    arguments: String,
}

/// A function call with its final arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedCall {
    pub call_id: String,
    pub name: Option<String>,
    pub arguments: String,
}

/// Outcome reported back to the assistant.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolResult {
    Success { order_id: String, created_at: String },
    MissingFields(Vec<String>),
    InvalidFields(Vec<String>),
    StorageError(String),
    UnknownFunction(String),
}

impl ToolResult {
    pub fn to_json(&self) -> Value {
        match self {
            ToolResult::Success {
                order_id,
                created_at,
            } => json!({
                "status": "success",
                "order_id": order_id,
                "created_at": created_at,
            }),
            ToolResult::MissingFields(fields) => json!({
                "status": "error",
                "error": "missing_fields",
                "missing_fields": fields,
            }),
            ToolResult::InvalidFields(fields) => json!({
                "status": "error",
                "error": "invalid_fields",
                "invalid_fields": fields,
            }),
            ToolResult::StorageError(message) => json!({
                "status": "error",
                "error": "storage_error",
                "message": message,
            }),
            ToolResult::UnknownFunction(name) => json!({
                "status": "error",
                "error": "unknown_function",
                "function": name,
            }),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ToolResult::Success { .. })
    }

    /// The validation failure behind a rejected order, if that is what this is.
    pub fn validation_error(&self) -> Option<BridgeError> {
        match self {
            ToolResult::MissingFields(fields) => Some(BridgeError::Validation(format!(
                "missing fields: {}",
                fields.join(", ")
            ))),
            ToolResult::InvalidFields(fields) => Some(BridgeError::Validation(format!(
                "invalid fields: {}",
                fields.join(", ")
            ))),
            _ => None,
        }
    }
}

/// Accumulates streamed arguments for the calls of one session.
#[derive(Debug, Default)]
pub struct ToolCallTracker {
    pending: HashMap<String, PendingCall>,
}

impl ToolCallTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// A function-call item was announced.
    pub fn on_item_added(&mut self, call_id: &str, name: Option<&str>) {
        let entry = self.pending.entry(call_id.to_string()).or_default();
        if let Some(name) = name {
            entry.name = Some(name.to_string());
        }
    }

    pub fn on_delta(&mut self, call_id: &str, delta: &str) {
        self.pending
            .entry(call_id.to_string())
            .or_default()
            .arguments
            .push_str(delta);
    }

    /// Finish a call. Full arguments on the done event win over the
    /// accumulated deltas; a name on the done event wins over the announced one.
    pub fn complete(&mut self, call_id: &str, name: Option<&str>, arguments: &str) -> CompletedCall {
        let pending = self.pending.remove(call_id).unwrap_or_default();
        let arguments = if arguments.trim().is_empty() {
            pending.arguments
        } else {
            arguments.to_string()
        };

        CompletedCall {
            call_id: call_id.to_string(),
            name: name.map(str::to_string).or(pending.name),
            arguments,
        }
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

/// Parse arguments to an object. Anything unparseable is treated as empty.
pub fn parse_arguments(arguments: &str) -> Map<String, Value> {
    match serde_json::from_str::<Value>(arguments) {
        Ok(Value::Object(map)) => map,
        Ok(other) => {
            warn!(?other, "Function arguments are not an object");
            Map::new()
        }
        Err(e) => {
            if !arguments.trim().is_empty() {
                warn!(error = %e, "Failed to parse function arguments");
            }
            Map::new()
        }
    }
}

fn text_field(args: &Map<String, Value>, key: &str) -> Option<String> {
    let text = match args.get(key)? {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

/// Validate `create_order` arguments against the caller's phone.
pub fn validate_order(args: &Map<String, Value>, phone: &str) -> Result<NewOrder, ToolResult> {
    let missing: Vec<String> = REQUIRED_ORDER_FIELDS
        .iter()
        .filter(|field| text_field(args, field).is_none())
        .map(|field| field.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(ToolResult::MissingFields(missing));
    }

    let size_text = text_field(args, "size").unwrap_or_default();
    let Some(size) = OrderSize::parse(&size_text) else {
        return Err(ToolResult::InvalidFields(vec!["size".to_string()]));
    };

    Ok(NewOrder {
        flavour: text_field(args, "flavour").unwrap_or_default(),
        size,
        drink: text_field(args, "drink"),
        address: text_field(args, "address").unwrap_or_default(),
        customer_name: text_field(args, "customer_name").unwrap_or_default(),
        phone: phone.to_string(),
    })
}

/// Executes completed calls against the order store.
#[derive(Clone)]
pub struct ToolDispatcher {
    store: Arc<dyn OrderStore>,
}

impl ToolDispatcher {
    pub fn new(store: Arc<dyn OrderStore>) -> Self {
        Self { store }
    }

    /// Run a completed call. Never fails; every problem becomes a result.
    pub async fn execute(&self, call: &CompletedCall, phone: &str) -> ToolResult {
        let name = call.name.as_deref().unwrap_or_default();
        if name != CREATE_ORDER_TOOL {
            warn!(call_id = %call.call_id, function = name, "Unknown function requested");
            return ToolResult::UnknownFunction(name.to_string());
        }

        let args = parse_arguments(&call.arguments);
        let order = match validate_order(&args, phone) {
            Ok(order) => order,
            Err(result) => {
                if let Some(err) = result.validation_error() {
                    info!(call_id = %call.call_id, error = %err, "Order rejected");
                }
                return result;
            }
        };

        match self.store.create_order(order).await {
            Ok(receipt) => {
                info!(call_id = %call.call_id, order_id = %receipt.order_id, "Order created");
                ToolResult::Success {
                    order_id: receipt.order_id,
                    created_at: receipt.created_at,
                }
            }
            Err(e) => {
                let err = BridgeError::from(e);
                warn!(call_id = %call.call_id, error = %err, "Failed to store order");
                ToolResult::StorageError(err.to_string())
            }
        }
    }

    /// Execute and report back upstream: the output item, then `response.create`.
    pub async fn dispatch(
        &self,
        call: CompletedCall,
        phone: &str,
        upstream: &mpsc::Sender<ClientEvent>,
    ) -> BridgeResult<ToolResult> {
        let result = self.execute(&call, phone).await;
        debug!(call_id = %call.call_id, success = result.is_success(), "Reporting tool result");

        for event in result_events(&call.call_id, &result) {
            upstream
                .send(event)
                .await
                .map_err(|_| BridgeError::Transport("realtime connection closed".to_string()))?;
        }
        Ok(result)
    }
}

/// The two upstream events that report a tool result.
pub fn result_events(call_id: &str, result: &ToolResult) -> [ClientEvent; 2] {
    [
        ClientEvent::ConversationItemCreate {
            item: ConversationItem::function_call_output(call_id, result.to_json().to_string()),
        },
        ClientEvent::response_create(),
    ]
}
