// =============================================================================
// MODELS MODULE
// =============================================================================
// Entities, status enums and API request/response structures.
//
// Statuses are stored as plain text columns and decoded through TryFrom,
// so an unknown value in the database surfaces as a decode error instead
// of being silently mapped to a default. Each status enum carries its own
// transition table; every write path validates against it before applying
// side effects.
// =============================================================================

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// =============================================================================
// STATUS ENUMS & TRANSITION TABLES
// =============================================================================

/// Lifecycle of a service order.
///
/// `open -> {in_progress, completed, cancelled}`,
/// `in_progress -> {completed, cancelled}`; completed and cancelled are
/// terminal. Re-applying the current status is a permitted no-op so that a
/// reviewer can re-validate an order without tripping the transition check —
/// the derived-record dedup (engine::service_order) suppresses duplicate
/// side effects in that case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceOrderStatus {
    Open,
    InProgress,
    Completed,
    Cancelled,
}

impl ServiceOrderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    /// True when the order has reached a state with no way back.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Transition table. Self-transitions are always allowed.
    pub fn can_transition_to(self, next: ServiceOrderStatus) -> bool {
        use ServiceOrderStatus::*;
        if self == next {
            return true;
        }
        matches!(
            (self, next),
            (Open, InProgress)
                | (Open, Completed)
                | (Open, Cancelled)
                | (InProgress, Completed)
                | (InProgress, Cancelled)
        )
    }
}

impl TryFrom<String> for ServiceOrderStatus {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "open" => Ok(Self::Open),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(format!("unknown service order status: {}", other)),
        }
    }
}

/// Lifecycle of a purchase request.
///
/// `pending -> {approved, received, cancelled}`,
/// `approved -> {received, cancelled}`; received and cancelled are terminal.
/// The direct `pending -> received` shortcut is intentional: small purchases
/// are often booked only once the parts arrive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseStatus {
    Pending,
    Approved,
    Received,
    Cancelled,
}

impl PurchaseStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Received => "received",
            Self::Cancelled => "cancelled",
        }
    }

    /// Transition table. Self-transitions are always allowed; the receive
    /// side effects are additionally gated on the pre-transition status so
    /// a repeated `received` never touches stock twice.
    pub fn can_transition_to(self, next: PurchaseStatus) -> bool {
        use PurchaseStatus::*;
        if self == next {
            return true;
        }
        matches!(
            (self, next),
            (Pending, Approved)
                | (Pending, Received)
                | (Pending, Cancelled)
                | (Approved, Received)
                | (Approved, Cancelled)
        )
    }
}

impl TryFrom<String> for PurchaseStatus {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "received" => Ok(Self::Received),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(format!("unknown purchase status: {}", other)),
        }
    }
}

/// Kind of work a service order describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    Preventive,
    Corrective,
    Predictive,
    Other,
}

impl OrderType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Preventive => "preventive",
            Self::Corrective => "corrective",
            Self::Predictive => "predictive",
            Self::Other => "other",
        }
    }
}

impl TryFrom<String> for OrderType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "preventive" => Ok(Self::Preventive),
            "corrective" => Ok(Self::Corrective),
            "predictive" => Ok(Self::Predictive),
            "other" => Ok(Self::Other),
            other => Err(format!("unknown order type: {}", other)),
        }
    }
}

/// Kind recorded in a vehicle's maintenance history. Only two buckets;
/// predictive work is filed under preventive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaintenanceKind {
    Preventive,
    Corrective,
}

impl MaintenanceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Preventive => "preventive",
            Self::Corrective => "corrective",
        }
    }
}

impl TryFrom<String> for MaintenanceKind {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "preventive" => Ok(Self::Preventive),
            "corrective" => Ok(Self::Corrective),
            other => Err(format!("unknown maintenance kind: {}", other)),
        }
    }
}

impl From<OrderType> for MaintenanceKind {
    fn from(order_type: OrderType) -> Self {
        match order_type {
            OrderType::Preventive | OrderType::Predictive => Self::Preventive,
            OrderType::Corrective | OrderType::Other => Self::Corrective,
        }
    }
}

/// Urgency of a purchase request, set by the requester.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Low,
    Medium,
    High,
}

impl Urgency {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl TryFrom<String> for Urgency {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(format!("unknown urgency: {}", other)),
        }
    }
}

// =============================================================================
// ENTITIES
// =============================================================================

/// A spare part / consumable tracked in the workshop stock.
///
/// `unit_cost` is nullable, meaning "unknown or free" — it contributes zero
/// to cost aggregation rather than failing the sum. `quantity` is floored at
/// zero by every write path (and by a CHECK constraint as a backstop).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct InventoryItem {
    pub id: Uuid,
    pub name: String,
    pub unit_cost: Option<Decimal>,
    pub quantity: Decimal,
    /// Preferred supplier. External collaborator, reference only.
    pub supplier_id: Option<Uuid>,
    /// Stamped each time a purchase against this item is received.
    pub last_purchase_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A work order on a vehicle.
///
/// `estimated_cost` is derived: once line items exist the authoritative
/// value is always the Cost Aggregator's sum, never a hand edit.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ServiceOrder {
    pub id: Uuid,
    /// Human-facing business number, e.g. "OS-007". Unique, monotonically
    /// increasing, allocated by the sequence allocator.
    pub number: String,
    #[sqlx(try_from = "String")]
    pub status: ServiceOrderStatus,
    #[sqlx(try_from = "String")]
    pub order_type: OrderType,
    pub description: String,
    pub estimated_cost: Decimal,
    pub mileage: Option<Decimal>,
    pub mechanic: Option<String>,
    pub vehicle_id: Uuid,
    pub started_at: DateTime<Utc>,
    /// Set only when the order completes; cleared on any other transition.
    pub ended_at: Option<DateTime<Utc>>,
    pub validated_by: Option<String>,
    pub validated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A requirement for a quantity of one inventory item within one order.
///
/// `purchase_request_id` is present exactly while the need is being sourced
/// through an open purchase request; receiving the purchase clears it. When
/// present it must point at a purchase for the same inventory item and the
/// same owning order.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ServiceOrderItem {
    pub id: Uuid,
    pub service_order_id: Uuid,
    pub inventory_item_id: Uuid,
    pub required_quantity: Decimal,
    pub purchase_request_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A request to buy stock, optionally sourcing a specific order's need.
///
/// `unit_cost` and `total_amount` are snapshots taken from the inventory
/// item at creation time; they are deliberately not re-derived later.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PurchaseRequest {
    pub id: Uuid,
    /// "PR-NNN", independent sequence from service orders.
    pub number: String,
    #[sqlx(try_from = "String")]
    pub status: PurchaseStatus,
    pub inventory_item_id: Option<Uuid>,
    pub requested_quantity: Decimal,
    pub unit_cost: Option<Decimal>,
    pub total_amount: Decimal,
    #[sqlx(try_from = "String")]
    pub urgency: Urgency,
    pub service_order_id: Option<Uuid>,
    pub supplier_id: Option<Uuid>,
    pub notes: Option<String>,
    pub approved_by: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Append-mostly vehicle history entry, derived from a terminal service
/// order. Deduplicated by (vehicle, description, start within 1 s).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MaintenanceRecord {
    pub id: Uuid,
    pub vehicle_id: Uuid,
    #[sqlx(try_from = "String")]
    pub kind: MaintenanceKind,
    pub description: String,
    pub cost: Decimal,
    pub mileage: Option<Decimal>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub mechanic: Option<String>,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// API REQUEST/RESPONSE STRUCTURES
// =============================================================================
// Separate from the entities so the API shape can evolve without touching
// the schema, and so internal fields stay internal.

/// Request body for creating an inventory item
#[derive(Debug, Clone, Deserialize)]
pub struct CreateInventoryItemRequest {
    pub name: String,
    pub unit_cost: Option<Decimal>,
    #[serde(default)]
    pub quantity: Option<Decimal>,
    pub supplier_id: Option<Uuid>,
}

/// Request body for creating a service order
#[derive(Debug, Clone, Deserialize)]
pub struct CreateServiceOrderRequest {
    pub vehicle_id: Uuid,
    pub order_type: OrderType,
    pub description: String,
    pub mileage: Option<Decimal>,
    pub mechanic: Option<String>,
    /// Defaults to now when omitted.
    pub started_at: Option<DateTime<Utc>>,
}

/// Request body for adding a part requirement to a service order
///
/// # Example JSON
/// ```json
/// { "inventory_item_id": "…", "required_quantity": "3" }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct AddLineItemRequest {
    pub inventory_item_id: Uuid,
    pub required_quantity: Decimal,
}

/// Request body for creating a purchase request
#[derive(Debug, Clone, Deserialize)]
pub struct CreatePurchaseRequestBody {
    pub inventory_item_id: Uuid,
    pub quantity: Decimal,
    pub urgency: Urgency,
    /// When set, the purchase sources that order's need: a line item is
    /// linked (or created) and the order's estimated cost recomputed.
    pub service_order_id: Option<Uuid>,
    pub supplier_id: Option<Uuid>,
    pub notes: Option<String>,
}

/// Request body for a purchase status transition
#[derive(Debug, Clone, Deserialize)]
pub struct SetPurchaseStatusRequest {
    pub status: PurchaseStatus,
    /// Omitting either field leaves the stored value untouched.
    pub approved_by: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
}

/// Request body for a service order status transition
#[derive(Debug, Clone, Deserialize)]
pub struct SetServiceOrderStatusRequest {
    pub status: ServiceOrderStatus,
    /// Omitting either field leaves the stored value untouched.
    pub validated_by: Option<String>,
    pub validated_at: Option<DateTime<Utc>>,
}

/// Response after adding a line item
#[derive(Debug, Clone, Serialize)]
pub struct AddLineItemResponse {
    pub line_item_id: Uuid,
    /// Order total after the synchronous recompute.
    pub estimated_cost: Decimal,
}

/// Service order plus its current line items
#[derive(Debug, Clone, Serialize)]
pub struct ServiceOrderDetail {
    #[serde(flatten)]
    pub order: ServiceOrder,
    pub items: Vec<ServiceOrderItem>,
}

// =============================================================================
// HEALTH CHECK RESPONSES
// =============================================================================

/// Simple health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

/// Detailed readiness check response
#[derive(Debug, Serialize)]
pub struct ReadinessResponse {
    pub status: String,
    pub checks: ReadinessChecks,
}

/// Individual dependency health checks
#[derive(Debug, Serialize)]
pub struct ReadinessChecks {
    pub database: bool,
}

// =============================================================================
// ERROR RESPONSES
// =============================================================================

/// API error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error type/code
    pub error: String,
    /// Human-readable error message
    pub message: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_transitions_follow_the_table() {
        use ServiceOrderStatus::*;
        assert!(Open.can_transition_to(InProgress));
        assert!(Open.can_transition_to(Completed));
        assert!(Open.can_transition_to(Cancelled));
        assert!(InProgress.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(Open));
        assert!(!Cancelled.can_transition_to(InProgress));
        // terminal states stay terminal, except the idempotent self no-op
        assert!(Completed.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(Cancelled));
    }

    #[test]
    fn purchase_transitions_follow_the_table() {
        use PurchaseStatus::*;
        assert!(Pending.can_transition_to(Approved));
        // the direct shortcut is deliberate
        assert!(Pending.can_transition_to(Received));
        assert!(Approved.can_transition_to(Received));
        assert!(Approved.can_transition_to(Cancelled));
        assert!(!Received.can_transition_to(Approved));
        assert!(!Received.can_transition_to(Pending));
        assert!(!Cancelled.can_transition_to(Received));
        assert!(Received.can_transition_to(Received));
    }

    #[test]
    fn maintenance_kind_mapping() {
        assert_eq!(
            MaintenanceKind::from(OrderType::Preventive),
            MaintenanceKind::Preventive
        );
        assert_eq!(
            MaintenanceKind::from(OrderType::Corrective),
            MaintenanceKind::Corrective
        );
        // predictive work is filed under preventive
        assert_eq!(
            MaintenanceKind::from(OrderType::Predictive),
            MaintenanceKind::Preventive
        );
        assert_eq!(
            MaintenanceKind::from(OrderType::Other),
            MaintenanceKind::Corrective
        );
    }

    #[test]
    fn status_text_round_trips() {
        let status = ServiceOrderStatus::try_from("in_progress".to_string()).unwrap();
        assert_eq!(status, ServiceOrderStatus::InProgress);
        assert_eq!(status.as_str(), "in_progress");
        assert!(ServiceOrderStatus::try_from("finished".to_string()).is_err());

        let status = PurchaseStatus::try_from("received".to_string()).unwrap();
        assert_eq!(status.as_str(), "received");
        assert!(PurchaseStatus::try_from("done".to_string()).is_err());
    }
}
