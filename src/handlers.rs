// =============================================================================
// HANDLERS MODULE
// =============================================================================
// HTTP request handlers (controller layer).
//
// Handlers do three things: validate the obvious input problems (positive
// quantities) before the engine runs, open one transaction per engine
// operation and commit it only when every step succeeded, and record
// request metrics. The reconciliation logic itself lives in src/engine.
// =============================================================================

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use crate::engine::{purchase, service_order};
use crate::error::{AppError, AppResult};
use crate::metrics;
use crate::models::*;
use crate::AppState;

// =============================================================================
// HEALTH CHECK ENDPOINTS
// =============================================================================

/// Liveness probe - Is the service running?
///
/// GET /health
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        service: "maintenance-service".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Readiness probe - Is the service ready to handle requests?
///
/// GET /ready
pub async fn readiness_check(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ReadinessResponse>, StatusCode> {
    let db_healthy = state.db.health_check().await;

    let response = ReadinessResponse {
        status: if db_healthy { "ready" } else { "not_ready" }.to_string(),
        checks: ReadinessChecks {
            database: db_healthy,
        },
    };

    if db_healthy {
        Ok(Json(response))
    } else {
        Err(StatusCode::SERVICE_UNAVAILABLE)
    }
}

// =============================================================================
// METRICS ENDPOINT
// =============================================================================
/// Prometheus metrics endpoint
///
/// GET /metrics
pub async fn metrics_handler(State(state): State<Arc<AppState>>) -> String {
    state.metrics_handle.render()
}

// =============================================================================
// INVENTORY ENDPOINTS
// =============================================================================

/// Create an inventory item
///
/// POST /api/v1/inventory
pub async fn create_inventory_item(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateInventoryItemRequest>,
) -> AppResult<(StatusCode, Json<InventoryItem>)> {
    let start = Instant::now();

    let quantity = request.quantity.unwrap_or(Decimal::ZERO);
    if quantity < Decimal::ZERO {
        return Err(AppError::BadRequest(
            "quantity must not be negative".to_string(),
        ));
    }

    let item = state
        .db
        .create_inventory_item(
            &request.name,
            request.unit_cost,
            quantity,
            request.supplier_id,
        )
        .await?;

    metrics::set_stock_level(&item.id.to_string(), item.quantity);

    let duration = start.elapsed().as_secs_f64();
    metrics::record_http_request("POST", "/api/v1/inventory", 201, duration);
    metrics::record_db_query("insert", duration);

    Ok((StatusCode::CREATED, Json(item)))
}

/// Get a single inventory item
///
/// GET /api/v1/inventory/:id
pub async fn get_inventory_item(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<InventoryItem>> {
    let start = Instant::now();

    let item = state
        .db
        .get_inventory_item(id)
        .await?
        .ok_or_else(|| AppError::not_found("inventory item", id))?;

    let duration = start.elapsed().as_secs_f64();
    metrics::record_http_request("GET", "/api/v1/inventory/:id", 200, duration);
    metrics::record_db_query("select", duration);

    Ok(Json(item))
}

// =============================================================================
// VEHICLE MAINTENANCE HISTORY
// =============================================================================

/// Get a vehicle's derived maintenance history, newest first
///
/// GET /api/v1/vehicles/:id/maintenance-records
pub async fn list_maintenance_records(
    State(state): State<Arc<AppState>>,
    Path(vehicle_id): Path<Uuid>,
) -> AppResult<Json<Vec<MaintenanceRecord>>> {
    let start = Instant::now();

    let records = state.db.list_maintenance_records(vehicle_id).await?;

    let duration = start.elapsed().as_secs_f64();
    metrics::record_http_request(
        "GET",
        "/api/v1/vehicles/:id/maintenance-records",
        200,
        duration,
    );
    metrics::record_db_query("select", duration);

    Ok(Json(records))
}

// =============================================================================
// SERVICE ORDER ENDPOINTS
// =============================================================================

/// Create a service order (status "open", fresh OS-NNN number)
///
/// POST /api/v1/service-orders
pub async fn create_service_order(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateServiceOrderRequest>,
) -> AppResult<(StatusCode, Json<ServiceOrder>)> {
    let start = Instant::now();

    let mut tx = state.db.begin().await?;
    let order = service_order::create_service_order(&mut tx, &request).await?;
    tx.commit().await?;

    let duration = start.elapsed().as_secs_f64();
    metrics::record_http_request("POST", "/api/v1/service-orders", 201, duration);
    metrics::record_db_query("insert", duration);

    Ok((StatusCode::CREATED, Json(order)))
}

/// Get a service order with its line items
///
/// GET /api/v1/service-orders/:id
pub async fn get_service_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ServiceOrderDetail>> {
    let start = Instant::now();

    let order = state
        .db
        .get_service_order(id)
        .await?
        .ok_or_else(|| AppError::not_found("service order", id))?;
    let items = state.db.list_order_items(id).await?;

    let duration = start.elapsed().as_secs_f64();
    metrics::record_http_request("GET", "/api/v1/service-orders/:id", 200, duration);
    metrics::record_db_query("select", duration);

    Ok(Json(ServiceOrderDetail { order, items }))
}

/// Add a part requirement to a service order
///
/// POST /api/v1/service-orders/:id/items
///
/// # Request Body
/// ```json
/// { "inventory_item_id": "…", "required_quantity": "3" }
/// ```
///
/// Consumes the quantity from stock (floor at zero) and recomputes the
/// order's estimated cost before responding.
pub async fn add_line_item(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<Uuid>,
    Json(request): Json<AddLineItemRequest>,
) -> AppResult<(StatusCode, Json<AddLineItemResponse>)> {
    let start = Instant::now();

    if request.required_quantity <= Decimal::ZERO {
        return Err(AppError::BadRequest(
            "required_quantity must be positive".to_string(),
        ));
    }

    tracing::info!(
        order_id = %order_id,
        inventory_item_id = %request.inventory_item_id,
        quantity = %request.required_quantity,
        "Adding line item"
    );

    let mut tx = state.db.begin().await?;
    let (line_item_id, estimated_cost) = service_order::add_line_item(
        &mut tx,
        order_id,
        request.inventory_item_id,
        request.required_quantity,
    )
    .await?;
    tx.commit().await?;

    let duration = start.elapsed().as_secs_f64();
    metrics::record_http_request("POST", "/api/v1/service-orders/:id/items", 201, duration);

    Ok((
        StatusCode::CREATED,
        Json(AddLineItemResponse {
            line_item_id,
            estimated_cost,
        }),
    ))
}

/// Move a service order through its lifecycle
///
/// POST /api/v1/service-orders/:id/status
///
/// Terminal transitions (completed/cancelled) derive a maintenance record
/// for the vehicle, with duplicate suppression.
pub async fn set_service_order_status(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<Uuid>,
    Json(request): Json<SetServiceOrderStatusRequest>,
) -> AppResult<Json<ServiceOrder>> {
    let start = Instant::now();

    let mut tx = state.db.begin().await?;
    let order = service_order::set_status(
        &mut tx,
        order_id,
        request.status,
        request.validated_by.as_deref(),
        request.validated_at,
    )
    .await?;
    tx.commit().await?;

    let duration = start.elapsed().as_secs_f64();
    metrics::record_http_request("POST", "/api/v1/service-orders/:id/status", 200, duration);

    Ok(Json(order))
}

// =============================================================================
// PURCHASE REQUEST ENDPOINTS
// =============================================================================

/// Create a purchase request, optionally sourcing a service order's need
///
/// POST /api/v1/purchase-requests
pub async fn create_purchase_request(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreatePurchaseRequestBody>,
) -> AppResult<(StatusCode, Json<PurchaseRequest>)> {
    let start = Instant::now();

    if request.quantity <= Decimal::ZERO {
        return Err(AppError::BadRequest("quantity must be positive".to_string()));
    }

    let mut tx = state.db.begin().await?;
    let purchase = purchase::create_purchase_request(&mut tx, &request).await?;
    tx.commit().await?;

    let duration = start.elapsed().as_secs_f64();
    metrics::record_http_request("POST", "/api/v1/purchase-requests", 201, duration);

    Ok((StatusCode::CREATED, Json(purchase)))
}

/// Get a single purchase request
///
/// GET /api/v1/purchase-requests/:id
pub async fn get_purchase_request(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<PurchaseRequest>> {
    let start = Instant::now();

    let purchase = state
        .db
        .get_purchase_request(id)
        .await?
        .ok_or_else(|| AppError::not_found("purchase request", id))?;

    let duration = start.elapsed().as_secs_f64();
    metrics::record_http_request("GET", "/api/v1/purchase-requests/:id", 200, duration);
    metrics::record_db_query("select", duration);

    Ok(Json(purchase))
}

/// Move a purchase request through its lifecycle
///
/// POST /api/v1/purchase-requests/:id/status
///
/// The first move into "received" replenishes stock (netting the sourced
/// requirement when one is linked) and clears the line item's purchase
/// link; repeating it is a no-op on stock.
pub async fn set_purchase_status(
    State(state): State<Arc<AppState>>,
    Path(purchase_id): Path<Uuid>,
    Json(request): Json<SetPurchaseStatusRequest>,
) -> AppResult<Json<PurchaseRequest>> {
    let start = Instant::now();

    let mut tx = state.db.begin().await?;
    let purchase = purchase::set_status(
        &mut tx,
        purchase_id,
        request.status,
        request.approved_by.as_deref(),
        request.approved_at,
    )
    .await?;
    tx.commit().await?;

    let duration = start.elapsed().as_secs_f64();
    metrics::record_http_request("POST", "/api/v1/purchase-requests/:id/status", 200, duration);

    Ok(Json(purchase))
}
