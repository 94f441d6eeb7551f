// =============================================================================
// SERVICE ORDER LIFECYCLE CONTROLLER
// =============================================================================
// Owns the service order state machine, the "add part to order" write path,
// and the maintenance history derived from terminal orders.
//
// addLineItem is the canonical consume path: insert the requirement,
// decrement stock, recompute the order's estimated cost — all inside the
// caller's transaction, so the stored total never lags the line items.
//
// Moving an order to completed/cancelled derives a MaintenanceRecord for the
// vehicle. Terminal status can be re-applied (re-validation), so insertion
// is deduplicated by (vehicle, description, start within 1 s): at most one
// derived record per distinct candidate no matter how often the status is
// set.
// =============================================================================

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgConnection;
use uuid::Uuid;

use crate::engine::{cost, sequence, stock};
use crate::error::AppError;
use crate::metrics;
use crate::models::{
    CreateServiceOrderRequest, MaintenanceKind, ServiceOrder, ServiceOrderStatus,
};

/// Start time tolerance for the duplicate check, in milliseconds. Validation
/// timestamps for the same order can differ by clock granularity between
/// invocations; a second is wide enough to catch those and narrow enough to
/// keep distinct visits apart.
const DEDUP_WINDOW_MS: i64 = 1000;

// -----------------------------------------------------------------------------
// CREATE ORDER
// -----------------------------------------------------------------------------

/// Create a service order in `open` status with a fresh "OS-NNN" number.
pub async fn create_service_order(
    conn: &mut PgConnection,
    req: &CreateServiceOrderRequest,
) -> Result<ServiceOrder, AppError> {
    let number = sequence::next_number(&mut *conn, "OS").await?;
    let started_at = req.started_at.unwrap_or_else(Utc::now);

    let order = sqlx::query_as::<_, ServiceOrder>(
        r#"
        INSERT INTO service_orders
            (number, status, order_type, description, mileage, mechanic,
             vehicle_id, started_at)
        VALUES ($1, 'open', $2, $3, $4, $5, $6, $7)
        RETURNING id, number, status, order_type, description, estimated_cost,
                  mileage, mechanic, vehicle_id, started_at, ended_at,
                  validated_by, validated_at, created_at, updated_at
        "#,
    )
    .bind(&number)
    .bind(req.order_type.as_str())
    .bind(&req.description)
    .bind(req.mileage)
    .bind(&req.mechanic)
    .bind(req.vehicle_id)
    .bind(started_at)
    .fetch_one(&mut *conn)
    .await?;

    tracing::info!(
        order_id = %order.id,
        number = %order.number,
        vehicle_id = %order.vehicle_id,
        "Service order created"
    );

    Ok(order)
}

// -----------------------------------------------------------------------------
// ADD LINE ITEM
// -----------------------------------------------------------------------------

/// Add a part requirement to an order: insert the line item, consume the
/// quantity from stock, recompute the order's estimated cost synchronously.
/// Returns the new line item id and the recomputed total.
pub async fn add_line_item(
    conn: &mut PgConnection,
    order_id: Uuid,
    inventory_item_id: Uuid,
    required_quantity: Decimal,
) -> Result<(Uuid, Decimal), AppError> {
    let order_exists: Option<(Uuid,)> =
        sqlx::query_as("SELECT id FROM service_orders WHERE id = $1")
            .bind(order_id)
            .fetch_optional(&mut *conn)
            .await?;
    if order_exists.is_none() {
        return Err(AppError::not_found("service order", order_id));
    }

    let (line_item_id,): (Uuid,) = sqlx::query_as(
        r#"
        INSERT INTO service_order_items
            (service_order_id, inventory_item_id, required_quantity)
        VALUES ($1, $2, $3)
        RETURNING id
        "#,
    )
    .bind(order_id)
    .bind(inventory_item_id)
    .bind(required_quantity)
    .fetch_one(&mut *conn)
    .await?;

    // Consume before recomputing: the item must exist, and the gauge should
    // reflect the post-consumption level.
    let new_quantity = stock::consume(&mut *conn, inventory_item_id, required_quantity)
        .await?
        .ok_or_else(|| AppError::not_found("inventory item", inventory_item_id))?;
    metrics::set_stock_level(&inventory_item_id.to_string(), new_quantity);

    let estimated_cost = cost::recompute_estimated_cost(&mut *conn, order_id).await?;

    tracing::info!(
        order_id = %order_id,
        line_item_id = %line_item_id,
        inventory_item_id = %inventory_item_id,
        quantity = %required_quantity,
        stock_after = %new_quantity,
        estimated_cost = %estimated_cost,
        "Line item added"
    );

    Ok((line_item_id, estimated_cost))
}

// -----------------------------------------------------------------------------
// STATUS TRANSITIONS
// -----------------------------------------------------------------------------

/// Move a service order to a new status.
///
/// The transition table rejects anything not reachable from the current
/// status. Omitted validator/validation-date fields keep their stored
/// values. `ended_at` is set to now only on completion, cleared otherwise.
pub async fn set_status(
    conn: &mut PgConnection,
    order_id: Uuid,
    new_status: ServiceOrderStatus,
    validated_by: Option<&str>,
    validated_at: Option<DateTime<Utc>>,
) -> Result<ServiceOrder, AppError> {
    let current = sqlx::query_as::<_, ServiceOrder>(
        r#"
        SELECT id, number, status, order_type, description, estimated_cost,
               mileage, mechanic, vehicle_id, started_at, ended_at,
               validated_by, validated_at, created_at, updated_at
        FROM service_orders
        WHERE id = $1
        FOR UPDATE
        "#,
    )
    .bind(order_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::not_found("service order", order_id))?;

    if !current.status.can_transition_to(new_status) {
        return Err(AppError::InvalidTransition {
            entity: "service order",
            from: current.status.as_str(),
            to: new_status.as_str(),
        });
    }

    let now = Utc::now();
    let ended_at = if new_status == ServiceOrderStatus::Completed {
        Some(now)
    } else {
        None
    };

    let order = sqlx::query_as::<_, ServiceOrder>(
        r#"
        UPDATE service_orders
        SET status = $1,
            validated_by = COALESCE($2, validated_by),
            validated_at = COALESCE($3, validated_at),
            ended_at = $4,
            updated_at = NOW()
        WHERE id = $5
        RETURNING id, number, status, order_type, description, estimated_cost,
                  mileage, mechanic, vehicle_id, started_at, ended_at,
                  validated_by, validated_at, created_at, updated_at
        "#,
    )
    .bind(new_status.as_str())
    .bind(validated_by)
    .bind(validated_at)
    .bind(ended_at)
    .bind(order_id)
    .fetch_one(&mut *conn)
    .await?;

    metrics::record_status_transition(
        "service_order",
        current.status.as_str(),
        new_status.as_str(),
    );

    if new_status.is_terminal() {
        record_maintenance(&mut *conn, &order, new_status, validated_at, now).await?;
    }

    tracing::info!(
        order_id = %order.id,
        number = %order.number,
        from = current.status.as_str(),
        to = new_status.as_str(),
        "Service order status updated"
    );

    Ok(order)
}

// -----------------------------------------------------------------------------
// DERIVED MAINTENANCE RECORDS
// -----------------------------------------------------------------------------

/// What a terminal order contributes to the vehicle's maintenance history.
#[derive(Debug, Clone, PartialEq)]
pub struct MaintenanceCandidate {
    pub kind: MaintenanceKind,
    pub description: String,
    pub cost: Decimal,
    pub mileage: Option<Decimal>,
    pub mechanic: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

/// Derive the maintenance candidate for an order entering a terminal status.
/// End date is the validation date (falling back to now) for completed
/// orders, absent for cancelled ones.
pub fn derive_maintenance(
    order: &ServiceOrder,
    new_status: ServiceOrderStatus,
    validated_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> MaintenanceCandidate {
    MaintenanceCandidate {
        kind: MaintenanceKind::from(order.order_type),
        description: order.description.clone(),
        cost: order.estimated_cost,
        mileage: order.mileage,
        mechanic: order.mechanic.clone(),
        started_at: order.started_at,
        ended_at: if new_status == ServiceOrderStatus::Completed {
            Some(validated_at.unwrap_or(now))
        } else {
            None
        },
    }
}

/// True when the vehicle's history already holds a record with the same
/// description starting within the dedup window of the candidate.
pub fn is_duplicate(
    candidate_description: &str,
    candidate_started_at: DateTime<Utc>,
    existing: &[(String, DateTime<Utc>)],
) -> bool {
    existing.iter().any(|(description, started_at)| {
        description == candidate_description
            && (*started_at - candidate_started_at)
                .num_milliseconds()
                .abs()
                <= DEDUP_WINDOW_MS
    })
}

/// Insert the derived record unless the vehicle already has it.
async fn record_maintenance(
    conn: &mut PgConnection,
    order: &ServiceOrder,
    new_status: ServiceOrderStatus,
    validated_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Result<(), AppError> {
    let candidate = derive_maintenance(order, new_status, validated_at, now);

    let existing: Vec<(String, DateTime<Utc>)> = sqlx::query_as(
        r#"
        SELECT description, started_at
        FROM maintenance_records
        WHERE vehicle_id = $1
        "#,
    )
    .bind(order.vehicle_id)
    .fetch_all(&mut *conn)
    .await?;

    if is_duplicate(&candidate.description, candidate.started_at, &existing) {
        metrics::record_maintenance_record(false);
        tracing::debug!(
            order_id = %order.id,
            vehicle_id = %order.vehicle_id,
            "Maintenance record already present, skipping"
        );
        return Ok(());
    }

    sqlx::query(
        r#"
        INSERT INTO maintenance_records
            (vehicle_id, kind, description, cost, mileage, started_at,
             ended_at, mechanic)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(order.vehicle_id)
    .bind(candidate.kind.as_str())
    .bind(&candidate.description)
    .bind(candidate.cost)
    .bind(candidate.mileage)
    .bind(candidate.started_at)
    .bind(candidate.ended_at)
    .bind(&candidate.mechanic)
    .execute(&mut *conn)
    .await?;

    metrics::record_maintenance_record(true);
    tracing::info!(
        order_id = %order.id,
        vehicle_id = %order.vehicle_id,
        kind = candidate.kind.as_str(),
        "Maintenance record created"
    );

    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OrderType;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn order(order_type: OrderType, started_at: DateTime<Utc>) -> ServiceOrder {
        ServiceOrder {
            id: Uuid::new_v4(),
            number: "OS-001".to_string(),
            status: ServiceOrderStatus::InProgress,
            order_type,
            description: "Front brake pads".to_string(),
            estimated_cost: dec!(120.00),
            mileage: Some(dec!(84500)),
            mechanic: Some("J. Mwangi".to_string()),
            vehicle_id: Uuid::new_v4(),
            started_at,
            ended_at: None,
            validated_by: None,
            validated_at: None,
            created_at: started_at,
            updated_at: started_at,
        }
    }

    #[test]
    fn completed_order_closes_the_record() {
        let started = Utc::now();
        let validated = started + Duration::hours(4);
        let candidate = derive_maintenance(
            &order(OrderType::Corrective, started),
            ServiceOrderStatus::Completed,
            Some(validated),
            Utc::now(),
        );

        assert_eq!(candidate.kind, MaintenanceKind::Corrective);
        assert_eq!(candidate.cost, dec!(120.00));
        assert_eq!(candidate.started_at, started);
        assert_eq!(candidate.ended_at, Some(validated));
    }

    #[test]
    fn completion_without_validation_date_falls_back_to_now() {
        let started = Utc::now();
        let now = started + Duration::hours(1);
        let candidate = derive_maintenance(
            &order(OrderType::Preventive, started),
            ServiceOrderStatus::Completed,
            None,
            now,
        );
        assert_eq!(candidate.ended_at, Some(now));
        assert_eq!(candidate.kind, MaintenanceKind::Preventive);
    }

    #[test]
    fn cancelled_order_has_no_end_date() {
        let started = Utc::now();
        let candidate = derive_maintenance(
            &order(OrderType::Predictive, started),
            ServiceOrderStatus::Cancelled,
            Some(started),
            Utc::now(),
        );
        assert_eq!(candidate.ended_at, None);
        // predictive files under preventive
        assert_eq!(candidate.kind, MaintenanceKind::Preventive);
    }

    #[test]
    fn duplicate_within_one_second_is_suppressed() {
        let start = Utc::now();
        let existing = vec![("Front brake pads".to_string(), start)];

        assert!(is_duplicate("Front brake pads", start, &existing));
        assert!(is_duplicate(
            "Front brake pads",
            start + Duration::milliseconds(999),
            &existing
        ));
        assert!(is_duplicate(
            "Front brake pads",
            start - Duration::milliseconds(1000),
            &existing
        ));
    }

    #[test]
    fn different_description_or_distant_start_is_not_a_duplicate() {
        let start = Utc::now();
        let existing = vec![("Front brake pads".to_string(), start)];

        assert!(!is_duplicate("Oil change", start, &existing));
        assert!(!is_duplicate(
            "Front brake pads",
            start + Duration::milliseconds(1001),
            &existing
        ));
        assert!(!is_duplicate("Front brake pads", start, &[]));
    }
}
