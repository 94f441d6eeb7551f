// =============================================================================
// PURCHASE LIFECYCLE CONTROLLER
// =============================================================================
// Owns the purchase request state machine and the side effects of receiving
// a purchase: stock replenishment (with netting against the sourced
// requirement) and clearing the line item's purchase link.
//
// The receipt side effects are gated on the *pre-transition* status not
// already being `received`, so they run at most once per purchase request no
// matter how many times the status is set.
// =============================================================================

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgConnection;
use uuid::Uuid;

use crate::engine::{cost, sequence, stock};
use crate::error::AppError;
use crate::metrics;
use crate::models::{CreatePurchaseRequestBody, PurchaseRequest, PurchaseStatus};

// -----------------------------------------------------------------------------
// PURE DECISION FUNCTIONS
// -----------------------------------------------------------------------------

/// Total amount snapshotted at creation/update time: the item's current
/// unit cost times the requested quantity, with an unknown cost counting
/// as zero. Deliberately not re-derived later.
pub fn snapshot_total(unit_cost: Option<Decimal>, quantity: Decimal) -> Decimal {
    unit_cost.unwrap_or(Decimal::ZERO) * quantity
}

// -----------------------------------------------------------------------------
// CREATE PURCHASE REQUEST
// -----------------------------------------------------------------------------

/// Create a purchase request in `pending` status with a fresh "PR-NNN"
/// number and a cost snapshot from the referenced inventory item.
///
/// When a service order is referenced, the purchase sources that order's
/// need: the order's existing un-sourced line item for the same inventory
/// item gets linked to the purchase, or a new line item (required = the
/// requested quantity) is created carrying the link. Either way the order's
/// estimated cost is recomputed before returning. No stock moves here —
/// parts are purchased precisely because they are not on the shelf.
pub async fn create_purchase_request(
    conn: &mut PgConnection,
    body: &CreatePurchaseRequestBody,
) -> Result<PurchaseRequest, AppError> {
    let item: Option<(Option<Decimal>,)> =
        sqlx::query_as("SELECT unit_cost FROM inventory_items WHERE id = $1")
            .bind(body.inventory_item_id)
            .fetch_optional(&mut *conn)
            .await?;
    let Some((unit_cost,)) = item else {
        return Err(AppError::not_found("inventory item", body.inventory_item_id));
    };

    if let Some(order_id) = body.service_order_id {
        let order_exists: Option<(Uuid,)> =
            sqlx::query_as("SELECT id FROM service_orders WHERE id = $1")
                .bind(order_id)
                .fetch_optional(&mut *conn)
                .await?;
        if order_exists.is_none() {
            return Err(AppError::not_found("service order", order_id));
        }
    }

    let number = sequence::next_number(&mut *conn, "PR").await?;
    let total_amount = snapshot_total(unit_cost, body.quantity);

    let purchase = sqlx::query_as::<_, PurchaseRequest>(
        r#"
        INSERT INTO purchase_requests
            (number, status, inventory_item_id, requested_quantity, unit_cost,
             total_amount, urgency, service_order_id, supplier_id, notes)
        VALUES ($1, 'pending', $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING id, number, status, inventory_item_id, requested_quantity,
                  unit_cost, total_amount, urgency, service_order_id,
                  supplier_id, notes, approved_by, approved_at,
                  created_at, updated_at
        "#,
    )
    .bind(&number)
    .bind(body.inventory_item_id)
    .bind(body.quantity)
    .bind(unit_cost)
    .bind(total_amount)
    .bind(body.urgency.as_str())
    .bind(body.service_order_id)
    .bind(body.supplier_id)
    .bind(&body.notes)
    .fetch_one(&mut *conn)
    .await?;

    if let Some(order_id) = body.service_order_id {
        link_order_need(&mut *conn, &purchase, order_id).await?;
        cost::recompute_estimated_cost(&mut *conn, order_id).await?;
    }

    tracing::info!(
        purchase_id = %purchase.id,
        number = %purchase.number,
        inventory_item_id = %body.inventory_item_id,
        quantity = %body.quantity,
        total_amount = %total_amount,
        sourcing_order = ?body.service_order_id,
        "Purchase request created"
    );

    Ok(purchase)
}

/// Attach the purchase to the order's need for this inventory item: reuse
/// the order's oldest line item for the item that is not already being
/// sourced, otherwise create one.
async fn link_order_need(
    conn: &mut PgConnection,
    purchase: &PurchaseRequest,
    order_id: Uuid,
) -> Result<(), AppError> {
    let existing: Option<(Uuid,)> = sqlx::query_as(
        r#"
        SELECT id
        FROM service_order_items
        WHERE service_order_id = $1
          AND inventory_item_id = $2
          AND purchase_request_id IS NULL
        ORDER BY created_at ASC
        LIMIT 1
        FOR UPDATE
        "#,
    )
    .bind(order_id)
    .bind(purchase.inventory_item_id)
    .fetch_optional(&mut *conn)
    .await?;

    match existing {
        Some((line_item_id,)) => {
            sqlx::query(
                r#"
                UPDATE service_order_items
                SET purchase_request_id = $1, updated_at = NOW()
                WHERE id = $2
                "#,
            )
            .bind(purchase.id)
            .bind(line_item_id)
            .execute(&mut *conn)
            .await?;
        }
        None => {
            sqlx::query(
                r#"
                INSERT INTO service_order_items
                    (service_order_id, inventory_item_id, required_quantity,
                     purchase_request_id)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(order_id)
            .bind(purchase.inventory_item_id)
            .bind(purchase.requested_quantity)
            .bind(purchase.id)
            .execute(&mut *conn)
            .await?;
        }
    }

    Ok(())
}

// -----------------------------------------------------------------------------
// STATUS TRANSITIONS
// -----------------------------------------------------------------------------

/// Move a purchase request to a new status.
///
/// On the first transition into `received` for a purchase that references
/// an inventory item: replenish stock from the requested quantity, netting
/// the linked line item's requirement when one exists, and clear that line
/// item's purchase link — the need is now sourced. A missing inventory row
/// skips the stock/linkage effects entirely; the status still updates.
/// Omitted approver/approval-date fields keep their stored values.
pub async fn set_status(
    conn: &mut PgConnection,
    purchase_id: Uuid,
    new_status: PurchaseStatus,
    approved_by: Option<&str>,
    approved_at: Option<DateTime<Utc>>,
) -> Result<PurchaseRequest, AppError> {
    let current = sqlx::query_as::<_, PurchaseRequest>(
        r#"
        SELECT id, number, status, inventory_item_id, requested_quantity,
               unit_cost, total_amount, urgency, service_order_id,
               supplier_id, notes, approved_by, approved_at,
               created_at, updated_at
        FROM purchase_requests
        WHERE id = $1
        FOR UPDATE
        "#,
    )
    .bind(purchase_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::not_found("purchase request", purchase_id))?;

    if !current.status.can_transition_to(new_status) {
        return Err(AppError::InvalidTransition {
            entity: "purchase request",
            from: current.status.as_str(),
            to: new_status.as_str(),
        });
    }

    // Receipt side effects, at most once: gated on the pre-transition status.
    if new_status == PurchaseStatus::Received && current.status != PurchaseStatus::Received {
        if let Some(item_id) = current.inventory_item_id {
            apply_receipt(&mut *conn, &current, item_id).await?;
        }
    }

    let purchase = sqlx::query_as::<_, PurchaseRequest>(
        r#"
        UPDATE purchase_requests
        SET status = $1,
            approved_by = COALESCE($2, approved_by),
            approved_at = COALESCE($3, approved_at),
            updated_at = NOW()
        WHERE id = $4
        RETURNING id, number, status, inventory_item_id, requested_quantity,
                  unit_cost, total_amount, urgency, service_order_id,
                  supplier_id, notes, approved_by, approved_at,
                  created_at, updated_at
        "#,
    )
    .bind(new_status.as_str())
    .bind(approved_by)
    .bind(approved_at)
    .bind(purchase_id)
    .fetch_one(&mut *conn)
    .await?;

    metrics::record_status_transition(
        "purchase_request",
        current.status.as_str(),
        new_status.as_str(),
    );

    tracing::info!(
        purchase_id = %purchase.id,
        number = %purchase.number,
        from = current.status.as_str(),
        to = new_status.as_str(),
        "Purchase request status updated"
    );

    Ok(purchase)
}

/// Stock and linkage effects of receiving a purchase.
async fn apply_receipt(
    conn: &mut PgConnection,
    purchase: &PurchaseRequest,
    item_id: Uuid,
) -> Result<(), AppError> {
    // The line item (if any) carrying this purchase's link: its required
    // quantity is the netting amount.
    let linked_line: Option<(Uuid, Decimal)> = sqlx::query_as(
        r#"
        SELECT id, required_quantity
        FROM service_order_items
        WHERE purchase_request_id = $1
        LIMIT 1
        FOR UPDATE
        "#,
    )
    .bind(purchase.id)
    .fetch_optional(&mut *conn)
    .await?;

    let netting = linked_line.as_ref().map(|(_, required)| *required);

    let Some(new_quantity) = stock::replenish(
        &mut *conn,
        item_id,
        purchase.requested_quantity,
        netting,
        Utc::now(),
    )
    .await?
    else {
        // Inventory row vanished since the purchase was created: skip the
        // stock and linkage effects, the status update still goes through.
        tracing::warn!(
            purchase_id = %purchase.id,
            inventory_item_id = %item_id,
            "Inventory item missing on receipt, skipping stock effects"
        );
        return Ok(());
    };

    metrics::set_stock_level(&item_id.to_string(), new_quantity);
    metrics::record_purchase_receipt(netting.is_some());

    if let Some((line_item_id, _)) = linked_line {
        // The need is now sourced; the weak back-reference goes away.
        sqlx::query(
            r#"
            UPDATE service_order_items
            SET purchase_request_id = NULL, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(line_item_id)
        .execute(&mut *conn)
        .await?;
    }

    tracing::info!(
        purchase_id = %purchase.id,
        inventory_item_id = %item_id,
        received = %purchase.requested_quantity,
        netted = netting.is_some(),
        stock_after = %new_quantity,
        "Purchase received into stock"
    );

    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn snapshot_is_unit_cost_times_quantity() {
        assert_eq!(snapshot_total(Some(dec!(5.00)), dec!(20)), dec!(100.00));
        assert_eq!(snapshot_total(Some(dec!(12.50)), dec!(2)), dec!(25.00));
    }

    #[test]
    fn unknown_unit_cost_snapshots_to_zero() {
        assert_eq!(snapshot_total(None, dec!(20)), dec!(0));
    }
}
