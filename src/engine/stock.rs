// =============================================================================
// STOCK LEDGER
// =============================================================================
// Adjusts an inventory item's on-hand quantity for consumption (a line item
// is added to an order) and replenishment (a purchase is received).
//
// Two rules with no exceptions:
// - a persisted quantity is never negative; every write floors at zero
// - a zero-stock item is not decremented at all ("no stock to consume" is
//   not an error)
//
// The ledger itself does not deduplicate mutations; callers invoke it once
// per logical event and idempotency is enforced above it by the purchase
// controller's status gate.
// =============================================================================

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgConnection;
use uuid::Uuid;

// -----------------------------------------------------------------------------
// PURE DECISION FUNCTIONS
// -----------------------------------------------------------------------------

/// Quantity after consuming `requested` from `current`.
///
/// An item already at (or somehow below) zero is left unchanged; otherwise
/// the result is floored at zero rather than overshooting negative.
pub fn after_consume(current: Decimal, requested: Decimal) -> Decimal {
    if current <= Decimal::ZERO {
        return current;
    }
    (current - requested).max(Decimal::ZERO)
}

/// Quantity after receiving `purchased` into `current`.
///
/// When the purchase was sourcing a specific order's need, the outstanding
/// requirement is netted out directly instead of being added and then
/// separately consumed: `max(0, current + purchased - required)`. With no
/// linked requirement the received stock is added unconditionally.
pub fn after_replenish(
    current: Decimal,
    purchased: Decimal,
    linked_required: Option<Decimal>,
) -> Decimal {
    match linked_required {
        Some(required) => (current + purchased - required).max(Decimal::ZERO),
        None => current + purchased,
    }
}

// -----------------------------------------------------------------------------
// LEDGER OPERATIONS
// -----------------------------------------------------------------------------

/// Consume `requested` units of an item. Returns the new quantity, or None
/// when the item row does not exist (the caller decides whether that is an
/// error).
pub async fn consume(
    conn: &mut PgConnection,
    item_id: Uuid,
    requested: Decimal,
) -> Result<Option<Decimal>, sqlx::Error> {
    let row: Option<(Decimal,)> =
        sqlx::query_as("SELECT quantity FROM inventory_items WHERE id = $1 FOR UPDATE")
            .bind(item_id)
            .fetch_optional(&mut *conn)
            .await?;

    let Some((current,)) = row else {
        return Ok(None);
    };

    let new_quantity = after_consume(current, requested);

    sqlx::query(
        r#"
        UPDATE inventory_items
        SET quantity = $1, updated_at = NOW()
        WHERE id = $2
        "#,
    )
    .bind(new_quantity)
    .bind(item_id)
    .execute(&mut *conn)
    .await?;

    Ok(Some(new_quantity))
}

/// Receive `purchased` units of an item, netting a linked requirement when
/// the purchase was sourcing one. Stamps the item's last-purchase date.
/// Returns the new quantity, or None when the item row does not exist —
/// the purchase controller treats that as "skip stock effects".
pub async fn replenish(
    conn: &mut PgConnection,
    item_id: Uuid,
    purchased: Decimal,
    linked_required: Option<Decimal>,
    received_at: DateTime<Utc>,
) -> Result<Option<Decimal>, sqlx::Error> {
    let row: Option<(Decimal,)> =
        sqlx::query_as("SELECT quantity FROM inventory_items WHERE id = $1 FOR UPDATE")
            .bind(item_id)
            .fetch_optional(&mut *conn)
            .await?;

    let Some((current,)) = row else {
        return Ok(None);
    };

    let new_quantity = after_replenish(current, purchased, linked_required);

    sqlx::query(
        r#"
        UPDATE inventory_items
        SET quantity = $1, last_purchase_at = $2, updated_at = NOW()
        WHERE id = $3
        "#,
    )
    .bind(new_quantity)
    .bind(received_at)
    .bind(item_id)
    .execute(&mut *conn)
    .await?;

    Ok(Some(new_quantity))
}

// =============================================================================
// TESTS
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn consume_floors_at_zero() {
        assert_eq!(after_consume(dec!(10), dec!(3)), dec!(7));
        assert_eq!(after_consume(dec!(2), dec!(5)), dec!(0));
        assert_eq!(after_consume(dec!(5), dec!(5)), dec!(0));
    }

    #[test]
    fn consume_from_empty_item_is_a_no_op() {
        assert_eq!(after_consume(dec!(0), dec!(4)), dec!(0));
    }

    #[test]
    fn replenish_without_link_adds_unconditionally() {
        assert_eq!(after_replenish(dec!(2), dec!(5), None), dec!(7));
        assert_eq!(after_replenish(dec!(0), dec!(20), None), dec!(20));
    }

    #[test]
    fn replenish_nets_the_linked_requirement() {
        // received stock minus what the order already claimed
        assert_eq!(after_replenish(dec!(7), dec!(20), Some(dec!(3))), dec!(24));
        // a deficit floors at zero instead of going negative
        assert_eq!(after_replenish(dec!(0), dec!(2), Some(dec!(5))), dec!(0));
        assert_eq!(after_replenish(dec!(1), dec!(4), Some(dec!(5))), dec!(0));
    }

    #[test]
    fn fractional_quantities_stay_exact() {
        assert_eq!(after_consume(dec!(1.5), dec!(0.25)), dec!(1.25));
        assert_eq!(
            after_replenish(dec!(0.5), dec!(2.25), Some(dec!(0.75))),
            dec!(2)
        );
    }

    // End-to-end arithmetic: add a line item requiring 3 from a stock of 10,
    // then receive a linked purchase of 20.
    #[test]
    fn consume_then_netted_receipt_scenario() {
        let after_line_item = after_consume(dec!(10), dec!(3));
        assert_eq!(after_line_item, dec!(7));

        let after_receipt = after_replenish(after_line_item, dec!(20), Some(dec!(3)));
        assert_eq!(after_receipt, dec!(24));
    }
}
