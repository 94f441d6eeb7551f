// =============================================================================
// COST AGGREGATOR
// =============================================================================
// Recomputes a service order's estimated cost from its line items and the
// inventory items' *current* unit costs.
//
// The stored estimated cost is a read-after-write contract: every write path
// that inserts, updates or removes a line item calls recompute before it
// returns, so the order's total is always consistent with its line items at
// the end of the operation. Missing unit costs contribute zero (fail-soft
// policy); a partially priced order still has a defined total.
// =============================================================================

use rust_decimal::Decimal;
use sqlx::PgConnection;
use uuid::Uuid;

/// One line item's contribution inputs: its required quantity and the
/// current unit cost of the inventory item it references (None = unknown).
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct LineCost {
    pub required_quantity: Decimal,
    pub unit_cost: Option<Decimal>,
}

/// Sum of `required_quantity × unit_cost` over the lines, counting a
/// missing unit cost as zero. Never fails, never aborts the whole sum.
pub fn estimated_total(lines: &[LineCost]) -> Decimal {
    lines
        .iter()
        .map(|line| line.required_quantity * line.unit_cost.unwrap_or(Decimal::ZERO))
        .sum()
}

/// Recompute and persist an order's estimated cost. Returns the new total.
///
/// Single aggregate write to the service order row (plus its update
/// timestamp); no other entity is touched.
pub async fn recompute_estimated_cost(
    conn: &mut PgConnection,
    order_id: Uuid,
) -> Result<Decimal, sqlx::Error> {
    let lines: Vec<LineCost> = sqlx::query_as(
        r#"
        SELECT li.required_quantity, inv.unit_cost
        FROM service_order_items li
        LEFT JOIN inventory_items inv ON inv.id = li.inventory_item_id
        WHERE li.service_order_id = $1
        "#,
    )
    .bind(order_id)
    .fetch_all(&mut *conn)
    .await?;

    let total = estimated_total(&lines);

    sqlx::query(
        r#"
        UPDATE service_orders
        SET estimated_cost = $1, updated_at = NOW()
        WHERE id = $2
        "#,
    )
    .bind(total)
    .bind(order_id)
    .execute(&mut *conn)
    .await?;

    Ok(total)
}

// =============================================================================
// TESTS
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn line(quantity: Decimal, unit_cost: Option<Decimal>) -> LineCost {
        LineCost {
            required_quantity: quantity,
            unit_cost,
        }
    }

    #[test]
    fn empty_order_costs_zero() {
        assert_eq!(estimated_total(&[]), Decimal::ZERO);
    }

    #[test]
    fn sums_quantity_times_unit_cost() {
        let lines = [
            line(dec!(3), Some(dec!(5.00))),
            line(dec!(2), Some(dec!(12.50))),
        ];
        assert_eq!(estimated_total(&lines), dec!(40.00));
    }

    #[test]
    fn missing_unit_cost_contributes_zero() {
        // fail-soft: an unpriced part doesn't abort the sum
        let lines = [
            line(dec!(3), Some(dec!(5.00))),
            line(dec!(100), None),
        ];
        assert_eq!(estimated_total(&lines), dec!(15.00));
    }

    #[test]
    fn fractional_quantities_multiply_exactly() {
        let lines = [line(dec!(2.5), Some(dec!(4.40)))];
        assert_eq!(estimated_total(&lines), dec!(11.000));
    }
}
