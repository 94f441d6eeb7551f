// =============================================================================
// RECONCILIATION ENGINE
// =============================================================================
// The logic that keeps stock quantities, service-order estimated costs and
// purchase-request linkage consistent across write paths:
//
// - cost:          recomputes an order's estimated cost from its line items
// - stock:         floor-at-zero consume / netting replenish of on-hand stock
// - purchase:      purchase request lifecycle + receipt side effects
// - service_order: order lifecycle + line items + derived maintenance records
// - sequence:      race-free "OS-NNN" / "PR-NNN" business numbers
//
// Every multi-step operation takes a `&mut PgConnection` that belongs to a
// single transaction begun by the caller (see handlers.rs), so the read-
// modify-write sequences here commit or roll back as one unit.
// =============================================================================

pub mod cost;
pub mod purchase;
pub mod sequence;
pub mod service_order;
pub mod stock;
