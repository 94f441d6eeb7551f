// =============================================================================
// METRICS MODULE
// =============================================================================
// Prometheus metrics for the service.
//
// Beyond the usual HTTP counters/histograms, the engine exposes its own
// signals: stock levels per item, lifecycle transitions per entity, and how
// often the maintenance-record dedup fires. Those make double-counted stock
// or duplicate derived records visible on a dashboard long before anyone
// reads a ledger.
// =============================================================================

use anyhow::Result;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

// =============================================================================
// METRIC NAMES (Constants)
// =============================================================================

/// HTTP request counter
/// Labels: method (GET/POST), endpoint, status (200/404/...)
pub const HTTP_REQUESTS_TOTAL: &str = "http_requests_total";

/// HTTP request duration histogram
/// Labels: method, endpoint
pub const HTTP_REQUEST_DURATION_SECONDS: &str = "http_request_duration_seconds";

/// On-hand stock level gauge
/// Labels: item (inventory item id)
pub const STOCK_LEVEL: &str = "stock_level";

/// Lifecycle transition counter
/// Labels: entity (service_order/purchase_request), from, to
pub const STATUS_TRANSITIONS_TOTAL: &str = "status_transitions_total";

/// Purchase receipts applied to stock
/// Labels: netted (true when a linked requirement was netted out)
pub const PURCHASE_RECEIPTS_TOTAL: &str = "purchase_receipts_total";

/// Maintenance records derived from terminal orders
/// Labels: outcome (created/duplicate)
pub const MAINTENANCE_RECORDS_TOTAL: &str = "maintenance_records_total";

/// Database query duration histogram
/// Labels: operation (select/insert/update)
pub const DB_QUERY_DURATION_SECONDS: &str = "db_query_duration_seconds";

// =============================================================================
// SETUP FUNCTION
// =============================================================================
/// Initialize the Prometheus metrics recorder and return the render handle.
pub fn setup_metrics() -> Result<PrometheusHandle> {
    // Latency buckets from 1ms up to 10s; anything slower is a timeout story.
    let latency_buckets = &[
        0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
    ];

    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full(HTTP_REQUEST_DURATION_SECONDS.to_string()),
            latency_buckets,
        )?
        .set_buckets_for_metric(
            Matcher::Full(DB_QUERY_DURATION_SECONDS.to_string()),
            latency_buckets,
        )?
        .install_recorder()?;

    describe_counter!(HTTP_REQUESTS_TOTAL, "Total number of HTTP requests received");
    describe_histogram!(
        HTTP_REQUEST_DURATION_SECONDS,
        "HTTP request latency in seconds"
    );
    describe_gauge!(STOCK_LEVEL, "Current on-hand quantity per inventory item");
    describe_counter!(
        STATUS_TRANSITIONS_TOTAL,
        "Lifecycle status transitions applied, by entity and edge"
    );
    describe_counter!(
        PURCHASE_RECEIPTS_TOTAL,
        "Purchase receipts applied to the stock ledger"
    );
    describe_counter!(
        MAINTENANCE_RECORDS_TOTAL,
        "Maintenance record candidates, created or suppressed as duplicates"
    );
    describe_histogram!(
        DB_QUERY_DURATION_SECONDS,
        "Database query latency in seconds"
    );

    Ok(handle)
}

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

/// Record an HTTP request
pub fn record_http_request(method: &str, endpoint: &str, status: u16, duration_secs: f64) {
    counter!(
        HTTP_REQUESTS_TOTAL,
        "method" => method.to_string(),
        "endpoint" => endpoint.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    histogram!(
        HTTP_REQUEST_DURATION_SECONDS,
        "method" => method.to_string(),
        "endpoint" => endpoint.to_string()
    )
    .record(duration_secs);
}

/// Update the on-hand stock gauge for an item
pub fn set_stock_level(item_id: &str, quantity: Decimal) {
    gauge!(
        STOCK_LEVEL,
        "item" => item_id.to_string()
    )
    .set(quantity.to_f64().unwrap_or(0.0));
}

/// Record an applied lifecycle transition
pub fn record_status_transition(entity: &'static str, from: &'static str, to: &'static str) {
    counter!(
        STATUS_TRANSITIONS_TOTAL,
        "entity" => entity,
        "from" => from,
        "to" => to
    )
    .increment(1);
}

/// Record a purchase receipt applied to stock
pub fn record_purchase_receipt(netted: bool) {
    counter!(
        PURCHASE_RECEIPTS_TOTAL,
        "netted" => if netted { "true" } else { "false" }
    )
    .increment(1);
}

/// Record a maintenance record candidate outcome
pub fn record_maintenance_record(created: bool) {
    counter!(
        MAINTENANCE_RECORDS_TOTAL,
        "outcome" => if created { "created" } else { "duplicate" }
    )
    .increment(1);
}

/// Record database query duration
pub fn record_db_query(operation: &str, duration_secs: f64) {
    histogram!(
        DB_QUERY_DURATION_SECONDS,
        "operation" => operation.to_string()
    )
    .record(duration_secs);
}
