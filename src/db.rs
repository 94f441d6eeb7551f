// =============================================================================
// DATABASE MODULE
// =============================================================================
// PostgreSQL pool, schema migrations and the plain read queries used by the
// lookup endpoints.
//
// The engine's own reads and writes live in src/engine/*: every controller
// operation there runs inside one transaction obtained from
// `Database::begin()`, so a failure partway through a multi-step operation
// never leaves stock, costs and statuses disagreeing.
// =============================================================================

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::engine::sequence;
use crate::models::{
    InventoryItem, MaintenanceRecord, PurchaseRequest, ServiceOrder, ServiceOrderItem,
};

// -----------------------------------------------------------------------------
// DATABASE WRAPPER
// -----------------------------------------------------------------------------
// Wraps the SQLx pool and hides connection details from the rest of the app.
#[derive(Clone)]
pub struct Database {
    /// SQLx PostgreSQL connection pool
    pool: PgPool,
}

impl Database {
    // -------------------------------------------------------------------------
    // CONNECTION
    // -------------------------------------------------------------------------
    /// Create a new database connection pool
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .min_connections(2)
            .acquire_timeout(std::time::Duration::from_secs(5))
            .idle_timeout(std::time::Duration::from_secs(300))
            .connect(database_url)
            .await
            .context("Failed to connect to PostgreSQL")?;

        Ok(Self { pool })
    }

    /// Begin a transaction for a multi-step engine operation.
    pub async fn begin(&self) -> Result<Transaction<'static, Postgres>, sqlx::Error> {
        self.pool.begin().await
    }

    // -------------------------------------------------------------------------
    // MIGRATIONS
    // -------------------------------------------------------------------------
    /// Create/update the schema. IF NOT EXISTS keeps this idempotent.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS inventory_items (
                id UUID PRIMARY KEY DEFAULT gen_random_uuid(),

                name VARCHAR(255) NOT NULL,

                -- NULL means "unknown or free"; aggregation counts it as zero
                unit_cost NUMERIC(12, 2),

                -- On-hand quantity. Every write floors at zero; the CHECK is
                -- a backstop against direct edits.
                quantity NUMERIC(12, 3) NOT NULL DEFAULT 0,

                -- Preferred supplier (external collaborator, no FK here)
                supplier_id UUID,

                last_purchase_at TIMESTAMPTZ,

                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),

                CONSTRAINT non_negative_quantity CHECK (quantity >= 0)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create inventory_items table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS service_orders (
                id UUID PRIMARY KEY DEFAULT gen_random_uuid(),

                -- Business number "OS-NNN", allocated from business_sequences
                number VARCHAR(20) UNIQUE NOT NULL,

                status TEXT NOT NULL DEFAULT 'open',
                order_type TEXT NOT NULL,
                description TEXT NOT NULL,

                -- Derived: always the Cost Aggregator's sum over line items
                estimated_cost NUMERIC(12, 2) NOT NULL DEFAULT 0,

                mileage NUMERIC(12, 1),
                mechanic VARCHAR(255),
                vehicle_id UUID NOT NULL,

                started_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                ended_at TIMESTAMPTZ,

                validated_by VARCHAR(255),
                validated_at TIMESTAMPTZ,

                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create service_orders table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS service_order_items (
                id UUID PRIMARY KEY DEFAULT gen_random_uuid(),

                service_order_id UUID NOT NULL
                    REFERENCES service_orders(id) ON DELETE CASCADE,

                inventory_item_id UUID NOT NULL,

                required_quantity NUMERIC(12, 3) NOT NULL,

                -- Present exactly while the need is sourced through an open
                -- purchase request; cleared on receipt.
                purchase_request_id UUID,

                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),

                CONSTRAINT positive_required_quantity CHECK (required_quantity > 0)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create service_order_items table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS purchase_requests (
                id UUID PRIMARY KEY DEFAULT gen_random_uuid(),

                -- Business number "PR-NNN", independent sequence
                number VARCHAR(20) UNIQUE NOT NULL,

                status TEXT NOT NULL DEFAULT 'pending',

                inventory_item_id UUID,

                requested_quantity NUMERIC(12, 3) NOT NULL,

                -- Point-in-time snapshot of the item's unit cost at creation
                unit_cost NUMERIC(12, 2),
                total_amount NUMERIC(12, 2) NOT NULL DEFAULT 0,

                urgency TEXT NOT NULL DEFAULT 'medium',

                service_order_id UUID,
                supplier_id UUID,
                notes TEXT,

                approved_by VARCHAR(255),
                approved_at TIMESTAMPTZ,

                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),

                CONSTRAINT positive_requested_quantity CHECK (requested_quantity > 0)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create purchase_requests table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS maintenance_records (
                id UUID PRIMARY KEY DEFAULT gen_random_uuid(),

                vehicle_id UUID NOT NULL,
                kind TEXT NOT NULL,
                description TEXT NOT NULL,
                cost NUMERIC(12, 2) NOT NULL DEFAULT 0,
                mileage NUMERIC(12, 1),
                started_at TIMESTAMPTZ NOT NULL,
                ended_at TIMESTAMPTZ,
                mechanic VARCHAR(255),

                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create maintenance_records table")?;

        // Per-prefix atomic counters for business numbers. A single upserted
        // row per prefix makes allocation race-free: two concurrent creations
        // serialize on the row and can never read the same "last" value.
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS business_sequences (
                prefix TEXT PRIMARY KEY,
                value BIGINT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create business_sequences table")?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_order_items_order
                ON service_order_items(service_order_id)
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create order items index")?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_order_items_purchase
                ON service_order_items(purchase_request_id)
                WHERE purchase_request_id IS NOT NULL
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create purchase link index")?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_maintenance_vehicle
                ON maintenance_records(vehicle_id)
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create maintenance vehicle index")?;

        self.sync_sequences().await?;

        Ok(())
    }

    /// Seed the per-prefix counters from whatever business numbers already
    /// exist, so deploying onto a populated database continues the series
    /// instead of restarting at 001.
    async fn sync_sequences(&self) -> Result<()> {
        for (prefix, table) in [("OS", "service_orders"), ("PR", "purchase_requests")] {
            let sql = format!("SELECT number FROM {} ORDER BY created_at DESC LIMIT 1", table);
            let latest: Option<(String,)> = sqlx::query_as(&sql)
                .fetch_optional(&self.pool)
                .await
                .context("Failed to read latest business number")?;

            let current = latest
                .and_then(|(number,)| sequence::parse_number(prefix, &number))
                .unwrap_or(0);

            sqlx::query(
                r#"
                INSERT INTO business_sequences (prefix, value)
                VALUES ($1, $2)
                ON CONFLICT (prefix)
                DO UPDATE SET value = GREATEST(business_sequences.value, EXCLUDED.value)
                "#,
            )
            .bind(prefix)
            .bind(current)
            .execute(&self.pool)
            .await
            .context("Failed to seed business sequence")?;
        }

        Ok(())
    }

    // -------------------------------------------------------------------------
    // READ OPERATIONS (lookup endpoints)
    // -------------------------------------------------------------------------

    /// Get a single inventory item by id
    pub async fn get_inventory_item(&self, id: Uuid) -> Result<Option<InventoryItem>, sqlx::Error> {
        sqlx::query_as::<_, InventoryItem>(
            r#"
            SELECT id, name, unit_cost, quantity, supplier_id, last_purchase_at,
                   created_at, updated_at
            FROM inventory_items
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }

    /// Get a single service order by id
    pub async fn get_service_order(&self, id: Uuid) -> Result<Option<ServiceOrder>, sqlx::Error> {
        sqlx::query_as::<_, ServiceOrder>(
            r#"
            SELECT id, number, status, order_type, description, estimated_cost,
                   mileage, mechanic, vehicle_id, started_at, ended_at,
                   validated_by, validated_at, created_at, updated_at
            FROM service_orders
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }

    /// Get a service order's line items, oldest first
    pub async fn list_order_items(
        &self,
        order_id: Uuid,
    ) -> Result<Vec<ServiceOrderItem>, sqlx::Error> {
        sqlx::query_as::<_, ServiceOrderItem>(
            r#"
            SELECT id, service_order_id, inventory_item_id, required_quantity,
                   purchase_request_id, created_at, updated_at
            FROM service_order_items
            WHERE service_order_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await
    }

    /// Get a single purchase request by id
    pub async fn get_purchase_request(
        &self,
        id: Uuid,
    ) -> Result<Option<PurchaseRequest>, sqlx::Error> {
        sqlx::query_as::<_, PurchaseRequest>(
            r#"
            SELECT id, number, status, inventory_item_id, requested_quantity,
                   unit_cost, total_amount, urgency, service_order_id,
                   supplier_id, notes, approved_by, approved_at,
                   created_at, updated_at
            FROM purchase_requests
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }

    /// Get a vehicle's maintenance history, newest first
    pub async fn list_maintenance_records(
        &self,
        vehicle_id: Uuid,
    ) -> Result<Vec<MaintenanceRecord>, sqlx::Error> {
        sqlx::query_as::<_, MaintenanceRecord>(
            r#"
            SELECT id, vehicle_id, kind, description, cost, mileage,
                   started_at, ended_at, mechanic, created_at
            FROM maintenance_records
            WHERE vehicle_id = $1
            ORDER BY started_at DESC
            "#,
        )
        .bind(vehicle_id)
        .fetch_all(&self.pool)
        .await
    }

    // -------------------------------------------------------------------------
    // WRITE OPERATIONS (entity creation outside the engine)
    // -------------------------------------------------------------------------

    /// Create an inventory item
    pub async fn create_inventory_item(
        &self,
        name: &str,
        unit_cost: Option<rust_decimal::Decimal>,
        quantity: rust_decimal::Decimal,
        supplier_id: Option<Uuid>,
    ) -> Result<InventoryItem, sqlx::Error> {
        sqlx::query_as::<_, InventoryItem>(
            r#"
            INSERT INTO inventory_items (name, unit_cost, quantity, supplier_id)
            VALUES ($1, $2, $3, $4)
            RETURNING id, name, unit_cost, quantity, supplier_id,
                      last_purchase_at, created_at, updated_at
            "#,
        )
        .bind(name)
        .bind(unit_cost)
        .bind(quantity)
        .bind(supplier_id)
        .fetch_one(&self.pool)
        .await
    }

    // -------------------------------------------------------------------------
    // HEALTH CHECK
    // -------------------------------------------------------------------------

    /// Check if database connection is healthy
    pub async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await.is_ok()
    }
}
