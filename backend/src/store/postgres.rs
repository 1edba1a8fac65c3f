//! PostgreSQL ledger store
//!
//! Every in-transaction read of a row the command may write uses
//! `FOR UPDATE`, so two commands touching the same material serialize on the
//! row lock while commands on disjoint materials run side by side.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ledger_shared::{
    IncomingShipment, LedgerEntry, LocatedMaterial, LocationId, Lot, LotId, MaterialFilter,
    MaterialId, MaterialListing, NewLedgerEntry, NewLocatedMaterial, NewShipment, Quantity,
    ShipmentId,
};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool, Postgres, Transaction};

use super::{LedgerStore, LedgerTx, LotBalance, MaterialBalance};
use crate::error::{LedgerError, LedgerResult};

const MATERIAL_COLUMNS: &str = r#"
    material_id, stock_id, location_id, customer_id, material_type::TEXT AS material_type,
    description, notes, quantity, is_active, min_required_quantity, max_required_quantity,
    owner, is_primary, updated_at
"#;

const SHIPMENT_SELECT: &str = r#"
    SELECT im.shipping_id, im.customer_id, c.name AS customer_name, im.stock_id, im.cost,
           im.quantity, im.min_required_quantity, im.max_required_quantity, im.description,
           im.material_type::TEXT AS material_type, im.is_active, im.owner
    FROM incoming_materials im
    LEFT JOIN customers c ON c.customer_id = im.customer_id
"#;

/// Row for the materials table
#[derive(Debug, FromRow)]
struct MaterialRow {
    material_id: i64,
    stock_id: String,
    location_id: Option<i64>,
    customer_id: i64,
    material_type: String,
    description: String,
    notes: Option<String>,
    quantity: i32,
    is_active: bool,
    min_required_quantity: i32,
    max_required_quantity: i32,
    owner: String,
    is_primary: bool,
    updated_at: DateTime<Utc>,
}

impl From<MaterialRow> for LocatedMaterial {
    fn from(row: MaterialRow) -> Self {
        LocatedMaterial {
            material_id: row.material_id,
            stock_id: row.stock_id,
            location_id: row.location_id,
            customer_id: row.customer_id,
            material_type: row.material_type,
            description: row.description,
            notes: row.notes,
            quantity: row.quantity,
            is_active: row.is_active,
            min_required_quantity: row.min_required_quantity,
            max_required_quantity: row.max_required_quantity,
            owner: row.owner,
            is_primary: row.is_primary,
            updated_at: row.updated_at,
        }
    }
}

/// Row for the material listing join
#[derive(Debug, FromRow)]
struct ListingRow {
    #[sqlx(flatten)]
    material: MaterialRow,
    customer_name: Option<String>,
    location_name: Option<String>,
    warehouse_name: Option<String>,
}

impl From<ListingRow> for MaterialListing {
    fn from(row: ListingRow) -> Self {
        MaterialListing {
            material: row.material.into(),
            customer_name: row.customer_name,
            location_name: row.location_name,
            warehouse_name: row.warehouse_name,
        }
    }
}

/// Row for the incoming_materials join
#[derive(Debug, FromRow)]
struct ShipmentRow {
    shipping_id: i64,
    customer_id: i64,
    customer_name: Option<String>,
    stock_id: String,
    cost: Decimal,
    quantity: i32,
    min_required_quantity: i32,
    max_required_quantity: i32,
    description: String,
    material_type: String,
    is_active: bool,
    owner: String,
}

impl From<ShipmentRow> for IncomingShipment {
    fn from(row: ShipmentRow) -> Self {
        IncomingShipment {
            shipping_id: row.shipping_id,
            customer_id: row.customer_id,
            customer_name: row.customer_name,
            stock_id: row.stock_id,
            cost: row.cost,
            quantity: row.quantity,
            min_required_quantity: row.min_required_quantity,
            max_required_quantity: row.max_required_quantity,
            description: row.description,
            material_type: row.material_type,
            is_active: row.is_active,
            owner: row.owner,
        }
    }
}

#[derive(Debug, FromRow)]
struct LotRow {
    price_id: i64,
    material_id: i64,
    quantity: i32,
    cost: Decimal,
}

impl From<LotRow> for Lot {
    fn from(row: LotRow) -> Self {
        Lot {
            price_id: row.price_id,
            material_id: row.material_id,
            quantity: row.quantity,
            cost: row.cost,
        }
    }
}

#[derive(Debug, FromRow)]
struct EntryRow {
    transaction_id: i64,
    price_id: i64,
    quantity_change: i32,
    notes: Option<String>,
    job_ticket: Option<String>,
    updated_at: DateTime<Utc>,
}

impl From<EntryRow> for LedgerEntry {
    fn from(row: EntryRow) -> Self {
        LedgerEntry {
            entry_id: row.transaction_id,
            price_id: row.price_id,
            quantity_change: row.quantity_change,
            notes: row.notes,
            job_ticket: row.job_ticket,
            updated_at: row.updated_at,
        }
    }
}

/// Filter text matches literally, so LIKE wildcards in it are escaped
fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Ledger store backed by a Postgres pool
#[derive(Clone)]
pub struct PostgresStore {
    db: PgPool,
}

impl PostgresStore {
    /// Create a new PostgresStore instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl LedgerStore for PostgresStore {
    type Tx = PostgresTx;

    async fn begin(&self) -> LedgerResult<PostgresTx> {
        let tx = self.db.begin().await?;
        Ok(PostgresTx { tx })
    }

    async fn material_types(&self) -> LedgerResult<Vec<String>> {
        let types = sqlx::query_scalar::<_, String>(
            r#"
            SELECT pe.enumlabel::TEXT
            FROM pg_enum pe
            LEFT JOIN pg_type pt ON pt.oid = pe.enumtypid
            WHERE pt.typname = 'material_type'
            ORDER BY pe.enumsortorder
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        Ok(types)
    }

    async fn materials(&self, filter: &MaterialFilter) -> LedgerResult<Vec<MaterialListing>> {
        let rows = sqlx::query_as::<_, ListingRow>(
            r#"
            SELECT m.material_id, m.stock_id, m.location_id, m.customer_id,
                   m.material_type::TEXT AS material_type, m.description, m.notes, m.quantity,
                   m.is_active, m.min_required_quantity, m.max_required_quantity, m.owner,
                   m.is_primary, m.updated_at,
                   c.name AS customer_name, l.name AS location_name, w.name AS warehouse_name
            FROM materials m
            LEFT JOIN customers c ON c.customer_id = m.customer_id
            LEFT JOIN locations l ON l.location_id = m.location_id
            LEFT JOIN warehouses w ON w.warehouse_id = l.warehouse_id
            WHERE m.location_id IS NOT NULL
              AND ($1::BIGINT IS NULL OR m.material_id = $1)
              AND ($2 = '' OR m.stock_id ILIKE '%' || $2 || '%' ESCAPE '\')
              AND ($3 = '' OR c.name ILIKE '%' || $3 || '%' ESCAPE '\')
              AND ($4 = '' OR m.description ILIKE '%' || $4 || '%' ESCAPE '\')
              AND ($5 = '' OR l.name ILIKE '%' || $5 || '%' ESCAPE '\')
            ORDER BY m.stock_id ASC, m.material_id ASC
            "#,
        )
        .bind(filter.material_id)
        .bind(escape_like(&filter.stock_id))
        .bind(escape_like(&filter.customer_name))
        .bind(escape_like(&filter.description))
        .bind(escape_like(&filter.location_name))
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn material(&self, material_id: MaterialId) -> LedgerResult<LocatedMaterial> {
        let row = sqlx::query_as::<_, MaterialRow>(&format!(
            "SELECT {MATERIAL_COLUMNS} FROM materials WHERE material_id = $1"
        ))
        .bind(material_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| LedgerError::not_found("Material", material_id))?;

        Ok(row.into())
    }

    async fn incoming(
        &self,
        shipping_id: Option<ShipmentId>,
    ) -> LedgerResult<Vec<IncomingShipment>> {
        let rows = sqlx::query_as::<_, ShipmentRow>(&format!(
            "{SHIPMENT_SELECT} WHERE ($1::BIGINT IS NULL OR im.shipping_id = $1) ORDER BY im.shipping_id"
        ))
        .bind(shipping_id)
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn enqueue_shipment(&self, shipment: &NewShipment) -> LedgerResult<ShipmentId> {
        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO incoming_materials
                (customer_id, stock_id, cost, quantity, min_required_quantity,
                 max_required_quantity, description, is_active, material_type, owner)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9::material_type, $10)
            RETURNING shipping_id
            "#,
        )
        .bind(shipment.customer_id)
        .bind(&shipment.stock_id)
        .bind(shipment.cost)
        .bind(shipment.quantity)
        .bind(shipment.min_required_quantity)
        .bind(shipment.max_required_quantity)
        .bind(&shipment.description)
        .bind(shipment.is_active)
        .bind(&shipment.material_type)
        .bind(&shipment.owner)
        .fetch_one(&self.db)
        .await?;

        Ok(id)
    }

    async fn lots(&self, material_id: MaterialId) -> LedgerResult<Vec<Lot>> {
        let rows = sqlx::query_as::<_, LotRow>(
            r#"
            SELECT price_id, material_id, quantity, cost
            FROM prices
            WHERE material_id = $1
            ORDER BY price_id ASC
            "#,
        )
        .bind(material_id)
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn entries(&self, price_id: LotId) -> LedgerResult<Vec<LedgerEntry>> {
        let rows = sqlx::query_as::<_, EntryRow>(
            r#"
            SELECT transaction_id, price_id, quantity_change, notes, job_ticket, updated_at
            FROM transactions_log
            WHERE price_id = $1
            ORDER BY transaction_id ASC
            "#,
        )
        .bind(price_id)
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn material_balances(&self) -> LedgerResult<Vec<MaterialBalance>> {
        let rows = sqlx::query_as::<_, (i64, i32, i64)>(
            r#"
            SELECT m.material_id, m.quantity, COALESCE(SUM(p.quantity), 0)::BIGINT
            FROM materials m
            LEFT JOIN prices p ON p.material_id = m.material_id AND p.quantity > 0
            GROUP BY m.material_id, m.quantity
            ORDER BY m.material_id
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| MaterialBalance {
                material_id: r.0,
                quantity: r.1,
                lot_total: r.2,
            })
            .collect())
    }

    async fn lot_balances(&self) -> LedgerResult<Vec<LotBalance>> {
        let rows = sqlx::query_as::<_, (i64, i32, i64)>(
            r#"
            SELECT p.price_id, p.quantity, COALESCE(SUM(t.quantity_change), 0)::BIGINT
            FROM prices p
            LEFT JOIN transactions_log t ON t.price_id = p.price_id
            GROUP BY p.price_id, p.quantity
            ORDER BY p.price_id
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| LotBalance {
                price_id: r.0,
                quantity: r.1,
                ledger_total: r.2,
            })
            .collect())
    }
}

/// Transaction over [`PostgresStore`]; sqlx rolls it back when dropped
pub struct PostgresTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl LedgerTx for PostgresTx {
    async fn lock_shipment(
        &mut self,
        shipping_id: ShipmentId,
    ) -> LedgerResult<Option<IncomingShipment>> {
        let row = sqlx::query_as::<_, ShipmentRow>(&format!(
            "{SHIPMENT_SELECT} WHERE im.shipping_id = $1 FOR UPDATE OF im"
        ))
        .bind(shipping_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(row.map(Into::into))
    }

    async fn delete_shipment(&mut self, shipping_id: ShipmentId) -> LedgerResult<()> {
        let result = sqlx::query("DELETE FROM incoming_materials WHERE shipping_id = $1")
            .bind(shipping_id)
            .execute(&mut *self.tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(LedgerError::not_found("Incoming shipment", shipping_id));
        }

        Ok(())
    }

    async fn get_material(&mut self, material_id: MaterialId) -> LedgerResult<LocatedMaterial> {
        let row = sqlx::query_as::<_, MaterialRow>(&format!(
            "SELECT {MATERIAL_COLUMNS} FROM materials WHERE material_id = $1 FOR UPDATE"
        ))
        .bind(material_id)
        .fetch_optional(&mut *self.tx)
        .await?
        .ok_or_else(|| LedgerError::not_found("Material", material_id))?;

        Ok(row.into())
    }

    async fn find_by_location(
        &mut self,
        stock_id: &str,
        location_id: LocationId,
        owner: &str,
    ) -> LedgerResult<Option<LocatedMaterial>> {
        let row = sqlx::query_as::<_, MaterialRow>(&format!(
            r#"
            SELECT {MATERIAL_COLUMNS} FROM materials
            WHERE stock_id = $1 AND location_id = $2 AND owner = $3
            ORDER BY material_id
            LIMIT 1
            FOR UPDATE
            "#
        ))
        .bind(stock_id)
        .bind(location_id)
        .bind(owner)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(row.map(Into::into))
    }

    async fn find_unplaced(
        &mut self,
        stock_id: &str,
        owner: &str,
    ) -> LedgerResult<Option<LocatedMaterial>> {
        let row = sqlx::query_as::<_, MaterialRow>(&format!(
            r#"
            SELECT {MATERIAL_COLUMNS} FROM materials
            WHERE location_id IS NULL AND stock_id = $1 AND owner = $2
            ORDER BY material_id
            LIMIT 1
            FOR UPDATE
            "#
        ))
        .bind(stock_id)
        .bind(owner)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(row.map(Into::into))
    }

    async fn create_located(&mut self, material: &NewLocatedMaterial) -> LedgerResult<MaterialId> {
        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO materials
                (stock_id, location_id, customer_id, material_type, description, notes,
                 quantity, updated_at, min_required_quantity, max_required_quantity,
                 is_active, owner)
            VALUES ($1, $2, $3, $4::material_type, $5, $6, $7, NOW(), $8, $9, $10, $11)
            RETURNING material_id
            "#,
        )
        .bind(&material.stock_id)
        .bind(material.location_id)
        .bind(material.customer_id)
        .bind(&material.material_type)
        .bind(&material.description)
        .bind(&material.notes)
        .bind(material.quantity)
        .bind(material.min_required_quantity)
        .bind(material.max_required_quantity)
        .bind(material.is_active)
        .bind(&material.owner)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(id)
    }

    async fn increase_quantity(
        &mut self,
        material_id: MaterialId,
        delta: Quantity,
        notes: Option<&str>,
    ) -> LedgerResult<Quantity> {
        // Negative results trip the materials_quantity_check constraint
        sqlx::query_scalar::<_, i32>(
            r#"
            UPDATE materials
            SET quantity = quantity + $2,
                notes = COALESCE($3, notes),
                updated_at = NOW()
            WHERE material_id = $1
            RETURNING quantity
            "#,
        )
        .bind(material_id)
        .bind(delta)
        .bind(notes)
        .fetch_optional(&mut *self.tx)
        .await?
        .ok_or_else(|| LedgerError::not_found("Material", material_id))
    }

    async fn place(
        &mut self,
        material_id: MaterialId,
        location_id: LocationId,
        quantity: Quantity,
        notes: Option<&str>,
    ) -> LedgerResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE materials
            SET location_id = $2,
                quantity = $3,
                notes = COALESCE($4, notes),
                updated_at = NOW()
            WHERE material_id = $1
            "#,
        )
        .bind(material_id)
        .bind(location_id)
        .bind(quantity)
        .bind(notes)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(LedgerError::not_found("Material", material_id));
        }

        Ok(())
    }

    async fn retire(&mut self, material_id: MaterialId) -> LedgerResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE materials
            SET location_id = NULL,
                quantity = 0,
                updated_at = NOW()
            WHERE material_id = $1
            "#,
        )
        .bind(material_id)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(LedgerError::not_found("Material", material_id));
        }

        Ok(())
    }

    async fn set_primary(&mut self, material_id: MaterialId, is_primary: bool) -> LedgerResult<()> {
        let result = sqlx::query("UPDATE materials SET is_primary = $2 WHERE material_id = $1")
            .bind(material_id)
            .bind(is_primary)
            .execute(&mut *self.tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(LedgerError::not_found("Material", material_id));
        }

        Ok(())
    }

    async fn list_live_lots(&mut self, material_id: MaterialId) -> LedgerResult<Vec<Lot>> {
        let rows = sqlx::query_as::<_, LotRow>(
            r#"
            SELECT price_id, material_id, quantity, cost
            FROM prices
            WHERE material_id = $1
              AND quantity > 0
            ORDER BY price_id ASC
            FOR UPDATE
            "#,
        )
        .bind(material_id)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn adjust_lot_quantity(
        &mut self,
        price_id: LotId,
        delta: Quantity,
    ) -> LedgerResult<Decimal> {
        let cost = sqlx::query_scalar::<_, Decimal>(
            r#"
            UPDATE prices
            SET quantity = quantity + $2
            WHERE price_id = $1
              AND quantity + $2 >= 0
            RETURNING cost
            "#,
        )
        .bind(price_id)
        .bind(delta)
        .fetch_optional(&mut *self.tx)
        .await?;

        if let Some(cost) = cost {
            return Ok(cost);
        }

        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM prices WHERE price_id = $1)",
        )
        .bind(price_id)
        .fetch_one(&mut *self.tx)
        .await?;

        if exists {
            Err(LedgerError::Conflict(format!(
                "lot {price_id} cannot change by {delta} without going negative"
            )))
        } else {
            Err(LedgerError::not_found("Lot", price_id))
        }
    }

    async fn upsert_lot(
        &mut self,
        material_id: MaterialId,
        quantity: Quantity,
        cost: Decimal,
    ) -> LedgerResult<LotId> {
        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO prices (material_id, quantity, cost)
                VALUES ($1, $2, $3)
            ON CONFLICT (material_id, cost)
                DO UPDATE
                    SET quantity = (prices.quantity + EXCLUDED.quantity)
            RETURNING price_id
            "#,
        )
        .bind(material_id)
        .bind(quantity)
        .bind(cost)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(id)
    }

    async fn append_entry(&mut self, entry: &NewLedgerEntry) -> LedgerResult<()> {
        sqlx::query(
            r#"
            INSERT INTO transactions_log (price_id, quantity_change, notes, job_ticket, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(entry.price_id)
        .bind(entry.quantity_change)
        .bind(&entry.notes)
        .bind(&entry.job_ticket)
        .bind(entry.updated_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn commit(self) -> LedgerResult<()> {
        self.tx.commit().await?;
        Ok(())
    }
}
