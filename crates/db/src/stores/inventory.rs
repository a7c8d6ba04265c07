use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::Row;
use uuid::Uuid;

use fieldline_core::domain::inventory::{
    EquipmentLine, InventoryTransaction, Material, MaterialId, TransactionId, TransactionKind,
};
use fieldline_core::domain::request::{ActorId, RequestId};
use fieldline_core::errors::StoreError;
use fieldline_core::store::{ConsumeOutcome, InventoryStore, TransactionFilter};

use super::{backend, decode, parse_quantity, parse_timestamp};
use crate::DbPool;

pub struct SqlInventoryStore {
    pool: DbPool,
}

impl SqlInventoryStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

const MATERIAL_COLUMNS: &str = "id, name, category, quantity_in_stock, min_quantity, unit, \
     price, location, supplier, is_active";

fn row_to_material(row: &sqlx::sqlite::SqliteRow) -> Result<Material, StoreError> {
    let id: String = row.try_get("id").map_err(backend)?;
    let name: String = row.try_get("name").map_err(backend)?;
    let category: String = row.try_get("category").map_err(backend)?;
    let quantity_in_stock: i64 = row.try_get("quantity_in_stock").map_err(backend)?;
    let min_quantity: i64 = row.try_get("min_quantity").map_err(backend)?;
    let unit: String = row.try_get("unit").map_err(backend)?;
    let price_str: String = row.try_get("price").map_err(backend)?;
    let location: String = row.try_get("location").map_err(backend)?;
    let supplier: Option<String> = row.try_get("supplier").map_err(backend)?;
    let is_active: bool = row.try_get("is_active").map_err(backend)?;

    Ok(Material {
        id: MaterialId(id),
        name,
        category,
        quantity_in_stock: parse_quantity("quantity_in_stock", quantity_in_stock)?,
        min_quantity: parse_quantity("min_quantity", min_quantity)?,
        unit,
        // sqlite has no decimal type, so prices travel as their canonical
        // string form.
        price: Decimal::from_str(&price_str)
            .map_err(|_| decode(format!("invalid price `{price_str}`")))?,
        location,
        supplier,
        is_active,
    })
}

fn row_to_transaction(row: &sqlx::sqlite::SqliteRow) -> Result<InventoryTransaction, StoreError> {
    let id: String = row.try_get("id").map_err(backend)?;
    let request_id: Option<String> = row.try_get("request_id").map_err(backend)?;
    let material_id: String = row.try_get("material_id").map_err(backend)?;
    let kind_str: String = row.try_get("kind").map_err(backend)?;
    let quantity: i64 = row.try_get("quantity").map_err(backend)?;
    let performed_by: i64 = row.try_get("performed_by").map_err(backend)?;
    let occurred_at_str: String = row.try_get("occurred_at").map_err(backend)?;
    let notes: Option<String> = row.try_get("notes").map_err(backend)?;

    Ok(InventoryTransaction {
        id: TransactionId(id),
        request_id: request_id.map(RequestId),
        material_id: MaterialId(material_id),
        kind: TransactionKind::parse(&kind_str)
            .ok_or_else(|| decode(format!("unknown transaction kind `{kind_str}`")))?,
        quantity: parse_quantity("quantity", quantity)?,
        performed_by: ActorId(performed_by),
        occurred_at: parse_timestamp("occurred_at", &occurred_at_str)?,
        notes,
    })
}

async fn insert_transaction(
    executor: &mut sqlx::SqliteConnection,
    request_id: Option<&RequestId>,
    material_id: &MaterialId,
    kind: TransactionKind,
    quantity: u32,
    performed_by: ActorId,
    occurred_at: DateTime<Utc>,
    notes: Option<&str>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO inventory_transaction (id, request_id, material_id, kind, quantity,
             performed_by, occurred_at, notes)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(request_id.map(|id| id.0.clone()))
    .bind(&material_id.0)
    .bind(kind.as_str())
    .bind(i64::from(quantity))
    .bind(performed_by.0)
    .bind(occurred_at.to_rfc3339())
    .bind(notes)
    .execute(executor)
    .await?;
    Ok(())
}

#[async_trait]
impl InventoryStore for SqlInventoryStore {
    async fn get_material(&self, id: &MaterialId) -> Result<Option<Material>, StoreError> {
        let row = sqlx::query(&format!("SELECT {MATERIAL_COLUMNS} FROM material WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;

        match row {
            Some(ref row) => Ok(Some(row_to_material(row)?)),
            None => Ok(None),
        }
    }

    async fn list_materials(&self, category: Option<&str>) -> Result<Vec<Material>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {MATERIAL_COLUMNS} FROM material
             WHERE is_active = 1 AND (?1 IS NULL OR category = ?1)
             ORDER BY id ASC"
        ))
        .bind(category)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        rows.iter().map(row_to_material).collect()
    }

    async fn upsert_material(&self, material: Material) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO material (id, name, category, quantity_in_stock, min_quantity, unit,
                 price, location, supplier, is_active)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 category = excluded.category,
                 quantity_in_stock = excluded.quantity_in_stock,
                 min_quantity = excluded.min_quantity,
                 unit = excluded.unit,
                 price = excluded.price,
                 location = excluded.location,
                 supplier = excluded.supplier,
                 is_active = excluded.is_active",
        )
        .bind(&material.id.0)
        .bind(&material.name)
        .bind(&material.category)
        .bind(i64::from(material.quantity_in_stock))
        .bind(i64::from(material.min_quantity))
        .bind(&material.unit)
        .bind(material.price.to_string())
        .bind(&material.location)
        .bind(&material.supplier)
        .bind(material.is_active)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        Ok(())
    }

    async fn record_reservation(
        &self,
        request_id: &RequestId,
        lines: &[EquipmentLine],
        performed_by: ActorId,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;
        let now = Utc::now();

        sqlx::query("DELETE FROM equipment_reservation WHERE request_id = ?")
            .bind(&request_id.0)
            .execute(&mut *tx)
            .await
            .map_err(backend)?;

        for line in lines {
            sqlx::query(
                "INSERT INTO equipment_reservation (request_id, material_id, quantity, reserved_at)
                 VALUES (?, ?, ?, ?)",
            )
            .bind(&request_id.0)
            .bind(&line.material_id.0)
            .bind(i64::from(line.quantity))
            .bind(now.to_rfc3339())
            .execute(&mut *tx)
            .await
            .map_err(backend)?;

            insert_transaction(
                &mut tx,
                Some(request_id),
                &line.material_id,
                TransactionKind::Reserve,
                line.quantity,
                performed_by,
                now,
                None,
            )
            .await
            .map_err(backend)?;
        }

        tx.commit().await.map_err(backend)
    }

    async fn reserved_lines(
        &self,
        request_id: &RequestId,
    ) -> Result<Vec<EquipmentLine>, StoreError> {
        let rows = sqlx::query(
            "SELECT material_id, quantity FROM equipment_reservation
             WHERE request_id = ? ORDER BY material_id ASC",
        )
        .bind(&request_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        rows.into_iter()
            .map(|row| {
                let material_id: String = row.try_get("material_id").map_err(backend)?;
                let quantity: i64 = row.try_get("quantity").map_err(backend)?;
                Ok(EquipmentLine {
                    material_id: MaterialId(material_id),
                    quantity: parse_quantity("quantity", quantity)?,
                })
            })
            .collect()
    }

    async fn release_reservation(
        &self,
        request_id: &RequestId,
        performed_by: ActorId,
        note: &str,
    ) -> Result<Option<Vec<EquipmentLine>>, StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;
        let now = Utc::now();

        let rows = sqlx::query(
            "SELECT material_id, quantity FROM equipment_reservation
             WHERE request_id = ? ORDER BY material_id ASC",
        )
        .bind(&request_id.0)
        .fetch_all(&mut *tx)
        .await
        .map_err(backend)?;

        if rows.is_empty() {
            tx.rollback().await.map_err(backend)?;
            return Ok(None);
        }

        let mut lines = Vec::with_capacity(rows.len());
        for row in rows {
            let material_id: String = row.try_get("material_id").map_err(backend)?;
            let quantity: i64 = row.try_get("quantity").map_err(backend)?;
            lines.push(EquipmentLine {
                material_id: MaterialId(material_id),
                quantity: parse_quantity("quantity", quantity)?,
            });
        }

        sqlx::query("DELETE FROM equipment_reservation WHERE request_id = ?")
            .bind(&request_id.0)
            .execute(&mut *tx)
            .await
            .map_err(backend)?;

        for line in &lines {
            insert_transaction(
                &mut tx,
                Some(request_id),
                &line.material_id,
                TransactionKind::Return,
                line.quantity,
                performed_by,
                now,
                Some(note),
            )
            .await
            .map_err(backend)?;
        }

        tx.commit().await.map_err(backend)?;
        Ok(Some(lines))
    }

    async fn consume(
        &self,
        request_id: &RequestId,
        lines: &[EquipmentLine],
        performed_by: ActorId,
    ) -> Result<ConsumeOutcome, StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;
        let now = Utc::now();

        for line in lines {
            // Conditional decrement; zero affected rows means either an
            // unknown material or a shortfall, disambiguated below.
            let result = sqlx::query(
                "UPDATE material SET quantity_in_stock = quantity_in_stock - ?
                 WHERE id = ? AND is_active = 1 AND quantity_in_stock >= ?",
            )
            .bind(i64::from(line.quantity))
            .bind(&line.material_id.0)
            .bind(i64::from(line.quantity))
            .execute(&mut *tx)
            .await
            .map_err(backend)?;

            if result.rows_affected() == 0 {
                let available = sqlx::query(
                    "SELECT quantity_in_stock FROM material WHERE id = ? AND is_active = 1",
                )
                .bind(&line.material_id.0)
                .fetch_optional(&mut *tx)
                .await
                .map_err(backend)?;

                tx.rollback().await.map_err(backend)?;
                return match available {
                    None => Ok(ConsumeOutcome::UnknownMaterial(line.material_id.clone())),
                    Some(row) => {
                        let available: i64 =
                            row.try_get("quantity_in_stock").map_err(backend)?;
                        Ok(ConsumeOutcome::Insufficient {
                            material_id: line.material_id.clone(),
                            requested: line.quantity,
                            available: parse_quantity("quantity_in_stock", available)?,
                        })
                    }
                };
            }

            insert_transaction(
                &mut tx,
                Some(request_id),
                &line.material_id,
                TransactionKind::Consume,
                line.quantity,
                performed_by,
                now,
                None,
            )
            .await
            .map_err(backend)?;
        }

        sqlx::query("DELETE FROM equipment_reservation WHERE request_id = ?")
            .bind(&request_id.0)
            .execute(&mut *tx)
            .await
            .map_err(backend)?;

        tx.commit().await.map_err(backend)?;
        Ok(ConsumeOutcome::Applied)
    }

    async fn restore(
        &self,
        request_id: &RequestId,
        lines: &[EquipmentLine],
        performed_by: ActorId,
        note: &str,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;
        let now = Utc::now();

        for line in lines {
            let result = sqlx::query(
                "UPDATE material SET quantity_in_stock = quantity_in_stock + ? WHERE id = ?",
            )
            .bind(i64::from(line.quantity))
            .bind(&line.material_id.0)
            .execute(&mut *tx)
            .await
            .map_err(backend)?;

            if result.rows_affected() == 0 {
                tx.rollback().await.map_err(backend)?;
                return Err(StoreError::Backend(format!(
                    "cannot restore unknown material `{}`",
                    line.material_id.0
                )));
            }

            insert_transaction(
                &mut tx,
                Some(request_id),
                &line.material_id,
                TransactionKind::Return,
                line.quantity,
                performed_by,
                now,
                Some(note),
            )
            .await
            .map_err(backend)?;
        }

        tx.commit().await.map_err(backend)
    }

    async fn record_restock(
        &self,
        material_id: &MaterialId,
        quantity: u32,
        performed_by: ActorId,
        notes: Option<String>,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;

        let result = sqlx::query(
            "UPDATE material SET quantity_in_stock = quantity_in_stock + ? WHERE id = ?",
        )
        .bind(i64::from(quantity))
        .bind(&material_id.0)
        .execute(&mut *tx)
        .await
        .map_err(backend)?;

        if result.rows_affected() == 0 {
            tx.rollback().await.map_err(backend)?;
            return Err(StoreError::Backend(format!(
                "cannot restock unknown material `{}`",
                material_id.0
            )));
        }

        insert_transaction(
            &mut tx,
            None,
            material_id,
            TransactionKind::Restock,
            quantity,
            performed_by,
            Utc::now(),
            notes.as_deref(),
        )
        .await
        .map_err(backend)?;

        tx.commit().await.map_err(backend)
    }

    async fn list_transactions(
        &self,
        filter: &TransactionFilter,
    ) -> Result<Vec<InventoryTransaction>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, request_id, material_id, kind, quantity, performed_by, occurred_at, notes
             FROM inventory_transaction
             WHERE (?1 IS NULL OR request_id = ?1)
               AND (?2 IS NULL OR material_id = ?2)
               AND (?3 IS NULL OR occurred_at >= ?3)
             ORDER BY occurred_at ASC, id ASC",
        )
        .bind(filter.request_id.as_ref().map(|id| id.0.clone()))
        .bind(filter.material_id.as_ref().map(|id| id.0.clone()))
        .bind(filter.since.map(|since| since.to_rfc3339()))
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        rows.iter().map(row_to_transaction).collect()
    }
}
