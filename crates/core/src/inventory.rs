//! Inventory application service.
//!
//! Sits between the workflow engine and the [`InventoryStore`] port. Owns
//! the business rules around stock: advisory availability checks at
//! documentation time, the authoritative decrement at issue time, the
//! compensation paths, and the derived reporting surfaces.

use std::sync::Arc;

use chrono::{Duration, Utc};

use crate::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink};
use crate::domain::inventory::{
    EquipmentLine, InventoryTransaction, Material, MaterialId, StockAlert, StockLevel,
    StockSummary,
};
use crate::domain::request::{ActorId, RequestId};
use crate::errors::WorkflowError;
use crate::store::{ConsumeOutcome, InventoryStore, TransactionFilter};

pub struct InventoryService<I> {
    store: I,
    audit: Arc<dyn AuditSink>,
}

impl<I: InventoryStore> InventoryService<I> {
    pub fn new(store: I, audit: Arc<dyn AuditSink>) -> Self {
        Self { store, audit }
    }

    pub fn store(&self) -> &I {
        &self.store
    }

    pub async fn material(&self, id: &MaterialId) -> Result<Option<Material>, WorkflowError> {
        Ok(self.store.get_material(id).await?)
    }

    pub async fn materials(&self, category: Option<&str>) -> Result<Vec<Material>, WorkflowError> {
        Ok(self.store.list_materials(category).await?)
    }

    pub async fn upsert_material(&self, material: Material) -> Result<(), WorkflowError> {
        self.store.upsert_material(material).await?;
        Ok(())
    }

    /// Advisory hold: verifies every line against current stock and records
    /// the reservation. Stock itself is not decremented, so a later issue
    /// can still fail if stock moved in the meantime.
    pub async fn reserve_equipment(
        &self,
        request_id: &RequestId,
        lines: &[EquipmentLine],
        actor: ActorId,
    ) -> Result<(), WorkflowError> {
        for line in lines {
            let material = self
                .store
                .get_material(&line.material_id)
                .await?
                .filter(|material| material.is_active)
                .ok_or_else(|| WorkflowError::UnknownMaterial(line.material_id.clone()))?;
            if material.quantity_in_stock < line.quantity {
                self.audit.emit(
                    AuditEvent::new(
                        Some(request_id.clone()),
                        "inventory.reserve_rejected",
                        AuditCategory::Inventory,
                        actor_label(actor),
                        AuditOutcome::Rejected,
                    )
                    .with_metadata("material_id", line.material_id.0.clone())
                    .with_metadata("requested", line.quantity.to_string())
                    .with_metadata("available", material.quantity_in_stock.to_string()),
                );
                return Err(WorkflowError::InsufficientStock {
                    material_id: line.material_id.clone(),
                    requested: line.quantity,
                    available: material.quantity_in_stock,
                });
            }
        }

        self.store.record_reservation(request_id, lines, actor).await?;
        self.audit.emit(
            AuditEvent::new(
                Some(request_id.clone()),
                "inventory.reserved",
                AuditCategory::Inventory,
                actor_label(actor),
                AuditOutcome::Success,
            )
            .with_metadata("lines", lines.len().to_string()),
        );
        Ok(())
    }

    /// Re-records a previously released reservation. Used when a status write
    /// that released the hold turns out to have lost its race.
    pub async fn restore_reservation(
        &self,
        request_id: &RequestId,
        lines: &[EquipmentLine],
        actor: ActorId,
    ) -> Result<(), WorkflowError> {
        self.store.record_reservation(request_id, lines, actor).await?;
        Ok(())
    }

    /// Authoritative decrement at issue time. All-or-nothing across lines.
    pub async fn consume_equipment(
        &self,
        request_id: &RequestId,
        lines: &[EquipmentLine],
        actor: ActorId,
    ) -> Result<(), WorkflowError> {
        match self.store.consume(request_id, lines, actor).await? {
            ConsumeOutcome::Applied => {
                self.audit.emit(
                    AuditEvent::new(
                        Some(request_id.clone()),
                        "inventory.consumed",
                        AuditCategory::Inventory,
                        actor_label(actor),
                        AuditOutcome::Success,
                    )
                    .with_metadata("lines", lines.len().to_string()),
                );
                Ok(())
            }
            ConsumeOutcome::Insufficient { material_id, requested, available } => {
                self.audit.emit(
                    AuditEvent::new(
                        Some(request_id.clone()),
                        "inventory.consume_rejected",
                        AuditCategory::Inventory,
                        actor_label(actor),
                        AuditOutcome::Rejected,
                    )
                    .with_metadata("material_id", material_id.0.clone())
                    .with_metadata("requested", requested.to_string())
                    .with_metadata("available", available.to_string()),
                );
                Err(WorkflowError::InsufficientStock { material_id, requested, available })
            }
            ConsumeOutcome::UnknownMaterial(material_id) => {
                Err(WorkflowError::UnknownMaterial(material_id))
            }
        }
    }

    /// Drops the request's hold, if any, and returns what was held.
    pub async fn cancel_reservation(
        &self,
        request_id: &RequestId,
        actor: ActorId,
        note: &str,
    ) -> Result<Option<Vec<EquipmentLine>>, WorkflowError> {
        let released = self.store.release_reservation(request_id, actor, note).await?;
        if released.is_some() {
            self.audit.emit(
                AuditEvent::new(
                    Some(request_id.clone()),
                    "inventory.reservation_released",
                    AuditCategory::Inventory,
                    actor_label(actor),
                    AuditOutcome::Success,
                )
                .with_metadata("note", note.to_string()),
            );
        }
        Ok(released)
    }

    /// Puts consumed quantities back. Compensation only; regular returns go
    /// through [`Self::record_restock`].
    pub async fn compensate_consumption(
        &self,
        request_id: &RequestId,
        lines: &[EquipmentLine],
        actor: ActorId,
        note: &str,
    ) -> Result<(), WorkflowError> {
        self.store.restore(request_id, lines, actor, note).await?;
        self.audit.emit(
            AuditEvent::new(
                Some(request_id.clone()),
                "inventory.consumption_compensated",
                AuditCategory::Inventory,
                actor_label(actor),
                AuditOutcome::Success,
            )
            .with_metadata("note", note.to_string()),
        );
        Ok(())
    }

    pub async fn record_restock(
        &self,
        material_id: &MaterialId,
        quantity: u32,
        actor: ActorId,
        notes: Option<String>,
    ) -> Result<(), WorkflowError> {
        self.store.record_restock(material_id, quantity, actor, notes).await?;
        self.audit.emit(
            AuditEvent::new(
                None,
                "inventory.restocked",
                AuditCategory::Inventory,
                actor_label(actor),
                AuditOutcome::Success,
            )
            .with_metadata("material_id", material_id.0.clone())
            .with_metadata("quantity", quantity.to_string()),
        );
        Ok(())
    }

    /// Counts active materials per derived stock level, optionally scoped to
    /// one category.
    pub async fn check_stock_levels(
        &self,
        category: Option<&str>,
    ) -> Result<StockSummary, WorkflowError> {
        let materials = self.store.list_materials(category).await?;
        let mut summary = StockSummary {
            category: category.map(str::to_string),
            total: materials.len(),
            ..StockSummary::default()
        };
        for material in &materials {
            match material.stock_level() {
                StockLevel::Normal => summary.normal += 1,
                StockLevel::Low => summary.low += 1,
                StockLevel::Critical => summary.critical += 1,
                StockLevel::OutOfStock => summary.out_of_stock += 1,
            }
        }
        Ok(summary)
    }

    /// One alert per active material at or below its threshold.
    pub async fn generate_stock_alerts(&self) -> Result<Vec<StockAlert>, WorkflowError> {
        let materials = self.store.list_materials(None).await?;
        Ok(materials
            .into_iter()
            .filter(|material| material.stock_level() != StockLevel::Normal)
            .map(|material| StockAlert {
                material_id: material.id.clone(),
                name: material.name.clone(),
                level: material.stock_level(),
                quantity_in_stock: material.quantity_in_stock,
                min_quantity: material.min_quantity,
            })
            .collect())
    }

    /// Technician sign-off that the issued equipment matches what the request
    /// consumed. Read-only apart from the audit trail; returns the request's
    /// movement log so the caller can show what was acknowledged.
    pub async fn confirm_inventory_update(
        &self,
        request_id: &RequestId,
        technician: ActorId,
    ) -> Result<Vec<InventoryTransaction>, WorkflowError> {
        let filter = TransactionFilter {
            request_id: Some(request_id.clone()),
            material_id: None,
            since: None,
        };
        let history = self.store.list_transactions(&filter).await?;
        self.audit.emit(
            AuditEvent::new(
                Some(request_id.clone()),
                "inventory.update_confirmed",
                AuditCategory::Inventory,
                actor_label(technician),
                AuditOutcome::Success,
            )
            .with_metadata("transactions", history.len().to_string()),
        );
        Ok(history)
    }

    /// Movement log, newest window first-in. `days` of `None` means the full
    /// history.
    pub async fn transaction_history(
        &self,
        request_id: Option<RequestId>,
        material_id: Option<MaterialId>,
        days: Option<i64>,
    ) -> Result<Vec<InventoryTransaction>, WorkflowError> {
        let filter = TransactionFilter {
            request_id,
            material_id,
            since: days.map(|days| Utc::now() - Duration::days(days)),
        };
        Ok(self.store.list_transactions(&filter).await?)
    }
}

fn actor_label(actor: ActorId) -> String {
    format!("actor:{}", actor.0)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rust_decimal::Decimal;

    use crate::audit::InMemoryAuditSink;
    use crate::domain::inventory::{
        EquipmentLine, Material, MaterialId, StockLevel, TransactionKind,
    };
    use crate::domain::request::{ActorId, RequestId};
    use crate::errors::WorkflowError;
    use crate::inventory::InventoryService;
    use crate::memory::InMemoryInventoryStore;
    use crate::store::InventoryStore;

    fn material(id: &str, quantity: u32, min_quantity: u32) -> Material {
        Material {
            id: MaterialId(id.to_string()),
            name: id.to_string(),
            category: "network".to_string(),
            quantity_in_stock: quantity,
            min_quantity,
            unit: "pcs".to_string(),
            price: Decimal::new(12500, 2),
            location: "shelf 2".to_string(),
            supplier: Some("NetSupply".to_string()),
            is_active: true,
        }
    }

    fn line(id: &str, quantity: u32) -> EquipmentLine {
        EquipmentLine { material_id: MaterialId(id.to_string()), quantity }
    }

    async fn service_with(
        materials: &[Material],
    ) -> (InventoryService<InMemoryInventoryStore>, InMemoryAuditSink) {
        let store = InMemoryInventoryStore::new();
        for material in materials {
            store.upsert_material(material.clone()).await.expect("seed material");
        }
        let audit = InMemoryAuditSink::default();
        (InventoryService::new(store, Arc::new(audit.clone())), audit)
    }

    #[tokio::test]
    async fn reserving_unknown_material_is_rejected() {
        let (service, _) = service_with(&[]).await;

        let error = service
            .reserve_equipment(&RequestId("r-1".to_string()), &[line("ghost", 1)], ActorId(40))
            .await
            .expect_err("must reject");
        assert!(matches!(error, WorkflowError::UnknownMaterial(_)));
    }

    #[tokio::test]
    async fn reservation_checks_stock_without_decrementing_it() {
        let (service, audit) = service_with(&[material("router", 4, 2)]).await;
        let request_id = RequestId("r-1".to_string());

        service
            .reserve_equipment(&request_id, &[line("router", 3)], ActorId(40))
            .await
            .expect("reserve");

        let router = service
            .material(&MaterialId("router".to_string()))
            .await
            .expect("get")
            .expect("present");
        assert_eq!(router.quantity_in_stock, 4);

        let error = service
            .reserve_equipment(&RequestId("r-2".to_string()), &[line("router", 5)], ActorId(41))
            .await
            .expect_err("over-ask must fail");
        assert!(matches!(
            error,
            WorkflowError::InsufficientStock { requested: 5, available: 4, .. }
        ));

        let names: Vec<String> =
            audit.events().into_iter().map(|event| event.event_type).collect();
        assert_eq!(names, vec!["inventory.reserved", "inventory.reserve_rejected"]);
    }

    #[tokio::test]
    async fn consume_then_compensate_restores_the_ledger_balance() {
        let (service, _) = service_with(&[material("router", 10, 2)]).await;
        let request_id = RequestId("r-1".to_string());
        let lines = vec![line("router", 4)];

        service.consume_equipment(&request_id, &lines, ActorId(50)).await.expect("consume");
        service
            .compensate_consumption(&request_id, &lines, ActorId(50), "status write lost race")
            .await
            .expect("compensate");

        let router = service
            .material(&MaterialId("router".to_string()))
            .await
            .expect("get")
            .expect("present");
        assert_eq!(router.quantity_in_stock, 10);

        let history =
            service.transaction_history(Some(request_id), None, None).await.expect("history");
        let kinds: Vec<TransactionKind> = history.into_iter().map(|entry| entry.kind).collect();
        assert_eq!(kinds, vec![TransactionKind::Consume, TransactionKind::Return]);
    }

    #[tokio::test]
    async fn transaction_log_explains_every_stock_delta() {
        let (service, _) = service_with(&[material("router", 20, 2)]).await;
        let id = MaterialId("router".to_string());

        service
            .consume_equipment(&RequestId("r-1".to_string()), &[line("router", 6)], ActorId(50))
            .await
            .expect("consume");
        service.record_restock(&id, 3, ActorId(60), None).await.expect("restock");

        let history =
            service.transaction_history(None, Some(id.clone()), None).await.expect("history");
        let mut replayed: i64 = 20;
        for entry in &history {
            match entry.kind {
                TransactionKind::Consume => replayed -= i64::from(entry.quantity),
                TransactionKind::Return | TransactionKind::Restock => {
                    replayed += i64::from(entry.quantity)
                }
                TransactionKind::Reserve => {}
            }
        }

        let router = service.material(&id).await.expect("get").expect("present");
        assert_eq!(i64::from(router.quantity_in_stock), replayed);
    }

    #[tokio::test]
    async fn confirmation_reports_the_request_movements_without_touching_stock() {
        let (service, audit) = service_with(&[material("router", 10, 2)]).await;
        let request_id = RequestId("r-1".to_string());

        service
            .consume_equipment(&request_id, &[line("router", 2)], ActorId(50))
            .await
            .expect("consume");

        let history = service
            .confirm_inventory_update(&request_id, ActorId(44))
            .await
            .expect("confirm");
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].kind, TransactionKind::Consume);

        let router = service
            .material(&MaterialId("router".to_string()))
            .await
            .expect("get")
            .expect("present");
        assert_eq!(router.quantity_in_stock, 8);

        let names: Vec<String> =
            audit.events().into_iter().map(|event| event.event_type).collect();
        assert!(names.contains(&"inventory.update_confirmed".to_string()));
    }

    #[tokio::test]
    async fn summary_and_alerts_reflect_derived_levels() {
        let (service, _) = service_with(&[
            material("router", 25, 10),
            material("cable", 6, 10),
            material("splitter", 4, 10),
            material("onu", 0, 10),
        ])
        .await;

        let summary = service.check_stock_levels(None).await.expect("summary");
        assert_eq!(summary.total, 4);
        assert_eq!(summary.normal, 1);
        assert_eq!(summary.low, 1);
        assert_eq!(summary.critical, 1);
        assert_eq!(summary.out_of_stock, 1);

        let alerts = service.generate_stock_alerts().await.expect("alerts");
        assert_eq!(alerts.len(), 3);
        assert!(alerts.iter().any(|alert| alert.level == StockLevel::OutOfStock));
    }
}
