//! In-process store implementations backed by mutex-guarded maps.
//!
//! These are the reference implementations of the storage ports: engine
//! tests run against them, and they are good enough for single-process
//! deployments that do not need durability.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::domain::inventory::{
    EquipmentLine, InventoryTransaction, Material, MaterialId, TransactionId, TransactionKind,
};
use crate::domain::request::{
    ActorId, ClientId, RequestId, RequestStatus, Role, ServiceRequest, StateTransition,
};
use crate::errors::StoreError;
use crate::store::{
    ConsumeOutcome, InventoryStore, RequestUpdate, StateStore, TransactionFilter, UpdateOutcome,
};

#[derive(Debug, Default)]
struct StateInner {
    requests: HashMap<String, ServiceRequest>,
    transitions: Vec<StateTransition>,
}

#[derive(Clone, Debug, Default)]
pub struct InMemoryStateStore {
    inner: Arc<Mutex<StateInner>>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, StateInner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn get_request(&self, id: &RequestId) -> Result<Option<ServiceRequest>, StoreError> {
        Ok(self.lock().requests.get(&id.0).cloned())
    }

    async fn insert_request(&self, request: ServiceRequest) -> Result<(), StoreError> {
        self.lock().requests.insert(request.id.0.clone(), request);
        Ok(())
    }

    async fn update_request_state(
        &self,
        id: &RequestId,
        expected_status: RequestStatus,
        update: RequestUpdate,
    ) -> Result<UpdateOutcome, StoreError> {
        let mut inner = self.lock();
        // A missing record reports Conflict too: callers always load first,
        // so absence here means the precondition can no longer hold.
        let Some(request) = inner.requests.get_mut(&id.0) else {
            return Ok(UpdateOutcome::Conflict);
        };
        if request.current_status != expected_status {
            return Ok(UpdateOutcome::Conflict);
        }

        request.current_status = update.new_status;
        request.role_current = update.new_role;
        request.state_data = update.state_data;
        request.equipment_used = update.equipment_used;
        request.inventory_updated = update.inventory_updated;
        request.completion_rating = update.completion_rating;
        request.feedback_comments = update.feedback_comments;
        request.updated_at = update.updated_at;

        Ok(UpdateOutcome::Applied)
    }

    async fn append_transition(&self, transition: StateTransition) -> Result<(), StoreError> {
        self.lock().transitions.push(transition);
        Ok(())
    }

    async fn list_transitions(
        &self,
        request_id: &RequestId,
    ) -> Result<Vec<StateTransition>, StoreError> {
        let inner = self.lock();
        let mut transitions: Vec<StateTransition> = inner
            .transitions
            .iter()
            .filter(|transition| &transition.request_id == request_id)
            .cloned()
            .collect();
        transitions.sort_by_key(|transition| transition.occurred_at);
        Ok(transitions)
    }

    async fn list_by_role(
        &self,
        role: Role,
        status: Option<RequestStatus>,
    ) -> Result<Vec<ServiceRequest>, StoreError> {
        let inner = self.lock();
        let mut requests: Vec<ServiceRequest> = inner
            .requests
            .values()
            .filter(|request| {
                request.role_current == role
                    && status.map_or(true, |wanted| request.current_status == wanted)
            })
            .cloned()
            .collect();
        requests.sort_by_key(|request| request.created_at);
        Ok(requests)
    }

    async fn list_by_client(
        &self,
        client_id: ClientId,
    ) -> Result<Vec<ServiceRequest>, StoreError> {
        let inner = self.lock();
        let mut requests: Vec<ServiceRequest> = inner
            .requests
            .values()
            .filter(|request| request.client_id == client_id)
            .cloned()
            .collect();
        requests.sort_by_key(|request| request.created_at);
        Ok(requests)
    }
}

#[derive(Debug, Default)]
struct InventoryInner {
    materials: HashMap<String, Material>,
    reservations: HashMap<String, Vec<EquipmentLine>>,
    transactions: Vec<InventoryTransaction>,
}

#[derive(Clone, Debug, Default)]
pub struct InMemoryInventoryStore {
    inner: Arc<Mutex<InventoryInner>>,
}

impl InMemoryInventoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, InventoryInner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn transaction(
    request_id: Option<&RequestId>,
    material_id: &MaterialId,
    kind: TransactionKind,
    quantity: u32,
    performed_by: ActorId,
    notes: Option<String>,
) -> InventoryTransaction {
    InventoryTransaction {
        id: TransactionId(Uuid::new_v4().to_string()),
        request_id: request_id.cloned(),
        material_id: material_id.clone(),
        kind,
        quantity,
        performed_by,
        occurred_at: Utc::now(),
        notes,
    }
}

#[async_trait]
impl InventoryStore for InMemoryInventoryStore {
    async fn get_material(&self, id: &MaterialId) -> Result<Option<Material>, StoreError> {
        Ok(self.lock().materials.get(&id.0).cloned())
    }

    async fn list_materials(&self, category: Option<&str>) -> Result<Vec<Material>, StoreError> {
        let inner = self.lock();
        let mut materials: Vec<Material> = inner
            .materials
            .values()
            .filter(|material| {
                material.is_active
                    && category.map_or(true, |wanted| material.category == wanted)
            })
            .cloned()
            .collect();
        materials.sort_by(|a, b| a.id.0.cmp(&b.id.0));
        Ok(materials)
    }

    async fn upsert_material(&self, material: Material) -> Result<(), StoreError> {
        self.lock().materials.insert(material.id.0.clone(), material);
        Ok(())
    }

    async fn record_reservation(
        &self,
        request_id: &RequestId,
        lines: &[EquipmentLine],
        performed_by: ActorId,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock();
        inner.reservations.insert(request_id.0.clone(), lines.to_vec());
        for line in lines {
            let entry = transaction(
                Some(request_id),
                &line.material_id,
                TransactionKind::Reserve,
                line.quantity,
                performed_by,
                None,
            );
            inner.transactions.push(entry);
        }
        Ok(())
    }

    async fn reserved_lines(
        &self,
        request_id: &RequestId,
    ) -> Result<Vec<EquipmentLine>, StoreError> {
        Ok(self.lock().reservations.get(&request_id.0).cloned().unwrap_or_default())
    }

    async fn release_reservation(
        &self,
        request_id: &RequestId,
        performed_by: ActorId,
        note: &str,
    ) -> Result<Option<Vec<EquipmentLine>>, StoreError> {
        let mut inner = self.lock();
        let Some(lines) = inner.reservations.remove(&request_id.0) else {
            return Ok(None);
        };
        for line in &lines {
            let entry = transaction(
                Some(request_id),
                &line.material_id,
                TransactionKind::Return,
                line.quantity,
                performed_by,
                Some(note.to_string()),
            );
            inner.transactions.push(entry);
        }
        Ok(Some(lines))
    }

    async fn consume(
        &self,
        request_id: &RequestId,
        lines: &[EquipmentLine],
        performed_by: ActorId,
    ) -> Result<ConsumeOutcome, StoreError> {
        let mut inner = self.lock();

        // Validate every line before mutating anything: a single shortfall
        // must leave stock and the transaction log untouched.
        for line in lines {
            let Some(material) = inner.materials.get(&line.material_id.0) else {
                return Ok(ConsumeOutcome::UnknownMaterial(line.material_id.clone()));
            };
            if !material.is_active {
                return Ok(ConsumeOutcome::UnknownMaterial(line.material_id.clone()));
            }
            if material.quantity_in_stock < line.quantity {
                return Ok(ConsumeOutcome::Insufficient {
                    material_id: line.material_id.clone(),
                    requested: line.quantity,
                    available: material.quantity_in_stock,
                });
            }
        }

        for line in lines {
            if let Some(material) = inner.materials.get_mut(&line.material_id.0) {
                material.quantity_in_stock -= line.quantity;
            }
            let entry = transaction(
                Some(request_id),
                &line.material_id,
                TransactionKind::Consume,
                line.quantity,
                performed_by,
                None,
            );
            inner.transactions.push(entry);
        }
        inner.reservations.remove(&request_id.0);

        Ok(ConsumeOutcome::Applied)
    }

    async fn restore(
        &self,
        request_id: &RequestId,
        lines: &[EquipmentLine],
        performed_by: ActorId,
        note: &str,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock();
        for line in lines {
            let Some(material) = inner.materials.get_mut(&line.material_id.0) else {
                return Err(StoreError::Backend(format!(
                    "cannot restore unknown material `{}`",
                    line.material_id.0
                )));
            };
            material.quantity_in_stock += line.quantity;
            let entry = transaction(
                Some(request_id),
                &line.material_id,
                TransactionKind::Return,
                line.quantity,
                performed_by,
                Some(note.to_string()),
            );
            inner.transactions.push(entry);
        }
        Ok(())
    }

    async fn record_restock(
        &self,
        material_id: &MaterialId,
        quantity: u32,
        performed_by: ActorId,
        notes: Option<String>,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let Some(material) = inner.materials.get_mut(&material_id.0) else {
            return Err(StoreError::Backend(format!(
                "cannot restock unknown material `{}`",
                material_id.0
            )));
        };
        material.quantity_in_stock += quantity;
        let entry = transaction(
            None,
            material_id,
            TransactionKind::Restock,
            quantity,
            performed_by,
            notes,
        );
        inner.transactions.push(entry);
        Ok(())
    }

    async fn list_transactions(
        &self,
        filter: &TransactionFilter,
    ) -> Result<Vec<InventoryTransaction>, StoreError> {
        let inner = self.lock();
        let mut transactions: Vec<InventoryTransaction> = inner
            .transactions
            .iter()
            .filter(|entry| {
                filter
                    .request_id
                    .as_ref()
                    .map_or(true, |wanted| entry.request_id.as_ref() == Some(wanted))
                    && filter
                        .material_id
                        .as_ref()
                        .map_or(true, |wanted| &entry.material_id == wanted)
                    && filter.since.map_or(true, |since| entry.occurred_at >= since)
            })
            .cloned()
            .collect();
        transactions.sort_by_key(|entry| entry.occurred_at);
        Ok(transactions)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::Utc;
    use rust_decimal::Decimal;

    use crate::domain::inventory::{EquipmentLine, Material, MaterialId, TransactionKind};
    use crate::domain::request::{
        ActorId, ClientId, Priority, RequestId, RequestStatus, Role, ServiceRequest, WorkflowData,
        WorkflowKind,
    };
    use crate::memory::{InMemoryInventoryStore, InMemoryStateStore};
    use crate::store::{
        ConsumeOutcome, InventoryStore, RequestUpdate, StateStore, TransactionFilter,
        UpdateOutcome,
    };

    fn sample_request(id: &str, status: RequestStatus, role: Role) -> ServiceRequest {
        let now = Utc::now();
        ServiceRequest {
            id: RequestId(id.to_string()),
            workflow_kind: WorkflowKind::ConnectionRequest,
            client_id: ClientId(7),
            role_current: role,
            current_status: status,
            priority: Priority::Normal,
            description: "new fiber connection".to_string(),
            location: "Oak St 12".to_string(),
            contact_info: BTreeMap::new(),
            state_data: WorkflowData::empty(WorkflowKind::ConnectionRequest),
            equipment_used: Vec::new(),
            inventory_updated: false,
            completion_rating: None,
            feedback_comments: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn update_to(status: RequestStatus, role: Role) -> RequestUpdate {
        RequestUpdate {
            new_status: status,
            new_role: role,
            state_data: WorkflowData::empty(WorkflowKind::ConnectionRequest),
            equipment_used: Vec::new(),
            inventory_updated: false,
            completion_rating: None,
            feedback_comments: None,
            updated_at: Utc::now(),
        }
    }

    fn material(id: &str, quantity: u32) -> Material {
        Material {
            id: MaterialId(id.to_string()),
            name: id.to_string(),
            category: "network".to_string(),
            quantity_in_stock: quantity,
            min_quantity: 2,
            unit: "pcs".to_string(),
            price: Decimal::new(1999, 2),
            location: "shelf 1".to_string(),
            supplier: None,
            is_active: true,
        }
    }

    fn line(id: &str, quantity: u32) -> EquipmentLine {
        EquipmentLine { material_id: MaterialId(id.to_string()), quantity }
    }

    #[tokio::test]
    async fn cas_applies_once_and_conflicts_on_stale_expectation() {
        let store = InMemoryStateStore::new();
        let request = sample_request("r-1", RequestStatus::Created, Role::Manager);
        store.insert_request(request.clone()).await.expect("insert");

        let first = store
            .update_request_state(
                &request.id,
                RequestStatus::Created,
                update_to(RequestStatus::PendingJuniorManager, Role::JuniorManager),
            )
            .await
            .expect("first update");
        assert_eq!(first, UpdateOutcome::Applied);

        // Second attempt with the same stale expectation: exactly one of two
        // racing callers may win.
        let second = store
            .update_request_state(
                &request.id,
                RequestStatus::Created,
                update_to(RequestStatus::PendingController, Role::Controller),
            )
            .await
            .expect("second update");
        assert_eq!(second, UpdateOutcome::Conflict);

        let stored = store.get_request(&request.id).await.expect("get").expect("present");
        assert_eq!(stored.current_status, RequestStatus::PendingJuniorManager);
        assert_eq!(stored.role_current, Role::JuniorManager);
    }

    #[tokio::test]
    async fn role_queue_reflects_only_currently_responsible_requests() {
        let store = InMemoryStateStore::new();
        store
            .insert_request(sample_request("r-1", RequestStatus::Created, Role::Manager))
            .await
            .expect("insert r-1");
        store
            .insert_request(sample_request(
                "r-2",
                RequestStatus::PendingTechnician,
                Role::Technician,
            ))
            .await
            .expect("insert r-2");

        let manager_queue =
            store.list_by_role(Role::Manager, None).await.expect("manager queue");
        assert_eq!(manager_queue.len(), 1);
        assert_eq!(manager_queue[0].id.0, "r-1");

        let filtered = store
            .list_by_role(Role::Technician, Some(RequestStatus::Completed))
            .await
            .expect("filtered queue");
        assert!(filtered.is_empty());
    }

    #[tokio::test]
    async fn consume_shortfall_mutates_nothing_at_all() {
        let store = InMemoryInventoryStore::new();
        store.upsert_material(material("router", 10)).await.expect("seed router");
        store.upsert_material(material("cable", 3)).await.expect("seed cable");

        let outcome = store
            .consume(
                &RequestId("r-1".to_string()),
                &[line("router", 2), line("cable", 5)],
                ActorId(40),
            )
            .await
            .expect("consume");

        assert_eq!(
            outcome,
            ConsumeOutcome::Insufficient {
                material_id: MaterialId("cable".to_string()),
                requested: 5,
                available: 3,
            }
        );

        let router = store
            .get_material(&MaterialId("router".to_string()))
            .await
            .expect("get router")
            .expect("router present");
        assert_eq!(router.quantity_in_stock, 10);
        let logged =
            store.list_transactions(&TransactionFilter::default()).await.expect("transactions");
        assert!(logged.is_empty());
    }

    #[tokio::test]
    async fn release_returns_reserved_lines_and_logs_returns() {
        let store = InMemoryInventoryStore::new();
        store.upsert_material(material("router", 10)).await.expect("seed");
        let request_id = RequestId("r-1".to_string());

        store
            .record_reservation(&request_id, &[line("router", 2)], ActorId(40))
            .await
            .expect("reserve");
        let released = store
            .release_reservation(&request_id, ActorId(40), "request cancelled")
            .await
            .expect("release");
        assert_eq!(released, Some(vec![line("router", 2)]));

        // Soft hold: stock was never decremented.
        let router = store
            .get_material(&MaterialId("router".to_string()))
            .await
            .expect("get")
            .expect("present");
        assert_eq!(router.quantity_in_stock, 10);

        let kinds: Vec<TransactionKind> = store
            .list_transactions(&TransactionFilter::default())
            .await
            .expect("transactions")
            .into_iter()
            .map(|entry| entry.kind)
            .collect();
        assert_eq!(kinds, vec![TransactionKind::Reserve, TransactionKind::Return]);

        let again =
            store.release_reservation(&request_id, ActorId(40), "noop").await.expect("release");
        assert_eq!(again, None);
    }

    #[tokio::test]
    async fn restock_is_logged_without_a_request() {
        let store = InMemoryInventoryStore::new();
        store.upsert_material(material("router", 1)).await.expect("seed");

        store
            .record_restock(
                &MaterialId("router".to_string()),
                5,
                ActorId(50),
                Some("weekly delivery".to_string()),
            )
            .await
            .expect("restock");

        let router = store
            .get_material(&MaterialId("router".to_string()))
            .await
            .expect("get")
            .expect("present");
        assert_eq!(router.quantity_in_stock, 6);

        let transactions =
            store.list_transactions(&TransactionFilter::default()).await.expect("transactions");
        assert_eq!(transactions.len(), 1);
        assert_eq!(transactions[0].kind, TransactionKind::Restock);
        assert_eq!(transactions[0].request_id, None);
    }
}
