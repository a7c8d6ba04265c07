//! Storage ports consumed by the workflow engine and inventory service.
//!
//! Implementations live in `fieldline-db` (SQLite) and in [`crate::memory`]
//! (in-process maps for tests and light deployments). Multi-item inventory
//! operations are part of the port so that each backend can make them
//! all-or-nothing inside its own transactional context.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::inventory::{
    EquipmentLine, InventoryTransaction, Material, MaterialId,
};
use crate::domain::request::{
    ActorId, ClientId, RequestId, RequestStatus, Role, ServiceRequest, StateTransition,
    WorkflowData,
};
use crate::errors::StoreError;

/// Result of the compare-and-swap status update. `Conflict` means the stored
/// status no longer matched the expectation: another actor already
/// transitioned the request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpdateOutcome {
    Applied,
    Conflict,
}

/// Result of an atomic multi-item consumption. A single failing line aborts
/// the whole batch with no mutation and no transaction logged.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConsumeOutcome {
    Applied,
    Insufficient { material_id: MaterialId, requested: u32, available: u32 },
    UnknownMaterial(MaterialId),
}

/// Everything the CAS write path replaces on a request record. The status
/// precondition travels separately so implementations can express the guard
/// in their own terms.
#[derive(Clone, Debug, PartialEq)]
pub struct RequestUpdate {
    pub new_status: RequestStatus,
    pub new_role: Role,
    pub state_data: WorkflowData,
    pub equipment_used: Vec<EquipmentLine>,
    pub inventory_updated: bool,
    pub completion_rating: Option<u8>,
    pub feedback_comments: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct TransactionFilter {
    pub request_id: Option<RequestId>,
    pub material_id: Option<MaterialId>,
    pub since: Option<DateTime<Utc>>,
}

/// Durable store of request records and their append-only transition history.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn get_request(&self, id: &RequestId) -> Result<Option<ServiceRequest>, StoreError>;

    async fn insert_request(&self, request: ServiceRequest) -> Result<(), StoreError>;

    /// Sole write path for status changes. Applies only when the stored
    /// `current_status` still equals `expected_status`.
    async fn update_request_state(
        &self,
        id: &RequestId,
        expected_status: RequestStatus,
        update: RequestUpdate,
    ) -> Result<UpdateOutcome, StoreError>;

    /// Appended only after a successful CAS, as part of the same logical
    /// unit of work.
    async fn append_transition(&self, transition: StateTransition) -> Result<(), StoreError>;

    async fn list_transitions(
        &self,
        request_id: &RequestId,
    ) -> Result<Vec<StateTransition>, StoreError>;

    async fn list_by_role(
        &self,
        role: Role,
        status: Option<RequestStatus>,
    ) -> Result<Vec<ServiceRequest>, StoreError>;

    async fn list_by_client(&self, client_id: ClientId)
        -> Result<Vec<ServiceRequest>, StoreError>;
}

/// Single source of truth for material stock and the append-only transaction
/// log that explains every mutation of it.
#[async_trait]
pub trait InventoryStore: Send + Sync {
    async fn get_material(&self, id: &MaterialId) -> Result<Option<Material>, StoreError>;

    /// Active materials only, optionally filtered by category.
    async fn list_materials(&self, category: Option<&str>) -> Result<Vec<Material>, StoreError>;

    async fn upsert_material(&self, material: Material) -> Result<(), StoreError>;

    /// Replaces the request's reservation set and logs one `reserve`
    /// transaction per line, atomically. Stock is not decremented.
    async fn record_reservation(
        &self,
        request_id: &RequestId,
        lines: &[EquipmentLine],
        performed_by: ActorId,
    ) -> Result<(), StoreError>;

    async fn reserved_lines(
        &self,
        request_id: &RequestId,
    ) -> Result<Vec<EquipmentLine>, StoreError>;

    /// Clears the reservation and logs one `return` transaction per line.
    /// Returns the released lines, or `None` when nothing was reserved.
    async fn release_reservation(
        &self,
        request_id: &RequestId,
        performed_by: ActorId,
        note: &str,
    ) -> Result<Option<Vec<EquipmentLine>>, StoreError>;

    /// Authoritative decrement: conditionally subtracts every line from
    /// stock, logs `consume` transactions, and clears the reservation. All
    /// of it commits together or not at all.
    async fn consume(
        &self,
        request_id: &RequestId,
        lines: &[EquipmentLine],
        performed_by: ActorId,
    ) -> Result<ConsumeOutcome, StoreError>;

    /// Compensation path: adds the lines back onto stock and logs `return`
    /// transactions referencing the request.
    async fn restore(
        &self,
        request_id: &RequestId,
        lines: &[EquipmentLine],
        performed_by: ActorId,
        note: &str,
    ) -> Result<(), StoreError>;

    /// Pure restock, not tied to any request.
    async fn record_restock(
        &self,
        material_id: &MaterialId,
        quantity: u32,
        performed_by: ActorId,
        notes: Option<String>,
    ) -> Result<(), StoreError>;

    async fn list_transactions(
        &self,
        filter: &TransactionFilter,
    ) -> Result<Vec<InventoryTransaction>, StoreError>;
}
