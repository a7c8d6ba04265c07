pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod inventory;
pub mod memory;
pub mod notify;
pub mod store;
pub mod workflow;

pub use audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink, InMemoryAuditSink, LogAuditSink};
pub use config::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};
pub use domain::inventory::{
    EquipmentLine, InventoryTransaction, Material, MaterialId, StockAlert, StockLevel,
    StockSummary, TransactionId, TransactionKind,
};
pub use domain::request::{
    Action, ActorId, ClientId, Priority, RequestId, RequestStatus, Role, ServiceRequest,
    StateTransition, TransitionId, TransitionPayload, WorkflowData, WorkflowKind,
};
pub use errors::{StoreError, WorkflowError};
pub use inventory::InventoryService;
pub use memory::{InMemoryInventoryStore, InMemoryStateStore};
pub use notify::{
    notification_channel, spawn_dispatcher, DispatchPolicy, InMemoryNotifier, NotificationEvent,
    NotificationPort, NotificationQueue, Recipient, TransportFailure,
};
pub use store::{
    ConsumeOutcome, InventoryStore, RequestUpdate, StateStore, TransactionFilter, UpdateOutcome,
};
pub use workflow::{
    CompletionInput, NewRequest, TransitionReceipt, WorkflowEngine, WorkflowStatus,
};
