use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::inventory::EquipmentLine;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientId(pub i64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActorId(pub i64);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransitionId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowKind {
    ConnectionRequest,
    TechnicalService,
    CallCenterDirect,
}

impl WorkflowKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConnectionRequest => "connection_request",
            Self::TechnicalService => "technical_service",
            Self::CallCenterDirect => "call_center_direct",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "connection_request" => Some(Self::ConnectionRequest),
            "technical_service" => Some(Self::TechnicalService),
            "call_center_direct" => Some(Self::CallCenterDirect),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Manager,
    JuniorManager,
    Controller,
    Technician,
    Warehouse,
    CallCenter,
    Client,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manager => "manager",
            Self::JuniorManager => "junior_manager",
            Self::Controller => "controller",
            Self::Technician => "technician",
            Self::Warehouse => "warehouse",
            Self::CallCenter => "call_center",
            Self::Client => "client",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "manager" => Some(Self::Manager),
            "junior_manager" => Some(Self::JuniorManager),
            "controller" => Some(Self::Controller),
            "technician" => Some(Self::Technician),
            "warehouse" => Some(Self::Warehouse),
            "call_center" => Some(Self::CallCenter),
            "client" => Some(Self::Client),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Created,
    PendingJuniorManager,
    PendingController,
    PendingTechnician,
    Diagnosed,
    PendingWarehouse,
    EquipmentIssued,
    PendingManager,
    Completed,
    Rated,
    Closed,
    Cancelled,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::PendingJuniorManager => "pending_junior_manager",
            Self::PendingController => "pending_controller",
            Self::PendingTechnician => "pending_technician",
            Self::Diagnosed => "diagnosed",
            Self::PendingWarehouse => "pending_warehouse",
            Self::EquipmentIssued => "equipment_issued",
            Self::PendingManager => "pending_manager",
            Self::Completed => "completed",
            Self::Rated => "rated",
            Self::Closed => "closed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "created" => Some(Self::Created),
            "pending_junior_manager" => Some(Self::PendingJuniorManager),
            "pending_controller" => Some(Self::PendingController),
            "pending_technician" => Some(Self::PendingTechnician),
            "diagnosed" => Some(Self::Diagnosed),
            "pending_warehouse" => Some(Self::PendingWarehouse),
            "equipment_issued" => Some(Self::EquipmentIssued),
            "pending_manager" => Some(Self::PendingManager),
            "completed" => Some(Self::Completed),
            "rated" => Some(Self::Rated),
            "closed" => Some(Self::Closed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Terminal statuses accept no further actions; the record is retained
    /// indefinitely for audit.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Rated | Self::Closed | Self::Cancelled)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Normal,
    High,
    Urgent,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" => Some(Self::Low),
            "normal" => Some(Self::Normal),
            "high" => Some(Self::High),
            "urgent" => Some(Self::Urgent),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    AssignToJuniorManager,
    ScheduleInstallation,
    ApproveInstallation,
    AssignTechnician,
    Diagnose,
    DocumentEquipment,
    ResolveWithoutParts,
    IssueEquipment,
    CompleteInstallation,
    CompleteService,
    ResolveRemotely,
    EscalateToManager,
    ResolveOnSite,
    CloseWithoutVisit,
    RateService,
    CancelRequest,
}

impl Action {
    pub const ALL: [Action; 16] = [
        Self::AssignToJuniorManager,
        Self::ScheduleInstallation,
        Self::ApproveInstallation,
        Self::AssignTechnician,
        Self::Diagnose,
        Self::DocumentEquipment,
        Self::ResolveWithoutParts,
        Self::IssueEquipment,
        Self::CompleteInstallation,
        Self::CompleteService,
        Self::ResolveRemotely,
        Self::EscalateToManager,
        Self::ResolveOnSite,
        Self::CloseWithoutVisit,
        Self::RateService,
        Self::CancelRequest,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AssignToJuniorManager => "assign_to_junior_manager",
            Self::ScheduleInstallation => "schedule_installation",
            Self::ApproveInstallation => "approve_installation",
            Self::AssignTechnician => "assign_technician",
            Self::Diagnose => "diagnose",
            Self::DocumentEquipment => "document_equipment",
            Self::ResolveWithoutParts => "resolve_without_parts",
            Self::IssueEquipment => "issue_equipment",
            Self::CompleteInstallation => "complete_installation",
            Self::CompleteService => "complete_service",
            Self::ResolveRemotely => "resolve_remotely",
            Self::EscalateToManager => "escalate_to_manager",
            Self::ResolveOnSite => "resolve_on_site",
            Self::CloseWithoutVisit => "close_without_visit",
            Self::RateService => "rate_service",
            Self::CancelRequest => "cancel_request",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|action| action.as_str() == value.trim())
    }
}

/// Role-specific scratch data accumulated across transitions. One variant per
/// workflow kind; each carries an open `extra` map for provisional fields that
/// have not earned a typed slot yet.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "workflow", rename_all = "snake_case")]
pub enum WorkflowData {
    Connection(ConnectionData),
    Technical(TechnicalData),
    CallCenter(CallCenterData),
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectionData {
    pub junior_manager: Option<ActorId>,
    pub technician: Option<ActorId>,
    pub installation_window: Option<String>,
    pub installation_notes: Option<String>,
    pub documented_equipment: Vec<EquipmentLine>,
    #[serde(default)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TechnicalData {
    pub technician: Option<ActorId>,
    pub diagnosis: Option<String>,
    pub resolution: Option<String>,
    pub service_notes: Option<String>,
    pub documented_equipment: Vec<EquipmentLine>,
    #[serde(default)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CallCenterData {
    pub technician: Option<ActorId>,
    pub resolution: Option<String>,
    pub call_notes: Vec<String>,
    #[serde(default)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl WorkflowData {
    pub fn empty(kind: WorkflowKind) -> Self {
        match kind {
            WorkflowKind::ConnectionRequest => Self::Connection(ConnectionData::default()),
            WorkflowKind::TechnicalService => Self::Technical(TechnicalData::default()),
            WorkflowKind::CallCenterDirect => Self::CallCenter(CallCenterData::default()),
        }
    }

    pub fn kind(&self) -> WorkflowKind {
        match self {
            Self::Connection(_) => WorkflowKind::ConnectionRequest,
            Self::Technical(_) => WorkflowKind::TechnicalService,
            Self::CallCenter(_) => WorkflowKind::CallCenterDirect,
        }
    }

    /// Merges what an actor submitted into the typed scratch data. Unknown
    /// keys land in the open extension map instead of being dropped.
    pub fn apply_payload(&mut self, action: Action, payload: &TransitionPayload) {
        match self {
            Self::Connection(data) => {
                if let Some(assignee) = payload.assignee {
                    match action {
                        Action::AssignToJuniorManager => data.junior_manager = Some(assignee),
                        _ => data.technician = Some(assignee),
                    }
                }
                if let Some(schedule) = &payload.schedule {
                    data.installation_window = Some(schedule.clone());
                }
                if let Some(notes) = &payload.notes {
                    data.installation_notes = Some(notes.clone());
                }
                if !payload.equipment.is_empty() {
                    data.documented_equipment = payload.equipment.clone();
                }
                data.extra.extend(payload.extra.clone());
            }
            Self::Technical(data) => {
                if let Some(assignee) = payload.assignee {
                    data.technician = Some(assignee);
                }
                if let Some(diagnosis) = &payload.diagnosis {
                    data.diagnosis = Some(diagnosis.clone());
                }
                if let Some(resolution) = &payload.resolution {
                    data.resolution = Some(resolution.clone());
                }
                if let Some(notes) = &payload.notes {
                    data.service_notes = Some(notes.clone());
                }
                if !payload.equipment.is_empty() {
                    data.documented_equipment = payload.equipment.clone();
                }
                data.extra.extend(payload.extra.clone());
            }
            Self::CallCenter(data) => {
                if let Some(assignee) = payload.assignee {
                    data.technician = Some(assignee);
                }
                if let Some(resolution) = &payload.resolution {
                    data.resolution = Some(resolution.clone());
                }
                if let Some(notes) = &payload.notes {
                    data.call_notes.push(notes.clone());
                }
                data.extra.extend(payload.extra.clone());
            }
        }
    }
}

/// What an actor submits alongside an action. The whole payload is also
/// snapshotted verbatim onto the transition record.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TransitionPayload {
    pub assignee: Option<ActorId>,
    pub schedule: Option<String>,
    pub diagnosis: Option<String>,
    pub resolution: Option<String>,
    pub notes: Option<String>,
    #[serde(default)]
    pub equipment: Vec<EquipmentLine>,
    #[serde(default)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl TransitionPayload {
    pub fn snapshot_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ServiceRequest {
    pub id: RequestId,
    pub workflow_kind: WorkflowKind,
    pub client_id: ClientId,
    pub role_current: Role,
    pub current_status: RequestStatus,
    pub priority: Priority,
    pub description: String,
    pub location: String,
    pub contact_info: BTreeMap<String, String>,
    pub state_data: WorkflowData,
    pub equipment_used: Vec<EquipmentLine>,
    pub inventory_updated: bool,
    pub completion_rating: Option<u8>,
    pub feedback_comments: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Append-only audit record of one applied transition. Never mutated or
/// deleted; the sequence ordered by `occurred_at` is the complete lifecycle.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateTransition {
    pub id: TransitionId,
    pub request_id: RequestId,
    pub from_status: RequestStatus,
    pub to_status: RequestStatus,
    pub action: Action,
    pub actor_role: Role,
    pub actor_id: ActorId,
    pub payload_json: String,
    pub occurred_at: DateTime<Utc>,
}
