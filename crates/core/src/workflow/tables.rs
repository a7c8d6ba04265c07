//! Static transition tables, one per workflow kind.
//!
//! The tables are the single authority on what may happen to a request:
//! which role acts, where the request goes next, who becomes responsible,
//! and which inventory effect rides along. They are plain match expressions
//! so new arms fail to compile rather than silently falling through.

use crate::domain::request::{Action, RequestStatus, Role, WorkflowKind};

/// Inventory side effect bound to a transition. The engine runs the effect
/// before the status write and compensates it if the write loses the race.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InventoryEffect {
    None,
    Reserve,
    Consume,
    ReleaseReservation,
}

/// One legal edge of a workflow graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransitionRule {
    /// Role that must perform the action.
    pub actor: Role,
    pub next_status: RequestStatus,
    /// Role responsible for the request after the transition.
    pub next_role: Role,
    pub inventory: InventoryEffect,
}

const fn rule(
    actor: Role,
    next_status: RequestStatus,
    next_role: Role,
    inventory: InventoryEffect,
) -> TransitionRule {
    TransitionRule { actor, next_status, next_role, inventory }
}

/// Status and responsible role a freshly created request starts in.
pub fn initial_state(kind: WorkflowKind) -> (RequestStatus, Role) {
    match kind {
        WorkflowKind::ConnectionRequest => (RequestStatus::Created, Role::Manager),
        WorkflowKind::TechnicalService => (RequestStatus::Created, Role::Manager),
        WorkflowKind::CallCenterDirect => (RequestStatus::Created, Role::CallCenter),
    }
}

/// Looks up the rule for `action` from `status` under `kind`. `None` means
/// the action is not legal there.
pub fn rule_for(
    kind: WorkflowKind,
    status: RequestStatus,
    action: Action,
) -> Option<TransitionRule> {
    // Cross-cutting edges shared by every workflow kind.
    match (status, action) {
        (status, Action::CancelRequest) if !status.is_terminal() => {
            return Some(rule(
                Role::Manager,
                RequestStatus::Cancelled,
                Role::Manager,
                InventoryEffect::ReleaseReservation,
            ));
        }
        (RequestStatus::Completed, Action::RateService) => {
            return Some(rule(
                Role::Client,
                RequestStatus::Rated,
                Role::Client,
                InventoryEffect::None,
            ));
        }
        _ => {}
    }

    match kind {
        WorkflowKind::ConnectionRequest => connection_rule(status, action),
        WorkflowKind::TechnicalService => technical_rule(status, action),
        WorkflowKind::CallCenterDirect => call_center_rule(status, action),
    }
}

fn connection_rule(status: RequestStatus, action: Action) -> Option<TransitionRule> {
    use Action::*;
    use RequestStatus::*;

    match (status, action) {
        (Created, AssignToJuniorManager) => Some(rule(
            Role::Manager,
            PendingJuniorManager,
            Role::JuniorManager,
            InventoryEffect::None,
        )),
        (PendingJuniorManager, ScheduleInstallation) => Some(rule(
            Role::JuniorManager,
            PendingController,
            Role::Controller,
            InventoryEffect::None,
        )),
        (PendingController, ApproveInstallation) => Some(rule(
            Role::Controller,
            PendingTechnician,
            Role::Technician,
            InventoryEffect::None,
        )),
        (PendingTechnician, DocumentEquipment) => Some(rule(
            Role::Technician,
            PendingWarehouse,
            Role::Warehouse,
            InventoryEffect::Reserve,
        )),
        (PendingWarehouse, IssueEquipment) => Some(rule(
            Role::Warehouse,
            EquipmentIssued,
            Role::Technician,
            InventoryEffect::Consume,
        )),
        (EquipmentIssued, CompleteInstallation) => {
            Some(rule(Role::Technician, Completed, Role::Client, InventoryEffect::None))
        }
        _ => None,
    }
}

fn technical_rule(status: RequestStatus, action: Action) -> Option<TransitionRule> {
    use Action::*;
    use RequestStatus::*;

    match (status, action) {
        (Created, AssignTechnician) => Some(rule(
            Role::Manager,
            PendingTechnician,
            Role::Technician,
            InventoryEffect::None,
        )),
        (PendingTechnician, Diagnose) => {
            Some(rule(Role::Technician, Diagnosed, Role::Technician, InventoryEffect::None))
        }
        (Diagnosed, DocumentEquipment) => Some(rule(
            Role::Technician,
            PendingWarehouse,
            Role::Warehouse,
            InventoryEffect::Reserve,
        )),
        (Diagnosed, ResolveWithoutParts) => {
            Some(rule(Role::Technician, Completed, Role::Client, InventoryEffect::None))
        }
        (PendingWarehouse, IssueEquipment) => Some(rule(
            Role::Warehouse,
            EquipmentIssued,
            Role::Technician,
            InventoryEffect::Consume,
        )),
        (EquipmentIssued, CompleteService) => {
            Some(rule(Role::Technician, Completed, Role::Client, InventoryEffect::None))
        }
        _ => None,
    }
}

fn call_center_rule(status: RequestStatus, action: Action) -> Option<TransitionRule> {
    use Action::*;
    use RequestStatus::*;

    match (status, action) {
        (Created, ResolveRemotely) => {
            Some(rule(Role::CallCenter, Completed, Role::Client, InventoryEffect::None))
        }
        (Created, EscalateToManager) => {
            Some(rule(Role::CallCenter, PendingManager, Role::Manager, InventoryEffect::None))
        }
        (Created, CloseWithoutVisit) => {
            Some(rule(Role::CallCenter, Closed, Role::CallCenter, InventoryEffect::None))
        }
        (PendingManager, AssignTechnician) => Some(rule(
            Role::Manager,
            PendingTechnician,
            Role::Technician,
            InventoryEffect::None,
        )),
        (PendingTechnician, ResolveOnSite) => {
            Some(rule(Role::Technician, Completed, Role::Client, InventoryEffect::None))
        }
        _ => None,
    }
}

/// All actions legal from `status` under `kind`, in declaration order.
pub fn available_actions(kind: WorkflowKind, status: RequestStatus) -> Vec<Action> {
    Action::ALL
        .iter()
        .copied()
        .filter(|action| rule_for(kind, status, *action).is_some())
        .collect()
}
