//! Workflow engine: the only write path for request lifecycles.
//!
//! Every mutation goes through the same sequence: load, consult the static
//! transition table, authorize the actor, run the bound inventory effect,
//! then a compare-and-swap status write. If the write loses the race the
//! inventory effect is compensated, so stock and status never drift apart.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink};
use crate::domain::inventory::EquipmentLine;
use crate::domain::request::{
    Action, ActorId, ClientId, Priority, RequestId, RequestStatus, Role, ServiceRequest,
    StateTransition, TransitionId, TransitionPayload, WorkflowKind,
};
use crate::errors::WorkflowError;
use crate::inventory::InventoryService;
use crate::notify::{NotificationEvent, NotificationQueue, Recipient};
use crate::store::{InventoryStore, RequestUpdate, StateStore, UpdateOutcome};
use crate::workflow::tables::{available_actions, initial_state, rule_for, InventoryEffect};

/// Everything a client submits to open a request.
#[derive(Clone, Debug, PartialEq)]
pub struct NewRequest {
    pub workflow_kind: WorkflowKind,
    pub client_id: ClientId,
    pub priority: Priority,
    pub description: String,
    pub location: String,
    pub contact_info: BTreeMap<String, String>,
}

/// What a successful transition reports back to the caller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransitionReceipt {
    pub request_id: RequestId,
    pub from_status: RequestStatus,
    pub to_status: RequestStatus,
    pub next_role: Role,
}

/// Read-model snapshot: where the request is, who is responsible, what can
/// happen next, and the full transition history.
#[derive(Clone, Debug, PartialEq)]
pub struct WorkflowStatus {
    pub request: ServiceRequest,
    pub available_actions: Vec<Action>,
    pub history: Vec<StateTransition>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompletionInput {
    pub rating: u8,
    pub feedback: Option<String>,
}

pub struct WorkflowEngine<S, I> {
    state: S,
    inventory: InventoryService<I>,
    notifications: NotificationQueue,
    audit: Arc<dyn AuditSink>,
}

impl<S: StateStore, I: InventoryStore> WorkflowEngine<S, I> {
    pub fn new(
        state: S,
        inventory: InventoryService<I>,
        notifications: NotificationQueue,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self { state, inventory, notifications, audit }
    }

    pub fn inventory(&self) -> &InventoryService<I> {
        &self.inventory
    }

    /// Opens a request in its kind's initial status and notifies the first
    /// responsible role.
    pub async fn initiate_workflow(
        &self,
        new: NewRequest,
    ) -> Result<ServiceRequest, WorkflowError> {
        let (status, role) = initial_state(new.workflow_kind);
        let now = Utc::now();
        let request = ServiceRequest {
            id: RequestId(format!("SR-{}", Uuid::new_v4())),
            workflow_kind: new.workflow_kind,
            client_id: new.client_id,
            role_current: role,
            current_status: status,
            priority: new.priority,
            description: new.description,
            location: new.location,
            contact_info: new.contact_info,
            state_data: crate::domain::request::WorkflowData::empty(new.workflow_kind),
            equipment_used: Vec::new(),
            inventory_updated: false,
            completion_rating: None,
            feedback_comments: None,
            created_at: now,
            updated_at: now,
        };

        self.state.insert_request(request.clone()).await?;
        self.audit.emit(
            AuditEvent::new(
                Some(request.id.clone()),
                "workflow.initiated",
                AuditCategory::Workflow,
                format!("client:{}", request.client_id.0),
                AuditOutcome::Success,
            )
            .with_metadata("workflow_kind", request.workflow_kind.as_str()),
        );
        self.notifications.enqueue(NotificationEvent {
            request_id: request.id.clone(),
            recipient: Recipient::Role(role),
            status,
            message: format!("new {} request awaiting action", request.workflow_kind.as_str()),
        });

        tracing::info!(
            event_name = "workflow.initiated",
            request_id = %request.id.0,
            workflow_kind = request.workflow_kind.as_str(),
            "request opened"
        );
        Ok(request)
    }

    /// Applies one action on behalf of an actor. Rejections leave no
    /// persisted side effects; a lost update race is surfaced as
    /// [`WorkflowError::Conflict`] after compensation.
    pub async fn transition_workflow(
        &self,
        request_id: &RequestId,
        action: Action,
        actor_role: Role,
        actor_id: ActorId,
        payload: TransitionPayload,
    ) -> Result<TransitionReceipt, WorkflowError> {
        self.apply(request_id, action, actor_role, actor_id, payload, None, None).await
    }

    /// Client-facing terminal step: records the rating and feedback while
    /// moving the request from `Completed` to `Rated`.
    pub async fn complete_workflow(
        &self,
        request_id: &RequestId,
        input: CompletionInput,
    ) -> Result<TransitionReceipt, WorkflowError> {
        if !(1..=5).contains(&input.rating) {
            return Err(WorkflowError::InvalidRating(input.rating));
        }
        let request = self
            .state
            .get_request(request_id)
            .await?
            .ok_or_else(|| WorkflowError::NotFound(request_id.clone()))?;

        let payload = TransitionPayload {
            notes: input.feedback.clone(),
            ..TransitionPayload::default()
        };
        self.apply(
            request_id,
            Action::RateService,
            Role::Client,
            ActorId(request.client_id.0),
            payload,
            Some(input.rating),
            input.feedback,
        )
        .await
    }

    pub async fn get_workflow_status(
        &self,
        request_id: &RequestId,
    ) -> Result<WorkflowStatus, WorkflowError> {
        let request = self
            .state
            .get_request(request_id)
            .await?
            .ok_or_else(|| WorkflowError::NotFound(request_id.clone()))?;
        let history = self.state.list_transitions(request_id).await?;
        let available_actions =
            available_actions(request.workflow_kind, request.current_status);
        Ok(WorkflowStatus { request, available_actions, history })
    }

    /// Work queue for a role, optionally narrowed to one status.
    pub async fn get_requests_for_role(
        &self,
        role: Role,
        status: Option<RequestStatus>,
    ) -> Result<Vec<ServiceRequest>, WorkflowError> {
        Ok(self.state.list_by_role(role, status).await?)
    }

    pub async fn get_requests_for_client(
        &self,
        client_id: ClientId,
    ) -> Result<Vec<ServiceRequest>, WorkflowError> {
        Ok(self.state.list_by_client(client_id).await?)
    }

    #[allow(clippy::too_many_arguments)]
    async fn apply(
        &self,
        request_id: &RequestId,
        action: Action,
        actor_role: Role,
        actor_id: ActorId,
        payload: TransitionPayload,
        rating: Option<u8>,
        feedback: Option<String>,
    ) -> Result<TransitionReceipt, WorkflowError> {
        let request = self
            .state
            .get_request(request_id)
            .await?
            .ok_or_else(|| WorkflowError::NotFound(request_id.clone()))?;
        let from_status = request.current_status;

        let rule = rule_for(request.workflow_kind, from_status, action)
            .ok_or(WorkflowError::InvalidTransition { status: from_status, action })?;
        if actor_role != rule.actor {
            self.audit.emit(
                AuditEvent::new(
                    Some(request_id.clone()),
                    "workflow.transition_forbidden",
                    AuditCategory::Workflow,
                    format!("actor:{}", actor_id.0),
                    AuditOutcome::Rejected,
                )
                .with_metadata("action", action.as_str())
                .with_metadata("required_role", rule.actor.as_str()),
            );
            return Err(WorkflowError::Forbidden {
                action,
                required: rule.actor,
                actual: actor_role,
            });
        }

        // Inventory effect runs first; on a lost CAS it is compensated below.
        let effect = self.run_inventory_effect(&request, rule.inventory, &payload, actor_id).await?;

        let mut state_data = request.state_data.clone();
        state_data.apply_payload(action, &payload);

        let equipment_used = match &effect {
            AppliedEffect::Consumed(lines) => lines.clone(),
            _ => request.equipment_used.clone(),
        };
        let inventory_updated =
            request.inventory_updated || matches!(effect, AppliedEffect::Consumed(_));

        let update = RequestUpdate {
            new_status: rule.next_status,
            new_role: rule.next_role,
            state_data,
            equipment_used,
            inventory_updated,
            completion_rating: rating.or(request.completion_rating),
            feedback_comments: feedback.or_else(|| request.feedback_comments.clone()),
            updated_at: Utc::now(),
        };

        match self.state.update_request_state(request_id, from_status, update).await? {
            UpdateOutcome::Applied => {}
            UpdateOutcome::Conflict => {
                self.compensate(request_id, effect, actor_id).await?;
                self.audit.emit(
                    AuditEvent::new(
                        Some(request_id.clone()),
                        "workflow.transition_conflict",
                        AuditCategory::Workflow,
                        format!("actor:{}", actor_id.0),
                        AuditOutcome::Failed,
                    )
                    .with_metadata("action", action.as_str()),
                );
                return Err(WorkflowError::Conflict);
            }
        }

        self.state
            .append_transition(StateTransition {
                id: TransitionId(Uuid::new_v4().to_string()),
                request_id: request_id.clone(),
                from_status,
                to_status: rule.next_status,
                action,
                actor_role,
                actor_id,
                payload_json: payload.snapshot_json(),
                occurred_at: Utc::now(),
            })
            .await?;

        self.audit.emit(
            AuditEvent::new(
                Some(request_id.clone()),
                "workflow.transition_applied",
                AuditCategory::Workflow,
                format!("actor:{}", actor_id.0),
                AuditOutcome::Success,
            )
            .with_metadata("action", action.as_str())
            .with_metadata("from", from_status.as_str())
            .with_metadata("to", rule.next_status.as_str()),
        );

        let recipient = if rule.next_status.is_terminal() || rule.next_role == Role::Client {
            Recipient::Client(request.client_id)
        } else {
            Recipient::Role(rule.next_role)
        };
        self.notifications.enqueue(NotificationEvent {
            request_id: request_id.clone(),
            recipient,
            status: rule.next_status,
            message: format!(
                "request moved to {} via {}",
                rule.next_status.as_str(),
                action.as_str()
            ),
        });

        tracing::info!(
            event_name = "workflow.transition_applied",
            request_id = %request_id.0,
            action = action.as_str(),
            from = from_status.as_str(),
            to = rule.next_status.as_str(),
            "transition applied"
        );

        Ok(TransitionReceipt {
            request_id: request_id.clone(),
            from_status,
            to_status: rule.next_status,
            next_role: rule.next_role,
        })
    }

    async fn run_inventory_effect(
        &self,
        request: &ServiceRequest,
        effect: InventoryEffect,
        payload: &TransitionPayload,
        actor_id: ActorId,
    ) -> Result<AppliedEffect, WorkflowError> {
        match effect {
            InventoryEffect::None => Ok(AppliedEffect::None),
            InventoryEffect::Reserve => {
                if payload.equipment.is_empty() {
                    return Err(WorkflowError::MissingPayloadField { field: "equipment" });
                }
                self.inventory
                    .reserve_equipment(&request.id, &payload.equipment, actor_id)
                    .await?;
                Ok(AppliedEffect::Reserved)
            }
            InventoryEffect::Consume => {
                // The warehouse issues what the technician documented; an
                // explicit payload may narrow the recorded hold but never
                // exceed it, so the per-material reserve/consume balance
                // stays non-negative.
                let reserved = self.inventory.store().reserved_lines(&request.id).await?;
                let lines = if payload.equipment.is_empty() {
                    reserved
                } else {
                    for line in &payload.equipment {
                        let held = reserved
                            .iter()
                            .find(|held| held.material_id == line.material_id)
                            .map_or(0, |held| held.quantity);
                        if line.quantity > held {
                            return Err(WorkflowError::ExceedsReservation {
                                material_id: line.material_id.clone(),
                                requested: line.quantity,
                                reserved: held,
                            });
                        }
                    }
                    payload.equipment.clone()
                };
                if lines.is_empty() {
                    return Err(WorkflowError::MissingPayloadField { field: "equipment" });
                }
                self.inventory.consume_equipment(&request.id, &lines, actor_id).await?;
                Ok(AppliedEffect::Consumed(lines))
            }
            InventoryEffect::ReleaseReservation => {
                let released = self
                    .inventory
                    .cancel_reservation(&request.id, actor_id, "request cancelled")
                    .await?;
                Ok(AppliedEffect::Released(released))
            }
        }
    }

    async fn compensate(
        &self,
        request_id: &RequestId,
        effect: AppliedEffect,
        actor_id: ActorId,
    ) -> Result<(), WorkflowError> {
        match effect {
            AppliedEffect::None => Ok(()),
            AppliedEffect::Reserved => {
                self.inventory
                    .cancel_reservation(request_id, actor_id, "transition lost update race")
                    .await?;
                Ok(())
            }
            AppliedEffect::Consumed(lines) => {
                self.inventory
                    .compensate_consumption(
                        request_id,
                        &lines,
                        actor_id,
                        "transition lost update race",
                    )
                    .await?;
                // Consuming cleared the hold; put it back so a retry can
                // still issue the same lines.
                self.inventory.restore_reservation(request_id, &lines, actor_id).await
            }
            AppliedEffect::Released(Some(lines)) => {
                self.inventory.restore_reservation(request_id, &lines, actor_id).await
            }
            AppliedEffect::Released(None) => Ok(()),
        }
    }
}

/// What the inventory effect actually did, kept so a failed CAS knows how to
/// undo it.
enum AppliedEffect {
    None,
    Reserved,
    Consumed(Vec<EquipmentLine>),
    Released(Option<Vec<EquipmentLine>>),
}
