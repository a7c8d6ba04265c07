use std::collections::BTreeMap;

use async_trait::async_trait;
use sqlx::Row;

use fieldline_core::domain::inventory::EquipmentLine;
use fieldline_core::domain::request::{
    Action, ActorId, ClientId, Priority, RequestId, RequestStatus, Role, ServiceRequest,
    StateTransition, TransitionId, WorkflowData, WorkflowKind,
};
use fieldline_core::errors::StoreError;
use fieldline_core::store::{RequestUpdate, StateStore, UpdateOutcome};

use super::{backend, decode, parse_timestamp};
use crate::DbPool;

pub struct SqlStateStore {
    pool: DbPool,
}

impl SqlStateStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

const REQUEST_COLUMNS: &str = "id, workflow_kind, client_id, role_current, current_status, \
     priority, description, location, contact_info_json, state_data_json, equipment_used_json, \
     inventory_updated, completion_rating, feedback_comments, created_at, updated_at";

fn row_to_request(row: &sqlx::sqlite::SqliteRow) -> Result<ServiceRequest, StoreError> {
    let id: String = row.try_get("id").map_err(backend)?;
    let workflow_kind_str: String = row.try_get("workflow_kind").map_err(backend)?;
    let client_id: i64 = row.try_get("client_id").map_err(backend)?;
    let role_str: String = row.try_get("role_current").map_err(backend)?;
    let status_str: String = row.try_get("current_status").map_err(backend)?;
    let priority_str: String = row.try_get("priority").map_err(backend)?;
    let description: String = row.try_get("description").map_err(backend)?;
    let location: String = row.try_get("location").map_err(backend)?;
    let contact_info_json: String = row.try_get("contact_info_json").map_err(backend)?;
    let state_data_json: String = row.try_get("state_data_json").map_err(backend)?;
    let equipment_used_json: String = row.try_get("equipment_used_json").map_err(backend)?;
    let inventory_updated: bool = row.try_get("inventory_updated").map_err(backend)?;
    let completion_rating: Option<i64> = row.try_get("completion_rating").map_err(backend)?;
    let feedback_comments: Option<String> = row.try_get("feedback_comments").map_err(backend)?;
    let created_at_str: String = row.try_get("created_at").map_err(backend)?;
    let updated_at_str: String = row.try_get("updated_at").map_err(backend)?;

    let workflow_kind = WorkflowKind::parse(&workflow_kind_str)
        .ok_or_else(|| decode(format!("unknown workflow kind `{workflow_kind_str}`")))?;
    let role_current =
        Role::parse(&role_str).ok_or_else(|| decode(format!("unknown role `{role_str}`")))?;
    let current_status = RequestStatus::parse(&status_str)
        .ok_or_else(|| decode(format!("unknown status `{status_str}`")))?;
    let priority = Priority::parse(&priority_str)
        .ok_or_else(|| decode(format!("unknown priority `{priority_str}`")))?;

    let contact_info: BTreeMap<String, String> = serde_json::from_str(&contact_info_json)
        .map_err(|error| decode(format!("invalid contact_info_json: {error}")))?;
    let state_data: WorkflowData = serde_json::from_str(&state_data_json)
        .map_err(|error| decode(format!("invalid state_data_json: {error}")))?;
    let equipment_used: Vec<EquipmentLine> = serde_json::from_str(&equipment_used_json)
        .map_err(|error| decode(format!("invalid equipment_used_json: {error}")))?;

    let completion_rating = match completion_rating {
        None => None,
        Some(raw) => Some(
            u8::try_from(raw)
                .map_err(|_| decode(format!("invalid completion_rating: {raw}")))?,
        ),
    };

    Ok(ServiceRequest {
        id: RequestId(id),
        workflow_kind,
        client_id: ClientId(client_id),
        role_current,
        current_status,
        priority,
        description,
        location,
        contact_info,
        state_data,
        equipment_used,
        inventory_updated,
        completion_rating,
        feedback_comments,
        created_at: parse_timestamp("created_at", &created_at_str)?,
        updated_at: parse_timestamp("updated_at", &updated_at_str)?,
    })
}

fn row_to_transition(row: &sqlx::sqlite::SqliteRow) -> Result<StateTransition, StoreError> {
    let id: String = row.try_get("id").map_err(backend)?;
    let request_id: String = row.try_get("request_id").map_err(backend)?;
    let from_str: String = row.try_get("from_status").map_err(backend)?;
    let to_str: String = row.try_get("to_status").map_err(backend)?;
    let action_str: String = row.try_get("action").map_err(backend)?;
    let actor_role_str: String = row.try_get("actor_role").map_err(backend)?;
    let actor_id: i64 = row.try_get("actor_id").map_err(backend)?;
    let payload_json: String = row.try_get("payload_json").map_err(backend)?;
    let occurred_at_str: String = row.try_get("occurred_at").map_err(backend)?;

    Ok(StateTransition {
        id: TransitionId(id),
        request_id: RequestId(request_id),
        from_status: RequestStatus::parse(&from_str)
            .ok_or_else(|| decode(format!("unknown status `{from_str}`")))?,
        to_status: RequestStatus::parse(&to_str)
            .ok_or_else(|| decode(format!("unknown status `{to_str}`")))?,
        action: Action::parse(&action_str)
            .ok_or_else(|| decode(format!("unknown action `{action_str}`")))?,
        actor_role: Role::parse(&actor_role_str)
            .ok_or_else(|| decode(format!("unknown role `{actor_role_str}`")))?,
        actor_id: ActorId(actor_id),
        payload_json,
        occurred_at: parse_timestamp("occurred_at", &occurred_at_str)?,
    })
}

fn to_json<T: serde::Serialize>(value: &T, column: &str) -> Result<String, StoreError> {
    serde_json::to_string(value).map_err(|error| decode(format!("cannot encode {column}: {error}")))
}

#[async_trait]
impl StateStore for SqlStateStore {
    async fn get_request(&self, id: &RequestId) -> Result<Option<ServiceRequest>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {REQUEST_COLUMNS} FROM service_request WHERE id = ?"
        ))
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        match row {
            Some(ref row) => Ok(Some(row_to_request(row)?)),
            None => Ok(None),
        }
    }

    async fn insert_request(&self, request: ServiceRequest) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO service_request (id, workflow_kind, client_id, role_current,
                 current_status, priority, description, location, contact_info_json,
                 state_data_json, equipment_used_json, inventory_updated, completion_rating,
                 feedback_comments, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&request.id.0)
        .bind(request.workflow_kind.as_str())
        .bind(request.client_id.0)
        .bind(request.role_current.as_str())
        .bind(request.current_status.as_str())
        .bind(request.priority.as_str())
        .bind(&request.description)
        .bind(&request.location)
        .bind(to_json(&request.contact_info, "contact_info_json")?)
        .bind(to_json(&request.state_data, "state_data_json")?)
        .bind(to_json(&request.equipment_used, "equipment_used_json")?)
        .bind(request.inventory_updated)
        .bind(request.completion_rating.map(i64::from))
        .bind(&request.feedback_comments)
        .bind(request.created_at.to_rfc3339())
        .bind(request.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        Ok(())
    }

    async fn update_request_state(
        &self,
        id: &RequestId,
        expected_status: RequestStatus,
        update: RequestUpdate,
    ) -> Result<UpdateOutcome, StoreError> {
        // The status guard in the WHERE clause is the whole concurrency
        // story: zero affected rows means someone else moved first.
        let result = sqlx::query(
            "UPDATE service_request SET
                 current_status = ?,
                 role_current = ?,
                 state_data_json = ?,
                 equipment_used_json = ?,
                 inventory_updated = ?,
                 completion_rating = ?,
                 feedback_comments = ?,
                 updated_at = ?
             WHERE id = ? AND current_status = ?",
        )
        .bind(update.new_status.as_str())
        .bind(update.new_role.as_str())
        .bind(to_json(&update.state_data, "state_data_json")?)
        .bind(to_json(&update.equipment_used, "equipment_used_json")?)
        .bind(update.inventory_updated)
        .bind(update.completion_rating.map(i64::from))
        .bind(&update.feedback_comments)
        .bind(update.updated_at.to_rfc3339())
        .bind(&id.0)
        .bind(expected_status.as_str())
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        if result.rows_affected() == 1 {
            Ok(UpdateOutcome::Applied)
        } else {
            Ok(UpdateOutcome::Conflict)
        }
    }

    async fn append_transition(&self, transition: StateTransition) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO request_transition (id, request_id, from_status, to_status, action,
                 actor_role, actor_id, payload_json, occurred_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&transition.id.0)
        .bind(&transition.request_id.0)
        .bind(transition.from_status.as_str())
        .bind(transition.to_status.as_str())
        .bind(transition.action.as_str())
        .bind(transition.actor_role.as_str())
        .bind(transition.actor_id.0)
        .bind(&transition.payload_json)
        .bind(transition.occurred_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        Ok(())
    }

    async fn list_transitions(
        &self,
        request_id: &RequestId,
    ) -> Result<Vec<StateTransition>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, request_id, from_status, to_status, action, actor_role, actor_id,
                    payload_json, occurred_at
             FROM request_transition
             WHERE request_id = ?
             ORDER BY occurred_at ASC, id ASC",
        )
        .bind(&request_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        rows.iter().map(row_to_transition).collect()
    }

    async fn list_by_role(
        &self,
        role: Role,
        status: Option<RequestStatus>,
    ) -> Result<Vec<ServiceRequest>, StoreError> {
        let rows = if let Some(status) = status {
            sqlx::query(&format!(
                "SELECT {REQUEST_COLUMNS} FROM service_request
                 WHERE role_current = ? AND current_status = ?
                 ORDER BY created_at ASC"
            ))
            .bind(role.as_str())
            .bind(status.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?
        } else {
            sqlx::query(&format!(
                "SELECT {REQUEST_COLUMNS} FROM service_request
                 WHERE role_current = ?
                 ORDER BY created_at ASC"
            ))
            .bind(role.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?
        };

        rows.iter().map(row_to_request).collect()
    }

    async fn list_by_client(
        &self,
        client_id: ClientId,
    ) -> Result<Vec<ServiceRequest>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {REQUEST_COLUMNS} FROM service_request
             WHERE client_id = ?
             ORDER BY created_at ASC"
        ))
        .bind(client_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        rows.iter().map(row_to_request).collect()
    }
}
