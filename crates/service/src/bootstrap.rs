use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::info;

use fieldline_core::config::{AppConfig, ConfigError, LoadOptions};
use fieldline_core::notify::{
    notification_channel, spawn_dispatcher, DispatchPolicy, NotificationEvent, NotificationPort,
    Recipient, TransportFailure,
};
use fieldline_core::{InventoryService, LogAuditSink, WorkflowEngine};
use fieldline_db::{connect, migrations, DbPool, SqlInventoryStore, SqlStateStore};

pub type Engine = WorkflowEngine<SqlStateStore, SqlInventoryStore>;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub engine: Arc<Engine>,
    pub dispatcher: JoinHandle<()>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
}

/// Delivery transport of last resort: writes every notification to the log.
/// Stands in until a real channel (mail, SMS, push) is wired up.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl NotificationPort for LogNotifier {
    async fn deliver(&self, event: &NotificationEvent) -> Result<(), TransportFailure> {
        let recipient = match &event.recipient {
            Recipient::Role(role) => format!("role:{}", role.as_str()),
            Recipient::Client(client_id) => format!("client:{}", client_id.0),
        };
        info!(
            event_name = "notify.delivered",
            request_id = %event.request_id.0,
            recipient = %recipient,
            status = event.status.as_str(),
            "{}",
            event.message
        );
        Ok(())
    }
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    info!(event_name = "system.bootstrap.start", "starting application bootstrap");
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    let db_pool = connect(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(event_name = "system.bootstrap.database_connected", "database connection established");

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(event_name = "system.bootstrap.migrations_applied", "database migrations applied");

    let (queue, receiver) = notification_channel();
    let dispatcher = spawn_dispatcher(
        receiver,
        Arc::new(LogNotifier),
        DispatchPolicy {
            max_attempts: config.notifications.max_attempts,
            retry_delay_ms: config.notifications.retry_delay_ms,
        },
    );

    let audit = Arc::new(LogAuditSink);
    let inventory = InventoryService::new(SqlInventoryStore::new(db_pool.clone()), audit.clone());
    let engine =
        Arc::new(WorkflowEngine::new(SqlStateStore::new(db_pool.clone()), inventory, queue, audit));

    Ok(Application { config, db_pool, engine, dispatcher })
}

#[cfg(test)]
mod tests {
    use fieldline_core::config::{ConfigOverrides, LoadOptions};
    use fieldline_core::{
        Action, ClientId, CompletionInput, NewRequest, Priority, RequestStatus, Role,
        TransitionPayload, WorkflowKind,
    };

    use crate::bootstrap::bootstrap;

    fn memory_options(database_url: &str) -> LoadOptions {
        LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some(database_url.to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }
    }

    #[tokio::test]
    async fn bootstrap_fails_fast_on_invalid_database_url() {
        let result = bootstrap(memory_options("postgres://not-supported")).await;

        assert!(result.is_err());
        let message = result.err().expect("error").to_string();
        assert!(message.contains("database.url"));
    }

    #[tokio::test]
    async fn integration_smoke_covers_startup_and_a_full_request_path() {
        let app = bootstrap(memory_options("sqlite::memory:?cache=shared"))
            .await
            .expect("bootstrap should succeed with valid overrides");

        let (table_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master \
             WHERE type = 'table' AND name IN ('service_request', 'request_transition', \
             'material', 'inventory_transaction', 'equipment_reservation')",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("expected baseline tables to be available after bootstrap");
        assert_eq!(table_count, 5, "bootstrap should expose the baseline request-path tables");

        let request = app
            .engine
            .initiate_workflow(NewRequest {
                workflow_kind: WorkflowKind::CallCenterDirect,
                client_id: ClientId(7),
                priority: Priority::Normal,
                description: "no dial tone".to_string(),
                location: "Main St 1".to_string(),
                contact_info: Default::default(),
            })
            .await
            .expect("initiate request");

        app.engine
            .transition_workflow(
                &request.id,
                Action::ResolveRemotely,
                Role::CallCenter,
                fieldline_core::ActorId(30),
                TransitionPayload {
                    resolution: Some("line card reset".to_string()),
                    ..TransitionPayload::default()
                },
            )
            .await
            .expect("resolve remotely");

        app.engine
            .complete_workflow(&request.id, CompletionInput { rating: 4, feedback: None })
            .await
            .expect("rate");

        let status = app.engine.get_workflow_status(&request.id).await.expect("status");
        assert_eq!(status.request.current_status, RequestStatus::Rated);
        assert_eq!(status.history.len(), 2);

        app.db_pool.close().await;
    }
}
