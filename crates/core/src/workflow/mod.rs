pub mod engine;
pub mod tables;

pub use engine::{CompletionInput, NewRequest, TransitionReceipt, WorkflowEngine, WorkflowStatus};
pub use tables::{available_actions, initial_state, rule_for, InventoryEffect, TransitionRule};
