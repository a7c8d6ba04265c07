pub mod inventory;
pub mod request;

pub use inventory::SqlInventoryStore;
pub use request::SqlStateStore;

use chrono::{DateTime, Utc};
use fieldline_core::errors::StoreError;

pub(crate) fn backend(error: sqlx::Error) -> StoreError {
    StoreError::Backend(error.to_string())
}

pub(crate) fn decode(message: impl Into<String>) -> StoreError {
    StoreError::Decode(message.into())
}

pub(crate) fn parse_timestamp(column: &str, raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|value| value.with_timezone(&Utc))
        .map_err(|_| decode(format!("invalid timestamp in `{column}`: `{raw}`")))
}

pub(crate) fn parse_quantity(column: &str, raw: i64) -> Result<u32, StoreError> {
    u32::try_from(raw).map_err(|_| decode(format!("invalid quantity in `{column}`: {raw}")))
}
