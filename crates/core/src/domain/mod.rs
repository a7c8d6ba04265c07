pub mod inventory;
pub mod request;
