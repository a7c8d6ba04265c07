use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::request::{ActorId, RequestId};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MaterialId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionId(pub String);

/// One material/quantity pair as documented by a technician or consumed by
/// the warehouse.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EquipmentLine {
    pub material_id: MaterialId,
    pub quantity: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Material {
    pub id: MaterialId,
    pub name: String,
    pub category: String,
    pub quantity_in_stock: u32,
    pub min_quantity: u32,
    pub unit: String,
    pub price: Decimal,
    pub location: String,
    pub supplier: Option<String>,
    pub is_active: bool,
}

impl Material {
    /// Derived classification against the item's own threshold; never stored.
    pub fn stock_level(&self) -> StockLevel {
        if self.quantity_in_stock == 0 {
            StockLevel::OutOfStock
        } else if self.quantity_in_stock <= self.min_quantity / 2 {
            StockLevel::Critical
        } else if self.quantity_in_stock <= self.min_quantity {
            StockLevel::Low
        } else {
            StockLevel::Normal
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockLevel {
    Normal,
    Low,
    Critical,
    OutOfStock,
}

impl StockLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Low => "low",
            Self::Critical => "critical",
            Self::OutOfStock => "out_of_stock",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Reserve,
    Consume,
    Return,
    Restock,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reserve => "reserve",
            Self::Consume => "consume",
            Self::Return => "return",
            Self::Restock => "restock",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "reserve" => Some(Self::Reserve),
            "consume" => Some(Self::Consume),
            "return" => Some(Self::Return),
            "restock" => Some(Self::Restock),
            _ => None,
        }
    }
}

/// Append-only stock movement record. `request_id` is absent for pure
/// restocks; everything tied to a request lifecycle carries it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryTransaction {
    pub id: TransactionId,
    pub request_id: Option<RequestId>,
    pub material_id: MaterialId,
    pub kind: TransactionKind,
    pub quantity: u32,
    pub performed_by: ActorId,
    pub occurred_at: DateTime<Utc>,
    pub notes: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockAlert {
    pub material_id: MaterialId,
    pub name: String,
    pub level: StockLevel,
    pub quantity_in_stock: u32,
    pub min_quantity: u32,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockSummary {
    pub category: Option<String>,
    pub total: usize,
    pub normal: usize,
    pub low: usize,
    pub critical: usize,
    pub out_of_stock: usize,
}
