use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Instrument class recognized by the catalog. Stored as a Postgres enum
/// (`asset_type`) so invalid classes are rejected at the database layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "asset_type", rename_all = "lowercase")]
pub enum InstrumentClass {
    Equity,
    Crypto,
    Commodity,
    Bond,
}

impl Default for InstrumentClass {
    fn default() -> Self {
        InstrumentClass::Equity
    }
}

/// Catalog row for a tracked instrument. Immutable after creation except
/// for `is_active`, which the Price Store does not currently flip (no
/// delisting workflow exists yet in this subsystem).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Asset {
    pub id: i64,
    pub symbol: String,
    pub name: String,
    pub asset_type: InstrumentClass,
    pub exchange: String,
    pub native_currency: String,
    pub is_active: bool,
}

/// What the caller supplies when an unknown ticker is first seen.
/// `name`, `exchange`, and `native_currency` fall back to sane defaults
/// when the transaction event does not carry richer metadata (see
/// SPEC_FULL.md OQ-2).
#[derive(Debug, Clone)]
pub struct AssetDescriptor {
    pub symbol: String,
    pub name: Option<String>,
    pub asset_type: InstrumentClass,
    pub exchange: Option<String>,
    pub native_currency: Option<String>,
}

impl AssetDescriptor {
    pub fn from_symbol(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            name: None,
            asset_type: InstrumentClass::default(),
            exchange: None,
            native_currency: None,
        }
    }
}
