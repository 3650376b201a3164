use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Logical partition for counters and record history.
///
/// `Test` lets staff rehearse the workflow without touching real data; the
/// two environments never share state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Environment {
    Production,
    Test,
}

impl Environment {
    pub const ALL: [Environment; 2] = [Environment::Production, Environment::Test];

    /// Suffix used in per-environment file names.
    pub fn file_tag(&self) -> &'static str {
        match self {
            Environment::Production => "production",
            Environment::Test => "test",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Environment::Production => write!(f, "Production"),
            Environment::Test => write!(f, "Test"),
        }
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "production" => Ok(Environment::Production),
            "test" => Ok(Environment::Test),
            other => Err(format!("Unknown environment: {}", other)),
        }
    }
}

/// Unit of measure for the received quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Unit {
    #[serde(rename = "KG")]
    Kg,
    #[serde(rename = "UN")]
    Un,
    #[serde(rename = "L")]
    L,
    #[serde(rename = "M")]
    M,
}

/// Physical presentation of the incoming material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Packaging {
    #[serde(rename = "CAJAS")]
    Cajas,
    #[serde(rename = "BOLSA BLANCA")]
    BolsaBlanca,
    #[serde(rename = "BOLSA KRAFT")]
    BolsaKraft,
    #[serde(rename = "TAMBOR")]
    Tambor,
    #[serde(rename = "BIDON")]
    Bidon,
    #[serde(rename = "OTROS")]
    Otros,
}

/// A submitted receiving entry.
///
/// All fields are required and typed; rows with unknown or missing fields are
/// rejected at the boundary rather than defaulted. The allocator only ever
/// produces `analysis_number` and `reception_number`; it treats the rest as
/// an opaque payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReceivingRecord {
    pub environment: Environment,
    pub date: NaiveDate,
    pub sku: String,
    pub description: String,
    /// Year-scoped quarantine-label identifier, formatted `NNNN/YY`.
    pub analysis_number: String,
    pub lot: String,
    pub expiry: NaiveDate,
    pub quantity: f64,
    pub unit: Unit,
    pub package_count: u32,
    pub packaging: Packaging,
    pub supplier: String,
    pub delivery_note: String,
    /// Never-resetting receiving-event identifier, string-encoded integer.
    pub reception_number: String,
    pub received_by: String,
    pub checked_by: String,
}
