//! Strongly-typed row identifiers used across the domain.
//!
//! Records are keyed by SQLite integer row ids, which is also what the wire
//! format carries (`patient_id: int`, `medicine_id: int`, ...).

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Identifier of a patient record.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PatientId(i64);

/// Identifier of a medicine catalog entry.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MedicineId(i64);

/// Identifier of a clinical order (prescription header).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(i64);

/// Identifier of an order line item.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LineItemId(i64);

/// Identifier of the clinician issuing an order.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClinicianId(i64);

macro_rules! impl_row_id_newtype {
    ($t:ty, $name:literal) => {
        impl $t {
            /// Wrap a raw row id.
            ///
            /// No positivity check happens here; payload validation and
            /// `FromStr` reject non-positive ids.
            pub const fn new(raw: i64) -> Self {
                Self(raw)
            }

            pub const fn get(&self) -> i64 {
                self.0
            }

            /// Row ids assigned by the store are always positive.
            pub const fn is_assigned(&self) -> bool {
                self.0 > 0
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                core::fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<i64> for $t {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }

        impl From<$t> for i64 {
            fn from(value: $t) -> Self {
                value.0
            }
        }

        impl FromStr for $t {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let raw = s
                    .trim()
                    .parse::<i64>()
                    .map_err(|e| DomainError::invalid_id(format!("{}: {}", $name, e)))?;
                if raw <= 0 {
                    return Err(DomainError::invalid_id(format!(
                        "{}: must be positive, got {}",
                        $name, raw
                    )));
                }
                Ok(Self(raw))
            }
        }
    };
}

impl_row_id_newtype!(PatientId, "PatientId");
impl_row_id_newtype!(MedicineId, "MedicineId");
impl_row_id_newtype!(OrderId, "OrderId");
impl_row_id_newtype!(LineItemId, "LineItemId");
impl_row_id_newtype!(ClinicianId, "ClinicianId");
