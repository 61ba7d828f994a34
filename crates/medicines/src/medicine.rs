use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use clinicdesk_core::{DomainError, DomainResult, Entity, MedicineId};
use clinicdesk_lookup::{Candidate, IndexedKeys, MatchKeys};

/// A medicine catalog entry as stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MedicineEntry {
    pub id: MedicineId,
    pub name: String,
    pub specification: String,
    pub unit: String,
    pub price: f64,
    pub stock: i64,
    pub min_stock: i64,
    pub category: String,
    pub manufacturer: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MedicineEntry {
    /// Stock at or below the reorder threshold.
    pub fn is_low_stock(&self) -> bool {
        self.stock <= self.min_stock
    }
}

impl Entity for MedicineEntry {
    type Id = MedicineId;

    fn id(&self) -> Self::Id {
        self.id
    }
}

/// Create/update payload for a catalog entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMedicine {
    pub name: String,
    #[serde(default)]
    pub specification: String,
    #[serde(default)]
    pub unit: String,
    pub price: f64,
    #[serde(default)]
    pub stock: i64,
    #[serde(default)]
    pub min_stock: i64,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub manufacturer: String,
}

impl NewMedicine {
    /// Validate and trim the payload's text fields.
    pub fn validated(self) -> DomainResult<Self> {
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err(DomainError::validation("medicine name cannot be empty"));
        }
        if !self.price.is_finite() || self.price < 0.0 {
            return Err(DomainError::validation(format!(
                "price must be a finite non-negative number, got {}",
                self.price
            )));
        }
        if self.stock < 0 {
            return Err(DomainError::validation("stock cannot be negative"));
        }
        if self.min_stock < 0 {
            return Err(DomainError::validation("min_stock cannot be negative"));
        }

        Ok(Self {
            name,
            specification: self.specification.trim().to_string(),
            unit: self.unit.trim().to_string(),
            price: self.price,
            stock: self.stock,
            min_stock: self.min_stock,
            category: self.category.trim().to_string(),
            manufacturer: self.manufacturer.trim().to_string(),
        })
    }
}

/// Structured catalog filter.
///
/// `name` and `manufacturer` are substring filters, `category` is exact.
/// Absent or blank fields do not filter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MedicineSearch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub manufacturer: Option<String>,
}

impl MedicineSearch {
    pub fn name(&self) -> Option<&str> {
        non_blank(self.name.as_deref())
    }

    pub fn category(&self) -> Option<&str> {
        non_blank(self.category.as_deref())
    }

    pub fn manufacturer(&self) -> Option<&str> {
        non_blank(self.manufacturer.as_deref())
    }

    pub fn is_empty(&self) -> bool {
        self.name().is_none() && self.category().is_none() && self.manufacturer().is_none()
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Catalog entry paired with its indexed keys for fuzzy lookup.
///
/// Keys are only used when they were computed from the entry's current name
/// and specification. Entries missing from the index, or changed since they
/// were indexed, fall back to on-demand key computation.
#[derive(Debug, Clone, Copy)]
pub struct IndexedMedicine<'a> {
    pub entry: &'a MedicineEntry,
    pub keys: Option<&'a IndexedKeys>,
}

impl<'a> IndexedMedicine<'a> {
    pub fn new(entry: &'a MedicineEntry, keys: Option<&'a IndexedKeys>) -> Self {
        let keys = keys.filter(|k| k.describes(&entry.name, Some(&entry.specification)));
        Self { entry, keys }
    }

    /// True when matching runs on precomputed keys.
    pub fn is_indexed(&self) -> bool {
        self.keys.is_some()
    }
}

impl Candidate for IndexedMedicine<'_> {
    fn primary(&self) -> &str {
        &self.entry.name
    }

    fn secondary(&self) -> Option<&str> {
        Some(self.entry.specification.as_str()).filter(|s| !s.trim().is_empty())
    }

    fn primary_keys(&self) -> Option<&MatchKeys> {
        self.keys.map(|k| &k.primary)
    }

    fn secondary_keys(&self) -> Option<&MatchKeys> {
        self.keys.and_then(|k| k.secondary.as_ref())
    }
}
