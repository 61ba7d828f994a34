//! Stored order read model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use clinicdesk_core::{
    AggregateRoot, ClinicianId, Entity, LineItemId, MedicineId, OrderId, PatientId,
};

use crate::status::OrderStatus;

/// Display name used when an order references a patient that no longer exists.
pub const UNKNOWN_PATIENT: &str = "unknown patient";

/// Display name used when an order references a clinician that no longer exists.
pub const UNKNOWN_CLINICIAN: &str = "unknown clinician";

/// Aggregate root: the prescription header.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClinicalOrder {
    pub id: OrderId,
    pub patient_id: PatientId,
    pub clinician_id: ClinicianId,
    pub diagnosis: String,
    pub doctor_advice: String,
    pub total_amount: f64,
    /// Free text; see [`ClinicalOrder::known_status`].
    pub status: String,
    pub notes: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
}

impl ClinicalOrder {
    /// The status as a known value, if it is one.
    pub fn known_status(&self) -> Option<OrderStatus> {
        self.status.parse().ok()
    }
}

impl AggregateRoot for ClinicalOrder {
    type Id = OrderId;

    fn id(&self) -> Self::Id {
        self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// A stored line item. Owned by exactly one order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderLineItem {
    pub id: LineItemId,
    pub order_id: OrderId,
    pub medicine_id: Option<MedicineId>,
    pub medicine_name: String,
    pub specification: String,
    pub dosage: String,
    pub usage: String,
    pub frequency: String,
    pub days: i64,
    pub quantity: i64,
    pub unit_price: f64,
    pub total_price: f64,
}

impl Entity for OrderLineItem {
    type Id = LineItemId;

    fn id(&self) -> Self::Id {
        self.id
    }
}

/// Header, resolved display names, and lines in insertion order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderDetails {
    #[serde(flatten)]
    pub order: ClinicalOrder,
    pub patient_name: String,
    pub clinician_name: String,
    pub items: Vec<OrderLineItem>,
}

impl OrderDetails {
    /// Assemble details, substituting placeholders for missing references.
    pub fn new(
        order: ClinicalOrder,
        patient_name: Option<String>,
        clinician_name: Option<String>,
        items: Vec<OrderLineItem>,
    ) -> Self {
        Self {
            order,
            patient_name: patient_name.unwrap_or_else(|| UNKNOWN_PATIENT.to_string()),
            clinician_name: clinician_name.unwrap_or_else(|| UNKNOWN_CLINICIAN.to_string()),
            items,
        }
    }

    pub fn line_total(&self) -> f64 {
        self.items.iter().map(|i| i.total_price).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(status: &str) -> ClinicalOrder {
        let now = Utc::now();
        ClinicalOrder {
            id: OrderId::new(9),
            patient_id: PatientId::new(1),
            clinician_id: ClinicianId::new(1),
            diagnosis: "感冒".to_string(),
            doctor_advice: String::new(),
            total_amount: 12.0,
            status: status.to_string(),
            notes: String::new(),
            created_at: now,
            updated_at: now,
            version: 3,
        }
    }

    #[test]
    fn missing_names_become_placeholders() {
        let details = OrderDetails::new(header("draft"), None, Some("王医生".to_string()), vec![]);
        assert_eq!(details.patient_name, UNKNOWN_PATIENT);
        assert_eq!(details.clinician_name, "王医生");
    }

    #[test]
    fn line_total_sums_stored_lines() {
        let line = |id: i64, total: f64| OrderLineItem {
            id: LineItemId::new(id),
            order_id: OrderId::new(9),
            medicine_id: None,
            medicine_name: format!("药{id}"),
            specification: String::new(),
            dosage: String::new(),
            usage: String::new(),
            frequency: String::new(),
            days: 1,
            quantity: 1,
            unit_price: total,
            total_price: total,
        };
        let items = vec![line(1, 4.5), line(2, 7.5)];
        let details = OrderDetails::new(header("draft"), None, None, items);
        assert_eq!(details.line_total(), 12.0);

        let empty = OrderDetails::new(header("draft"), None, None, vec![]);
        assert_eq!(empty.line_total(), 0.0);
    }

    #[test]
    fn known_status_parses_only_known_values() {
        assert_eq!(header("printed").known_status(), Some(OrderStatus::Printed));
        assert_eq!(header("archived").known_status(), None);
    }

    #[test]
    fn aggregate_root_exposes_id_and_version() {
        let order = header("draft");
        assert_eq!(AggregateRoot::id(&order), OrderId::new(9));
        assert_eq!(order.version(), 3);
    }

    #[test]
    fn details_serialize_header_inline() {
        let details = OrderDetails::new(header("draft"), Some("张三".to_string()), None, vec![]);
        let json = serde_json::to_value(&details).unwrap();
        assert_eq!(json["id"], 9);
        assert_eq!(json["status"], "draft");
        assert_eq!(json["patient_name"], "张三");
        assert_eq!(json["clinician_name"], UNKNOWN_CLINICIAN);
        assert!(json["items"].as_array().unwrap().is_empty());
    }
}
