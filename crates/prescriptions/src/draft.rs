//! Order write payload and its shape validation.
//!
//! Validation runs before any storage work; a draft that passes is safe to
//! hand to the transactional write path.

use serde::{Deserialize, Serialize};

use clinicdesk_core::{
    ClinicianId, DomainError, DomainResult, ExpectedVersion, MedicineId, PatientId,
};

/// One prescribed line as submitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItemDraft {
    #[serde(default)]
    pub medicine_id: Option<MedicineId>,
    pub medicine_name: String,
    #[serde(default)]
    pub specification: String,
    #[serde(default)]
    pub dosage: String,
    #[serde(default)]
    pub usage: String,
    #[serde(default)]
    pub frequency: String,
    pub days: i64,
    pub quantity: i64,
    pub unit_price: f64,
    pub total_price: f64,
}

impl LineItemDraft {
    fn validate(&self, position: usize) -> DomainResult<()> {
        let line = position + 1;
        if self.medicine_name.trim().is_empty() {
            return Err(DomainError::validation(format!(
                "line {line}: medicine_name cannot be empty"
            )));
        }
        if let Some(id) = self.medicine_id {
            if !id.is_assigned() {
                return Err(DomainError::validation(format!(
                    "line {line}: medicine_id must be positive"
                )));
            }
        }
        if self.quantity < 1 {
            return Err(DomainError::validation(format!(
                "line {line}: quantity must be at least 1"
            )));
        }
        if self.days < 1 {
            return Err(DomainError::validation(format!(
                "line {line}: days must be at least 1"
            )));
        }
        ensure_amount(self.unit_price, &format!("line {line}: unit_price"))?;
        ensure_amount(self.total_price, &format!("line {line}: total_price"))?;
        Ok(())
    }
}

/// Order write payload, used for both create and replace-all update.
///
/// The issuing clinician is not part of the payload; the caller supplies it.
/// `version`, when present, is the version the client last read and makes
/// an update conditional on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderDraft {
    pub patient_id: PatientId,
    #[serde(default)]
    pub diagnosis: String,
    #[serde(default)]
    pub doctor_advice: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub items: Vec<LineItemDraft>,
    pub total_amount: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
}

impl OrderDraft {
    /// Validate payload shape.
    pub fn validate(&self) -> DomainResult<()> {
        if !self.patient_id.is_assigned() {
            return Err(DomainError::validation("patient_id must be positive"));
        }
        ensure_amount(self.total_amount, "total_amount")?;
        for (position, item) in self.items.iter().enumerate() {
            item.validate(position)?;
        }
        Ok(())
    }

    /// Validate payload shape for a new order issued by `clinician`.
    pub fn validate_issued_by(&self, clinician: ClinicianId) -> DomainResult<()> {
        if !clinician.is_assigned() {
            return Err(DomainError::validation("clinician id must be positive"));
        }
        self.validate()
    }

    /// Sum of the line totals.
    pub fn computed_total(&self) -> f64 {
        self.items.iter().map(|i| i.total_price).sum()
    }

    pub fn expected_version(&self) -> ExpectedVersion {
        self.version.into()
    }
}

fn ensure_amount(value: f64, field: &str) -> DomainResult<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(DomainError::validation(format!(
            "{field} must be a finite non-negative number"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(name: &str, total: f64) -> LineItemDraft {
        LineItemDraft {
            medicine_id: Some(MedicineId::new(1)),
            medicine_name: name.to_string(),
            specification: "0.25g*24粒".to_string(),
            dosage: "0.5g".to_string(),
            usage: "口服".to_string(),
            frequency: "每日三次".to_string(),
            days: 3,
            quantity: 1,
            unit_price: total,
            total_price: total,
        }
    }

    fn draft(items: Vec<LineItemDraft>) -> OrderDraft {
        let total_amount = items.iter().map(|i| i.total_price).sum();
        OrderDraft {
            patient_id: PatientId::new(1),
            diagnosis: "上呼吸道感染".to_string(),
            doctor_advice: "多喝水".to_string(),
            notes: String::new(),
            items,
            total_amount,
            version: None,
        }
    }

    fn clinician() -> ClinicianId {
        ClinicianId::new(1)
    }

    #[test]
    fn valid_draft_passes() {
        let d = draft(vec![line("阿莫西林胶囊", 15.5), line("布洛芬片", 8.8)]);
        assert!(d.validate_issued_by(clinician()).is_ok());
        assert!((d.computed_total() - 24.3).abs() < 1e-9);
    }

    #[test]
    fn empty_item_list_is_allowed() {
        assert!(draft(vec![]).validate_issued_by(clinician()).is_ok());
    }

    #[test]
    fn missing_references_are_rejected() {
        let mut d = draft(vec![line("布洛芬片", 8.8)]);
        d.patient_id = PatientId::new(0);
        assert!(matches!(d.validate_issued_by(clinician()), Err(DomainError::Validation(_))));

        let d = draft(vec![line("布洛芬片", 8.8)]);
        assert!(d.validate_issued_by(ClinicianId::new(0)).is_err());
        assert!(d.validate().is_ok());
    }

    #[test]
    fn line_errors_name_the_line() {
        let mut bad = line("布洛芬片", 8.8);
        bad.quantity = 0;
        let d = draft(vec![line("阿莫西林胶囊", 15.5), bad]);
        match d.validate_issued_by(clinician()) {
            Err(DomainError::Validation(msg)) => assert!(msg.starts_with("line 2:")),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn each_line_rule_is_checked() {
        let cases: Vec<Box<dyn Fn(&mut LineItemDraft)>> = vec![
            Box::new(|l| l.medicine_name = "  ".to_string()),
            Box::new(|l| l.medicine_id = Some(MedicineId::new(-2))),
            Box::new(|l| l.days = 0),
            Box::new(|l| l.quantity = -1),
            Box::new(|l| l.unit_price = f64::INFINITY),
            Box::new(|l| l.total_price = -0.01),
        ];
        for mutate in cases {
            let mut l = line("布洛芬片", 8.8);
            mutate(&mut l);
            assert!(draft(vec![l]).validate().is_err());
        }
    }

    #[test]
    fn non_finite_total_is_rejected() {
        let mut d = draft(vec![]);
        d.total_amount = f64::NAN;
        assert!(d.validate_issued_by(clinician()).is_err());
    }

    #[test]
    fn payload_deserializes_with_optional_fields() {
        let json = r#"{
            "patient_id": 3,
            "diagnosis": "感冒",
            "items": [{
                "medicine_name": "感冒灵颗粒",
                "days": 2,
                "quantity": 1,
                "unit_price": 12.0,
                "total_price": 12.0
            }],
            "total_amount": 12.0,
            "version": 4
        }"#;
        let d: OrderDraft = serde_json::from_str(json).unwrap();
        assert_eq!(d.patient_id, PatientId::new(3));
        assert_eq!(d.items[0].medicine_id, None);
        assert_eq!(d.expected_version(), ExpectedVersion::Exact(4));
        assert!(d.validate_issued_by(clinician()).is_ok());
    }

    mod proptest_tests {
        use super::*;
        use crate::total::{to_cents, TotalCheck, TotalPolicy};
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 256,
                ..ProptestConfig::default()
            })]

            /// Property: a header total built from the lines always passes the enforced check.
            #[test]
            fn summed_total_is_consistent(cents in proptest::collection::vec(0i64..100_000, 0..20)) {
                let items: Vec<_> = cents.iter().map(|c| line("布洛芬片", *c as f64 / 100.0)).collect();
                let d = draft(items);
                prop_assert!(d.validate_issued_by(clinician()).is_ok());
                prop_assert_eq!(
                    TotalPolicy::Enforce.check(d.total_amount, d.computed_total()).unwrap(),
                    TotalCheck::Consistent
                );
                prop_assert_eq!(to_cents(d.computed_total()), cents.iter().sum::<i64>());
            }
        }
    }
}
