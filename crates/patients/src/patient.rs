use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use clinicdesk_core::{DomainError, DomainResult, Entity, PatientId};
use clinicdesk_lookup::{initials_key, Candidate, MatchKeys};

/// Upper bound on a stored patient name, in characters.
pub const MAX_NAME_CHARS: usize = 100;

const MAX_AGE: u32 = 150;

/// Optional descriptive fields captured at intake.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Demographics {
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub age: Option<u32>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub id_card: Option<String>,
    #[serde(default)]
    pub medical_history: Option<String>,
}

impl Demographics {
    pub fn validate(&self) -> DomainResult<()> {
        if let Some(age) = self.age {
            if age > MAX_AGE {
                return Err(DomainError::validation(format!(
                    "age must be at most {MAX_AGE}, got {age}"
                )));
            }
        }
        Ok(())
    }

    /// Blank strings are stored as absent.
    pub fn normalized(self) -> Self {
        fn clean(value: Option<String>) -> Option<String> {
            value
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        }

        Self {
            gender: clean(self.gender),
            age: self.age,
            phone: clean(self.phone),
            address: clean(self.address),
            id_card: clean(self.id_card),
            medical_history: clean(self.medical_history),
        }
    }
}

/// A validated patient ready to be written.
///
/// The name is trimmed on construction; lookups and uniqueness operate on the
/// trimmed form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPatient {
    name: String,
    demographics: Demographics,
}

impl NewPatient {
    pub fn new(name: impl AsRef<str>, demographics: Demographics) -> DomainResult<Self> {
        let name = Self::normalize_name(name.as_ref())?;
        demographics.validate()?;
        Ok(Self {
            name,
            demographics: demographics.normalized(),
        })
    }

    /// Trim and validate a patient name.
    pub fn normalize_name(raw: &str) -> DomainResult<String> {
        let name = raw.trim();
        if name.is_empty() {
            return Err(DomainError::validation("patient name cannot be empty"));
        }
        if name.chars().count() > MAX_NAME_CHARS {
            return Err(DomainError::validation(format!(
                "patient name exceeds {MAX_NAME_CHARS} characters"
            )));
        }
        Ok(name.to_string())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn demographics(&self) -> &Demographics {
        &self.demographics
    }

    pub fn into_parts(self) -> (String, Demographics) {
        (self.name, self.demographics)
    }
}

/// A stored patient record.
///
/// `pinyin` is the full transliteration key of `name`, persisted alongside it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patient {
    pub id: PatientId,
    pub name: String,
    pub pinyin: String,
    #[serde(flatten)]
    pub demographics: Demographics,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entity for Patient {
    type Id = PatientId;

    fn id(&self) -> Self::Id {
        self.id
    }
}

/// Search candidate wrapping a patient with its match keys.
///
/// The full key comes from the persisted pinyin column; initials are derived
/// from the name.
#[derive(Debug, Clone)]
pub struct PatientCandidate {
    patient: Patient,
    keys: MatchKeys,
}

impl PatientCandidate {
    pub fn new(patient: Patient) -> Self {
        let keys = MatchKeys::from_parts(patient.pinyin.clone(), initials_key(&patient.name));
        Self { patient, keys }
    }

    pub fn patient(&self) -> &Patient {
        &self.patient
    }
}

impl From<Patient> for PatientCandidate {
    fn from(patient: Patient) -> Self {
        Self::new(patient)
    }
}

impl Candidate for PatientCandidate {
    fn primary(&self) -> &str {
        &self.patient.name
    }

    fn primary_keys(&self) -> Option<&MatchKeys> {
        Some(&self.keys)
    }
}
