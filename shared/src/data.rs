use std::{fmt, str::FromStr};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::validation::Field;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    #[error("'{0}' is not a known batch.")]
    UnknownBatch(String),
    #[error("'{0}' is not a valid sex. Expected 'masculino' or 'femenino'.")]
    UnknownSex(String),
    #[error("'{0}' is not a valid answer. Expected 'si' or 'no'.")]
    UnknownAnswer(String),
}

/// The lot a visitor is coming to. Records and queries are partitioned by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Batch {
    #[serde(rename = "14")]
    Lote14,
    #[serde(rename = "49")]
    Lote49,
}

impl Batch {
    pub const ALL: [Batch; 2] = [Batch::Lote14, Batch::Lote49];

    #[must_use]
    pub fn id(self) -> &'static str {
        match self {
            Batch::Lote14 => "14",
            Batch::Lote49 => "49",
        }
    }
}

impl fmt::Display for Batch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Batch {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Batch::ALL
            .into_iter()
            .find(|batch| batch.id() == s.trim())
            .ok_or_else(|| Error::UnknownBatch(s.into()))
    }
}

impl TryFrom<String> for Batch {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sex {
    Masculino,
    Femenino,
}

impl Sex {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Sex::Masculino => "masculino",
            Sex::Femenino => "femenino",
        }
    }
}

impl FromStr for Sex {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "masculino" => Ok(Sex::Masculino),
            "femenino" => Ok(Sex::Femenino),
            other => Err(Error::UnknownSex(other.into())),
        }
    }
}

impl TryFrom<String> for Sex {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Answer to "were you registered before?".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriorRegistration {
    Si,
    No,
}

impl PriorRegistration {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            PriorRegistration::Si => "si",
            PriorRegistration::No => "no",
        }
    }
}

impl FromStr for PriorRegistration {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "si" => Ok(PriorRegistration::Si),
            "no" => Ok(PriorRegistration::No),
            other => Err(Error::UnknownAnswer(other.into())),
        }
    }
}

impl TryFrom<String> for PriorRegistration {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// A registration as it is being filled in. Every field may still be missing or wrong.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RegistrationDraft {
    pub batch: Option<Batch>,
    pub first_name: String,
    pub last_name: String,
    pub national_id: String,
    pub sex: Option<Sex>,
    pub license_expiry: Option<NaiveDate>,
    pub plate: String,
    pub make: String,
    pub model: String,
    pub insurer: String,
    pub policy_number: String,
    pub policy_expiry: Option<NaiveDate>,
    pub prior_registration: Option<PriorRegistration>,
}

impl RegistrationDraft {
    /// Overwrites a single field from its raw form value.
    ///
    /// Values that do not parse into the field's type (an unknown batch, a
    /// malformed date) leave the field unset, which the validator reports.
    pub fn set(&mut self, field: Field, value: &str) {
        match field {
            Field::Batch => self.batch = value.parse().ok(),
            Field::FirstName => self.first_name = value.into(),
            Field::LastName => self.last_name = value.into(),
            Field::NationalId => self.national_id = value.into(),
            Field::Sex => self.sex = value.parse().ok(),
            Field::LicenseExpiry => self.license_expiry = parse_form_date(value),
            Field::Plate => self.plate = value.into(),
            Field::Make => self.make = value.into(),
            Field::Model => self.model = value.into(),
            Field::Insurer => self.insurer = value.into(),
            Field::PolicyNumber => self.policy_number = value.into(),
            Field::PolicyExpiry => self.policy_expiry = parse_form_date(value),
            Field::PriorRegistration => self.prior_registration = value.parse().ok(),
        }
    }

    /// The raw form value of a field, as an input would show it back.
    #[must_use]
    pub fn get(&self, field: Field) -> String {
        let date = |date: Option<NaiveDate>| {
            date.map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_default()
        };
        match field {
            Field::Batch => self.batch.map(Batch::id).unwrap_or_default().into(),
            Field::FirstName => self.first_name.clone(),
            Field::LastName => self.last_name.clone(),
            Field::NationalId => self.national_id.clone(),
            Field::Sex => self.sex.map(Sex::as_str).unwrap_or_default().into(),
            Field::LicenseExpiry => date(self.license_expiry),
            Field::Plate => self.plate.clone(),
            Field::Make => self.make.clone(),
            Field::Model => self.model.clone(),
            Field::Insurer => self.insurer.clone(),
            Field::PolicyNumber => self.policy_number.clone(),
            Field::PolicyExpiry => date(self.policy_expiry),
            Field::PriorRegistration => self
                .prior_registration
                .map(PriorRegistration::as_str)
                .unwrap_or_default()
                .into(),
        }
    }
}

/// Accepts the `YYYY-MM-DD` value of a date input, or a typed `DD/MM/YYYY`.
fn parse_form_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(value, "%d/%m/%Y"))
        .ok()
}

/// A validated registration ready to be inserted. Serializes with the
/// backend's column names.
///
/// Only produced by converting a [`RegistrationDraft`] that passed validation,
/// see `NewRegistration::try_from(&draft)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRegistration {
    #[serde(rename = "lote")]
    pub batch: Batch,
    #[serde(rename = "nombre")]
    pub first_name: String,
    #[serde(rename = "apellido")]
    pub last_name: String,
    #[serde(rename = "dni")]
    pub national_id: String,
    #[serde(rename = "sexo")]
    pub sex: Sex,
    #[serde(rename = "vencimiento_licencia")]
    pub license_expiry: NaiveDate,
    #[serde(rename = "patente")]
    pub plate: String,
    #[serde(rename = "marca")]
    pub make: String,
    #[serde(rename = "modelo")]
    pub model: String,
    #[serde(rename = "aseguradora")]
    pub insurer: String,
    #[serde(rename = "poliza")]
    pub policy_number: String,
    #[serde(rename = "vencimiento_poliza")]
    pub policy_expiry: NaiveDate,
    #[serde(rename = "registrado_anteriormente")]
    pub prior_registration: PriorRegistration,
}

/// A persisted registration. Never modified once the backend created it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRegistration {
    pub id: i64,
    #[serde(flatten)]
    pub registration: NewRegistration,
    pub created_at: DateTime<Utc>,
}
