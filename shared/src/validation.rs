//! Field rules for a [`RegistrationDraft`].
//!
//! Validation is a pure function of the draft. It never talks to the backend,
//! so uniqueness of a national id or plate is not checked here.

use std::{collections::BTreeMap, fmt, str::FromStr};

use serde::Serialize;

use crate::data::{NewRegistration, RegistrationDraft};

/// A form field, named the way the form and the backend name it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Field {
    #[serde(rename = "lote")]
    Batch,
    #[serde(rename = "nombre")]
    FirstName,
    #[serde(rename = "apellido")]
    LastName,
    #[serde(rename = "dni")]
    NationalId,
    #[serde(rename = "sexo")]
    Sex,
    #[serde(rename = "vencimiento_licencia")]
    LicenseExpiry,
    #[serde(rename = "patente")]
    Plate,
    #[serde(rename = "marca")]
    Make,
    #[serde(rename = "modelo")]
    Model,
    #[serde(rename = "aseguradora")]
    Insurer,
    #[serde(rename = "poliza")]
    PolicyNumber,
    #[serde(rename = "vencimiento_poliza")]
    PolicyExpiry,
    #[serde(rename = "registrado_anteriormente")]
    PriorRegistration,
}

impl Field {
    pub const ALL: [Field; 13] = [
        Field::Batch,
        Field::FirstName,
        Field::LastName,
        Field::NationalId,
        Field::Sex,
        Field::LicenseExpiry,
        Field::Plate,
        Field::Make,
        Field::Model,
        Field::Insurer,
        Field::PolicyNumber,
        Field::PolicyExpiry,
        Field::PriorRegistration,
    ];

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Field::Batch => "lote",
            Field::FirstName => "nombre",
            Field::LastName => "apellido",
            Field::NationalId => "dni",
            Field::Sex => "sexo",
            Field::LicenseExpiry => "vencimiento_licencia",
            Field::Plate => "patente",
            Field::Make => "marca",
            Field::Model => "modelo",
            Field::Insurer => "aseguradora",
            Field::PolicyNumber => "poliza",
            Field::PolicyExpiry => "vencimiento_poliza",
            Field::PriorRegistration => "registrado_anteriormente",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Field {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Field::ALL
            .into_iter()
            .find(|field| field.name() == s)
            .ok_or_else(|| format!("Unknown form field '{s}'"))
    }
}

/// Field name to message. Empty means the draft is valid.
pub type FieldErrors = BTreeMap<Field, &'static str>;

#[must_use]
pub fn validate(draft: &RegistrationDraft) -> FieldErrors {
    let mut errors = FieldErrors::new();

    if draft.batch.is_none() {
        errors.insert(Field::Batch, "Debe seleccionar un lote");
    }
    require_text(&mut errors, Field::FirstName, &draft.first_name, "El nombre es requerido");
    require_text(&mut errors, Field::LastName, &draft.last_name, "El apellido es requerido");

    let national_id = draft.national_id.trim();
    if national_id.is_empty() {
        errors.insert(Field::NationalId, "El DNI es requerido");
    } else if !national_id.chars().all(|c| c.is_ascii_digit()) {
        errors.insert(Field::NationalId, "El DNI debe contener solo números");
    }

    if draft.sex.is_none() {
        errors.insert(Field::Sex, "Debe seleccionar el sexo");
    }
    if draft.license_expiry.is_none() {
        errors.insert(Field::LicenseExpiry, "La fecha de vencimiento es requerida");
    }
    require_text(&mut errors, Field::Plate, &draft.plate, "La patente es requerida");
    require_text(&mut errors, Field::Make, &draft.make, "La marca del vehículo es requerida");
    require_text(&mut errors, Field::Model, &draft.model, "El modelo del vehículo es requerido");
    require_text(&mut errors, Field::Insurer, &draft.insurer, "La aseguradora es requerida");
    require_text(
        &mut errors,
        Field::PolicyNumber,
        &draft.policy_number,
        "El número de póliza es requerido",
    );
    if draft.policy_expiry.is_none() {
        errors.insert(Field::PolicyExpiry, "La fecha de vencimiento es requerida");
    }
    if draft.prior_registration.is_none() {
        errors.insert(Field::PriorRegistration, "Debe seleccionar una opción");
    }

    errors
}

fn require_text(errors: &mut FieldErrors, field: Field, value: &str, message: &'static str) {
    if value.trim().is_empty() {
        errors.insert(field, message);
    }
}

impl TryFrom<&RegistrationDraft> for NewRegistration {
    type Error = FieldErrors;

    /// Validates the draft and normalizes it for storage: text is trimmed and
    /// the plate is upper-cased.
    fn try_from(draft: &RegistrationDraft) -> Result<Self, Self::Error> {
        let errors = validate(draft);

        match (
            draft.batch,
            draft.sex,
            draft.license_expiry,
            draft.policy_expiry,
            draft.prior_registration,
        ) {
            (
                Some(batch),
                Some(sex),
                Some(license_expiry),
                Some(policy_expiry),
                Some(prior_registration),
            ) if errors.is_empty() => Ok(Self {
                batch,
                first_name: draft.first_name.trim().into(),
                last_name: draft.last_name.trim().into(),
                national_id: draft.national_id.trim().into(),
                sex,
                license_expiry,
                plate: draft.plate.trim().to_uppercase(),
                make: draft.make.trim().into(),
                model: draft.model.trim().into(),
                insurer: draft.insurer.trim().into(),
                policy_number: draft.policy_number.trim().into(),
                policy_expiry,
                prior_registration,
            }),
            _ => Err(errors),
        }
    }
}
