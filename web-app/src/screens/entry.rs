use serde::Serialize;
use shared::{
    data::{RegistrationDraft, StoredRegistration},
    validation::{Field, FieldErrors},
};

use super::Notification;
use crate::{
    query::RecordQuery,
    submit::{SubmitError, Submitter},
};

/// Groups of the form revealed once a batch is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Section {
    PersonalData,
    License,
    Vehicle,
    Insurance,
    AdditionalInfo,
}

impl Section {
    pub const ALL: [Section; 5] = [
        Section::PersonalData,
        Section::License,
        Section::Vehicle,
        Section::Insurance,
        Section::AdditionalInfo,
    ];

    #[must_use]
    pub fn title(self) -> &'static str {
        match self {
            Section::PersonalData => "Datos Personales",
            Section::License => "Licencia de Conducir",
            Section::Vehicle => "Datos del Vehículo",
            Section::Insurance => "Datos del Seguro",
            Section::AdditionalInfo => "Información Adicional",
        }
    }

    #[must_use]
    pub fn fields(self) -> &'static [Field] {
        match self {
            Section::PersonalData => &[Field::FirstName, Field::LastName, Field::NationalId, Field::Sex],
            Section::License => &[Field::LicenseExpiry],
            Section::Vehicle => &[Field::Plate, Field::Make, Field::Model],
            Section::Insurance => &[Field::Insurer, Field::PolicyNumber, Field::PolicyExpiry],
            Section::AdditionalInfo => &[Field::PriorRegistration],
        }
    }
}

/// How a field is drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Widget {
    Text,
    Date,
    Choice,
}

type Choices = &'static [(&'static str, &'static str)];

fn presentation(field: Field) -> (&'static str, Widget, Choices) {
    match field {
        Field::Batch => (
            "Lote de destino",
            Widget::Choice,
            &[("14", "Lote 14"), ("49", "Lote 49")],
        ),
        Field::FirstName => ("Nombre", Widget::Text, &[]),
        Field::LastName => ("Apellido", Widget::Text, &[]),
        Field::NationalId => ("DNI", Widget::Text, &[]),
        Field::Sex => (
            "Sexo",
            Widget::Choice,
            &[("masculino", "Masculino"), ("femenino", "Femenino")],
        ),
        Field::LicenseExpiry => ("Vencimiento de la licencia", Widget::Date, &[]),
        Field::Plate => ("Patente", Widget::Text, &[]),
        Field::Make => ("Marca", Widget::Text, &[]),
        Field::Model => ("Modelo", Widget::Text, &[]),
        Field::Insurer => ("Aseguradora", Widget::Text, &[]),
        Field::PolicyNumber => ("Número de póliza", Widget::Text, &[]),
        Field::PolicyExpiry => ("Vencimiento de la póliza", Widget::Date, &[]),
        Field::PriorRegistration => (
            "¿Se registró anteriormente?",
            Widget::Choice,
            &[("si", "Sí"), ("no", "No")],
        ),
    }
}

/// One input of the form with its current value and inline error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldView {
    pub name: &'static str,
    pub label: &'static str,
    pub widget: Widget,
    pub options: Choices,
    pub placeholder: &'static str,
    pub value: String,
    pub error: Option<&'static str>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SectionView {
    pub id: Section,
    pub title: &'static str,
    pub visible: bool,
    pub fields: Vec<FieldView>,
}

/// The pre-registration form: a draft, its inline errors and the submission status.
#[derive(Debug, Default)]
pub struct EntryScreen {
    draft: RegistrationDraft,
    errors: FieldErrors,
    submitting: bool,
    submitted: Option<StoredRegistration>,
}

impl EntryScreen {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn draft(&self) -> &RegistrationDraft {
        &self.draft
    }

    pub fn errors(&self) -> &FieldErrors {
        &self.errors
    }

    pub fn submitted(&self) -> Option<&StoredRegistration> {
        self.submitted.as_ref()
    }

    pub fn is_submitting(&self) -> bool {
        self.submitting
    }

    pub fn select_batch(&mut self, value: &str) {
        self.edit(Field::Batch, value);
    }

    /// Changes one field. Its error, if any, goes away without revalidating the rest.
    pub fn edit(&mut self, field: Field, value: &str) {
        self.draft.set(field, value);
        self.errors.remove(&field);
    }

    #[must_use]
    pub fn visible_sections(&self) -> &'static [Section] {
        if self.draft.batch.is_some() {
            &Section::ALL
        } else {
            &[]
        }
    }

    #[must_use]
    pub fn field(&self, field: Field) -> FieldView {
        let (label, widget, options) = presentation(field);
        FieldView {
            name: field.name(),
            label,
            widget,
            options,
            placeholder: if field == Field::NationalId { "Solo números" } else { "" },
            value: self.draft.get(field),
            error: self.errors.get(&field).copied(),
        }
    }

    /// Every section in form order, flagged with whether it is revealed.
    #[must_use]
    pub fn sections(&self) -> Vec<SectionView> {
        let visible = self.visible_sections();
        Section::ALL
            .into_iter()
            .map(|section| SectionView {
                id: section,
                title: section.title(),
                visible: visible.contains(&section),
                fields: section.fields().iter().map(|f| self.field(*f)).collect(),
            })
            .collect()
    }

    /// Marks a submission as in flight. Returns `false` if one already is.
    pub fn begin_submit(&mut self) -> bool {
        if self.submitting {
            return false;
        }
        self.submitting = true;
        true
    }

    /// Applies the outcome of a submission and returns what to tell the user.
    pub fn finish_submit(
        &mut self,
        result: Result<StoredRegistration, SubmitError>,
        query: &RecordQuery,
    ) -> Notification {
        self.submitting = false;
        match result {
            Ok(stored) => {
                query.invalidate(stored.registration.batch);
                self.draft = RegistrationDraft::default();
                self.errors.clear();
                self.submitted = Some(stored);
                submitted()
            }
            Err(SubmitError::Invalid(errors)) => {
                self.errors = errors;
                Notification::error(
                    "Error en el formulario",
                    "Por favor revise los campos marcados en rojo.",
                )
            }
            Err(SubmitError::Backend(e)) => {
                Notification::error("No se pudo completar el pre-registro", e.to_string())
            }
        }
    }

    /// Validates and sends the draft. `None` when a submission is already in flight.
    pub async fn submit(
        &mut self,
        submitter: &Submitter,
        query: &RecordQuery,
    ) -> Option<Notification> {
        if !self.begin_submit() {
            return None;
        }
        let result = submitter.submit(&self.draft).await;
        Some(self.finish_submit(result, query))
    }

}

/// Notice left by a successful submission. The confirmation page requires it.
#[must_use]
pub fn submitted() -> Notification {
    Notification::success(
        "Pre-registro completado con éxito",
        "Sus datos han sido registrados correctamente.",
    )
}
