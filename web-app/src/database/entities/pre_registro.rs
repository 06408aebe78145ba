use chrono::{DateTime, NaiveDate, Utc};
use shared::data::{NewRegistration, StoredRegistration};

/// Column list shared by every statement that returns whole rows.
pub const COLUMNS: &str = "id, lote, nombre, apellido, dni, sexo, vencimiento_licencia, patente, \
     marca, modelo, aseguradora, poliza, vencimiento_poliza, registrado_anteriormente, created_at";

/// A row of `pre_registros`, with the enumerated columns still as text.
#[derive(Clone, Debug, PartialEq, Eq, sqlx::FromRow)]
pub struct Model {
    pub id: i64,
    pub lote: String,
    pub nombre: String,
    pub apellido: String,
    pub dni: String,
    pub sexo: String,
    pub vencimiento_licencia: NaiveDate,
    pub patente: String,
    pub marca: String,
    pub modelo: String,
    pub aseguradora: String,
    pub poliza: String,
    pub vencimiento_poliza: NaiveDate,
    pub registrado_anteriormente: String,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<Model> for StoredRegistration {
    type Error = shared::data::Error;

    fn try_from(value: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: value.id,
            registration: NewRegistration {
                batch: value.lote.try_into()?,
                first_name: value.nombre,
                last_name: value.apellido,
                national_id: value.dni,
                sex: value.sexo.try_into()?,
                license_expiry: value.vencimiento_licencia,
                plate: value.patente,
                make: value.marca,
                model: value.modelo,
                insurer: value.aseguradora,
                policy_number: value.poliza,
                policy_expiry: value.vencimiento_poliza,
                prior_registration: value.registrado_anteriormente.try_into()?,
            },
            created_at: value.created_at,
        })
    }
}
