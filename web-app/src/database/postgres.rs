use log::debug;
use rocket::async_trait;
use shared::data::{Batch, NewRegistration, StoredRegistration};
use sqlx::{Pool, Postgres};

use super::{
    entities::pre_registro::{self, COLUMNS},
    RegistrationStore, StoreError, TABLE,
};

pub struct PostgresStore {
    pool: Pool<Postgres>,
}

impl PostgresStore {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RegistrationStore for PostgresStore {
    async fn insert_one(
        &self,
        registration: &NewRegistration,
    ) -> Result<StoredRegistration, StoreError> {
        let statement = format!(
            "INSERT INTO {TABLE} (lote, nombre, apellido, dni, sexo, vencimiento_licencia, patente, \
             marca, modelo, aseguradora, poliza, vencimiento_poliza, registrado_anteriormente) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13) \
             RETURNING {COLUMNS}"
        );

        let row: pre_registro::Model = sqlx::query_as(&statement)
            .bind(registration.batch.id())
            .bind(&registration.first_name)
            .bind(&registration.last_name)
            .bind(&registration.national_id)
            .bind(registration.sex.as_str())
            .bind(registration.license_expiry)
            .bind(&registration.plate)
            .bind(&registration.make)
            .bind(&registration.model)
            .bind(&registration.insurer)
            .bind(&registration.policy_number)
            .bind(registration.policy_expiry)
            .bind(registration.prior_registration.as_str())
            .fetch_one(&self.pool)
            .await?;

        Ok(row.try_into()?)
    }

    async fn select_by_batch(&self, batch: Batch) -> Result<Vec<StoredRegistration>, StoreError> {
        let statement =
            format!("SELECT {COLUMNS} FROM {TABLE} WHERE lote = $1 ORDER BY created_at DESC");

        let rows: Vec<pre_registro::Model> = sqlx::query_as(&statement)
            .bind(batch.id())
            .fetch_all(&self.pool)
            .await?;
        debug!("Fetched {} rows for batch {batch}", rows.len());

        rows.into_iter()
            .map(|row| StoredRegistration::try_from(row).map_err(StoreError::from))
            .collect()
    }
}
