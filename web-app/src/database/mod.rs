use rocket::async_trait;
use shared::data::{Batch, NewRegistration, StoredRegistration};
use thiserror::Error;

pub mod entities;
pub mod fairing;
pub mod memory;
pub mod postgres;
pub mod rest;

/// Name of the table (or PostgREST resource) holding the pre-registrations.
pub const TABLE: &str = "pre_registros";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("An error occured whilst trying to access the database: {0}")]
    DatabaseError(#[from] sqlx::Error),
    #[error("The backend could not be reached: {0}")]
    RequestFailed(#[from] reqwest::Error),
    #[error("The backend rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("Could not convert stored values to internal types: {0}")]
    InternalConversionFailed(#[from] shared::data::Error),
    #[error("The backend is unavailable: {0}")]
    Unavailable(String),
}

/// The two operations the application needs from the hosted backend.
///
/// Implementations must return `select_by_batch` rows newest first.
#[async_trait]
pub trait RegistrationStore: Send + Sync {
    async fn insert_one(
        &self,
        registration: &NewRegistration,
    ) -> Result<StoredRegistration, StoreError>;

    async fn select_by_batch(&self, batch: Batch) -> Result<Vec<StoredRegistration>, StoreError>;
}
