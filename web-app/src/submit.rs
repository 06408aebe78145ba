use std::sync::Arc;

use log::{info, warn};
use shared::{
    data::{NewRegistration, RegistrationDraft, StoredRegistration},
    validation::FieldErrors,
};
use thiserror::Error;

use crate::database::{RegistrationStore, StoreError};

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("The draft has {} invalid field(s)", .0.len())]
    Invalid(FieldErrors),
    #[error(transparent)]
    Backend(#[from] StoreError),
}

/// Validates a draft and writes it to the backend exactly once.
///
/// There is no retry and no idempotency key: if the user resubmits after an
/// ambiguous failure the backend may end up with two rows.
pub struct Submitter {
    store: Arc<dyn RegistrationStore>,
}

impl Submitter {
    pub fn new(store: Arc<dyn RegistrationStore>) -> Self {
        Self { store }
    }

    pub async fn submit(&self, draft: &RegistrationDraft) -> Result<StoredRegistration, SubmitError> {
        let registration = NewRegistration::try_from(draft).map_err(SubmitError::Invalid)?;

        match self.store.insert_one(&registration).await {
            Ok(stored) => {
                info!(
                    "Stored pre-registration {} for batch {}",
                    stored.id, stored.registration.batch
                );
                Ok(stored)
            }
            Err(e) => {
                warn!("Backend refused pre-registration for batch {}: {e}", registration.batch);
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
pub mod tests {
    use chrono::NaiveDate;
    use shared::{
        data::{Batch, PriorRegistration, Sex},
        validation::Field,
    };

    use super::*;
    use crate::database::memory::{tests::Behaviour, MemoryStore};

    pub fn valid_draft() -> RegistrationDraft {
        RegistrationDraft {
            batch: Some(Batch::Lote14),
            first_name: "Juan".into(),
            last_name: "Gómez".into(),
            national_id: "30123456".into(),
            sex: Some(Sex::Masculino),
            license_expiry: NaiveDate::from_ymd_opt(2027, 5, 20),
            plate: "ab123cd".into(),
            make: "Toyota".into(),
            model: "Hilux".into(),
            insurer: "Sancor".into(),
            policy_number: "998877".into(),
            policy_expiry: NaiveDate::from_ymd_opt(2026, 11, 30),
            prior_registration: Some(PriorRegistration::Si),
        }
    }

    #[rocket::async_test]
    async fn valid_draft_is_inserted_once_normalized() {
        let store = Arc::new(MemoryStore::new());
        let submitter = Submitter::new(store.clone());

        let stored = submitter.submit(&valid_draft()).await.unwrap();

        assert_eq!(store.insert_calls(), 1);
        let rows = store.rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0], stored);
        assert_eq!(stored.registration.batch, Batch::Lote14);
        assert_eq!(stored.registration.plate, "AB123CD");
        assert_eq!(
            stored.registration.license_expiry.to_string(),
            "2027-05-20"
        );
    }

    #[rocket::async_test]
    async fn invalid_draft_never_reaches_the_backend() {
        let store = Arc::new(MemoryStore::new());
        let submitter = Submitter::new(store.clone());
        let mut draft = valid_draft();
        draft.national_id = "abc123".into();

        let result = submitter.submit(&draft).await;

        assert!(matches!(result, Err(SubmitError::Invalid(errors)) if errors.contains_key(&Field::NationalId)));
        assert_eq!(store.insert_calls(), 0);
    }

    #[rocket::async_test]
    async fn backend_failure_is_reported_without_retry() {
        let store = Arc::new(MemoryStore::new());
        store.push_behaviour(Behaviour::Fail("duplicate key value".into()));
        let submitter = Submitter::new(store.clone());

        let result = submitter.submit(&valid_draft()).await;

        match result {
            Err(SubmitError::Backend(e)) => assert!(e.to_string().contains("duplicate key value")),
            other => panic!("expected a backend error, got {other:?}"),
        }
        assert_eq!(store.insert_calls(), 1);
        assert!(store.rows().is_empty());
    }
}
