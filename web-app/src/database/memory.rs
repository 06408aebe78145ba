use std::sync::{
    atomic::{AtomicI64, Ordering},
    Mutex, MutexGuard, PoisonError,
};

use chrono::Utc;
use rocket::async_trait;
use shared::data::{Batch, NewRegistration, StoredRegistration};

use super::{RegistrationStore, StoreError};

/// Process-local store used for development and tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    rows: Mutex<Vec<StoredRegistration>>,
    next_id: AtomicI64,
    #[cfg(test)]
    script: tests::Script,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl RegistrationStore for MemoryStore {
    async fn insert_one(
        &self,
        registration: &NewRegistration,
    ) -> Result<StoredRegistration, StoreError> {
        #[cfg(test)]
        self.script.play(tests::Call::Insert).await?;

        let stored = StoredRegistration {
            id: self.next_id.fetch_add(1, Ordering::SeqCst) + 1,
            registration: registration.clone(),
            created_at: Utc::now(),
        };
        lock(&self.rows).push(stored.clone());
        Ok(stored)
    }

    async fn select_by_batch(&self, batch: Batch) -> Result<Vec<StoredRegistration>, StoreError> {
        #[cfg(test)]
        self.script.play(tests::Call::Select).await?;

        let mut rows: Vec<StoredRegistration> = lock(&self.rows)
            .iter()
            .filter(|row| row.registration.batch == batch)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(rows)
    }
}

#[cfg(test)]
pub mod tests {
    use std::{
        collections::VecDeque,
        sync::atomic::AtomicUsize,
        time::Duration,
    };

    use chrono::NaiveDate;
    use log::debug;
    use rocket::tokio::time::sleep;
    use shared::data::{PriorRegistration, Sex};

    use super::*;

    /// How the next backend call should misbehave.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Behaviour {
        /// Fail immediately with the given message.
        Fail(String),
        /// Wait before answering normally.
        Stall(Duration),
    }

    pub enum Call {
        Insert,
        Select,
    }

    /// Scripted misbehaviour and call counters. One behaviour is consumed per call.
    #[derive(Debug, Default)]
    pub struct Script {
        behaviours: Mutex<VecDeque<Behaviour>>,
        inserts: AtomicUsize,
        selects: AtomicUsize,
    }

    impl Script {
        pub async fn play(&self, call: Call) -> Result<(), StoreError> {
            match call {
                Call::Insert => self.inserts.fetch_add(1, Ordering::SeqCst),
                Call::Select => self.selects.fetch_add(1, Ordering::SeqCst),
            };
            let next = lock(&self.behaviours).pop_front();
            match next {
                Some(Behaviour::Fail(message)) => Err(StoreError::Unavailable(message)),
                Some(Behaviour::Stall(duration)) => {
                    debug!("Memory store stalling for {duration:?}");
                    sleep(duration).await;
                    Ok(())
                }
                None => Ok(()),
            }
        }
    }

    impl MemoryStore {
        pub fn push_behaviour(&self, behaviour: Behaviour) {
            lock(&self.script.behaviours).push_back(behaviour);
        }

        pub fn insert_calls(&self) -> usize {
            self.script.inserts.load(Ordering::SeqCst)
        }

        pub fn select_calls(&self) -> usize {
            self.script.selects.load(Ordering::SeqCst)
        }

        pub fn rows(&self) -> Vec<StoredRegistration> {
            lock(&self.rows).clone()
        }
    }

    pub fn registration(batch: Batch, plate: &str) -> NewRegistration {
        NewRegistration {
            batch,
            first_name: "Juan".into(),
            last_name: "Gómez".into(),
            national_id: "30123456".into(),
            sex: Sex::Masculino,
            license_expiry: NaiveDate::from_ymd_opt(2027, 5, 20).unwrap(),
            plate: plate.into(),
            make: "Toyota".into(),
            model: "Hilux".into(),
            insurer: "Sancor".into(),
            policy_number: "998877".into(),
            policy_expiry: NaiveDate::from_ymd_opt(2026, 11, 30).unwrap(),
            prior_registration: PriorRegistration::No,
        }
    }

    #[rocket::async_test]
    async fn selects_only_the_batch_newest_first() {
        let store = MemoryStore::new();
        store.insert_one(&registration(Batch::Lote14, "AA111AA")).await.unwrap();
        store.insert_one(&registration(Batch::Lote49, "BB222BB")).await.unwrap();
        store.insert_one(&registration(Batch::Lote14, "CC333CC")).await.unwrap();

        let rows = store.select_by_batch(Batch::Lote14).await.unwrap();
        let plates: Vec<_> = rows.iter().map(|r| r.registration.plate.as_str()).collect();
        assert_eq!(plates, ["CC333CC", "AA111AA"]);
        assert_eq!(store.select_calls(), 1);
        assert_eq!(store.insert_calls(), 3);
    }

    #[rocket::async_test]
    async fn scripted_failures_are_consumed_once() {
        let store = MemoryStore::new();
        store.push_behaviour(Behaviour::Fail("offline".into()));

        assert!(matches!(
            store.select_by_batch(Batch::Lote49).await,
            Err(StoreError::Unavailable(message)) if message == "offline"
        ));
        assert!(store.select_by_batch(Batch::Lote49).await.unwrap().is_empty());
    }
}
