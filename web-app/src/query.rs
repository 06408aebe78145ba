//! Fetching the registrations of a batch.
//!
//! Every attempt is bounded by a timeout, failed attempts are retried a small
//! number of times with a capped exponential delay, and successful results are
//! kept per batch so revisiting a batch shortly after does not hit the backend.
//! A timed out query is a failure, never an empty result.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};

use log::{debug, error, info, warn};
use rocket::tokio::time::{sleep, timeout};
use shared::data::{Batch, StoredRegistration};
use thiserror::Error;

use crate::database::{RegistrationStore, StoreError};

/// Upper bound for [`QueryPolicy::retries`].
pub const MAX_RETRIES: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryPolicy {
    pub timeout: Duration,
    pub retries: u32,
    pub retry_delay: Duration,
    pub retry_delay_cap: Duration,
    pub stale_after: Duration,
}

impl Default for QueryPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            retries: 1,
            retry_delay: Duration::from_secs(1),
            retry_delay_cap: Duration::from_secs(4),
            stale_after: Duration::from_secs(30),
        }
    }
}

impl QueryPolicy {
    /// Delay before retry number `attempt + 1`: `retry_delay * 2^attempt`, capped.
    #[must_use]
    pub fn delay_before_retry(&self, attempt: u32) -> Duration {
        self.retry_delay
            .saturating_mul(1 << attempt.min(16))
            .min(self.retry_delay_cap)
    }
}

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("The query did not answer within {0:?}")]
    TimedOut(Duration),
    #[error(transparent)]
    Backend(#[from] StoreError),
}

pub type Records = Arc<Vec<StoredRegistration>>;

#[derive(Debug, Clone)]
pub struct CachedRecords {
    pub records: Records,
    pub fetched_at: Instant,
}

impl CachedRecords {
    #[must_use]
    pub fn is_fresh(&self, now: Instant, stale_after: Duration) -> bool {
        now.saturating_duration_since(self.fetched_at) < stale_after
    }
}

pub struct RecordQuery {
    store: Arc<dyn RegistrationStore>,
    policy: QueryPolicy,
    cache: Mutex<HashMap<Batch, CachedRecords>>,
}

impl RecordQuery {
    pub fn new(store: Arc<dyn RegistrationStore>, policy: QueryPolicy) -> Self {
        Self {
            store,
            policy,
            cache: Mutex::default(),
        }
    }

    /// Registrations of `batch`, newest first.
    ///
    /// Without a batch nothing is requested and the result is empty.
    pub async fn fetch(&self, batch: Option<Batch>) -> Result<Records, QueryError> {
        let Some(batch) = batch else {
            return Ok(Records::default());
        };

        if let Some(records) = self.cached(batch, Instant::now()) {
            debug!("Serving batch {batch} from cache ({} rows)", records.len());
            return Ok(records);
        }

        let records = Arc::new(self.fetch_with_retry(batch).await?);
        self.lock_cache().insert(
            batch,
            CachedRecords {
                records: Arc::clone(&records),
                fetched_at: Instant::now(),
            },
        );
        Ok(records)
    }

    /// The cached result for `batch`, if it is still fresh at `now`.
    pub fn cached(&self, batch: Batch, now: Instant) -> Option<Records> {
        self.lock_cache()
            .get(&batch)
            .filter(|entry| entry.is_fresh(now, self.policy.stale_after))
            .map(|entry| Arc::clone(&entry.records))
    }

    /// Forgets the cached result for `batch` so the next fetch goes to the backend.
    pub fn invalidate(&self, batch: Batch) {
        if self.lock_cache().remove(&batch).is_some() {
            debug!("Invalidated cached rows of batch {batch}");
        }
    }

    async fn fetch_with_retry(&self, batch: Batch) -> Result<Vec<StoredRegistration>, QueryError> {
        let retries = self.policy.retries.min(MAX_RETRIES);
        let mut attempt = 0;
        loop {
            match self.attempt(batch).await {
                Ok(records) => {
                    info!("Fetched {} registrations of batch {batch}", records.len());
                    return Ok(records);
                }
                Err(e) if attempt < retries => {
                    let delay = self.policy.delay_before_retry(attempt);
                    warn!("Query for batch {batch} failed ({e}), retrying in {delay:?}");
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    error!("Query for batch {batch} failed after {} attempts: {e}", attempt + 1);
                    return Err(e);
                }
            }
        }
    }

    async fn attempt(&self, batch: Batch) -> Result<Vec<StoredRegistration>, QueryError> {
        match timeout(self.policy.timeout, self.store.select_by_batch(batch)).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(QueryError::TimedOut(self.policy.timeout)),
        }
    }

    fn lock_cache(&self) -> MutexGuard<'_, HashMap<Batch, CachedRecords>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::memory::{tests::{registration, Behaviour}, MemoryStore};

    fn fast_policy() -> QueryPolicy {
        QueryPolicy {
            timeout: Duration::from_millis(50),
            retries: 1,
            retry_delay: Duration::from_millis(5),
            retry_delay_cap: Duration::from_millis(20),
            stale_after: Duration::from_secs(30),
        }
    }

    fn query(store: &Arc<MemoryStore>, policy: QueryPolicy) -> RecordQuery {
        RecordQuery::new(Arc::clone(store) as Arc<dyn RegistrationStore>, policy)
    }

    #[test]
    fn retry_delay_grows_and_is_capped() {
        let policy = QueryPolicy {
            retry_delay: Duration::from_secs(1),
            retry_delay_cap: Duration::from_secs(4),
            ..QueryPolicy::default()
        };
        assert_eq!(policy.delay_before_retry(0), Duration::from_secs(1));
        assert_eq!(policy.delay_before_retry(1), Duration::from_secs(2));
        assert_eq!(policy.delay_before_retry(2), Duration::from_secs(4));
        assert_eq!(policy.delay_before_retry(40), Duration::from_secs(4));
    }

    #[test]
    fn freshness_is_relative_to_the_callers_clock() {
        let fetched_at = Instant::now();
        let entry = CachedRecords {
            records: Records::default(),
            fetched_at,
        };
        let window = Duration::from_secs(30);
        assert!(entry.is_fresh(fetched_at + Duration::from_secs(29), window));
        assert!(!entry.is_fresh(fetched_at + Duration::from_secs(30), window));
    }

    #[rocket::async_test]
    async fn no_batch_issues_no_request() {
        let store = Arc::new(MemoryStore::new());
        let records = query(&store, fast_policy()).fetch(None).await.unwrap();
        assert!(records.is_empty());
        assert_eq!(store.select_calls(), 0);
    }

    #[rocket::async_test]
    async fn empty_batch_is_an_empty_result() {
        let store = Arc::new(MemoryStore::new());
        let records = query(&store, fast_policy())
            .fetch(Some(Batch::Lote49))
            .await
            .unwrap();
        assert!(records.is_empty());
    }

    #[rocket::async_test]
    async fn same_batch_within_window_hits_cache() {
        let store = Arc::new(MemoryStore::new());
        store.insert_one(&registration(Batch::Lote14, "AA111AA")).await.unwrap();
        let query = query(&store, fast_policy());

        let first = query.fetch(Some(Batch::Lote14)).await.unwrap();
        let second = query.fetch(Some(Batch::Lote14)).await.unwrap();
        assert_eq!(store.select_calls(), 1);
        assert!(Arc::ptr_eq(&first, &second));

        query.fetch(Some(Batch::Lote49)).await.unwrap();
        assert_eq!(store.select_calls(), 2);
    }

    #[rocket::async_test]
    async fn stale_entries_are_fetched_again() {
        let store = Arc::new(MemoryStore::new());
        let query = query(
            &store,
            QueryPolicy {
                stale_after: Duration::ZERO,
                ..fast_policy()
            },
        );

        query.fetch(Some(Batch::Lote14)).await.unwrap();
        query.fetch(Some(Batch::Lote14)).await.unwrap();
        assert_eq!(store.select_calls(), 2);
    }

    #[rocket::async_test]
    async fn invalidate_forces_a_new_request() {
        let store = Arc::new(MemoryStore::new());
        let query = query(&store, fast_policy());

        query.fetch(Some(Batch::Lote14)).await.unwrap();
        store.insert_one(&registration(Batch::Lote14, "AA111AA")).await.unwrap();
        query.invalidate(Batch::Lote14);

        let records = query.fetch(Some(Batch::Lote14)).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(store.select_calls(), 2);
    }

    #[rocket::async_test]
    async fn one_failure_is_retried() {
        let store = Arc::new(MemoryStore::new());
        store.push_behaviour(Behaviour::Fail("connection reset".into()));

        let result = query(&store, fast_policy()).fetch(Some(Batch::Lote14)).await;
        assert!(result.is_ok());
        assert_eq!(store.select_calls(), 2);
    }

    #[rocket::async_test]
    async fn gives_up_after_the_retry_budget() {
        let store = Arc::new(MemoryStore::new());
        for _ in 0..3 {
            store.push_behaviour(Behaviour::Fail("connection reset".into()));
        }
        let query = query(&store, fast_policy());

        let result = query.fetch(Some(Batch::Lote14)).await;
        assert!(matches!(result, Err(QueryError::Backend(StoreError::Unavailable(_)))));
        assert_eq!(store.select_calls(), 2);
        assert!(query.cached(Batch::Lote14, Instant::now()).is_none());
    }

    #[rocket::async_test]
    async fn stalled_backend_times_out_as_a_failure() {
        let store = Arc::new(MemoryStore::new());
        store.push_behaviour(Behaviour::Stall(Duration::from_millis(500)));
        let query = query(
            &store,
            QueryPolicy {
                retries: 0,
                ..fast_policy()
            },
        );

        let result = query.fetch(Some(Batch::Lote49)).await;
        assert!(matches!(result, Err(QueryError::TimedOut(t)) if t == Duration::from_millis(50)));
        assert_eq!(store.select_calls(), 1);
    }
}
