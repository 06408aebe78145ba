use std::sync::Arc;

use rocket::{
    fairing::{self, Fairing, Info, Kind},
    Build, Rocket,
};
use sqlx::postgres::PgPoolOptions;

use super::{memory::MemoryStore, postgres::PostgresStore, rest::RestStore, RegistrationStore};
use crate::{
    config::{AppConfig, Backend},
    migrator,
    query::RecordQuery,
    submit::Submitter,
};

/// Connects the configured backend at ignition and manages the services
/// built on top of it.
pub struct DatabaseFairing {
    preset: Option<Arc<dyn RegistrationStore>>,
}

impl DatabaseFairing {
    pub fn fairing() -> Self {
        Self { preset: None }
    }

    /// Skips connecting and uses the given store.
    #[cfg(test)]
    pub fn with_store(store: Arc<dyn RegistrationStore>) -> Self {
        Self {
            preset: Some(store),
        }
    }
}

async fn connect(config: &AppConfig) -> Result<Arc<dyn RegistrationStore>, String> {
    match config.backend {
        Backend::Postgres => {
            let pool = PgPoolOptions::new()
                .max_connections(5)
                .connect(&config.database_url)
                .await
                .map_err(|e| format!("Failed to connect to database: {e}"))?;

            let applied = migrator::migrate(&pool)
                .await
                .map_err(|e| format!("Failed to apply pending migrations: {e}"))?;
            info!("{applied} database migrations applied.");

            Ok(Arc::new(PostgresStore::new(pool)))
        }
        Backend::Rest => {
            let (Some(url), Some(key)) = (&config.rest_url, &config.rest_api_key) else {
                return Err("The rest backend needs both rest_url and rest_api_key.".into());
            };
            let store = RestStore::new(url, key).map_err(|e| e.to_string())?;
            info!("Using the rest backend at {}", store.endpoint());
            Ok(Arc::new(store))
        }
        Backend::Memory => {
            warn!("Using the in-memory backend. Registrations are lost on shutdown.");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

#[rocket::async_trait]
impl Fairing for DatabaseFairing {
    fn info(&self) -> Info {
        Info {
            name: "Database",
            kind: Kind::Ignite | Kind::Singleton,
        }
    }

    async fn on_ignite(&self, rocket: Rocket<Build>) -> fairing::Result {
        let config: AppConfig = match rocket.figment().extract() {
            Ok(config) => config,
            Err(e) => {
                error!("Invalid configuration: {e}");
                return Err(rocket);
            }
        };

        let store = match &self.preset {
            Some(store) => store.clone(),
            None => match connect(&config).await {
                Ok(store) => store,
                Err(e) => {
                    error!("{e}");
                    return Err(rocket);
                }
            },
        };

        let query = RecordQuery::new(store.clone(), config.query_policy());
        Ok(rocket.manage(query).manage(Submitter::new(store)))
    }
}
