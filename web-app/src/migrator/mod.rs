use log::{error, info};
use sqlx::{Executor, Pool, Postgres};

use crate::database::{entities::migration, StoreError};

struct Migration {
    version: i32,
    name: &'static str,
    statements: &'static str,
}

macro_rules! migration {
    ($version:literal, $name:literal) => {
        Migration {
            version: $version,
            name: $name,
            statements: include_str!($name),
        }
    };
}

static MIGRATIONS: &[Migration] = &[migration!(1, "migration_000001_initial.sql")];

/// Applies every migration not yet recorded in `schema_migrations`, each in
/// its own transaction. Returns how many were applied.
pub async fn migrate(db: &Pool<Postgres>) -> Result<usize, StoreError> {
    db.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at TIMESTAMP NOT NULL DEFAULT now()
        )",
    )
    .await?;

    let applied: Vec<migration::Model> =
        sqlx::query_as("SELECT version, applied_at FROM schema_migrations")
            .fetch_all(db)
            .await?;

    let pending: Vec<&Migration> = MIGRATIONS
        .iter()
        .filter(|m| !applied.iter().any(|a| a.version == m.version))
        .collect();
    info!("{} database migrations pending.", pending.len());

    for migration in &pending {
        let mut tx = db.begin().await?;
        if let Err(e) = (&mut *tx).execute(migration.statements).await {
            error!("Encountered an error whilst applying {}: {e}", migration.name);
            return Err(e.into());
        }
        sqlx::query("INSERT INTO schema_migrations (version) VALUES ($1)")
            .bind(migration.version)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        info!("Applied {}", migration.name);
    }

    Ok(pending.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_ordered_and_unique() {
        let versions: Vec<i32> = MIGRATIONS.iter().map(|m| m.version).collect();
        let mut sorted = versions.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(versions, sorted);
    }

    #[test]
    fn initial_migration_creates_the_registrations_table() {
        assert!(MIGRATIONS[0]
            .statements
            .contains("CREATE TABLE IF NOT EXISTS pre_registros"));
    }
}
