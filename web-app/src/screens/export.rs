use chrono::{FixedOffset, NaiveDate};
use serde::Serialize;
use shared::data::{Batch, StoredRegistration};

use super::Notification;
use crate::{
    export::{self, ExportError, ExportFile},
    query::{QueryError, RecordQuery, Records},
};

/// What the result area under the selector shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableState {
    /// No batch chosen yet.
    Idle,
    Loading,
    /// Persistent banner with a link that reloads the batch.
    Failed(String),
    Empty,
    Loaded(Records),
}

/// One line of the on-screen table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableRow {
    pub first_name: String,
    pub last_name: String,
    pub national_id: String,
    pub plate: String,
    pub registered_at: String,
}

impl TableRow {
    fn new(stored: &StoredRegistration, offset: &FixedOffset) -> Self {
        let r = &stored.registration;
        Self {
            first_name: r.first_name.clone(),
            last_name: r.last_name.clone(),
            national_id: r.national_id.clone(),
            plate: r.plate.clone(),
            registered_at: stored
                .created_at
                .with_timezone(offset)
                .format("%d/%m/%Y, %H:%M")
                .to_string(),
        }
    }
}

#[derive(Debug)]
pub struct ExportScreen {
    batch: Option<Batch>,
    table: TableState,
}

impl Default for ExportScreen {
    fn default() -> Self {
        Self {
            batch: None,
            table: TableState::Idle,
        }
    }
}

impl ExportScreen {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn batch(&self) -> Option<Batch> {
        self.batch
    }

    pub fn table(&self) -> &TableState {
        &self.table
    }

    /// Switches to another batch. Returns whether a fetch has to be issued,
    /// which is the case for any selected batch.
    pub fn select_batch(&mut self, batch: Option<Batch>) -> bool {
        self.batch = batch;
        if batch.is_some() {
            self.table = TableState::Loading;
            true
        } else {
            self.table = TableState::Idle;
            false
        }
    }

    /// Records the outcome of a fetch. A failure yields exactly one
    /// notification; settling again without a new fetch yields none.
    pub fn settle(&mut self, result: Result<Records, QueryError>) -> Option<Notification> {
        if self.table != TableState::Loading {
            return None;
        }

        match result {
            Ok(records) if records.is_empty() => {
                self.table = TableState::Empty;
                None
            }
            Ok(records) => {
                self.table = TableState::Loaded(records);
                None
            }
            Err(e) => {
                let message = match e {
                    QueryError::TimedOut(_) => {
                        "La consulta tardó demasiado. Por favor, intente nuevamente."
                    }
                    QueryError::Backend(_) => {
                        "Error al cargar los datos. Por favor, intente nuevamente."
                    }
                };
                self.table = TableState::Failed(message.into());
                Some(Notification::error("Error al cargar los datos", message))
            }
        }
    }

    /// Runs the pending fetch, if any.
    pub async fn load(&mut self, query: &RecordQuery) -> Option<Notification> {
        if self.table != TableState::Loading {
            return None;
        }
        let result = query.fetch(self.batch).await;
        self.settle(result)
    }

    #[must_use]
    pub fn records(&self) -> &[StoredRegistration] {
        match &self.table {
            TableState::Loaded(records) => records,
            _ => &[],
        }
    }

    #[must_use]
    pub fn rows(&self, offset: &FixedOffset) -> Vec<TableRow> {
        self.records()
            .iter()
            .map(|stored| TableRow::new(stored, offset))
            .collect()
    }

    /// Whether the export action is offered. The page disables it again
    /// on click while the download is in flight.
    #[must_use]
    pub fn export_enabled(&self) -> bool {
        self.batch.is_some() && !self.records().is_empty()
    }

    /// Notice shown by the page once the user starts the download.
    #[must_use]
    pub fn export_notice(&self) -> Option<Notification> {
        self.export_enabled().then(|| exported(self.records().len()))
    }

    pub fn export(
        &self,
        offset: &FixedOffset,
        today: NaiveDate,
    ) -> Result<ExportFile, Notification> {
        let Some(batch) = self.batch else {
            return Err(Notification::error(
                "Seleccione un lote",
                "Debe seleccionar un lote antes de exportar.",
            ));
        };

        export::export(self.records(), batch, offset, today).map_err(|e| match e {
            ExportError::Empty(_) => Notification::error(
                "No hay datos para exportar",
                "No se encontraron registros para el lote seleccionado.",
            ),
            ExportError::Xlsx(_) => Notification::error(
                "Error al exportar",
                "Ocurrió un error al exportar los datos a Excel.",
            ),
        })
    }
}

#[must_use]
pub fn exported(rows: usize) -> Notification {
    Notification::success(
        "Exportación exitosa",
        format!("Se han exportado {rows} registros a Excel."),
    )
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::{
        database::{
            memory::{tests::{registration, Behaviour}, MemoryStore},
            RegistrationStore, StoreError,
        },
        query::QueryPolicy,
    };

    fn offset() -> FixedOffset {
        FixedOffset::west_opt(3 * 3600).unwrap()
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 16).unwrap()
    }

    fn query(store: &Arc<MemoryStore>) -> RecordQuery {
        RecordQuery::new(
            store.clone(),
            QueryPolicy {
                timeout: Duration::from_millis(50),
                retries: 0,
                ..QueryPolicy::default()
            },
        )
    }

    fn stored(plate: &str) -> StoredRegistration {
        StoredRegistration {
            id: 1,
            registration: registration(Batch::Lote14, plate),
            created_at: Utc.with_ymd_and_hms(2026, 10, 16, 12, 30, 0).unwrap(),
        }
    }

    #[test]
    fn nothing_to_fetch_without_a_batch() {
        let mut screen = ExportScreen::new();
        assert!(!screen.select_batch(None));
        assert_eq!(screen.table(), &TableState::Idle);
        assert!(!screen.export_enabled());
    }

    #[rocket::async_test]
    async fn empty_batch_shows_no_records_not_an_error() {
        let store = Arc::new(MemoryStore::new());
        let mut screen = ExportScreen::new();

        assert!(screen.select_batch(Some(Batch::Lote49)));
        assert_eq!(screen.table(), &TableState::Loading);
        assert!(!screen.export_enabled());

        assert_eq!(screen.load(&query(&store)).await, None);
        assert_eq!(screen.table(), &TableState::Empty);
        assert!(!screen.export_enabled());
    }

    #[rocket::async_test]
    async fn loaded_batch_enables_export() {
        let store = Arc::new(MemoryStore::new());
        store.insert_one(&registration(Batch::Lote14, "AA111AA")).await.unwrap();
        let mut screen = ExportScreen::new();

        screen.select_batch(Some(Batch::Lote14));
        screen.load(&query(&store)).await;

        assert!(matches!(screen.table(), TableState::Loaded(records) if records.len() == 1));
        assert!(screen.export_enabled());
        assert_eq!(screen.rows(&offset())[0].plate, "AA111AA");
    }

    #[test]
    fn a_failure_notifies_once_per_attempt() {
        let mut screen = ExportScreen::new();
        screen.select_batch(Some(Batch::Lote14));

        let failure = || Err(QueryError::Backend(StoreError::Unavailable("down".into())));
        assert!(screen.settle(failure()).is_some());
        assert!(matches!(screen.table(), TableState::Failed(_)));
        assert_eq!(screen.settle(failure()), None);

        assert!(screen.select_batch(Some(Batch::Lote14)));
        assert!(screen.settle(failure()).is_some());
        assert_eq!(screen.settle(failure()), None);
    }

    #[rocket::async_test]
    async fn timeout_surfaces_the_banner() {
        let store = Arc::new(MemoryStore::new());
        store.push_behaviour(Behaviour::Stall(Duration::from_millis(500)));
        let query = query(&store);
        let mut screen = ExportScreen::new();

        screen.select_batch(Some(Batch::Lote49));
        let notification = screen.load(&query).await.unwrap();

        assert_eq!(notification.title, "Error al cargar los datos");
        assert!(matches!(screen.table(), TableState::Failed(m) if m.contains("tardó demasiado")));
        assert_eq!(screen.load(&query).await, None);

        assert!(screen.select_batch(Some(Batch::Lote49)));
        assert_eq!(screen.load(&query).await, None);
        assert_eq!(screen.table(), &TableState::Empty);
    }

    #[test]
    fn exporting_nothing_fails_with_a_notification() {
        let mut screen = ExportScreen::new();
        screen.select_batch(Some(Batch::Lote49));
        screen.settle(Ok(Records::default()));

        let notification = screen.export(&offset(), today()).unwrap_err();
        assert_eq!(notification.title, "No hay datos para exportar");
        assert_eq!(screen.export_notice(), None);
    }

    #[test]
    fn exporting_records_yields_a_file() {
        let mut screen = ExportScreen::new();
        screen.select_batch(Some(Batch::Lote14));
        screen.settle(Ok(Arc::new(vec![stored("AA111AA"), stored("BB222BB")])));

        let file = screen.export(&offset(), today()).unwrap();
        assert_eq!(file.rows, 2);
        assert_eq!(file.file_name, "Pre-Registros_Lote14_16102026.xlsx");
        assert_eq!(
            screen.export_notice().map(|n| n.description),
            Some("Se han exportado 2 registros a Excel.".into())
        );
        assert!(screen.export_enabled());
    }

    #[test]
    fn table_rows_use_the_display_offset() {
        let mut screen = ExportScreen::new();
        screen.select_batch(Some(Batch::Lote14));
        screen.settle(Ok(Arc::new(vec![stored("AA111AA")])));

        assert_eq!(screen.rows(&offset())[0].registered_at, "16/10/2026, 09:30");
    }
}
