//! Spreadsheet export of a batch's registrations.

use std::io::Cursor;

use chrono::{DateTime, FixedOffset, Locale, NaiveDate, Utc};
use log::info;
use rocket::{
    http::ContentType,
    response::{self, Responder},
    Request, Response,
};
use rust_xlsxwriter::{Format, Workbook, XlsxError};
use shared::data::{Batch, StoredRegistration};
use thiserror::Error;

pub const HEADER: [&str; 13] = [
    "Nombre",
    "Apellido",
    "DNI",
    "Sexo",
    "Vencimiento Licencia",
    "Patente",
    "Marca",
    "Modelo",
    "Aseguradora",
    "Póliza",
    "Vencimiento Póliza",
    "Registrado Anteriormente",
    "Fecha de Registro",
];

const COLUMN_WIDTHS: [f64; 13] = [
    15.0, 15.0, 12.0, 10.0, 20.0, 12.0, 15.0, 15.0, 20.0, 20.0, 20.0, 15.0, 30.0,
];

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("There are no registrations to export for batch {0}")]
    Empty(Batch),
    #[error("Failed to write the spreadsheet: {0}")]
    Xlsx(#[from] XlsxError),
}

/// The table that ends up in the workbook, before any encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sheet {
    pub name: String,
    pub header: [&'static str; 13],
    pub rows: Vec<[String; 13]>,
}

#[derive(Debug, Clone)]
pub struct ExportFile {
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub rows: usize,
}

/// Sent as an attachment so the browser saves it under `file_name`.
impl<'r> Responder<'r, 'static> for ExportFile {
    fn respond_to(self, _: &'r Request<'_>) -> response::Result<'static> {
        let disposition = format!("attachment; filename=\"{}\"", self.file_name);
        Response::build()
            .header(ContentType::new(
                "application",
                "vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            ))
            .raw_header("Content-Disposition", disposition)
            .sized_body(self.bytes.len(), Cursor::new(self.bytes))
            .ok()
    }
}

#[must_use]
pub fn short_date(date: NaiveDate) -> String {
    date.format("%d/%m/%Y").to_string()
}

/// `16 de octubre de 2026, 14:05`
#[must_use]
pub fn long_timestamp(timestamp: DateTime<Utc>, offset: &FixedOffset) -> String {
    timestamp
        .with_timezone(offset)
        .format_localized("%d de %B de %Y, %H:%M", Locale::es_ES)
        .to_string()
}

#[must_use]
pub fn file_name(batch: Batch, today: NaiveDate) -> String {
    format!("Pre-Registros_Lote{batch}_{}.xlsx", today.format("%d%m%Y"))
}

pub fn build_sheet(
    records: &[StoredRegistration],
    batch: Batch,
    offset: &FixedOffset,
) -> Result<Sheet, ExportError> {
    if records.is_empty() {
        return Err(ExportError::Empty(batch));
    }

    let rows = records
        .iter()
        .map(|stored| {
            let r = &stored.registration;
            [
                r.first_name.clone(),
                r.last_name.clone(),
                r.national_id.clone(),
                r.sex.as_str().into(),
                short_date(r.license_expiry),
                r.plate.clone(),
                r.make.clone(),
                r.model.clone(),
                r.insurer.clone(),
                r.policy_number.clone(),
                short_date(r.policy_expiry),
                r.prior_registration.as_str().into(),
                long_timestamp(stored.created_at, offset),
            ]
        })
        .collect();

    Ok(Sheet {
        name: format!("Lote {batch}"),
        header: HEADER,
        rows,
    })
}

pub fn write_workbook(sheet: &Sheet) -> Result<Vec<u8>, ExportError> {
    let mut workbook = Workbook::new();
    let bold = Format::new().set_bold();

    let worksheet = workbook.add_worksheet();
    worksheet.set_name(&sheet.name)?;

    for ((col, label), width) in (0u16..).zip(sheet.header).zip(COLUMN_WIDTHS) {
        worksheet.write_string_with_format(0, col, label, &bold)?;
        worksheet.set_column_width(col, width)?;
    }
    for (row, values) in (1u32..).zip(&sheet.rows) {
        for (col, value) in (0u16..).zip(values) {
            worksheet.write_string(row, col, value)?;
        }
    }

    Ok(workbook.save_to_buffer()?)
}

/// Builds the downloadable workbook. Fails without producing anything when
/// there are no records.
pub fn export(
    records: &[StoredRegistration],
    batch: Batch,
    offset: &FixedOffset,
    today: NaiveDate,
) -> Result<ExportFile, ExportError> {
    let sheet = build_sheet(records, batch, offset)?;
    let bytes = write_workbook(&sheet)?;
    let file = ExportFile {
        file_name: file_name(batch, today),
        bytes,
        rows: sheet.rows.len(),
    };
    info!("Exported {} registrations of batch {batch} to {}", file.rows, file.file_name);
    Ok(file)
}
