use std::io::Read;
use std::path::Path;

use chrono::{Days, NaiveDate};
use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::models::OrderRecord;

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("malformed record on line {line}: {reason}")]
    MalformedRecord { line: u64, reason: String },

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

/// One CSV row before validation. Accepts the Superstore export headers.
#[derive(Debug, Deserialize)]
struct CsvRow {
    #[serde(alias = "Row ID", default)]
    source_key: Option<String>,
    #[serde(alias = "Order ID", default)]
    order_id: String,
    #[serde(alias = "Customer Name", default)]
    customer_name: String,
    #[serde(alias = "Order Date", default)]
    order_date: String,
    #[serde(alias = "Ship Date", default)]
    ship_date: String,
    #[serde(alias = "Sales", default)]
    sales: String,
}

/// A validated order line plus the key used for idempotent imports.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportedOrder {
    pub source_key: String,
    pub record: OrderRecord,
}

#[derive(Debug, Default)]
pub struct ImportBatch {
    pub orders: Vec<ImportedOrder>,
    pub rejected: Vec<IngestError>,
}

/// Serial day number of 9999-12-31, the last date spreadsheets accept.
const MAX_SPREADSHEET_SERIAL: f64 = 2_958_465.0;

/// Spreadsheet day zero. Serial 1 is 1899-12-31 and the phantom 1900-02-29
/// is absorbed by starting a day early.
fn spreadsheet_epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1899, 12, 30).unwrap_or_default()
}

pub fn parse_order_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, "%m/%d/%Y") {
        return Some(date);
    }

    let serial: f64 = value.parse().ok()?;
    if !serial.is_finite() || !(1.0..=MAX_SPREADSHEET_SERIAL).contains(&serial) {
        return None;
    }
    spreadsheet_epoch().checked_add_days(Days::new(serial.trunc() as u64))
}

/// Key for rows without one: the line number plus a digest of the fields, so
/// re-reading the same file yields the same keys.
fn derived_source_key(
    line: u64,
    order_id: &str,
    customer_name: &str,
    order_date: NaiveDate,
    ship_date: NaiveDate,
    sales: f64,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!(
        "{order_id}\x1f{customer_name}\x1f{order_date}\x1f{ship_date}\x1f{sales}"
    ));
    let digest = hasher.finalize();
    format!("line-{line}-{}", &format!("{digest:x}")[..16])
}

fn validate(line: u64, row: CsvRow) -> Result<ImportedOrder, IngestError> {
    let malformed = |reason: String| IngestError::MalformedRecord { line, reason };

    let order_id = row.order_id.trim().to_string();
    if order_id.is_empty() {
        return Err(malformed("missing order id".to_string()));
    }
    if row.customer_name.trim().is_empty() {
        return Err(malformed("missing customer name".to_string()));
    }

    let order_date = parse_order_date(&row.order_date)
        .ok_or_else(|| malformed(format!("unparseable order date '{}'", row.order_date)))?;
    let ship_date = parse_order_date(&row.ship_date)
        .ok_or_else(|| malformed(format!("unparseable ship date '{}'", row.ship_date)))?;

    let sales: f64 = row
        .sales
        .trim()
        .parse()
        .map_err(|_| malformed(format!("unparseable sales amount '{}'", row.sales)))?;
    if !sales.is_finite() {
        return Err(malformed(format!("non-finite sales amount '{}'", row.sales)));
    }

    let source_key = row
        .source_key
        .map(|key| key.trim().to_string())
        .filter(|key| !key.is_empty())
        .unwrap_or_else(|| {
            derived_source_key(
                line,
                &order_id,
                &row.customer_name,
                order_date,
                ship_date,
                sales,
            )
        });

    Ok(ImportedOrder {
        source_key,
        record: OrderRecord {
            order_id,
            customer_name: row.customer_name,
            order_date,
            ship_date,
            sales,
        },
    })
}

/// Reads and validates order lines. Malformed rows are collected, not fatal.
pub fn read_orders<R: Read>(reader: R) -> Result<ImportBatch, IngestError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::Headers)
        .from_reader(reader);
    let headers = reader.headers()?.clone();
    let mut batch = ImportBatch::default();

    for result in reader.records() {
        let record = match result {
            Ok(record) => record,
            Err(err) if err.is_io_error() => return Err(err.into()),
            Err(err) => {
                let line = err.position().map(|p| p.line()).unwrap_or_default();
                let err = IngestError::MalformedRecord {
                    line,
                    reason: err.to_string(),
                };
                tracing::warn!(%err, "rejected order line");
                batch.rejected.push(err);
                continue;
            }
        };
        let line = record.position().map(|p| p.line()).unwrap_or_default();

        let validated = record
            .deserialize::<CsvRow>(Some(&headers))
            .map_err(|err| IngestError::MalformedRecord {
                line,
                reason: err.to_string(),
            })
            .and_then(|row| validate(line, row));

        match validated {
            Ok(order) => batch.orders.push(order),
            Err(err) => {
                tracing::warn!(%err, "rejected order line");
                batch.rejected.push(err);
            }
        }
    }

    tracing::info!(
        accepted = batch.orders.len(),
        rejected = batch.rejected.len(),
        "read order lines"
    );
    Ok(batch)
}

pub fn read_orders_from_path(path: &Path) -> anyhow::Result<ImportBatch> {
    let file = std::fs::File::open(path)?;
    Ok(read_orders(file)?)
}
