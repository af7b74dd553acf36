use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{NaiveDate, NaiveDateTime};
use csv::StringRecord;
use tracing::{debug, info};

use crate::error::AnalysisError;
use crate::models::{OrderRecord, OrderStatus};

pub const ORDER_ID: &str = "order_id";
pub const ORDER_STATUS: &str = "order_status";
pub const ORDER_PURCHASED: &str = "order_purchase_timestamp";
pub const ORDER_DELIVERED: &str = "order_delivered_customer_date";
pub const ORDER_ESTIMATED: &str = "order_estimated_delivery_date";

const TIMESTAMP_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
];

/// The files shipped in the Olist public dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dataset {
    Customers,
    Geolocation,
    Orders,
    OrderItems,
    Payments,
    Reviews,
    Products,
    Sellers,
}

impl Dataset {
    pub fn file_name(&self) -> &'static str {
        match self {
            Self::Customers => "olist_customers_dataset.csv",
            Self::Geolocation => "olist_geolocation_dataset.csv",
            Self::Orders => "olist_orders_dataset.csv",
            Self::OrderItems => "olist_order_items_dataset.csv",
            Self::Payments => "olist_order_payments_dataset.csv",
            Self::Reviews => "olist_order_reviews_dataset.csv",
            Self::Products => "olist_products_dataset.csv",
            Self::Sellers => "olist_sellers_dataset.csv",
        }
    }
}

/// A CSV file held in memory as raw string records.
#[derive(Debug, Clone)]
pub struct Table {
    headers: StringRecord,
    rows: Vec<StringRecord>,
    byte_size: u64,
}

impl Table {
    pub fn from_reader<R: Read>(reader: R, byte_size: u64) -> anyhow::Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::Headers)
            .from_reader(reader);
        let headers = reader.headers()?.clone();
        let rows = reader
            .records()
            .collect::<Result<Vec<_>, _>>()
            .context("failed to read CSV records")?;

        Ok(Self {
            headers,
            rows,
            byte_size,
        })
    }

    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let byte_size = std::fs::metadata(path)
            .with_context(|| format!("failed to stat {}", path.display()))?
            .len();
        let file = std::fs::File::open(path)
            .with_context(|| format!("failed to open {}", path.display()))?;
        Self::from_reader(file, byte_size)
            .with_context(|| format!("failed to parse {}", path.display()))
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_count(&self) -> usize {
        self.headers.len()
    }

    pub fn byte_size(&self) -> u64 {
        self.byte_size
    }

    pub fn rows(&self) -> &[StringRecord] {
        &self.rows
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|header| header == name)
    }

    /// Resolves every requested column, reporting all absent ones at once.
    pub fn require_columns(
        &self,
        table: &str,
        names: &[&str],
    ) -> Result<Vec<usize>, AnalysisError> {
        let mut indices = Vec::with_capacity(names.len());
        let mut missing = Vec::new();

        for name in names {
            match self.column_index(name) {
                Some(index) => indices.push(index),
                None => missing.push(name.to_string()),
            }
        }

        if missing.is_empty() {
            Ok(indices)
        } else {
            Err(AnalysisError::MissingColumns {
                table: table.to_string(),
                columns: missing,
            })
        }
    }
}

pub fn field(record: &StringRecord, index: usize) -> &str {
    record.get(index).unwrap_or("").trim()
}

/// Lenient timestamp parsing: anything unrecognised is treated as missing.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    TIMESTAMP_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}

pub fn parse_coordinate(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|value| value.is_finite())
}

/// Loaded datasets keyed by file name.
#[derive(Debug, Default)]
pub struct TableStore {
    tables: BTreeMap<String, Table>,
}

impl TableStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load_dir(dir: &Path) -> anyhow::Result<Self> {
        let entries = std::fs::read_dir(dir)
            .with_context(|| format!("failed to read dataset directory {}", dir.display()))?;

        let mut paths = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "csv") {
                paths.push(path);
            }
        }
        paths.sort();

        let mut store = Self::new();
        for path in paths {
            let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
                continue;
            };
            let table = Table::from_path(&path)?;
            debug!(file = name, rows = table.len(), "loaded table");
            store.insert(name, table);
        }

        info!(
            dir = %dir.display(),
            tables = store.len(),
            "dataset loaded"
        );
        Ok(store)
    }

    pub fn insert(&mut self, name: impl Into<String>, table: Table) {
        self.tables.insert(name.into(), table);
    }

    pub fn get(&self, name: &str) -> Option<&Table> {
        self.tables.get(name)
    }

    pub fn dataset(&self, dataset: Dataset) -> Option<&Table> {
        self.get(dataset.file_name())
    }

    pub fn require(&self, dataset: Dataset) -> Result<&Table, AnalysisError> {
        self.dataset(dataset)
            .ok_or_else(|| AnalysisError::MissingTable(dataset.file_name().to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Table)> {
        self.tables.iter().map(|(name, table)| (name.as_str(), table))
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn orders(&self) -> Result<Vec<OrderRecord>, AnalysisError> {
        let table = self.require(Dataset::Orders)?;
        let columns = table.require_columns(
            Dataset::Orders.file_name(),
            &[
                ORDER_ID,
                ORDER_STATUS,
                ORDER_PURCHASED,
                ORDER_DELIVERED,
                ORDER_ESTIMATED,
            ],
        )?;
        let (id, status, purchased, delivered, estimated) =
            (columns[0], columns[1], columns[2], columns[3], columns[4]);

        Ok(table
            .rows()
            .iter()
            .map(|row| OrderRecord {
                order_id: field(row, id).to_string(),
                status: OrderStatus::parse(field(row, status)),
                purchased_at: parse_timestamp(field(row, purchased)),
                delivered_at: parse_timestamp(field(row, delivered)),
                estimated_at: parse_timestamp(field(row, estimated)),
            })
            .collect())
    }

    pub fn order_statuses(&self) -> Result<Vec<OrderStatus>, AnalysisError> {
        let table = self.require(Dataset::Orders)?;
        let columns = table.require_columns(Dataset::Orders.file_name(), &[ORDER_STATUS])?;

        Ok(table
            .rows()
            .iter()
            .map(|row| OrderStatus::parse(field(row, columns[0])))
            .collect())
    }
}

/// Load-once cache over a dataset directory.
#[derive(Debug)]
pub struct DatasetCache {
    dir: PathBuf,
    store: Option<TableStore>,
}

impl DatasetCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            store: None,
        }
    }

    pub fn get_or_load(&mut self) -> anyhow::Result<&TableStore> {
        let store = match self.store.take() {
            Some(store) => store,
            None => TableStore::load_dir(&self.dir)?,
        };
        let store: &TableStore = self.store.insert(store);
        Ok(store)
    }

    pub fn is_loaded(&self) -> bool {
        self.store.is_some()
    }

    /// Drops the loaded store so the next `get_or_load` rereads the directory.
    /// Library API for long-lived callers; the CLI loads once per process.
    pub fn clear(&mut self) {
        if self.store.take().is_some() {
            info!(dir = %self.dir.display(), "dataset cache cleared");
        }
    }
}

#[cfg(test)]
pub(crate) fn table_from_str(csv: &str) -> Table {
    Table::from_reader(csv.as_bytes(), csv.len() as u64).unwrap()
}
