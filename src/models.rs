use std::fmt;

use chrono::{Datelike, NaiveDateTime};
use serde::{Serialize, Serializer};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OrderStatus {
    Created,
    Approved,
    Invoiced,
    Processing,
    Shipped,
    Delivered,
    Unavailable,
    Canceled,
    Other(String),
}

impl OrderStatus {
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "created" => Self::Created,
            "approved" => Self::Approved,
            "invoiced" => Self::Invoiced,
            "processing" => Self::Processing,
            "shipped" => Self::Shipped,
            "delivered" => Self::Delivered,
            "unavailable" => Self::Unavailable,
            "canceled" => Self::Canceled,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Created => "created",
            Self::Approved => "approved",
            Self::Invoiced => "invoiced",
            Self::Processing => "processing",
            Self::Shipped => "shipped",
            Self::Delivered => "delivered",
            Self::Unavailable => "unavailable",
            Self::Canceled => "canceled",
            Self::Other(value) => value,
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for OrderStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct OrderRecord {
    pub order_id: String,
    pub status: OrderStatus,
    pub purchased_at: Option<NaiveDateTime>,
    pub delivered_at: Option<NaiveDateTime>,
    pub estimated_at: Option<NaiveDateTime>,
}

/// Calendar month used to bucket purchases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct YearMonth {
    pub year: i32,
    pub month: u32,
}

impl YearMonth {
    pub fn of(timestamp: &NaiveDateTime) -> Self {
        Self {
            year: timestamp.year(),
            month: timestamp.month(),
        }
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl Serialize for YearMonth {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeliveryCategory {
    VeryEarly,
    Early,
    OnTime,
    Late,
    VeryLate,
}

impl DeliveryCategory {
    pub const ALL: [DeliveryCategory; 5] = [
        Self::VeryEarly,
        Self::Early,
        Self::OnTime,
        Self::Late,
        Self::VeryLate,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Self::VeryEarly => "Very early (3+ days)",
            Self::Early => "Early (1-3 days)",
            Self::OnTime => "On time (±1 day)",
            Self::Late => "Late (1-3 days)",
            Self::VeryLate => "Very late (3+ days)",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DeliveryRecord {
    pub order_id: String,
    pub purchased_at: Option<NaiveDateTime>,
    pub delivered_at: NaiveDateTime,
    pub estimated_at: Option<NaiveDateTime>,
    pub real_days: Option<f64>,
    pub estimated_days: Option<f64>,
    pub difference_days: Option<f64>,
    pub category: Option<DeliveryCategory>,
    pub purchase_month: Option<YearMonth>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RateCount {
    pub count: usize,
    /// `None` when no row has a known difference
    pub percentage: Option<f64>,
}

/// Five-number summary plus mean, as drawn by a box plot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DistributionSummary {
    pub min: f64,
    pub q1: f64,
    pub median: f64,
    pub mean: f64,
    pub q3: f64,
    pub max: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeliveryStats {
    pub delivered_orders: usize,
    pub mean_real_days: Option<f64>,
    pub mean_estimated_days: Option<f64>,
    pub mean_difference_days: Option<f64>,
    pub on_schedule_pct: Option<f64>,
    pub real_distribution: Option<DistributionSummary>,
    pub estimated_distribution: Option<DistributionSummary>,
    pub std_dev_real_days: Option<f64>,
    pub early: RateCount,
    pub late: RateCount,
    pub punctual: RateCount,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryCount {
    pub category: DeliveryCategory,
    pub label: &'static str,
    pub count: usize,
    pub percentage: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CategoryBreakdown {
    pub categories: Vec<CategoryCount>,
    pub uncategorized: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct MonthlyTrend {
    pub month: YearMonth,
    pub orders: usize,
    pub mean_real_days: Option<f64>,
    pub mean_estimated_days: Option<f64>,
    pub mean_difference_days: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeliveryMetricsResult {
    pub stats: DeliveryStats,
    pub breakdown: CategoryBreakdown,
    pub monthly: Vec<MonthlyTrend>,
    pub sample: Vec<DeliveryRecord>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Customer,
    Seller,
}

impl EntityKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Customer => "Customer",
            Self::Seller => "Seller",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeoEntity {
    pub entity_id: String,
    pub zip_prefix: String,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub city: String,
    pub state: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapPoint {
    pub entity_id: String,
    pub kind: EntityKind,
    pub lat: f64,
    pub lng: f64,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusCount {
    pub status: OrderStatus,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct TableSummary {
    pub file_name: String,
    pub rows: usize,
    pub columns: usize,
    pub size_mb: f64,
}
