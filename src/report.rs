use std::fmt::Write;

use tracing::warn;

use crate::config::MapSettings;
use crate::delivery;
use crate::error::AnalysisError;
use crate::geo::{self, GeoCloud};
use crate::models::{
    DeliveryMetricsResult, EntityKind, OrderStatus, StatusCount, TableSummary,
};
use crate::sampling::{self, ComparativeMap};
use crate::store::{Dataset, TableStore};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

#[derive(Debug, Clone)]
pub struct DatasetOverview {
    pub customers: Option<usize>,
    pub orders: Option<usize>,
    pub products: Option<usize>,
    pub sellers: Option<usize>,
    pub files: Vec<TableSummary>,
}

pub fn dataset_overview(store: &TableStore) -> DatasetOverview {
    let rows = |dataset: Dataset| store.dataset(dataset).map(|table| table.len());

    DatasetOverview {
        customers: rows(Dataset::Customers),
        orders: rows(Dataset::Orders),
        products: rows(Dataset::Products),
        sellers: rows(Dataset::Sellers),
        files: store
            .iter()
            .map(|(name, table)| TableSummary {
                file_name: name.to_string(),
                rows: table.len(),
                columns: table.column_count(),
                size_mb: table.byte_size() as f64 / BYTES_PER_MB,
            })
            .collect(),
    }
}

pub fn summarize_by_status(statuses: &[OrderStatus]) -> Vec<StatusCount> {
    let mut map: std::collections::HashMap<&OrderStatus, usize> =
        std::collections::HashMap::new();

    for status in statuses {
        *map.entry(status).or_insert(0) += 1;
    }

    let mut counts: Vec<StatusCount> = map
        .into_iter()
        .map(|(status, count)| StatusCount {
            status: status.clone(),
            count,
        })
        .collect();

    counts.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| a.status.as_str().cmp(b.status.as_str()))
    });
    counts
}

/// Formats an integer with comma thousands separators.
pub fn thousands(value: usize) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

fn kpi(value: Option<usize>) -> String {
    value.map(thousands).unwrap_or_else(|| "N/A".to_string())
}

fn days(value: Option<f64>) -> String {
    match value {
        Some(value) => format!("{value:.1} days"),
        None => "n/a".to_string(),
    }
}

fn signed_days(value: Option<f64>) -> String {
    match value {
        Some(value) => format!("{value:+.1} days"),
        None => "n/a".to_string(),
    }
}

fn percent(value: Option<f64>) -> String {
    match value {
        Some(value) => format!("{value:.1}%"),
        None => "n/a".to_string(),
    }
}

fn unavailable(output: &mut String, section: &str, error: &AnalysisError) {
    warn!(section, error = %error, "section unavailable");
    let _ = writeln!(output, "> Unavailable: {error}");
}

pub fn render_overview(output: &mut String, overview: &DatasetOverview) {
    let _ = writeln!(output, "## Dataset Summary");
    let _ = writeln!(output, "- Customers: {}", kpi(overview.customers));
    let _ = writeln!(output, "- Orders: {}", kpi(overview.orders));
    let _ = writeln!(output, "- Products: {}", kpi(overview.products));
    let _ = writeln!(output, "- Sellers: {}", kpi(overview.sellers));
    let _ = writeln!(output);
    let _ = writeln!(output, "## Loaded Files");

    if overview.files.is_empty() {
        let _ = writeln!(output, "No CSV files found in the dataset directory.");
        return;
    }

    let _ = writeln!(output, "| File | Rows | Columns | Size |");
    let _ = writeln!(output, "|---|---:|---:|---:|");
    for file in &overview.files {
        let _ = writeln!(
            output,
            "| {} | {} | {} | {:.2} MB |",
            file.file_name,
            thousands(file.rows),
            file.columns,
            file.size_mb
        );
    }
}

pub fn render_statuses(output: &mut String, statuses: &Result<Vec<StatusCount>, AnalysisError>) {
    let _ = writeln!(output, "## Order Status");

    match statuses {
        Ok(counts) if counts.is_empty() => {
            let _ = writeln!(output, "No orders recorded.");
        }
        Ok(counts) => {
            for status in counts {
                let _ = writeln!(output, "- {}: {}", status.status, thousands(status.count));
            }
        }
        Err(error) => unavailable(output, "order status", error),
    }
}

pub fn render_cloud(output: &mut String, cloud: &Result<GeoCloud, AnalysisError>) {
    let _ = writeln!(output, "## Olist Community");

    match cloud {
        Ok(GeoCloud {
            center: Some(center),
            points,
        }) => {
            let _ = writeln!(
                output,
                "{} locations, centred at ({:.4}, {:.4}).",
                thousands(points.len()),
                center.lat,
                center.lng
            );
        }
        Ok(_) => {
            let _ = writeln!(output, "No valid geolocation data found.");
        }
        Err(error) => unavailable(output, "geolocation", error),
    }
}

pub fn render_delivery(
    output: &mut String,
    metrics: &Result<DeliveryMetricsResult, AnalysisError>,
) {
    let _ = writeln!(output, "## Delivery Time Analysis");

    let metrics = match metrics {
        Ok(metrics) => metrics,
        Err(AnalysisError::NoDeliveredOrders) => {
            let _ = writeln!(output, "No delivered orders found for delivery-time analysis.");
            return;
        }
        Err(error) => {
            unavailable(output, "delivery", error);
            return;
        }
    };

    let stats = &metrics.stats;
    let _ = writeln!(
        output,
        "Across {} delivered orders:",
        thousands(stats.delivered_orders)
    );
    let _ = writeln!(output, "- Average real time: {}", days(stats.mean_real_days));
    let _ = writeln!(
        output,
        "- Average estimated time: {}",
        days(stats.mean_estimated_days)
    );
    let _ = writeln!(
        output,
        "- Average difference: {}",
        signed_days(stats.mean_difference_days)
    );
    let _ = writeln!(
        output,
        "- Delivered on schedule: {}",
        percent(stats.on_schedule_pct)
    );

    let _ = writeln!(output);
    let _ = writeln!(output, "### Detailed Statistics");
    let _ = writeln!(output, "| Metric | Value | Percentage |");
    let _ = writeln!(output, "|---|---:|---:|");
    let real = stats.real_distribution;
    for (name, value) in [
        ("Minimum delivery time", real.map(|d| d.min)),
        ("Maximum delivery time", real.map(|d| d.max)),
        ("Median delivery time", real.map(|d| d.median)),
        ("Standard deviation", stats.std_dev_real_days),
    ] {
        let _ = writeln!(output, "| {} | {} | - |", name, days(value));
    }
    for (name, rate) in [
        ("Early (< -1 day)", stats.early),
        ("Late (> +1 day)", stats.late),
        ("Punctual (± 1 day)", stats.punctual),
    ] {
        let _ = writeln!(
            output,
            "| {} | {} | {} |",
            name,
            thousands(rate.count),
            percent(rate.percentage)
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "### Real vs Estimated");
    let _ = writeln!(output, "| | Min | Q1 | Median | Mean | Q3 | Max |");
    let _ = writeln!(output, "|---|---:|---:|---:|---:|---:|---:|");
    for (name, summary) in [
        ("Real", stats.real_distribution),
        ("Estimated", stats.estimated_distribution),
    ] {
        match summary {
            Some(d) => {
                let _ = writeln!(
                    output,
                    "| {} | {:.1} | {:.1} | {:.1} | {:.1} | {:.1} | {:.1} |",
                    name, d.min, d.q1, d.median, d.mean, d.q3, d.max
                );
            }
            None => {
                let _ = writeln!(output, "| {name} | n/a | n/a | n/a | n/a | n/a | n/a |");
            }
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "### Delivery Categories");
    for category in &metrics.breakdown.categories {
        let _ = writeln!(
            output,
            "- {}: {} ({})",
            category.label,
            thousands(category.count),
            percent(category.percentage)
        );
    }
    if metrics.breakdown.uncategorized > 0 {
        let _ = writeln!(
            output,
            "- Missing timestamps: {}",
            thousands(metrics.breakdown.uncategorized)
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "### Monthly Trend");
    let _ = writeln!(output, "| Month | Orders | Real | Estimated | Difference |");
    let _ = writeln!(output, "|---|---:|---:|---:|---:|");
    for month in &metrics.monthly {
        let _ = writeln!(
            output,
            "| {} | {} | {} | {} | {} |",
            month.month,
            thousands(month.orders),
            days(month.mean_real_days),
            days(month.mean_estimated_days),
            signed_days(month.mean_difference_days)
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "### Sample Orders");
    for record in &metrics.sample {
        let _ = writeln!(
            output,
            "- {}: real {}, estimated {}, difference {}",
            record.order_id,
            days(record.real_days),
            days(record.estimated_days),
            signed_days(record.difference_days)
        );
    }
}

pub fn render_map(output: &mut String, map: &Result<ComparativeMap, AnalysisError>) {
    let _ = writeln!(output, "## Sellers vs Customers");

    match map {
        Ok(map) => {
            let _ = writeln!(
                output,
                "- Sellers: {} sampled of {} located",
                thousands(map.sellers.len()),
                thousands(map.available_sellers)
            );
            let _ = writeln!(
                output,
                "- Customers: {} sampled of {} located",
                thousands(map.customers.len()),
                thousands(map.available_customers)
            );
            let _ = writeln!(output, "- Total points: {}", thousands(map.total()));
        }
        Err(error) => unavailable(output, "comparative map", error),
    }
}

pub fn comparative_map(
    store: &TableStore,
    settings: &MapSettings,
) -> Result<ComparativeMap, AnalysisError> {
    let sellers = geo::join_entities(store, EntityKind::Seller)?;
    let customers = geo::join_entities(store, EntityKind::Customer)?;
    Ok(sampling::comparative_map(&sellers, &customers, settings))
}

pub fn build_report(store: &TableStore, settings: &MapSettings, sample_rows: usize) -> String {
    let overview = dataset_overview(store);
    let cloud = store
        .require(Dataset::Geolocation)
        .and_then(geo::geolocation_cloud);
    let statuses = store
        .order_statuses()
        .map(|statuses| summarize_by_status(&statuses));
    let metrics = store
        .orders()
        .and_then(|orders| delivery::compute_metrics(&orders, sample_rows));
    let map = comparative_map(store, settings);

    let mut output = String::new();
    let _ = writeln!(output, "# Olist E-commerce Analysis");
    let _ = writeln!(output);
    render_overview(&mut output, &overview);
    let _ = writeln!(output);
    render_cloud(&mut output, &cloud);
    let _ = writeln!(output);
    render_statuses(&mut output, &statuses);
    let _ = writeln!(output);
    render_delivery(&mut output, &metrics);
    let _ = writeln!(output);
    render_map(&mut output, &map);

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OrderRecord;
    use crate::store::{parse_timestamp, table_from_str};
    use pretty_assertions::assert_eq;

    fn store_with_orders(orders_csv: &str) -> TableStore {
        let mut store = TableStore::new();
        store.insert(Dataset::Orders.file_name(), table_from_str(orders_csv));
        store
    }

    #[test]
    fn statuses_are_ranked_by_count() {
        let statuses: Vec<OrderStatus> = [
            "delivered",
            "shipped",
            "delivered",
            "canceled",
            "shipped",
            "delivered",
        ]
        .iter()
        .map(|s| OrderStatus::parse(s))
        .collect();

        let counts = summarize_by_status(&statuses);
        let ranked: Vec<(String, usize)> = counts
            .iter()
            .map(|c| (c.status.to_string(), c.count))
            .collect();
        assert_eq!(
            ranked,
            vec![
                ("delivered".to_string(), 3),
                ("shipped".to_string(), 2),
                ("canceled".to_string(), 1),
            ]
        );
    }

    #[test]
    fn thousands_groups_digits() {
        assert_eq!(thousands(0), "0");
        assert_eq!(thousands(999), "999");
        assert_eq!(thousands(1000), "1,000");
        assert_eq!(thousands(99441), "99,441");
        assert_eq!(thousands(1000163), "1,000,163");
    }

    #[test]
    fn overview_marks_absent_tables() {
        let store = store_with_orders("order_id,order_status\no1,delivered\no2,shipped\n");
        let overview = dataset_overview(&store);
        assert_eq!(overview.orders, Some(2));
        assert_eq!(overview.customers, None);
        assert_eq!(overview.files.len(), 1);
        assert_eq!(overview.files[0].columns, 2);

        let mut output = String::new();
        render_overview(&mut output, &overview);
        assert!(output.contains("- Customers: N/A"));
        assert!(output.contains("- Orders: 2"));
    }

    #[test]
    fn report_degrades_section_by_section() {
        let store = store_with_orders(
            "order_id,order_status,order_purchase_timestamp,\
             order_delivered_customer_date,order_estimated_delivery_date\n\
             o1,delivered,2021-01-01 00:00:00,2021-01-05 00:00:00,2021-01-10 00:00:00\n\
             o2,shipped,2021-01-02 00:00:00,,2021-01-12 00:00:00\n",
        );

        let report = build_report(&store, &MapSettings::default(), 10);
        assert!(report.starts_with("# Olist E-commerce Analysis"));
        assert!(report.contains("- delivered: 1"));
        assert!(report.contains("Across 1 delivered orders:"));
        assert!(report.contains("- Delivered on schedule: 100.0%"));
        assert!(report.contains("| 2021-01 | 1 | 4.0 days | 9.0 days | -5.0 days |"));
        assert!(report.contains("| Real | 4.0 | 4.0 | 4.0 | 4.0 | 4.0 | 4.0 |"));
        assert!(report.contains("| Estimated | 9.0 | 9.0 | 9.0 | 9.0 | 9.0 | 9.0 |"));
        assert!(report.contains(
            "> Unavailable: dataset not available: olist_geolocation_dataset.csv"
        ));
        assert!(report.contains("## Sellers vs Customers"));
    }

    #[test]
    fn no_delivered_orders_renders_empty_state() {
        let mut output = String::new();
        render_delivery(&mut output, &Err(AnalysisError::NoDeliveredOrders));
        assert!(output.contains("No delivered orders found"));
        assert!(!output.contains("Average real time"));
    }

    #[test]
    fn undefined_rates_render_as_not_available() {
        let orders = vec![OrderRecord {
            order_id: "o1".to_string(),
            status: OrderStatus::Delivered,
            purchased_at: None,
            delivered_at: parse_timestamp("2021-01-05"),
            estimated_at: parse_timestamp("2021-01-10"),
        }];

        let mut output = String::new();
        render_delivery(&mut output, &delivery::compute_metrics(&orders, 10));
        assert!(output.contains("- Delivered on schedule: n/a"));
        assert!(output.contains("| Early (< -1 day) | 0 | n/a |"));
        assert!(output.contains("| Punctual (± 1 day) | 0 | n/a |"));
        assert!(output.contains("- Very early (3+ days): 0 (n/a)"));
        assert!(output.contains("| Real | n/a | n/a | n/a | n/a | n/a | n/a |"));
        assert!(!output.contains("0.0%"));
    }
}
