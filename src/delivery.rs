use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use tracing::{debug, info};

use crate::error::AnalysisError;
use crate::models::{
    CategoryBreakdown, CategoryCount, DeliveryCategory, DeliveryMetricsResult, DeliveryRecord,
    DeliveryStats, DistributionSummary, MonthlyTrend, OrderRecord, OrderStatus, RateCount,
    YearMonth,
};

const MILLIS_PER_DAY: f64 = 86_400_000.0;

/// Runs the full delivery analysis over an orders table.
///
/// Only delivered orders with a recorded delivery timestamp take part; every
/// other row is dropped before any statistic is computed.
pub fn compute_metrics(
    orders: &[OrderRecord],
    sample_rows: usize,
) -> Result<DeliveryMetricsResult, AnalysisError> {
    let records = delivered_records(orders);
    if records.is_empty() {
        return Err(AnalysisError::NoDeliveredOrders);
    }

    debug!(
        orders = orders.len(),
        delivered = records.len(),
        "filtered delivered orders"
    );

    let result = DeliveryMetricsResult {
        stats: summarize(&records),
        breakdown: categorize(&records),
        monthly: monthly_trend(&records),
        sample: records.iter().take(sample_rows).cloned().collect(),
    };

    info!(
        delivered = result.stats.delivered_orders,
        months = result.monthly.len(),
        "delivery metrics computed"
    );
    Ok(result)
}

pub fn delivered_records(orders: &[OrderRecord]) -> Vec<DeliveryRecord> {
    orders
        .iter()
        .filter(|order| order.status == OrderStatus::Delivered)
        .filter_map(|order| {
            let delivered_at = order.delivered_at?;
            let real_days = order
                .purchased_at
                .map(|purchased| days_between(purchased, delivered_at));
            let estimated_days = order
                .purchased_at
                .zip(order.estimated_at)
                .map(|(purchased, estimated)| days_between(purchased, estimated));
            let difference_days = real_days
                .zip(estimated_days)
                .map(|(real, estimated)| real - estimated);

            Some(DeliveryRecord {
                order_id: order.order_id.clone(),
                purchased_at: order.purchased_at,
                delivered_at,
                estimated_at: order.estimated_at,
                real_days,
                estimated_days,
                difference_days,
                category: difference_days.and_then(classify),
                purchase_month: order.purchased_at.as_ref().map(YearMonth::of),
            })
        })
        .collect()
}

/// Fractional days from `from` to `to`.
pub fn days_between(from: NaiveDateTime, to: NaiveDateTime) -> f64 {
    (to - from).num_milliseconds() as f64 / MILLIS_PER_DAY
}

/// Buckets a delivery difference. Intervals are closed on the right:
/// (-inf, -3], (-3, -1], (-1, 1], (1, 3], (3, inf).
pub fn classify(difference_days: f64) -> Option<DeliveryCategory> {
    if difference_days.is_nan() {
        return None;
    }

    let category = if difference_days <= -3.0 {
        DeliveryCategory::VeryEarly
    } else if difference_days <= -1.0 {
        DeliveryCategory::Early
    } else if difference_days <= 1.0 {
        DeliveryCategory::OnTime
    } else if difference_days <= 3.0 {
        DeliveryCategory::Late
    } else {
        DeliveryCategory::VeryLate
    };
    Some(category)
}

pub fn summarize(records: &[DeliveryRecord]) -> DeliveryStats {
    let real: Vec<f64> = records.iter().filter_map(|r| r.real_days).collect();
    let estimated: Vec<f64> = records.iter().filter_map(|r| r.estimated_days).collect();
    let differences: Vec<f64> = records.iter().filter_map(|r| r.difference_days).collect();

    let known = differences.len();
    let rate = |predicate: fn(f64) -> bool| {
        let count = differences.iter().filter(|d| predicate(**d)).count();
        RateCount {
            count,
            percentage: percentage(count, known),
        }
    };

    DeliveryStats {
        delivered_orders: records.len(),
        mean_real_days: mean(&real),
        mean_estimated_days: mean(&estimated),
        mean_difference_days: mean(&differences),
        on_schedule_pct: percentage(differences.iter().filter(|d| **d <= 0.0).count(), known),
        real_distribution: distribution(&real),
        estimated_distribution: distribution(&estimated),
        std_dev_real_days: sample_std_dev(&real),
        early: rate(|d| d < -1.0),
        late: rate(|d| d > 1.0),
        punctual: rate(|d| d.abs() <= 1.0),
    }
}

pub fn categorize(records: &[DeliveryRecord]) -> CategoryBreakdown {
    let mut counts = [0usize; 5];
    let mut uncategorized = 0usize;

    for record in records {
        match record.category {
            Some(category) => {
                let slot = DeliveryCategory::ALL
                    .iter()
                    .position(|c| *c == category)
                    .unwrap_or_default();
                counts[slot] += 1;
            }
            None => uncategorized += 1,
        }
    }

    let categorized = records.len() - uncategorized;
    let mut categories: Vec<CategoryCount> = DeliveryCategory::ALL
        .iter()
        .zip(counts)
        .map(|(category, count)| CategoryCount {
            category: *category,
            label: category.label(),
            count,
            percentage: percentage(count, categorized),
        })
        .collect();

    // Stable sort keeps bucket order among equal counts.
    categories.sort_by(|a, b| b.count.cmp(&a.count));

    CategoryBreakdown {
        categories,
        uncategorized,
    }
}

#[derive(Default)]
struct MeanAccumulator {
    sum: f64,
    count: usize,
}

impl MeanAccumulator {
    fn push(&mut self, value: Option<f64>) {
        if let Some(value) = value {
            self.sum += value;
            self.count += 1;
        }
    }

    fn mean(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }
}

#[derive(Default)]
struct MonthAccumulator {
    orders: usize,
    real: MeanAccumulator,
    estimated: MeanAccumulator,
    difference: MeanAccumulator,
}

pub fn monthly_trend(records: &[DeliveryRecord]) -> Vec<MonthlyTrend> {
    let mut months: BTreeMap<YearMonth, MonthAccumulator> = BTreeMap::new();

    for record in records {
        let Some(month) = record.purchase_month else {
            continue;
        };
        let entry = months.entry(month).or_default();
        entry.orders += 1;
        entry.real.push(record.real_days);
        entry.estimated.push(record.estimated_days);
        entry.difference.push(record.difference_days);
    }

    months
        .into_iter()
        .map(|(month, acc)| MonthlyTrend {
            month,
            orders: acc.orders,
            mean_real_days: acc.real.mean(),
            mean_estimated_days: acc.estimated.mean(),
            mean_difference_days: acc.difference.mean(),
        })
        .collect()
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Quantile of ascending `sorted` values, interpolating linearly between ranks.
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let rank = q * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    sorted[lower] + (sorted[upper] - sorted[lower]) * (rank - lower as f64)
}

pub fn distribution(values: &[f64]) -> Option<DistributionSummary> {
    let mean = mean(values)?;
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    Some(DistributionSummary {
        min: sorted[0],
        q1: quantile(&sorted, 0.25),
        median: quantile(&sorted, 0.5),
        mean,
        q3: quantile(&sorted, 0.75),
        max: sorted[sorted.len() - 1],
    })
}

/// Sample (n - 1) standard deviation; undefined below two values.
pub fn sample_std_dev(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }

    let mean = mean(values)?;
    let variance = values
        .iter()
        .map(|value| (value - mean).powi(2))
        .sum::<f64>()
        / (values.len() - 1) as f64;
    Some(variance.sqrt())
}

/// Share of `total` in percent; undefined over an empty denominator.
pub fn percentage(count: usize, total: usize) -> Option<f64> {
    (total > 0).then(|| count as f64 / total as f64 * 100.0)
}
