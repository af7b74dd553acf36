use thiserror::Error;

/// Typed absence signals. Callers decide whether to show a warning or an
/// empty state; none of these abort the rest of an analysis run.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AnalysisError {
    /// A required dataset was not loaded
    #[error("dataset not available: {0}")]
    MissingTable(String),

    /// A dataset is present but lacks columns the analysis needs
    #[error("missing columns in {table}: {}", .columns.join(", "))]
    MissingColumns { table: String, columns: Vec<String> },

    /// No order passed the delivered filter
    #[error("no delivered orders available for delivery analysis")]
    NoDeliveredOrders,
}
