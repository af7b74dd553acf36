pub const DATA_DIR_ENV: &str = "OLIST_DATA_DIR";
pub const LOG_ENV: &str = "OLIST_LOG";

/// Rows of computed delivery records shown alongside the statistics.
pub const DEFAULT_SAMPLE_ROWS: usize = 10;

/// Latitude/longitude the comparative map is centred on (Brazil).
pub const MAP_CENTER: (f64, f64) = (-15.0, -55.0);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapSettings {
    pub sellers: usize,
    pub customers: usize,
    pub max_points: usize,
    pub seed: u64,
}

impl Default for MapSettings {
    fn default() -> Self {
        Self {
            sellers: 500,
            customers: 500,
            max_points: 2000,
            seed: 42,
        }
    }
}

impl MapSettings {
    /// Caps a requested point count to the configured maximum and to what is available.
    pub fn resolve(&self, requested: usize, available: usize) -> usize {
        requested.min(self.max_points).min(available)
    }
}
