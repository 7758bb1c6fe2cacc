//! Runtime settings for query execution.

/// Settings applied to every node by `setup_with_config`.
#[derive(Clone, Debug)]
pub struct QueryConfig {
    /// Rows a select must fetch before it can be reported as slow (default: 1000)
    pub slow_query_min_rows: usize,
    /// Fetched to yielded ratio above which a select is reported as slow (default: 100.0)
    pub slow_query_ratio: f64,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            slow_query_min_rows: 1000,
            slow_query_ratio: 100.0,
        }
    }
}
