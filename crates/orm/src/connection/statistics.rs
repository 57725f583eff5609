//! Connection Pool Statistics

/// Snapshot of a pool's occupancy and acquisition counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStats {
    /// Open connections, idle plus in use
    pub total: usize,
    pub idle: usize,
    pub in_use: usize,
    pub max_connections: usize,
    /// Successful acquisitions since the pool was created
    pub acquire_count: u64,
    /// Failed acquisitions (timeout, exhaustion, closed pool, connect error)
    pub acquire_errors: u64,
}

impl PoolStats {
    /// Calculate the error rate as a percentage of all acquisition attempts
    pub fn error_rate(&self) -> f64 {
        let attempts = self.acquire_count + self.acquire_errors;
        if attempts > 0 {
            (self.acquire_errors as f64 / attempts as f64) * 100.0
        } else {
            0.0
        }
    }

    /// Get pool utilization as a percentage (in use / max)
    pub fn utilization(&self) -> f64 {
        if self.max_connections > 0 {
            (self.in_use as f64 / self.max_connections as f64) * 100.0
        } else {
            0.0
        }
    }

    /// Check if the pool is under stress (high utilization)
    pub fn is_under_stress(&self, threshold: f64) -> bool {
        self.utilization() > threshold
    }
}
