//! Download rate estimates
//!
//! Times are in microseconds. `database` is the portion of `window` spent in
//! storage, so `normal()` measures how fast the peer itself delivers.

/// Rate of one reservation over its trailing window
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PerformanceEstimate {
    /// Too little history to be meaningful
    pub idle: bool,
    pub events: usize,
    pub database: u64,
    pub window: u64,
}

impl PerformanceEstimate {
    pub fn idle() -> Self {
        Self {
            idle: true,
            ..Self::default()
        }
    }

    /// Events per microsecond of network time (excludes storage cost)
    pub fn normal(&self) -> f64 {
        divide(self.events as f64, self.window as f64 - self.database as f64)
    }

    /// Events per microsecond of wall-clock time
    pub fn total(&self) -> f64 {
        divide(self.events as f64, self.window as f64)
    }

    /// Fraction of the window spent in storage
    pub fn ratio(&self) -> f64 {
        divide(self.database as f64, self.window as f64)
    }
}

/// Division where NaN or infinity becomes zero
pub fn divide(dividend: f64, divisor: f64) -> f64 {
    let quotient = dividend / divisor;
    if quotient.is_nan() || quotient.is_infinite() {
        0.0
    } else {
        quotient
    }
}

/// Statistics over the normal rates of all active reservations
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RateStatistics {
    pub active_count: usize,
    pub arithmetic_mean: f64,
    pub standard_deviation: f64,
}

impl RateStatistics {
    /// Mean and population standard deviation of `rates`
    pub fn from_rates(rates: &[f64]) -> Self {
        let count = rates.len() as f64;
        let mean = divide(rates.iter().sum(), count);
        let variance = divide(
            rates.iter().map(|rate| (rate - mean).powi(2)).sum(),
            count,
        );
        Self {
            active_count: rates.len(),
            arithmetic_mean: mean,
            standard_deviation: variance.sqrt(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_divide_by_zero_is_zero() {
        assert_eq!(divide(1.0, 0.0), 0.0);
        assert_eq!(divide(0.0, 0.0), 0.0);
        assert_eq!(divide(6.0, 3.0), 2.0);
    }

    #[test]
    fn test_estimate_rates() {
        let estimate = PerformanceEstimate {
            idle: false,
            events: 10,
            database: 500_000,
            window: 1_000_000,
        };
        assert!((estimate.normal() - 10.0 / 500_000.0).abs() < 1e-15);
        assert!((estimate.total() - 10.0 / 1_000_000.0).abs() < 1e-15);
        assert!((estimate.ratio() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_degenerate_window_is_zero() {
        let estimate = PerformanceEstimate {
            idle: false,
            events: 3,
            database: 100,
            window: 100,
        };
        assert_eq!(estimate.normal(), 0.0);
        assert_eq!(PerformanceEstimate::idle().total(), 0.0);
        assert_eq!(PerformanceEstimate::idle().ratio(), 0.0);
    }

    #[test]
    fn test_statistics() {
        let statistics = RateStatistics::from_rates(&[5.0, 2.0, 1.0, 4.0]);
        assert_eq!(statistics.active_count, 4);
        assert!((statistics.arithmetic_mean - 3.0).abs() < 1e-12);
        assert!((statistics.standard_deviation - 2.5f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_statistics_empty() {
        assert_eq!(RateStatistics::from_rates(&[]), RateStatistics::default());
    }
}
