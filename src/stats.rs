/// Append-only sample buffer, drained into one statistics row per setting.
#[derive(Debug, Clone, Default)]
pub struct SampleSeries {
    samples: Vec<f64>,
}

/// Snapshot of a non-empty series.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeriesStats {
    pub mean: f64,
    pub std_dev: f64,
    pub count: usize,
}

impl SampleSeries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, sample: f64) {
        self.samples.push(sample);
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn mean(&self) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }
        Some(self.samples.iter().sum::<f64>() / self.samples.len() as f64)
    }

    /// Population variance, divisor equal to the sample count.
    pub fn variance(&self) -> Option<f64> {
        let mean = self.mean()?;
        let squared_deviations = self
            .samples
            .iter()
            .map(|sample| (sample - mean).powi(2))
            .sum::<f64>();
        Some(squared_deviations / self.samples.len() as f64)
    }

    pub fn std_dev(&self) -> Option<f64> {
        self.variance().map(f64::sqrt)
    }

    pub fn stats(&self) -> Option<SeriesStats> {
        Some(SeriesStats {
            mean: self.mean()?,
            std_dev: self.std_dev()?,
            count: self.samples.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_population_statistics() {
        let mut series = SampleSeries::new();
        for sample in [10.0, 12.0, 14.0] {
            series.push(sample);
        }

        assert_eq!(series.mean(), Some(12.0));
        assert!((series.variance().unwrap() - 8.0 / 3.0).abs() < 1e-12);
        assert!((series.std_dev().unwrap() - 1.632_993_161_855_452).abs() < 1e-9);
    }

    #[test]
    fn test_single_sample_has_zero_spread() {
        let mut series = SampleSeries::new();
        series.push(-7.5);

        let stats = series.stats().unwrap();
        assert_eq!(stats.mean, -7.5);
        assert_eq!(stats.std_dev, 0.0);
        assert_eq!(stats.count, 1);
    }

    #[test]
    fn test_empty_series_has_no_stats() {
        let series = SampleSeries::new();
        assert!(series.mean().is_none());
        assert!(series.variance().is_none());
        assert!(series.stats().is_none());
    }

    #[test]
    fn test_clear_resets_the_series() {
        let mut series = SampleSeries::new();
        series.push(1.0);
        series.push(2.0);
        assert_eq!(series.len(), 2);

        series.clear();
        assert!(series.is_empty());
        assert!(series.stats().is_none());
    }
}
