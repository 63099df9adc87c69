//! stats.rs
//! Descriptive statistics over the samples of one (scenario, date).

/// Samples sorted once, answering mean, extrema and quantiles.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleStats {
    sorted: Vec<f64>,
    sum: f64,
}

impl SampleStats {
    /// `None` for an empty sample.
    pub fn new(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let mut sorted = values.to_vec();
        sorted.sort_by(f64::total_cmp);
        let sum = sorted.iter().sum();
        Some(Self { sorted, sum })
    }

    pub fn len(&self) -> usize {
        self.sorted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sorted.is_empty()
    }

    pub fn mean(&self) -> f64 {
        self.sum / self.sorted.len() as f64
    }

    pub fn min(&self) -> f64 {
        self.sorted[0]
    }

    pub fn max(&self) -> f64 {
        self.sorted[self.sorted.len() - 1]
    }

    /// Quantile `p` in `[0, 1]`, linearly interpolated between closest ranks.
    pub fn quantile(&self, p: f64) -> f64 {
        let h = (self.sorted.len() - 1) as f64 * p.clamp(0.0, 1.0);
        let lo = h.floor() as usize;
        let hi = h.ceil() as usize;
        self.sorted[lo] + (h - lo as f64) * (self.sorted[hi] - self.sorted[lo])
    }
}
