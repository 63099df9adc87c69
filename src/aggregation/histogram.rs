//! histogram.rs
//! Integer-aligned equal-width buckets for histogram display.

use crate::aggregation::stats::SampleStats;
use serde::{Deserialize, Serialize};

pub const MAX_BUCKETS: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramBucket {
    pub min: f64,
    pub max: f64,
    pub count: usize,
}

impl HistogramBucket {
    fn new(min: f64, max: f64) -> Self {
        Self { min, max, count: 0 }
    }
}

/// Buckets spanning `[floor(min), ceil(max)]`, at most `MAX_BUCKETS` of them.
///
/// A sample is counted in the first bucket with `min <= v < max`; the top
/// bucket also takes `v == ceil(max)`. All-equal samples land in one bucket
/// padded by one on each side.
pub fn generate_histogram(values: &[f64]) -> Vec<HistogramBucket> {
    let Some(stats) = SampleStats::new(values) else {
        return Vec::new();
    };
    let low = stats.min().floor();
    let high = stats.max().ceil();
    if low == high {
        let mut bucket = HistogramBucket::new(low - 1.0, high + 1.0);
        bucket.count = values.len();
        return vec![bucket];
    }

    let spread = (stats.max() - stats.min()).ceil();
    let count = (MAX_BUCKETS as f64).min(spread).max(1.0);
    let width = ((high - low) / count).ceil();

    let mut buckets = Vec::with_capacity(MAX_BUCKETS + 1);
    let mut bucket_min = low;
    let mut bucket_max = low;
    while bucket_max < high {
        bucket_max += width;
        buckets.push(HistogramBucket::new(bucket_min, bucket_max));
        bucket_min = bucket_max;
    }
    for &v in values {
        if let Some(bucket) = buckets
            .iter_mut()
            .find(|b| v >= b.min && (v < b.max || (v == b.max && v == high)))
        {
            bucket.count += 1;
        }
    }
    buckets
}
