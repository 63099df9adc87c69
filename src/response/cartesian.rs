//! cartesian.rs
//! Bounded cartesian combination of independent distributions.
//!
//! The cross product is enumerated depth-first. Only the `CART_MAX_ENTRIES`
//! most frequent tuples are retained: once the retained set overflows, it is
//! truncated and its smallest frequency becomes the floor every later tuple
//! must reach. Subtrees whose best possible frequency is already below the
//! floor are skipped without being enumerated.

use crate::response::ops::round_half_up;
use crate::response::types::{ResponseValue, ResponseValueEntry, NORM_FREQ};
use std::collections::HashMap;

pub const CART_MAX_ENTRIES: usize = 1000;

/// How the outcomes of one tuple are folded into result entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reducer {
    /// Outcomes are summed (serial composition).
    Add,
    /// The largest outcome wins (parallel composition).
    Max,
    /// Every outcome is kept as its own entry (mixture).
    Combine,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProductGroup {
    pub combined_freq: f64,
    pub entries: Vec<ResponseValueEntry>,
}

struct Enumerator<'a> {
    values: &'a [ResponseValue],
    max_freqs: Vec<f64>,
    prune: bool,
    min_freq: f64,
    retained: Vec<ProductGroup>,
    stack: Vec<ResponseValueEntry>,
}

impl<'a> Enumerator<'a> {
    fn new(values: &'a [ResponseValue], prune: bool) -> Self {
        let max_freqs = values
            .iter()
            .map(|v| v.iter().map(|e| e.freq).fold(f64::NEG_INFINITY, f64::max))
            .collect();
        // Bounding is only sound while products grow monotonically
        let monotone = values.iter().flatten().all(|e| e.freq >= 0.0 && e.freq.is_finite());
        Self {
            values,
            max_freqs,
            prune: prune && monotone,
            min_freq: 1.0,
            retained: Vec::new(),
            stack: Vec::with_capacity(values.len()),
        }
    }

    /// Best frequency any completion of `partial` from level `from` can reach.
    /// Multiplied in the same order as the leaf product so rounding agrees.
    fn upper_bound(&self, from: usize, partial: f64) -> f64 {
        self.max_freqs[from..].iter().fold(partial, |acc, m| acc * m)
    }

    fn descend(&mut self, depth: usize, partial: f64) {
        let level: &'a [ResponseValueEntry] = &self.values[depth];
        let last = depth + 1 == self.values.len();
        for entry in level {
            let freq = partial * entry.freq;
            self.stack.push(*entry);
            if last {
                self.retain(freq);
            } else if !self.prune || self.upper_bound(depth + 1, freq) >= self.min_freq {
                self.descend(depth + 1, freq);
            }
            self.stack.pop();
        }
    }

    fn retain(&mut self, combined_freq: f64) {
        if combined_freq < self.min_freq {
            return;
        }
        self.retained.push(ProductGroup { combined_freq, entries: self.stack.clone() });
        if self.retained.len() > CART_MAX_ENTRIES {
            sort_desc_by(&mut self.retained, |g| g.combined_freq);
            self.retained.truncate(CART_MAX_ENTRIES);
            if let Some(floor) = self.retained.last() {
                self.min_freq = floor.combined_freq;
            }
        }
    }
}

/// Stable descending sort on a float key.
fn sort_desc_by<T>(items: &mut [T], key: impl Fn(&T) -> f64) {
    items.sort_by(|a, b| key(b).total_cmp(&key(a)));
}

/// Enumerates the highest-frequency tuples of the cross product.
pub fn cartesian_product(values: &[ResponseValue]) -> Vec<ProductGroup> {
    enumerate(values, true)
}

fn enumerate(values: &[ResponseValue], prune: bool) -> Vec<ProductGroup> {
    if values.is_empty() {
        return Vec::new();
    }
    let mut e = Enumerator::new(values, prune);
    e.descend(0, 1.0);
    e.retained
}

fn reduce(group: &ProductGroup, reducer: Reducer) -> Vec<ResponseValueEntry> {
    let freq_correct = || NORM_FREQ.powi(group.entries.len() as i32 - 1);
    match reducer {
        Reducer::Add => vec![ResponseValueEntry::new(
            group.entries.iter().map(|e| e.value).sum(),
            round_half_up(group.combined_freq / freq_correct()),
        )],
        Reducer::Max => {
            let mut value = 0.0;
            for e in &group.entries {
                if e.value > value {
                    value = e.value;
                }
            }
            vec![ResponseValueEntry::new(value, round_half_up(group.combined_freq / freq_correct()))]
        }
        Reducer::Combine => group.entries.clone(),
    }
}

fn outcome_key(value: f64) -> u64 {
    // 0.0 and -0.0 are the same outcome
    if value == 0.0 { 0 } else { value.to_bits() }
}

/// Combines distributions through `reducer` into one normalized distribution
/// of at most `CART_MAX_ENTRIES` entries, most frequent first.
pub fn aggregate_response_values(values: &[ResponseValue], reducer: Reducer) -> ResponseValue {
    reduce_groups(&cartesian_product(values), reducer)
}

fn reduce_groups(groups: &[ProductGroup], reducer: Reducer) -> ResponseValue {
    let mut freq_sum = 0.0;
    let mut merged: Vec<ResponseValueEntry> = Vec::new();
    let mut index: HashMap<u64, usize> = HashMap::new();
    for group in groups {
        for entry in reduce(group, reducer) {
            freq_sum += entry.freq;
            match index.get(&outcome_key(entry.value)) {
                Some(&i) => merged[i].freq += entry.freq,
                None => {
                    index.insert(outcome_key(entry.value), merged.len());
                    merged.push(entry);
                }
            }
        }
    }

    let mut result: ResponseValue = merged
        .into_iter()
        .map(|e| ResponseValueEntry::new(e.value, round_half_up(e.freq / freq_sum * NORM_FREQ)))
        .filter(|e| e.freq > 0.0)
        .collect();
    sort_desc_by(&mut result, |e| e.freq);
    result.truncate(CART_MAX_ENTRIES);
    result
}

pub fn add_response_values(values: &[ResponseValue]) -> ResponseValue {
    aggregate_response_values(values, Reducer::Add)
}

pub fn max_response_values(values: &[ResponseValue]) -> ResponseValue {
    aggregate_response_values(values, Reducer::Max)
}

pub fn combine_response_values(values: &[ResponseValue]) -> ResponseValue {
    aggregate_response_values(values, Reducer::Combine)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::types::dist;

    fn wide(offset: f64, n: usize) -> ResponseValue {
        (0..n).map(|i| ResponseValueEntry::new(offset + i as f64, (i + 1) as f64)).collect()
    }

    #[test]
    fn test_add_two_binary_distributions() {
        let a = dist(&[(10.0, 500.0), (5.0, 500.0)]);
        let b = dist(&[(1.0, 500.0), (2.0, 500.0)]);
        let res = add_response_values(&[a, b]);
        assert_eq!(res, dist(&[(11.0, 250.0), (12.0, 250.0), (6.0, 250.0), (7.0, 250.0)]));
    }

    #[test]
    fn test_max_starts_from_zero() {
        let a = dist(&[(10.0, 500.0), (5.0, 500.0)]);
        let b = dist(&[(7.0, 1000.0)]);
        assert_eq!(max_response_values(&[a, b]), dist(&[(10.0, 500.0), (7.0, 500.0)]));
        let negative = dist(&[(-3.0, 1000.0)]);
        assert_eq!(max_response_values(&[negative]), dist(&[(0.0, 1000.0)]));
    }

    #[test]
    fn test_combine_mixes_outcomes() {
        let a = dist(&[(10.0, 1000.0)]);
        let b = dist(&[(20.0, 1000.0)]);
        assert_eq!(combine_response_values(&[a, b]), dist(&[(10.0, 500.0), (20.0, 500.0)]));
    }

    #[test]
    fn test_single_distribution_is_normalized() {
        let a = dist(&[(1.0, 1.0), (2.0, 3.0)]);
        assert_eq!(add_response_values(&[a]), dist(&[(2.0, 750.0), (1.0, 250.0)]));
    }

    #[test]
    fn test_empty_inputs() {
        assert!(add_response_values(&[]).is_empty());
        assert!(add_response_values(&[dist(&[(1.0, 1000.0)]), Vec::new()]).is_empty());
    }

    #[test]
    fn test_enumeration_is_capped() {
        let values = vec![wide(0.0, 12), wide(100.0, 12), wide(1000.0, 12)];
        let groups = cartesian_product(&values);
        assert_eq!(groups.len(), CART_MAX_ENTRIES);
        let floor = groups.iter().map(|g| g.combined_freq).fold(f64::INFINITY, f64::min);
        // The single most frequent tuple always survives
        assert!(groups.iter().any(|g| g.combined_freq == 12.0 * 12.0 * 12.0));
        assert!(floor >= 1.0);

        let res = add_response_values(&values);
        assert!(res.len() <= CART_MAX_ENTRIES);
        assert!(res.windows(2).all(|w| w[0].freq >= w[1].freq));
    }

    #[test]
    fn test_pruning_matches_exhaustive_enumeration() {
        let values = vec![wide(0.0, 11), wide(50.0, 10), wide(500.0, 12)];
        assert_eq!(enumerate(&values, true), enumerate(&values, false));
    }
}
