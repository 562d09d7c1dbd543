//! SMOTE: synthetic minority oversampling.
//!
//! Each synthetic sample lies on the segment between a randomly chosen
//! minority sample and one of its `k` nearest minority neighbours
//! (Euclidean distance in standardized feature space). Sampling stops when
//! both classes have the same count. Only ever applied to a training split.

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;

/// Oversampling parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Smote {
    pub k_neighbors: usize,
    pub seed: u64,
}

impl Default for Smote {
    fn default() -> Self {
        Self {
            k_neighbors: 5,
            seed: 42,
        }
    }
}

impl Smote {
    #[must_use]
    pub fn new(k_neighbors: usize, seed: u64) -> Self {
        Self { k_neighbors, seed }
    }

    /// Balance `rows`/`labels` by appending synthetic minority samples.
    ///
    /// Original rows keep their order and come first. When a class is
    /// absent, or classes are already balanced, the input is returned as is.
    /// With a single minority sample the synthetic rows are copies of it.
    #[must_use]
    pub fn fit_resample(&self, rows: &[Vec<f64>], labels: &[bool]) -> (Vec<Vec<f64>>, Vec<bool>) {
        debug_assert_eq!(rows.len(), labels.len());

        let positives = labels.iter().filter(|l| **l).count();
        let negatives = labels.len() - positives;
        let mut out_rows = rows.to_vec();
        let mut out_labels = labels.to_vec();

        if positives == 0 || negatives == 0 || positives == negatives {
            return (out_rows, out_labels);
        }

        let minority_label = positives < negatives;
        let minority: Vec<&[f64]> = rows
            .iter()
            .zip(labels)
            .filter(|(_, l)| **l == minority_label)
            .map(|(r, _)| r.as_slice())
            .collect();
        let needed = positives.max(negatives) - minority.len();
        let k = self.k_neighbors.min(minority.len() - 1);

        let neighbours: Vec<Vec<usize>> = (0..minority.len())
            .map(|i| nearest_neighbours(&minority, i, k))
            .collect();

        let mut rng = ChaCha20Rng::seed_from_u64(self.seed);
        out_rows.reserve(needed);
        out_labels.reserve(needed);
        for _ in 0..needed {
            let i = rng.gen_range(0..minority.len());
            let base = minority[i];
            let synthetic = if neighbours[i].is_empty() {
                base.to_vec()
            } else {
                let j = neighbours[i][rng.gen_range(0..neighbours[i].len())];
                let gap: f64 = rng.gen();
                base.iter()
                    .zip(minority[j])
                    .map(|(a, b)| a + gap * (b - a))
                    .collect()
            };
            out_rows.push(synthetic);
            out_labels.push(minority_label);
        }

        tracing::debug!(
            "SMOTE generated {} synthetic {} samples (k={})",
            needed,
            if minority_label { "positive" } else { "negative" },
            k
        );

        (out_rows, out_labels)
    }
}

fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// Indices of the `k` nearest samples to `i`, excluding `i`. Ties break by
/// index so the result is deterministic.
fn nearest_neighbours(samples: &[&[f64]], i: usize, k: usize) -> Vec<usize> {
    if k == 0 {
        return Vec::new();
    }
    let mut dists: Vec<(f64, usize)> = samples
        .iter()
        .enumerate()
        .filter(|(j, _)| *j != i)
        .map(|(j, s)| (squared_distance(samples[i], s), j))
        .collect();
    dists.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
    dists.into_iter().take(k).map(|(_, j)| j).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn imbalanced() -> (Vec<Vec<f64>>, Vec<bool>) {
        let mut rows = Vec::new();
        let mut labels = Vec::new();
        for i in 0..10 {
            rows.push(vec![i as f64, 0.0]);
            labels.push(false);
        }
        for i in 0..3 {
            rows.push(vec![100.0 + i as f64, 50.0]);
            labels.push(true);
        }
        (rows, labels)
    }

    #[test]
    fn test_balances_classes() {
        let (rows, labels) = imbalanced();
        let (out_rows, out_labels) = Smote::default().fit_resample(&rows, &labels);
        assert_eq!(out_rows.len(), 20);
        assert_eq!(out_labels.iter().filter(|l| **l).count(), 10);
        assert_eq!(&out_rows[..13], &rows[..]);
    }

    #[test]
    fn test_synthetic_samples_stay_within_minority_hull() {
        let (rows, labels) = imbalanced();
        let (out_rows, _) = Smote::default().fit_resample(&rows, &labels);
        for row in &out_rows[13..] {
            assert!((100.0..=102.0).contains(&row[0]), "{row:?}");
            assert_eq!(row[1], 50.0);
        }
    }

    #[test]
    fn test_is_deterministic_for_seed() {
        let (rows, labels) = imbalanced();
        let a = Smote::new(2, 7).fit_resample(&rows, &labels);
        let b = Smote::new(2, 7).fit_resample(&rows, &labels);
        assert_eq!(a, b);
    }

    #[test]
    fn test_single_minority_sample_is_copied() {
        let rows = vec![vec![0.0], vec![1.0], vec![2.0], vec![9.0]];
        let labels = vec![false, false, false, true];
        let (out_rows, out_labels) = Smote::default().fit_resample(&rows, &labels);
        assert_eq!(out_rows.len(), 6);
        assert!(out_rows[4..].iter().all(|r| r == &vec![9.0]));
        assert!(out_labels[4..].iter().all(|l| *l));
    }

    #[test]
    fn test_single_class_is_untouched() {
        let rows = vec![vec![0.0], vec![1.0]];
        let labels = vec![true, true];
        let (out_rows, _) = Smote::default().fit_resample(&rows, &labels);
        assert_eq!(out_rows, rows);
    }

    #[test]
    fn test_neighbours_break_ties_by_index() {
        let a = [0.0];
        let b = [1.0];
        let c = [-1.0];
        let samples: Vec<&[f64]> = vec![&a, &b, &c];
        assert_eq!(nearest_neighbours(&samples, 0, 2), vec![1, 2]);
        assert_eq!(nearest_neighbours(&samples, 0, 1), vec![1]);
    }
}
