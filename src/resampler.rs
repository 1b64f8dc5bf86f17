//! Synthetic minority oversampling (SMOTE)
//!
//! Balances a labelled dataset before fitting by interpolating new minority
//! samples between an existing minority sample and one of its nearest
//! minority neighbours.

use crate::error::{PredictionError, Result};
use crate::types::transaction::{FeatureVector, LabeledDataset, LabeledSample};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

/// Default neighbour count
pub const DEFAULT_K_NEIGHBORS: usize = 5;

/// Oversamples the minority class until both classes have equal counts
#[derive(Debug, Clone)]
pub struct SmoteResampler {
    k_neighbors: usize,
    seed: u64,
}

impl SmoteResampler {
    /// Create a resampler; `k_neighbors` is clamped to at least 1
    pub fn new(k_neighbors: usize, seed: u64) -> Self {
        Self {
            k_neighbors: k_neighbors.max(1),
            seed,
        }
    }

    pub fn k_neighbors(&self) -> usize {
        self.k_neighbors
    }

    /// Minimum minority size the algorithm can work with
    pub fn required_minority(&self) -> usize {
        self.k_neighbors + 1
    }

    /// Produce a balanced copy of `dataset`.
    ///
    /// Original samples keep their order at the front; synthetic minority
    /// samples follow.
    pub fn resample(&self, dataset: &LabeledDataset) -> Result<LabeledDataset> {
        dataset.validate()?;

        if dataset.is_empty() {
            return Err(PredictionError::InsufficientData {
                available: 0,
                required: self.required_minority(),
            });
        }
        if dataset.is_balanced() {
            return Ok(dataset.clone());
        }

        let minority_label = dataset.minority_label();
        let minority = dataset.features_for(minority_label);
        let majority_count = dataset.count(minority_label.opposite());

        if minority.len() < self.required_minority() {
            return Err(PredictionError::InsufficientData {
                available: minority.len(),
                required: self.required_minority(),
            });
        }

        let neighbours = self.nearest_neighbours(&minority);
        let needed = majority_count - minority.len();
        let mut rng = StdRng::seed_from_u64(self.seed);

        let mut samples: Vec<LabeledSample> = Vec::with_capacity(dataset.len() + needed);
        samples.extend_from_slice(dataset.samples());

        for _ in 0..needed {
            let base = rng.gen_range(0..minority.len());
            let neighbour = neighbours[base][rng.gen_range(0..self.k_neighbors)];
            let gap: f64 = rng.gen();
            samples.push(LabeledSample {
                features: interpolate(&minority[base], &minority[neighbour], gap),
                label: minority_label,
            });
        }

        debug!(
            minority = %minority_label,
            original = minority.len(),
            synthesized = needed,
            k = self.k_neighbors,
            "SMOTE resampling complete"
        );

        Ok(LabeledDataset::from_samples(samples))
    }

    /// Indices of the `k` nearest other points for every point (ties broken by index)
    fn nearest_neighbours(&self, points: &[FeatureVector]) -> Vec<Vec<usize>> {
        points
            .iter()
            .enumerate()
            .map(|(i, p)| {
                let mut by_distance: Vec<(f64, usize)> = points
                    .iter()
                    .enumerate()
                    .filter(|(j, _)| *j != i)
                    .map(|(j, q)| (p.distance(q), j))
                    .collect();
                by_distance.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
                by_distance
                    .into_iter()
                    .take(self.k_neighbors)
                    .map(|(_, j)| j)
                    .collect()
            })
            .collect()
    }
}

impl Default for SmoteResampler {
    fn default() -> Self {
        Self::new(DEFAULT_K_NEIGHBORS, 42)
    }
}

fn interpolate(from: &FeatureVector, to: &FeatureVector, gap: f64) -> FeatureVector {
    FeatureVector::new(
        from.amount + gap * (to.amount - from.amount),
        from.time_gap_seconds + gap * (to.time_gap_seconds - from.time_gap_seconds),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::transaction::Label;

    fn imbalanced(legit: usize, fraud: usize) -> LabeledDataset {
        let mut ds = LabeledDataset::new();
        for i in 0..legit {
            ds.push(FeatureVector::new(10.0 + i as f64, 5000.0 + i as f64), Label::Legitimate);
        }
        for i in 0..fraud {
            ds.push(FeatureVector::new(900.0 + i as f64 * 3.0, 20.0 + i as f64), Label::Fraud);
        }
        ds
    }

    #[test]
    fn test_classes_balanced_after_resampling() {
        let ds = imbalanced(40, 8);
        let balanced = SmoteResampler::new(5, 7).resample(&ds).unwrap();

        assert_eq!(balanced.class_counts(), [40, 40]);
        assert_eq!(&balanced.samples()[..ds.len()], ds.samples());
    }

    #[test]
    fn test_synthetic_points_stay_inside_minority_hull() {
        let ds = imbalanced(30, 6);
        let balanced = SmoteResampler::new(5, 1).resample(&ds).unwrap();

        for sample in &balanced.samples()[ds.len()..] {
            assert_eq!(sample.label, Label::Fraud);
            assert!(sample.features.amount >= 900.0 && sample.features.amount <= 915.0);
            assert!(sample.features.time_gap_seconds >= 20.0 && sample.features.time_gap_seconds <= 25.0);
        }
    }

    #[test]
    fn test_deterministic_for_seed() {
        let ds = imbalanced(50, 7);
        let a = SmoteResampler::new(5, 99).resample(&ds).unwrap();
        let b = SmoteResampler::new(5, 99).resample(&ds).unwrap();
        let c = SmoteResampler::new(5, 100).resample(&ds).unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_minority_can_be_legitimate() {
        let ds = imbalanced(6, 20);
        let balanced = SmoteResampler::default().resample(&ds).unwrap();
        assert_eq!(balanced.class_counts(), [20, 20]);
    }

    #[test]
    fn test_insufficient_minority() {
        let ds = imbalanced(30, 5);
        match SmoteResampler::new(5, 0).resample(&ds) {
            Err(PredictionError::InsufficientData { available, required }) => {
                assert_eq!(available, 5);
                assert_eq!(required, 6);
            }
            other => panic!("expected insufficient data, got {:?}", other),
        }

        assert!(matches!(
            SmoteResampler::default().resample(&LabeledDataset::new()),
            Err(PredictionError::InsufficientData { available: 0, .. })
        ));
    }

    #[test]
    fn test_balanced_input_unchanged() {
        let ds = imbalanced(3, 3);
        assert_eq!(SmoteResampler::default().resample(&ds).unwrap(), ds);
    }
}
