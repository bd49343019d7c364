//! Subsampling of the raw table to bound the compute budget of a run.

use log::info;
use rand::seq::index;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::common::error::{DataError, NoShowResult};

use super::domain::RawTable;

/// Draws a fixed number of distinct rows uniformly at random.
#[derive(Clone, Debug)]
pub struct RecordSampler {
    sample_size: usize,
    seed: Option<u64>,
}

impl RecordSampler {
    /// `seed = None` draws from OS entropy, so repeated runs differ.
    pub fn new(sample_size: usize, seed: Option<u64>) -> Self {
        Self { sample_size, seed }
    }

    /// Return exactly `sample_size` rows of `source` without replacement.
    pub fn sample(&self, source: &RawTable) -> NoShowResult<RawTable> {
        let available = source.len();
        if available < self.sample_size {
            return Err(DataError::InsufficientData {
                requested: self.sample_size,
                available,
            }
            .into());
        }

        let mut rng = match self.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_rng(&mut rand::rng()),
        };
        let picked = index::sample(&mut rng, available, self.sample_size).into_vec();
        info!(
            "sampled {} of {} rows (seeded: {})",
            picked.len(),
            available,
            self.seed.is_some()
        );
        Ok(source.select(&picked))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use proptest::prelude::*;

    use super::*;
    use crate::common::error::NoShowError;
    use crate::data::domain::RawRecord;

    fn numbered(n: usize) -> RawTable {
        let rows = (0..n)
            .map(|i| RawRecord::new(vec![i.to_string()]))
            .collect();
        RawTable::new(vec!["id".to_string()], rows).unwrap()
    }

    fn ids(table: &RawTable) -> Vec<usize> {
        table
            .rows()
            .iter()
            .map(|r| r.get(0).unwrap().parse().unwrap())
            .collect()
    }

    #[test]
    fn too_few_rows_fail() {
        let err = RecordSampler::new(11, None).sample(&numbered(10)).unwrap_err();
        assert!(matches!(
            err,
            NoShowError::Data(DataError::InsufficientData {
                requested: 11,
                available: 10
            })
        ));
    }

    #[test]
    fn full_sample_is_a_permutation() {
        let sample = RecordSampler::new(10, Some(3)).sample(&numbered(10)).unwrap();
        let mut got = ids(&sample);
        got.sort_unstable();
        assert_eq!(got, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn seeded_sampling_is_reproducible() {
        let source = numbered(500);
        let a = RecordSampler::new(50, Some(42)).sample(&source).unwrap();
        let b = RecordSampler::new(50, Some(42)).sample(&source).unwrap();
        assert_eq!(ids(&a), ids(&b));
    }

    proptest! {
        #[test]
        fn sample_has_exact_size_and_no_duplicates(
            total in 1usize..300,
            frac in 0.0f64..=1.0,
            seed in proptest::option::of(any::<u64>()),
        ) {
            let n = ((total as f64) * frac) as usize;
            let source = numbered(total);
            let sample = RecordSampler::new(n, seed).sample(&source).unwrap();
            let got = ids(&sample);
            prop_assert_eq!(got.len(), n);
            let unique: HashSet<_> = got.iter().copied().collect();
            prop_assert_eq!(unique.len(), n);
            prop_assert!(got.iter().all(|&i| i < total));
        }
    }
}
