//! Bootstrap resampling of observation tables.

use crate::types::ObservationTable;
use rand::Rng;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResampleError {
    #[error("cannot draw a bootstrap sample from an empty table")]
    EmptyTable,
}

/// Draw N rows independently and uniformly with replacement from a table of
/// N rows. Duplicates are expected; roughly 1/e of the original rows will be
/// absent from any one sample. Deterministic given a seeded `Rng`.
pub fn bootstrap_sample<R: Rng>(
    table: &ObservationTable,
    rng: &mut R,
) -> Result<ObservationTable, ResampleError> {
    let n = table.n_rows();
    if n == 0 {
        return Err(ResampleError::EmptyTable);
    }
    let indices: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
    Ok(table.select_rows(&indices))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array1, Array2, arr1, arr2};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn table_of(n: usize) -> ObservationTable {
        let covariates =
            Array2::from_shape_fn((n, 1), |(row, _)| row as f64);
        ObservationTable::new(
            vec!["index".to_string()],
            covariates,
            Array1::from_elem(n, 1.0),
            Array1::from_elem(n, true),
        )
        .expect("valid table")
    }

    #[test]
    fn empty_table_is_rejected() {
        let empty = ObservationTable::new(
            vec!["x".to_string()],
            Array2::zeros((0, 1)),
            Array1::zeros(0),
            Array1::from_vec(vec![]),
        )
        .expect("valid empty table");
        let mut rng = StdRng::seed_from_u64(7);
        assert_eq!(
            bootstrap_sample(&empty, &mut rng).unwrap_err(),
            ResampleError::EmptyTable
        );
    }

    #[test]
    fn sample_preserves_row_count_and_schema() {
        let table = table_of(40);
        let mut rng = StdRng::seed_from_u64(11);
        let sample = bootstrap_sample(&table, &mut rng).expect("sample");
        assert_eq!(sample.n_rows(), 40);
        assert_eq!(sample.covariate_names(), table.covariate_names());
    }

    #[test]
    fn same_seed_same_sample() {
        let table = table_of(25);
        let mut first = StdRng::seed_from_u64(99);
        let mut second = StdRng::seed_from_u64(99);
        let a = bootstrap_sample(&table, &mut first).expect("sample");
        let b = bootstrap_sample(&table, &mut second).expect("sample");
        assert_eq!(a, b);
    }

    #[test]
    fn sampling_is_with_replacement() {
        let table = ObservationTable::new(
            vec!["x".to_string()],
            arr2(&[[0.0], [1.0], [2.0], [3.0]]),
            arr1(&[1.0, 2.0, 3.0, 4.0]),
            arr1(&[true, true, true, true]),
        )
        .expect("valid table");
        // Some seed will duplicate a row in a sample of 4; scan a few.
        let duplicated = (0..20u64).any(|seed| {
            let mut rng = StdRng::seed_from_u64(seed);
            let sample = bootstrap_sample(&table, &mut rng).expect("sample");
            let mut values: Vec<f64> =
                sample.covariates().column(0).iter().copied().collect();
            values.sort_by(f64::total_cmp);
            values.windows(2).any(|pair| pair[0] == pair[1])
        });
        assert!(duplicated);
    }
}
