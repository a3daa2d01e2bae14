//! End-to-end flow: CSV in, trained ensemble to disk and back, augmented
//! CSV out. Mirrors the fit -> persist -> predict sequence the binary runs.

use approx::assert_abs_diff_eq;
use lapse::types::PenaltyConfig;
use lapse::{data, ensemble, predict, store};
use std::io::Write;
use tempfile::Builder;

const TRAINING_CSV: &str = "\
duration,event,baseline,monthly
0.8,1,1.0,20.0
1.4,1,1.0,5.0
2.1,0,1.0,12.5
2.9,1,1.0,8.0
3.3,1,1.0,15.0
4.0,0,1.0,2.5
4.7,1,1.0,11.0
6.2,1,1.0,4.0
";

#[test]
fn fit_persist_predict_round_trip() {
    let mut training = Builder::new().suffix(".csv").tempfile().expect("tempfile");
    training
        .write_all(TRAINING_CSV.as_bytes())
        .expect("write training csv");
    training.flush().expect("flush");

    let table = data::load_table(training.path().to_str().unwrap()).expect("load");
    assert_eq!(table.n_rows(), 8);
    assert_eq!(table.event_count(), 6);

    let trained = ensemble::build_ensemble(&table, 6, &PenaltyConfig::default(), Some(1234))
        .expect("build");

    // Persist and reload; the reloaded ensemble must be indistinguishable.
    let stored = Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("tempfile");
    let store_path = stored.path().to_str().unwrap();
    store::save_ensemble(&trained, store_path).expect("save ensemble");
    let reloaded = store::load_ensemble(store_path).expect("load ensemble");
    assert_eq!(reloaded, trained);

    // Score the still-active rows, as the production flow does.
    let active = table.censored_only();
    assert_eq!(active.n_rows(), 2);
    let fresh = predict::predict_lifetimes(&reloaded, &active).expect("predict");
    let original = predict::predict_lifetimes(&trained, &active).expect("predict");
    assert_eq!(fresh, original);

    // Export and re-read the augmented table.
    let out = Builder::new().suffix(".csv").tempfile().expect("tempfile");
    let out_path = out.path().to_str().unwrap();
    data::save_predictions(&fresh, out_path).expect("save predictions");
    let exported = data::load_table(out_path).expect("load exported");
    assert_eq!(exported.n_rows(), 2);
    // The summary columns ride along as plain numeric columns.
    assert!(
        exported
            .covariate_names()
            .iter()
            .any(|name| name == "mean_lifetime")
    );
    assert!(
        exported
            .covariate_names()
            .iter()
            .any(|name| name == "median_lifetime")
    );
}

#[test]
fn predictions_are_finite_and_bounded_by_the_observation_window() {
    let mut training = Builder::new().suffix(".csv").tempfile().expect("tempfile");
    training
        .write_all(TRAINING_CSV.as_bytes())
        .expect("write training csv");
    training.flush().expect("flush");

    let table = data::load_table(training.path().to_str().unwrap()).expect("load");
    let trained = ensemble::build_ensemble(&table, 8, &PenaltyConfig::default(), Some(7))
        .expect("build");
    let predicted = predict::predict_lifetimes(&trained, &table).expect("predict");

    let longest = table
        .durations()
        .iter()
        .copied()
        .fold(f64::NEG_INFINITY, f64::max);
    for row in 0..table.n_rows() {
        let mean = predicted.mean[row];
        let median = predicted.median[row];
        assert!(mean.is_finite() && median.is_finite());
        // Survival is a probability: the area under it over [0, t_max] can
        // never exceed the longest observed duration.
        assert!(mean > 0.0 && mean <= longest + 1e-9);
        assert!(median > 0.0 && median <= longest + 1e-9);
    }
    assert_abs_diff_eq!(predicted.table.durations()[0], 0.8);
}
