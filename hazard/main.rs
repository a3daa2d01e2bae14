use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use lapse::types::PenaltyConfig;
use lapse::{aggregate, data, ensemble, predict, store};
use std::process;

#[derive(Parser)]
#[command(
    name = "lapse",
    about = "Bootstrap additive-hazard regression for right-censored retention data",
    long_about = "Fits time-varying additive hazard models to right-censored duration data, \
                 quantifies uncertainty with bootstrap ensembles, and exports lifetime \
                 predictions and cumulative-hazard curves."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fit a bootstrap ensemble of additive hazard models
    #[command(about = "Fit a bootstrap ensemble (outputs: ensemble.toml)")]
    Fit {
        /// Path to a CSV/TSV file with duration, event, and covariate columns
        data: String,

        /// Number of bootstrap models to fit
        #[arg(long, default_value = "100", value_name = "M")]
        bootstrap: usize,

        /// L2 penalty on per-step coefficient magnitudes
        #[arg(long, default_value = "0.1")]
        coefficient_penalty: f64,

        /// L2 penalty on the change between adjacent per-step coefficients
        #[arg(long, default_value = "0.1")]
        smoothing_penalty: f64,

        /// Keep raw cumulative hazards instead of clamping negatives to zero
        #[arg(long)]
        allow_negative: bool,

        /// Seed for a reproducible ensemble build
        #[arg(long)]
        seed: Option<u64>,

        /// Where to write the trained ensemble
        #[arg(long, default_value = "ensemble.toml")]
        output: String,
    },

    /// Predict expected lifetimes with a trained ensemble
    #[command(about = "Predict mean/median lifetimes per row (outputs: predictions.csv)")]
    Predict {
        /// Path to a CSV/TSV file with the same covariate schema as training
        data: String,

        /// Path to a trained ensemble file (.toml)
        #[arg(long)]
        ensemble: String,

        /// Score only the still-active (censored) rows
        #[arg(long)]
        censored_only: bool,

        /// Where to write the augmented table
        #[arg(long, default_value = "predictions.csv")]
        output: String,
    },

    /// Export per-model cumulative hazard functions
    #[command(about = "Export cumulative hazards in long format (outputs: hazards.csv)")]
    Hazards {
        /// Path to a trained ensemble file (.toml)
        #[arg(long)]
        ensemble: String,

        /// Evaluation table: when given, export per-individual hazards
        /// instead of per-covariate ones
        #[arg(long, value_name = "DATA")]
        individual: Option<String>,

        /// Where to write the long-format CSV
        #[arg(long, default_value = "hazards.csv")]
        output: String,
    },
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Fit {
            data,
            bootstrap,
            coefficient_penalty,
            smoothing_penalty,
            allow_negative,
            seed,
            output,
        } => fit_command(
            &data,
            bootstrap,
            coefficient_penalty,
            smoothing_penalty,
            allow_negative,
            seed,
            &output,
        ),
        Commands::Predict {
            data,
            ensemble,
            censored_only,
            output,
        } => predict_command(&data, &ensemble, censored_only, &output),
        Commands::Hazards {
            ensemble,
            individual,
            output,
        } => hazards_command(&ensemble, individual.as_deref(), &output),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn fit_command(
    data_path: &str,
    bootstrap: usize,
    coefficient_penalty: f64,
    smoothing_penalty: f64,
    allow_negative: bool,
    seed: Option<u64>,
    output: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("Loading observations from: {}", data_path);
    let table = data::load_table(data_path)?;
    println!(
        "Loaded {} rows ({} events, {} censored) with covariates: {}",
        table.n_rows(),
        table.event_count(),
        table.n_rows() - table.event_count(),
        table.covariate_names().join(", ")
    );

    let penalties = PenaltyConfig {
        coefficient: coefficient_penalty,
        smoothing: smoothing_penalty,
        non_negative_cumulative: !allow_negative,
    };

    let pb = ProgressBar::new(bootstrap as u64);
    let style = ProgressStyle::with_template("  bootstrap [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
        .expect("Internal Error: Invalid progress bar template string.");
    pb.set_style(style.progress_chars("█▉▊▋▌▍▎▏ "));
    let trained = ensemble::build_ensemble_with_progress(
        &table,
        bootstrap,
        &penalties,
        seed,
        |done| pb.set_position(done as u64),
    )?;
    pb.finish_and_clear();

    store::save_ensemble(&trained, output)?;
    println!("Wrote ensemble of {} models to {}", trained.len(), output);
    Ok(())
}

fn predict_command(
    data_path: &str,
    ensemble_path: &str,
    censored_only: bool,
    output: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("Loading observations from: {}", data_path);
    let mut table = data::load_table(data_path)?;
    if censored_only {
        table = table.censored_only();
        println!("Scoring the {} still-active rows", table.n_rows());
    }

    println!("Loading ensemble from: {}", ensemble_path);
    let trained = store::load_ensemble(ensemble_path)?;

    let predictions = predict::predict_lifetimes(&trained, &table)?;
    data::save_predictions(&predictions, output)?;
    println!("Wrote predictions for {} rows to {}", table.n_rows(), output);
    Ok(())
}

/// Long format keeps each model's own time grid intact; aligning grids for
/// variance bands is the plotting side's decision.
fn hazards_command(
    ensemble_path: &str,
    individual: Option<&str>,
    output: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("Loading ensemble from: {}", ensemble_path);
    let trained = store::load_ensemble(ensemble_path)?;

    let mut writer = csv::Writer::from_path(output)?;
    writer.write_record(["model", "series", "time", "cumulative_hazard"])?;

    match individual {
        None => {
            let per_model = aggregate::population_hazards(&trained)?;
            for (model_idx, covariates) in per_model.iter().enumerate() {
                for (name, function) in covariates {
                    write_series(&mut writer, model_idx, name, function)?;
                }
            }
        }
        Some(data_path) => {
            println!("Loading observations from: {}", data_path);
            let table = data::load_table(data_path)?;
            let per_model = aggregate::individual_hazards(&trained, &table)?;
            for (model_idx, rows) in per_model.iter().enumerate() {
                for (row, function) in rows.iter().enumerate() {
                    write_series(&mut writer, model_idx, &format!("row_{}", row), function)?;
                }
            }
        }
    }

    writer.flush()?;
    println!("Wrote hazard curves for {} models to {}", trained.len(), output);
    Ok(())
}

fn write_series(
    writer: &mut csv::Writer<std::fs::File>,
    model_idx: usize,
    series: &str,
    function: &lapse::types::StepFunction,
) -> Result<(), csv::Error> {
    for (&time, &value) in function.times().iter().zip(function.values()) {
        writer.write_record([
            model_idx.to_string(),
            series.to_string(),
            time.to_string(),
            value.to_string(),
        ])?;
    }
    Ok(())
}
