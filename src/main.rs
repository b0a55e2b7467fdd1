use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use forest_spi::{
    analysis::{compare, FitOptions},
    io,
    models::HeightFunction,
    pipeline::run_unit,
    validation::{self, parse_number, RULED_DATASETS},
    visualization::{print_comparison, print_failure_cases},
    Dataset,
};

#[derive(Parser)]
#[command(
    name = "forest-spi",
    about = "Statistical forest inventory - calculation pipeline and height models",
    version,
    author
)]
struct Cli {
    /// Verbose diagnostics and detail lines in the run protocol
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the configured steps of a forest management unit
    Run {
        /// Unit code; reads <UNIT>.toml and <UNIT>_run.toml
        #[arg(short, long)]
        unit: String,

        /// Directory with the configuration files
        #[arg(short, long, default_value = "config")]
        config_dir: PathBuf,
    },

    /// Validate one input file against the rules of its dataset
    Validate {
        /// Dataset name (localities, plots, trees, navigation, model_heights, model_heights_prev)
        #[arg(short, long)]
        dataset: String,

        /// Path to input file (CSV or Excel)
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Fit the height-model candidates to a diameter/height sample
    Fit {
        /// Path to input file (CSV or Excel)
        #[arg(short, long)]
        input: PathBuf,

        #[arg(long, default_value = "dbh")]
        dbh_column: String,

        #[arg(long, default_value = "height")]
        height_column: String,

        /// Fit only this function: michajlov, korf, naslund or petersen
        #[arg(short, long)]
        function: Option<HeightFunction>,
    },
}

fn init_tracing(debug: bool) {
    let default = if debug { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Number in a raw or typed cell, with decimal comma accepted.
fn cell_number(dataset: &Dataset, row: usize, column: &str) -> Option<f64> {
    let value = dataset.get(row, column)?;
    value.as_f64().or_else(|| value.as_str().and_then(parse_number))
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    match cli.command {
        Commands::Run { unit, config_dir } => {
            let summary = run_unit(&config_dir, &unit, cli.debug)?;
            match &summary.stopped_at {
                None => println!("\n{} unit {unit} processed", "Success:".green().bold()),
                Some(step) => println!(
                    "\n{} processing of unit {unit} terminated at step '{step}'",
                    "Error:".red().bold()
                ),
            }
            Ok(ExitCode::from(summary.exit_code() as u8))
        }

        Commands::Validate { dataset, input } => {
            let name = dataset.to_lowercase();
            let Some(rules) = validation::rule_set(&name) else {
                anyhow::bail!(
                    "Dataset '{dataset}' has no rules. Use one of: {}",
                    RULED_DATASETS.join(", ")
                );
            };
            let mut data = io::read_dataset(&input, &name)?;
            let coercion = validation::coerce(&mut data, &rules);
            for issue in &coercion.issues {
                tracing::debug!(column = %issue.column, row = issue.row, value = %issue.value, "not {}", issue.expected);
            }
            let report = validation::validate(&data, &rules);
            print_failure_cases(&report);
            Ok(if report.passed() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }

        Commands::Fit {
            input,
            dbh_column,
            height_column,
            function,
        } => {
            let data = io::read_dataset(&input, "sample")?;
            for column in [&dbh_column, &height_column] {
                if !data.has_column(&column.to_lowercase()) {
                    anyhow::bail!("Column '{column}' not found in {}", input.display());
                }
            }
            let (dbh, height) = (dbh_column.to_lowercase(), height_column.to_lowercase());
            let (diameters, heights): (Vec<f64>, Vec<f64>) = (0..data.len())
                .filter_map(|row| {
                    match (cell_number(&data, row, &dbh), cell_number(&data, row, &height)) {
                        (Some(d), Some(h)) if d > 0.0 && h > 0.0 => Some((d, h)),
                        _ => None,
                    }
                })
                .unzip();
            println!(
                "  Loaded {} rows, {} complete diameter/height pairs",
                data.len(),
                diameters.len()
            );

            let candidates: Vec<HeightFunction> = match function {
                Some(f) => vec![f],
                None => HeightFunction::ALL.to_vec(),
            };
            let comparison = compare(&candidates, &diameters, &heights, &FitOptions::default());
            print_comparison(&format!("Height models: {}", input.display()), &comparison);

            match comparison.best() {
                Some(best) => {
                    println!(
                        "{} {} (a = {:.5}, b = {:.5}, R² = {:.4})",
                        "Chosen model:".green().bold(),
                        best.function.display_name(),
                        best.a,
                        best.b,
                        best.r2
                    );
                    Ok(ExitCode::SUCCESS)
                }
                None => {
                    eprintln!("{}: no usable height model", "Error".red());
                    Ok(ExitCode::FAILURE)
                }
            }
        }
    }
}
