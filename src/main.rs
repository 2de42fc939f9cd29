/*

gamd-reweight: free-energy surfaces from GaMD simulations.

Reads one or more AMBER GaMD logs (optionally joined with CV files written by a
trajectory analysis tool, one per log), reweights the histogram over one or two
CVs with the 2nd order cumulant expansion and writes the surface as CSV.

*/

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Parser};
use log::{error, info, LevelFilter};
use thiserror::Error;

use gamd_reweight::constants::{AMBER_BOOST_COLUMNS, AMBER_STEP_COLUMN};
use gamd_reweight::{
    read_cv_table, read_gamd_log, reweight, ColumnSelection, ReweightConfig, ReweightError,
    ReweightResult, Trajectory,
};

#[derive(Parser)]
#[command(
    name = "gamd-reweight",
    about = "Reweight GaMD simulations with the 2nd order cumulant expansion",
    version
)]
struct Cli {
    /// Reweighting configuration (JSON)
    #[arg(short, long, value_name = "FILE")]
    config: PathBuf,

    /// GaMD log file, repeatable; logs are concatenated in the order given
    #[arg(short, long = "log", value_name = "FILE", required = true, action = ArgAction::Append)]
    logs: Vec<PathBuf>,

    /// CV file matching each log frame by frame, repeatable (one per log)
    #[arg(long = "cv", value_name = "FILE", action = ArgAction::Append)]
    cv_files: Vec<PathBuf>,

    /// Column names of the CV files (defaults to the --cv-name values)
    #[arg(long = "cv-file-column", value_name = "NAME", action = ArgAction::Append)]
    cv_file_columns: Vec<String>,

    /// Collective variable to bin on, given once or twice
    #[arg(long = "cv-name", value_name = "NAME", required = true, action = ArgAction::Append)]
    cv_names: Vec<String>,

    /// Columns summed into the total boost potential (defaults to the AMBER dual boost)
    #[arg(long = "boost-column", value_name = "NAME", action = ArgAction::Append)]
    boost_columns: Vec<String>,

    /// Output CSV file (stdout if omitted)
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// More log output, repeatable
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Reweight(#[from] ReweightError),

    #[error("failed to write output: {0}")]
    Output(#[from] csv::Error),

    #[error("{0}")]
    Usage(String),
}

fn load_trajectory(cli: &Cli) -> Result<Trajectory, CliError> {
    if !cli.cv_files.is_empty() && cli.cv_files.len() != cli.logs.len() {
        return Err(CliError::Usage(format!(
            "{} CV files given for {} logs",
            cli.cv_files.len(),
            cli.logs.len()
        )));
    }
    let cv_file_columns: Vec<&str> = if cli.cv_file_columns.is_empty() {
        cli.cv_names.iter().map(String::as_str).collect()
    } else {
        cli.cv_file_columns.iter().map(String::as_str).collect()
    };
    let boost: Vec<String> = if cli.boost_columns.is_empty() {
        AMBER_BOOST_COLUMNS.iter().map(|name| name.to_string()).collect()
    } else {
        cli.boost_columns.clone()
    };

    let mut parts = Vec::with_capacity(cli.logs.len());
    for (index, log_path) in cli.logs.iter().enumerate() {
        let mut table = read_gamd_log(log_path)?;
        if let Some(cv_path) = cli.cv_files.get(index) {
            table = table.join(read_cv_table(cv_path, &cv_file_columns)?)?;
        }
        let mut columns = ColumnSelection::new(boost.iter().cloned(), cli.cv_names.iter().cloned());
        if table.names().iter().any(|name| name == AMBER_STEP_COLUMN) {
            columns = columns.with_time(AMBER_STEP_COLUMN);
        }
        parts.push(Trajectory::from_table(&table, &columns)?);
    }
    Ok(Trajectory::concat(parts)?)
}

fn format_value(value: f64) -> String {
    if value.is_finite() {
        format!("{value:.6}")
    } else {
        "inf".to_string()
    }
}

fn write_surface<W: io::Write>(
    mut writer: csv::Writer<W>,
    result: &ReweightResult,
    cv_names: &[String],
) -> Result<(), csv::Error> {
    let mut header: Vec<String> = cv_names.to_vec();
    header.extend(
        ["count", "mean_dv", "var_dv", "ln_c2", "probability", "free_energy"]
            .map(String::from),
    );
    writer.write_record(&header)?;

    for (cell, report) in result.surface.cells().zip(&result.bins) {
        let mut record = vec![format!("{:.6}", cell.center.0)];
        if let Some(center) = cell.center.1 {
            record.push(format!("{center:.6}"));
        }
        match report {
            Some(report) => record.extend([
                report.statistics.count.to_string(),
                format_value(report.statistics.mean),
                format_value(report.statistics.variance),
                format_value(report.ln_c2),
            ]),
            None => record.extend(["0", "nan", "nan", "nan"].map(String::from)),
        }
        record.push(format!("{:.9e}", cell.probability));
        record.push(cell.free_energy.map_or_else(|| "inf".to_string(), format_value));
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

fn run(cli: &Cli) -> Result<(), CliError> {
    let config = ReweightConfig::from_json_file(&cli.config)?;
    let trajectory = load_trajectory(cli)?;
    info!(
        "loaded {} frames from {} log(s)",
        trajectory.len(),
        cli.logs.len()
    );

    let result = reweight(&trajectory, &config)?;
    match &cli.output {
        Some(path) => {
            write_surface(csv::Writer::from_path(path)?, &result, trajectory.cv_names())?;
            info!("wrote free-energy surface to {}", path.display());
        }
        None => write_surface(
            csv::Writer::from_writer(io::stdout()),
            &result,
            trajectory.cv_names(),
        )?,
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let level = match cli.verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
