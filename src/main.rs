use std::path::PathBuf;

use clap::{Parser, Subcommand};
use eeio_tools::config::{AnalysisSettings, DEFAULT_PROJECT_PATHS, ProjectPaths};
use eeio_tools::io::{excel_read, excel_write};
use eeio_tools::pipeline::{self, AnalysisReport};
use eeio_tools::{Result, ToolError};
use tracing_subscriber::EnvFilter;

fn main() {
    let cli = Cli::parse();
    if let Err(error) = init_logging().and_then(|_| run(cli)) {
        eprintln!("error: {error}");
        std::process::exit(1);
    }
}

fn init_logging() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|error| ToolError::Logging(error.to_string()))
}

fn run(cli: Cli) -> Result<()> {
    match cli.command.unwrap_or(Command::Run(RunArgs::default())) {
        Command::Run(args) => execute_run(args),
        Command::Template(args) => execute_template(args),
    }
}

fn execute_run(args: RunArgs) -> Result<()> {
    let paths = ProjectPaths::load(&args.config)?;
    let mut settings = match &args.settings {
        Some(path) => AnalysisSettings::load(path)?,
        None => AnalysisSettings::default(),
    };
    if let Some(output_dir) = args.output_dir {
        settings.output_dir = output_dir;
    }

    let report = pipeline::run(&paths, &settings)?;
    print_report(&report);
    Ok(())
}

fn execute_template(args: TemplateArgs) -> Result<()> {
    let paths = ProjectPaths::load(&args.config)?;
    let settings = match &args.settings {
        Some(path) => AnalysisSettings::load(path)?,
        None => AnalysisSettings::default(),
    };
    let database = excel_read::read_database(paths.dataset(&settings.database)?, &settings.extensions)?;
    excel_write::write_aggregation_template(&args.output, database.classification())
}

fn print_report(report: &AnalysisReport) {
    println!("{}", report.commodity);
    println!();
    println!("GHG emissions by region");
    for (region, value) in &report.emissions.by_region {
        println!("  {region:<24} {value:>18.2}");
    }
    println!("Global GHG emissions: {:.2}", report.emissions.total_reported);
    println!("Saved GHG emissions: {:.2} {}", -report.saved.value(), report.saved.unit());
    println!(
        "Emission factor {}: {:.4} ({:.4})",
        report.spot_check.label, report.spot_check.converted, report.spot_check.intensity
    );
    for chart in &report.charts {
        println!("Chart written to {}", chart.display());
    }
}

#[derive(Parser)]
#[command(
    author,
    version,
    about = "GHG impact of policy shocks on a multi-regional input-output database."
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the full scenario analysis and write the charts.
    Run(RunArgs),
    /// Write an aggregation template listing every label of the database.
    Template(TemplateArgs),
}

#[derive(clap::Args)]
struct RunArgs {
    /// Project paths JSON file.
    #[arg(long, default_value = DEFAULT_PROJECT_PATHS)]
    config: PathBuf,

    /// Optional analysis settings JSON file.
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Directory the HTML charts are written to.
    #[arg(long)]
    output_dir: Option<PathBuf>,
}

impl Default for RunArgs {
    fn default() -> Self {
        Self {
            config: PathBuf::from(DEFAULT_PROJECT_PATHS),
            settings: None,
            output_dir: None,
        }
    }
}

#[derive(clap::Args)]
struct TemplateArgs {
    /// Project paths JSON file.
    #[arg(long, default_value = DEFAULT_PROJECT_PATHS)]
    config: PathBuf,

    /// Optional analysis settings JSON file.
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Template workbook to write.
    #[arg(long)]
    output: PathBuf,
}
