use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::{ColoredString, Colorize};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use launchgraph_analysis::{
    AnalysisReport, CountTag, CountingService, FunctionReport, BUILD_STAGE,
};
use launchgraph_core::{
    CancellationToken, ConfigManager, LaunchGraphConfig, LoggingConfig, Program, ProgressSink,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tabled::{settings::Style, Table, Tabled};
use tracing::info;
use tracing_subscriber::{filter::EnvFilter, layer::SubscriberExt, Registry};

#[derive(Parser)]
#[command(name = "launchgraph")]
#[command(about = "LaunchGraph - static coroutine launch counting", long_about = None)]
#[command(version)]
struct Cli {
    /// Output format (json, pretty, table)
    #[arg(short, long, global = true, default_value = "pretty")]
    output: OutputFormat,

    /// Configuration file (defaults to ./.launchgraph.toml, then ~/.launchgraph/config.toml)
    #[arg(short, long, global = true, env = "LAUNCHGRAPH_CONFIG")]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Json,
    Pretty,
    Table,
}

#[derive(Subcommand)]
enum Commands {
    /// Count launches in every function of the modules using coroutines
    Analyze {
        /// Program snapshot (JSON)
        program: PathBuf,

        /// Hide progress bars
        #[arg(long)]
        no_progress: bool,
    },

    /// Count launches in a single function
    Query {
        /// Program snapshot (JSON)
        program: PathBuf,

        /// Fully qualified function name
        qualified_name: String,
    },

    /// Show how many modules depend on the concurrency library
    Modules {
        /// Program snapshot (JSON)
        program: PathBuf,
    },

    /// Print an example configuration file
    Config,
}

#[derive(Serialize)]
struct ModulesResult {
    modules_in_scope: usize,
    total_modules: usize,
    candidate_functions: usize,
}

enum CommandOutput {
    Analysis(AnalysisReport),
    Functions(Vec<FunctionReport>),
    Modules(ModulesResult),
    Text(String),
}

#[derive(Tabled)]
struct FunctionRow {
    #[tabled(rename = "Function")]
    qualified_name: String,
    #[tabled(rename = "Launches")]
    badge: String,
    #[tabled(rename = "Kind")]
    tag: String,
    #[tabled(rename = "Location")]
    location: String,
}

impl From<&FunctionReport> for FunctionRow {
    fn from(report: &FunctionReport) -> Self {
        Self {
            qualified_name: report.qualified_name.clone(),
            badge: report.count.badge(),
            tag: report.count.tag.to_string(),
            location: report.location.to_string(),
        }
    }
}

/// One progress bar per analysis stage.
struct StageBars {
    bars: Vec<ProgressBar>,
}

impl StageBars {
    fn new(stages: usize) -> Self {
        let multi = MultiProgress::new();
        let style = ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}",
        )
        .map(|style| style.progress_chars("█▉▊▋▌▍▎▏ "))
        .unwrap_or_else(|_| ProgressStyle::default_bar());

        let bars = (0..stages)
            .map(|stage| {
                let bar = multi.add(ProgressBar::new(0));
                bar.set_style(style.clone());
                bar.set_message(if stage == BUILD_STAGE {
                    "Building expressions"
                } else {
                    "Evaluating counts"
                });
                bar
            })
            .collect();
        Self { bars }
    }
}

impl ProgressSink for StageBars {
    fn stage_started(&self, stage: usize, _stages: usize, total: usize) {
        if let Some(bar) = self.bars.get(stage) {
            bar.set_length(total as u64);
        }
    }

    fn advance(&self, stage: usize, completed: usize, _total: usize) {
        if let Some(bar) = self.bars.get(stage) {
            bar.set_position(completed as u64);
        }
    }

    fn stage_finished(&self, stage: usize, _stages: usize) {
        if let Some(bar) = self.bars.get(stage) {
            bar.finish();
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let manager = match &cli.config {
        Some(path) => ConfigManager::from_file(path),
        None => ConfigManager::load(),
    }
    .context("Failed to load configuration")?;
    let config = manager.into_config();

    init_tracing(&config.logging, cli.verbose);

    match execute_command(&cli, &config) {
        Ok(output) => print_output(cli.output, &output),
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            std::process::exit(1);
        }
    }
}

fn init_tracing(logging: &LoggingConfig, verbose: bool) {
    let level = if verbose { "debug" } else { logging.level.as_str() };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let registry = Registry::default().with(env_filter);

    match logging.format.as_str() {
        "json" => {
            let subscriber = registry.with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            );
            tracing::subscriber::set_global_default(subscriber).ok();
        }
        "compact" => {
            let subscriber = registry.with(
                tracing_subscriber::fmt::layer()
                    .compact()
                    .with_writer(std::io::stderr),
            );
            tracing::subscriber::set_global_default(subscriber).ok();
        }
        _ => {
            let subscriber = registry.with(
                tracing_subscriber::fmt::layer()
                    .pretty()
                    .with_writer(std::io::stderr),
            );
            tracing::subscriber::set_global_default(subscriber).ok();
        }
    }
}

fn load_service(path: &Path, config: &LaunchGraphConfig) -> Result<CountingService> {
    let program = Program::from_file(path)
        .with_context(|| format!("Failed to load program from {}", path.display()))?;
    info!("Loaded {} nodes from {}", program.node_count(), path.display());
    CountingService::new(Arc::new(program), config).context("Failed to start analysis")
}

fn execute_command(cli: &Cli, config: &LaunchGraphConfig) -> Result<CommandOutput> {
    match &cli.command {
        Commands::Analyze {
            program,
            no_progress,
        } => {
            let service = load_service(program, config)?;
            let token = CancellationToken::new();
            let report = if *no_progress || matches!(cli.output, OutputFormat::Json) {
                service.run_full_analysis(&token, &launchgraph_core::NoProgress)
            } else {
                let bars = StageBars::new(launchgraph_analysis::STAGES);
                service.run_full_analysis(&token, &bars)
            }
            .context("Analysis did not complete")?;
            Ok(CommandOutput::Analysis(report))
        }
        Commands::Query {
            program,
            qualified_name,
        } => {
            let service = load_service(program, config)?;
            let functions = service.functions_named(qualified_name);
            if functions.is_empty() {
                bail!("No function named {}", qualified_name);
            }
            let reports = functions
                .into_iter()
                .map(|f| service.report(f))
                .collect::<launchgraph_core::Result<Vec<_>>>()
                .with_context(|| format!("Failed to count {}", qualified_name))?;
            Ok(CommandOutput::Functions(reports))
        }
        Commands::Modules { program } => {
            let service = load_service(program, config)?;
            Ok(CommandOutput::Modules(ModulesResult {
                modules_in_scope: service.modules_with_concurrency(),
                total_modules: service.total_modules(),
                candidate_functions: service.candidates().len(),
            }))
        }
        Commands::Config => Ok(CommandOutput::Text(ConfigManager::create_example_config())),
    }
}

fn print_output(format: OutputFormat, output: &CommandOutput) -> Result<()> {
    match (format, output) {
        (_, CommandOutput::Text(text)) => println!("{}", text),
        (OutputFormat::Json, CommandOutput::Analysis(report)) => println!("{}", report.to_json()?),
        (OutputFormat::Json, CommandOutput::Functions(reports)) => {
            println!("{}", serde_json::to_string_pretty(reports)?)
        }
        (OutputFormat::Json, CommandOutput::Modules(modules)) => {
            println!("{}", serde_json::to_string_pretty(modules)?)
        }
        (OutputFormat::Table, CommandOutput::Analysis(report)) => {
            println!("{}", render_table(&report.functions));
            print_summary(report);
        }
        (OutputFormat::Table, CommandOutput::Functions(reports)) => {
            println!("{}", render_table(reports))
        }
        (OutputFormat::Pretty, CommandOutput::Analysis(report)) => {
            for function in &report.functions {
                print_function(function);
            }
            print_summary(report);
        }
        (OutputFormat::Pretty, CommandOutput::Functions(reports)) => {
            for function in reports {
                print_function(function);
            }
        }
        (_, CommandOutput::Modules(modules)) => print_modules(modules),
    }
    Ok(())
}

fn render_table(reports: &[FunctionReport]) -> String {
    let rows: Vec<FunctionRow> = reports.iter().map(FunctionRow::from).collect();
    Table::new(rows).with(Style::rounded()).to_string()
}

fn colored_label(report: &FunctionReport) -> ColoredString {
    match report.count.tag {
        CountTag::Exact => report.count.label.green(),
        CountTag::Indeterminate => report.count.label.yellow(),
        CountTag::Unbounded => report.count.label.red().bold(),
    }
}

fn print_function(report: &FunctionReport) {
    println!(
        "{} {} {}",
        report.qualified_name.cyan().bold(),
        colored_label(report),
        format!("({})", report.location).dimmed()
    );
}

fn print_summary(report: &AnalysisReport) {
    let summary = &report.summary;
    println!();
    println!(
        "{}: {} exact ({} launches), {} indeterminate, {} unbounded",
        "Functions".cyan().bold(),
        summary.exact.to_string().green(),
        summary.total_launches.to_string().green(),
        summary.indeterminate.to_string().yellow(),
        summary.unbounded.to_string().red()
    );
    println!(
        "{}: {} of {} use coroutines",
        "Modules".cyan().bold(),
        report.modules_in_scope.to_string().yellow(),
        report.total_modules
    );
}

fn print_modules(modules: &ModulesResult) {
    println!(
        "{}: {}",
        "Modules using coroutines".cyan().bold(),
        modules.modules_in_scope.to_string().yellow()
    );
    println!(
        "{}: {}",
        "Total modules".cyan().bold(),
        modules.total_modules.to_string().yellow()
    );
    println!(
        "{}: {}",
        "Candidate functions".cyan().bold(),
        modules.candidate_functions.to_string().yellow()
    );
}
