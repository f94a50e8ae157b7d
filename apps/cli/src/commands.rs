//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use sourcescout_core::{
    CitationRegistry, ProgressReporter, ResearchOutput, ResearchPipeline,
};
use sourcescout_crawler::{Crawler, HttpCrawler};
use sourcescout_llm::{LanguageModel, OpenRouterClient};
use sourcescout_search::build_backend;
use sourcescout_shared::{AppConfig, DistillStrategy, Plan, init_config, load_config};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// SourceScout: gather bounded, citable research context.
#[derive(Parser)]
#[command(
    name = "sourcescout",
    version,
    about = "Execute research plans and return token-budgeted, citable source chunks.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Result output format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

/// Distillation strategy override.
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub(crate) enum StrategyArg {
    PassThrough,
    Truncate,
    Summarize,
}

impl From<StrategyArg> for DistillStrategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::PassThrough => Self::PassThrough,
            StrategyArg::Truncate => Self::Truncate,
            StrategyArg::Summarize => Self::Summarize,
        }
    }
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run a research plan (JSON) and print the selected chunks.
    Research(ResearchArgs),

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Args, Debug)]
pub(crate) struct ResearchArgs {
    /// Path to the plan JSON produced by the planner.
    #[arg(long)]
    pub plan: PathBuf,

    /// Tokens already used by conversation history.
    #[arg(long, default_value_t = 0)]
    pub history_tokens: usize,

    /// Model input window (overrides config).
    #[arg(long)]
    pub max_input_tokens: Option<usize>,

    /// Share of the window reserved for sources (overrides config).
    #[arg(long)]
    pub source_fraction: Option<f64>,

    /// Maximum plan steps to execute (overrides config).
    #[arg(long)]
    pub max_steps: Option<usize>,

    /// Distillation strategy (overrides config).
    #[arg(long, value_enum)]
    pub strategy: Option<StrategyArg>,

    /// Enable relevancy sorting for this run.
    #[arg(long)]
    pub relevancy: bool,

    /// Output format.
    #[arg(long, value_enum, default_value = "text")]
    pub output: OutputFormat,
}

impl ResearchArgs {
    /// Apply flag overrides on top of the loaded config.
    fn apply(&self, config: &mut AppConfig) {
        if let Some(n) = self.max_input_tokens {
            config.research.max_input_tokens = n;
        }
        if let Some(f) = self.source_fraction {
            config.research.source_fraction = f;
        }
        if let Some(n) = self.max_steps {
            config.research.max_steps = n;
        }
        if let Some(s) = self.strategy {
            config.distill.strategy = s.into();
        }
        if self.relevancy {
            config.relevancy.enabled = true;
        }
    }
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "sourcescout=info",
        1 => "sourcescout=debug",
        _ => "sourcescout=trace",
    };

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    // Logs go to stderr so stdout stays clean for results.
    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Research(args) => cmd_research(&args).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

async fn cmd_research(args: &ResearchArgs) -> Result<()> {
    let mut config = load_config()?;
    args.apply(&mut config);

    // Fail fast on config and credentials before any network call.
    config.validate()?;
    let plan = load_plan(&args.plan)?;

    let search = build_backend(&config.search)?;
    let crawler: Arc<dyn Crawler> = Arc::new(HttpCrawler::new(config.crawler.clone())?);
    let oracle: Option<Arc<dyn LanguageModel>> = if config.needs_oracle() {
        Some(Arc::new(OpenRouterClient::from_config(&config.openrouter)?))
    } else {
        None
    };

    info!(
        objective = %plan.objective,
        steps = plan.steps.len(),
        backend = search.name(),
        "starting research"
    );

    let pipeline = ResearchPipeline::new(config, search, crawler, oracle)?;
    let budget = pipeline.budget_context(args.history_tokens);
    let mut citations = CitationRegistry::new();
    let reporter = CliProgress::new();

    let result = pipeline
        .run(&plan, &budget, &mut citations, &reporter)
        .await;
    drop(reporter);
    let output = result?;

    match args.output {
        OutputFormat::Json => {
            let sources: Vec<_> = citations
                .sources()
                .map(|(n, url)| serde_json::json!({ "number": n, "url": url }))
                .collect();
            let report = serde_json::json!({ "sources": sources, "result": output });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        OutputFormat::Text => print_text(&output, &citations),
    }

    Ok(())
}

fn load_plan(path: &Path) -> Result<Plan> {
    let content = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("cannot read plan {}", path.display()))?;
    let plan: Plan = serde_json::from_str(&content)
        .map_err(|e| eyre!("invalid plan {}: {e}", path.display()))?;
    Ok(plan)
}

fn print_text(output: &ResearchOutput, citations: &CitationRegistry) {
    println!();
    println!("  Run:     {}", output.run_id);
    println!(
        "  Tokens:  {} / {} budget",
        output.tokens_used, output.budget
    );
    if let Some(original) = output.clamped_from {
        println!(
            "  Note:    plan had {original} steps, ran the first {}",
            output.step_logs.len()
        );
    }
    if output.sorting_degraded {
        println!("  Note:    relevancy sorting unavailable, original order kept");
    }
    println!();

    println!("  Steps");
    for log in &output.step_logs {
        let status = if log.is_failed() { "failed" } else { "ok" };
        println!(
            "    #{} {:<8} {:<6} {:>3} hits {:>6}ms  {}",
            log.index,
            log.kind.as_str(),
            status,
            log.hits,
            log.elapsed_ms,
            log.query_or_url
        );
        if let Some(err) = &log.error {
            println!("       {err}");
        }
    }
    println!();

    println!("  Sources");
    for (n, url) in citations.sources() {
        println!("    [{n}] {url}");
    }
    println!();

    for chunk in &output.chunks {
        let n = citations.number(&chunk.url).unwrap_or_default();
        let tier = chunk
            .relevancy_tier
            .map(|t| format!(", {t}"))
            .unwrap_or_default();
        println!("--- [{n}] {} (part {}{tier})", chunk.title, chunk.order + 1);
        println!("{}", chunk.render());
        println!();
    }
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn done(&self, _output: &ResearchOutput) {
        self.spinner.finish_and_clear();
    }
}

/// A run that errors out never reaches `done`; clear the spinner anyway.
impl Drop for CliProgress {
    fn drop(&mut self) {
        if !self.spinner.is_finished() {
            self.spinner.finish_and_clear();
        }
    }
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}
