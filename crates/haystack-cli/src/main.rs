mod config;

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::info;

use haystack_core::{
    DepthSpacing, Grid, PromptTemplate, ResultStore, RetryingClient, RunConfig, Runner,
    ScoreSummary, Scorer, Tokenizer, WordTokenizer,
};
use haystack_providers::{api_key_from_env, build_client, ClientSettings, Provider};
use haystack_store::JsonFileStore;

use crate::config::{Config, TokenizerConfig, TokenizerKind};

#[derive(Parser)]
#[command(
    name = "haystack",
    version,
    about = "Needle-in-a-haystack long-context retrieval benchmark"
)]
struct Cli {
    /// Path to a TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run (or resume) the context × depth grid against one model
    Run {
        /// Backend: openai, together, fireworks, azure, mistral, anthropic
        #[arg(short, long)]
        provider: Option<Provider>,

        /// Model identifier sent to the backend
        #[arg(short, long)]
        model: Option<String>,

        /// Haystack text file
        #[arg(long)]
        haystack: Option<PathBuf>,

        /// Directory for result files
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Largest context size, in units of the configured tokenizer. The
        /// default word tokenizer counts whitespace-separated runs, not model
        /// tokens; build with `--features hf-tokenizer` to size by a model's
        /// own vocabulary.
        #[arg(long)]
        max_context: Option<usize>,

        /// Number of context sizes
        #[arg(long)]
        context_intervals: Option<usize>,

        /// Number of needle depths
        #[arg(long)]
        depth_intervals: Option<usize>,

        /// Depth placement: trailing or centered
        #[arg(long)]
        depth_spacing: Option<DepthSpacing>,

        /// Seed for window sampling
        #[arg(long)]
        seed: Option<u64>,

        /// Record failed cells and keep going instead of stopping the run
        #[arg(long)]
        skip_failures: bool,
    },

    /// Score recorded responses and write a filtered, scored copy
    Score {
        /// Model whose results to score (default: configured model)
        #[arg(short, long)]
        model: Option<String>,

        /// Score this results file instead of the model's default file
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Where to write the scored batch
        #[arg(long)]
        output: Option<PathBuf>,

        /// Expected keywords (comma-separated)
        #[arg(short, long)]
        keywords: Option<String>,

        /// Directory holding result files
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },

    /// Show the config file in use and the effective settings
    Config,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .init();

    // Credentials usually live in a local .env; absence is fine.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let mut config = config::load_config(cli.config.as_ref())?;

    match cli.command {
        Commands::Run {
            provider,
            model,
            haystack,
            output_dir,
            max_context,
            context_intervals,
            depth_intervals,
            depth_spacing,
            seed,
            skip_failures,
        } => {
            if let Some(p) = provider {
                if p != config.provider.kind {
                    // a different backend's model name makes no sense here
                    config.provider.model = None;
                }
                config.provider.kind = p;
            }
            if model.is_some() {
                config.provider.model = model;
            }
            if let Some(n) = max_context {
                config.provider.max_context_tokens = Some(n);
            }
            if let Some(p) = haystack {
                config.run.haystack_path = p;
            }
            if let Some(d) = output_dir {
                config.run.output_dir = d;
            }
            if let Some(n) = context_intervals {
                config.run.context_intervals = n;
            }
            if let Some(n) = depth_intervals {
                config.run.depth_intervals = n;
            }
            if let Some(s) = depth_spacing {
                config.run.depth_spacing = s;
            }
            if seed.is_some() {
                config.run.seed = seed;
            }
            if skip_failures {
                config.run.failure_policy = haystack_core::FailurePolicy::Skip;
            }
            cmd_run(&config)
        }
        Commands::Score {
            model,
            input,
            output,
            keywords,
            output_dir,
        } => {
            if model.is_some() {
                config.provider.model = model;
            }
            if let Some(d) = output_dir {
                config.run.output_dir = d;
            }
            if let Some(k) = keywords {
                config.needle.keywords = k
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect();
            }
            cmd_score(&config, input.as_deref(), output.as_deref())
        }
        Commands::Config => cmd_config(cli.config.as_ref(), &config),
    }
}

// ---------------------------------------------------------------------------
// Run
// ---------------------------------------------------------------------------

fn build_tokenizer(cfg: &TokenizerConfig) -> Result<Box<dyn Tokenizer>> {
    match cfg.kind {
        TokenizerKind::Word => Ok(Box::new(WordTokenizer::new())),
        #[cfg(feature = "hf-tokenizer")]
        TokenizerKind::Huggingface => {
            let tok = match (&cfg.path, &cfg.repo) {
                (Some(path), _) => haystack_core::HfTokenizer::from_file(path)?,
                (None, Some(repo)) => haystack_core::HfTokenizer::from_hub(repo)?,
                (None, None) => bail!("huggingface tokenizer needs `path` or `repo`"),
            };
            Ok(Box::new(tok))
        }
        #[cfg(not(feature = "hf-tokenizer"))]
        TokenizerKind::Huggingface => {
            bail!("hf-tokenizer feature not enabled: rebuild with `--features hf-tokenizer`")
        }
    }
}

fn client_settings(config: &Config) -> Result<ClientSettings> {
    let provider = config.provider.kind;
    let api_key = api_key_from_env(provider, config.provider.api_key_env.as_deref())?;
    let mut settings = ClientSettings::new(provider, &config.provider.model(), &api_key);
    settings.base_url = config.provider.base_url.clone();
    settings.max_tokens = config.provider.max_tokens;
    settings.timeout = Duration::from_secs(config.provider.timeout_secs);
    settings.retry = config.retry.apply(provider.default_retry_policy());
    Ok(settings)
}

fn cmd_run(config: &Config) -> Result<()> {
    let settings = client_settings(config)?;
    let client = RetryingClient::new(build_client(&settings)?);
    let model = settings.model.clone();

    let tokenizer = build_tokenizer(&config.tokenizer)?;
    let haystack_path = &config.run.haystack_path;
    let haystack = std::fs::read_to_string(haystack_path)
        .with_context(|| format!("reading haystack {}", haystack_path.display()))?;

    let store = JsonFileStore::new(&config.run.output_dir)?;
    let grid = Grid::new(
        config.provider.max_context_tokens(),
        config.run.context_intervals,
        config.run.depth_intervals,
        config.run.depth_spacing,
    )?;
    let rng = match config.run.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let prompt = PromptTemplate::new(config.needle.question.clone(), config.needle.layout);
    let run_config = RunConfig {
        store_id: model.clone(),
        grid,
        failure_policy: config.run.failure_policy,
        record_context: config.run.record_context,
    };

    info!(
        provider = %settings.provider,
        model = %model,
        max_context = config.provider.max_context_tokens(),
        "starting haystack run"
    );

    let mut runner = Runner::new(
        tokenizer.as_ref(),
        &client,
        &store,
        &haystack,
        &config.needle.text,
        prompt,
        run_config,
        rng,
    )?;

    let t0 = Instant::now();
    let summary = runner.run(&mut |p| {
        println!(
            "Completed test: {:.1}% context ({} tokens), {:.0}% depth [{}/{}]{}",
            p.context_percentage,
            p.context_tokens,
            p.depth * 100.0,
            p.completed,
            p.total,
            if p.failed { " FAILED" } else { "" }
        );
    })?;

    let (calls, attempts, transient, rate_limited) = client.stats().snapshot();
    println!("{}", "─".repeat(58));
    println!("Model:       {model} ({})", settings.provider);
    println!(
        "Cells:       {} total, {} already recorded, {} run, {} failed",
        summary.total_cells, summary.resumed_from, summary.evaluated, summary.failed
    );
    println!(
        "Requests:    {calls} calls, {attempts} attempts ({transient} transient, {rate_limited} rate-limited)"
    );
    println!("Elapsed:     {:.1}s", t0.elapsed().as_secs_f64());
    println!("Results:     {}", store.path(&model).display());
    Ok(())
}

// ---------------------------------------------------------------------------
// Score
// ---------------------------------------------------------------------------

fn cmd_score(config: &Config, input: Option<&Path>, output: Option<&Path>) -> Result<()> {
    let model = config.provider.model();
    let raw_store = JsonFileStore::new(&config.run.output_dir)?;
    let scored_store = JsonFileStore::new(&config.run.output_dir)?.with_suffix("scored");
    let input = input
        .map(Path::to_path_buf)
        .unwrap_or_else(|| raw_store.path(&model));
    let target = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| scored_store.path(&model));
    if input == target {
        bail!("refusing to overwrite the raw results at {}", input.display());
    }

    let raw = std::fs::read_to_string(&input)
        .with_context(|| format!("reading results {}", input.display()))?;
    let scorer = Scorer::new(config.needle.keywords.as_slice())?;
    let scored = scorer
        .score_json(&raw)
        .with_context(|| format!("scoring {}", input.display()))?;
    match output {
        Some(path) => JsonFileStore::write_batch(path, &scored)?,
        None => scored_store.save(&model, &scored)?,
    }

    print_summary(&ScoreSummary::from_batch(&scored), scorer.max_points());
    println!("Scored {} results → {}", scored.len(), target.display());
    Ok(())
}

fn print_summary(summary: &ScoreSummary, max_points: u8) {
    println!(
        "Mean points: {:.2} / {max_points} over {} results ({} failed)",
        summary.mean_points, summary.total, summary.failed
    );
    println!("{}", "─".repeat(40));
    println!("{:<16} {:>10} {:>8}", "context %", "mean pts", "n");
    for (pct, (mean, n)) in &summary.by_context {
        println!("{:<16.1} {:>10.2} {:>8}", *pct as f64 / 100.0, mean, n);
    }
    println!("{}", "─".repeat(40));
    println!("{:<16} {:>10} {:>8}", "depth %", "mean pts", "n");
    for (depth, (mean, n)) in &summary.by_depth {
        println!("{:<16.1} {:>10.2} {:>8}", *depth as f64 / 10.0, mean, n);
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

fn cmd_config(explicit: Option<&PathBuf>, config: &Config) -> Result<()> {
    println!("Config: {}", config::show_config_path(explicit));
    println!();
    println!("[provider]");
    println!("  kind               = {}", config.provider.kind);
    println!("  model              = {}", config.provider.model());
    println!(
        "  base_url           = {}",
        config
            .provider
            .base_url
            .as_deref()
            .or(config.provider.kind.default_base_url())
            .unwrap_or("(required)")
    );
    println!(
        "  api_key_env        = {}",
        config
            .provider
            .api_key_env
            .as_deref()
            .unwrap_or(config.provider.kind.api_key_env())
    );
    println!("  max_context_tokens = {}", config.provider.max_context_tokens());
    println!("[tokenizer]");
    println!("  kind               = {:?}", config.tokenizer.kind);
    println!("[run]");
    println!("  haystack_path      = {}", config.run.haystack_path.display());
    println!("  output_dir         = {}", config.run.output_dir.display());
    println!(
        "  grid               = {} x {} ({} depth spacing)",
        config.run.context_intervals, config.run.depth_intervals, config.run.depth_spacing
    );
    println!("  failure_policy     = {:?}", config.run.failure_policy);
    let policy = config.retry.apply(config.provider.kind.default_retry_policy());
    println!("[retry]");
    println!("  max_attempts       = {}", policy.max_attempts);
    println!("  cooldown           = {:?}", policy.cooldown);
    println!("  pacing             = {:?}", policy.pacing);
    println!("[needle]");
    println!("  text               = {:?}", config.needle.text);
    println!("  question           = {}", config.needle.question);
    println!("  keywords           = {}", config.needle.keywords.join(", "));
    Ok(())
}
