use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use pql_bench::catalogue::Catalogue;
use pql_bench::config::{BenchConfig, DEFAULT_CARDINALITY_QUERY, SSB_FRAMES};
use pql_bench::engine::config::{parse_connect_kv, parse_engine};
use pql_bench::engine::{ConnectOptions, Engine, EngineBuilder, QueryEngine};
use pql_bench::logging;
use pql_bench::output::SummaryWriter;
use pql_bench::run::{BenchmarkSummary, RunOptions, Runner, dataset_cardinality};
use pql_bench::sweep::{DEFAULT_BATCH_SIZES, DEFAULT_CONCURRENCY, sweep};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "pql-bench")]
#[command(about = "Parameterized query load benchmark for bitmap-index engines")]
struct Cli {
    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Optional YAML config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory for per-run results files
    #[arg(long)]
    out_dir: Option<PathBuf>,

    /// Query engine (pilosa or mock)
    #[arg(long)]
    engine: Option<String>,

    /// Engine connect parameters as key=value (host, index, scheme, timeout_ms)
    #[arg(long)]
    connect: Vec<String>,

    /// YAML file with additional query set definitions
    #[arg(long)]
    catalogue: Option<PathBuf>,

    /// Optional CSV output file for run summaries (JSON on stdout if omitted)
    #[arg(long)]
    csv: Option<String>,

    /// Cancel the benchmark after this many seconds
    #[arg(long)]
    deadline: Option<u64>,

    /// Progress log interval in seconds (0 disables)
    #[arg(long)]
    snapshot_interval: Option<u64>,

    /// Query whose summed results give the dataset cardinality
    #[arg(long)]
    cardinality_query: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one query set once
    Run {
        /// Query set name
        name: String,

        /// Batches in flight
        #[arg(long, default_value = "32")]
        concurrency: usize,

        /// Queries per compound request
        #[arg(long, default_value = "1")]
        batch_size: usize,
    },
    /// Run one query set over a grid of concurrency and batch sizes
    Sweep {
        /// Query set name
        name: String,

        /// Concurrency values (default 8,16,32)
        #[arg(long, value_delimiter = ',')]
        concurrency: Vec<usize>,

        /// Batch sizes (default 2,4,8)
        #[arg(long, value_delimiter = ',')]
        batch_size: Vec<usize>,
    },
    /// List known query sets
    List,
    /// Print tool and engine versions
    Version,
    /// Make sure the index and its frames exist
    Schema {
        /// Frames to create (default: the SSB frames)
        #[arg(long)]
        frame: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    logging::init(&cli.log_level)?;

    let file_cfg = match &cli.config {
        Some(path) => BenchConfig::load(path)?,
        None => BenchConfig::default(),
    };

    let mut catalogue = Catalogue::builtin();
    if let Some(path) = cli.catalogue.as_ref().or(file_cfg.catalogue.as_ref()) {
        catalogue.extend(Catalogue::load_yaml(path)?);
    }

    let engine_name = cli
        .engine
        .clone()
        .or_else(|| file_cfg.engine.clone())
        .unwrap_or_else(|| "pilosa".to_string());
    let engine_kind =
        parse_engine(&engine_name).with_context(|| format!("unknown engine {}", engine_name))?;
    let opts = ConnectOptions {
        params: file_cfg.connect_params(&parse_connect_kv(&cli.connect).params),
    };

    let cardinality_query = cli
        .cardinality_query
        .as_deref()
        .or(file_cfg.cardinality_query.as_deref())
        .unwrap_or(DEFAULT_CARDINALITY_QUERY);

    match &cli.command {
        Commands::List => {
            for name in catalogue.names() {
                let qs = catalogue.resolve(name)?;
                let register = if qs.setup().is_some() { " (setup/teardown)" } else { "" };
                println!("{:<6} {:>6} queries, {} dims{}", name, qs.size(), qs.dim(), register);
            }
            Ok(())
        }
        Commands::Version => {
            println!("pql-bench {}", env!("CARGO_PKG_VERSION"));
            if engine_kind == Engine::Pilosa {
                print_engine_version(&opts).await;
            }
            Ok(())
        }
        Commands::Schema { frame } => {
            let frames = if !frame.is_empty() {
                frame.clone()
            } else if !file_cfg.frames.is_empty() {
                file_cfg.frames.clone()
            } else {
                SSB_FRAMES.iter().map(|f| f.to_string()).collect()
            };
            ensure_schema(engine_kind, &opts, &frames).await
        }
        Commands::Run {
            name,
            concurrency,
            batch_size,
        } => {
            let queryset = Arc::new(catalogue.resolve(name)?);
            println!("{}", queryset);
            let engine = EngineBuilder::connect(engine_kind, opts).await?;
            let cancel = install_cancel(cli.deadline);
            let runner = build_runner(engine, cli_run_options(&cli, &file_cfg), cardinality_query).await;
            let summaries = vec![runner.run(queryset, *concurrency, *batch_size, &cancel).await];
            report(&summaries, cli.csv.clone()).await
        }
        Commands::Sweep {
            name,
            concurrency,
            batch_size,
        } => {
            let concurrency = pick_grid(concurrency, &file_cfg.sweep.concurrency, &DEFAULT_CONCURRENCY);
            let batch_size = pick_grid(batch_size, &file_cfg.sweep.batch_size, &DEFAULT_BATCH_SIZES);
            let queryset = Arc::new(catalogue.resolve(name)?);
            println!("{}", queryset);
            println!("Sweeping concurrency {:?} x batch size {:?}", concurrency, batch_size);
            let engine = EngineBuilder::connect(engine_kind, opts).await?;
            let cancel = install_cancel(cli.deadline);
            let runner = build_runner(engine, cli_run_options(&cli, &file_cfg), cardinality_query).await;
            let summaries = sweep(&runner, queryset, &concurrency, &batch_size, &cancel).await;
            report(&summaries, cli.csv.clone()).await
        }
    }
}

fn cli_run_options(cli: &Cli, cfg: &BenchConfig) -> RunOptions {
    RunOptions {
        results_dir: cli
            .out_dir
            .clone()
            .or_else(|| cfg.out_dir.clone())
            .unwrap_or_else(|| PathBuf::from("results")),
        column_count: 0,
        snapshot_interval: Duration::from_secs(
            cli.snapshot_interval.or(cfg.snapshot_interval).unwrap_or(1),
        ),
        queue_depth: cfg.queue_depth,
    }
}

async fn build_runner(
    engine: Arc<dyn QueryEngine>,
    mut options: RunOptions,
    cardinality_query: &str,
) -> Runner {
    if let Err(e) = engine.health_check().await {
        warn!("engine health check failed: {}", e);
    }
    let column_count = match dataset_cardinality(engine.as_ref(), cardinality_query).await {
        Ok(n) => n,
        Err(e) => {
            warn!("counting dataset cardinality: {}", e);
            0
        }
    };
    println!("Dataset cardinality: {}", column_count);
    options.column_count = column_count;
    Runner::new(engine, options)
}

fn pick_grid(cli: &[usize], file: &[usize], default: &[usize]) -> Vec<usize> {
    if !cli.is_empty() {
        cli.to_vec()
    } else if !file.is_empty() {
        file.to_vec()
    } else {
        default.to_vec()
    }
}

/// One token for the whole invocation: Ctrl+C or the deadline cancels it.
fn install_cancel(deadline: Option<u64>) -> CancellationToken {
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if signal::ctrl_c().await.is_ok() {
                println!("Ctrl+C received, stopping benchmark");
                cancel.cancel();
            }
        });
    }
    if let Some(secs) = deadline {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(secs)).await;
            warn!("deadline of {}s reached, cancelling", secs);
            cancel.cancel();
        });
    }
    cancel
}

async fn report(summaries: &[BenchmarkSummary], csv: Option<String>) -> Result<()> {
    println!("\nFinal Benchmark Statistics:");
    for s in summaries {
        if s.is_failed() {
            println!(
                "  {} c={} b={}: FAILED ({})",
                s.name,
                s.concurrency,
                s.batch_size,
                s.error.as_deref().unwrap_or("unknown error")
            );
        } else {
            println!(
                "  {} c={} b={}: {} queries in {:.3}s ({:.1} q/s, p50 {} us, p99 {} us)",
                s.name,
                s.concurrency,
                s.batch_size,
                s.iterations,
                s.seconds,
                s.throughput,
                s.latency_us_p50,
                s.latency_us_p99
            );
        }
        if let Some(t) = &s.teardown_error {
            println!("    teardown failed: {}", t);
        }
    }

    let writer = match csv {
        Some(path) => SummaryWriter::new_csv(path),
        None => SummaryWriter::new_stdout(),
    };
    writer.write_summaries(summaries).await?;

    let failed = summaries.iter().filter(|s| s.is_failed()).count();
    if failed > 0 {
        bail!("{} of {} runs failed", failed, summaries.len());
    }
    info!(runs = summaries.len(), "benchmark complete");
    Ok(())
}

#[cfg(feature = "engine-pilosa")]
async fn print_engine_version(opts: &ConnectOptions) {
    match pql_bench::engine::pilosa::PilosaEngine::new(opts) {
        Ok(engine) => match engine.version().await {
            Ok(v) => println!("pilosa {}", v),
            Err(e) => println!("pilosa version unavailable: {}", e),
        },
        Err(e) => println!("pilosa version unavailable: {}", e),
    }
}

#[cfg(not(feature = "engine-pilosa"))]
async fn print_engine_version(_opts: &ConnectOptions) {
    println!("pilosa support not compiled in");
}

#[cfg(feature = "engine-pilosa")]
async fn ensure_schema(engine: Engine, opts: &ConnectOptions, frames: &[String]) -> Result<()> {
    if engine != Engine::Pilosa {
        bail!("schema provisioning needs the pilosa engine");
    }
    let pilosa = pql_bench::engine::pilosa::PilosaEngine::new(opts)?;
    pilosa
        .ensure_index()
        .await
        .with_context(|| format!("ensuring index {}", pilosa.index()))?;
    for frame in frames {
        pilosa
            .ensure_frame(frame)
            .await
            .with_context(|| format!("ensuring frame {}", frame))?;
    }
    println!("Index {} has {} frames ensured", pilosa.index(), frames.len());
    Ok(())
}

#[cfg(not(feature = "engine-pilosa"))]
async fn ensure_schema(_engine: Engine, _opts: &ConnectOptions, _frames: &[String]) -> Result<()> {
    bail!("pilosa support not compiled in")
}
