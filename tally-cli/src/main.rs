//! CLI for the tally metrics aggregation core.
//!
//! Provides commands for validating engine configuration and benchmarking the
//! ingestion path.

use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tally::hll::HyperLogLog;
use tally::{ActiveEngine, EngineConfig, MetricKind, MetricValue, SetMode};
use tracing_subscriber::EnvFilter;

/// tally: in-memory aggregation core for statsd-style metrics.
#[derive(Parser)]
#[command(name = "tally", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Load and validate an engine configuration file.
    CheckConfig {
        /// Path to the JSON configuration file.
        path: PathBuf,

        /// Output format.
        #[arg(long, default_value = "text")]
        format: OutputFormat,
    },

    /// Run a mixed-type ingestion benchmark through a swap cycle.
    Bench {
        /// Number of samples to ingest.
        #[arg(long, default_value = "1000000")]
        samples: u64,

        /// Number of distinct names per metric family.
        #[arg(long, default_value = "100")]
        names: u32,

        /// Configuration file; defaults are used when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output format.
        #[arg(long, default_value = "text")]
        format: OutputFormat,
    },
}

/// Output format for command results.
#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Human-readable text.
    Text,
    /// Pretty-printed JSON.
    Json,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::CheckConfig { path, format } => cmd_check_config(&path, &format),
        Commands::Bench {
            samples,
            names,
            config,
            format,
        } => cmd_bench(samples, names, config.as_deref(), &format),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

/// Implements `tally check-config <path>`.
fn cmd_check_config(path: &Path, format: &OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    let config = EngineConfig::load(path)?;
    let resolver = config.build_resolver()?;
    let set_error = HyperLogLog::new(config.set_precision)?.standard_error();

    match format {
        OutputFormat::Text => {
            println!("Config: {}", path.display());
            println!();
            println!("Timers:");
            println!("  eps: {}", config.timer_eps);
            let quantiles: Vec<String> = config.quantiles.iter().map(f64::to_string).collect();
            println!("  quantiles: {}", quantiles.join(", "));
            println!();
            println!("Sets:");
            println!("  precision: {} (std. error {:.2}%)", config.set_precision, set_error * 100.0);
            println!("  exact below: {} items", config.set_max_exact);
            println!();
            println!("Gauges:");
            println!("  out-of-order timestamps: {:?}", config.gauge_timestamps);
            println!();
            println!("Histograms: {}", resolver.len());
            for histogram in &config.histograms {
                let boundaries = histogram.boundaries();
                println!(
                    "  - \"{}\": {} buckets, boundaries {}..{}",
                    histogram.prefix(),
                    histogram.bucket_count(),
                    boundaries[0],
                    boundaries[boundaries.len() - 1],
                );
            }
        }
        OutputFormat::Json => {
            let output = serde_json::json!({
                "path": path.display().to_string(),
                "config": config,
                "set_standard_error": set_error,
                "histogram_prefixes": resolver.len(),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

/// Summary of one benchmark run.
#[derive(Serialize)]
struct BenchReport {
    samples: u64,
    names_per_family: u32,
    ingest_secs: f64,
    ns_per_sample: f64,
    samples_per_sec: f64,
    iterate_secs: f64,
    counters: usize,
    timers: usize,
    sets: usize,
    gauges: usize,
    approximate_sets: usize,
    rejected: u64,
}

/// Implements `tally bench`.
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)] // Benchmark stats and picks
fn cmd_bench(
    samples: u64,
    names: u32,
    config_path: Option<&Path>,
    format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    if names == 0 {
        return Err("--names must be at least 1".into());
    }

    let config = match config_path {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    let resolver = config.build_resolver()?;
    let active = ActiveEngine::new(&config, &resolver)?;

    let family_names = |family: &str| -> Vec<String> {
        (0..names).map(|i| format!("bench.{family}.{i}")).collect()
    };
    let counters = family_names("counter");
    let timers = family_names("timer");
    let sets = family_names("set");
    let gauges = family_names("gauge");
    let members: Vec<String> = (0..4096).map(|i| format!("member-{i}")).collect();

    tracing::info!(samples, names, "starting ingestion benchmark");

    let mut state = 0x2545_f491_u64;
    let mut rejected = 0;
    let start = Instant::now();

    for i in 0..samples {
        state = state.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
        let pick = (state >> 33) as usize;
        let name = pick % names as usize;
        let value = ((state >> 40) % 1000) as f64;

        let result = match i % 4 {
            0 => active.add_sample(MetricKind::Counter, &counters[name], 1.0, 1.0),
            1 => active.add_sample(MetricKind::Timer, &timers[name], value, 1.0),
            2 => active.set_update(&sets[name], &members[pick % members.len()]),
            _ => active.set_gauge(&gauges[name], value, pick % 2 == 0, 0),
        };
        if result.is_err() {
            rejected += 1;
        }
    }

    let ingest = start.elapsed();
    let epoch = active.swap();

    let iterate_start = Instant::now();
    let mut approximate_sets = 0;
    let mut quantile_sum = 0.0;
    let _ = epoch.iterate(|metric| {
        match metric.value {
            MetricValue::Timer(timer) => {
                quantile_sum += timer.quantiles().map(|(_, v)| v).sum::<f64>();
            }
            MetricValue::Set(set) if set.mode() == SetMode::Approximate => approximate_sets += 1,
            _ => {}
        }
        ControlFlow::Continue(())
    });
    let iterate = iterate_start.elapsed();
    tracing::debug!(quantile_sum, "iterated detached engine");

    let report = BenchReport {
        samples,
        names_per_family: names,
        ingest_secs: ingest.as_secs_f64(),
        ns_per_sample: ingest.as_nanos() as f64 / samples.max(1) as f64,
        samples_per_sec: samples as f64 / ingest.as_secs_f64(),
        iterate_secs: iterate.as_secs_f64(),
        counters: epoch.len(MetricKind::Counter),
        timers: epoch.len(MetricKind::Timer),
        sets: epoch.len(MetricKind::Set),
        gauges: epoch.len(MetricKind::Gauge),
        approximate_sets,
        rejected,
    };
    epoch.destroy();

    match format {
        OutputFormat::Text => {
            println!("tally ingestion benchmark");
            println!("  Samples: {}", report.samples);
            println!("  Names per family: {}", report.names_per_family);
            println!();
            println!("Results:");
            println!("  Elapsed: {ingest:.3?}");
            println!("  Avg latency: {:.1} ns/sample", report.ns_per_sample);
            println!("  Throughput: {:.0} samples/sec", report.samples_per_sec);
            println!("  Iterate: {iterate:.3?}");
            println!(
                "  Metrics: {} counters, {} timers, {} sets ({} approximate), {} gauges",
                report.counters, report.timers, report.sets, report.approximate_sets, report.gauges
            );
            if report.rejected > 0 {
                println!("  Rejected: {}", report.rejected);
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}
