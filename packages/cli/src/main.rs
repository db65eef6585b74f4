#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for hotspot analysis.
//!
//! Prints exactly one JSON document to stdout: the `GeoJSON` report for
//! `run`, the alert list for `alerts`, or an error payload when a run
//! fails. Logs and the stage progress bar go to stderr.

mod progress;

use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use hotspot_cache::{FileStore, ResultCache};
use hotspot_engine::HotspotPipeline;
use hotspot_engine_models::{ClusterSummary, EngineConfig};
use hotspot_incident_models::FilterDescriptor;
use hotspot_snapshot::GeoJsonFileSource;
use indicatif::MultiProgress;
use tempfile::NamedTempFile;

use crate::progress::IndicatifProgress;

/// Find and rank incident hotspots.
#[derive(Parser)]
#[command(name = "hotspot")]
#[command(about = "Find and rank incident hotspots")]
struct Cli {
    /// Engine configuration TOML file. Built-in defaults when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding cached results.
    #[arg(long, global = true, default_value = "data/cache")]
    cache_dir: PathBuf,

    /// Hide the progress bar.
    #[arg(long, global = true)]
    quiet: bool,

    /// Subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Inputs shared by the analysis subcommands.
#[derive(Args)]
struct AnalysisArgs {
    /// `GeoJSON` point snapshot.
    #[arg(long, default_value = "data/accidents.geojson")]
    snapshot: PathBuf,

    /// Filter as JSON, e.g. `{"years":[2023,2024],"location":"all"}`.
    #[arg(long, default_value = "{}")]
    filters: String,

    /// Skip the result cache entirely.
    #[arg(long)]
    no_cache: bool,

    /// Reference time (RFC 3339) for recency weighting.
    #[arg(long)]
    now: Option<String>,
}

/// Top-level subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Cluster the snapshot and print the `GeoJSON` report.
    Run {
        #[command(flatten)]
        analysis: AnalysisArgs,

        /// Also write the ranked cluster summaries to this JSON file.
        #[arg(long)]
        summaries: Option<PathBuf>,
    },

    /// Print mobile alerts for the alert-worthy clusters.
    Alerts {
        #[command(flatten)]
        analysis: AnalysisArgs,
    },

    /// Print the cache key for a filter under the loaded configuration.
    CacheKey {
        /// Filter as JSON.
        #[arg(long, default_value = "{}")]
        filters: String,
    },

    /// Delete expired entries from the cache directory.
    EvictCache,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let multi = progress::init_logger(cli.quiet);

    match execute(&cli, &multi) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            println!("{}", error_payload(&e.to_string()));
            ExitCode::FAILURE
        }
    }
}

fn execute(cli: &Cli, multi: &MultiProgress) -> Result<(), Box<dyn std::error::Error>> {
    match &cli.command {
        Commands::Run {
            analysis,
            summaries,
        } => cmd_run(cli, multi, analysis, summaries.as_deref()),
        Commands::Alerts { analysis } => cmd_alerts(cli, multi, analysis),
        Commands::CacheKey { filters } => {
            let pipeline = HotspotPipeline::new(load_config(cli.config.as_deref())?)?;
            println!("{}", pipeline.cache_key(&parse_filters(filters)?)?);
            Ok(())
        }
        Commands::EvictCache => cmd_evict_cache(cli),
    }
}

/// Runs the analysis and prints the report.
fn cmd_run(
    cli: &Cli,
    multi: &MultiProgress,
    analysis: &AnalysisArgs,
    summaries_path: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let (pipeline, source, filter) = prepare(cli, multi, analysis)?;
    let outcome = pipeline.run(&source, &filter, Utc::now())?;

    if !outcome.no_data {
        let summaries = outcome.summaries()?;
        log_top_clusters(&summaries);
        if let Some(path) = summaries_path {
            write_atomic(path, &serde_json::to_string_pretty(&summaries)?)?;
            log::info!("Wrote {} cluster summaries to {}", summaries.len(), path.display());
        }
    }

    println!("{}", outcome.payload);
    Ok(())
}

/// Runs the analysis and prints the alerts.
fn cmd_alerts(
    cli: &Cli,
    multi: &MultiProgress,
    analysis: &AnalysisArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let (pipeline, source, filter) = prepare(cli, multi, analysis)?;
    let outcome = pipeline.run(&source, &filter, Utc::now())?;
    let alerts = pipeline.alerts(&outcome)?;

    log::info!("{} alert-worthy clusters", alerts.len());
    println!("{}", serde_json::to_string_pretty(&alerts)?);
    Ok(())
}

fn cmd_evict_cache(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(cli.config.as_deref())?;
    let cache = ResultCache::new(FileStore::new(&cli.cache_dir), config.cache.ttl_secs);
    let removed = cache.evict_expired(Utc::now())?;

    println!("{}", serde_json::json!({ "evicted": removed }));
    Ok(())
}

/// Builds the pipeline, snapshot source, and filter for an analysis run.
fn prepare(
    cli: &Cli,
    multi: &MultiProgress,
    analysis: &AnalysisArgs,
) -> Result<(HotspotPipeline, GeoJsonFileSource, FilterDescriptor), Box<dyn std::error::Error>> {
    let mut config = load_config(cli.config.as_deref())?;
    if let Some(now) = &analysis.now {
        config.reference_time = Some(parse_time(now)?);
    }

    let filter = parse_filters(&analysis.filters)?;
    let source = GeoJsonFileSource::new(&analysis.snapshot, config.fields.clone());
    let use_cache = config.cache.enabled && !analysis.no_cache;
    let ttl_secs = config.cache.ttl_secs;

    let mut pipeline = HotspotPipeline::new(config)?
        .with_progress(IndicatifProgress::stages_bar(multi, "Analyzing"));
    if use_cache {
        pipeline = pipeline.with_cache(ResultCache::new(FileStore::new(&cli.cache_dir), ttl_secs));
    } else {
        log::debug!("Result cache disabled");
    }

    Ok((pipeline, source, filter))
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig, Box<dyn std::error::Error>> {
    match path {
        Some(path) => {
            log::info!("Loading configuration from {}", path.display());
            Ok(EngineConfig::load(path)?)
        }
        None => Ok(EngineConfig::default()),
    }
}

fn parse_filters(text: &str) -> Result<FilterDescriptor, Box<dyn std::error::Error>> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(FilterDescriptor::default());
    }
    serde_json::from_str(text).map_err(|e| format!("Invalid filter JSON: {e}").into())
}

fn parse_time(text: &str) -> Result<DateTime<Utc>, Box<dyn std::error::Error>> {
    DateTime::parse_from_rfc3339(text)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| format!("Invalid --now value {text:?}: {e}").into())
}

fn error_payload(message: &str) -> serde_json::Value {
    serde_json::json!({
        "type": "FeatureCollection",
        "features": [],
        "error": message,
    })
}

fn log_top_clusters(summaries: &[ClusterSummary]) {
    if summaries.is_empty() {
        log::info!("No clusters found");
        return;
    }

    log::info!("Top {} most dangerous clusters:", summaries.len().min(10));
    for (rank, c) in summaries.iter().take(10).enumerate() {
        log::info!(
            "{:2}. Cluster {}: {} accidents, danger={:.4}, recent={}, trend={:+.4}",
            rank + 1,
            c.cluster_id,
            c.accident_count,
            c.danger_score,
            c.recent_accidents,
            c.avg_trend_score
        );
    }
}

/// Writes `contents` to a fresh temporary sibling and renames it into
/// place.
fn write_atomic(path: &Path, contents: &str) -> std::io::Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent)?;

    let mut tmp = NamedTempFile::new_in(parent)?;
    tmp.write_all(contents.as_bytes())?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_cli_arguments() {
        let cli = Cli::try_parse_from([
            "hotspot",
            "run",
            "--snapshot",
            "points.geojson",
            "--filters",
            r#"{"years":[2024]}"#,
            "--no-cache",
            "--cache-dir",
            "/tmp/hotspot-cache",
        ])
        .unwrap();

        assert_eq!(cli.cache_dir, PathBuf::from("/tmp/hotspot-cache"));
        let Commands::Run { analysis, summaries } = cli.command else {
            panic!("expected run");
        };
        assert_eq!(analysis.snapshot, PathBuf::from("points.geojson"));
        assert!(analysis.no_cache);
        assert!(summaries.is_none());
    }

    #[test]
    fn blank_filters_mean_no_constraint() {
        assert_eq!(parse_filters("  ").unwrap(), FilterDescriptor::default());
        assert_eq!(
            parse_filters(r#"{"location":"all"}"#).unwrap().normalized(),
            FilterDescriptor::default()
        );
        assert!(parse_filters("{years").is_err());
    }

    #[test]
    fn parses_reference_time() {
        let t = parse_time("2024-06-01T08:00:00+08:00").unwrap();
        assert_eq!(t.to_rfc3339(), "2024-06-01T00:00:00+00:00");
        assert!(parse_time("yesterday").is_err());
    }

    #[test]
    fn error_payload_is_an_empty_collection() {
        let payload = error_payload("Snapshot is not GeoJSON");
        assert_eq!(payload["type"], "FeatureCollection");
        assert!(payload["features"].as_array().unwrap().is_empty());
        assert_eq!(payload["error"], "Snapshot is not GeoJSON");
    }

    #[test]
    fn atomic_write_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("summaries.json");

        write_atomic(&path, "[]").unwrap();
        write_atomic(&path, "[1]").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "[1]");
        assert_eq!(std::fs::read_dir(dir.path().join("out")).unwrap().count(), 1);
    }
}
