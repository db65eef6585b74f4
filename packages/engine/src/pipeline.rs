//! End-to-end analysis run.
//!
//! [`HotspotPipeline::run`] is the entry point used by the CLI: it derives
//! the cache key, answers from the cache when it can, and otherwise loads
//! the snapshot, runs every stage, serializes the report, and caches it.
//! [`HotspotPipeline::analyze`] runs the stages on records already in
//! memory.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use geojson::FeatureCollection;
use hotspot_cache::{ResultCache, cache_key, scoped_cache_key};
use hotspot_engine_models::{
    CacheConfig, ClusterSummary, EngineConfig, MobileAlert, RunStats,
};
use hotspot_incident_models::{ClusterId, FilterDescriptor, IncidentRecord, NOISE_CLUSTER};
use hotspot_snapshot::PointSource;

use crate::density::{DensityClusterer, Hdbscan};
use crate::filter::{FilterOutcome, apply_filter};
use crate::primary::{count_clusters, primary_cluster};
use crate::progress::{ProgressCallback, null_progress};
use crate::prune::{prune_outliers, renumber};
use crate::refine::refine_oversized;
use crate::report::{self, NO_MATCHING_DATA};
use crate::score::{mobile_alerts, score_clusters};
use crate::temporal::temporal_weights;
use crate::trend::trend_scores;
use crate::{EngineError, RecordColumns};

/// Stages reported through the progress callback.
const STAGES: u64 = 7;

/// The result of analyzing one working set.
#[derive(Debug, Clone)]
pub struct Analysis {
    /// The working set, in snapshot order.
    pub records: Vec<IncidentRecord>,
    /// Temporal weight per record.
    pub weights: Vec<f64>,
    /// Trend score per record.
    pub trends: Vec<f64>,
    /// Final dense cluster id per record.
    pub labels: Vec<ClusterId>,
    /// Cluster summaries in ranking order.
    pub summaries: Vec<ClusterSummary>,
    /// Run counters.
    pub stats: RunStats,
}

impl Analysis {
    /// Borrowed view of the per-record columns.
    #[must_use]
    pub fn columns(&self) -> RecordColumns<'_> {
        RecordColumns {
            records: &self.records,
            weights: &self.weights,
            trends: &self.trends,
        }
    }

    /// Builds the `GeoJSON` report.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Json`] if a summary cannot be serialized.
    pub fn to_report(&self) -> Result<FeatureCollection, EngineError> {
        report::build_report(self.columns(), &self.labels, &self.summaries, &self.stats)
    }
}

/// The outcome of [`HotspotPipeline::run`].
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Cache key of the normalized filter.
    pub cache_key: String,
    /// The serialized `GeoJSON` report.
    pub payload: String,
    /// `false` when the payload came from the cache.
    pub computed: bool,
    /// Whether the report is a no-data report.
    pub no_data: bool,
    /// The in-memory analysis, when one was computed.
    pub analysis: Option<Analysis>,
}

impl RunOutcome {
    /// Cluster summaries in ranking order, always read back from the
    /// payload so cached and computed outcomes yield identical values.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] if the payload is not a valid report.
    pub fn summaries(&self) -> Result<Vec<ClusterSummary>, EngineError> {
        report::summaries_from_report(&report::parse_report(&self.payload)?)
    }
}

/// Runs hotspot analyses with a fixed configuration.
pub struct HotspotPipeline {
    config: EngineConfig,
    clusterer: Box<dyn DensityClusterer>,
    cache: Option<ResultCache>,
    progress: Arc<dyn ProgressCallback>,
}

impl std::fmt::Debug for HotspotPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HotspotPipeline")
            .field("config", &self.config)
            .field("clusterer", &self.clusterer.name())
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

impl HotspotPipeline {
    /// Creates a pipeline using [`Hdbscan`], no cache, and no progress
    /// reporting.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Config`] if `config` is invalid.
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self {
            config,
            clusterer: Box::new(Hdbscan),
            cache: None,
            progress: null_progress(),
        })
    }

    /// Replaces the density clusterer.
    #[must_use]
    pub fn with_clusterer(mut self, clusterer: impl DensityClusterer + 'static) -> Self {
        self.clusterer = Box::new(clusterer);
        self
    }

    /// Enables result caching.
    #[must_use]
    pub fn with_cache(mut self, cache: ResultCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Routes stage progress to `progress`.
    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }

    /// The engine configuration.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The result cache, if enabled.
    #[must_use]
    pub const fn cache(&self) -> Option<&ResultCache> {
        self.cache.as_ref()
    }

    /// The reference time for weighting and recency: the configured pinned
    /// time, or `wall_clock`.
    #[must_use]
    pub fn reference_time(&self, wall_clock: DateTime<Utc>) -> DateTime<Utc> {
        self.config.reference_time.unwrap_or(wall_clock)
    }

    /// The cache key for `filter` under this pipeline's configuration.
    ///
    /// With the default configuration the key depends on the filter alone.
    /// A pinned reference time or any changed analysis setting is hashed
    /// into the key, so a run never reuses results computed under another
    /// "now" or other parameters. Cache policy settings do not affect it.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Cache`] if the key cannot be derived.
    pub fn cache_key(&self, filter: &FilterDescriptor) -> Result<String, EngineError> {
        let scope = EngineConfig {
            cache: CacheConfig::default(),
            ..self.config.clone()
        };
        if scope == EngineConfig::default() {
            Ok(cache_key(filter)?)
        } else {
            Ok(scoped_cache_key(filter, &scope)?)
        }
    }

    /// Runs a full analysis for `filter`, consulting and updating the
    /// cache.
    ///
    /// `now` is the wall-clock time, used for cache expiry and, unless a
    /// reference time is pinned in the configuration, for weighting.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] if the snapshot cannot be read, the cache
    /// fails, or a stage rejects its input. Nothing is cached on error.
    pub fn run(
        &self,
        source: &dyn PointSource,
        filter: &FilterDescriptor,
        now: DateTime<Utc>,
    ) -> Result<RunOutcome, EngineError> {
        let key = self.cache_key(filter)?;

        if let Some(cache) = &self.cache
            && let Some(payload) = cache.get(&key, now)?
        {
            log::info!("Using cached result {key}");
            return Ok(RunOutcome {
                cache_key: key,
                payload,
                computed: false,
                no_data: false,
                analysis: None,
            });
        }

        let reference = self.reference_time(now);
        log::info!("Loading {}", source.describe());
        let Some(snapshot) = source.load(reference)? else {
            let reason = format!("Snapshot not found: {}", source.describe());
            return Self::no_data(key, &reason);
        };
        let dropped = snapshot.stats.dropped();

        let Some(mut analysis) = self.analyze(snapshot.records, filter, reference)? else {
            return Self::no_data(key, NO_MATCHING_DATA);
        };
        analysis.stats.dropped_records = dropped;

        let payload = serde_json::to_string(&analysis.to_report()?)?;

        if let Some(cache) = &self.cache {
            cache.put(&key, &payload, now)?;
            log::debug!("Cached result under {key}");
        }

        Ok(RunOutcome {
            cache_key: key,
            payload,
            computed: true,
            no_data: false,
            analysis: Some(analysis),
        })
    }

    fn no_data(cache_key: String, reason: &str) -> Result<RunOutcome, EngineError> {
        Ok(RunOutcome {
            cache_key,
            payload: serde_json::to_string(&report::no_data_report(reason))?,
            computed: true,
            no_data: true,
            analysis: None,
        })
    }

    /// Runs every stage over `records` without touching the cache.
    ///
    /// Returns `Ok(None)` when the filter leaves no records.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] if a stage rejects its input.
    pub fn analyze(
        &self,
        records: Vec<IncidentRecord>,
        filter: &FilterDescriptor,
        now: DateTime<Utc>,
    ) -> Result<Option<Analysis>, EngineError> {
        let progress = &self.progress;
        progress.set_total(STAGES);
        progress.set_position(0);

        let snapshot_records = records.len();
        progress.set_message("Filtering".to_string());
        let working = match apply_filter(records, filter) {
            FilterOutcome::Empty => {
                log::info!("No records match the filter");
                progress.finish_and_clear();
                return Ok(None);
            }
            FilterOutcome::Working(working) => working,
        };
        progress.inc(1);

        progress.set_message("Weighting by recency".to_string());
        let weights = temporal_weights(&working, now, &self.config.temporal);
        progress.inc(1);

        progress.set_message("Estimating trends".to_string());
        let trends = trend_scores(&working, &self.config.trend);
        progress.inc(1);

        let columns = RecordColumns {
            records: &working,
            weights: &weights,
            trends: &trends,
        };

        progress.set_message("Clustering".to_string());
        let primary = primary_cluster(&working, &self.config.primary, self.clusterer.as_ref())?;
        let primary_clusters = primary.cluster_count();
        progress.inc(1);

        progress.set_message("Splitting oversized clusters".to_string());
        let refined = refine_oversized(
            primary.labels,
            columns,
            primary.subcluster_threshold,
            &self.config.subcluster,
            self.clusterer.as_ref(),
        )?;
        progress.inc(1);

        progress.set_message("Pruning outliers".to_string());
        let pruned = prune_outliers(refined.labels, &working, &self.config.outliers);
        let outliers_removed = pruned.total_removed();
        let labels = renumber(pruned.labels);
        progress.inc(1);

        progress.set_message("Scoring".to_string());
        let summaries = score_clusters(&labels, columns, now, &self.config.scoring);
        progress.inc(1);

        let stats = RunStats {
            snapshot_records,
            dropped_records: 0,
            working_set: working.len(),
            primary_clusters,
            subclustered: refined.split_clusters,
            outliers_removed,
            clusters: count_clusters(&labels),
            noise: labels.iter().filter(|&&l| l == NOISE_CLUSTER).count(),
        };
        log::info!(
            "Found {} hotspots in {} records ({} noise, {} outliers pruned, {} split)",
            stats.clusters,
            stats.working_set,
            stats.noise,
            stats.outliers_removed,
            stats.subclustered
        );
        progress.finish(format!("{} hotspots", stats.clusters));

        Ok(Some(Analysis {
            records: working,
            weights,
            trends,
            labels,
            summaries,
            stats,
        }))
    }

    /// Mobile alerts for the alert-worthy clusters of `outcome`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] if a cached payload is not a valid report.
    pub fn alerts(&self, outcome: &RunOutcome) -> Result<Vec<MobileAlert>, EngineError> {
        Ok(mobile_alerts(&outcome.summaries()?, &self.config.scoring))
    }
}
