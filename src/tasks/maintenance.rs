//! Maintenance Tasks
//!
//! Background jobs that keep both tiers healthy: periodic expired-entry
//! sweeps, cache reports, slow-query analysis, and the on-demand full
//! optimization sequence over the durable store.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::cache::CacheService;
use crate::config::CacheConfig;
use crate::query::QueryAnalyzer;
use crate::store::SqliteStore;

// == Job Guard ==
/// Re-entrancy guard: a job invocation that finds the previous run still
/// executing skips instead of stacking up.
#[derive(Debug, Default)]
struct JobGuard {
    running: AtomicBool,
}

impl JobGuard {
    /// Claims the job. Returns false if a prior run is still active.
    fn try_start(&self) -> bool {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn finish(&self) {
        self.running.store(false, Ordering::Release);
    }
}

// == Maintenance Scheduler ==
/// Owns the spawned maintenance tasks; aborting them is the shutdown path.
///
/// Jobs are independent timers. A job failure is logged and the job waits
/// for its next scheduled run; nothing here can crash the process.
pub struct MaintenanceScheduler {
    handles: Vec<JoinHandle<()>>,
}

impl MaintenanceScheduler {
    // == Start ==
    /// Spawns the sweep, report and analysis loops with the intervals from
    /// the service configuration.
    pub fn start(service: Arc<CacheService>, analyzer: Arc<QueryAnalyzer>) -> Self {
        let config = service.config().clone();
        let handles = vec![
            spawn_sweep_task(service.clone(), config.sweep_interval_secs),
            spawn_report_task(service, config.report_interval_secs),
            spawn_analysis_task(analyzer, config.analyze_interval_secs),
        ];
        info!("maintenance scheduler started");
        Self { handles }
    }

    // == Shutdown ==
    /// Aborts every background task.
    pub fn shutdown(&mut self) {
        for handle in self.handles.drain(..) {
            handle.abort();
        }
        info!("maintenance scheduler stopped");
    }
}

impl Drop for MaintenanceScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// == Sweep Task ==
/// Spawns the periodic expired-entry sweep over both tiers.
pub fn spawn_sweep_task(service: Arc<CacheService>, interval_secs: u64) -> JoinHandle<()> {
    let interval = Duration::from_secs(interval_secs);
    let guard = JobGuard::default();

    tokio::spawn(async move {
        info!(interval_secs, "expiry sweep task started");
        loop {
            tokio::time::sleep(interval).await;
            if !guard.try_start() {
                warn!("expiry sweep still running, skipping this tick");
                continue;
            }

            let (from_memory, from_store) = service.sweep_expired().await;
            if from_memory + from_store > 0 {
                info!(from_memory, from_store, "expiry sweep removed entries");
            } else {
                debug!("expiry sweep found nothing to remove");
            }
            guard.finish();
        }
    })
}

// == Report Task ==
/// Spawns the periodic cache report: hit rate and memory occupancy.
pub fn spawn_report_task(service: Arc<CacheService>, interval_secs: u64) -> JoinHandle<()> {
    let interval = Duration::from_secs(interval_secs);
    let guard = JobGuard::default();

    tokio::spawn(async move {
        info!(interval_secs, "cache report task started");
        loop {
            tokio::time::sleep(interval).await;
            if !guard.try_start() {
                warn!("cache report still running, skipping this tick");
                continue;
            }

            let stats = service.stats().await;
            info!(
                hits = stats.hits,
                misses = stats.misses,
                evictions = stats.evictions,
                hit_rate = format!("{:.1}%", stats.hit_rate() * 100.0),
                memory_usage = format!("{:.1}%", stats.memory_usage() * 100.0),
                memory_entries = stats.memory_entries,
                "cache report"
            );
            guard.finish();
        }
    })
}

// == Analysis Task ==
/// Spawns the periodic slow-query analysis, logging advisory findings.
pub fn spawn_analysis_task(analyzer: Arc<QueryAnalyzer>, interval_secs: u64) -> JoinHandle<()> {
    let interval = Duration::from_secs(interval_secs);
    let guard = JobGuard::default();

    tokio::spawn(async move {
        info!(interval_secs, "slow-query analysis task started");
        loop {
            tokio::time::sleep(interval).await;
            if !guard.try_start() {
                warn!("slow-query analysis still running, skipping this tick");
                continue;
            }

            match analyzer.analyze(20).await {
                Ok(suggestions) if suggestions.is_empty() => {
                    debug!("no slow query patterns recorded");
                }
                Ok(suggestions) => {
                    for suggestion in suggestions {
                        warn!(
                            pattern = %suggestion.pattern,
                            occurrences = suggestion.occurrences,
                            avg_ms = format!("{:.1}", suggestion.avg_duration_ms),
                            advice = ?suggestion.advice,
                            "slow query pattern"
                        );
                    }
                }
                Err(err) => error!(%err, "slow-query analysis failed"),
            }
            guard.finish();
        }
    })
}

// == Full Optimization ==
/// Per-step outcome of a full optimization run.
#[derive(Debug, Clone, Serialize)]
pub struct StepResult {
    pub name: String,
    pub ok: bool,
    pub detail: String,
}

/// Outcome of the backup → cleanup → vacuum → reindex → analyze sequence.
#[derive(Debug, Serialize, Default)]
pub struct OptimizationReport {
    pub steps: Vec<StepResult>,
    /// True when the backup failed and the remaining steps never ran
    pub aborted: bool,
    pub backup_path: Option<PathBuf>,
}

/// Runs the on-demand optimization sequence against the durable store.
///
/// The backup runs first and a backup failure aborts everything after it,
/// so no destructive step runs without a fresh snapshot. Later steps are
/// independent: a failed vacuum still lets reindex and analyze run.
pub async fn run_full_optimization(
    store: &SqliteStore,
    config: &CacheConfig,
) -> OptimizationReport {
    let mut report = OptimizationReport::default();
    info!("full optimization started");

    match store
        .backup(Path::new(&config.backup_dir))
        .await
        .context("backup failed")
    {
        Ok(path) => {
            report.steps.push(StepResult {
                name: "backup".to_string(),
                ok: true,
                detail: path.display().to_string(),
            });
            report.backup_path = Some(path);
        }
        Err(err) => {
            error!(%err, "backup failed, aborting optimization sequence");
            report.steps.push(StepResult {
                name: "backup".to_string(),
                ok: false,
                detail: format!("{:#}", err),
            });
            report.aborted = true;
            return report;
        }
    }

    let cleanup = store
        .cleanup(config.retention_days)
        .await
        .map(|counts| {
            format!(
                "{} expired entries, {} stale slow-query records",
                counts.expired_entries, counts.stale_slow_queries
            )
        })
        .context("cleanup failed");
    push_step(&mut report, "cleanup", cleanup);

    let vacuum = store
        .vacuum()
        .await
        .map(|_| "space reclaimed".to_string())
        .context("vacuum failed");
    push_step(&mut report, "vacuum", vacuum);

    let reindex = store
        .reindex()
        .await
        .map(|_| "indexes rebuilt".to_string())
        .context("reindex failed");
    push_step(&mut report, "reindex", reindex);

    let analyze = store
        .analyze()
        .await
        .map(|_| "statistics refreshed".to_string())
        .context("analyze failed");
    push_step(&mut report, "analyze", analyze);

    info!(
        steps_ok = report.steps.iter().filter(|s| s.ok).count(),
        steps_total = report.steps.len(),
        "full optimization finished"
    );
    report
}

fn push_step(report: &mut OptimizationReport, name: &str, outcome: anyhow::Result<String>) {
    match outcome {
        Ok(detail) => report.steps.push(StepResult {
            name: name.to_string(),
            ok: true,
            detail,
        }),
        Err(err) => {
            warn!(step = name, %err, "optimization step failed, continuing");
            report.steps.push(StepResult {
                name: name.to_string(),
                ok: false,
                detail: format!("{:#}", err),
            });
        }
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheOptions;
    use crate::config::CacheConfig;
    use serde_json::json;
    use tempfile::TempDir;

    async fn temp_service(dir: &TempDir) -> Arc<CacheService> {
        let config = CacheConfig {
            db_path: dir.path().join("maint.db").to_string_lossy().into_owned(),
            backup_dir: dir.path().join("backups").to_string_lossy().into_owned(),
            ..Default::default()
        };
        Arc::new(CacheService::init(config).await.unwrap())
    }

    #[test]
    fn test_job_guard_blocks_reentry() {
        let guard = JobGuard::default();

        assert!(guard.try_start());
        assert!(!guard.try_start());

        guard.finish();
        assert!(guard.try_start());
    }

    #[tokio::test]
    async fn test_sweep_task_removes_expired_entries() {
        let dir = TempDir::new().unwrap();
        let service = temp_service(&dir).await;

        service
            .set("dying", &json!(1), CacheOptions::default().ttl_seconds(1))
            .await;

        let handle = spawn_sweep_task(service.clone(), 1);
        tokio::time::sleep(Duration::from_millis(2500)).await;

        let got: Option<serde_json::Value> = service.get("dying", "default").await;
        assert!(got.is_none());
        assert_eq!(service.store().entry_count().await.unwrap(), 0);

        handle.abort();
    }

    #[tokio::test]
    async fn test_sweep_task_preserves_valid_entries() {
        let dir = TempDir::new().unwrap();
        let service = temp_service(&dir).await;

        service
            .set("long_lived", &json!("v"), CacheOptions::default().ttl_seconds(3600))
            .await;

        let handle = spawn_sweep_task(service.clone(), 1);
        tokio::time::sleep(Duration::from_millis(1500)).await;

        let got: Option<serde_json::Value> = service.get("long_lived", "default").await;
        assert_eq!(got.unwrap(), json!("v"));

        handle.abort();
    }

    #[tokio::test]
    async fn test_scheduler_tasks_can_be_stopped() {
        let dir = TempDir::new().unwrap();
        let service = temp_service(&dir).await;
        let analyzer = Arc::new(QueryAnalyzer::new(service.store()));

        let mut scheduler = MaintenanceScheduler::start(service, analyzer);
        scheduler.shutdown();

        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    #[tokio::test]
    async fn test_full_optimization_runs_every_step() {
        let dir = TempDir::new().unwrap();
        let service = temp_service(&dir).await;

        service.set("a", &json!(1), CacheOptions::default()).await;
        let report = run_full_optimization(&service.store(), service.config()).await;

        assert!(!report.aborted);
        assert_eq!(report.steps.len(), 5);
        assert!(report.steps.iter().all(|s| s.ok));
        assert!(report.backup_path.as_ref().unwrap().exists());
    }

    #[tokio::test]
    async fn test_backup_failure_aborts_sequence() {
        let dir = TempDir::new().unwrap();
        let config = CacheConfig {
            db_path: dir.path().join("maint.db").to_string_lossy().into_owned(),
            // A file path cannot serve as the backup directory
            backup_dir: dir.path().join("maint.db").to_string_lossy().into_owned(),
            ..Default::default()
        };
        let service = Arc::new(CacheService::init(config).await.unwrap());

        let report = run_full_optimization(&service.store(), service.config()).await;

        assert!(report.aborted);
        assert_eq!(report.steps.len(), 1);
        assert!(!report.steps[0].ok);
    }
}
