//! Consolidation worker: a tokio ticker that periodically sweeps storage to
//! keep handoff aggregates fresh, expire capsules, synthesize reflections,
//! and enforce retention. Every tick is bookkept in `consolidation_jobs` so
//! the sweep is observable and safe to interrupt.

use amc_core::{Config, CoreError};
use amc_handoff::{generate_reflection, refresh_metadata, REFLECTION_THRESHOLD};
use amc_storage::Store;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const MAX_TICK_ATTEMPTS: u32 = 5;
const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(300);

#[derive(Debug, Default, Clone, PartialEq)]
struct ConsolidationReport {
    tenants_swept: u32,
    pairs_refreshed: u32,
    reflections_generated: u32,
    capsules_expired: u32,
    audit_rows_purged: u32,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();
    let config = Config::from_env();
    info!(db_dsn = %config.db_dsn, interval_secs = config.consolidation_interval_seconds, "amc-worker starting");
    let store = Store::open(&config.db_dsn)?;

    let mut ticker = tokio::time::interval(config.consolidation_interval());
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                run_tick_with_retry(&store, &config).await;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown signal received, stopping amc-worker");
                break;
            }
        }
    }
    Ok(())
}

/// Runs one consolidation tick, retrying with exponential backoff on
/// failure. Exhausting retries does not stop the worker: the failure is
/// logged and surfaced via metrics, and the next scheduled tick proceeds.
async fn run_tick_with_retry(store: &Store, config: &Config) {
    let mut backoff = INITIAL_BACKOFF;
    for attempt in 1..=MAX_TICK_ATTEMPTS {
        let now_ts = now_micros();
        match run_consolidation_tick(store, config, now_ts) {
            Ok(report) => {
                info!(
                    tenants_swept = report.tenants_swept,
                    pairs_refreshed = report.pairs_refreshed,
                    reflections_generated = report.reflections_generated,
                    capsules_expired = report.capsules_expired,
                    audit_rows_purged = report.audit_rows_purged,
                    attempt,
                    "consolidation tick succeeded"
                );
                metrics::counter!("amc_worker_consolidation_succeeded_total").increment(1);
                return;
            }
            Err(err) => {
                warn!(attempt, error = %err, "consolidation tick failed");
                metrics::counter!("amc_worker_consolidation_retry_total").increment(1);
                if attempt == MAX_TICK_ATTEMPTS {
                    error!(attempts = attempt, error = %err, "consolidation tick exhausted retries");
                    metrics::counter!("amc_worker_consolidation_exhausted_total").increment(1);
                    return;
                }
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(MAX_BACKOFF);
            }
        }
    }
}

/// One full sweep: metadata refresh, reflection synthesis, capsule
/// expiry, retention. Idempotent — safe to re-run on the next tick if a
/// prior run failed partway through.
fn run_consolidation_tick(store: &Store, config: &Config, now_ts: i64) -> Result<ConsolidationReport, CoreError> {
    let job_id = amc_core::ids::new_job_id();
    store.start_consolidation_job(&job_id, "consolidation", now_ts)?;

    let result = sweep(store, config, now_ts);

    let finished_at = now_micros();
    match &result {
        Ok(report) => {
            let processed = report.pairs_refreshed + report.capsules_expired + report.audit_rows_purged;
            store.finish_consolidation_job(&job_id, finished_at, processed, None)?;
        }
        Err(err) => {
            store.finish_consolidation_job(&job_id, finished_at, 0, Some(&err.to_string()))?;
        }
    }
    result
}

fn sweep(store: &Store, config: &Config, now_ts: i64) -> Result<ConsolidationReport, CoreError> {
    let mut report = ConsolidationReport::default();

    // 1 & 3: refresh aggregates and synthesize reflections per active pair.
    let tenants = store.distinct_handoff_tenants()?;
    for tenant_id in &tenants {
        report.tenants_swept += 1;
        let with_whom_list = store.distinct_with_whom(tenant_id)?;
        for with_whom in &with_whom_list {
            refresh_metadata(store, tenant_id, with_whom)?;
            report.pairs_refreshed += 1;

            let unconsolidated_count = store.unconsolidated_handoffs(tenant_id, with_whom)?.len();
            if unconsolidated_count >= REFLECTION_THRESHOLD
                && generate_reflection(store, tenant_id, with_whom, now_ts)?
            {
                report.reflections_generated += 1;
            }
        }
    }

    // 2: expire capsules past their ttl.
    report.capsules_expired = store.expire_capsules(now_ts)? as u32;

    // 4: retention — purge audit log rows past the configured window.
    let retention_micros = i64::from(config.retention_audit_days) * 24 * 3600 * 1_000_000;
    let cutoff_ts = now_ts.saturating_sub(retention_micros);
    report.audit_rows_purged = store.purge_audit_log_before(cutoff_ts)? as u32;

    Ok(report)
}

fn now_micros() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_micros() as i64
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use amc_core::{CompressionLevel, HandoffInput};

    fn sample_input(with_whom: &str) -> HandoffInput {
        HandoffInput {
            with_whom: with_whom.to_string(),
            session_id: "s1".to_string(),
            experienced: "paired on the migration".to_string(),
            noticed: "tests were flaky".to_string(),
            learned: "retry the flaky suite before blaming the change".to_string(),
            story: "a long day of migration work".to_string(),
            becoming: "more careful about flaky test triage".to_string(),
            remember: "check CI twice before merging".to_string(),
            significance: 0.6,
            tags: vec!["migration".to_string()],
            compression_level: CompressionLevel::Full,
            influenced_by: None,
        }
    }

    #[test]
    fn sweep_refreshes_metadata_and_expires_capsules() {
        let store = Store::open_in_memory().expect("open store");
        amc_handoff::create_handoff(&store, "t1", sample_input("agent-a"), 1_000).unwrap();
        amc_handoff::create_handoff(&store, "t1", sample_input("agent-a"), 2_000).unwrap();

        let config = Config::default();
        let report = sweep(&store, &config, 10_000).unwrap();
        assert_eq!(report.tenants_swept, 1);
        assert_eq!(report.pairs_refreshed, 1);
        assert!(store.handoff_metadata("t1", "agent-a").unwrap().is_some());
    }

    #[test]
    fn sweep_is_idempotent() {
        let store = Store::open_in_memory().expect("open store");
        amc_handoff::create_handoff(&store, "t1", sample_input("agent-a"), 1_000).unwrap();
        let config = Config::default();
        sweep(&store, &config, 10_000).unwrap();
        let second = sweep(&store, &config, 20_000).unwrap();
        assert_eq!(second.pairs_refreshed, 1);
    }

    #[test]
    fn sweep_generates_reflection_once_threshold_reached() {
        let store = Store::open_in_memory().expect("open store");
        for i in 0..5 {
            amc_handoff::create_handoff(&store, "t1", sample_input("agent-a"), 1_000 + i).unwrap();
        }
        let config = Config::default();
        let report = sweep(&store, &config, 100_000).unwrap();
        assert_eq!(report.reflections_generated, 1);
        assert!(store.reflection("t1", "agent-a").unwrap().is_some());
    }

    #[test]
    fn run_consolidation_tick_records_job_bookkeeping() {
        let store = Store::open_in_memory().expect("open store");
        let config = Config::default();
        run_consolidation_tick(&store, &config, 1_000).unwrap();
    }
}
