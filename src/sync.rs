//! Run orchestration: list, merge, fetch detail, wait out rate limits.

use std::future::Future;
use std::time::{Duration, Instant};

use log::{info, warn};

use crate::dataset::Dataset;
use crate::error::Result;
use crate::fetcher::fetch_summaries_since;
use crate::http::ActivitySource;
use crate::merge::{fetch_missing_details, merge_summaries, needs_detail_fetch, DetailFetchOutcome};
use crate::store::DatasetStore;

/// Pause after a rate limit. Just over the provider's 15-minute window.
pub const RATE_LIMIT_PAUSE: Duration = Duration::from_secs(950);

pub const DEFAULT_MAX_RATE_LIMIT_PAUSES: u32 = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOptions {
    pub rate_limit_pause: Duration,
    /// Rate-limit pauses allowed before the run gives up (0 = stop at the first)
    pub max_rate_limit_pauses: u32,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            rate_limit_pause: RATE_LIMIT_PAUSE,
            max_rate_limit_pauses: DEFAULT_MAX_RATE_LIMIT_PAUSES,
        }
    }
}

/// How a run ended. None of these are failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    /// New details were fetched and saved
    Complete,
    /// Nothing to fetch; the dataset file was not touched
    NoNewData,
    /// Out of rate-limit pauses. Progress up to the last limit is saved.
    RateLimited,
    /// Shutdown requested before the run finished
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub status: SyncStatus,
    /// Ids listed this run that were not in the stored dataset
    pub new_activities: usize,
    /// Records that gained a path (or `no_data`) this run
    pub details_resolved: usize,
    pub rate_limit_pauses: u32,
    /// The activity listing itself was cut short by a rate limit
    pub listing_rate_limited: bool,
    pub total_activities: usize,
}

/// Drives one synchronization run against a source and a store.
pub struct Synchronizer<'a, S, D> {
    source: &'a S,
    store: &'a D,
    options: SyncOptions,
}

impl<'a, S, D> Synchronizer<'a, S, D>
where
    S: ActivitySource,
    D: DatasetStore,
{
    pub fn new(source: &'a S, store: &'a D, options: SyncOptions) -> Self {
        Self {
            source,
            store,
            options,
        }
    }

    /// Run to completion with no external shutdown signal.
    pub async fn run(&self) -> Result<SyncReport> {
        self.run_until(std::future::pending::<()>()).await
    }

    /// Run until done, or until `shutdown` resolves.
    ///
    /// `shutdown` is watched for the whole run: listing, detail fetching and
    /// rate-limit pauses. Details resolved but not yet saved when it fires
    /// are saved before returning `Cancelled`. Records are only mutated
    /// between requests, so the saved dataset is always consistent.
    pub async fn run_until<F>(&self, shutdown: F) -> Result<SyncReport>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let run_start = Instant::now();

        let previous = self.store.load()?;
        let cutoff = previous.as_ref().map_or(0, Dataset::fetch_cutoff);
        match &previous {
            Some(dataset) => info!(
                "[Sync] Found {} stored activities, looking for activities after {}",
                dataset.len(),
                cutoff
            ),
            None => info!("[Sync] No stored dataset, fetching full history"),
        }
        let previous = previous.unwrap_or_default();
        let known = previous.len();

        let batch = tokio::select! {
            biased;
            _ = &mut shutdown => {
                info!("[Sync] Shutdown requested while listing activities");
                return Ok(finish(
                    SyncReport {
                        status: SyncStatus::Cancelled,
                        new_activities: 0,
                        details_resolved: 0,
                        rate_limit_pauses: 0,
                        listing_rate_limited: false,
                        total_activities: known,
                    },
                    run_start,
                ));
            }
            batch = fetch_summaries_since(self.source, cutoff) => batch?,
        };
        let listing_rate_limited = batch.rate_limited;
        let mut dataset = merge_summaries(previous, batch.summaries);
        let new_activities = dataset.len() - known;

        let pending_at_start = pending_count(&dataset);
        let mut progress = DetailProgress {
            resolved: 0,
            pauses: 0,
            pending_at_save: pending_at_start,
        };

        let outcome = tokio::select! {
            biased;
            _ = &mut shutdown => None,
            status = self.fetch_details(&mut dataset, &mut progress) => Some(status?),
        };

        let status = match outcome {
            Some(status) => status,
            None => {
                info!("[Sync] Shutdown requested");
                if pending_count(&dataset) < progress.pending_at_save {
                    self.store.save(&dataset)?;
                    info!("[Sync] Saved details resolved before shutdown");
                }
                SyncStatus::Cancelled
            }
        };

        Ok(finish(
            SyncReport {
                status,
                new_activities,
                details_resolved: pending_at_start.saturating_sub(pending_count(&dataset)),
                rate_limit_pauses: progress.pauses,
                listing_rate_limited,
                total_activities: dataset.len(),
            },
            run_start,
        ))
    }

    /// Fetch details until none are missing, pausing on each rate limit
    /// while pauses remain.
    async fn fetch_details(
        &self,
        dataset: &mut Dataset,
        progress: &mut DetailProgress,
    ) -> Result<SyncStatus> {
        loop {
            match fetch_missing_details(dataset, self.source, self.store).await? {
                DetailFetchOutcome::Complete { resolved } => {
                    progress.resolved += resolved;
                    if resolved > 0 {
                        self.store.save(dataset)?;
                        progress.pending_at_save = pending_count(dataset);
                    }
                    return Ok(if progress.resolved > 0 {
                        SyncStatus::Complete
                    } else {
                        SyncStatus::NoNewData
                    });
                }
                DetailFetchOutcome::RateLimited { resolved, saved } => {
                    progress.resolved += resolved;
                    if saved {
                        progress.pending_at_save = pending_count(dataset);
                    }
                    if progress.pauses >= self.options.max_rate_limit_pauses {
                        warn!(
                            "[Sync] Rate limited with no pauses left ({} used)",
                            progress.pauses
                        );
                        return Ok(SyncStatus::RateLimited);
                    }
                    progress.pauses += 1;
                    info!(
                        "[Sync] Waiting {}s before retrying (pause {}/{})",
                        self.options.rate_limit_pause.as_secs(),
                        progress.pauses,
                        self.options.max_rate_limit_pauses
                    );
                    tokio::time::sleep(self.options.rate_limit_pause).await;
                }
            }
        }
    }
}

/// Detail-phase counters, readable after the phase is cancelled.
struct DetailProgress {
    /// Resolved by completed passes
    resolved: usize,
    pauses: u32,
    /// Records still needing detail as of the last save
    pending_at_save: usize,
}

fn pending_count(dataset: &Dataset) -> usize {
    dataset.iter().filter(|r| needs_detail_fetch(r)).count()
}

fn finish(report: SyncReport, run_start: Instant) -> SyncReport {
    info!(
        "[Sync] Finished: {:?}, {} new activities, {} details in {:.1}s",
        report.status,
        report.new_activities,
        report.details_resolved,
        run_start.elapsed().as_secs_f64()
    );
    report
}
