//! # Incremental Merge Engine
//!
//! Reconciles the persisted dataset with freshly listed summaries and fills
//! in per-activity path detail.
//!
//! ## Invariants
//!
//! - A dataset holds at most one record per activity id.
//! - `map_polyline` is fill-missing-only: a merge never replaces a stored
//!   path with an absent or empty one.
//! - Detail fetching skips resolved records, so re-running it after an
//!   interruption only requests what is still missing.

use std::time::Instant;

use log::{debug, info, warn};

use crate::dataset::Dataset;
use crate::error::{Result, SyncError};
use crate::http::{ActivitySource, ApiResponse};
use crate::store::DatasetStore;
use crate::types::{ActivityRecord, ActivitySummary};

/// Stored polylines at or below this length are treated as not yet fetched.
const RESOLVED_MIN_LEN: usize = 3;

// ============================================================================
// Summary Merge
// ============================================================================

/// Left-join `new` summaries onto `old`, keyed by id.
///
/// Existing records keep their fields and position; unseen ids are appended
/// in input order with no path yet.
pub fn merge_summaries(old: Dataset, new: Vec<ActivitySummary>) -> Dataset {
    merge_records(old, new.into_iter().map(ActivityRecord::new))
}

/// Merge records that may already carry a path.
///
/// For ids present in `old`, only `map_polyline` can change, and only when
/// the old value is absent or empty.
pub fn merge_records(
    mut old: Dataset,
    incoming: impl IntoIterator<Item = ActivityRecord>,
) -> Dataset {
    for record in incoming {
        match old.get_mut(record.id()) {
            Some(existing) => {
                let missing = existing.map_polyline.as_deref().map_or(true, str::is_empty);
                let has_new = record.map_polyline.as_deref().is_some_and(|p| !p.is_empty());
                if missing && has_new {
                    existing.map_polyline = record.map_polyline;
                }
            }
            None => {
                old.insert_if_absent(record);
            }
        }
    }
    old
}

/// True unless the record already holds a path or the `no_data` sentinel.
pub fn needs_detail_fetch(record: &ActivityRecord) -> bool {
    !record
        .map_polyline
        .as_deref()
        .is_some_and(|p| p.chars().count() > RESOLVED_MIN_LEN)
}

// ============================================================================
// Detail Fetch
// ============================================================================

/// Result of one pass of [`fetch_missing_details`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetailFetchOutcome {
    /// Every record that needed detail now has it
    Complete { resolved: usize },
    /// Stopped on a rate limit. `saved` is true when progress was persisted
    /// (it is skipped when `resolved` is 0).
    RateLimited { resolved: usize, saved: bool },
}

impl DetailFetchOutcome {
    pub fn resolved(&self) -> usize {
        match *self {
            DetailFetchOutcome::Complete { resolved } => resolved,
            DetailFetchOutcome::RateLimited { resolved, .. } => resolved,
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, DetailFetchOutcome::RateLimited { .. })
    }
}

/// Fetch detail for every record that needs it, in stored order.
///
/// A detail with a usable path stores it; one without stores `no_data`. On
/// a rate limit the pass stops at once and, if anything was resolved,
/// saves the dataset through `store` before returning. Any other failure,
/// including a detail answered for a different id, is returned without
/// touching the record or saving.
///
/// Saving after a complete pass is left to the caller.
pub async fn fetch_missing_details<S, D>(
    dataset: &mut Dataset,
    source: &S,
    store: &D,
) -> Result<DetailFetchOutcome>
where
    S: ActivitySource,
    D: DatasetStore,
{
    let pending: Vec<u64> = dataset
        .iter()
        .filter(|r| needs_detail_fetch(r))
        .map(ActivityRecord::id)
        .collect();

    let total = pending.len();
    if total == 0 {
        debug!("[Sync] All {} activities already have detail", dataset.len());
        return Ok(DetailFetchOutcome::Complete { resolved: 0 });
    }
    info!(
        "[Sync] Fetching detail for {} of {} activities",
        total,
        dataset.len()
    );

    let start = Instant::now();
    let mut resolved = 0;

    for id in pending {
        let detail = match source.activity_detail(id).await? {
            ApiResponse::Ok(detail) => detail,
            ApiResponse::RateLimited => {
                warn!(
                    "[Sync] Rate limit exceeded after {}/{} details",
                    resolved, total
                );
                if resolved == 0 {
                    info!("[Sync] No activity details returned, nothing to save");
                    return Ok(DetailFetchOutcome::RateLimited {
                        resolved,
                        saved: false,
                    });
                }
                store.save(dataset)?;
                info!("[Sync] Progress saved ({} details)", resolved);
                return Ok(DetailFetchOutcome::RateLimited {
                    resolved,
                    saved: true,
                });
            }
        };

        if detail.id != id {
            return Err(SyncError::malformed(
                format!("activity detail {}", id),
                format!("response is for activity {}", detail.id),
            ));
        }
        if let Some(record) = dataset.get_mut(id) {
            record.map_polyline = Some(detail.resolved_polyline());
            resolved += 1;
        }

        if resolved == 1 || resolved == total || resolved % 25 == 0 {
            info!(
                "[Sync] Detail progress {}/{} ({:.1}s)",
                resolved,
                total,
                start.elapsed().as_secs_f64()
            );
        }
    }

    Ok(DetailFetchOutcome::Complete { resolved })
}
