//! Paginated activity-list retrieval.

use log::{debug, info, warn};

use crate::error::Result;
use crate::http::{ActivitySource, ApiResponse};
use crate::types::ActivitySummary;

/// Page size requested from the list endpoint.
pub const PAGE_SIZE: u32 = 200;

/// Summaries collected by [`fetch_summaries_since`].
#[derive(Debug, Clone, Default)]
pub struct SummaryBatch {
    /// In page order
    pub summaries: Vec<ActivitySummary>,
    /// Pages that returned entries
    pub pages: u32,
    /// Listing stopped early on a rate limit; `summaries` holds what arrived before it
    pub rate_limited: bool,
}

/// Lazy, page-ordered walk over the activity list.
///
/// Pages are requested one at a time in strictly increasing order. The walk
/// ends at the first empty page or the first rate-limit signal.
pub struct SummaryPager<'a, S: ActivitySource> {
    source: &'a S,
    after: i64,
    per_page: u32,
    next_page: u32,
    finished: bool,
    rate_limited: bool,
}

impl<'a, S: ActivitySource> SummaryPager<'a, S> {
    /// Pager over activities started after `cutoff_epoch_seconds` (0 = all history).
    pub fn new(source: &'a S, cutoff_epoch_seconds: i64) -> Self {
        Self::with_page_size(source, cutoff_epoch_seconds, PAGE_SIZE)
    }

    pub fn with_page_size(source: &'a S, cutoff_epoch_seconds: i64, per_page: u32) -> Self {
        Self {
            source,
            after: cutoff_epoch_seconds,
            per_page,
            next_page: 1,
            finished: false,
            rate_limited: false,
        }
    }

    /// Next non-empty page, or `None` once the listing is exhausted or rate limited.
    pub async fn next_page(&mut self) -> Result<Option<Vec<ActivitySummary>>> {
        if self.finished {
            return Ok(None);
        }
        let page = self.next_page;
        let response = self
            .source
            .list_activities(page, self.per_page, self.after)
            .await;

        let response = match response {
            Ok(r) => r,
            Err(e) => {
                self.finished = true;
                return Err(e);
            }
        };

        match response {
            ApiResponse::RateLimited => {
                warn!("[Fetch] Rate limit exceeded while listing page {}", page);
                self.finished = true;
                self.rate_limited = true;
                Ok(None)
            }
            ApiResponse::Ok(summaries) if summaries.is_empty() => {
                debug!("[Fetch] Page {} empty, listing complete", page);
                self.finished = true;
                Ok(None)
            }
            ApiResponse::Ok(summaries) => {
                debug!("[Fetch] Page {}: {} activities", page, summaries.len());
                self.next_page += 1;
                Ok(Some(summaries))
            }
        }
    }

    /// Whether the walk ended on a rate limit.
    pub fn rate_limited(&self) -> bool {
        self.rate_limited
    }

    /// The page number the next call will request.
    pub fn current_page(&self) -> u32 {
        self.next_page
    }
}

/// Collect every summary newer than `cutoff_epoch_seconds`.
pub async fn fetch_summaries_since<S: ActivitySource>(
    source: &S,
    cutoff_epoch_seconds: i64,
) -> Result<SummaryBatch> {
    let mut pager = SummaryPager::new(source, cutoff_epoch_seconds);
    let mut batch = SummaryBatch::default();

    while let Some(page) = pager.next_page().await? {
        batch.pages += 1;
        batch.summaries.extend(page);
    }
    batch.rate_limited = pager.rate_limited();

    info!(
        "[Fetch] Listed {} new activities across {} pages (after={}{})",
        batch.summaries.len(),
        batch.pages,
        cutoff_epoch_seconds,
        if batch.rate_limited { ", rate limited" } else { "" }
    );
    Ok(batch)
}
