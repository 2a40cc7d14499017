//! Shared test fixtures: summary builders and a scripted activity source.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use activity_maps::{
    ActivityDetail, ActivityRecord, ActivitySource, ActivitySummary, ApiResponse, Result,
    SyncError,
};
use chrono::{TimeZone, Utc};

/// Summary with a start time `day` days into 2023 (UTC noon).
pub fn summary(id: u64, activity_type: &str, day: u32) -> ActivitySummary {
    let start = Utc.with_ymd_and_hms(2023, 1, 1, 12, 0, 0).unwrap() + chrono::Duration::days(day as i64);
    ActivitySummary {
        id,
        activity_type: activity_type.to_string(),
        start_date: start,
        start_date_local: start.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        distance: 1609.34,
        elapsed_time: 600,
        extra: Default::default(),
    }
}

pub fn walk(id: u64) -> ActivitySummary {
    summary(id, "Walk", id as u32)
}

pub fn record(id: u64, polyline: Option<&str>) -> ActivityRecord {
    ActivityRecord {
        summary: walk(id),
        map_polyline: polyline.map(str::to_string),
    }
}

/// A real 3-point path (38.5,-120.2) -> (40.7,-120.95) -> (43.252,-126.453).
pub const REFERENCE_POLYLINE: &str = "_p~iF~ps|U_ulLnnqC_mqNvxq`@";

/// One scripted detail response.
#[derive(Debug, Clone)]
pub enum DetailStep {
    /// Answer from the polyline table
    Lookup,
    RateLimited,
    Fail(SyncError),
    /// Answer with the detail of another activity
    Answer(ActivityDetail),
    /// Wait, then answer from the polyline table
    Slow(Duration),
}

/// In-memory [`ActivitySource`] that replays scripted responses and records calls.
#[derive(Default)]
pub struct ScriptedSource {
    pages: RefCell<VecDeque<Result<ApiResponse<Vec<ActivitySummary>>>>>,
    detail_script: RefCell<VecDeque<DetailStep>>,
    polylines: HashMap<u64, Option<String>>,
    pub list_calls: RefCell<Vec<(u32, u32, i64)>>,
    pub detail_calls: RefCell<Vec<u64>>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a page of summaries. Once the queue is empty, pages come back empty.
    pub fn page(self, summaries: Vec<ActivitySummary>) -> Self {
        self.pages.borrow_mut().push_back(Ok(ApiResponse::Ok(summaries)));
        self
    }

    pub fn page_rate_limited(self) -> Self {
        self.pages.borrow_mut().push_back(Ok(ApiResponse::RateLimited));
        self
    }

    pub fn page_error(self, error: SyncError) -> Self {
        self.pages.borrow_mut().push_back(Err(error));
        self
    }

    /// Detail answer for `id`. Unknown ids answer with no polyline.
    pub fn polyline(mut self, id: u64, polyline: Option<&str>) -> Self {
        self.polylines.insert(id, polyline.map(str::to_string));
        self
    }

    /// Queue detail steps; once exhausted every call is a lookup.
    pub fn details(self, steps: Vec<DetailStep>) -> Self {
        self.detail_script.borrow_mut().extend(steps);
        self
    }
}

impl ActivitySource for ScriptedSource {
    async fn list_activities(
        &self,
        page: u32,
        per_page: u32,
        after: i64,
    ) -> Result<ApiResponse<Vec<ActivitySummary>>> {
        self.list_calls.borrow_mut().push((page, per_page, after));
        self.pages
            .borrow_mut()
            .pop_front()
            .unwrap_or(Ok(ApiResponse::Ok(Vec::new())))
    }

    async fn activity_detail(&self, id: u64) -> Result<ApiResponse<ActivityDetail>> {
        self.detail_calls.borrow_mut().push(id);
        let step = self
            .detail_script
            .borrow_mut()
            .pop_front()
            .unwrap_or(DetailStep::Lookup);
        let lookup = ActivityDetail {
            id,
            map_polyline: self.polylines.get(&id).cloned().flatten(),
        };
        match step {
            DetailStep::Lookup => Ok(ApiResponse::Ok(lookup)),
            DetailStep::RateLimited => Ok(ApiResponse::RateLimited),
            DetailStep::Fail(e) => Err(e),
            DetailStep::Answer(detail) => Ok(ApiResponse::Ok(detail)),
            DetailStep::Slow(delay) => {
                tokio::time::sleep(delay).await;
                Ok(ApiResponse::Ok(lookup))
            }
        }
    }
}
