//! # Activity Maps
//!
//! Incremental Strava activity synchronization with layered path maps.
//!
//! This library provides:
//! - Paginated activity listing and per-activity detail fetching
//! - An idempotent, id-keyed merge into a persisted CSV dataset that
//!   survives rate limiting mid-fetch
//! - Derived distance, speed, pace and calendar metrics
//! - Walk and ride maps with one togglable layer per year
//!
//! ## Quick Start
//!
//! ```rust
//! use activity_maps::{merge_summaries, needs_detail_fetch, ActivitySummary, Dataset};
//! use serde_json::json;
//!
//! let summary = ActivitySummary::from_json(json!({
//!     "id": 42,
//!     "type": "Walk",
//!     "start_date": "2023-06-01T14:00:00Z",
//!     "start_date_local": "2023-06-01T07:00:00Z",
//!     "distance": 1609.34,
//!     "elapsed_time": 600
//! }))
//! .unwrap();
//!
//! let dataset = merge_summaries(Dataset::new(), vec![summary]);
//! assert!(needs_detail_fetch(dataset.get(42).unwrap()));
//! ```

// Unified error handling
pub mod error;
pub use error::{OptionExt, Result, SyncError};

// Record types and the passthrough field bag
pub mod types;
pub use types::{ActivityDetail, ActivityRecord, ActivitySummary, ExtraFields, NO_DATA};

// Ordered id-keyed record collection
pub mod dataset;
pub use dataset::Dataset;

// Credentials and map settings
pub mod config;
pub use config::{Config, Credentials, MapSettings};

// HTTP boundary: response classification, retries, Strava client
pub mod http;
pub use http::{ActivitySource, ApiResponse, StravaClient};

// Refresh-token exchange
pub mod auth;
pub use auth::{AccessToken, TokenProvider};

// Dataset persistence
pub mod store;
pub use store::{CsvStore, DatasetStore, MemoryStore};

// Paginated activity listing
pub mod fetcher;
pub use fetcher::{fetch_summaries_since, SummaryBatch, SummaryPager, PAGE_SIZE};

// Incremental merge engine
pub mod merge;
pub use merge::{
    fetch_missing_details, merge_records, merge_summaries, needs_detail_fetch, DetailFetchOutcome,
};

// Run orchestration with rate-limit pauses
pub mod sync;
pub use sync::{SyncOptions, SyncReport, SyncStatus, Synchronizer, RATE_LIMIT_PAUSE};

// Derived metrics
pub mod metrics;
pub use metrics::{derive_all, CalendarBucket, DerivedRecord};

// Map rendering
pub mod render;
pub use render::{build_layers, decode_path, MapKind, MapRenderer, MapStyle, YearLayer};

// ============================================================================
// Geography
// ============================================================================

/// A decoded path vertex in degrees.
///
/// ```
/// use activity_maps::GpsPoint;
/// assert!(GpsPoint::new(38.5, -120.2).is_valid());
/// assert!(!GpsPoint::new(38.5, 200.0).is_valid());
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GpsPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GpsPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Finite and inside [-90, 90] x [-180, 180].
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }

    /// `[lat, lng]`, the order Leaflet expects.
    pub fn lat_lng(&self) -> [f64; 2] {
        [self.latitude, self.longitude]
    }
}

/// Extent of every drawn path, used to frame a map with no configured center.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub south_west: GpsPoint,
    pub north_east: GpsPoint,
}

impl Bounds {
    /// `None` for an empty input.
    pub fn from_points(points: impl IntoIterator<Item = GpsPoint>) -> Option<Self> {
        points.into_iter().fold(None, |acc, p| {
            Some(match acc {
                None => Self {
                    south_west: p,
                    north_east: p,
                },
                Some(b) => Self {
                    south_west: GpsPoint::new(
                        b.south_west.latitude.min(p.latitude),
                        b.south_west.longitude.min(p.longitude),
                    ),
                    north_east: GpsPoint::new(
                        b.north_east.latitude.max(p.latitude),
                        b.north_east.longitude.max(p.longitude),
                    ),
                },
            })
        })
    }

    /// Corner pair for `map.fitBounds`.
    pub fn corners(&self) -> [[f64; 2]; 2] {
        [self.south_west.lat_lng(), self.north_east.lat_lng()]
    }
}
