//! Sample acquisition - batched fetching from an external source and debounced
//! re-rendering.
//!
//! Network access lives behind [`SampleSource`]; this module only schedules the
//! requests and decides which results are still worth applying.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

use crate::heat::Sample;

/// A location the source is asked about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryPoint {
    pub lat: f64,
    pub lng: f64,
    pub name: String,
}

impl QueryPoint {
    pub fn new(lat: f64, lng: f64, name: impl Into<String>) -> Self {
        Self {
            lat,
            lng,
            name: name.into(),
        }
    }
}

/// Global 20° x 30° lattice plus a handful of well-known cities.
pub fn default_query_points() -> Vec<QueryPoint> {
    const CITIES: [(f64, f64, &str); 10] = [
        (51.51, -0.13, "London"),
        (40.71, -74.01, "New York"),
        (35.68, 139.65, "Tokyo"),
        (-33.87, 151.21, "Sydney"),
        (55.75, 37.62, "Moscow"),
        (28.61, 77.21, "Delhi"),
        (-23.55, -46.63, "São Paulo"),
        (1.35, 103.82, "Singapore"),
        (34.05, -118.24, "Los Angeles"),
        (64.13, -21.94, "Reykjavik"),
    ];

    let mut points = Vec::new();
    for lat in (-80..=80).step_by(20) {
        for lng in (-180..=180).step_by(30) {
            points.push(QueryPoint::new(lat as f64, lng as f64, format!("{lat},{lng}")));
        }
    }
    points.extend(
        CITIES
            .iter()
            .map(|&(lat, lng, name)| QueryPoint::new(lat, lng, name)),
    );
    points
}

/// External provider of point measurements. `Ok(None)` means the source had
/// nothing for that location.
pub trait SampleSource: Send + Sync + 'static {
    fn fetch(&self, point: &QueryPoint) -> impl Future<Output = Result<Option<Sample>>> + Send;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FetchSettings {
    pub batch_size: usize,
    pub batch_pause: Duration,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            batch_size: 15,
            batch_pause: Duration::from_millis(50),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SampleBatch {
    pub generation: u64,
    pub samples: Vec<Sample>,
    pub failed: usize,
}

/// Fetches query points in bounded concurrent groups. Every fetch gets a new
/// generation number so results overtaken by a newer request can be dropped.
pub struct SampleFetcher<S> {
    source: Arc<S>,
    settings: FetchSettings,
    generation: AtomicU64,
}

impl<S: SampleSource> SampleFetcher<S> {
    pub fn new(source: S, settings: FetchSettings) -> Self {
        Self {
            source: Arc::new(source),
            settings,
            generation: AtomicU64::new(0),
        }
    }

    pub fn latest_generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.latest_generation() == generation
    }

    /// Fetch every point. Failed points are counted and left out.
    pub async fn fetch(&self, points: &[QueryPoint]) -> SampleBatch {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let batch_size = self.settings.batch_size.max(1);
        let mut results: Vec<Option<Sample>> = vec![None; points.len()];
        let mut failed = 0;

        for (group_index, group) in points.chunks(batch_size).enumerate() {
            let offset = group_index * batch_size;
            let mut tasks = JoinSet::new();
            for (i, point) in group.iter().enumerate() {
                let source = Arc::clone(&self.source);
                let point = point.clone();
                tasks.spawn(async move {
                    let result = source.fetch(&point).await;
                    (offset + i, result, point)
                });
            }

            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok((index, Ok(sample), _)) => {
                        if sample.is_none() {
                            failed += 1;
                        }
                        results[index] = sample;
                    }
                    Ok((_, Err(err), point)) => {
                        failed += 1;
                        debug!(point = %point.name, error = %err, "sample fetch failed");
                    }
                    Err(err) => {
                        failed += 1;
                        warn!(error = %err, "sample fetch task aborted");
                    }
                }
            }

            if offset + group.len() < points.len() {
                tokio::time::sleep(self.settings.batch_pause).await;
            }
        }

        let samples: Vec<Sample> = results.into_iter().flatten().collect();
        info!(
            generation,
            samples = samples.len(),
            failed,
            "sample batch fetched"
        );
        SampleBatch {
            generation,
            samples,
            failed,
        }
    }

    /// Like [`fetch`](Self::fetch), but returns `None` when a newer fetch was
    /// started before this one finished.
    pub async fn fetch_latest(&self, points: &[QueryPoint]) -> Option<SampleBatch> {
        let batch = self.fetch(points).await;
        if self.is_current(batch.generation) {
            Some(batch)
        } else {
            debug!(generation = batch.generation, "discarding superseded sample batch");
            None
        }
    }
}

/// Collapses bursts of values into the last one, delivered once the input has
/// been quiet for the configured period.
pub struct Debouncer<T> {
    tx: watch::Sender<Option<T>>,
}

impl<T> Debouncer<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Must be called inside a tokio runtime. Dropping the debouncer flushes
    /// a pending value and stops the task.
    pub fn spawn<F>(quiet: Duration, mut on_settle: F) -> (Self, JoinHandle<()>)
    where
        F: FnMut(T) + Send + 'static,
    {
        let (tx, mut rx) = watch::channel::<Option<T>>(None);
        let handle = tokio::spawn(async move {
            loop {
                if rx.changed().await.is_err() {
                    break;
                }
                let closed = loop {
                    tokio::select! {
                        changed = rx.changed() => {
                            if changed.is_err() {
                                break true;
                            }
                        }
                        _ = tokio::time::sleep(quiet) => break false,
                    }
                };
                let latest = rx.borrow_and_update().clone();
                if let Some(value) = latest {
                    on_settle(value);
                }
                if closed {
                    break;
                }
            }
        });
        (Self { tx }, handle)
    }

    pub fn push(&self, value: T) {
        self.tx.send_replace(Some(value));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_points_cover_lattice_and_cities() {
        let points = default_query_points();
        // 9 latitudes x 13 longitudes
        assert_eq!(points.len(), 9 * 13 + 10);
        assert_eq!(points[0], QueryPoint::new(-80.0, -180.0, "-80,-180"));
        assert!(points.iter().any(|p| p.name == "Reykjavik"));
    }
}
