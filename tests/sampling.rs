use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Result};
use fieldscope::{
    config::Config,
    heat::Sample,
    sampling::{
        default_query_points, Debouncer, FetchSettings, QueryPoint, SampleFetcher, SampleSource,
    },
};
use tokio::time::Instant;

/// Answers every point after a short delay while tracking how many requests
/// are in flight at once.
#[derive(Default)]
struct SlowSource {
    in_flight: AtomicUsize,
    max_in_flight: Arc<AtomicUsize>,
}

impl SampleSource for SlowSource {
    async fn fetch(&self, point: &QueryPoint) -> Result<Option<Sample>> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(10)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match point.name.as_str() {
            "Tokyo" => bail!("upstream timed out"),
            "Reykjavik" => Ok(None),
            _ => Ok(Some(Sample::new(point.lat, point.lng, point.lat / 4.0))),
        }
    }
}

fn tracked_source() -> (SlowSource, Arc<AtomicUsize>) {
    let max_in_flight = Arc::new(AtomicUsize::new(0));
    let source = SlowSource {
        max_in_flight: Arc::clone(&max_in_flight),
        ..SlowSource::default()
    };
    (source, max_in_flight)
}

#[tokio::test(start_paused = true)]
async fn groups_are_bounded_and_paced() {
    let (source, max_in_flight) = tracked_source();
    let settings = Config::default().sampling.fetch_settings();
    assert_eq!(settings, FetchSettings::default());
    let fetcher = SampleFetcher::new(source, settings);
    let points = default_query_points();

    let started = Instant::now();
    let batch = fetcher.fetch(&points).await;
    let elapsed = started.elapsed();

    assert_eq!(max_in_flight.load(Ordering::SeqCst), 15);
    // 127 points in 9 groups: 8 pauses plus one request delay per group
    assert!(elapsed >= Duration::from_millis(8 * 50 + 9 * 10), "{elapsed:?}");
    assert_eq!(batch.generation, 1);
    assert_eq!(batch.failed, 2);
    assert_eq!(batch.samples.len(), points.len() - 2);
}

#[tokio::test(start_paused = true)]
async fn configured_batch_size_and_pause_apply() {
    let yaml = "sampling:\n  batch_size: 5\n  batch_pause_ms: 200\n";
    let config: Config = serde_yaml::from_str(yaml).unwrap();
    let (source, max_in_flight) = tracked_source();
    let fetcher = SampleFetcher::new(source, config.sampling.fetch_settings());
    let points: Vec<QueryPoint> = (0..12)
        .map(|i| QueryPoint::new(i as f64, 0.0, format!("p{i}")))
        .collect();

    let started = Instant::now();
    let batch = fetcher.fetch(&points).await;

    assert_eq!(max_in_flight.load(Ordering::SeqCst), 5);
    // 3 groups: 2 pauses of 200 ms
    assert!(started.elapsed() >= Duration::from_millis(2 * 200 + 3 * 10));
    assert_eq!(batch.samples.len(), 12);
}

#[tokio::test(start_paused = true)]
async fn results_keep_query_order() {
    let settings = FetchSettings {
        batch_size: 4,
        batch_pause: Duration::from_millis(5),
    };
    let fetcher = SampleFetcher::new(SlowSource::default(), settings);
    let points: Vec<QueryPoint> = (0..10)
        .map(|i| QueryPoint::new(i as f64, 0.0, format!("p{i}")))
        .collect();

    let batch = fetcher.fetch(&points).await;
    let lats: Vec<f64> = batch.samples.iter().map(|s| s.lat).collect();
    assert_eq!(lats, (0..10).map(|i| i as f64).collect::<Vec<_>>());
}

#[tokio::test(start_paused = true)]
async fn superseded_batches_are_discarded() {
    let fetcher = SampleFetcher::new(SlowSource::default(), FetchSettings::default());
    let points = default_query_points();

    let (older, newer) = tokio::join!(fetcher.fetch_latest(&points), fetcher.fetch_latest(&points));
    assert!(older.is_none());
    let newer = newer.expect("latest batch is applied");
    assert_eq!(newer.generation, 2);
    assert!(fetcher.is_current(newer.generation));
}

#[tokio::test(start_paused = true)]
async fn debouncer_delivers_last_value_once_quiet() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let (debouncer, task) = Debouncer::spawn(Duration::from_millis(250), {
        let seen = Arc::clone(&seen);
        move |value: u32| seen.lock().unwrap().push(value)
    });

    for value in 1..=3 {
        debouncer.push(value);
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(seen.lock().unwrap().is_empty());

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(*seen.lock().unwrap(), vec![3]);

    // a pending value is flushed when the debouncer goes away
    debouncer.push(4);
    drop(debouncer);
    task.await.unwrap();
    assert_eq!(*seen.lock().unwrap(), vec![3, 4]);
}
