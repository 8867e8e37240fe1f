use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{debug, info, warn};

use crate::core::coords::WindowId;
use crate::monitor::bar::{BarEstimator, BarProbe};
use crate::monitor::trigger::{ThresholdTrigger, TriggerTransition};
use crate::sampling::batch::BatchSampler;
use crate::sampling::stats::PerformanceStats;

const DEFAULT_INTERVAL: Duration = Duration::from_millis(40);
/// Upper bound on one uninterruptible sleep slice, so stop requests are
/// noticed promptly even under long tick intervals.
const SLEEP_SLICE: Duration = Duration::from_millis(20);

/// One monitored bar inside the driver: a probe plus its trigger state.
#[derive(Debug, Clone)]
pub struct Vital {
    pub label: String,
    pub probe: BarProbe,
    pub trigger: ThresholdTrigger,
}

impl Vital {
    pub fn new(label: impl Into<String>, probe: BarProbe, threshold_percent: f64) -> Self {
        Self {
            label: label.into(),
            probe,
            trigger: ThresholdTrigger::new(threshold_percent),
        }
    }
}

/// Events emitted by polling passes.
#[derive(Debug, Clone)]
pub enum MonitorEvent {
    /// A vital was sampled this tick.
    Reading {
        window: WindowId,
        label: String,
        percentage: f64,
    },
    /// A vital dropped below its threshold.
    TriggerEntered {
        window: WindowId,
        label: String,
        percentage: f64,
    },
    /// A vital recovered to or above its threshold.
    TriggerCleared {
        window: WindowId,
        label: String,
        percentage: f64,
    },
    /// A tick fired while the previous pass was still in flight and was
    /// skipped.
    TickSkipped { window: WindowId },
    /// The window disappeared; its polling stopped and its cache entries
    /// were dropped.
    WindowLost { window: WindowId },
}

/// Holds a window's busy flag for the duration of one sampling pass.
/// Acquired with a compare-exchange at tick start; Drop releases the flag,
/// so a pass that returns early or panics can never wedge its window.
struct BusyGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> BusyGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// State shared between the driver handle and a window's poll worker.
struct WindowShared {
    window: WindowId,
    vitals: Mutex<Vec<Vital>>,
    running: AtomicBool,
    busy: AtomicBool,
    ticks_skipped: AtomicU64,
}

struct TrackedWindow {
    shared: Arc<WindowShared>,
    handle: Option<JoinHandle<()>>,
}

/// Runs one sampling pass per tracked window on a fixed interval.
///
/// Each tracked window gets its own worker thread; at most one sampling pass
/// per window is ever in flight, enforced by the busy flag. A tick that finds
/// the flag taken is skipped, never queued. Stopping a window means "stop
/// scheduling": an in-flight pass completes and its results are discarded.
pub struct PollingDriver {
    sampler: BatchSampler,
    estimator: BarEstimator,
    interval: Duration,
    tx: Sender<MonitorEvent>,
    rx: Receiver<MonitorEvent>,
    tracked: HashMap<WindowId, TrackedWindow>,
}

impl PollingDriver {
    /// `interval` is the per-window tick period. Zero falls back to the 40ms
    /// default rather than busy-spinning.
    pub fn new(sampler: BatchSampler, interval: Duration) -> Self {
        let interval = if interval.is_zero() {
            warn!("poll interval of 0 requested, using {:?}", DEFAULT_INTERVAL);
            DEFAULT_INTERVAL
        } else {
            interval
        };
        let (tx, rx) = unbounded();
        let estimator = BarEstimator::new(sampler.clone());
        Self {
            sampler,
            estimator,
            interval,
            tx,
            rx,
            tracked: HashMap::new(),
        }
    }

    /// Receiver side of the event stream. Clone it freely; all clones see
    /// the same stream.
    pub fn events(&self) -> Receiver<MonitorEvent> {
        self.rx.clone()
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_tracking(&self, window: WindowId) -> bool {
        self.tracked
            .get(&window)
            .map_or(false, |t| t.shared.running.load(Ordering::Relaxed))
    }

    pub fn tracked_count(&self) -> usize {
        self.tracked
            .values()
            .filter(|t| t.shared.running.load(Ordering::Relaxed))
            .count()
    }

    /// Begin polling a window. Replaces any existing tracking for it. The
    /// first tick fires one interval after this call.
    pub fn track(&mut self, window: WindowId, vitals: Vec<Vital>) {
        if self.tracked.contains_key(&window) {
            self.untrack(window);
        }
        info!("tracking {:?} with {} vital(s)", window, vitals.len());

        let shared = Arc::new(WindowShared {
            window,
            vitals: Mutex::new(vitals),
            running: AtomicBool::new(true),
            busy: AtomicBool::new(false),
            ticks_skipped: AtomicU64::new(0),
        });

        let worker_shared = Arc::clone(&shared);
        let sampler = self.sampler.clone();
        let estimator = self.estimator.clone();
        let tx = self.tx.clone();
        let interval = self.interval;
        let handle = thread::spawn(move || {
            debug!("poll worker started for {:?}", worker_shared.window);
            let mut next_tick = Instant::now();
            loop {
                next_tick += interval;
                let now = Instant::now();
                if next_tick <= now {
                    // The pass overran one or more tick slots; resume at the
                    // next future slot instead of firing a burst.
                    debug!("pass for {:?} overran the tick interval", worker_shared.window);
                    while next_tick <= now {
                        next_tick += interval;
                    }
                }
                sleep_until(&worker_shared, next_tick);
                if !worker_shared.running.load(Ordering::Relaxed) {
                    break;
                }
                run_pass(&worker_shared, &sampler, &estimator, &tx);
            }
            debug!("poll worker exited for {:?}", worker_shared.window);
        });

        self.tracked.insert(
            window,
            TrackedWindow {
                shared,
                handle: Some(handle),
            },
        );
    }

    /// Stop scheduling ticks for a window and drop its cache entries.
    pub fn untrack(&mut self, window: WindowId) {
        if let Some(mut tracked) = self.tracked.remove(&window) {
            tracked.shared.running.store(false, Ordering::Relaxed);
            if let Some(handle) = tracked.handle.take() {
                let _ = handle.join();
            }
            self.sampler
                .cache()
                .lock()
                .unwrap()
                .invalidate_window(window);
            info!("stopped tracking {:?}", window);
        }
    }

    pub fn stop_all(&mut self) {
        let windows: Vec<WindowId> = self.tracked.keys().copied().collect();
        for window in windows {
            self.untrack(window);
        }
    }

    /// Run one sampling pass for a window on the calling thread, subject to
    /// the same busy flag as scheduled ticks. Returns false when the window
    /// is not tracked, already stopped, or a pass is already in flight.
    pub fn poll_now(&self, window: WindowId) -> bool {
        match self.tracked.get(&window) {
            Some(t) if t.shared.running.load(Ordering::Relaxed) => {
                run_pass(&t.shared, &self.sampler, &self.estimator, &self.tx)
            }
            _ => false,
        }
    }

    /// Last computed percentage per vital for a window.
    pub fn percentages(&self, window: WindowId) -> Vec<(String, f64)> {
        self.tracked
            .get(&window)
            .map(|t| {
                t.shared
                    .vitals
                    .lock()
                    .unwrap()
                    .iter()
                    .map(|v| (v.label.clone(), v.probe.last_percentage))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// How many ticks for a window were skipped because a pass was still in
    /// flight.
    pub fn ticks_skipped(&self, window: WindowId) -> u64 {
        self.tracked
            .get(&window)
            .map_or(0, |t| t.shared.ticks_skipped.load(Ordering::Relaxed))
    }

    /// Snapshot of the shared cache's performance counters.
    pub fn stats(&self) -> PerformanceStats {
        self.sampler.cache().lock().unwrap().stats()
    }
}

impl Drop for PollingDriver {
    fn drop(&mut self) {
        self.stop_all();
    }
}

/// Interruptible sleep: wakes early when the window is stopped.
fn sleep_until(shared: &WindowShared, deadline: Instant) {
    while shared.running.load(Ordering::Relaxed) {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        thread::sleep((deadline - now).min(SLEEP_SLICE));
    }
}

/// One sampling pass: estimate every vital, update triggers, emit events.
/// Returns false when the pass was skipped because another was in flight.
fn run_pass(
    shared: &WindowShared,
    sampler: &BatchSampler,
    estimator: &BarEstimator,
    tx: &Sender<MonitorEvent>,
) -> bool {
    let Some(_busy) = BusyGuard::acquire(&shared.busy) else {
        shared.ticks_skipped.fetch_add(1, Ordering::Relaxed);
        debug!(
            "tick skipped for {:?}, previous pass still in flight",
            shared.window
        );
        emit(shared, tx, MonitorEvent::TickSkipped { window: shared.window });
        return false;
    };

    if !sampler.source().window_exists(shared.window) {
        warn!("{:?} is gone, stopping its polling", shared.window);
        emit(shared, tx, MonitorEvent::WindowLost { window: shared.window });
        shared.running.store(false, Ordering::Relaxed);
        sampler
            .cache()
            .lock()
            .unwrap()
            .invalidate_window(shared.window);
        return true;
    }

    let mut vitals = shared.vitals.lock().unwrap();
    for vital in vitals.iter_mut() {
        let percentage = estimator.estimate(&mut vital.probe);
        emit(
            shared,
            tx,
            MonitorEvent::Reading {
                window: shared.window,
                label: vital.label.clone(),
                percentage,
            },
        );
        match vital.trigger.update(percentage) {
            Some(TriggerTransition::Entered) => {
                info!(
                    "{} on {:?} dropped to {:.1}% (threshold {:.1}%)",
                    vital.label,
                    shared.window,
                    percentage,
                    vital.trigger.threshold()
                );
                emit(
                    shared,
                    tx,
                    MonitorEvent::TriggerEntered {
                        window: shared.window,
                        label: vital.label.clone(),
                        percentage,
                    },
                );
            }
            Some(TriggerTransition::Cleared) => {
                info!(
                    "{} on {:?} recovered to {:.1}%",
                    vital.label, shared.window, percentage
                );
                emit(
                    shared,
                    tx,
                    MonitorEvent::TriggerCleared {
                        window: shared.window,
                        label: vital.label.clone(),
                        percentage,
                    },
                );
            }
            None => {}
        }
    }
    true
}

/// Send an event unless the window was stopped; results of an in-flight pass
/// after a stop are discarded.
fn emit(shared: &WindowShared, tx: &Sender<MonitorEvent>, event: MonitorEvent) {
    if shared.running.load(Ordering::Relaxed) {
        let _ = tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::color::Rgb;
    use crate::sampling::cache::{CacheConfig, SampleCache};
    use crate::sampling::source::{
        Frame, FramePixelSource, PixelSource, SampleResult,
    };
    use crate::core::coords::SamplePoint;

    const W: WindowId = WindowId(1);
    const RED: Rgb = Rgb::new(255, 0, 0);
    const FAR_FUTURE: Duration = Duration::from_secs(600);

    /// Frame whose top rows are red for x < red_until and black beyond.
    fn bar_frame(red_until: i32) -> Frame {
        Frame::from_fn(64, 16, |x, _| {
            if (x as i32) < red_until {
                image::Rgb([255, 0, 0])
            } else {
                image::Rgb([0, 0, 0])
            }
        })
    }

    fn driver_over(
        source: Arc<dyn PixelSource>,
        color_ttl: Duration,
        interval: Duration,
    ) -> PollingDriver {
        let cache = Arc::new(Mutex::new(SampleCache::new(CacheConfig {
            color_ttl,
            nearby_threshold: 0.0,
            ..CacheConfig::default()
        })));
        PollingDriver::new(BatchSampler::new(cache, source), interval)
    }

    fn hp_vital(threshold: f64) -> Vital {
        // 21px bar at stride 2: 11 samples.
        Vital::new("HP", BarProbe::new(W, 0, 20, 0, RED, Rgb::BLACK), threshold)
    }

    #[test]
    fn test_busy_guard_blocks_second_acquire_until_drop() {
        let flag = AtomicBool::new(false);
        {
            let _guard = BusyGuard::acquire(&flag).unwrap();
            assert!(BusyGuard::acquire(&flag).is_none());
        }
        assert!(BusyGuard::acquire(&flag).is_some());
    }

    #[test]
    fn test_busy_guard_releases_on_panic() {
        let flag = AtomicBool::new(false);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = BusyGuard::acquire(&flag).unwrap();
            panic!("pass blew up");
        }));
        assert!(result.is_err());
        assert!(!flag.load(Ordering::Relaxed));
    }

    #[test]
    fn test_zero_interval_falls_back_to_default() {
        let source = Arc::new(FramePixelSource::new());
        let driver = driver_over(source, Duration::ZERO, Duration::ZERO);
        assert_eq!(driver.interval(), DEFAULT_INTERVAL);
    }

    #[test]
    fn test_poll_now_updates_percentages_and_emits() {
        let source = Arc::new(FramePixelSource::new());
        // Red through x=6: samples 0,2,4,6 filled of 11.
        source.insert_frame(W, bar_frame(7));
        let mut driver = driver_over(source, Duration::ZERO, FAR_FUTURE);
        driver.track(W, vec![hp_vital(50.0)]);

        assert!(driver.poll_now(W));

        let expected = 400.0 / 11.0;
        let percentages = driver.percentages(W);
        assert_eq!(percentages.len(), 1);
        assert_eq!(percentages[0].0, "HP");
        assert!((percentages[0].1 - expected).abs() < 1e-9);

        let rx = driver.events();
        let mut saw_reading = false;
        let mut saw_entered = false;
        while let Ok(event) = rx.try_recv() {
            match event {
                MonitorEvent::Reading { label, percentage, .. } => {
                    assert_eq!(label, "HP");
                    assert!((percentage - expected).abs() < 1e-9);
                    saw_reading = true;
                }
                MonitorEvent::TriggerEntered { percentage, .. } => {
                    assert!(percentage < 50.0);
                    saw_entered = true;
                }
                other => panic!("unexpected event {:?}", other),
            }
        }
        assert!(saw_reading);
        assert!(saw_entered);
    }

    #[test]
    fn test_trigger_cycle_across_frame_changes() {
        let source = Arc::new(FramePixelSource::new());
        source.insert_frame(W, bar_frame(7)); // ~36%, below threshold
        let mut driver =
            driver_over(Arc::clone(&source) as Arc<dyn PixelSource>, Duration::ZERO, FAR_FUTURE);
        driver.track(W, vec![hp_vital(50.0)]);

        assert!(driver.poll_now(W));
        source.insert_frame(W, bar_frame(64)); // fully red again
        assert!(driver.poll_now(W));

        let rx = driver.events();
        let mut transitions = Vec::new();
        while let Ok(event) = rx.try_recv() {
            match event {
                MonitorEvent::TriggerEntered { .. } => transitions.push("entered"),
                MonitorEvent::TriggerCleared { .. } => transitions.push("cleared"),
                _ => {}
            }
        }
        assert_eq!(transitions, vec!["entered", "cleared"]);
    }

    #[test]
    fn test_untrack_stops_and_invalidates_cache() {
        let source = Arc::new(FramePixelSource::new());
        source.insert_frame(W, bar_frame(64));
        let mut driver = driver_over(source, Duration::from_secs(60), FAR_FUTURE);
        driver.track(W, vec![hp_vital(50.0)]);

        assert!(driver.poll_now(W));
        assert!(driver.sampler.cache().lock().unwrap().len() > 0);

        driver.untrack(W);
        assert!(!driver.is_tracking(W));
        assert_eq!(driver.sampler.cache().lock().unwrap().len(), 0);
        assert!(!driver.poll_now(W));
        assert!(driver.percentages(W).is_empty());
    }

    #[test]
    fn test_window_loss_stops_scheduling_and_invalidates() {
        let source = Arc::new(FramePixelSource::new());
        source.insert_frame(W, bar_frame(64));
        let mut driver =
            driver_over(Arc::clone(&source) as Arc<dyn PixelSource>, Duration::from_secs(60), FAR_FUTURE);
        driver.track(W, vec![hp_vital(50.0)]);
        assert!(driver.poll_now(W));

        source.remove_frame(W);
        assert!(driver.poll_now(W)); // the pass runs and detects the loss

        assert!(!driver.is_tracking(W));
        assert_eq!(driver.sampler.cache().lock().unwrap().len(), 0);
        assert!(!driver.poll_now(W));

        let rx = driver.events();
        let mut lost = false;
        while let Ok(event) = rx.try_recv() {
            if let MonitorEvent::WindowLost { window } = event {
                assert_eq!(window, W);
                lost = true;
            }
        }
        assert!(lost);
    }

    struct GatedSource {
        inner: FramePixelSource,
        gate: Mutex<()>,
        entered_tx: Sender<()>,
    }

    impl PixelSource for GatedSource {
        fn color_at(&self, window: WindowId, point: SamplePoint) -> SampleResult<Rgb> {
            let _ = self.entered_tx.send(());
            let _open = self.gate.lock().unwrap();
            self.inner.color_at(window, point)
        }
    }

    #[test]
    fn test_concurrent_pass_is_skipped_not_queued() {
        let (entered_tx, entered_rx) = unbounded();
        let source = Arc::new(GatedSource {
            inner: FramePixelSource::new(),
            gate: Mutex::new(()),
            entered_tx,
        });
        let mut driver =
            driver_over(Arc::clone(&source) as Arc<dyn PixelSource>, Duration::ZERO, FAR_FUTURE);
        driver.track(W, vec![hp_vital(50.0)]);

        let hold = source.gate.lock().unwrap();
        thread::scope(|s| {
            let blocked = s.spawn(|| driver.poll_now(W));
            entered_rx
                .recv_timeout(Duration::from_secs(5))
                .expect("first pass should reach the pixel source");

            // The first pass is parked inside the source with the busy flag
            // held, so this attempt must be refused.
            assert!(!driver.poll_now(W));
            assert_eq!(driver.ticks_skipped(W), 1);

            drop(hold);
            assert!(blocked.join().unwrap());
        });

        let rx = driver.events();
        let mut skipped = false;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, MonitorEvent::TickSkipped { window } if window == W) {
                skipped = true;
            }
        }
        assert!(skipped);
    }

    #[test]
    fn test_scheduled_ticks_fire_without_manual_polls() {
        let source = Arc::new(FramePixelSource::new());
        source.insert_frame(W, bar_frame(64));
        let mut driver = driver_over(source, Duration::ZERO, Duration::from_millis(10));
        driver.track(W, vec![hp_vital(50.0)]);

        let rx = driver.events();
        let reading = rx.recv_timeout(Duration::from_secs(5));
        assert!(matches!(reading, Ok(MonitorEvent::Reading { .. })));

        driver.stop_all();
        assert_eq!(driver.tracked_count(), 0);
    }

    #[test]
    fn test_stop_all_covers_every_window() {
        let source = Arc::new(FramePixelSource::new());
        source.insert_frame(W, bar_frame(64));
        source.insert_frame(WindowId(2), bar_frame(64));
        let mut driver =
            driver_over(Arc::clone(&source) as Arc<dyn PixelSource>, Duration::from_secs(60), FAR_FUTURE);
        driver.track(W, vec![hp_vital(50.0)]);
        driver.track(WindowId(2), vec![hp_vital(50.0)]);
        assert_eq!(driver.tracked_count(), 2);

        driver.poll_now(W);
        driver.poll_now(WindowId(2));
        driver.stop_all();

        assert_eq!(driver.tracked_count(), 0);
        assert!(driver.sampler.cache().lock().unwrap().is_empty());
    }
}
