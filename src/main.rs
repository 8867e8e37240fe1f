use vitalwatch::AppSettings;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let settings = AppSettings::load();
    run(settings);
}

#[cfg(windows)]
fn run(settings: AppSettings) {
    use std::sync::{Arc, Mutex};
    use std::time::{Duration, Instant};

    use log::{debug, info};
    use vitalwatch::core::gdi::GdiPixelSource;
    use vitalwatch::monitor::driver::MonitorEvent;
    use vitalwatch::sampling::cache::SampleCache;
    use vitalwatch::{BatchSampler, PollingDriver};

    const RESCAN_INTERVAL: Duration = Duration::from_secs(2);
    const EVENT_WAIT: Duration = Duration::from_millis(250);

    let cache = Arc::new(Mutex::new(SampleCache::new(settings.cache.to_config())));
    let sampler = BatchSampler::new(cache, Arc::new(GdiPixelSource::new()));
    let mut driver = PollingDriver::new(sampler.clone(), settings.monitor.tick_interval());
    let events = driver.events();

    info!(
        "watching for '{}' windows, tick interval {:?}",
        settings.monitor.window_class,
        driver.interval()
    );

    attach_new_windows(&settings, &sampler, &mut driver);
    let mut last_rescan = Instant::now();
    let mut last_report = Instant::now();

    loop {
        if let Ok(event) = events.recv_timeout(EVENT_WAIT) {
            match event {
                MonitorEvent::Reading {
                    window,
                    label,
                    percentage,
                } => {
                    debug!("{:?} {} at {:.1}%", window, label, percentage);
                }
                MonitorEvent::WindowLost { window } => {
                    // Reap the worker; the rescan picks the window back up if
                    // it reappears.
                    driver.untrack(window);
                }
                // Trigger transitions and skipped ticks are already logged by
                // the driver.
                _ => {}
            }
        }

        let now = Instant::now();
        if now.duration_since(last_rescan) >= RESCAN_INTERVAL {
            last_rescan = now;
            attach_new_windows(&settings, &sampler, &mut driver);
        }
        if now.duration_since(last_report) >= settings.monitor.stats_report_period() {
            last_report = now;
            driver.stats().log_summary();
        }
    }
}

/// Track any window of the configured class that is not already tracked,
/// resolving each vital's reference colors from its profile or by live
/// calibration.
#[cfg(windows)]
fn attach_new_windows(
    settings: &AppSettings,
    sampler: &vitalwatch::BatchSampler,
    driver: &mut vitalwatch::PollingDriver,
) {
    use log::{info, warn};
    use vitalwatch::calibration::calibrate_references;
    use vitalwatch::core::window::find_windows_by_class;
    use vitalwatch::monitor::driver::Vital;

    for window in find_windows_by_class(&settings.monitor.window_class) {
        if driver.is_tracking(window) {
            continue;
        }
        if driver.tracked_count() >= settings.monitor.max_windows {
            warn!(
                "already tracking {} windows, ignoring {:?}",
                driver.tracked_count(),
                window
            );
            break;
        }

        let mut vitals = Vec::new();
        for profile in &settings.vitals {
            let (full, empty) = match (profile.full, profile.empty) {
                (Some(full), Some(empty)) => (full, empty),
                _ => match calibrate_references(
                    sampler,
                    window,
                    profile.start_x,
                    profile.end_x,
                    profile.y,
                    profile.tolerance,
                ) {
                    Ok(refs) => {
                        info!(
                            "calibrated {} on {:?}: full {:?}, empty {:?}",
                            profile.label, window, refs.full, refs.empty
                        );
                        (refs.full, refs.empty)
                    }
                    Err(e) => {
                        warn!(
                            "could not calibrate {} on {:?}: {}",
                            profile.label, window, e
                        );
                        continue;
                    }
                },
            };
            vitals.push(Vital::new(
                profile.label.clone(),
                profile.probe_for(window, full, empty),
                profile.threshold_percent,
            ));
        }

        if vitals.is_empty() {
            warn!("no usable vitals for {:?}, not tracking it", window);
            continue;
        }
        driver.track(window, vitals);
    }
}

#[cfg(not(windows))]
fn run(_settings: AppSettings) {
    log::error!("no native pixel source is available on this platform; the live monitor runs on Windows only");
}
