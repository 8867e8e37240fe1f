use log::warn;
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;

use crate::core::color::Rgb;
use crate::core::coords::WindowId;
use crate::monitor::bar::BarProbe;
use crate::sampling::cache::CacheConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSettings {
    #[serde(default)]
    pub cache: CacheSettings,

    #[serde(default)]
    pub monitor: MonitorSettings,

    #[serde(default)]
    pub vitals: Vec<VitalProfile>,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            cache: CacheSettings::default(),
            monitor: MonitorSettings::default(),
            vitals: vec![VitalProfile::default_hp(), VitalProfile::default_mp()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    /// How long a point sample is trusted (milliseconds).
    #[serde(default = "default_color_ttl_ms")]
    pub color_ttl_ms: u64,
    /// How long a region average is trusted (milliseconds).
    #[serde(default = "default_region_ttl_ms")]
    pub region_ttl_ms: u64,
    /// Eviction ceiling across all windows. 0 disables caching.
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
    /// Bucketing distance in pixels. 0 means exact-coordinate matching.
    #[serde(default = "default_nearby_threshold")]
    pub nearby_threshold: f32,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            color_ttl_ms: default_color_ttl_ms(),
            region_ttl_ms: default_region_ttl_ms(),
            max_entries: default_max_entries(),
            nearby_threshold: default_nearby_threshold(),
        }
    }
}

impl CacheSettings {
    pub fn to_config(&self) -> CacheConfig {
        CacheConfig {
            color_ttl: Duration::from_millis(self.color_ttl_ms),
            region_ttl: Duration::from_millis(self.region_ttl_ms),
            max_entries: self.max_entries,
            nearby_threshold: self.nearby_threshold,
        }
    }
}

fn default_color_ttl_ms() -> u64 {
    40
}

fn default_region_ttl_ms() -> u64 {
    250
}

fn default_max_entries() -> usize {
    4096
}

fn default_nearby_threshold() -> f32 {
    2.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorSettings {
    /// Per-window tick period (milliseconds).
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// How often the cache performance report is logged (seconds).
    #[serde(default = "default_stats_report_secs")]
    pub stats_report_secs: u64,
    /// Window class name the monitor attaches to.
    #[serde(default = "default_window_class")]
    pub window_class: String,
    /// Cap on simultaneously tracked game clients.
    #[serde(default = "default_max_windows")]
    pub max_windows: usize,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            stats_report_secs: default_stats_report_secs(),
            window_class: default_window_class(),
            max_windows: default_max_windows(),
        }
    }
}

impl MonitorSettings {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn stats_report_period(&self) -> Duration {
        Duration::from_secs(self.stats_report_secs)
    }
}

fn default_tick_interval_ms() -> u64 {
    40
}

fn default_stats_report_secs() -> u64 {
    30
}

fn default_window_class() -> String {
    "D3D Window".to_string()
}

fn default_max_windows() -> usize {
    8
}

/// One bar to monitor per tracked window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VitalProfile {
    pub label: String,

    // Bar geometry in client-area pixels
    pub start_x: i32,
    pub end_x: i32,
    pub y: i32,

    /// Reference colors. When either is missing, the monitor calibrates them
    /// from the live bar at startup.
    #[serde(default)]
    pub full: Option<Rgb>,
    #[serde(default)]
    pub empty: Option<Rgb>,

    #[serde(default = "default_tolerance")]
    pub tolerance: f32,
    #[serde(default = "default_stride")]
    pub stride: usize,

    /// Trigger fires while the bar sits below this percentage.
    #[serde(default = "default_threshold_percent")]
    pub threshold_percent: f64,
}

impl VitalProfile {
    pub fn default_hp() -> Self {
        Self {
            label: "HP".to_string(),
            start_x: 110,
            end_x: 330,
            y: 42,
            full: Some(Rgb::new(196, 28, 28)),
            empty: Some(Rgb::new(40, 12, 12)),
            tolerance: default_tolerance(),
            stride: default_stride(),
            threshold_percent: 40.0,
        }
    }

    pub fn default_mp() -> Self {
        Self {
            label: "MP".to_string(),
            start_x: 110,
            end_x: 330,
            y: 58,
            full: Some(Rgb::new(28, 64, 212)),
            empty: Some(Rgb::new(12, 16, 48)),
            tolerance: default_tolerance(),
            stride: default_stride(),
            threshold_percent: 25.0,
        }
    }

    /// Materialize the probe for a specific window with resolved references.
    pub fn probe_for(&self, window: WindowId, full: Rgb, empty: Rgb) -> BarProbe {
        BarProbe {
            window,
            start_x: self.start_x,
            end_x: self.end_x,
            y: self.y,
            full,
            empty,
            tolerance: self.tolerance,
            stride: self.stride,
            last_percentage: 100.0,
        }
    }
}

fn default_tolerance() -> f32 {
    60.0
}

fn default_stride() -> usize {
    2
}

fn default_threshold_percent() -> f64 {
    40.0
}

impl AppSettings {
    const SETTINGS_FILE: &'static str = "vitalwatch_settings.json";

    /// Load settings from file, or fall back to defaults.
    pub fn load() -> Self {
        match fs::read_to_string(Self::SETTINGS_FILE) {
            Ok(contents) => match serde_json::from_str::<AppSettings>(&contents) {
                Ok(mut settings) => {
                    // Ensure there is at least one vital to monitor
                    if settings.vitals.is_empty() {
                        settings.vitals.push(VitalProfile::default_hp());
                    }
                    settings
                }
                Err(e) => {
                    warn!("settings file is unreadable, using defaults: {}", e);
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }

    /// Save settings to file.
    pub fn save(&self) -> Result<(), String> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize: {}", e))?;

        fs::write(Self::SETTINGS_FILE, json).map_err(|e| format!("Failed to write file: {}", e))?;

        Ok(())
    }

    /// Auto-save (ignores errors)
    pub fn auto_save(&self) {
        let _ = self.save();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_consistent() {
        let settings = AppSettings::default();
        assert!(settings.cache.region_ttl_ms >= settings.cache.color_ttl_ms);
        assert_eq!(settings.monitor.max_windows, 8);
        assert_eq!(settings.vitals.len(), 2);
        assert_eq!(settings.vitals[0].stride, 2);
    }

    #[test]
    fn test_empty_json_takes_all_defaults() {
        let settings: AppSettings = serde_json::from_str("{}").unwrap();
        assert_eq!(settings.cache.color_ttl_ms, 40);
        assert_eq!(settings.monitor.window_class, "D3D Window");
    }

    #[test]
    fn test_customized_field_survives_reload() {
        let mut settings = AppSettings::default();
        settings.cache.max_entries = 128;
        settings.vitals[0].threshold_percent = 15.0;

        let json = serde_json::to_string(&settings).unwrap();
        let reloaded: AppSettings = serde_json::from_str(&json).unwrap();
        assert_eq!(reloaded.cache.max_entries, 128);
        assert_eq!(reloaded.vitals[0].threshold_percent, 15.0);
        // Untouched fields keep their defaults.
        assert_eq!(reloaded.cache.region_ttl_ms, 250);
    }

    #[test]
    fn test_missing_references_deserialize_as_none() {
        let json = r#"{"vitals": [{"label": "HP", "start_x": 0, "end_x": 100, "y": 10}]}"#;
        let settings: AppSettings = serde_json::from_str(json).unwrap();
        assert_eq!(settings.vitals.len(), 1);
        assert!(settings.vitals[0].full.is_none());
        assert!(settings.vitals[0].empty.is_none());
        assert_eq!(settings.vitals[0].tolerance, 60.0);
    }

    #[test]
    fn test_probe_materialization() {
        let profile = VitalProfile::default_hp();
        let probe = profile.probe_for(WindowId(7), Rgb::new(200, 0, 0), Rgb::BLACK);
        assert_eq!(probe.window, WindowId(7));
        assert_eq!(probe.start_x, 110);
        assert_eq!(probe.full, Rgb::new(200, 0, 0));
        assert_eq!(probe.last_percentage, 100.0);
    }
}
