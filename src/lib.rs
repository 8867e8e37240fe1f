pub mod calibration;
pub mod core;
pub mod monitor;
pub mod sampling;
pub mod settings;

pub use crate::monitor::bar::{BarEstimator, BarProbe};
pub use crate::monitor::driver::{MonitorEvent, PollingDriver};
pub use crate::monitor::trigger::{ThresholdTrigger, TriggerTransition};
pub use crate::sampling::batch::BatchSampler;
pub use crate::sampling::cache::{CacheConfig, SampleCache, SampleKind};
pub use crate::sampling::source::{FramePixelSource, PixelSource, SampleError};
pub use crate::settings::AppSettings;
