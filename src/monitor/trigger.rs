/// State change reported by a trigger update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerTransition {
    /// The percentage dropped below the threshold.
    Entered,
    /// The percentage recovered to or above the threshold.
    Cleared,
}

/// Threshold-crossing state for one monitored bar.
///
/// Below the threshold arms the trigger; at or above clears it. The same
/// threshold applies in both directions (no hysteresis), so a bar hovering
/// at the boundary can flap between states from tick to tick. That is the
/// intended behavior, not something to smooth over here; consumers that want
/// damping add it on their side.
#[derive(Debug, Clone)]
pub struct ThresholdTrigger {
    threshold: f64,
    triggered: bool,
}

impl ThresholdTrigger {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            triggered: false,
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered
    }

    /// Feed the latest percentage; returns the transition if the state
    /// changed.
    pub fn update(&mut self, percentage: f64) -> Option<TriggerTransition> {
        let below = percentage < self.threshold;
        match (self.triggered, below) {
            (false, true) => {
                self.triggered = true;
                Some(TriggerTransition::Entered)
            }
            (true, false) => {
                self.triggered = false;
                Some(TriggerTransition::Cleared)
            }
            _ => None,
        }
    }
}
