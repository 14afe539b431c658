//! Consecutive-frame debouncing of eye closure and yawning.

use crate::config::DrowsinessConfig;
use crate::metrics::FaceMetrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionEvent {
    EyesClosed,
    Yawning,
}

impl DetectionEvent {
    pub fn label(&self) -> &'static str {
        match self {
            Self::EyesClosed => "Eyes closed",
            Self::Yawning => "Yawning",
        }
    }
}

/// Counters plus the single alert-armed flag shared by both conditions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DetectionState {
    pub eye_closed_frames: u32,
    pub yawn_frames: u32,
    pub alert_armed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub eye_closed: f32,
    pub eye_closed_frames: u32,
    pub yawn_ratio: f32,
    pub yawn_frames: u32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self::from_config(&DrowsinessConfig::default())
    }
}

impl Thresholds {
    pub fn from_config(config: &DrowsinessConfig) -> Self {
        Self {
            eye_closed: config.eye_closed_threshold,
            eye_closed_frames: config.eye_closed_debounce_frames,
            yawn_ratio: config.yawn_ratio_threshold,
            yawn_frames: config.yawn_debounce_frames,
        }
    }
}

pub struct DrowsinessTracker {
    thresholds: Thresholds,
    state: DetectionState,
}

impl DrowsinessTracker {
    pub fn new(thresholds: Thresholds) -> Self {
        Self {
            thresholds,
            state: DetectionState::default(),
        }
    }

    pub fn from_config(config: &DrowsinessConfig) -> Self {
        Self::new(Thresholds::from_config(config))
    }

    pub fn state(&self) -> DetectionState {
        self.state
    }

    pub fn is_armed(&self) -> bool {
        self.state.alert_armed
    }

    pub fn update_metrics(&mut self, metrics: &FaceMetrics) -> Option<DetectionEvent> {
        self.update(metrics.right_ear, metrics.left_ear, metrics.mar)
    }

    /// Feed one face's metrics; returns an event when a condition is confirmed
    /// and no alert is pending. Eye closure is checked before yawning.
    pub fn update(&mut self, right_ear: f32, left_ear: f32, mar: f32) -> Option<DetectionEvent> {
        let t = &self.thresholds;

        if right_ear < t.eye_closed && left_ear < t.eye_closed {
            self.state.eye_closed_frames = self.state.eye_closed_frames.saturating_add(1);
        } else {
            self.state.eye_closed_frames = 0;
        }

        if mar > t.yawn_ratio {
            self.state.yawn_frames = self.state.yawn_frames.saturating_add(1);
        } else {
            self.state.yawn_frames = 0;
        }

        if self.state.alert_armed {
            return None;
        }

        let event = if self.state.eye_closed_frames >= t.eye_closed_frames {
            DetectionEvent::EyesClosed
        } else if self.state.yawn_frames >= t.yawn_frames {
            DetectionEvent::Yawning
        } else {
            return None;
        };

        self.state.alert_armed = true;
        Some(event)
    }

    /// Clears the armed flag. Returns false if it was already clear.
    pub fn disarm(&mut self) -> bool {
        std::mem::replace(&mut self.state.alert_armed, false)
    }

    /// Stop signal: counters to zero and disarmed.
    pub fn reset(&mut self) {
        self.state = DetectionState::default();
    }
}
