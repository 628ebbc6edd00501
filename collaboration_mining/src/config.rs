use serde::{Deserialize, Serialize};

use crate::event_log::constants::{
    ACTIVITY_NAME, MESSAGE_ID_NAME, MESSAGE_TYPE_NAME, TIMESTAMP_NAME, TRACE_ID_NAME,
};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
/// Enable flags for the fall-throughs of the miner
///
/// The flower fall-through has no flag, as it always applies.
pub struct FallThroughConfig {
    /// Some trace is empty: `X(tau, ...)`
    pub empty_trace: bool,
    /// One activity occurs exactly once in every trace
    pub activity_once_per_trace: bool,
    /// Removing one activity yields a structural cut
    pub activity_concurrent: bool,
    /// Traces can be split where an end activity is directly followed by a start activity
    pub strict_tau_loop: bool,
    /// Traces can be split at every start activity
    pub tau_loop: bool,
}

impl Default for FallThroughConfig {
    fn default() -> Self {
        Self {
            empty_trace: true,
            activity_once_per_trace: true,
            activity_concurrent: true,
            strict_tau_loop: true,
            tau_loop: true,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
/// Parameters for mining one process tree per party
pub struct MiningConfig {
    /// Event attribute holding the activity name
    pub activity_key: String,
    /// Event attribute holding the event timestamp
    pub timestamp_key: String,
    /// Trace attribute holding the case id
    pub case_id_key: String,
    /// Event attribute flagging send/receive events
    pub message_type_key: String,
    /// Event attribute holding the message correlation id
    pub message_id_key: String,
    /// Fraction (0.0 to 1.0) of the most frequent directly-follows relation below which relations count as noise
    pub noise_threshold: f64,
    /// Stable sort of all traces by [`MiningConfig::timestamp_key`] before mining
    pub sort_events_by_timestamp: bool,
    /// Enabled fall-throughs
    pub fall_throughs: FallThroughConfig,
}

impl Default for MiningConfig {
    fn default() -> Self {
        Self {
            activity_key: ACTIVITY_NAME.to_string(),
            timestamp_key: TIMESTAMP_NAME.to_string(),
            case_id_key: TRACE_ID_NAME.to_string(),
            message_type_key: MESSAGE_TYPE_NAME.to_string(),
            message_id_key: MESSAGE_ID_NAME.to_string(),
            noise_threshold: 0.0,
            sort_events_by_timestamp: false,
            fall_throughs: FallThroughConfig::default(),
        }
    }
}

impl MiningConfig {
    /// Noise threshold clamped to `0.0..=1.0`
    pub fn effective_noise_threshold(&self) -> f64 {
        if self.noise_threshold.is_nan() {
            return 0.0;
        }
        self.noise_threshold.clamp(0.0, 1.0)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
/// Backend used for placing diagram nodes
pub enum LayoutBackendKind {
    /// Built-in layered layout (no external tools required)
    #[default]
    Layered,
    /// Graphviz `dot` (requires the `graphviz-export` feature and graphviz on the PATH)
    Graphviz,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
/// Parameters for the diagram layout
pub struct LayoutConfig {
    /// Width of the canvas raw coordinates are stretched to
    pub canvas_width: f64,
    /// Height of the canvas raw coordinates are stretched to
    pub canvas_height: f64,
    /// Base size of tasks (height and maximal half width)
    pub task_size: f64,
    /// Width and height of events
    pub event_size: f64,
    /// Width and height of gateways
    pub gateway_size: f64,
    /// Horizontal distance between two ranks of the layered backend
    pub rank_gap: f64,
    /// Vertical distance between two nodes of the same rank of the layered backend
    pub node_gap: f64,
    /// Node placement backend
    pub backend: LayoutBackendKind,
    /// Maximal time (in milliseconds) an external backend may take
    pub backend_timeout_ms: u64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            canvas_width: 2.5 * 1.25 * 1920.0,
            canvas_height: 2.5 * 1080.0,
            task_size: 60.0,
            event_size: 30.0,
            gateway_size: 60.0,
            rank_gap: 150.0,
            node_gap: 100.0,
            backend: LayoutBackendKind::default(),
            backend_timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(default)]
/// All parameters of a collaboration discovery run
pub struct CollaborationMiningConfig {
    /// Mining parameters
    pub mining: MiningConfig,
    /// Layout parameters
    pub layout: LayoutConfig,
}

impl CollaborationMiningConfig {
    /// Serialize parameters to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
    /// Deserialize parameters from JSON string
    ///
    /// Missing fields take their default values
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_uses_defaults() {
        let config =
            CollaborationMiningConfig::from_json(r#"{"mining": {"noise_threshold": 0.3}}"#)
                .unwrap();
        assert_eq!(config.mining.noise_threshold, 0.3);
        assert_eq!(config.mining.activity_key, "concept:name");
        assert!(config.mining.fall_throughs.tau_loop);
        assert_eq!(config.layout, LayoutConfig::default());
    }

    #[test]
    fn json_round_trip() {
        let mut config = CollaborationMiningConfig::default();
        config.mining.fall_throughs.activity_concurrent = false;
        config.layout.backend = LayoutBackendKind::Graphviz;
        let json = config.to_json().unwrap();
        assert_eq!(CollaborationMiningConfig::from_json(&json).unwrap(), config);
    }

    #[test]
    fn noise_threshold_is_clamped() {
        let config = MiningConfig {
            noise_threshold: 1.7,
            ..Default::default()
        };
        assert_eq!(config.effective_noise_threshold(), 1.0);
    }
}
