//! Run configuration.
//!
//! Values come from built-in defaults, optionally overridden by a YAML file,
//! optionally overridden again by command-line flags. A YAML file may set any
//! subset of the fields:
//!
//! ```yaml
//! accuracy: 0.01             # step = accuracy * collision time
//! diagnostics_interval: 10.0 # 0 disables periodic diagnostics
//! snapshot_interval: 60.0
//! duration: 3600.0
//! verbose: false             # dump per-particle data with diagnostics
//! ```

use crate::error::{NbodyError, NbodyResult};
use serde::{Deserialize, Serialize};
use std::io::Read;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    /// Dimensionless factor applied to the collision time to get the step.
    pub accuracy: f64,
    /// Simulated time between diagnostics records; `0` for start/end only.
    pub diagnostics_interval: f64,
    /// Simulated time between snapshots.
    pub snapshot_interval: f64,
    /// Total simulated duration.
    pub duration: f64,
    pub verbose: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            accuracy: 0.03,
            diagnostics_interval: 0.0,
            snapshot_interval: 60.0,
            duration: 3600.0,
            verbose: false,
        }
    }
}

impl RunConfig {
    pub fn from_yaml_reader<R: Read>(reader: R) -> NbodyResult<Self> {
        Ok(serde_yaml::from_reader(reader)?)
    }

    /// Rejects values that would make the run meaningless or never end.
    pub fn validate(&self) -> NbodyResult<()> {
        let finite = [
            ("accuracy", self.accuracy),
            ("diagnostics interval", self.diagnostics_interval),
            ("snapshot interval", self.snapshot_interval),
            ("duration", self.duration),
        ];
        if let Some((name, value)) = finite.iter().find(|(_, v)| !v.is_finite()) {
            return Err(NbodyError::InvalidConfig(format!("{name} must be finite, got {value}")));
        }
        if self.accuracy <= 0.0 {
            return Err(NbodyError::InvalidConfig(format!(
                "accuracy must be positive, got {}",
                self.accuracy
            )));
        }
        if self.snapshot_interval <= 0.0 {
            return Err(NbodyError::InvalidConfig(format!(
                "snapshot interval must be positive, got {}",
                self.snapshot_interval
            )));
        }
        if self.diagnostics_interval < 0.0 {
            return Err(NbodyError::InvalidConfig(format!(
                "diagnostics interval must not be negative, got {}",
                self.diagnostics_interval
            )));
        }
        if self.duration < 0.0 {
            return Err(NbodyError::InvalidConfig(format!(
                "duration must not be negative, got {}",
                self.duration
            )));
        }
        Ok(())
    }
}
