//! Director settings types.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Default initial step size of the continuous director
pub const DEFAULT_INIT_STEP_SIZE: f64 = 0.1;

/// Default upper bound on the continuous step size
pub const DEFAULT_MAX_STEP_SIZE: f64 = 1.0;

/// Default cap on solver rounds for implicit methods
pub const DEFAULT_MAX_ITERATIONS: usize = 20;

/// Default local truncation error tolerance
pub const DEFAULT_ERROR_TOLERANCE: f64 = 1e-4;

/// Default resolution below which two values are considered equal
pub const DEFAULT_VALUE_RESOLUTION: f64 = 1e-6;

/// Default quantum of model time
pub const DEFAULT_TIME_RESOLUTION: f64 = 1e-10;

/// Errors raised while reading or validating settings
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SettingsError {
    #[error("Unknown solver '{0}'")]
    UnknownSolver(String),

    #[error("Invalid value {value} for '{name}': {reason}")]
    InvalidValue {
        name: &'static str,
        value: f64,
        reason: &'static str,
    },

    #[error("Settings JSON error: {0}")]
    Json(String),

    #[error("Cannot read settings file '{path}': {message}")]
    Io { path: String, message: String },
}

/// Available ODE solvers, selected by name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SolverType {
    /// Forward Euler (1st order, fixed step)
    ForwardEuler,
    /// Bogacki-Shampine 3(2)
    ExplicitRK23,
    /// Cash-Karp 5(4)
    #[default]
    ExplicitRK45,
    /// Backward Euler (1st order, implicit)
    BackwardEuler,
}

impl SolverType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SolverType::ForwardEuler => "ForwardEuler",
            SolverType::ExplicitRK23 => "ExplicitRK23",
            SolverType::ExplicitRK45 => "ExplicitRK45",
            SolverType::BackwardEuler => "BackwardEuler",
        }
    }

    /// All solvers the kernel knows about
    pub fn all() -> &'static [SolverType] {
        &[
            SolverType::ForwardEuler,
            SolverType::ExplicitRK23,
            SolverType::ExplicitRK45,
            SolverType::BackwardEuler,
        ]
    }
}

impl fmt::Display for SolverType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SolverType {
    type Err = SettingsError;

    /// Accepts the canonical names and the `...Solver` suffixed forms
    /// (`ExplicitRK45Solver`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        let name = name.strip_suffix("Solver").unwrap_or(name);
        SolverType::all()
            .iter()
            .copied()
            .find(|solver| solver.as_str().eq_ignore_ascii_case(name))
            .ok_or_else(|| SettingsError::UnknownSolver(s.to_string()))
    }
}

/// What the scheduler does with a dependency cycle no non-strict actor breaks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum CyclePolicy {
    /// Warn and schedule the cycle in discovery order; the engine reports
    /// the causality loop at commit time.
    #[default]
    Defer,
    /// Fail schedule construction with a not-schedulable error.
    Reject,
}

/// Fixed-point (synchronous-reactive) director settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FixedPointSettings {
    /// Number of iterations to run, 0 for unbounded
    pub iterations: usize,

    /// Model time advanced per tick; 0 advances only the microstep
    pub period: f64,

    /// Sleep so that model time does not run ahead of wall-clock time
    pub synchronize_to_real_time: bool,

    /// Handling of unbroken dependency cycles
    pub cycle_policy: CyclePolicy,
}

impl Default for FixedPointSettings {
    fn default() -> Self {
        Self {
            iterations: 0,
            period: 0.0,
            synchronize_to_real_time: false,
            cycle_policy: CyclePolicy::Defer,
        }
    }
}

impl FixedPointSettings {
    pub fn validate(&self) -> Result<(), SettingsError> {
        if !(self.period >= 0.0) || !self.period.is_finite() {
            return Err(SettingsError::InvalidValue {
                name: "period",
                value: self.period,
                reason: "must be finite and non-negative",
            });
        }
        Ok(())
    }
}

/// Continuous-time director settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContinuousSettings {
    /// Model start time
    pub start_time: f64,

    /// Model stop time, `None` runs until stopped
    pub stop_time: Option<f64>,

    /// Step size of the first continuous step
    pub init_step_size: f64,

    /// Upper bound on every continuous step
    pub max_step_size: f64,

    /// Maximum rounds per step for implicit solvers
    pub max_iterations: usize,

    /// Local truncation error tolerance
    pub error_tolerance: f64,

    /// Convergence resolution for implicit solvers
    pub value_resolution: f64,

    /// Quantum of model time
    pub time_resolution: f64,

    /// ODE solver
    pub solver: SolverType,

    /// Sleep so that model time does not run ahead of wall-clock time
    pub synchronize_to_real_time: bool,
}

impl Default for ContinuousSettings {
    fn default() -> Self {
        Self {
            start_time: 0.0,
            stop_time: None,
            init_step_size: DEFAULT_INIT_STEP_SIZE,
            max_step_size: DEFAULT_MAX_STEP_SIZE,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            error_tolerance: DEFAULT_ERROR_TOLERANCE,
            value_resolution: DEFAULT_VALUE_RESOLUTION,
            time_resolution: DEFAULT_TIME_RESOLUTION,
            solver: SolverType::default(),
            synchronize_to_real_time: false,
        }
    }
}

impl ContinuousSettings {
    /// Check the option combinations the director cannot run with
    pub fn validate(&self) -> Result<(), SettingsError> {
        fn positive(name: &'static str, value: f64) -> Result<(), SettingsError> {
            if value > 0.0 && value.is_finite() {
                Ok(())
            } else {
                Err(SettingsError::InvalidValue {
                    name,
                    value,
                    reason: "must be finite and positive",
                })
            }
        }

        positive("init_step_size", self.init_step_size)?;
        positive("max_step_size", self.max_step_size)?;
        positive("time_resolution", self.time_resolution)?;
        positive("value_resolution", self.value_resolution)?;

        if !(self.error_tolerance >= 0.0) {
            return Err(SettingsError::InvalidValue {
                name: "error_tolerance",
                value: self.error_tolerance,
                reason: "cannot be negative",
            });
        }
        if self.max_step_size < self.init_step_size {
            return Err(SettingsError::InvalidValue {
                name: "max_step_size",
                value: self.max_step_size,
                reason: "must not be smaller than init_step_size",
            });
        }
        if self.max_iterations < 1 {
            return Err(SettingsError::InvalidValue {
                name: "max_iterations",
                value: self.max_iterations as f64,
                reason: "must be at least 1",
            });
        }
        if !self.start_time.is_finite() {
            return Err(SettingsError::InvalidValue {
                name: "start_time",
                value: self.start_time,
                reason: "must be finite",
            });
        }
        if let Some(stop) = self.stop_time {
            if stop.is_nan() || stop < self.start_time {
                return Err(SettingsError::InvalidValue {
                    name: "stop_time",
                    value: stop,
                    reason: "must not precede start_time",
                });
            }
        }
        Ok(())
    }
}

/// Complete kernel configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelSettings {
    pub fixed_point: FixedPointSettings,
    pub continuous: ContinuousSettings,
}

impl KernelSettings {
    /// Parse settings from JSON; omitted fields take their defaults
    pub fn from_json(json: &str) -> Result<Self, SettingsError> {
        let settings: Self =
            serde_json::from_str(json).map_err(|e| SettingsError::Json(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Read and parse a JSON settings file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| SettingsError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_json(&json)
    }

    /// Serialize settings to pretty-printed JSON
    pub fn to_json(&self) -> Result<String, SettingsError> {
        serde_json::to_string_pretty(self).map_err(|e| SettingsError::Json(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        self.fixed_point.validate()?;
        self.continuous.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let s = ContinuousSettings::default();
        assert_eq!(s.start_time, 0.0);
        assert_eq!(s.stop_time, None);
        assert_eq!(s.init_step_size, 0.1);
        assert_eq!(s.max_step_size, 1.0);
        assert_eq!(s.max_iterations, 20);
        assert_eq!(s.error_tolerance, 1e-4);
        assert_eq!(s.solver, SolverType::ExplicitRK45);
        assert!(!s.synchronize_to_real_time);
        assert!(s.validate().is_ok());

        let f = FixedPointSettings::default();
        assert_eq!(f.iterations, 0);
        assert_eq!(f.cycle_policy, CyclePolicy::Defer);
    }

    #[test]
    fn test_solver_by_name() {
        assert_eq!(
            "ExplicitRK45Solver".parse::<SolverType>().unwrap(),
            SolverType::ExplicitRK45
        );
        assert_eq!(
            "backwardeuler".parse::<SolverType>().unwrap(),
            SolverType::BackwardEuler
        );
        for solver in SolverType::all() {
            assert_eq!(solver.as_str().parse::<SolverType>().unwrap(), *solver);
        }
        assert!(matches!(
            "Leapfrog".parse::<SolverType>(),
            Err(SettingsError::UnknownSolver(_))
        ));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let json = r#"{
            "fixed_point": { "iterations": 12 },
            "continuous": { "stop_time": 5.0, "solver": "ForwardEuler" }
        }"#;
        let settings = KernelSettings::from_json(json).unwrap();
        assert_eq!(settings.fixed_point.iterations, 12);
        assert_eq!(settings.continuous.stop_time, Some(5.0));
        assert_eq!(settings.continuous.solver, SolverType::ForwardEuler);
        assert_eq!(settings.continuous.max_iterations, DEFAULT_MAX_ITERATIONS);

        let text = settings.to_json().unwrap();
        assert_eq!(KernelSettings::from_json(&text).unwrap(), settings);
    }

    #[test]
    fn test_validation_rejects_bad_steps() {
        let mut s = ContinuousSettings::default();
        s.init_step_size = 2.0;
        assert!(matches!(
            s.validate(),
            Err(SettingsError::InvalidValue { name: "max_step_size", .. })
        ));

        let mut s = ContinuousSettings::default();
        s.max_iterations = 0;
        assert!(s.validate().is_err());

        let mut s = ContinuousSettings::default();
        s.stop_time = Some(-1.0);
        assert!(s.validate().is_err());

        let json = r#"{ "continuous": { "error_tolerance": -1.0 } }"#;
        assert!(KernelSettings::from_json(json).is_err());
    }

    #[test]
    fn test_missing_settings_file() {
        let path = std::env::temp_dir().join("fixsim-no-such-settings.json");
        match KernelSettings::from_file(&path) {
            Err(SettingsError::Io { path: reported, .. }) => {
                assert_eq!(reported, path.display().to_string());
            }
            other => panic!("expected an I/O error, got {other:?}"),
        }
    }

    #[test]
    fn test_settings_from_file() {
        let name = format!("fixsim-settings-{}.json", std::process::id());
        let path = std::env::temp_dir().join(name);
        std::fs::write(&path, r#"{ "continuous": { "solver": "ForwardEuler" } }"#).unwrap();
        let settings = KernelSettings::from_file(&path);
        std::fs::remove_file(&path).unwrap();
        assert_eq!(settings.unwrap().continuous.solver, SolverType::ForwardEuler);
    }
}
