//! Kernel constants and defaults

pub use fixsim_types::{
    DEFAULT_ERROR_TOLERANCE, DEFAULT_INIT_STEP_SIZE, DEFAULT_MAX_ITERATIONS,
    DEFAULT_MAX_STEP_SIZE, DEFAULT_TIME_RESOLUTION, DEFAULT_VALUE_RESOLUTION,
};

/// Small tolerance for numerical comparisons
pub const TOLERANCE: f64 = 1e-16;

/// Minimum scale factor for step size adjustment
pub const SOL_SCALE_MIN: f64 = 0.1;

/// Maximum scale factor for step size adjustment
pub const SOL_SCALE_MAX: f64 = 10.0;

/// Safety factor for adaptive error control
pub const SOL_BETA: f64 = 0.9;

/// Growth limit of the predicted step relative to the last accepted one
pub const STEP_GROWTH_LIMIT: f64 = 10.0;

/// Shrink factor applied when no controller proposes a smaller step
pub const STEP_REFINE_FACTOR: f64 = 0.5;
