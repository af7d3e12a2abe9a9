//! Vehicle supervisor parameters

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::Deserialize;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters of the vehicle supervisor.
#[derive(Debug, Clone, Deserialize)]
pub struct VehSupParams {
    /// Duration of vehicle calibration commands in seconds.
    pub calibration_time: f64,

    /// Relevant entities when performing a safe plan.
    pub safe_ents: Vec<String>,

    /// Period of the supervisor's tick in seconds.
    pub tick_period: f64,
}
