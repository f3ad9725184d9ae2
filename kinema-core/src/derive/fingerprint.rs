//! Structural fingerprints for range transforms.
//!
//! A fingerprint is the serde_json serialization of a range configuration.
//! Two configurations with the same fingerprint compile to interchangeable
//! interpolators, so a compiled interpolator can be reused whenever the
//! fingerprint is unchanged.

use std::fmt;

use serde::Serialize;

use crate::error::{MotionError, Result};
use crate::interpolate::{InterpolateOptions, Value};

/// Stable key summarizing a range transform's configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

/// Serialized shape of a range configuration.
#[derive(Serialize)]
struct RangeConfig<'a> {
    input: &'a [f64],
    output: &'a [Value],
    options: &'a InterpolateOptions,
}

impl Fingerprint {
    /// Fingerprint a range configuration.
    pub fn of_range(
        input: &[f64],
        output: &[Value],
        options: &InterpolateOptions,
    ) -> Result<Self> {
        let config = RangeConfig {
            input,
            output,
            options,
        };
        serde_json::to_string(&config)
            .map(Self)
            .map_err(|e| MotionError::configuration(format!("range cannot be fingerprinted: {e}")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
