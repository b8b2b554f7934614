//! Type-safe bounds argument for sampling ranges.
//!
//! Provides a clap-compatible type for command-line `lo:hi` arguments with
//! automatic parsing, validation, and display formatting.

use std::fmt;
use std::str::FromStr;

/// Parse a closed sampling interval of the form "lo:hi".
///
/// # Validation Rules
/// - Both components must be finite floating-point numbers
/// - `lo` must not exceed `hi` (a degenerate `lo == hi` interval is allowed
///   and pins the value)
///
/// # Examples
/// Valid: "0.5:1.5", "3:8", "40:40"
///
/// Invalid:
/// - "1.0" - Missing upper bound
/// - "2.0:1.0" - Lower bound above upper bound
/// - "a:1" - Not a number
pub fn parse_bounds(s: &str) -> Result<(f64, f64), String> {
    let parts: Vec<&str> = s.split(':').collect();
    if parts.len() != 2 {
        return Err("Bounds must be in format 'lo:hi'".to_string());
    }

    let lo = parts[0]
        .trim()
        .parse::<f64>()
        .map_err(|_| "Invalid lower bound".to_string())?;
    let hi = parts[1]
        .trim()
        .parse::<f64>()
        .map_err(|_| "Invalid upper bound".to_string())?;

    if !lo.is_finite() || !hi.is_finite() {
        return Err("Bounds must be finite".to_string());
    }

    if lo > hi {
        return Err("Lower bound must not exceed upper bound".to_string());
    }

    Ok((lo, hi))
}

/// Closed sampling interval given on the command line as "lo:hi".
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundsArg(pub f64, pub f64);

impl FromStr for BoundsArg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (lo, hi) = parse_bounds(s)?;
        Ok(BoundsArg(lo, hi))
    }
}

impl fmt::Display for BoundsArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.0, self.1)
    }
}

impl BoundsArg {
    /// Lower bound of the interval
    pub fn lo(&self) -> f64 {
        self.0
    }

    /// Upper bound of the interval
    pub fn hi(&self) -> f64 {
        self.1
    }
}
