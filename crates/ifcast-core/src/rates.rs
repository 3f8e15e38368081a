//! Rate windows and human-unit rate parsing.
//!
//! The sampling tool reports every figure as three rolling averages
//! (last 2s / 10s / 40s) in human-suffixed units (`3.66Mb`, `219Kb`).
//! Everything past the parser works in plain bits per second.

use crate::error::{DomainError, DomainResult};
use serde::{Deserialize, Serialize};

/// The three rolling-average windows reported per direction, in bits
/// per second. `short` is the 2-second average, `medium` 10 seconds,
/// `long` 40 seconds. Never negative.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RateWindows {
    pub short_bps: f64,
    pub medium_bps: f64,
    pub long_bps: f64,
}

impl RateWindows {
    pub const fn new(short_bps: f64, medium_bps: f64, long_bps: f64) -> Self {
        Self {
            short_bps,
            medium_bps,
            long_bps,
        }
    }
}

/// Peak figures over the sampler run: one value per direction plus the
/// combined total, in bits per second.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PeakRates {
    pub sent_bps: f64,
    pub received_bps: f64,
    pub total_bps: f64,
}

/// Cumulative transfer figures over the sampler run, as reported by
/// the tool's `Cumulative` line.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CumulativeTotals {
    pub sent: f64,
    pub received: f64,
    pub total: f64,
}

/// Parses one human-unit rate token into bits per second.
///
/// Accepts the suffix forms the sampling tool emits: `b`/`B` (x1),
/// `Kb`/`KB` (x1e3), `Mb`/`MB` (x1e6), `Gb`/`GB` (x1e9). A bare number
/// parses as-is. Uppercase byte suffixes use the same decimal
/// multipliers as the bit forms.
///
/// # Errors
///
/// `DomainError::UnparsableRate` when the numeric part does not parse
/// or the value is negative.
pub fn parse_rate(token: &str) -> DomainResult<f64> {
    let token = token.trim();

    let (digits, multiplier) = match token {
        t if t.ends_with("Gb") || t.ends_with("GB") => (&t[..t.len() - 2], 1e9),
        t if t.ends_with("Mb") || t.ends_with("MB") => (&t[..t.len() - 2], 1e6),
        t if t.ends_with("Kb") || t.ends_with("KB") => (&t[..t.len() - 2], 1e3),
        t if t.ends_with('b') || t.ends_with('B') => (&t[..t.len() - 1], 1.0),
        t => (t, 1.0),
    };

    let value: f64 = digits.parse().map_err(|_| DomainError::UnparsableRate {
        token: token.to_string(),
    })?;

    if !value.is_finite() || value < 0.0 {
        return Err(DomainError::UnparsableRate {
            token: token.to_string(),
        });
    }

    Ok(value * multiplier)
}
