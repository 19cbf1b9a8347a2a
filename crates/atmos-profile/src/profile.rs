//! Atmospheric profile value objects
//!
//! Layers, the scalar summary and the aggregate profile returned to callers.
//! Optional fields mean "not modeled by this provider at this altitude", not
//! zero; serialization drops them so downstream consumers never have to tell
//! "unknown" apart from an explicit null.

use serde::{Deserialize, Serialize};

/// One altitude sample of the vertical profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AtmosphericLayer {
    /// Altitude above ground (km)
    pub alt_km: f64,
    /// Refractive-index structure parameter (m^-2/3)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cn2: Option<f64>,
    /// Wind speed (m/s)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wind_mps: Option<f64>,
    /// Temperature (K)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature_k: Option<f64>,
    /// Relative humidity (%)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub humidity: Option<f64>,
}

/// Scalar optical-propagation metrics integrated from a vertical profile.
///
/// Absent fields were not computable from the available layers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AtmosphericSummary {
    /// Fried parameter at zenith (m)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub r0_zenith: Option<f64>,
    /// Greenwood frequency at zenith (Hz)
    #[serde(rename = "fG_zenith", skip_serializing_if = "Option::is_none")]
    pub fg_zenith: Option<f64>,
    /// Isoplanatic angle at zenith (arcsec)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub theta0_zenith: Option<f64>,
    /// RMS wind over the profile (m/s)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wind_rms: Option<f64>,
    /// Aerosol/optical-depth loss (dB)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loss_aod_db: Option<f64>,
    /// Molecular absorption loss (dB)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loss_abs_db: Option<f64>,
    /// Coherence time (ms)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coherence_time_ms: Option<f64>,
    /// Scintillation index (dimensionless)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scintillation_index: Option<f64>,
}

/// Provenance of the meteorological drivers behind a profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileSources {
    pub provider: String,
    pub variables: Vec<String>,
}

/// Aggregate result: one summary plus the layered profile it came from,
/// constructed once per request and immutable afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AtmosphericProfile {
    pub model: String,
    pub status: String,
    /// UTC, second precision, e.g. "2024-06-15T12:00:00Z"
    pub timestamp: String,
    pub summary: AtmosphericSummary,
    /// Ordered by ascending altitude
    pub layers: Vec<AtmosphericLayer>,
    pub sources: ProfileSources,
    /// Model-specific derived coefficients
    pub metadata: serde_json::Value,
}

impl AtmosphericProfile {
    /// JSON form with absent fields dropped.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).expect("profile serialization cannot fail")
    }
}
