//! Profile and weather-field service boundary
//!
//! Owns one cacheing meteorological client shared by every request, resolves
//! models, parses boundary timestamps and applies request defaults. The HTTP
//! layer above this module is a thin adapter: it validates coordinate and
//! range constraints and maps the error taxonomy onto status codes.

use chrono::NaiveDateTime;
use serde::Deserialize;
use tracing::info;

use crate::field::{build_field, WeatherField, WeatherFieldQuery};
use crate::meteo::{HourlyFetcher, MeteoClient, MeteoConfig, OpenMeteoFetcher};
use crate::models::TurbulenceModel;
use crate::profile::AtmosphericProfile;
use crate::{AtmosError, AtmosphereQuery, Result, DEFAULT_WAVELENGTH_NM};

/// Defaults for the weather-field boundary.
const DEFAULT_FIELD_VARIABLE: &str = "wind_speed";
const DEFAULT_FIELD_LEVEL_HPA: u16 = 200;
const DEFAULT_FIELD_SAMPLES: u32 = 120;

/// Profile request as received from the routing layer.
#[derive(Debug, Clone, Deserialize)]
pub struct ProfileRequest {
    pub lat: f64,
    pub lon: f64,
    /// ISO timestamp, e.g. "2024-06-15T12:00", with optional seconds and "Z"
    pub timestamp: String,
    #[serde(default)]
    pub model: String,
    pub ground_cn2_day: f64,
    pub ground_cn2_night: f64,
    pub wavelength_nm: Option<f64>,
}

/// Weather-field request as received from the routing layer.
#[derive(Debug, Clone, Deserialize)]
pub struct FieldRequest {
    pub timestamp: String,
    pub variable: Option<String>,
    pub level_hpa: Option<u16>,
    pub samples: Option<u32>,
}

/// Request orchestration over a process-wide client instance.
pub struct AtmosphereService<F: HourlyFetcher = OpenMeteoFetcher> {
    client: MeteoClient<F>,
}

impl AtmosphereService<OpenMeteoFetcher> {
    pub fn new(config: MeteoConfig) -> Self {
        Self {
            client: MeteoClient::new(config),
        }
    }
}

impl Default for AtmosphereService<OpenMeteoFetcher> {
    fn default() -> Self {
        Self::new(MeteoConfig::default())
    }
}

impl<F: HourlyFetcher> AtmosphereService<F> {
    /// Build over an injected client (tests, alternate data sources).
    pub fn with_client(client: MeteoClient<F>) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &MeteoClient<F> {
        &self.client
    }

    /// Resolve the model and compute the full atmospheric profile.
    pub async fn build_profile(&self, request: &ProfileRequest) -> Result<AtmosphericProfile> {
        let model = TurbulenceModel::resolve(&request.model)?;
        let timestamp = parse_timestamp(&request.timestamp)?;
        let query = AtmosphereQuery {
            lat: request.lat,
            lon: request.lon,
            timestamp,
            model: model.key().to_string(),
            ground_cn2_day: request.ground_cn2_day,
            ground_cn2_night: request.ground_cn2_night,
            wavelength_nm: request.wavelength_nm.unwrap_or(DEFAULT_WAVELENGTH_NM),
        };
        info!(
            model = model.key(),
            lat = query.lat,
            lon = query.lon,
            "building atmospheric profile"
        );
        model.build_profile(&query, &self.client).await
    }

    /// Sample a coarse global grid of one raw pressure-level variable.
    pub async fn build_field(&self, request: &FieldRequest) -> Result<WeatherField> {
        let timestamp = parse_timestamp(&request.timestamp)?;
        let query = WeatherFieldQuery {
            timestamp,
            variable: request
                .variable
                .clone()
                .unwrap_or_else(|| DEFAULT_FIELD_VARIABLE.to_string()),
            level_hpa: request.level_hpa.unwrap_or(DEFAULT_FIELD_LEVEL_HPA),
            samples: request.samples.unwrap_or(DEFAULT_FIELD_SAMPLES),
        };
        build_field(&query, &self.client).await
    }
}

/// Parse a boundary ISO timestamp.
///
/// Minutes-only and seconds forms are accepted, with an optional trailing
/// "Z"; anything else is a caller error, not retryable.
pub fn parse_timestamp(raw: &str) -> Result<NaiveDateTime> {
    let trimmed = raw.trim().trim_end_matches('Z');
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"] {
        if let Ok(timestamp) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(timestamp);
        }
    }
    Err(AtmosError::Parameter(format!("malformed timestamp '{raw}'")))
}
