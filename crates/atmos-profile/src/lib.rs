//! Atmospheric turbulence profile engine for FSO ground stations
//!
//! Estimates free-space optical link impairments for a geographic point and
//! time: a vertical refractive-index-structure (Cn²) and wind profile from a
//! parametric turbulence model, integrated into scalar propagation metrics
//! (Fried parameter, isoplanatic angle, Greenwood frequency, coherence time,
//! scintillation index, aerosol/absorption losses).
//!
//! Meteorological drivers come from an hourly pressure-level forecast API
//! (Open-Meteo by default) through a cacheing client. The engine itself is a
//! pure function of (location, time, model, physical parameters) to a
//! structured [`AtmosphericProfile`]; transport, persistence and routing live
//! in the surrounding service.
//!
//! A secondary sampler ([`field`]) reuses the same client to build coarse
//! global grids of one raw pressure-level variable for map overlays.

use chrono::{NaiveDateTime, Timelike};
use thiserror::Error;

pub mod field;
pub mod meteo;
pub mod models;
pub mod profile;
pub mod service;
pub mod summary;

// Re-exports
pub use field::{build_field, GridDefinition, WeatherField, WeatherFieldQuery};
pub use meteo::{
    resolve_hour_index, HourlyBlock, HourlyFetcher, MeteoClient, MeteoConfig, OpenMeteoFetcher,
};
pub use models::TurbulenceModel;
pub use profile::{AtmosphericLayer, AtmosphericProfile, AtmosphericSummary, ProfileSources};
pub use service::{AtmosphereService, FieldRequest, ProfileRequest};
pub use summary::summarize;

/// Default wavelength for link metrics when the caller does not supply one (nm)
pub const DEFAULT_WAVELENGTH_NM: f64 = 810.0;

#[derive(Error, Debug)]
pub enum AtmosError {
    #[error("atmospheric model '{0}' is not available")]
    ModelNotFound(String),
    #[error("invalid parameter: {0}")]
    Parameter(String),
    #[error("meteorological provider error: {0}")]
    Provider(String),
}

pub type Result<T> = std::result::Result<T, AtmosError>;

/// Input parameters consumed by the turbulence providers.
#[derive(Debug, Clone)]
pub struct AtmosphereQuery {
    pub lat: f64,
    pub lon: f64,
    pub timestamp: NaiveDateTime,
    pub model: String,
    pub ground_cn2_day: f64,
    pub ground_cn2_night: f64,
    pub wavelength_nm: f64,
}

impl AtmosphereQuery {
    /// Local hour in [6, 18) counts as daytime for ground turbulence.
    pub fn is_day(&self) -> bool {
        (6..18).contains(&self.timestamp.hour())
    }

    /// Ground Cn² selected by day/night.
    pub fn ground_cn2(&self) -> f64 {
        if self.is_day() {
            self.ground_cn2_day
        } else {
            self.ground_cn2_night
        }
    }

    /// Hour key matching the upstream hourly timeline ("YYYY-MM-DDTHH:00").
    pub fn hour_key(&self) -> String {
        self.timestamp.format("%Y-%m-%dT%H:00").to_string()
    }

    /// Date key used for the daily fetch and cache lookups.
    pub fn date_key(&self) -> String {
        self.timestamp.format("%Y-%m-%d").to_string()
    }

    /// UTC timestamp echoed in profiles, second precision.
    pub fn timestamp_utc(&self) -> String {
        self.timestamp.format("%Y-%m-%dT%H:%M:%SZ").to_string()
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn query_at(hour: u32) -> AtmosphereQuery {
        AtmosphereQuery {
            lat: 40.4,
            lon: -3.7,
            timestamp: chrono::NaiveDate::from_ymd_opt(2024, 6, 15)
                .unwrap()
                .and_hms_opt(hour, 0, 0)
                .unwrap(),
            model: "hufnagel-valley".to_string(),
            ground_cn2_day: 1e-14,
            ground_cn2_night: 1e-15,
            wavelength_nm: 810.0,
        }
    }

    #[test]
    fn day_night_selects_ground_cn2() {
        let day = query_at(12);
        assert!(day.is_day());
        assert_eq!(day.ground_cn2(), 1e-14);

        let night = query_at(3);
        assert!(!night.is_day());
        assert_eq!(night.ground_cn2(), 1e-15);

        // Boundaries: 06:00 is day, 18:00 is night
        assert!(query_at(6).is_day());
        assert!(!query_at(18).is_day());
    }

    #[test]
    fn lookup_keys_are_hourly_and_daily() {
        let query = query_at(9);
        assert_eq!(query.hour_key(), "2024-06-15T09:00");
        assert_eq!(query.date_key(), "2024-06-15");
        assert_eq!(query.timestamp_utc(), "2024-06-15T09:00:00Z");
    }
}
