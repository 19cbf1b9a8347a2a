//! Greenwood turbulence profile
//!
//! Humidity-scaled core decay with band additions above 2 km and 8 km,
//! driven by the 200/300 hPa winds, the 200 hPa temperature and the 700 hPa
//! relative humidity. Of the two Greenwood renditions in circulation this is
//! the richer one: temperature and humidity profiles are attached to the
//! layers when the drivers are available.

use serde_json::json;

use super::{build_layers, wind_speed, LayerModel};
use crate::meteo::{resolve_hour_index, HourlyFetcher, MeteoClient};
use crate::profile::{AtmosphericProfile, ProfileSources};
use crate::summary::summarize;
use crate::{AtmosphereQuery, Result};

const VARIABLES: [&str; 6] = [
    "wind_u_component_200hPa",
    "wind_v_component_200hPa",
    "wind_u_component_300hPa",
    "wind_v_component_300hPa",
    "temperature_200hPa",
    "relative_humidity_700hPa",
];

const LADDER: [f64; 8] = [0.0, 0.5, 1.5, 3.0, 6.0, 9.0, 12.0, 16.0];

/// Upper-atmosphere lapse rate above the 200 hPa reference (K/km)
const LAPSE_RATE_K_PER_KM: f64 = -3.0;
/// Nominal altitude of the 200 hPa reference level (km)
const REFERENCE_ALT_KM: f64 = 12.0;
/// Relative humidity floor for the decayed upper profile (%)
const MIN_HUMIDITY_PCT: f64 = 5.0;
const MIN_GROUND_CN2: f64 = 5e-18;

const BASE_LOSS_AOD_DB: f64 = 0.22;
const BASE_LOSS_ABS_DB: f64 = 0.11;

/// Derived coefficients for the humidity-scaled vertical shape.
struct GreenwoodShape {
    ground_cn2: f64,
    humidity_factor: f64,
    wind_200: f64,
    wind_300: f64,
    high_wind: f64,
    temp_200_k: Option<f64>,
    humidity_700: Option<f64>,
}

impl LayerModel for GreenwoodShape {
    fn cn2(&self, h_m: f64) -> f64 {
        let h_km = h_m / 1000.0;
        let core = 0.04 * self.ground_cn2 * self.humidity_factor * (-h_m / 800.0).exp();
        if h_km > 8.0 {
            core + 1.5e-17 * (-(h_m - 8000.0) / 2000.0).exp()
        } else if h_km > 2.0 {
            core + 4.5e-17 * (-(h_m - 2000.0) / 1500.0).exp()
        } else {
            core
        }
    }

    fn wind(&self, alt_km: f64) -> f64 {
        if alt_km < 2.0 {
            (self.wind_300 * 0.5).max(3.0)
        } else if alt_km < 6.0 {
            (self.wind_300 + self.wind_200) / 2.0
        } else {
            self.high_wind
        }
    }

    fn temperature(&self, alt_km: f64) -> Option<f64> {
        self.temp_200_k
            .map(|t| t + LAPSE_RATE_K_PER_KM * (alt_km - REFERENCE_ALT_KM))
    }

    fn humidity(&self, alt_km: f64) -> Option<f64> {
        self.humidity_700.map(|rh| {
            if alt_km < 3.0 {
                rh
            } else {
                (rh * (-(alt_km - 3.0) / 2.5).exp()).max(MIN_HUMIDITY_PCT)
            }
        })
    }
}

pub(crate) async fn build<F: HourlyFetcher>(
    query: &AtmosphereQuery,
    client: &MeteoClient<F>,
) -> Result<AtmosphericProfile> {
    let block = client
        .fetch_hourly(query.lat, query.lon, &query.date_key(), &VARIABLES)
        .await?;
    let idx = resolve_hour_index(&block, &query.hour_key())?;

    let wind_200 = wind_speed(&block, "200hPa", idx)?;
    let wind_300 = wind_speed(&block, "300hPa", idx)?;
    let temp_200_c = block.value_at("temperature_200hPa", idx);
    let humidity_700 = block.value_at("relative_humidity_700hPa", idx);

    let humidity_factor = humidity_700
        .map(|rh| 1.0 + ((rh - 40.0) / 200.0).max(0.0))
        .unwrap_or(1.0);
    let high_wind = wind_200.max(wind_300);

    let shape = GreenwoodShape {
        ground_cn2: query.ground_cn2().max(MIN_GROUND_CN2),
        humidity_factor,
        wind_200,
        wind_300,
        high_wind,
        temp_200_k: temp_200_c.map(|t| t + 273.15),
        humidity_700,
    };

    let layers = build_layers(&LADDER, &shape);
    let mut summary = summarize(
        &layers,
        query.wavelength_nm,
        Some(high_wind),
        BASE_LOSS_AOD_DB,
        BASE_LOSS_ABS_DB,
    );
    summary.scintillation_index = Some((0.35 + 0.25 * humidity_factor).min(1.8));

    let mut metadata = serde_json::Map::new();
    metadata.insert("daytime".to_string(), json!(query.is_day()));
    metadata.insert("wavelength_nm".to_string(), json!(query.wavelength_nm));
    metadata.insert("ground_cn2".to_string(), json!(query.ground_cn2()));
    metadata.insert(
        "wind_speed".to_string(),
        json!({
            "200hPa": wind_200,
            "300hPa": wind_300,
        }),
    );
    if let Some(rh) = humidity_700 {
        metadata.insert("humidity_700hPa_percent".to_string(), json!(rh));
    }

    Ok(AtmosphericProfile {
        model: "greenwood".to_string(),
        status: "ok".to_string(),
        timestamp: query.timestamp_utc(),
        summary,
        layers,
        sources: ProfileSources {
            provider: "Open-Meteo forecast".to_string(),
            variables: VARIABLES.iter().map(|v| (*v).to_string()).collect(),
        },
        metadata: serde_json::Value::Object(metadata),
    })
}
