//! Bufton wind-band turbulence profile
//!
//! Four altitude bands, each an exponential decay scaled by the ground
//! turbulence strength, a wind-shear factor from the 500/850 hPa speed
//! difference, and a temperature-lapse correction from the 850 hPa level.
//! The temperature profile applies a standard tropospheric lapse rate from
//! the 850 hPa reference.

use serde_json::json;

use super::{build_layers, wind_speed, LayerModel};
use crate::meteo::{resolve_hour_index, HourlyFetcher, MeteoClient};
use crate::profile::{AtmosphericProfile, ProfileSources};
use crate::summary::summarize;
use crate::{AtmosphereQuery, Result};

const VARIABLES: [&str; 7] = [
    "wind_u_component_300hPa",
    "wind_v_component_300hPa",
    "wind_u_component_500hPa",
    "wind_v_component_500hPa",
    "wind_u_component_850hPa",
    "wind_v_component_850hPa",
    "temperature_850hPa",
];

const LADDER: [f64; 9] = [0.0, 0.25, 0.5, 1.0, 2.0, 3.0, 5.0, 8.0, 12.0];

/// Tropospheric lapse rate below and above the 850 hPa reference (K/km)
const LAPSE_RATE_K_PER_KM: f64 = -6.5;
/// Nominal altitude of the 850 hPa reference level (km)
const REFERENCE_ALT_KM: f64 = 1.5;
/// Lapse correction when the 850 hPa temperature is unavailable
const DEFAULT_LAPSE_CORRECTION: f64 = 0.8;
const MIN_GROUND_CN2: f64 = 1e-17;

const BASE_LOSS_AOD_DB: f64 = 0.25;
const BASE_LOSS_ABS_DB: f64 = 0.12;

/// Derived coefficients for the banded Cn² and piecewise wind shapes.
struct BuftonShape {
    ground_cn2: f64,
    shear_factor: f64,
    lapse_correction: f64,
    wind_300: f64,
    wind_500: f64,
    wind_850: f64,
    temp_850_k: Option<f64>,
}

impl LayerModel for BuftonShape {
    fn cn2(&self, h_m: f64) -> f64 {
        let h_km = h_m / 1000.0;
        if h_km < 0.5 {
            self.ground_cn2 * (-h_m / 60.0).exp()
        } else if h_km < 1.5 {
            0.3 * self.ground_cn2 * (-h_m / 120.0).exp() * self.shear_factor
        } else if h_km < 5.0 {
            0.08 * self.ground_cn2 * (-h_m / 600.0).exp() * self.lapse_correction
        } else {
            0.02 * self.ground_cn2 * (-(h_m - 5000.0) / 1500.0).exp()
        }
    }

    fn wind(&self, alt_km: f64) -> f64 {
        if alt_km < 0.5 {
            (self.wind_850 * 0.6).max(2.0)
        } else if alt_km < 1.5 {
            (self.wind_850 + self.wind_500) / 2.0
        } else if alt_km < 6.0 {
            self.wind_500
        } else {
            self.wind_300
        }
    }

    fn temperature(&self, alt_km: f64) -> Option<f64> {
        self.temp_850_k
            .map(|t| t + LAPSE_RATE_K_PER_KM * (alt_km - REFERENCE_ALT_KM))
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

    let wind_300 = wind_speed(&block, "300hPa", idx)?;
    let wind_500 = wind_speed(&block, "500hPa", idx)?;
    let wind_850 = wind_speed(&block, "850hPa", idx)?;

    let temp_850_c = block.value_at("temperature_850hPa", idx);
    let lapse_correction = match temp_850_c {
        Some(t) => ((t + 273.15) / 290.0).clamp(0.5, 1.5),
        None => DEFAULT_LAPSE_CORRECTION,
    };
    let shear_factor = ((wind_500 - wind_850).abs() / 10.0).clamp(0.5, 2.5);

    let shape = BuftonShape {
        ground_cn2: query.ground_cn2().max(MIN_GROUND_CN2),
        shear_factor,
        lapse_correction,
        wind_300,
        wind_500,
        wind_850,
        temp_850_k: temp_850_c.map(|t| t + 273.15),
    };

    let layers = build_layers(&LADDER, &shape);
    let fallback_wind =
        ((wind_300.powi(2) + wind_500.powi(2) + wind_850.powi(2)) / 3.0).sqrt();
    let mut summary = summarize(
        &layers,
        query.wavelength_nm,
        Some(fallback_wind),
        BASE_LOSS_AOD_DB,
        BASE_LOSS_ABS_DB,
    );
    summary.scintillation_index = Some((0.3 + 0.2 * shear_factor).min(1.5));

    let mut metadata = serde_json::Map::new();
    metadata.insert("daytime".to_string(), json!(query.is_day()));
    metadata.insert("wavelength_nm".to_string(), json!(query.wavelength_nm));
    metadata.insert("ground_cn2".to_string(), json!(query.ground_cn2()));
    metadata.insert(
        "wind_speed".to_string(),
        json!({
            "300hPa": wind_300,
            "500hPa": wind_500,
            "850hPa": wind_850,
        }),
    );
    if let Some(temp_k) = shape.temp_850_k {
        metadata.insert("temperature_850hPa_K".to_string(), json!(temp_k));
    }

    Ok(AtmosphericProfile {
        model: "bufton".to_string(),
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

#[cfg(test)]
mod tests {
    use super::*;

    fn shape() -> BuftonShape {
        BuftonShape {
            ground_cn2: 1e-14,
            shear_factor: 1.5,
            lapse_correction: 1.0,
            wind_300: 30.0,
            wind_500: 20.0,
            wind_850: 5.0,
            temp_850_k: Some(288.15),
        }
    }

    #[test]
    fn cn2_bands_apply_their_scales_and_factors() {
        let shape = shape();
        assert!((shape.cn2(0.0) - 1e-14).abs() < 1e-20);
        let band2 = 0.3 * 1e-14 * (-1000.0f64 / 120.0).exp() * 1.5;
        assert!((shape.cn2(1000.0) - band2).abs() < band2 * 1e-12);
        let band3 = 0.08 * 1e-14 * (-2000.0f64 / 600.0).exp();
        assert!((shape.cn2(2000.0) - band3).abs() < band3 * 1e-12);
        let band4 = 0.02 * 1e-14 * (-(8000.0f64 - 5000.0) / 1500.0).exp();
        assert!((shape.cn2(8000.0) - band4).abs() < band4 * 1e-12);
    }

    #[test]
    fn wind_is_piecewise_over_the_pressure_levels() {
        let shape = shape();
        assert_eq!(shape.wind(0.0), 3.0); // 0.6 * 5, floored at 2
        assert_eq!(shape.wind(1.0), 12.5); // mean of 850/500
        assert_eq!(shape.wind(3.0), 20.0); // 500 hPa band
        assert_eq!(shape.wind(8.0), 30.0); // 300 hPa band
    }

    #[test]
    fn temperature_follows_the_lapse_rate() {
        let shape = shape();
        assert_eq!(shape.temperature(1.5), Some(288.15));
        let t12 = shape.temperature(12.0).unwrap();
        assert!((t12 - (288.15 - 6.5 * 10.5)).abs() < 1e-9);
    }

    #[test]
    fn shear_factor_is_clamped() {
        for (w500, w850, expected) in [(20.0, 19.0, 0.5), (20.0, 5.0, 1.5), (60.0, 5.0, 2.5)] {
            let shear = ((w500 - w850) / 10.0f64).abs().clamp(0.5, 2.5);
            assert_eq!(shear, expected);
        }
    }
}
