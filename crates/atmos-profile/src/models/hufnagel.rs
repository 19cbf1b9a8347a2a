//! Hufnagel-Valley turbulence profile
//!
//! Classic three-term Cn² model: a ground layer decaying on a 100 m scale, a
//! fixed upper-atmosphere background on 1500 m, and a tropopause term driven
//! by the 300 hPa wind magnitude. The wind profile saturates exponentially
//! toward the 300 hPa speed with a 5 km scale.

use serde_json::json;

use super::{build_layers, wind_speed, LayerModel};
use crate::meteo::{resolve_hour_index, HourlyFetcher, MeteoClient};
use crate::profile::{AtmosphericProfile, ProfileSources};
use crate::summary::summarize;
use crate::{AtmosphereQuery, Result};

const VARIABLES: [&str; 2] = ["wind_u_component_300hPa", "wind_v_component_300hPa"];

/// Sampling ladder (km); fixed for numeric parity with reference tables.
const LADDER: [f64; 9] = [0.0, 0.2, 0.5, 1.0, 2.0, 5.0, 10.0, 15.0, 20.0];

/// Floor for the upper-level wind magnitude (m/s)
const MIN_UPPER_WIND: f64 = 5.0;
/// Floor for the ground turbulence strength (m^-2/3)
const MIN_GROUND_CN2: f64 = 1e-17;

const BASE_LOSS_AOD_DB: f64 = 0.2;
const BASE_LOSS_ABS_DB: f64 = 0.1;

/// Derived coefficients: 300 hPa wind magnitude and ground Cn².
struct HufnagelShape {
    upper_wind: f64,
    ground_cn2: f64,
}

impl LayerModel for HufnagelShape {
    fn cn2(&self, h_m: f64) -> f64 {
        let tropopause = 0.00594
            * (self.upper_wind / 27.0).powi(2)
            * (h_m * 1e-5).powi(10)
            * (-h_m / 1000.0).exp();
        let background = 2.7e-16 * (-h_m / 1500.0).exp();
        let ground = self.ground_cn2 * (-h_m / 100.0).exp();
        tropopause + background + ground
    }

    fn wind(&self, alt_km: f64) -> f64 {
        (self.upper_wind * (1.0 - (-alt_km / 5.0).exp()) + 3.0).max(0.0)
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

    let upper_wind = wind_speed(&block, "300hPa", idx)?.max(MIN_UPPER_WIND);
    let shape = HufnagelShape {
        upper_wind,
        ground_cn2: query.ground_cn2().max(MIN_GROUND_CN2),
    };

    let layers = build_layers(&LADDER, &shape);
    let summary = summarize(
        &layers,
        query.wavelength_nm,
        Some(upper_wind),
        BASE_LOSS_AOD_DB,
        BASE_LOSS_ABS_DB,
    );

    Ok(AtmosphericProfile {
        model: "hufnagel-valley".to_string(),
        status: "ok".to_string(),
        timestamp: query.timestamp_utc(),
        summary,
        layers,
        sources: ProfileSources {
            provider: "Open-Meteo forecast".to_string(),
            variables: VARIABLES.iter().map(|v| (*v).to_string()).collect(),
        },
        metadata: json!({
            "daytime": query.is_day(),
            "wavelength_nm": query.wavelength_nm,
            "ground_cn2": query.ground_cn2(),
            "wind_speed_300hPa": upper_wind,
        }),
    })
}
