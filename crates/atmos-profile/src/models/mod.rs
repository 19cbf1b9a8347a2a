//! Turbulence model registry
//!
//! One provider abstraction for the parametric Cn² models. Each model
//! declares the pressure-level variables it needs, derives scalar
//! coefficients from the fetched series, exposes its closed-form vertical
//! shape through [`LayerModel`], and is sampled over a fixed altitude
//! ladder. Ladders are part of each model's contract: they determine the
//! integration accuracy of the downstream summary.

mod bufton;
mod greenwood;
mod hufnagel;

use crate::meteo::{HourlyBlock, HourlyFetcher, MeteoClient};
use crate::profile::{AtmosphericLayer, AtmosphericProfile};
use crate::{AtmosError, AtmosphereQuery, Result};

/// Registered turbulence models.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurbulenceModel {
    HufnagelValley,
    Bufton,
    Greenwood,
}

impl TurbulenceModel {
    /// Resolve a user-supplied model name.
    ///
    /// Case- and whitespace-insensitive. The empty string and "auto" select
    /// the default (Hufnagel-Valley); "hv57" is a documented alias for it.
    pub fn resolve(name: &str) -> Result<Self> {
        let normalized = name.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "" | "auto" => Ok(Self::HufnagelValley),
            "hufnagel-valley" | "hv57" => Ok(Self::HufnagelValley),
            "bufton" => Ok(Self::Bufton),
            "greenwood" => Ok(Self::Greenwood),
            _ => Err(AtmosError::ModelNotFound(name.trim().to_string())),
        }
    }

    /// Canonical key reported in profiles.
    pub fn key(&self) -> &'static str {
        match self {
            Self::HufnagelValley => "hufnagel-valley",
            Self::Bufton => "bufton",
            Self::Greenwood => "greenwood",
        }
    }

    /// Fetch drivers, derive coefficients and build the full profile.
    pub async fn build_profile<F: HourlyFetcher>(
        &self,
        query: &AtmosphereQuery,
        client: &MeteoClient<F>,
    ) -> Result<AtmosphericProfile> {
        match self {
            Self::HufnagelValley => hufnagel::build(query, client).await,
            Self::Bufton => bufton::build(query, client).await,
            Self::Greenwood => greenwood::build(query, client).await,
        }
    }
}

/// Closed-form vertical shape of one model.
///
/// Coefficient bundles implement this over their declared ladder; Cn² and
/// wind are total functions, temperature and humidity are optional
/// enrichments.
pub(crate) trait LayerModel {
    /// Cn² at height above ground in metres.
    fn cn2(&self, h_m: f64) -> f64;
    /// Wind speed at altitude in kilometres.
    fn wind(&self, alt_km: f64) -> f64;
    fn temperature(&self, _alt_km: f64) -> Option<f64> {
        None
    }
    fn humidity(&self, _alt_km: f64) -> Option<f64> {
        None
    }
}

/// Sample a model at each rung of its ascending altitude ladder.
pub(crate) fn build_layers(ladder: &[f64], model: &impl LayerModel) -> Vec<AtmosphericLayer> {
    ladder
        .iter()
        .map(|&alt_km| AtmosphericLayer {
            alt_km,
            cn2: Some(model.cn2(alt_km * 1000.0)),
            wind_mps: Some(model.wind(alt_km)),
            temperature_k: model.temperature(alt_km),
            humidity: model.humidity(alt_km),
        })
        .collect()
}

/// Wind magnitude at a pressure level from its u/v components.
///
/// A `null` component means the upstream could not model that level for the
/// requested hour, which the providers treat as a hard failure.
pub(crate) fn wind_speed(block: &HourlyBlock, level: &str, idx: usize) -> Result<f64> {
    let u = block.value_at(&format!("wind_u_component_{level}"), idx);
    let v = block.value_at(&format!("wind_v_component_{level}"), idx);
    match (u, v) {
        (Some(u), Some(v)) => Ok(u.hypot(v)),
        _ => Err(AtmosError::Provider(format!(
            "missing wind component for {level}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolution_is_case_and_whitespace_insensitive() {
        let a = TurbulenceModel::resolve(" HV57 ").unwrap();
        let b = TurbulenceModel::resolve("hufnagel-valley").unwrap();
        assert_eq!(a, b);
        assert_eq!(
            TurbulenceModel::resolve("  GREENWOOD\t").unwrap(),
            TurbulenceModel::Greenwood
        );
        assert_eq!(
            TurbulenceModel::resolve("Bufton").unwrap(),
            TurbulenceModel::Bufton
        );
    }

    #[test]
    fn empty_and_auto_resolve_to_the_default_model() {
        assert_eq!(
            TurbulenceModel::resolve("").unwrap(),
            TurbulenceModel::HufnagelValley
        );
        assert_eq!(
            TurbulenceModel::resolve("auto").unwrap(),
            TurbulenceModel::HufnagelValley
        );
    }

    #[test]
    fn unknown_models_are_rejected() {
        let err = TurbulenceModel::resolve("unknown-model").unwrap_err();
        match err {
            AtmosError::ModelNotFound(name) => assert_eq!(name, "unknown-model"),
            other => panic!("expected ModelNotFound, got {other:?}"),
        }
    }

    #[test]
    fn resolution_is_idempotent_over_canonical_keys() {
        for model in [
            TurbulenceModel::HufnagelValley,
            TurbulenceModel::Bufton,
            TurbulenceModel::Greenwood,
        ] {
            assert_eq!(TurbulenceModel::resolve(model.key()).unwrap(), model);
        }
    }

    #[test]
    fn layer_builder_samples_every_rung() {
        struct Flat;
        impl LayerModel for Flat {
            fn cn2(&self, _h_m: f64) -> f64 {
                1e-16
            }
            fn wind(&self, alt_km: f64) -> f64 {
                3.0 + alt_km
            }
            fn temperature(&self, alt_km: f64) -> Option<f64> {
                Some(288.0 - 6.5 * alt_km)
            }
        }

        let ladder = [0.0, 1.0, 5.0];
        let layers = build_layers(&ladder, &Flat);
        assert_eq!(layers.len(), 3);
        assert_eq!(layers[2].alt_km, 5.0);
        assert_eq!(layers[1].wind_mps, Some(4.0));
        assert_eq!(layers[0].temperature_k, Some(288.0));
        assert!(layers[0].humidity.is_none());
    }
}
