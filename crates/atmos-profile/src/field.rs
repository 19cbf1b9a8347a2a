//! Global weather field sampling
//!
//! Builds a coarse lat/lon grid of one raw pressure-level variable for map
//! overlays, reusing the cacheing hourly client. One fetch is issued per
//! grid point; fetches fan out in bounded batches so the upstream rate limit
//! sees at most `max_concurrent` in-flight requests, while the output stays
//! in row-major order.

use chrono::NaiveDateTime;
use futures::future::join_all;
use serde::Serialize;
use tracing::info;

use crate::meteo::{resolve_hour_index, HourlyFetcher, MeteoClient};
use crate::{AtmosError, Result};

/// Parameters describing the requested global field.
#[derive(Debug, Clone)]
pub struct WeatherFieldQuery {
    pub timestamp: NaiveDateTime,
    pub variable: String,
    pub level_hpa: u16,
    /// Sample-count hint; the grid is derived from it deterministically
    pub samples: u32,
}

/// One catalogued variable: upstream series key per supported level.
#[derive(Debug)]
struct VariableDefinition {
    key: &'static str,
    label: &'static str,
    units: &'static str,
    levels: &'static [(u16, &'static str)],
}

static CATALOG: [VariableDefinition; 4] = [
    VariableDefinition {
        key: "wind_speed",
        label: "Wind speed",
        units: "m/s",
        levels: &[
            (200, "wind_speed_200hPa"),
            (250, "wind_speed_250hPa"),
            (300, "wind_speed_300hPa"),
            (500, "wind_speed_500hPa"),
            (700, "wind_speed_700hPa"),
            (850, "wind_speed_850hPa"),
        ],
    },
    VariableDefinition {
        key: "temperature",
        label: "Temperature",
        units: "degC",
        levels: &[
            (200, "temperature_200hPa"),
            (300, "temperature_300hPa"),
            (500, "temperature_500hPa"),
            (700, "temperature_700hPa"),
            (850, "temperature_850hPa"),
        ],
    },
    VariableDefinition {
        key: "relative_humidity",
        label: "Relative humidity",
        units: "%",
        levels: &[
            (700, "relative_humidity_700hPa"),
            (850, "relative_humidity_850hPa"),
            (925, "relative_humidity_925hPa"),
        ],
    },
    VariableDefinition {
        key: "geopotential_height",
        label: "Geopotential height",
        units: "m",
        levels: &[
            (500, "geopotential_height_500hPa"),
            (700, "geopotential_height_700hPa"),
            (850, "geopotential_height_850hPa"),
        ],
    },
];

fn resolve_variable(variable: &str, level_hpa: u16) -> Result<(&'static VariableDefinition, &'static str)> {
    let key = variable.trim().to_ascii_lowercase();
    let definition = CATALOG
        .iter()
        .find(|d| d.key == key)
        .ok_or_else(|| AtmosError::Parameter(format!("unsupported variable '{variable}'")))?;
    let series_key = definition
        .levels
        .iter()
        .find(|(level, _)| *level == level_hpa)
        .map(|(_, series_key)| *series_key)
        .ok_or_else(|| {
            AtmosError::Parameter(format!(
                "variable '{variable}' is not available at {level_hpa} hPa"
            ))
        })?;
    Ok((definition, series_key))
}

/// Approximately uniform lat/lon sampling grid; never mutated once built.
#[derive(Debug, Clone, Serialize)]
pub struct GridDefinition {
    pub rows: usize,
    pub cols: usize,
    pub latitudes: Vec<f64>,
    pub longitudes: Vec<f64>,
}

const MIN_SAMPLES: u32 = 16;
const MAX_SAMPLES: u32 = 900;
const LAT_SPAN: (f64, f64) = (-80.0, 80.0);
const LON_SPAN: (f64, f64) = (-180.0, 180.0);

fn lerp(start: f64, end: f64, fraction: f64) -> f64 {
    start + (end - start) * fraction
}

fn axis(span: (f64, f64), count: usize) -> Vec<f64> {
    (0..count)
        .map(|idx| {
            if count > 1 {
                lerp(span.0, span.1, idx as f64 / (count - 1) as f64)
            } else {
                0.0
            }
        })
        .collect()
}

fn generate_grid(sample_hint: u32) -> GridDefinition {
    let clamped = f64::from(sample_hint.clamp(MIN_SAMPLES, MAX_SAMPLES));
    let cols = ((clamped * 2.0).sqrt().round() as usize).max(12);
    let rows = ((clamped / cols as f64).ceil() as usize).max(6);

    GridDefinition {
        rows,
        cols,
        latitudes: axis(LAT_SPAN, rows),
        longitudes: axis(LON_SPAN, cols),
    }
}

/// Sampled variable as echoed back to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct FieldVariable {
    pub key: String,
    pub label: String,
    pub units: String,
    pub pressure_hpa: u16,
    pub series_key: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FieldGrid {
    pub rows: usize,
    pub cols: usize,
    pub latitudes: Vec<f64>,
    pub longitudes: Vec<f64>,
    /// Row-major samples; `null` where upstream had no value
    pub values: Vec<Vec<Option<f64>>>,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub valid_samples: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct FieldMetadata {
    pub requested_samples: u32,
    pub actual_samples: usize,
}

/// Serialized grid result for the visualization layer.
#[derive(Debug, Clone, Serialize)]
pub struct WeatherField {
    pub status: String,
    pub timestamp: String,
    pub variable: FieldVariable,
    pub grid: FieldGrid,
    pub metadata: FieldMetadata,
}

/// Sample one catalogued variable over the derived global grid.
pub async fn build_field<F: HourlyFetcher>(
    query: &WeatherFieldQuery,
    client: &MeteoClient<F>,
) -> Result<WeatherField> {
    let (definition, series_key) = resolve_variable(&query.variable, query.level_hpa)?;
    let grid = generate_grid(query.samples);
    let date_key = query.timestamp.format("%Y-%m-%d").to_string();
    let hour_key = query.timestamp.format("%Y-%m-%dT%H:00").to_string();

    info!(
        variable = series_key,
        rows = grid.rows,
        cols = grid.cols,
        "sampling weather field"
    );

    let points: Vec<(f64, f64)> = grid
        .latitudes
        .iter()
        .flat_map(|&lat| grid.longitudes.iter().map(move |&lon| (lat, lon)))
        .collect();

    let mut flat: Vec<Option<f64>> = Vec::with_capacity(points.len());
    for chunk in points.chunks(client.config().max_concurrent.max(1)) {
        let batch = join_all(chunk.iter().map(|&(lat, lon)| {
            let date_key = date_key.as_str();
            let hour_key = hour_key.as_str();
            async move {
                let block = client.fetch_hourly(lat, lon, date_key, &[series_key]).await?;
                let idx = resolve_hour_index(&block, hour_key)?;
                Ok::<Option<f64>, AtmosError>(block.value_at(series_key, idx))
            }
        }))
        .await;
        for value in batch {
            flat.push(value?);
        }
    }

    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    let mut sum = 0.0;
    let mut valid = 0usize;
    for value in flat.iter().flatten() {
        min = min.min(*value);
        max = max.max(*value);
        sum += value;
        valid += 1;
    }
    if valid == 0 || !min.is_finite() || !max.is_finite() {
        return Err(AtmosError::Provider(
            "no valid samples returned for weather field".to_string(),
        ));
    }

    let values: Vec<Vec<Option<f64>>> = flat.chunks(grid.cols).map(<[_]>::to_vec).collect();

    Ok(WeatherField {
        status: "ok".to_string(),
        timestamp: query.timestamp.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        variable: FieldVariable {
            key: definition.key.to_string(),
            label: definition.label.to_string(),
            units: definition.units.to_string(),
            pressure_hpa: query.level_hpa,
            series_key: series_key.to_string(),
        },
        grid: FieldGrid {
            rows: grid.rows,
            cols: grid.cols,
            latitudes: grid.latitudes.clone(),
            longitudes: grid.longitudes.clone(),
            values,
            min,
            max,
            mean: sum / valid as f64,
            valid_samples: valid,
        },
        metadata: FieldMetadata {
            requested_samples: query.samples,
            actual_samples: grid.rows * grid.cols,
        },
    })
}
