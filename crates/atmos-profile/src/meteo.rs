//! External meteorological data access
//!
//! Wraps the Open-Meteo forecast endpoint: one GET per (location, UTC day,
//! variable set) returning the full hourly series, fronted by a bounded LRU
//! response cache so repeated lookups against the same day never re-issue the
//! remote call. The fetcher is a trait so tests and alternate data sources
//! can stand in for the real endpoint.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::{AtmosError, Result};

/// Meteorological client configuration
#[derive(Debug, Clone)]
pub struct MeteoConfig {
    /// Hourly forecast endpoint
    pub base_url: String,
    /// Remote request timeout in seconds
    pub timeout_sec: u64,
    /// Response cache capacity in entries
    pub cache_capacity: usize,
    /// Maximum in-flight requests during grid fan-out
    pub max_concurrent: usize,
}

impl Default for MeteoConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.open-meteo.com/v1/forecast".to_string(),
            timeout_sec: 10,
            cache_capacity: 128,
            max_concurrent: 6,
        }
    }
}

/// Hourly data block: a `time` timeline plus one parallel series per
/// requested variable. Upstream emits `null` for samples it cannot provide.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HourlyBlock {
    pub time: Vec<String>,
    #[serde(flatten)]
    pub series: HashMap<String, Vec<Option<f64>>>,
}

impl HourlyBlock {
    /// Value of `variable` at `idx`, if the series carries one.
    pub fn value_at(&self, variable: &str, idx: usize) -> Option<f64> {
        self.series
            .get(variable)
            .and_then(|series| series.get(idx))
            .copied()
            .flatten()
    }
}

/// Raw forecast payload; `hourly` is absent on malformed responses.
#[derive(Debug, Clone, Deserialize)]
pub struct ForecastResponse {
    pub hourly: Option<HourlyBlock>,
}

/// Seam between the cacheing client and the remote endpoint.
///
/// Production uses [`OpenMeteoFetcher`]; tests inject canned datasets.
pub trait HourlyFetcher: Send + Sync {
    /// Fetch the full hourly series for one location and UTC day.
    fn fetch_day(
        &self,
        lat: f64,
        lon: f64,
        date: &str,
        variables: &[String],
    ) -> impl Future<Output = Result<ForecastResponse>> + Send;
}

/// reqwest-backed fetcher for the forecast endpoint.
pub struct OpenMeteoFetcher {
    client: reqwest::Client,
    base_url: String,
}

impl OpenMeteoFetcher {
    pub fn new(config: &MeteoConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_sec))
            .build()
            .expect("Failed to create HTTP client");
        Self {
            client,
            base_url: config.base_url.clone(),
        }
    }
}

impl HourlyFetcher for OpenMeteoFetcher {
    async fn fetch_day(
        &self,
        lat: f64,
        lon: f64,
        date: &str,
        variables: &[String],
    ) -> Result<ForecastResponse> {
        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("latitude", format!("{lat:.3}")),
                ("longitude", format!("{lon:.3}")),
                ("start_date", date.to_string()),
                ("end_date", date.to_string()),
                ("timezone", "UTC".to_string()),
                ("hourly", variables.join(",")),
            ])
            .send()
            .await
            .map_err(|e| AtmosError::Provider(format!("forecast request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(AtmosError::Provider(format!(
                "forecast endpoint returned status {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AtmosError::Provider(format!("forecast response parse failed: {e}")))
    }
}

/// Cache key: coordinates rounded to 3 decimal places, the UTC date and the
/// sorted, deduplicated variable set.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    lat_mdeg: i64,
    lon_mdeg: i64,
    date: String,
    variables: Vec<String>,
}

impl CacheKey {
    fn new(lat: f64, lon: f64, date: &str, variables: &[String]) -> Self {
        Self {
            lat_mdeg: (lat * 1000.0).round() as i64,
            lon_mdeg: (lon * 1000.0).round() as i64,
            date: date.to_string(),
            variables: variables.to_vec(),
        }
    }
}

struct CacheEntry {
    block: HourlyBlock,
    last_used: u64,
}

/// Least-recently-used response cache with bounded capacity.
struct ResponseCache {
    entries: HashMap<CacheKey, CacheEntry>,
    capacity: usize,
    tick: u64,
}

impl ResponseCache {
    fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            capacity: capacity.max(1),
            tick: 0,
        }
    }

    fn get(&mut self, key: &CacheKey) -> Option<HourlyBlock> {
        self.tick += 1;
        let tick = self.tick;
        self.entries.get_mut(key).map(|entry| {
            entry.last_used = tick;
            entry.block.clone()
        })
    }

    fn insert(&mut self, key: CacheKey, block: HourlyBlock) {
        self.tick += 1;
        if self.entries.len() >= self.capacity && !self.entries.contains_key(&key) {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.last_used)
                .map(|(key, _)| key.clone());
            if let Some(oldest) = oldest {
                self.entries.remove(&oldest);
            }
        }
        self.entries.insert(
            key,
            CacheEntry {
                block,
                last_used: self.tick,
            },
        );
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Cacheing client over an [`HourlyFetcher`].
///
/// Constructed once at process start and shared by reference across request
/// handlers. Every cache hit yields an independent copy of the stored block,
/// never an alias into the cache.
pub struct MeteoClient<F: HourlyFetcher = OpenMeteoFetcher> {
    config: MeteoConfig,
    fetcher: F,
    cache: Mutex<ResponseCache>,
}

impl MeteoClient<OpenMeteoFetcher> {
    pub fn new(config: MeteoConfig) -> Self {
        let fetcher = OpenMeteoFetcher::new(&config);
        Self::with_fetcher(config, fetcher)
    }
}

impl Default for MeteoClient<OpenMeteoFetcher> {
    fn default() -> Self {
        Self::new(MeteoConfig::default())
    }
}

impl<F: HourlyFetcher> MeteoClient<F> {
    pub fn with_fetcher(config: MeteoConfig, fetcher: F) -> Self {
        let cache = Mutex::new(ResponseCache::new(config.cache_capacity));
        Self {
            config,
            fetcher,
            cache,
        }
    }

    pub fn config(&self) -> &MeteoConfig {
        &self.config
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Hourly series for one location and UTC day.
    ///
    /// Variable names are deduplicated and sorted before forming the cache
    /// key, so permutations of the same set share one entry and one remote
    /// call.
    pub async fn fetch_hourly(
        &self,
        lat: f64,
        lon: f64,
        date: &str,
        variables: &[&str],
    ) -> Result<HourlyBlock> {
        if variables.is_empty() {
            return Err(AtmosError::Provider(
                "no hourly variables requested".to_string(),
            ));
        }
        let mut names: Vec<String> = variables.iter().map(|v| (*v).to_string()).collect();
        names.sort_unstable();
        names.dedup();

        let key = CacheKey::new(lat, lon, date, &names);
        if let Some(block) = self.cache.lock().await.get(&key) {
            debug!(lat, lon, date, "hourly cache hit");
            return Ok(block);
        }

        info!(lat, lon, date, variables = names.len(), "fetching hourly forecast");
        let response = self.fetcher.fetch_day(lat, lon, date, &names).await?;
        let block = response.hourly.ok_or_else(|| {
            AtmosError::Provider(format!("forecast response for {date} missing 'hourly' block"))
        })?;

        self.cache.lock().await.insert(key, block.clone());
        Ok(block)
    }

    /// Number of cached responses, for diagnostics.
    pub async fn cache_len(&self) -> usize {
        self.cache.lock().await.len()
    }
}

/// Position of the exact `hour_key` in the block's timeline.
///
/// Upstream data is always on the hour, so only exact string matches count;
/// a missing timeline or absent key is a provider failure.
pub fn resolve_hour_index(block: &HourlyBlock, hour_key: &str) -> Result<usize> {
    if block.time.is_empty() {
        return Err(AtmosError::Provider(
            "hourly timeline unavailable".to_string(),
        ));
    }
    block
        .time
        .iter()
        .position(|t| t == hour_key)
        .ok_or_else(|| AtmosError::Provider(format!("no hourly sample available for {hour_key}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::StubFetcher;

    fn stub_client(fetcher: StubFetcher) -> MeteoClient<StubFetcher> {
        MeteoClient::with_fetcher(MeteoConfig::default(), fetcher)
    }

    #[tokio::test]
    async fn identical_requests_issue_one_remote_call() {
        let fetcher = StubFetcher::new("2024-06-15").with_constant("wind_speed_200hPa", 42.0);
        let client = stub_client(fetcher);

        let first = client
            .fetch_hourly(40.4001, -3.7001, "2024-06-15", &["wind_speed_200hPa"])
            .await
            .unwrap();
        // Same key after 3-decimal rounding and variable normalisation
        let second = client
            .fetch_hourly(40.4001, -3.7001, "2024-06-15", &["wind_speed_200hPa", "wind_speed_200hPa"])
            .await
            .unwrap();

        assert_eq!(client.fetcher().call_count(), 1);
        assert_eq!(first.time, second.time);
        assert_eq!(first.series, second.series);
    }

    #[tokio::test]
    async fn cache_hits_return_independent_copies() {
        let fetcher = StubFetcher::new("2024-06-15").with_constant("temperature_850hPa", 19.5);
        let client = stub_client(fetcher);

        let mut first = client
            .fetch_hourly(40.4, -3.7, "2024-06-15", &["temperature_850hPa"])
            .await
            .unwrap();
        first.series.insert("temperature_850hPa".to_string(), vec![]);
        first.time.clear();

        let second = client
            .fetch_hourly(40.4, -3.7, "2024-06-15", &["temperature_850hPa"])
            .await
            .unwrap();
        assert_eq!(client.fetcher().call_count(), 1);
        assert_eq!(second.time.len(), 24);
        assert_eq!(second.value_at("temperature_850hPa", 0), Some(19.5));
    }

    #[tokio::test]
    async fn distinct_coordinates_miss_the_cache() {
        let fetcher = StubFetcher::new("2024-06-15").with_constant("wind_speed_200hPa", 42.0);
        let client = stub_client(fetcher);

        client
            .fetch_hourly(40.4, -3.7, "2024-06-15", &["wind_speed_200hPa"])
            .await
            .unwrap();
        client
            .fetch_hourly(40.5, -3.7, "2024-06-15", &["wind_speed_200hPa"])
            .await
            .unwrap();
        assert_eq!(client.fetcher().call_count(), 2);
    }

    #[tokio::test]
    async fn cache_evicts_least_recently_used() {
        let fetcher = StubFetcher::new("2024-06-15").with_constant("wind_speed_200hPa", 42.0);
        let config = MeteoConfig {
            cache_capacity: 2,
            ..MeteoConfig::default()
        };
        let client = MeteoClient::with_fetcher(config, fetcher);
        let vars = ["wind_speed_200hPa"];

        client.fetch_hourly(10.0, 0.0, "2024-06-15", &vars).await.unwrap();
        client.fetch_hourly(20.0, 0.0, "2024-06-15", &vars).await.unwrap();
        // Touch the first entry so the second becomes least recently used
        client.fetch_hourly(10.0, 0.0, "2024-06-15", &vars).await.unwrap();
        // Third distinct key evicts the second
        client.fetch_hourly(30.0, 0.0, "2024-06-15", &vars).await.unwrap();
        assert_eq!(client.cache_len().await, 2);

        client.fetch_hourly(20.0, 0.0, "2024-06-15", &vars).await.unwrap();
        assert_eq!(client.fetcher().call_count(), 4);
    }

    #[tokio::test]
    async fn empty_variable_list_is_rejected() {
        let client = stub_client(StubFetcher::new("2024-06-15"));
        let err = client
            .fetch_hourly(40.4, -3.7, "2024-06-15", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, AtmosError::Provider(_)));
        assert_eq!(client.fetcher().call_count(), 0);
    }

    #[tokio::test]
    async fn missing_hourly_block_is_a_provider_error() {
        let client = stub_client(StubFetcher::new("2024-06-15").without_hourly());
        let err = client
            .fetch_hourly(40.4, -3.7, "2024-06-15", &["wind_speed_200hPa"])
            .await
            .unwrap_err();
        assert!(matches!(err, AtmosError::Provider(_)));
        // A failed fetch must not populate the cache
        assert_eq!(client.cache_len().await, 0);
    }

    #[tokio::test]
    async fn hour_resolver_matches_exact_keys_only() {
        let fetcher = StubFetcher::new("2024-06-15").with_constant("wind_speed_200hPa", 42.0);
        let client = stub_client(fetcher);
        let block = client
            .fetch_hourly(40.4, -3.7, "2024-06-15", &["wind_speed_200hPa"])
            .await
            .unwrap();

        assert_eq!(resolve_hour_index(&block, "2024-06-15T12:00").unwrap(), 12);
        let err = resolve_hour_index(&block, "2024-06-15T12:30").unwrap_err();
        assert!(err.to_string().contains("2024-06-15T12:30"));

        let empty = HourlyBlock {
            time: vec![],
            series: HashMap::new(),
        };
        assert!(resolve_hour_index(&empty, "2024-06-15T12:00").is_err());
    }

    #[test]
    fn hourly_block_parses_flattened_series() {
        let raw = r#"{
            "hourly": {
                "time": ["2024-06-15T00:00", "2024-06-15T01:00"],
                "wind_speed_200hPa": [31.5, null]
            }
        }"#;
        let parsed: ForecastResponse = serde_json::from_str(raw).unwrap();
        let block = parsed.hourly.unwrap();
        assert_eq!(block.value_at("wind_speed_200hPa", 0), Some(31.5));
        assert_eq!(block.value_at("wind_speed_200hPa", 1), None);
        assert_eq!(block.value_at("wind_speed_200hPa", 2), None);
        assert_eq!(block.value_at("temperature_850hPa", 0), None);
    }
}
