use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::{
    Config,
    fetcher::Fetcher,
    model::{
        CurrentConditions, DailyEntry, FailureReason, FetchStage, HourlyEntry, Location,
        ResolutionResult, ResolveOptions, TemperatureRange, WeatherSnapshot,
    },
};

pub const HOURLY_LIMIT: usize = 24;
pub const DAILY_LIMIT: usize = 8;

/// Base URLs of the two provider APIs, without a trailing slash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub geocoding: String,
    pub weather: String,
}

/// Turns a city name into a [`ResolutionResult`]: geocode first, then one-call weather.
#[derive(Debug, Clone)]
pub struct WeatherResolver {
    fetcher: Fetcher,
    endpoints: Endpoints,
    defaults: ResolveOptions,
}

impl WeatherResolver {
    pub fn new(fetcher: Fetcher, endpoints: Endpoints, defaults: ResolveOptions) -> Self {
        Self { fetcher, endpoints, defaults }
    }

    /// Build a resolver over the real HTTP transport.
    pub fn from_config(config: &Config) -> Result<Self> {
        let fetcher = Fetcher::new(config.require_api_key()?)?;
        Ok(Self::new(fetcher, config.endpoints(), config.resolve_options()))
    }

    pub fn defaults(&self) -> &ResolveOptions {
        &self.defaults
    }

    pub async fn resolve(&self, city_name: &str) -> ResolutionResult {
        self.resolve_with(city_name, &self.defaults).await
    }

    pub async fn resolve_with(&self, city_name: &str, options: &ResolveOptions) -> ResolutionResult {
        let location = match self.geocode(city_name).await {
            Ok(location) => location,
            Err(reason) => return ResolutionResult::Failure(reason),
        };

        match self.fetch_snapshot(&location, options).await {
            Ok(snapshot) => ResolutionResult::Success { snapshot, location },
            Err(reason) => ResolutionResult::Failure(reason),
        }
    }

    async fn geocode(&self, city_name: &str) -> Result<Location, FailureReason> {
        let city_name = city_name.trim();
        if city_name.is_empty() {
            tracing::debug!("empty city name, skipping geocoding");
            return Err(FailureReason::CityNotFound);
        }

        let url = format!("{}/direct", self.endpoints.geocoding);
        let params = [("q", city_name.to_string()), ("limit", "1".to_string())];

        let Some(body) = self.fetcher.fetch(&url, &params).await else {
            tracing::warn!(city = city_name, "geocoding request exhausted its retries");
            return Err(FailureReason::FetchFailed { stage: FetchStage::Geocoding });
        };

        let location = parse_location(body).map_err(|error| {
            tracing::warn!(city = city_name, %error, "unexpected geocoding response");
            FailureReason::FetchFailed { stage: FetchStage::Geocoding }
        })?;

        location.ok_or_else(|| {
            tracing::info!(city = city_name, "no geocoding match");
            FailureReason::CityNotFound
        })
    }

    async fn fetch_snapshot(
        &self,
        location: &Location,
        options: &ResolveOptions,
    ) -> Result<WeatherSnapshot, FailureReason> {
        let url = format!("{}/onecall", self.endpoints.weather);
        let params = [
            ("lat", location.latitude.to_string()),
            ("lon", location.longitude.to_string()),
            ("exclude", "minutely,alerts".to_string()),
            ("units", options.units.as_str().to_string()),
            ("lang", options.lang.clone()),
        ];

        let failed = FailureReason::FetchFailed { stage: FetchStage::Weather };

        let Some(body) = self.fetcher.fetch(&url, &params).await else {
            tracing::warn!(location = %location.label(), "weather request exhausted its retries");
            return Err(failed);
        };

        parse_snapshot(body).map_err(|error| {
            tracing::warn!(location = %location.label(), %error, "unexpected one-call response");
            failed
        })
    }
}

/// First geocoding hit, or `None` when there is no usable match.
fn parse_location(body: Value) -> serde_json::Result<Option<Location>> {
    let entries: Vec<OwGeocodeEntry> = serde_json::from_value(body)?;

    let location = entries.into_iter().next().and_then(|entry| {
        Some(Location {
            latitude: entry.lat?,
            longitude: entry.lon?,
            display_name: entry.name,
            country_code: entry.country,
        })
    });

    Ok(location)
}

fn parse_snapshot(body: Value) -> serde_json::Result<WeatherSnapshot> {
    let parsed: OwOneCallResponse = serde_json::from_value(body)?;

    let current = parsed.current;
    let (description, icon_code) = describe(&current.weather);

    let timezone_offset_seconds = parsed.timezone_offset.unwrap_or_else(|| {
        tracing::warn!("one-call response has no timezone_offset, local times will be UTC");
        0
    });

    Ok(WeatherSnapshot {
        current: CurrentConditions {
            temperature: current.temp,
            feels_like: current.feels_like,
            humidity_pct: current.humidity,
            wind_speed: current.wind_speed,
            pressure_hpa: current.pressure,
            uv_index: current.uvi,
            description,
            icon_code,
            observed_at: unix_to_utc(current.dt),
        },
        hourly: parsed.hourly.into_iter().take(HOURLY_LIMIT).map(hourly_entry).collect(),
        daily: parsed.daily.into_iter().take(DAILY_LIMIT).map(daily_entry).collect(),
        timezone_offset_seconds,
    })
}

fn hourly_entry(hour: OwCurrent) -> HourlyEntry {
    let (description, icon_code) = describe(&hour.weather);

    HourlyEntry {
        time: unix_to_utc(hour.dt),
        temperature: hour.temp,
        feels_like: hour.feels_like,
        humidity_pct: hour.humidity,
        wind_speed: hour.wind_speed,
        pressure_hpa: hour.pressure,
        uv_index: hour.uvi,
        description,
        icon_code,
    }
}

fn daily_entry(day: OwDaily) -> DailyEntry {
    let (description, icon_code) = describe(&day.weather);

    DailyEntry {
        time: unix_to_utc(day.dt),
        temperature: TemperatureRange { min: day.temp.min, max: day.temp.max },
        feels_like: day.feels_like.day,
        humidity_pct: day.humidity,
        wind_speed: day.wind_speed,
        pressure_hpa: day.pressure,
        uv_index: day.uvi,
        description,
        icon_code,
    }
}

fn describe(weather: &[OwWeather]) -> (String, String) {
    weather
        .first()
        .map(|w| (w.description.clone(), w.icon.clone()))
        .unwrap_or_else(|| ("Unknown".to_string(), String::new()))
}

fn unix_to_utc(ts: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(ts, 0).unwrap_or_default()
}

#[derive(Debug, Deserialize)]
struct OwGeocodeEntry {
    lat: Option<f64>,
    lon: Option<f64>,
    name: Option<String>,
    country: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OwWeather {
    description: String,
    #[serde(default)]
    icon: String,
}

/// Shape shared by `current` and each `hourly` entry.
#[derive(Debug, Deserialize)]
struct OwCurrent {
    dt: i64,
    temp: f64,
    feels_like: f64,
    humidity: u8,
    pressure: u32,
    wind_speed: f64,
    #[serde(default)]
    uvi: f64,
    #[serde(default)]
    weather: Vec<OwWeather>,
}

#[derive(Debug, Deserialize)]
struct OwDailyTemp {
    min: f64,
    max: f64,
}

#[derive(Debug, Deserialize)]
struct OwDailyFeelsLike {
    day: f64,
}

#[derive(Debug, Deserialize)]
struct OwDaily {
    dt: i64,
    temp: OwDailyTemp,
    feels_like: OwDailyFeelsLike,
    humidity: u8,
    pressure: u32,
    wind_speed: f64,
    #[serde(default)]
    uvi: f64,
    #[serde(default)]
    weather: Vec<OwWeather>,
}

#[derive(Debug, Deserialize)]
struct OwOneCallResponse {
    timezone_offset: Option<i32>,
    current: OwCurrent,
    #[serde(default)]
    hourly: Vec<OwCurrent>,
    #[serde(default)]
    daily: Vec<OwDaily>,
}
