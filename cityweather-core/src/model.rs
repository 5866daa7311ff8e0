use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::convert::TryFrom;

/// Unit system requested from the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Units {
    #[default]
    Metric,
    Imperial,
}

impl Units {
    pub fn as_str(&self) -> &'static str {
        match self {
            Units::Metric => "metric",
            Units::Imperial => "imperial",
        }
    }

    pub const fn all() -> &'static [Units] {
        &[Units::Metric, Units::Imperial]
    }

    pub fn temperature_symbol(&self) -> &'static str {
        match self {
            Units::Metric => "°C",
            Units::Imperial => "°F",
        }
    }

    pub fn wind_speed_unit(&self) -> &'static str {
        match self {
            Units::Metric => "m/s",
            Units::Imperial => "mph",
        }
    }
}

impl std::fmt::Display for Units {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for Units {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_lowercase().as_str() {
            "metric" => Ok(Units::Metric),
            "imperial" => Ok(Units::Imperial),
            _ => Err(anyhow::anyhow!(
                "Unknown unit system '{value}'. Supported unit systems: metric, imperial."
            )),
        }
    }
}

/// Per-call presentation options forwarded to the weather endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveOptions {
    pub units: Units,
    /// Provider language code, e.g. "en" or "tr".
    pub lang: String,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self { units: Units::default(), lang: "en".to_string() }
    }
}

/// A geocoded place. Coordinates are always present; a geocoding hit
/// without them is reported as "city not found" instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    pub display_name: Option<String>,
    pub country_code: Option<String>,
}

impl Location {
    /// "Ankara, TR", falling back to the coordinates when the provider gave no name.
    pub fn label(&self) -> String {
        match (&self.display_name, &self.country_code) {
            (Some(name), Some(country)) => format!("{name}, {country}"),
            (Some(name), None) => name.clone(),
            _ => format!("{:.4}, {:.4}", self.latitude, self.longitude),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentConditions {
    pub temperature: f64,
    pub feels_like: f64,
    pub humidity_pct: u8,
    pub wind_speed: f64,
    pub pressure_hpa: u32,
    pub uv_index: f64,
    pub description: String,
    pub icon_code: String,
    pub observed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlyEntry {
    pub time: DateTime<Utc>,
    pub temperature: f64,
    pub feels_like: f64,
    pub humidity_pct: u8,
    pub wind_speed: f64,
    pub pressure_hpa: u32,
    pub uv_index: f64,
    pub description: String,
    pub icon_code: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TemperatureRange {
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyEntry {
    pub time: DateTime<Utc>,
    pub temperature: TemperatureRange,
    /// Daytime apparent temperature.
    pub feels_like: f64,
    pub humidity_pct: u8,
    pub wind_speed: f64,
    pub pressure_hpa: u32,
    pub uv_index: f64,
    pub description: String,
    pub icon_code: String,
}

/// Everything one weather fetch produced. Owned by whoever asked for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherSnapshot {
    pub current: CurrentConditions,
    /// Chronological, at most 24 entries.
    pub hourly: Vec<HourlyEntry>,
    /// Chronological, at most 8 entries.
    pub daily: Vec<DailyEntry>,
    /// Offset of the location's local time from UTC.
    pub timezone_offset_seconds: i32,
}

/// Which of the two outbound calls failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStage {
    Geocoding,
    Weather,
}

impl std::fmt::Display for FetchStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchStage::Geocoding => f.write_str("geocoding"),
            FetchStage::Weather => f.write_str("weather"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum FailureReason {
    #[error("City not found. Check the spelling and try again.")]
    CityNotFound,

    #[error(
        "Weather data could not be retrieved ({stage} request failed). \
         Check that your API key is valid and active, then try again later."
    )]
    FetchFailed { stage: FetchStage },
}

/// The single value handed back to the presentation layer.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolutionResult {
    Success { snapshot: WeatherSnapshot, location: Location },
    Failure(FailureReason),
}

impl ResolutionResult {
    pub fn is_success(&self) -> bool {
        matches!(self, ResolutionResult::Success { .. })
    }

    pub fn location(&self) -> Option<&Location> {
        match self {
            ResolutionResult::Success { location, .. } => Some(location),
            ResolutionResult::Failure(_) => None,
        }
    }

    pub fn snapshot(&self) -> Option<&WeatherSnapshot> {
        match self {
            ResolutionResult::Success { snapshot, .. } => Some(snapshot),
            ResolutionResult::Failure(_) => None,
        }
    }

    pub fn failure(&self) -> Option<FailureReason> {
        match self {
            ResolutionResult::Success { .. } => None,
            ResolutionResult::Failure(reason) => Some(*reason),
        }
    }

    pub fn into_result(self) -> Result<(WeatherSnapshot, Location), FailureReason> {
        match self {
            ResolutionResult::Success { snapshot, location } => Ok((snapshot, location)),
            ResolutionResult::Failure(reason) => Err(reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn units_as_str_roundtrip() {
        for units in Units::all() {
            let parsed = Units::try_from(units.as_str()).expect("roundtrip should succeed");
            assert_eq!(*units, parsed);
        }
    }

    #[test]
    fn unknown_units_error() {
        let err = Units::try_from("kelvin").unwrap_err();
        assert!(err.to_string().contains("Unknown unit system"));
    }

    #[test]
    fn failure_messages_are_distinct() {
        let not_found = FailureReason::CityNotFound.to_string();
        let failed = FailureReason::FetchFailed { stage: FetchStage::Weather }.to_string();

        assert_ne!(not_found, failed);
        assert!(failed.contains("weather request failed"));
        assert!(failed.contains("API key is valid and active"));
    }

    #[test]
    fn location_label_falls_back_to_coordinates() {
        let named = Location {
            latitude: 39.9,
            longitude: 32.8,
            display_name: Some("Ankara".into()),
            country_code: Some("TR".into()),
        };
        assert_eq!(named.label(), "Ankara, TR");

        let anonymous = Location { display_name: None, country_code: None, ..named };
        assert_eq!(anonymous.label(), "39.9000, 32.8000");
    }

    #[test]
    fn failure_has_no_snapshot() {
        let result = ResolutionResult::Failure(FailureReason::CityNotFound);

        assert!(!result.is_success());
        assert!(result.snapshot().is_none());
        assert!(result.location().is_none());
        assert_eq!(result.into_result().unwrap_err(), FailureReason::CityNotFound);
    }
}
