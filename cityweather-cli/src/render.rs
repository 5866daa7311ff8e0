use chrono::{DateTime, FixedOffset, Offset, Utc};
use cityweather_core::{FailureReason, Location, Units, WeatherSnapshot};
use std::fmt::Write;

pub const MISSING_CITY: &str = "Please enter a city name.";

/// Convert a UTC timestamp to the location's wall-clock time.
pub fn local_time(utc: DateTime<Utc>, offset_seconds: i32) -> DateTime<FixedOffset> {
    let offset = FixedOffset::east_opt(offset_seconds).unwrap_or_else(|| Utc.fix());
    utc.with_timezone(&offset)
}

pub fn snapshot(location: &Location, snapshot: &WeatherSnapshot, units: Units) -> String {
    let deg = units.temperature_symbol();
    let wind = units.wind_speed_unit();
    let offset = snapshot.timezone_offset_seconds;
    let current = &snapshot.current;

    let mut out = String::new();

    let _ = writeln!(out, "{}", location.label());
    let _ = writeln!(
        out,
        "  {}  ({})",
        capitalize(&current.description),
        local_time(current.observed_at, offset).format("%Y-%m-%d %H:%M"),
    );
    let _ = writeln!(
        out,
        "  Temperature: {:.1}{deg} (feels like {:.1}{deg})",
        current.temperature, current.feels_like
    );
    let _ = writeln!(out, "  Humidity:    {}%", current.humidity_pct);
    let _ = writeln!(out, "  Wind:        {:.1} {wind}", current.wind_speed);
    let _ = writeln!(out, "  Pressure:    {} hPa", current.pressure_hpa);
    let _ = writeln!(out, "  UV index:    {:.1}", current.uv_index);

    if !snapshot.hourly.is_empty() {
        let _ = writeln!(out, "\nHourly");
        for hour in &snapshot.hourly {
            let _ = writeln!(
                out,
                "  {}  {:>6.1}{deg}  {}",
                local_time(hour.time, offset).format("%H:%M"),
                hour.temperature,
                capitalize(&hour.description),
            );
        }
    }

    if !snapshot.daily.is_empty() {
        let _ = writeln!(out, "\nDaily");
        for day in &snapshot.daily {
            let _ = writeln!(
                out,
                "  {}  {:>6.1}{deg} / {:>6.1}{deg}  {}",
                local_time(day.time, offset).format("%a %Y-%m-%d"),
                day.temperature.min,
                day.temperature.max,
                capitalize(&day.description),
            );
        }
    }

    out
}

pub fn failure(city: &str, reason: FailureReason) -> String {
    match reason {
        FailureReason::CityNotFound => format!("Could not find a city named '{city}'."),
        FailureReason::FetchFailed { .. } => {
            format!("Could not load weather for '{city}'. {reason}")
        }
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
