//! Core library for `cityweather`.
//!
//! This crate defines:
//! - Configuration (API key, endpoints, units, language)
//! - A resilient fetcher with exponential backoff
//! - The two-stage resolver (geocoding, then one-call weather)
//! - A single-flight supervisor that delivers results over a channel
//!
//! It is used by `cityweather-cli`, but any presentation layer can drive it
//! through [`ResolveSupervisor`] or call [`WeatherResolver::resolve`] directly.

pub mod config;
pub mod fetcher;
pub mod model;
pub mod resolver;
pub mod supervisor;

pub use config::Config;
pub use fetcher::{Fetcher, RetryPolicy, Transport, TransportError};
pub use model::{
    CurrentConditions, DailyEntry, FailureReason, FetchStage, HourlyEntry, Location,
    ResolutionResult, ResolveOptions, TemperatureRange, Units, WeatherSnapshot,
};
pub use resolver::{Endpoints, WeatherResolver};
pub use supervisor::{Completion, CompletionReceiver, ResolveSupervisor, Submission};
