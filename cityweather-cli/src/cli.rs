use anyhow::{Context, anyhow};
use clap::{Parser, Subcommand};
use cityweather_core::{
    Config, ResolutionResult, ResolveOptions, ResolveSupervisor, Submission, Units,
    WeatherResolver,
};
use inquire::{Password, PasswordDisplayMode, Select, Text};

use crate::render;

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "cityweather", version, about = "Current, hourly and daily weather for a city")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Store the OpenWeather API key and display preferences.
    Configure,

    /// Show weather for a city.
    Show {
        /// City name, e.g. "Ankara".
        city: String,

        /// Unit system: "metric" or "imperial". Defaults to the configured one.
        #[arg(long)]
        units: Option<String>,

        /// Provider language code, e.g. "en" or "tr". Defaults to the configured one.
        #[arg(long)]
        lang: Option<String>,
    },
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        match self.command {
            Command::Configure => configure(),
            Command::Show { city, units, lang } => show(city, units, lang).await,
        }
    }
}

fn configure() -> anyhow::Result<()> {
    let mut cfg = Config::load()?;

    let api_key = Password::new("OpenWeather API key:")
        .with_display_mode(PasswordDisplayMode::Masked)
        .without_confirmation()
        .prompt()
        .context("Failed to read API key")?;
    if api_key.trim().is_empty() {
        return Err(anyhow!("API key must not be empty"));
    }

    let units = Select::new("Units:", Units::all().to_vec())
        .with_starting_cursor(Units::all().iter().position(|u| *u == cfg.units).unwrap_or(0))
        .prompt()
        .context("Failed to read unit system")?;

    let lang = Text::new("Language code:")
        .with_default(&cfg.lang)
        .prompt()
        .context("Failed to read language code")?;

    cfg.api_key = Some(api_key.trim().to_string());
    cfg.units = units;
    cfg.lang = lang.trim().to_string();

    let path = cfg.save()?;
    println!("Configuration saved to {}", path.display());

    Ok(())
}

/// The city to look up, or `None` when the argument is blank.
fn city_query(city: &str) -> Option<&str> {
    let city = city.trim();
    (!city.is_empty()).then_some(city)
}

async fn show(city: String, units: Option<String>, lang: Option<String>) -> anyhow::Result<()> {
    let Some(city) = city_query(&city) else {
        eprintln!("{}", render::MISSING_CITY);
        return Ok(());
    };

    let cfg = Config::load()?;
    tracing::debug!(units = %cfg.units, lang = %cfg.lang, "configuration loaded");

    let options = ResolveOptions {
        units: match units {
            Some(units) => Units::try_from(units.as_str())?,
            None => cfg.units,
        },
        lang: lang.unwrap_or_else(|| cfg.lang.clone()),
    };

    let resolver = WeatherResolver::from_config(&cfg)?;
    let (supervisor, mut completions) =
        ResolveSupervisor::new(resolver, tokio::runtime::Handle::current());

    if supervisor.submit(city, Some(options.clone())) == Submission::Dropped {
        return Err(anyhow!("Another lookup is already running"));
    }
    tracing::info!(city, units = %options.units, lang = %options.lang, "lookup submitted");

    let completion = completions
        .recv()
        .await
        .ok_or_else(|| anyhow!("Lookup for '{city}' ended without a result"))?;

    match completion.result {
        ResolutionResult::Success { snapshot, location } => {
            print!("{}", render::snapshot(&location, &snapshot, options.units));
        }
        ResolutionResult::Failure(reason) => {
            eprintln!("{}", render::failure(&completion.city, reason));
        }
    }

    Ok(())
}
