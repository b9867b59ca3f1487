use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::dispatch::DispatchConfig;
use crate::error::ConfigError;

/// Runtime settings, read from `CRAWLER_*` environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct ScraperConfig {
    pub render_fallback: bool,
    pub static_timeout: Duration,
    pub render_timeout: Duration,
    pub render_settle: Duration,
    pub politeness_delay: Duration,
    pub js_text_threshold: usize,
    pub min_static_fields: usize,
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub port: u16,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            render_fallback: false,
            static_timeout: Duration::from_secs(30),
            render_timeout: Duration::from_secs(20),
            render_settle: Duration::from_millis(2000),
            politeness_delay: Duration::from_millis(500),
            js_text_threshold: 200,
            min_static_fields: 0,
            input_path: PathBuf::from("data/clubs.json"),
            output_path: PathBuf::from("results/scraped_data.json"),
            port: 3000,
        }
    }
}

impl ScraperConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup; unset keys keep defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let get = |key: &'static str| lookup(key).filter(|v| !v.trim().is_empty()).map(|v| (key, v));

        Ok(Self {
            render_fallback: match get("CRAWLER_RENDER_FALLBACK") {
                Some((key, v)) => parse_bool(key, &v)?,
                None => defaults.render_fallback,
            },
            static_timeout: seconds(get("CRAWLER_STATIC_TIMEOUT_SECS"), defaults.static_timeout)?,
            render_timeout: seconds(get("CRAWLER_RENDER_TIMEOUT_SECS"), defaults.render_timeout)?,
            render_settle: millis(get("CRAWLER_RENDER_SETTLE_MS"), defaults.render_settle)?,
            politeness_delay: millis(get("CRAWLER_POLITENESS_DELAY_MS"), defaults.politeness_delay)?,
            js_text_threshold: number(get("CRAWLER_JS_TEXT_THRESHOLD"), defaults.js_text_threshold)?,
            min_static_fields: number(get("CRAWLER_MIN_STATIC_FIELDS"), defaults.min_static_fields)?,
            input_path: get("CRAWLER_INPUT").map_or(defaults.input_path, |(_, v)| PathBuf::from(v)),
            output_path: get("CRAWLER_OUTPUT").map_or(defaults.output_path, |(_, v)| PathBuf::from(v)),
            port: number(get("PORT"), defaults.port)?,
        })
    }

    pub fn dispatch_config(&self) -> DispatchConfig {
        DispatchConfig {
            render_fallback: self.render_fallback,
            js_text_threshold: self.js_text_threshold,
            min_static_fields: self.min_static_fields,
        }
    }
}

fn number<T: FromStr>(entry: Option<(&'static str, String)>, default: T) -> Result<T, ConfigError> {
    match entry {
        Some((var, value)) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { var, value }),
        None => Ok(default),
    }
}

fn seconds(entry: Option<(&'static str, String)>, default: Duration) -> Result<Duration, ConfigError> {
    number(entry, default.as_secs()).map(Duration::from_secs)
}

fn millis(entry: Option<(&'static str, String)>, default: Duration) -> Result<Duration, ConfigError> {
    number(entry, default.as_millis() as u64).map(Duration::from_millis)
}

fn parse_bool(var: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            var,
            value: value.to_string(),
        }),
    }
}
