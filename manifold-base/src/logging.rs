use std::str::FromStr as _;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing_subscriber::filter::{Directive, EnvFilter};
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

use crate::{Config, ConfigSection, StdError};

#[derive(Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(
        serialize_with = "serialize_level",
        deserialize_with = "deserialize_level",
        default = "default_level"
    )]
    pub level: tracing::Level,
    #[serde(default)]
    pub directives: Vec<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            directives: Default::default(),
        }
    }
}

impl ConfigSection for LoggingConfig {
    fn key() -> &'static str {
        "logging"
    }
}

/// Initializes the global tracing subscriber from the `logging` config
/// section: an env-filter assembled from the configured directives and
/// default level, plus the standard fmt layer. Fails when a subscriber
/// is already installed.
pub fn setup_logging(config: &Config) -> Result<(), StdError> {
    let config = config
        .get::<Option<LoggingConfig>>(LoggingConfig::key())?
        .unwrap_or_default();
    let mut directives = Vec::new();
    for directive in &config.directives {
        directives.push(directive.parse().map_err(Box::new)?);
    }
    let env_filter = new_env_filter(&directives, config.level);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::Layer::default())
        .try_init()?;
    Ok(())
}

fn new_env_filter(directives: &Vec<Directive>, level: tracing::Level) -> EnvFilter {
    let mut filter = EnvFilter::default();
    for directive in directives {
        filter = filter.add_directive(directive.clone());
    }
    filter.add_directive(level.into())
}

fn serialize_level<S>(v: &tracing::Level, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(v.as_str())
}

fn deserialize_level<'de, D>(deserializer: D) -> Result<tracing::Level, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;
    String::deserialize(deserializer)
        .and_then(|v| tracing::Level::from_str(&v).map_err(|v| Error::custom(format!("{v}"))))
}

fn default_level() -> tracing::Level {
    tracing::Level::DEBUG
}
