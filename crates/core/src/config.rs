use crate::metric::MetricKey;
use serde::{Deserialize, Serialize};

/// Root pipeline configuration. Loaded from an optional TOML file and from
/// environment variables with the prefix `INFLUENCER_ROI__`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub banding: BandingConfig,
    #[serde(default)]
    pub reporting: ReportingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IngestConfig {
    #[serde(default)]
    pub date_format: DateFormat,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub zero_denominator: ZeroDenominatorPolicy,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BandingConfig {
    #[serde(default)]
    pub key: BandingKey,
    #[serde(default = "default_band_metric")]
    pub metric: MetricKey,
    #[serde(default)]
    pub strategy: BandingStrategy,
    /// Fewer rated members than this collapses quantile banding.
    #[serde(default = "default_min_population")]
    pub min_population: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReportingConfig {
    #[serde(default = "default_top_n")]
    pub top_n: usize,
    #[serde(default = "default_outlier_sigma")]
    pub outlier_sigma: f64,
    #[serde(default)]
    pub trend_granularity: DateGranularity,
}

/// Accepted date layouts for the `date` column.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DateFormat {
    /// ISO first; slash dates month-first, day-first only when the first field exceeds 12.
    #[default]
    Auto,
    Iso,
    DayFirst,
    MonthFirst,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ZeroDenominatorPolicy {
    /// Division by zero yields the undefined sentinel.
    #[default]
    Undefined,
    /// Division by zero yields 0.
    Zero,
}

/// Which entity a performance band is assigned to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BandingKey {
    #[default]
    Influencer,
    Campaign,
    Record,
}

impl std::str::FromStr for BandingKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "influencer" | "name" => Ok(BandingKey::Influencer),
            "campaign" => Ok(BandingKey::Campaign),
            "record" | "row" => Ok(BandingKey::Record),
            other => Err(format!("unknown banding key '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BandingStrategy {
    /// Quartile cut points over the rated population.
    #[default]
    Quantile,
    /// Absolute thresholds, each inclusive of its lower bound.
    Fixed { high: f64, good: f64, average: f64 },
}

impl BandingStrategy {
    /// The dashboard's historical ROI% cuts.
    pub fn roi_percentage_defaults() -> Self {
        BandingStrategy::Fixed {
            high: 200.0,
            good: 100.0,
            average: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DateGranularity {
    Day,
    Week,
    #[default]
    Month,
}

impl std::str::FromStr for DateGranularity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "day" | "daily" => Ok(DateGranularity::Day),
            "week" | "weekly" => Ok(DateGranularity::Week),
            "month" | "monthly" => Ok(DateGranularity::Month),
            other => Err(format!("unknown granularity '{other}'")),
        }
    }
}

// Default functions
fn default_band_metric() -> MetricKey {
    MetricKey::Roas
}
fn default_min_population() -> usize {
    4
}
fn default_top_n() -> usize {
    10
}
fn default_outlier_sigma() -> f64 {
    2.0
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            date_format: DateFormat::default(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            zero_denominator: ZeroDenominatorPolicy::default(),
        }
    }
}

impl Default for BandingConfig {
    fn default() -> Self {
        Self {
            key: BandingKey::default(),
            metric: default_band_metric(),
            strategy: BandingStrategy::default(),
            min_population: default_min_population(),
        }
    }
}

impl Default for ReportingConfig {
    fn default() -> Self {
        Self {
            top_n: default_top_n(),
            outlier_sigma: default_outlier_sigma(),
            trend_granularity: DateGranularity::default(),
        }
    }
}

impl PipelineConfig {
    /// Load configuration from an optional config file and environment variables.
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(true));
        }
        let builder = builder.add_source(
            config::Environment::with_prefix("INFLUENCER_ROI")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }
}
