//! Influencer ROI: command-line front end for the campaign ROI pipeline.
//!
//! Every command ingests an uploaded CSV, validates and enriches it, applies
//! the shared filter flags and prints JSON to stdout. Logs go to stderr.

use anyhow::Context;
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use influencer_analytics::{Dataset, MetricEngine};
use influencer_core::config::{BandingKey, DateFormat, DateGranularity, ReportingConfig};
use influencer_core::{
    Dimension, FilterWarning, MetricKey, PayoutBasis, PipelineConfig, RowRejection,
};
use influencer_ingest::{read_raw_table_from_path, RecordValidator, ValidatedTable};
use influencer_reporting::{
    bottom_n, top_n, write_csv, AggregateRequest, AggregateResult, Aggregator, GroupDimension,
    GroupOrder, Insights, JsonReportRenderer, KpiSummary, ReportBuilder, ReportRenderer,
};
use influencer_segmentation::{
    BandAssignment, BandClassifier, FilterEngine, FilterSpec, PerformanceBand,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "influencer-roi")]
#[command(about = "Influencer campaign ROI analytics over uploaded performance tables")]
#[command(version)]
struct Cli {
    /// Configuration file; INFLUENCER_ROI__* environment variables still apply
    #[arg(long, global = true, env = "INFLUENCER_ROI_CONFIG")]
    config: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Date layout of the upload: auto, iso, day-first, month-first (overrides config)
    #[arg(long, global = true, value_parser = parse_date_format)]
    date_format: Option<DateFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate an upload and list rejected rows
    Validate {
        /// CSV file to ingest
        input: PathBuf,
    },

    /// Headline KPIs of the filtered view
    Kpis {
        input: PathBuf,
        #[command(flatten)]
        filter: FilterArgs,
    },

    /// Group the filtered view and summarize metrics per group
    Aggregate {
        input: PathBuf,

        /// Group dimensions: date, day, week, month, platform, campaign,
        /// category, gender, influencer, basis, band
        #[arg(long = "group-by", value_delimiter = ',', required = true)]
        group_by: Vec<GroupDimension>,

        /// Metrics to summarize per group
        #[arg(long = "metric", value_delimiter = ',')]
        metrics: Vec<MetricKey>,

        /// Group order: auto, natural, descending, ascending
        #[arg(long, default_value = "auto", value_parser = parse_order)]
        order: GroupOrder,

        #[command(flatten)]
        filter: FilterArgs,
    },

    /// Performance bands computed over the filtered context
    Bands {
        input: PathBuf,
        #[command(flatten)]
        filter: FilterArgs,
    },

    /// Highest (or lowest) records by a metric
    Top {
        input: PathBuf,

        #[arg(long, default_value = "roi_percentage")]
        metric: MetricKey,

        /// Number of records (defaults to reporting.top_n)
        #[arg(short = 'n', long)]
        limit: Option<usize>,

        /// Rank from the bottom instead
        #[arg(long, default_value_t = false)]
        bottom: bool,

        #[command(flatten)]
        filter: FilterArgs,
    },

    /// Write the filtered view as CSV with derived metrics and bands
    Export {
        input: PathBuf,

        /// Output file (default: stdout)
        #[arg(short, long)]
        out: Option<PathBuf>,

        #[command(flatten)]
        filter: FilterArgs,
    },

    /// Build the full analytics report as JSON
    Report {
        input: PathBuf,

        /// Output file (default: stdout)
        #[arg(short, long)]
        out: Option<PathBuf>,

        #[command(flatten)]
        filter: FilterArgs,
    },

    /// KPIs plus every dashboard chart, computed concurrently
    Dashboard {
        input: PathBuf,
        #[command(flatten)]
        filter: FilterArgs,
    },
}

#[derive(Args, Debug, Clone, Default)]
struct FilterArgs {
    /// First day to include (YYYY-MM-DD)
    #[arg(long)]
    from: Option<NaiveDate>,

    /// Last day to include (YYYY-MM-DD)
    #[arg(long)]
    to: Option<NaiveDate>,

    #[arg(long = "campaign")]
    campaigns: Vec<String>,

    #[arg(long = "platform")]
    platforms: Vec<String>,

    #[arg(long = "category")]
    categories: Vec<String>,

    #[arg(long = "gender")]
    genders: Vec<String>,

    #[arg(long = "influencer")]
    influencers: Vec<String>,

    /// Payout basis: per-post, per-order
    #[arg(long = "basis", value_parser = parse_basis)]
    bases: Vec<PayoutBasis>,

    /// Performance band: high, good, average, poor, unrated
    #[arg(long = "band")]
    bands: Vec<PerformanceBand>,

    /// Metric the bands rank by (overrides config)
    #[arg(long)]
    band_metric: Option<MetricKey>,

    /// Entity the bands are assigned to: influencer, campaign, record (overrides config)
    #[arg(long)]
    band_key: Option<BandingKey>,
}

impl FilterArgs {
    fn spec(&self) -> FilterSpec {
        let mut spec = FilterSpec::new();
        if self.from.is_some() || self.to.is_some() {
            spec = spec.with_date_range(self.from, self.to);
        }
        if !self.campaigns.is_empty() {
            spec = spec.with_campaigns(self.campaigns.iter().cloned());
        }
        if !self.platforms.is_empty() {
            spec = spec.with_platforms(self.platforms.iter().cloned());
        }
        if !self.categories.is_empty() {
            spec = spec.with_categories(self.categories.iter().cloned());
        }
        if !self.genders.is_empty() {
            spec = spec.with_genders(self.genders.iter().cloned());
        }
        if !self.influencers.is_empty() {
            spec = spec.with_influencers(self.influencers.iter().cloned());
        }
        if !self.bases.is_empty() {
            spec = spec.with_bases(self.bases.iter().copied());
        }
        if !self.bands.is_empty() {
            spec = spec.with_bands(self.bands.iter().copied());
        }
        spec
    }
}

fn parse_date_format(s: &str) -> Result<DateFormat, String> {
    match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
        "auto" => Ok(DateFormat::Auto),
        "iso" => Ok(DateFormat::Iso),
        "day-first" | "dmy" => Ok(DateFormat::DayFirst),
        "month-first" | "mdy" => Ok(DateFormat::MonthFirst),
        other => Err(format!("unknown date format '{other}'")),
    }
}

fn parse_order(s: &str) -> Result<GroupOrder, String> {
    match s.trim().to_ascii_lowercase().as_str() {
        "auto" => Ok(GroupOrder::Auto),
        "natural" => Ok(GroupOrder::Natural),
        "descending" | "desc" => Ok(GroupOrder::Descending),
        "ascending" | "asc" => Ok(GroupOrder::Ascending),
        other => Err(format!("unknown group order '{other}'")),
    }
}

fn parse_basis(s: &str) -> Result<PayoutBasis, String> {
    match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
        "per-post" | "post" => Ok(PayoutBasis::PerPost),
        "per-order" | "order" => Ok(PayoutBasis::PerOrder),
        other => Err(format!("unknown payout basis '{other}'")),
    }
}

/// Loaded configuration plus the engine built from it.
struct Pipeline {
    config: PipelineConfig,
    engine: MetricEngine,
}

impl Pipeline {
    fn new(config: PipelineConfig) -> Self {
        let engine = MetricEngine::new(&config.metrics);
        Self { config, engine }
    }

    fn ingest(&self, input: &Path) -> anyhow::Result<ValidatedTable> {
        let raw = read_raw_table_from_path(input)
            .with_context(|| format!("failed to read {}", input.display()))?;
        let validated = RecordValidator::new(&self.config.ingest)
            .validate(&raw)
            .with_context(|| format!("{} does not match the required schema", input.display()))?;
        Ok(validated)
    }

    fn dataset(&self, input: &Path) -> anyhow::Result<Dataset> {
        let validated = self.ingest(input)?;
        if !validated.rejected.is_empty() {
            warn!(
                rejected = validated.rejected_count(),
                "Rows excluded from analysis; run `validate` for details"
            );
        }
        let dataset = self
            .engine
            .enrich(validated.records)
            .context("failed to derive metrics")?;
        if let Some((first, last)) = dataset.date_bounds() {
            info!(
                records = dataset.len(),
                %first,
                %last,
                campaigns = ?dataset.distinct(Dimension::Campaign),
                platforms = ?dataset.distinct(Dimension::Platform),
                "Dataset loaded"
            );
        }
        Ok(dataset)
    }

    fn classifier(&self, filter: &FilterArgs) -> BandClassifier {
        let mut classifier = BandClassifier::new(&self.config.banding, self.engine.clone());
        if let Some(metric) = filter.band_metric {
            classifier = classifier.with_metric(metric);
        }
        if let Some(key) = filter.band_key {
            classifier = classifier.with_key(key);
        }
        classifier
    }

    fn aggregator(&self) -> Aggregator {
        Aggregator::new(self.engine.clone())
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let mut out = io::stdout().lock();
    serde_json::to_writer_pretty(&mut out, value)?;
    writeln!(out)?;
    Ok(())
}

fn output(path: Option<&Path>) -> anyhow::Result<Box<dyn Write>> {
    Ok(match path {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("failed to create {}", path.display()))?,
        )),
        None => Box::new(io::stdout().lock()),
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "influencer_roi=info,influencer_ingest=info".into());
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(io::stderr);
    if cli.json_logs {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    let mut config = match PipelineConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => match &cli.config {
            Some(path) => {
                return Err(e).with_context(|| format!("failed to load config {path}"));
            }
            None => {
                warn!(error = %e, "Failed to load config, using defaults");
                PipelineConfig::default()
            }
        },
    };
    if let Some(date_format) = cli.date_format {
        config.ingest.date_format = date_format;
    }

    info!(
        date_format = ?config.ingest.date_format,
        band_metric = %config.banding.metric,
        band_key = ?config.banding.key,
        "Configuration loaded"
    );

    let pipeline = Pipeline::new(config);

    match cli.command {
        Commands::Validate { input } => cmd_validate(&pipeline, &input),
        Commands::Kpis { input, filter } => cmd_kpis(&pipeline, &input, &filter),
        Commands::Aggregate {
            input,
            group_by,
            metrics,
            order,
            filter,
        } => {
            let request = AggregateRequest::new(group_by, metrics).with_order(order);
            cmd_aggregate(&pipeline, &input, &request, &filter)
        }
        Commands::Bands { input, filter } => cmd_bands(&pipeline, &input, &filter),
        Commands::Top {
            input,
            metric,
            limit,
            bottom,
            filter,
        } => cmd_top(&pipeline, &input, metric, limit, bottom, &filter),
        Commands::Export { input, out, filter } => {
            cmd_export(&pipeline, &input, out.as_deref(), &filter)
        }
        Commands::Report { input, out, filter } => {
            cmd_report(&pipeline, &input, out.as_deref(), &filter)
        }
        Commands::Dashboard { input, filter } => cmd_dashboard(&pipeline, &input, &filter).await,
    }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct ValidationSummary<'a> {
    total_rows: usize,
    valid_rows: usize,
    rejected_rows: Vec<usize>,
    rejections: &'a [RowRejection],
}

fn cmd_validate(pipeline: &Pipeline, input: &Path) -> anyhow::Result<()> {
    let validated = pipeline.ingest(input)?;
    print_json(&ValidationSummary {
        total_rows: validated.total_rows,
        valid_rows: validated.records.len(),
        rejected_rows: validated.rejected_rows(),
        rejections: &validated.rejected,
    })
}

#[derive(Serialize)]
struct KpiOutput<'a> {
    kpis: KpiSummary,
    insights: Insights,
    warnings: &'a [FilterWarning],
}

fn cmd_kpis(pipeline: &Pipeline, input: &Path, filter: &FilterArgs) -> anyhow::Result<()> {
    let dataset = pipeline.dataset(input)?;
    let selection =
        FilterEngine::new().select(&dataset, &filter.spec(), &pipeline.classifier(filter));
    print_json(&KpiOutput {
        kpis: KpiSummary::compute(&selection.view, &pipeline.engine),
        insights: Insights::compute(&selection.view, &pipeline.aggregator()),
        warnings: selection.view.warnings(),
    })
}

fn cmd_aggregate(
    pipeline: &Pipeline,
    input: &Path,
    request: &AggregateRequest,
    filter: &FilterArgs,
) -> anyhow::Result<()> {
    let dataset = pipeline.dataset(input)?;
    let selection =
        FilterEngine::new().select(&dataset, &filter.spec(), &pipeline.classifier(filter));
    let result = pipeline
        .aggregator()
        .aggregate(&selection.view, request, &selection.bands);
    print_json(&result)
}

#[derive(Serialize)]
struct BandsOutput<'a> {
    population: usize,
    counts: BTreeMap<PerformanceBand, usize>,
    assignment: &'a BandAssignment,
    warnings: &'a [FilterWarning],
}

fn cmd_bands(pipeline: &Pipeline, input: &Path, filter: &FilterArgs) -> anyhow::Result<()> {
    let dataset = pipeline.dataset(input)?;
    let selection =
        FilterEngine::new().select(&dataset, &filter.spec(), &pipeline.classifier(filter));
    print_json(&BandsOutput {
        population: selection.view.len(),
        counts: selection.bands.counts(),
        assignment: &selection.bands,
        warnings: selection.view.warnings(),
    })
}

fn cmd_top(
    pipeline: &Pipeline,
    input: &Path,
    metric: MetricKey,
    limit: Option<usize>,
    bottom: bool,
    filter: &FilterArgs,
) -> anyhow::Result<()> {
    let dataset = pipeline.dataset(input)?;
    let selection =
        FilterEngine::new().select(&dataset, &filter.spec(), &pipeline.classifier(filter));
    let n = limit.unwrap_or(pipeline.config.reporting.top_n);
    let ranked = if bottom {
        bottom_n(&selection.view, metric, n)
    } else {
        top_n(&selection.view, metric, n)
    };
    print_json(&ranked)
}

fn cmd_export(
    pipeline: &Pipeline,
    input: &Path,
    out: Option<&Path>,
    filter: &FilterArgs,
) -> anyhow::Result<()> {
    let dataset = pipeline.dataset(input)?;
    let selection =
        FilterEngine::new().select(&dataset, &filter.spec(), &pipeline.classifier(filter));
    let rows = write_csv(&selection.view, &selection.bands, output(out)?)
        .context("failed to write CSV export")?;
    info!(rows, destination = ?out, "Export complete");
    Ok(())
}

fn cmd_report(
    pipeline: &Pipeline,
    input: &Path,
    out: Option<&Path>,
    filter: &FilterArgs,
) -> anyhow::Result<()> {
    let dataset = pipeline.dataset(input)?;
    let spec = filter.spec();
    let selection = FilterEngine::new().select(&dataset, &spec, &pipeline.classifier(filter));
    let report = ReportBuilder::new(pipeline.engine.clone(), pipeline.config.reporting.clone())
        .build(&spec, &selection);

    let renderer = JsonReportRenderer { pretty: true };
    let mut writer = output(out)?;
    renderer
        .render(&report, &mut writer)
        .context("failed to render report")?;
    writeln!(writer)?;
    info!(report_id = %report.id, content_type = renderer.content_type(), "Report written");
    Ok(())
}

/// Charts shown on the dashboard, each an independent aggregate request.
fn dashboard_charts(reporting: &ReportingConfig) -> Vec<(&'static str, AggregateRequest)> {
    let chart = |dimensions, metrics| AggregateRequest::new(dimensions, metrics);
    vec![
        (
            "revenue_trend",
            chart(
                vec![GroupDimension::Date(reporting.trend_granularity)],
                vec![MetricKey::Revenue, MetricKey::TotalPayout],
            ),
        ),
        (
            "weekly_engagement",
            chart(
                vec![GroupDimension::Date(DateGranularity::Week)],
                vec![MetricKey::Engagement, MetricKey::EngagementRate],
            ),
        ),
        (
            "roi_by_campaign",
            chart(vec![GroupDimension::Campaign], vec![MetricKey::RoiPercentage]),
        ),
        (
            "engagement_by_platform",
            chart(vec![GroupDimension::Platform], vec![MetricKey::EngagementRate]),
        ),
        (
            "orders_by_category",
            chart(
                vec![GroupDimension::Category],
                vec![MetricKey::Orders, MetricKey::Revenue],
            ),
        ),
        (
            "revenue_by_gender",
            chart(vec![GroupDimension::Gender], vec![MetricKey::Revenue, MetricKey::Roas]),
        ),
        (
            "roas_by_influencer",
            chart(vec![GroupDimension::Influencer], vec![MetricKey::Roas]),
        ),
        (
            "band_distribution",
            chart(vec![GroupDimension::Category, GroupDimension::Band], vec![])
                .with_order(GroupOrder::Natural),
        ),
    ]
}

#[derive(Serialize)]
struct DashboardOutput<'a> {
    kpis: KpiSummary,
    insights: Insights,
    warnings: &'a [FilterWarning],
    charts: BTreeMap<&'static str, AggregateResult>,
}

async fn cmd_dashboard(
    pipeline: &Pipeline,
    input: &Path,
    filter: &FilterArgs,
) -> anyhow::Result<()> {
    let dataset = Arc::new(pipeline.dataset(input)?);
    let spec = filter.spec();
    let classifier = pipeline.classifier(filter);

    let mut handles = Vec::new();
    for (name, request) in dashboard_charts(&pipeline.config.reporting) {
        let dataset = Arc::clone(&dataset);
        let spec = spec.clone();
        let classifier = classifier.clone();
        let aggregator = pipeline.aggregator();
        let handle = tokio::task::spawn_blocking(move || {
            let selection = FilterEngine::new().select(&dataset, &spec, &classifier);
            aggregator.aggregate(&selection.view, &request, &selection.bands)
        });
        handles.push((name, handle));
    }

    let selection = FilterEngine::new().select(&dataset, &spec, &classifier);
    let kpis = KpiSummary::compute(&selection.view, &pipeline.engine);
    let insights = Insights::compute(&selection.view, &pipeline.aggregator());

    let mut charts = BTreeMap::new();
    for (name, handle) in handles {
        let result = handle
            .await
            .with_context(|| format!("dashboard chart '{name}' failed"))?;
        charts.insert(name, result);
    }
    info!(charts = charts.len(), records = kpis.record_count, "Dashboard computed");

    print_json(&DashboardOutput {
        kpis,
        insights,
        warnings: selection.view.warnings(),
        charts,
    })
}
