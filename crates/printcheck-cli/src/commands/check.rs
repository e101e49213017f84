//! Check command - align cards and extract the region of interest.

use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use printcheck_adapters::{
    is_url, load_template_image, CropWriter, FsImageSource, FsSnapshotWriter, HttpFetcher,
    TemplateSet, UniqueTitles, UrlImageSource,
};
use printcheck_core::domain::ImageDimensions;
use printcheck_core::{
    AlignmentMode, CardPipeline, CardReport, CardSize, ImageSource, LoadError, Outcome,
    PipelineConfig, PipelineError, ProgressEvent, ProgressSink, RawImage, ResultOutput, RoiBox, RoiSummary,
    SkipKind,
};
use rayon::iter::{ParallelBridge, ParallelIterator};
use tracing::{debug, info, warn};

use super::ExitCode;
use crate::config::AppConfig;
use crate::output::{JsonOutput, ProgressBar};

/// Timeout for one URL download.
const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Output format for results.
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// JSON Lines (one JSON object per line)
    #[default]
    Jsonl,
    /// Single JSON array
    Json,
}

/// Parse `WxH`.
fn parse_size(s: &str) -> Result<CardSize, String> {
    let (w, h) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("'{s}' is not WIDTHxHEIGHT"))?;
    let parse = |v: &str| {
        v.trim()
            .parse::<u32>()
            .map_err(|_| format!("'{v}' is not a valid size"))
    };
    Ok(CardSize {
        width: parse(w)?,
        height: parse(h)?,
    })
}

/// Parse `X,Y,W,H`.
fn parse_roi(s: &str) -> Result<RoiBox, String> {
    let parts: Vec<u32> = s
        .split(',')
        .map(|v| {
            v.trim()
                .parse::<u32>()
                .map_err(|_| format!("'{v}' is not a valid coordinate"))
        })
        .collect::<Result<_, _>>()?;
    match parts.as_slice() {
        &[x, y, w, h] => Ok(RoiBox::new(x, y, w, h)),
        _ => Err(format!("'{s}' is not X,Y,WIDTH,HEIGHT")),
    }
}

/// Parse and validate a correlation score (-1.0-1.0).
fn parse_score(s: &str) -> Result<f32, String> {
    let value: f32 = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid number"))?;
    if (-1.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(format!("{value} is not in -1.0..=1.0"))
    }
}

/// Parse a non-negative sharpness threshold.
fn parse_sharpness(s: &str) -> Result<f64, String> {
    let value: f64 = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid number"))?;
    if value >= 0.0 && value.is_finite() {
        Ok(value)
    } else {
        Err(format!("{value} must be non-negative"))
    }
}

fn parse_jobs(s: &str) -> Result<usize, String> {
    match s.parse::<usize>() {
        Ok(0) => Err("must be at least 1".to_string()),
        Ok(n) => Ok(n),
        Err(_) => Err(format!("'{s}' is not a valid number")),
    }
}

fn parse_align(s: &str) -> Result<AlignmentMode, String> {
    s.parse()
}

/// Shared arguments for card checks.
#[derive(Args, Clone)]
#[allow(clippy::struct_excessive_bools)]
pub struct CheckArgs {
    /// Image files, directories or http(s) URLs
    pub inputs: Vec<String>,

    /// Recurse into subdirectories
    #[arg(short, long)]
    pub recursive: bool,

    /// Template set to use from the templates directory
    #[arg(long, value_name = "NAME")]
    pub defect: Option<String>,

    /// ROI reference crop (overrides the template set)
    #[arg(long, value_name = "FILE")]
    pub reference: Option<PathBuf>,

    /// Card template for keypoint alignment (overrides the template set)
    #[arg(long, value_name = "FILE")]
    pub template: Option<PathBuf>,

    /// Alignment mode: geometric, feature, feature-fallback, geometric-refine
    #[arg(long, value_name = "MODE", value_parser = parse_align)]
    pub align: Option<AlignmentMode>,

    /// Canonical card size
    #[arg(long, value_name = "WxH", value_parser = parse_size)]
    pub card_size: Option<CardSize>,

    /// Nominal ROI box on the aligned card
    #[arg(long, value_name = "X,Y,W,H", value_parser = parse_roi)]
    pub roi: Option<RoiBox>,

    /// ROI refinement search radius in pixels
    #[arg(long, value_name = "PX")]
    pub search_radius: Option<u32>,

    /// Laplacian variance below which a crop is blurry
    #[arg(long, value_parser = parse_sharpness)]
    pub blur_threshold: Option<f64>,

    /// Match score below which a crop is a low match (-1.0-1.0)
    #[arg(long, value_parser = parse_score)]
    pub match_threshold: Option<f32>,

    /// Write per-image stage snapshots under this directory
    #[arg(long, value_name = "DIR")]
    pub debug_dir: Option<PathBuf>,

    /// Write final ROI crops as PNG into this directory
    #[arg(long, value_name = "DIR")]
    pub crop_dir: Option<PathBuf>,

    /// Custom templates directory (overrides default and config)
    #[arg(long, value_name = "DIR")]
    pub templates_dir: Option<PathBuf>,

    /// Worker threads (1 = sequential)
    #[arg(short, long, value_parser = parse_jobs)]
    pub jobs: Option<usize>,

    /// Show progress bar
    #[arg(long)]
    pub progress: bool,

    /// Suppress progress output
    #[arg(short, long)]
    pub quiet: bool,

    /// Output format
    #[arg(long, value_enum)]
    pub format: Option<OutputFormat>,

    /// Pretty-print JSON output (only affects --format json)
    #[arg(long)]
    pub pretty: bool,

    /// Merged config (populated by `with_config`, not from CLI).
    #[arg(skip)]
    config: Option<AppConfig>,
}

impl CheckArgs {
    /// Apply configuration file values, respecting CLI precedence.
    ///
    /// Layering priority (lowest to highest):
    /// 1. Hardcoded defaults (`PipelineConfig::default()` and accessors)
    /// 2. Config file values (XDG, then project-local)
    /// 3. CLI arguments (already set on self)
    #[must_use]
    pub fn with_config(mut args: Self, config: &AppConfig) -> Self {
        if !args.recursive {
            args.recursive = config.general.recursive.unwrap_or(false);
        }
        args.jobs = args.jobs.or(config.general.jobs);

        if args.defect.is_none() {
            args.defect.clone_from(&config.templates.defect);
        }
        if args.templates_dir.is_none() {
            args.templates_dir.clone_from(&config.templates.dir);
        }
        if args.debug_dir.is_none() {
            args.debug_dir.clone_from(&config.debug.dir);
        }
        if args.crop_dir.is_none() {
            args.crop_dir.clone_from(&config.output.crop_dir);
        }

        // Output format: CLI > config (accessor provides fallback)
        if args.format.is_none() {
            args.format = config
                .output
                .format
                .as_ref()
                .and_then(|s| match s.as_str() {
                    "json" => Some(OutputFormat::Json),
                    "jsonl" => Some(OutputFormat::Jsonl),
                    _ => None,
                });
        }
        if !args.pretty {
            args.pretty = config.output.pretty.unwrap_or(false);
        }
        if !args.progress {
            args.progress = config.output.progress.unwrap_or(false);
        }

        // Pipeline sections are applied in `pipeline_config`
        args.config = Some(config.clone());

        args
    }

    /// Get output format with fallback to JSONL.
    fn format(&self) -> OutputFormat {
        self.format.unwrap_or(OutputFormat::Jsonl)
    }

    fn jobs(&self) -> usize {
        self.jobs.unwrap_or(1)
    }

    fn templates_dir(&self) -> PathBuf {
        self.templates_dir
            .clone()
            .unwrap_or_else(printcheck_adapters::default_templates_dir)
    }

    /// Defaults, then config sections, then CLI flags.
    fn pipeline_config(&self) -> PipelineConfig {
        let mut pipeline = PipelineConfig::default();
        if let Some(config) = &self.config {
            config.apply_to(&mut pipeline);
        }
        if let Some(size) = self.card_size {
            pipeline.card = size;
        }
        if let Some(roi) = self.roi {
            pipeline.roi.nominal = roi;
        }
        if let Some(radius) = self.search_radius {
            pipeline.roi.search_radius = radius;
        }
        if let Some(t) = self.blur_threshold {
            pipeline.quality.blur_threshold = t;
        }
        if let Some(t) = self.match_threshold {
            pipeline.quality.match_threshold = t;
        }
        if let Some(mode) = self.align {
            pipeline.alignment = mode;
        }
        pipeline.diagnostics = self.debug_dir.is_some();
        pipeline
    }
}

/// Result of running the check command.
#[allow(dead_code)] // Fields exposed for programmatic use
pub struct CheckResult {
    /// Number of images processed.
    pub processed: usize,
    /// Number of images skipped.
    pub skipped: usize,
    /// Number of processed images with a verdict other than `ok`.
    pub not_ok: usize,
    /// Exit code.
    pub exit_code: ExitCode,
}

/// Run the check command.
///
/// Expects `args` to have been processed through `with_config()` first
/// to apply configuration file settings.
pub fn run(args: &CheckArgs) -> Result<CheckResult> {
    info!("Running check command on {} inputs", args.inputs.len());

    if args.inputs.is_empty() {
        anyhow::bail!("No inputs specified");
    }

    let pipeline = build_pipeline(args)?;
    let crops = args.crop_dir.as_ref().map(CropWriter::new).transpose()?;

    let (urls, paths): (Vec<String>, Vec<String>) =
        args.inputs.iter().cloned().partition(|i| is_url(i));
    // One claim set per run keeps scratch dirs and crop files distinct.
    let titles = UniqueTitles::new();
    let mut fs_source = FsImageSource::new(
        paths.into_iter().map(PathBuf::from).collect(),
        args.recursive,
    )
    .with_titles(titles.clone());
    if let Some(dir) = &args.debug_dir {
        fs_source = fs_source.with_debug_dir(dir);
    }
    let url_source = if urls.is_empty() {
        None
    } else {
        let source =
            UrlImageSource::new(urls, HttpFetcher::new(FETCH_TIMEOUT)?).with_titles(titles);
        Some(match &args.debug_dir {
            Some(dir) => source.with_debug_dir(dir),
            None => source,
        })
    };

    let sources: Vec<&dyn ImageSource> = std::iter::once(&fs_source as &dyn ImageSource)
        .chain(url_source.as_ref().map(|s| s as &dyn ImageSource))
        .collect();
    let total = sources.iter().filter_map(|s| s.count_hint()).sum::<usize>();

    // Determine if we should show progress
    let show_progress = !args.quiet && (args.progress || std::io::stderr().is_terminal());
    let progress = ProgressBar::new(Some(total as u64), args.quiet, show_progress);

    let output = JsonOutput::stdout();
    let ctx = RunContext {
        pipeline: &pipeline,
        crops: crops.as_ref(),
        progress: &progress,
        total,
    };

    process_images(&sources, &ctx, &output, args)
}

/// Resolves the reference crop and card template, then builds the pipeline.
fn build_pipeline(args: &CheckArgs) -> Result<CardPipeline> {
    let set = match &args.defect {
        Some(defect) => Some(TemplateSet::resolve(&args.templates_dir(), defect)?),
        None => None,
    };

    let reference_path = args
        .reference
        .clone()
        .or_else(|| set.as_ref().map(|s| s.reference.clone()))
        .context("No ROI reference: pass --reference or --defect")?;
    let template_path = args
        .template
        .clone()
        .or_else(|| set.as_ref().and_then(|s| s.card.clone()));

    let reference = load_template_image(&reference_path)?;
    let template = template_path.as_deref().map(load_template_image).transpose()?;
    debug!(
        reference = %reference_path.display(),
        template = ?template_path,
        "loaded reference images"
    );

    let config = args.pipeline_config();
    let mut pipeline = CardPipeline::new(config, &reference, template.as_ref())
        .context("Invalid pipeline configuration")?;
    if args.debug_dir.is_some() {
        pipeline = pipeline.with_snapshots(Arc::new(FsSnapshotWriter::new()));
    }
    Ok(pipeline)
}

/// Shared per-run state handed to workers.
struct RunContext<'a> {
    pipeline: &'a CardPipeline,
    crops: Option<&'a CropWriter>,
    progress: &'a ProgressBar,
    total: usize,
}

/// Process images sequentially or on a rayon pool.
fn process_images(
    sources: &[&dyn ImageSource],
    ctx: &RunContext<'_>,
    output: &JsonOutput,
    args: &CheckArgs,
) -> Result<CheckResult> {
    let items = sources.iter().flat_map(|s| s.images()).enumerate();
    let mut reports: Vec<CardReport> = Vec::new();

    if args.jobs() > 1 {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(args.jobs())
            .build()
            .context("Failed to build worker pool")?;
        let mut indexed: Vec<(usize, CardReport)> = pool.install(|| {
            items
                .par_bridge()
                .map(|(index, item)| check_one(ctx, index, item).map(|report| (index, report)))
                .collect::<Result<_>>()
        })?;
        indexed.sort_by_key(|(index, _)| *index);
        reports.extend(indexed.into_iter().map(|(_, report)| report));
        if matches!(args.format(), OutputFormat::Jsonl) {
            for report in &reports {
                output.write(report)?;
            }
        }
    } else {
        for (index, item) in items {
            let report = check_one(ctx, index, item)?;
            if matches!(args.format(), OutputFormat::Jsonl) {
                output.write(&report)?;
            }
            reports.push(report);
        }
    }

    // For JSON format, output all results as array via adapter
    if matches!(args.format(), OutputFormat::Json) {
        output.write_array(&reports, args.pretty)?;
    }
    output.flush()?;

    let skipped = reports
        .iter()
        .filter(|r| matches!(r.outcome, Outcome::Skipped { .. }))
        .count();
    let processed = reports.len() - skipped;
    let not_ok = reports
        .iter()
        .filter(|r| matches!(r.outcome, Outcome::Processed(_)) && !r.is_ok())
        .count();
    ctx.progress
        .on_event(ProgressEvent::Finished { processed, skipped });

    let exit_code = if skipped + not_ok > 0 {
        ExitCode::IssuesFound
    } else {
        ExitCode::Success
    };

    Ok(CheckResult {
        processed,
        skipped,
        not_ok,
        exit_code,
    })
}

/// Runs one image through the pipeline and builds its report.
///
/// Per-image failures become skipped reports. A configuration error ends
/// the run, since every later image would fail the same way.
fn check_one(
    ctx: &RunContext<'_>,
    index: usize,
    item: Result<RawImage, LoadError>,
) -> Result<CardReport> {
    let raw = match item {
        Ok(raw) => raw,
        Err(e) => {
            let source = load_error_source(&e);
            let title = title_of(&source);
            return Ok(skip(ctx, title, source, None, SkipKind::LoadError, &e));
        }
    };

    ctx.progress.on_event(ProgressEvent::Started {
        title: raw.title.clone(),
        index,
        total: Some(ctx.total),
    });
    let dimensions = Some(ImageDimensions {
        width: raw.width(),
        height: raw.height(),
    });
    let source = raw.provenance.to_string();

    match ctx.pipeline.process(&raw) {
        Ok(result) => {
            let mut summary = RoiSummary::from(&result);
            if let Some(writer) = ctx.crops {
                match writer.write(&raw.title, &result.crop) {
                    Ok(path) => summary.crop_path = Some(path.display().to_string()),
                    Err(e) => warn!("{e:#}"),
                }
            }
            let report = CardReport {
                title: raw.title,
                source,
                timestamp: iso_timestamp(),
                dimensions,
                outcome: Outcome::Processed(summary),
            };
            ctx.progress.on_event(ProgressEvent::Completed {
                report: report.clone(),
            });
            Ok(report)
        }
        Err(e) => {
            let (kind, e) = skip_kind_or_abort(e, &raw.title)?;
            Ok(skip(ctx, raw.title, source, dimensions, kind, &e))
        }
    }
}

/// Splits pipeline failures into per-image skips and run-fatal errors.
fn skip_kind_or_abort(error: PipelineError, title: &str) -> Result<(SkipKind, PipelineError)> {
    match error.skip_kind() {
        Some(kind) => Ok((kind, error)),
        None => Err(anyhow::Error::new(error)
            .context(format!("Invalid pipeline configuration while checking {title}"))),
    }
}

fn skip(
    ctx: &RunContext<'_>,
    title: String,
    source: String,
    dimensions: Option<ImageDimensions>,
    kind: SkipKind,
    error: &dyn std::error::Error,
) -> CardReport {
    let reason = error.to_string();
    ctx.progress.on_event(ProgressEvent::Skipped {
        title: title.clone(),
        reason: reason.clone(),
    });
    CardReport {
        title,
        source,
        timestamp: iso_timestamp(),
        dimensions,
        outcome: Outcome::Skipped { kind, reason },
    }
}

/// Path or URL of an image that failed to load.
fn load_error_source(error: &LoadError) -> String {
    match error {
        LoadError::Missing { path }
        | LoadError::Io { path, .. }
        | LoadError::ScratchDir { path, .. } => path.display().to_string(),
        LoadError::Decode { source_name, .. } => source_name.clone(),
        LoadError::Fetch { url, .. } => url.clone(),
    }
}

/// Report title for a source: the file stem, or the whole URL.
fn title_of(source: &str) -> String {
    if is_url(source) {
        return source.to_string();
    }
    Path::new(source)
        .file_stem()
        .map_or_else(|| source.to_string(), |s| s.to_string_lossy().into_owned())
}

/// Generate ISO 8601 UTC timestamp (RFC 3339 format).
fn iso_timestamp() -> String {
    match time::OffsetDateTime::now_utc().format(&time::format_description::well_known::Rfc3339) {
        Ok(ts) => ts,
        Err(e) => {
            debug!("Timestamp format failed: {e}");
            String::from("1970-01-01T00:00:00Z")
        }
    }
}
