use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use fleetwatch::data::duration::{format_duration, parse_duration};
use fleetwatch::data::{filter, summary::node_line};
use fleetwatch::{
    freshness, get_filter_state, DirectorySource, FacetView, FilterState, FleetExport,
    FleetSummary, Freshness, HttpRecordSource, Publication, RecordSource, Scheduler, SchedulerHandle, Settings,
    StatusPipeline, TimelinePipeline, TimelineView,
};
use fleetwatch_types::NodeStatus;

#[derive(Parser, Debug)]
#[command(name = "fleetwatch")]
#[command(about = "Poll sensor-fleet telemetry and report per-node status")]
struct Args {
    /// Configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Read fixtures from a directory instead of the HTTP services
    #[arg(short, long)]
    dir: Option<PathBuf>,

    /// Aggregate usage timelines instead of node status
    #[arg(long, conflicts_with_all = ["filter", "query"])]
    timeline: bool,

    /// Poll interval override (e.g., "30s", "1m")
    #[arg(short, long)]
    interval: Option<String>,

    /// Elapsed time after which a node is not reporting (e.g., "10m")
    #[arg(long)]
    fail_after: Option<String>,

    /// Elapsed time after which a report is late (e.g., "3m")
    #[arg(long)]
    warn_after: Option<String>,

    /// Facet set used to interpret --filter
    #[arg(long, default_value = "status")]
    view: FacetView,

    /// Facet filter, e.g. status="reporting" or project=SAGE,DAWN (repeatable)
    #[arg(short, long, value_name = "KEY=VALUE")]
    filter: Vec<String>,

    /// Free-text search over every node field
    #[arg(short, long)]
    query: Option<String>,

    /// Print the first publication as JSON and exit
    #[arg(long)]
    once: bool,

    /// Write the first publication to a JSON file and exit
    #[arg(short, long)]
    export: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.log_json);

    let settings = load_settings(&args)?;
    let state = filter_state(&args)?;

    let source: Arc<dyn RecordSource> = match &args.dir {
        Some(dir) => Arc::new(DirectorySource::new(dir)),
        None => Arc::new(HttpRecordSource::from_settings(&settings)?),
    };
    info!(
        source = source.description(),
        interval = %format_duration(settings.poll.interval),
        "starting"
    );

    if args.timeline {
        let pipeline = TimelinePipeline::from_settings(source, &settings);
        let handle = Scheduler::new(pipeline, settings.poll.interval).spawn();
        run_timeline(handle, &args).await
    } else {
        let pipeline = StatusPipeline::from_settings(source, &settings);
        let handle = Scheduler::new(pipeline, settings.poll.interval).spawn();
        run_status(handle, &args, &settings, &state).await
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("fleetwatch=info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// File and environment settings with command-line overrides applied.
fn load_settings(args: &Args) -> Result<Settings> {
    let mut settings = Settings::load(args.config.as_deref()).context("loading configuration")?;

    if let Some(interval) = &args.interval {
        settings.poll.interval = parse_duration(interval).context("--interval")?;
    }
    if let Some(fail) = &args.fail_after {
        settings.thresholds.fail = parse_duration(fail).context("--fail-after")?;
    }
    if let Some(warning) = &args.warn_after {
        settings.thresholds.warning = parse_duration(warning).context("--warn-after")?;
    }
    if settings.thresholds.warning > settings.thresholds.fail {
        bail!("warning threshold must not exceed the failure threshold");
    }

    Ok(settings)
}

fn filter_state(args: &Args) -> Result<FilterState> {
    let mut params = Vec::new();
    for raw in &args.filter {
        let (key, value) = raw
            .split_once('=')
            .ok_or_else(|| anyhow!("filter must be KEY=VALUE: {}", raw))?;
        params.push((key.trim().to_string(), value.to_string()));
    }
    if let Some(query) = &args.query {
        params.push(("query".to_string(), query.clone()));
    }

    Ok(get_filter_state(params, args.view))
}

/// Wait for the first publication that is not pending.
async fn first_publication<T>(handle: &SchedulerHandle<T>) -> Result<Publication<T>> {
    let mut rx = handle.subscribe();
    let publication = rx
        .wait_for(|p| !matches!(p, Publication::Pending))
        .await
        .context("scheduler stopped before publishing")?
        .clone();
    Ok(publication)
}

async fn run_status(
    handle: SchedulerHandle<Vec<NodeStatus>>,
    args: &Args,
    settings: &Settings,
    state: &FilterState,
) -> Result<()> {
    let select = |nodes: &[NodeStatus]| {
        let mut nodes = filter::apply(nodes, state);
        filter::sort_reporting_first(&mut nodes);
        nodes
    };

    if args.once || args.export.is_some() {
        let publication = first_publication(&handle).await;
        handle.stop();

        let (nodes, updated_at) = match publication? {
            Publication::Ready { value, updated_at, .. } => (select(&value), updated_at),
            Publication::Failed { errors } => bail!("no data: {}", errors.join("; ")),
            Publication::Pending => bail!("no data"),
        };

        let json = FleetExport::new(&nodes, &settings.thresholds, updated_at).to_json()?;
        emit(&json, args.export.as_deref(), "fleet status")?;
        handle.join().await?;
        return Ok(());
    }

    let thresholds = settings.thresholds;
    watch_publications(handle, |value, updated_at| {
        let nodes = select(value);
        let summary = FleetSummary::from_nodes(&nodes, &thresholds);
        println!("[{}] {}", updated_at.format("%H:%M:%S"), summary.line());
        for node in nodes.iter().filter(|n| freshness(n, &thresholds) != Freshness::Fresh) {
            println!("  {}", node_line(node, &thresholds));
        }
    })
    .await
}

async fn run_timeline(handle: SchedulerHandle<TimelineView>, args: &Args) -> Result<()> {
    if args.once || args.export.is_some() {
        let publication = first_publication(&handle).await;
        handle.stop();

        let view = match publication? {
            Publication::Ready { value, .. } => value,
            Publication::Failed { errors } => bail!("no data: {}", errors.join("; ")),
            Publication::Pending => bail!("no data"),
        };

        let json = serde_json::to_string_pretty(view.as_ref())?;
        emit(&json, args.export.as_deref(), "usage timelines")?;
        handle.join().await?;
        return Ok(());
    }

    watch_publications(handle, |view: &TimelineView, updated_at| {
        let total: f64 = view.timelines.by_app.iter().map(|b| b.total()).sum();
        println!(
            "[{}] {} nodes, {} with usage, {} apps, {:.0} total",
            updated_at.format("%H:%M:%S"),
            view.nodes.len(),
            view.timelines.by_node.len(),
            view.timelines.by_app.len(),
            total
        );
    })
    .await
}

/// Call `report` for every publication until Ctrl-C.
async fn watch_publications<T, F>(handle: SchedulerHandle<T>, mut report: F) -> Result<()>
where
    F: FnMut(&T, DateTime<Utc>),
{
    let mut rx = handle.subscribe();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let publication = rx.borrow_and_update().clone();
                match publication {
                    Publication::Ready { value, updated_at, .. } => report(&value, updated_at),
                    Publication::Failed { errors } => eprintln!("no data yet: {}", errors.join("; ")),
                    Publication::Pending => {}
                }
            }
            _ = &mut ctrl_c => {
                info!("interrupted");
                break;
            }
        }
    }

    handle.stop();
    handle.join().await?;
    Ok(())
}

/// Write `json` to `path`, or to stdout when no path is given.
fn emit(json: &str, path: Option<&Path>, what: &str) -> Result<()> {
    match path {
        Some(path) => {
            let mut file = std::fs::File::create(path)
                .with_context(|| format!("creating {}", path.display()))?;
            file.write_all(json.as_bytes())?;
            println!("Exported {} to: {}", what, path.display());
        }
        None => println!("{}", json),
    }
    Ok(())
}
