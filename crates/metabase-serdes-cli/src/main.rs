//! metabase-serdes CLI
//!
//! - `index`: build the entity index and reference graph of an export
//! - `refs`: inbound and outbound references of one entity
//! - `plan`: validate and order a change list against an export

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::fs;
use std::path::{Path, PathBuf};

use metabase_serdes_changes::{load_change_list, plan_changes};
use metabase_serdes_graph::ExportGraph;
use metabase_serdes_ingest::read_export;
use metabase_serdes_model::EntityId;

mod config;
mod report;

use config::CliConfig;
use report::{IndexReport, PlanOutcome, PlanReport, RefsReport};

const PLAN_FILE_NAME: &str = "change_plan.json";

#[derive(Parser)]
#[command(name = "metabase-serdes")]
#[command(
    author,
    version,
    about = "Index Metabase serialization exports and plan changes against them"
)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Clone)]
struct GlobalArgs {
    /// Most verbose level written to stderr.
    #[arg(long, value_enum, default_value_t = LogLevel::Info, global = true)]
    log_level: LogLevel,

    /// YAML file with `read`, `graph` and `plan` settings.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the entity index of an export and report what was found.
    Index {
        /// Extracted export directory or `.tar.gz`/`.tgz` archive.
        export: PathBuf,
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
        /// Write the report here instead of stdout.
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Show the references into and out of one entity.
    Refs {
        export: PathBuf,
        /// Plain id, or a JSON array of strings for path ids
        /// (e.g. `["Sample Database","PUBLIC","ORDERS"]`).
        id: String,
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Validate a change list and order it into a plan.
    ///
    /// Writes `change_plan.json` into the output directory. Exits non-zero
    /// when the plan as a whole is rejected.
    Plan {
        export: PathBuf,
        /// YAML or JSON sequence of change requests.
        change_list: PathBuf,
        /// Existing directory that receives `change_plan.json`.
        #[arg(long, default_value = ".")]
        output_dir: PathBuf,
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
        /// Archived entities cannot satisfy a dependency.
        #[arg(long)]
        exclude_archived: bool,
    },
}

fn init_logging(level: LogLevel) {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::from(level))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.global.log_level);
    let config = CliConfig::load(cli.global.config.as_deref())?;

    match cli.command {
        Commands::Index {
            export,
            format,
            out,
        } => cmd_index(&export, format, out.as_deref(), &config),
        Commands::Refs { export, id, format } => cmd_refs(&export, &id, format, &config),
        Commands::Plan {
            export,
            change_list,
            output_dir,
            format,
            exclude_archived,
        } => {
            let config = config.with_exclude_archived(exclude_archived);
            cmd_plan(&export, &change_list, &output_dir, format, &config)
        }
    }
}

fn build_graph(export: &Path, config: &CliConfig) -> Result<ExportGraph> {
    let members = read_export(export, &config.read)?;
    let graph = ExportGraph::build(&members, &config.graph)?;
    Ok(graph)
}

/// `<ID>` as typed on the command line.
fn parse_entity_id(raw: &str) -> Result<EntityId> {
    let trimmed = raw.trim();
    if trimmed.starts_with('[') {
        let segments: Vec<String> = serde_json::from_str(trimmed)
            .with_context(|| format!("path id `{raw}` is not a JSON array of strings"))?;
        if segments.is_empty() {
            bail!("path id `{raw}` is empty");
        }
        return Ok(EntityId::path(segments));
    }
    if trimmed.is_empty() {
        bail!("entity id is empty");
    }
    Ok(EntityId::id(trimmed))
}

fn cmd_index(
    export: &Path,
    format: OutputFormat,
    out: Option<&Path>,
    config: &CliConfig,
) -> Result<()> {
    let graph = build_graph(export, config)?;
    let report = IndexReport::new(export.display().to_string(), &graph);

    if out.is_some() {
        colored::control::set_override(false);
    }
    let rendered = match format {
        OutputFormat::Text => report::render_index_text(&report),
        OutputFormat::Json => serde_json::to_string_pretty(&report)?,
    };

    match out {
        Some(path) => {
            fs::write(path, rendered)
                .with_context(|| format!("failed to write `{}`", path.display()))?;
            eprintln!("{} {}", "wrote".green().bold(), path.display().to_string().bold());
        }
        None => println!("{}", rendered.trim_end()),
    }
    Ok(())
}

fn cmd_refs(export: &Path, raw_id: &str, format: OutputFormat, config: &CliConfig) -> Result<()> {
    let id = parse_entity_id(raw_id)?;
    let graph = build_graph(export, config)?;
    let report = RefsReport::new(&id, &graph);
    if report.record.is_none() {
        return Err(anyhow!("{id} does not occur in {}", export.display()));
    }

    match format {
        OutputFormat::Text => println!("{}", report::render_refs_text(&report).trim_end()),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
    }
    Ok(())
}

fn cmd_plan(
    export: &Path,
    change_list: &Path,
    output_dir: &Path,
    format: OutputFormat,
    config: &CliConfig,
) -> Result<()> {
    if !output_dir.is_dir() {
        bail!("output directory `{}` does not exist", output_dir.display());
    }

    let graph = build_graph(export, config)?;
    let requests = load_change_list(change_list)?;
    let result = plan_changes(&graph, &requests, &config.plan);

    let outcome = match &result {
        Ok(plan) => PlanOutcome::Planned { plan },
        Err(rejection) => PlanOutcome::Rejected { rejection },
    };
    let report = PlanReport::new(
        export.display().to_string(),
        change_list.display().to_string(),
        outcome,
    );

    let json = serde_json::to_string_pretty(&report)?;
    let plan_path = output_dir.join(PLAN_FILE_NAME);
    fs::write(&plan_path, &json)
        .with_context(|| format!("failed to write `{}`", plan_path.display()))?;

    match format {
        OutputFormat::Text => println!("{}", report::render_plan_text(&report).trim_end()),
        OutputFormat::Json => println!("{json}"),
    }
    eprintln!("{} {}", "wrote".green().bold(), plan_path.display().to_string().bold());

    match result {
        Ok(_) => Ok(()),
        Err(rejection) => Err(rejection.into()),
    }
}
