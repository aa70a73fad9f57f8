#![forbid(unsafe_code)]

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand, ValueEnum};
use overlay_core::{RecordKind, RecordStatus, ValueRecord, ValueRecordWithStatus, ValueSource, WorkloadConfig};
use overlay_diff::{diff_with, summarize, ArrayMode, DiffOptions};
use overlay_merge::{merge_container, validate_records, PendingTraits, TraitInstance};
use overlay_schema::{prepare, ui_schema_for, PartitionRules};
use serde::Serialize;
use tracing::{info, warn};

mod input;

#[derive(Parser, Debug)]
#[command(name = "overlayctl", version, about = "Layered workload configuration: merge, diff, partition")]
struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, global = true, default_value_t = Output::Human)]
    output: Output,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output { Human, Json }

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Kind { Env, File }

impl From<Kind> for RecordKind {
    fn from(k: Kind) -> Self {
        match k {
            Kind::Env => RecordKind::Env,
            Kind::File => RecordKind::File,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show the merged view of base and override workload configuration
    Merge {
        /// Base workload file (YAML or JSON)
        base: PathBuf,
        /// Override workload file (YAML or JSON)
        overrides: PathBuf,
        /// Restrict to one container (default: all containers of either layer)
        #[arg(long = "container")]
        container: Option<String>,
        /// Restrict to one record kind (default: both)
        #[arg(long = "kind", value_enum)]
        kind: Option<Kind>,
    },
    /// Path-qualified structural diff between two documents
    Diff {
        before: PathBuf,
        after: PathBuf,
        /// Array comparison: opaque or index
        #[arg(long = "arrays", env = "OVERLAY_DIFF_ARRAYS", default_value = "opaque")]
        arrays: ArrayMode,
    },
    /// Split a parameter schema into essential and advanced fragments
    Partition {
        schema: PathBuf,
        /// Supplied UI schema
        #[arg(long = "ui-schema")]
        ui_schema: Option<PathBuf>,
        /// Extra field names to classify as advanced (comma-separated)
        #[arg(long = "advanced", env = "OVERLAY_ADVANCED_FIELDS", value_delimiter = ',')]
        advanced: Vec<String>,
    },
    /// Generate display titles for every top-level property
    UiSchema {
        schema: PathBuf,
        /// Supplied UI schema; its entries win over generated ones
        #[arg(long = "ui-schema")]
        ui_schema: Option<PathBuf>,
    },
    /// Check override records (and trait instances) for save-blocking problems
    Validate {
        /// Override workload file
        overrides: PathBuf,
        /// Trait instance list (YAML or JSON array)
        #[arg(long = "traits")]
        traits: Option<PathBuf>,
        /// Parameter schema per trait type, as TRAIT=PATH (repeatable)
        #[cfg(feature = "validate")]
        #[arg(long = "trait-schema")]
        trait_schema: Vec<String>,
    },
}

fn init_tracing() {
    let env = std::env::var("OVERLAY_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).with_writer(std::io::stderr).init();
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Merge { base, overrides, container, kind } => {
            let base_cfg: WorkloadConfig = input::load(&base)?;
            let over_cfg: WorkloadConfig = input::load(&overrides)?;
            let rows = merged_rows(&base_cfg, &over_cfg, container.as_deref(), kind.map(RecordKind::from));
            info!(rows = rows.len(), "merge invoked");
            match cli.output {
                Output::Human => {
                    println!("{:<12} {:<6} {:<24} {:<11} VALUE", "CONTAINER", "KIND", "KEY", "STATUS");
                    for r in &rows {
                        println!(
                            "{:<12} {:<6} {:<24} {:<11} {}",
                            r.container,
                            r.kind.as_str(),
                            r.row.record.key,
                            status_label(r.row.status),
                            render_value(&r.row.record)
                        );
                    }
                }
                Output::Json => println!("{}", serde_json::to_string_pretty(&rows)?),
            }
        }
        Commands::Diff { before, after, arrays } => {
            let b = input::load_json(&before)?;
            let a = input::load_json(&after)?;
            let changes = diff_with(&b, &a, DiffOptions { arrays });
            let summary = summarize(&changes);
            info!(adds = summary.adds, updates = summary.updates, removes = summary.removes, "diff invoked");
            match cli.output {
                Output::Human => {
                    for c in &changes {
                        println!("{}", c);
                    }
                    println!("diff: +{} ~{} -{}", summary.adds, summary.updates, summary.removes);
                }
                Output::Json => {
                    #[derive(Serialize)]
                    struct Out<'a> { changes: &'a [overlay_core::Change], summary: &'a overlay_diff::DiffSummary }
                    println!("{}", serde_json::to_string_pretty(&Out { changes: &changes, summary: &summary })?);
                }
            }
        }
        Commands::Partition { schema, ui_schema, advanced } => {
            let schema = input::load_json(&schema)?;
            let ui = input::load_optional_json(ui_schema.as_deref())?;
            let rules = PartitionRules::new(advanced.iter().map(|s| s.trim()).filter(|s| !s.is_empty()));
            let prepared = prepare(&schema, &ui, &rules);
            match cli.output {
                Output::Human => {
                    let p = &prepared.partition;
                    println!("essential: {}", field_list(p.essential.properties.keys(), &p.essential.required));
                    println!("advanced: {}", field_list(p.advanced.properties.keys(), &p.advanced.required));
                }
                Output::Json => {
                    #[derive(Serialize)]
                    struct Out { essential: serde_json::Value, advanced: serde_json::Value, #[serde(rename = "uiSchema")] ui_schema: serde_json::Value }
                    let out = Out {
                        essential: prepared.partition.essential.to_schema(),
                        advanced: prepared.partition.advanced.to_schema(),
                        ui_schema: prepared.ui_schema,
                    };
                    println!("{}", serde_json::to_string_pretty(&out)?);
                }
            }
        }
        Commands::UiSchema { schema, ui_schema } => {
            let schema = input::load_json(&schema)?;
            let ui = input::load_optional_json(ui_schema.as_deref())?;
            let generated = ui_schema_for(&schema, &ui);
            match cli.output {
                Output::Human => {
                    if let Some(map) = generated.as_object() {
                        for (k, v) in map {
                            let title = v.get(overlay_schema::UI_TITLE).and_then(|t| t.as_str()).unwrap_or("-");
                            println!("{:<24} {}", k, title);
                        }
                    }
                }
                Output::Json => println!("{}", serde_json::to_string_pretty(&generated)?),
            }
        }
        #[cfg(not(feature = "validate"))]
        Commands::Validate { overrides, traits } => {
            let problems = validate_workload(&overrides, traits.as_deref(), cli.output)?;
            if problems > 0 {
                return Err(anyhow!("{} problem(s) found", problems));
            }
        }
        #[cfg(feature = "validate")]
        Commands::Validate { overrides, traits, trait_schema } => {
            let mut problems = validate_workload(&overrides, traits.as_deref(), cli.output)?;
            if let Some(path) = traits.as_deref() {
                problems += validate_trait_parameters(path, &trait_schema)?;
            }
            if problems > 0 {
                return Err(anyhow!("{} problem(s) found", problems));
            }
        }
    }

    Ok(())
}

#[derive(Debug, Serialize)]
struct Row {
    container: String,
    kind: RecordKind,
    #[serde(flatten)]
    row: ValueRecordWithStatus,
}

fn merged_rows(base: &WorkloadConfig, overrides: &WorkloadConfig, container: Option<&str>, kind: Option<RecordKind>) -> Vec<Row> {
    let containers: Vec<String> = match container {
        Some(c) => vec![c.to_string()],
        None => {
            let names: BTreeSet<&str> = base.container_names().chain(overrides.container_names()).collect();
            names.into_iter().map(str::to_string).collect()
        }
    };
    let kinds = match kind {
        Some(k) => vec![k],
        None => vec![RecordKind::Env, RecordKind::File],
    };
    let mut out = Vec::new();
    for c in &containers {
        for &k in &kinds {
            out.extend(merge_container(base, overrides, c, k).into_iter().map(|row| Row { container: c.clone(), kind: k, row }));
        }
    }
    out
}

fn status_label(s: RecordStatus) -> &'static str {
    match s {
        RecordStatus::Inherited => "inherited",
        RecordStatus::Overridden => "overridden",
        RecordStatus::New => "new",
    }
}

fn render_value(r: &ValueRecord) -> String {
    let value = match &r.source {
        Some(ValueSource::Plain(v)) => v.clone(),
        Some(ValueSource::Secret(s)) => format!("secret:{}/{}", s.name, s.key),
        None => "-".to_string(),
    };
    match r.mount_path.as_deref() {
        Some(p) if !p.is_empty() => format!("{} @ {}", value, p),
        _ => value,
    }
}

fn field_list<'a>(keys: impl Iterator<Item = &'a String>, required: &[String]) -> String {
    let names: Vec<String> = keys
        .map(|k| if required.contains(k) { format!("{}*", k) } else { k.clone() })
        .collect();
    if names.is_empty() { "(none)".to_string() } else { names.join(", ") }
}

/// Print record and trait issues; returns how many were found.
fn validate_workload(overrides: &std::path::Path, traits: Option<&std::path::Path>, output: Output) -> Result<usize> {
    let cfg: WorkloadConfig = input::load(overrides)?;

    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    struct Issue { scope: String, index: usize, message: String }

    let mut issues = Vec::new();
    for (container, c) in cfg.containers.iter() {
        for kind in [RecordKind::Env, RecordKind::File] {
            for issue in validate_records(c.records(kind), kind) {
                issues.push(Issue { scope: format!("{}.{}", container, kind.as_str()), index: issue.index, message: issue.problem.to_string() });
            }
        }
    }
    if let Some(path) = traits {
        let list: Vec<TraitInstance> = input::load(path)?;
        for issue in PendingTraits::new(list).validate() {
            issues.push(Issue { scope: "traits".to_string(), index: issue.index, message: issue.problem.to_string() });
        }
    }

    match output {
        Output::Human => {
            if issues.is_empty() {
                println!("ok");
            }
            for i in &issues {
                println!("{} row {}: {}", i.scope, i.index, i.message);
            }
        }
        Output::Json => println!("{}", serde_json::to_string_pretty(&issues)?),
    }
    if !issues.is_empty() {
        warn!(issues = issues.len(), "validation found problems");
    }
    Ok(issues.len())
}

#[cfg(feature = "validate")]
fn validate_trait_parameters(traits: &std::path::Path, schemas: &[String]) -> Result<usize> {
    let list: Vec<TraitInstance> = input::load(traits)?;
    let mut problems = 0usize;
    for spec in schemas {
        let (trait_name, path) = spec.split_once('=').ok_or_else(|| anyhow!("expected TRAIT=PATH, got {:?}", spec))?;
        let schema = input::load_json(std::path::Path::new(path))?;
        for t in list.iter().filter(|t| t.name == trait_name) {
            for issue in overlay_schema::validate::validate_parameters(&schema, &t.parameters)? {
                problems += 1;
                let hint = issue.hint.map(|h| format!(" ({})", h)).unwrap_or_default();
                eprintln!("trait {} {}: {}{}", t.instance_name, issue.path, issue.error, hint);
            }
        }
    }
    Ok(problems)
}
