//! stagecut binary: split a training graph into pipeline stages and drive
//! the result.
//!
//! ```bash
//! # Split a JSON graph with a JSON cut list into bincode stage artifacts
//! RUST_LOG=info stagecut split --graph model.json --cuts cuts.json --out-dir stages/
//!
//! # Show what a stage contains
//! stagecut inspect stages/stage_1.bin
//!
//! # Validate an event plan against the stages, then run it
//! stagecut check-plan --plan plan.json stages/stage_*.bin
//! stagecut run --plan plan.json --inputs batches.json stages/stage_*.bin
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use stagecut_runtime::{EventPlan, PipelineDriver};
use stagecut_split::artifact::{self, ArtifactFormat};
use stagecut_split::PipelineSplitter;
use stagecut_types::config::{RuntimeConfig, SyncConfig};
use stagecut_types::cut::CutSpec;
use stagecut_types::event::SyncRole;
use stagecut_types::graph::Graph;
use stagecut_types::stage::{BoundaryTensor, SubGraph};
use stagecut_types::tensor::Tensor;

// ── CLI ───────────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name    = "stagecut",
    version = env!("CARGO_PKG_VERSION"),
    about   = "Pipeline-parallel graph splitter with wait/record synchronization"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Bincode,
    Json,
}

impl From<Format> for ArtifactFormat {
    fn from(f: Format) -> Self {
        match f {
            Format::Bincode => ArtifactFormat::Bincode,
            Format::Json => ArtifactFormat::Json,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Split a graph into one artifact per stage.
    Split {
        /// Graph file (`.json`, anything else is read as bincode).
        #[arg(long)]
        graph: PathBuf,
        /// JSON array of per-stage `{ "fw": ..., "bw": ... }` cuts.
        #[arg(long)]
        cuts: PathBuf,
        #[arg(long)]
        out_dir: PathBuf,
        #[arg(long, value_enum, default_value = "bincode")]
        format: Format,
    },

    /// Print a summary of one stage artifact.
    Inspect { artifact: PathBuf },

    /// Reassemble stage artifacts into a single graph.
    Merge {
        #[arg(long)]
        out: PathBuf,
        #[arg(required = true)]
        artifacts: Vec<PathBuf>,
    },

    /// Validate an event plan against stage artifacts.
    CheckPlan {
        #[arg(long)]
        plan: PathBuf,
        #[arg(required = true)]
        artifacts: Vec<PathBuf>,
    },

    /// Run stage artifacts on the reference session and print the fetches.
    Run {
        #[arg(long)]
        plan: PathBuf,
        /// JSON array with one `{ input name: tensor }` map per micro-batch.
        #[arg(long)]
        inputs: PathBuf,
        /// Per-wait timeout; waits block forever when omitted.
        #[arg(long)]
        timeout_ms: Option<u64>,
        #[arg(required = true)]
        artifacts: Vec<PathBuf>,
    },
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    // Default log level: INFO. Override with RUST_LOG=stagecut_split=debug etc.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match Cli::parse().command {
        Command::Split { graph, cuts, out_dir, format } => {
            let paths = split_to_dir(&graph, &cuts, &out_dir, format.into())?;
            for path in paths {
                println!("{}", path.display());
            }
            Ok(())
        }
        Command::Inspect { artifact: path } => {
            print!("{}", describe(&artifact::read_artifact(&path)?));
            Ok(())
        }
        Command::Merge { out, artifacts } => {
            let graph = stagecut_split::reassemble(&load_stages(&artifacts)?)?;
            let bytes = artifact::encode(&graph, ArtifactFormat::from_path(&out))?;
            fs::write(&out, bytes).with_context(|| format!("writing {}", out.display()))?;
            info!(nodes = graph.nodes.len(), path = %out.display(), "merged graph written");
            Ok(())
        }
        Command::CheckPlan { plan, artifacts } => {
            let plan = load_plan(&plan)?;
            let subs = load_stages(&artifacts)?;
            plan.validate()?;
            plan.check_coverage(&subs)?;
            println!(
                "plan ok: {} micro-batches over {} stages",
                plan.num_micro_batches(),
                subs.len()
            );
            Ok(())
        }
        Command::Run { plan, inputs, timeout_ms, artifacts } => {
            run_stages(&plan, &inputs, timeout_ms, &artifacts).await
        }
    }
}

// ── Commands ──────────────────────────────────────────────────────────────────

fn split_to_dir(graph: &Path, cuts: &Path, out_dir: &Path, format: ArtifactFormat) -> Result<Vec<PathBuf>> {
    let graph: Graph = read_file(graph)?;
    let cuts: Vec<CutSpec> = read_file(cuts)?;

    let subs = PipelineSplitter::new(SyncConfig::default())
        .split(&graph, &cuts)
        .with_context(|| format!("splitting graph {:?}", graph.name))?;
    Ok(artifact::write_artifacts(out_dir, &subs, format)?)
}

async fn run_stages(plan: &Path, inputs: &Path, timeout_ms: Option<u64>, artifacts: &[PathBuf]) -> Result<()> {
    let plan = load_plan(plan)?;
    let batches: Vec<HashMap<String, Tensor>> = read_file(inputs)?;
    let config = RuntimeConfig {
        wait_timeout: timeout_ms.map(Duration::from_millis),
        sync: SyncConfig::default(),
    };

    let driver = PipelineDriver::new(load_stages(artifacts)?, &config);
    let outputs = driver.run(batches, &plan).await?;
    for out in outputs {
        let line = serde_json::json!({
            "micro_batch": out.micro_batch,
            "stage": out.stage,
            "tensors": out.tensors,
        });
        println!("{line}");
    }
    Ok(())
}

fn describe(sub: &SubGraph) -> String {
    let mut text = format!(
        "stage {} ({})\n  nodes: {} copied, {} sync\n  initializers: {}\n",
        sub.stage,
        sub.graph.name,
        sub.graph.nodes.len().saturating_sub(sub.sync_node_count()),
        sub.sync_node_count(),
        sub.graph.initializers.len(),
    );
    for role in [SyncRole::Wait, SyncRole::Record] {
        let slots: Vec<String> = sub
            .event_slots
            .iter()
            .filter(|s| s.role == role)
            .map(|s| s.input_name())
            .collect();
        text += &format!("  {} slots: {}\n", role.as_str(), slots.join(", "));
    }
    let ports = |list: &[BoundaryTensor]| {
        list.iter()
            .map(|b| format!("{} ({})", b.port, b.direction))
            .collect::<Vec<_>>()
            .join(", ")
    };
    text += &format!("  receives: {}\n", ports(&sub.boundary_inputs));
    text += &format!("  sends: {}\n", ports(&sub.boundary_outputs));
    text
}

// ── Loading ───────────────────────────────────────────────────────────────────

fn read_file<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let data = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    artifact::decode(&data, ArtifactFormat::from_path(path))
        .with_context(|| format!("decoding {}", path.display()))
}

fn load_plan(path: &Path) -> Result<EventPlan> {
    read_file(path)
}

/// Read stage artifacts and order them by stage; stages must be `0..n`.
fn load_stages(paths: &[PathBuf]) -> Result<Vec<SubGraph>> {
    let mut subs = paths
        .iter()
        .map(|p| artifact::read_artifact(p).with_context(|| format!("reading {}", p.display())))
        .collect::<Result<Vec<_>>>()?;
    subs.sort_by_key(|s| s.stage);
    for (i, sub) in subs.iter().enumerate() {
        if sub.stage as usize != i {
            bail!("stage artifacts are not contiguous: expected stage {i}, found {}", sub.stage);
        }
        if sub.origins.len() != sub.graph.nodes.len() {
            bail!(
                "stage {i}: {} origins recorded for {} nodes",
                sub.origins.len(),
                sub.graph.nodes.len()
            );
        }
    }
    Ok(subs)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
