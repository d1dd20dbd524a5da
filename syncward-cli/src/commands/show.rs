//! `syncward show`: print the summary of a finished run.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use syncward_core::{ConfigFile, PhaseRecord, RunId, RunStatus, SummaryRecord};
use syncward_evidence::{layout::MANIFEST_FILE, EvidenceLayout, Manifest, RunRecord};

use super::{absolutize, resolve_target};

/// Arguments for `syncward show`.
#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Run to show; defaults to the run `LATEST` points at.
    pub run_id: Option<String>,

    /// Repository whose evidence root is read.
    #[arg(long)]
    pub repo: Option<PathBuf>,

    /// Evidence root, overriding the configured one.
    #[arg(long = "evidence-dir", value_name = "DIR")]
    pub evidence_dir: Option<PathBuf>,

    /// Extra YAML config layered over the global and repository files.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct ShowJson<'a> {
    summary: &'a SummaryRecord,
    run: &'a RunRecord,
    /// Evidence files whose digest no longer matches `manifest.json`.
    tampered: &'a [String],
}

#[derive(Tabled)]
struct PhaseRow {
    #[tabled(rename = "phase")]
    phase: String,
    #[tabled(rename = "status")]
    status: String,
    #[tabled(rename = "reason")]
    reason: String,
    #[tabled(rename = "detail")]
    detail: String,
}

impl ShowArgs {
    pub fn run(self) -> Result<()> {
        let cwd = std::env::current_dir().context("could not determine current directory")?;
        let overrides = ConfigFile {
            evidence_root: self.evidence_dir.as_deref().map(|p| absolutize(&cwd, p)),
            ..ConfigFile::default()
        };
        let target = resolve_target(self.repo.as_deref(), self.config.as_deref(), overrides)?;
        let layout = EvidenceLayout::new(target.config.evidence_root);

        let run_dir = match &self.run_id {
            Some(id) => {
                let dir = layout.run_dir(&RunId::from(id.as_str()));
                if !dir.is_dir() {
                    bail!("no evidence for run '{id}' under {}", layout.root().display());
                }
                dir
            }
            None => layout
                .latest_run_dir()
                .context("failed to read LATEST pointer")?
                .with_context(|| format!("no runs recorded under {}", layout.root().display()))?,
        };

        let summary = layout
            .load_summary(&run_dir)
            .with_context(|| format!("failed to load summary from {}", run_dir.display()))?;
        let run = layout
            .load_run_record(&run_dir)
            .with_context(|| format!("failed to load run record from {}", run_dir.display()))?;
        let tampered = verify_manifest(&run_dir)?;

        if self.json {
            let payload = ShowJson {
                summary: &summary,
                run: &run,
                tampered: &tampered,
            };
            println!("{}", serde_json::to_string_pretty(&payload)?);
            return Ok(());
        }

        print_human(&summary, &run, &tampered, &run_dir);
        Ok(())
    }
}

fn verify_manifest(run_dir: &Path) -> Result<Vec<String>> {
    let path = run_dir.join(MANIFEST_FILE);
    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let manifest: Manifest = serde_json::from_str(&contents)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    manifest
        .verify(run_dir)
        .with_context(|| format!("failed to verify {}", path.display()))
}

fn print_human(summary: &SummaryRecord, run: &RunRecord, tampered: &[String], run_dir: &Path) {
    let status = match summary.status {
        RunStatus::Pass => summary.status.to_string().green().bold(),
        RunStatus::Degraded => summary.status.to_string().yellow().bold(),
        RunStatus::Fail => summary.status.to_string().red().bold(),
    };
    println!(
        "{} {}  {} ({})",
        "run".bold(),
        summary.run_id,
        status,
        summary.reason
    );
    if let Some(detail) = &summary.detail {
        println!("  {detail}");
    }
    println!(
        "  mode {}  started {}  finished {}",
        run.mode,
        summary.started_at.format("%Y-%m-%d %H:%M:%S UTC"),
        summary.finished_at.format("%Y-%m-%d %H:%M:%S UTC"),
    );

    let rows: Vec<PhaseRow> = run.phases.iter().map(phase_row).collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");

    for warning in &summary.warnings {
        println!("{} {warning}", "warning:".yellow());
    }
    if let Some(stash) = &summary.stash {
        println!("{} {} ({})", "stash:".cyan(), stash.reference, stash.message);
    }
    if !tampered.is_empty() {
        println!(
            "{} modified since the run finalized: {}",
            "evidence:".red().bold(),
            tampered.join(", ")
        );
    }
    println!("{} {}", "next:".bold(), summary.next_action);
    println!("{} {}", "evidence:".bold(), run_dir.display());
}

fn phase_row(record: &PhaseRecord) -> PhaseRow {
    PhaseRow {
        phase: record.phase.to_string(),
        status: record.status.to_string(),
        reason: record
            .reason
            .map(|r| r.to_string())
            .unwrap_or_default(),
        detail: record.detail.clone().unwrap_or_default(),
    }
}
