//! `syncward lock`: inspect the repository lock without touching it.

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Args;
use colored::Colorize;
use serde::Serialize;

use syncward_core::{ConfigFile, LockRecord};
use syncward_engine::{hostname, lock, LockState, NativeLiveness};
use syncward_evidence::EvidenceLayout;

use super::{absolutize, canonical_repo, resolve_target};

/// Arguments for `syncward lock`.
#[derive(Args, Debug)]
pub struct LockArgs {
    /// Repository whose lock is inspected.
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
struct LockJson {
    path: PathBuf,
    state: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    record: Option<LockRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    owner_alive: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    age_secs: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
}

impl LockArgs {
    pub fn run(self) -> Result<()> {
        let cwd = std::env::current_dir().context("could not determine current directory")?;
        let overrides = ConfigFile {
            evidence_root: self.evidence_dir.as_deref().map(|p| absolutize(&cwd, p)),
            ..ConfigFile::default()
        };
        let target = resolve_target(self.repo.as_deref(), self.config.as_deref(), overrides)?;
        let layout = EvidenceLayout::new(target.config.evidence_root);
        let path = layout.lock_path(&canonical_repo(&target.repo_root));

        let state = lock::inspect(
            &path,
            &hostname(),
            target.config.policy.lock_timeout_secs,
            &NativeLiveness,
            Utc::now(),
        )
        .with_context(|| format!("failed to inspect {}", path.display()))?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&to_json(path, state))?);
            return Ok(());
        }

        match state {
            LockState::Absent => {
                println!("{} no lock at {}", "free".green().bold(), path.display())
            }
            LockState::Corrupt { detail } => {
                println!("{} {}", "corrupt".red().bold(), path.display());
                println!("  {detail}");
                println!("  inspect the file, then remove it once no run is active");
            }
            LockState::Held(status) => {
                let label = if status.stale {
                    "stale".yellow().bold()
                } else {
                    "held".red().bold()
                };
                let record = &status.record;
                println!("{label} {}", path.display());
                println!("  run      {}", record.run_id);
                println!("  owner    pid {} on {}", record.pid, record.host);
                println!(
                    "  alive    {}",
                    if !status.same_host {
                        "unknown (other host)"
                    } else if status.owner_alive {
                        "yes"
                    } else {
                        "no"
                    }
                );
                println!("  age      {}s", status.age_secs);
                println!("  evidence {}", record.evidence_dir.display());
            }
        }
        Ok(())
    }
}

fn to_json(path: PathBuf, state: LockState) -> LockJson {
    match state {
        LockState::Absent => LockJson {
            path,
            state: "absent",
            record: None,
            owner_alive: None,
            age_secs: None,
            detail: None,
        },
        LockState::Corrupt { detail } => LockJson {
            path,
            state: "corrupt",
            record: None,
            owner_alive: None,
            age_secs: None,
            detail: Some(detail),
        },
        LockState::Held(status) => LockJson {
            path,
            state: if status.stale { "stale" } else { "held" },
            owner_alive: Some(status.owner_alive),
            age_secs: Some(status.age_secs),
            record: Some(status.record),
            detail: None,
        },
    }
}
