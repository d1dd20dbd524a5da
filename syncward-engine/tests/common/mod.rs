//! Real-git fixtures: a bare `remote.git`, a `seed` clone used to publish
//! upstream commits, and the `work` clone the engine synchronizes.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::process::Command;

use syncward_core::{Mode, Policy, RunSettings};
use syncward_evidence::layout::MARKERS_FILE;
use syncward_engine::RunOutcome;
use tempfile::TempDir;

pub fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

pub fn git(dir: &Path, args: &[&str]) -> String {
    let out = Command::new("git")
        .args(args)
        .current_dir(dir)
        .env("GIT_TERMINAL_PROMPT", "0")
        .output()
        .expect("spawn git");
    assert!(
        out.status.success(),
        "git {:?} failed in {}: {}",
        args,
        dir.display(),
        String::from_utf8_lossy(&out.stderr)
    );
    String::from_utf8_lossy(&out.stdout).into_owned()
}

fn identify(dir: &Path) {
    git(dir, &["config", "user.name", "Syncward Tests"]);
    git(dir, &["config", "user.email", "tests@syncward.invalid"]);
    git(dir, &["config", "commit.gpgsign", "false"]);
}

pub struct Fixture {
    pub tmp: TempDir,
    pub remote: PathBuf,
    pub seed: PathBuf,
    pub work: PathBuf,
    pub evidence: PathBuf,
}

impl Fixture {
    pub fn new() -> Self {
        let tmp = TempDir::new().expect("tempdir");
        let root = std::fs::canonicalize(tmp.path()).expect("canonicalize");
        let remote = root.join("remote.git");
        let seed = root.join("seed");
        let work = root.join("work");
        let evidence = root.join("evidence");

        git(&root, &["init", "-q", "--bare", "remote.git"]);
        git(&remote, &["symbolic-ref", "HEAD", "refs/heads/main"]);

        git(&root, &["init", "-q", "seed"]);
        git(&seed, &["symbolic-ref", "HEAD", "refs/heads/main"]);
        identify(&seed);
        std::fs::write(seed.join("README.md"), "hello\n").expect("write");
        git(&seed, &["add", "README.md"]);
        git(&seed, &["commit", "-q", "-m", "initial"]);
        git(&seed, &["remote", "add", "origin", remote.to_str().expect("utf8")]);
        git(&seed, &["push", "-q", "origin", "main"]);

        git(&root, &["clone", "-q", remote.to_str().expect("utf8"), "work"]);
        identify(&work);

        Self {
            tmp,
            remote,
            seed,
            work,
            evidence,
        }
    }

    pub fn settings(&self, mode: Mode) -> RunSettings {
        RunSettings {
            repo_root: self.work.clone(),
            evidence_root: self.evidence.clone(),
            invocation_dir: self.work.clone(),
            mode,
            policy: Policy::default(),
            upstream: "origin/main".parse().expect("upstream"),
            expected_remote_url: Some(r"remote\.git$".to_string()),
            git_program: None,
            restricted_dirs: Vec::new(),
            consistency_check: None,
        }
    }

    /// Publish `count` commits to the remote from the seed clone.
    pub fn upstream_commits(&self, count: usize) {
        git(&self.seed, &["pull", "-q", "--ff-only", "origin", "main"]);
        for i in 0..count {
            let name = format!("upstream-{i}.txt");
            std::fs::write(self.seed.join(&name), format!("{i}\n")).expect("write");
            git(&self.seed, &["add", &name]);
            git(&self.seed, &["commit", "-q", "-m", &format!("upstream {i}")]);
        }
        git(&self.seed, &["push", "-q", "origin", "main"]);
    }

    pub fn local_commits(&self, count: usize) {
        for i in 0..count {
            let name = format!("local-{i}.txt");
            std::fs::write(self.work.join(&name), format!("{i}\n")).expect("write");
            git(&self.work, &["add", &name]);
            git(&self.work, &["commit", "-q", "-m", &format!("local {i}")]);
        }
    }

    pub fn head(&self, dir: &Path) -> String {
        git(dir, &["rev-parse", "HEAD"]).trim().to_string()
    }

    pub fn remote_main(&self) -> String {
        git(&self.remote, &["rev-parse", "refs/heads/main"])
            .trim()
            .to_string()
    }

    pub fn status(&self) -> String {
        git(&self.work, &["status", "--porcelain=v1", "--untracked-files=all"])
    }

    /// Write an executable `git` stand-in that runs `prelude` (a shell
    /// fragment that may intercept a subcommand) before handing off to the
    /// real git on `PATH`.
    #[cfg(unix)]
    pub fn git_wrapper(&self, prelude: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = self.tmp.path().join("git-wrapper.sh");
        std::fs::write(&path, format!("#!/bin/sh\n{prelude}\nexec git \"$@\"\n"))
            .expect("write wrapper");
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
            .expect("chmod wrapper");
        path
    }

    pub fn markers(&self, outcome: &RunOutcome) -> Vec<String> {
        let path = outcome.summary.evidence_dir_abs.join(MARKERS_FILE);
        std::fs::read_to_string(path)
            .expect("markers.log")
            .lines()
            .map(str::to_string)
            .collect()
    }
}

/// Exactly one `summary` and one `run-end` marker, `run-end` last.
pub fn assert_single_terminal(markers: &[String]) {
    let count = |event: &str| {
        markers
            .iter()
            .filter(|l| l.contains(&format!("|event={event}|")))
            .count()
    };
    assert_eq!(count("summary"), 1, "markers: {markers:#?}");
    assert_eq!(count("run-end"), 1, "markers: {markers:#?}");
    assert!(markers
        .last()
        .is_some_and(|l| l.contains("|event=run-end|")));
}
