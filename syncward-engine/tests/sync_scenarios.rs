mod common;

use common::{assert_single_terminal, git, git_available, Fixture};
use syncward_core::{
    ConsistencyCheck, DecisionTrace, Mode, Phase, PhaseStatus, ReasonCode, RunStatus,
    SummaryRecord,
};
use syncward_engine::{AssumeLiveness, Engine, RunOutcome};
use syncward_evidence::layout::{STATUS_DIFF_FILE, SUMMARY_FILE, TRACE_FILE};
use syncward_evidence::EvidenceLayout;

fn run(fx: &Fixture, settings: syncward_core::RunSettings) -> RunOutcome {
    let liveness = AssumeLiveness(true);
    let outcome = Engine::new(&liveness).run(settings);
    assert!(outcome.finalize.is_complete(), "{:?}", outcome.finalize);
    assert_single_terminal(&fx.markers(&outcome));
    outcome
}

fn phase_status(outcome: &RunOutcome, phase: Phase) -> (PhaseStatus, Option<ReasonCode>) {
    let record = outcome.phase(phase).expect("phase recorded");
    (record.status, record.reason)
}

fn assert_not_attempted(outcome: &RunOutcome, phases: &[Phase]) {
    for phase in phases {
        assert_eq!(
            phase_status(outcome, *phase),
            (PhaseStatus::Skip, Some(ReasonCode::PriorFailure)),
            "{phase}"
        );
    }
}

fn lock_is_absent(fx: &Fixture) -> bool {
    let layout = EvidenceLayout::new(&fx.evidence);
    !layout.lock_path(&fx.work).exists()
}

#[test]
fn feature_branch_is_switched_and_fast_forwarded() {
    if !git_available() {
        return;
    }
    let fx = Fixture::new();
    fx.upstream_commits(1);
    git(&fx.work, &["checkout", "-q", "-b", "feature/x"]);

    let mut settings = fx.settings(Mode::Apply);
    settings.policy.auto_switch = true;
    let outcome = run(&fx, settings);

    assert_eq!(outcome.summary.status, RunStatus::Pass);
    assert_eq!(outcome.summary.reason, ReasonCode::Ok);
    assert_eq!(outcome.exit_code(), 0);
    assert_eq!(phase_status(&outcome, Phase::Precheck).0, PhaseStatus::Ok);
    assert_eq!(phase_status(&outcome, Phase::Lock).0, PhaseStatus::Ok);
    assert_eq!(phase_status(&outcome, Phase::Stash).0, PhaseStatus::Skip);
    assert_eq!(phase_status(&outcome, Phase::Switch).0, PhaseStatus::Ok);
    assert_eq!(phase_status(&outcome, Phase::Fetch).0, PhaseStatus::Ok);
    assert_eq!(
        phase_status(&outcome, Phase::Pull),
        (PhaseStatus::Ok, Some(ReasonCode::FastForward))
    );
    assert_eq!(phase_status(&outcome, Phase::Postcheck).0, PhaseStatus::Ok);

    assert_eq!(git(&fx.work, &["symbolic-ref", "--short", "HEAD"]).trim(), "main");
    assert_eq!(fx.head(&fx.work), fx.remote_main());
    assert!(lock_is_absent(&fx));
}

#[test]
fn diverged_branch_fails_before_any_mutation() {
    if !git_available() {
        return;
    }
    let fx = Fixture::new();
    fx.local_commits(3);
    fx.upstream_commits(2);
    git(&fx.work, &["fetch", "-q", "origin"]);
    let head_before = fx.head(&fx.work);

    let outcome = run(&fx, fx.settings(Mode::Apply));

    assert_eq!(outcome.summary.status, RunStatus::Fail);
    assert_eq!(outcome.summary.reason, ReasonCode::DivergedBranch);
    assert_eq!(outcome.exit_code(), 1);
    assert_not_attempted(
        &outcome,
        &[Phase::Lock, Phase::Stash, Phase::Switch, Phase::Fetch, Phase::Pull, Phase::Postcheck],
    );
    assert_eq!(fx.head(&fx.work), head_before);
    assert!(lock_is_absent(&fx));

    let trace: DecisionTrace = serde_json::from_str(
        &std::fs::read_to_string(outcome.summary.evidence_dir_abs.join(TRACE_FILE)).expect("trace"),
    )
    .expect("parse trace");
    let entry = &trace.entries[0];
    assert_eq!(entry.checkpoint, "precheck");
    assert_eq!((entry.ahead, entry.behind), (Some(3), Some(2)));
    assert_eq!(entry.diverged, Some(true));
    assert_eq!(entry.verdict, Some(ReasonCode::DivergedBranch));
}

#[test]
fn dirty_dry_run_skips_fetch_and_pull() {
    if !git_available() {
        return;
    }
    let fx = Fixture::new();
    std::fs::write(fx.work.join("README.md"), "edited\n").expect("write");

    let outcome = run(&fx, fx.settings(Mode::DryRun));

    assert_eq!(outcome.summary.reason, ReasonCode::DirtyWorktreeDryRun);
    assert_not_attempted(&outcome, &[Phase::Fetch, Phase::Pull]);
    assert_eq!(fx.status(), " M README.md\n");
}

#[test]
fn stash_snapshot_survives_a_successful_pull() {
    if !git_available() {
        return;
    }
    let fx = Fixture::new();
    fx.upstream_commits(1);
    std::fs::write(fx.work.join("README.md"), "local edit\n").expect("write");

    let mut settings = fx.settings(Mode::Apply);
    settings.policy.allow_stash = true;
    let outcome = run(&fx, settings);

    assert_eq!(outcome.summary.status, RunStatus::Pass);
    assert_eq!(phase_status(&outcome, Phase::Stash).0, PhaseStatus::Ok);
    assert_eq!(
        phase_status(&outcome, Phase::Pull),
        (PhaseStatus::Ok, Some(ReasonCode::FastForward))
    );
    let stash = outcome.summary.stash.as_ref().expect("stash recorded");
    assert!(!stash.reference.is_empty());
    assert!(stash.message.contains(outcome.summary.run_id.as_str()));
    assert_eq!(
        git(&fx.work, &["rev-parse", "refs/stash"]).trim(),
        stash.reference,
        "snapshot must remain un-popped"
    );
    assert_eq!(fx.status(), "");
}

#[test]
fn repeated_dry_runs_pass_without_mutation() {
    if !git_available() {
        return;
    }
    let fx = Fixture::new();
    let head = fx.head(&fx.work);

    let first = run(&fx, fx.settings(Mode::DryRun));
    let second = run(&fx, fx.settings(Mode::DryRun));

    for outcome in [&first, &second] {
        assert_eq!(outcome.summary.status, RunStatus::Pass);
        assert_eq!(
            phase_status(outcome, Phase::Fetch),
            (PhaseStatus::Ok, Some(ReasonCode::DryRunFetch))
        );
        assert_eq!(phase_status(outcome, Phase::Pull).0, PhaseStatus::Skip);
    }
    assert_ne!(first.summary.run_id, second.summary.run_id);
    assert_eq!(fx.head(&fx.work), head);
    assert_eq!(fx.status(), "");

    let layout = EvidenceLayout::new(&fx.evidence);
    let latest = layout.latest_run_dir().expect("latest").expect("pointer");
    assert_eq!(
        std::fs::canonicalize(latest).expect("latest dir"),
        std::fs::canonicalize(&second.summary.evidence_dir_abs).expect("second dir")
    );
    let on_disk: SummaryRecord = serde_json::from_str(
        &std::fs::read_to_string(second.summary.evidence_dir_abs.join(SUMMARY_FILE))
            .expect("summary"),
    )
    .expect("parse summary");
    assert_eq!(on_disk, second.summary);
    assert!(!second.summary.evidence_dir_abs.join(STATUS_DIFF_FILE).exists());
}

#[test]
fn branch_mismatch_without_auto_switch_fails() {
    if !git_available() {
        return;
    }
    let fx = Fixture::new();
    git(&fx.work, &["checkout", "-q", "-b", "feature/x"]);

    let outcome = run(&fx, fx.settings(Mode::Apply));

    assert_eq!(outcome.summary.reason, ReasonCode::BranchMismatch);
    assert_eq!(
        git(&fx.work, &["symbolic-ref", "--short", "HEAD"]).trim(),
        "feature/x"
    );
}

#[test]
fn detached_head_fails_unless_allowed() {
    if !git_available() {
        return;
    }
    let fx = Fixture::new();
    git(&fx.work, &["checkout", "-q", "--detach"]);

    let outcome = run(&fx, fx.settings(Mode::DryRun));
    assert_eq!(outcome.summary.reason, ReasonCode::DetachedHead);

    let mut settings = fx.settings(Mode::DryRun);
    settings.policy.allow_detached = true;
    let outcome = run(&fx, settings);
    assert_eq!(outcome.summary.status, RunStatus::Pass);
}

#[test]
fn untracked_files_need_explicit_inclusion() {
    if !git_available() {
        return;
    }
    let fx = Fixture::new();
    fx.upstream_commits(1);
    std::fs::write(fx.work.join("scratch.txt"), "notes\n").expect("write");

    let outcome = run(&fx, fx.settings(Mode::Apply));
    assert_eq!(outcome.summary.reason, ReasonCode::UntrackedFiles);

    let mut settings = fx.settings(Mode::Apply);
    settings.policy.include_untracked = true;
    let outcome = run(&fx, settings);
    assert_eq!(outcome.summary.status, RunStatus::Pass);
    assert_eq!(fx.head(&fx.work), fx.remote_main());
    assert!(fx.work.join("scratch.txt").exists());
}

#[test]
fn tracked_changes_without_stash_permission_fail() {
    if !git_available() {
        return;
    }
    let fx = Fixture::new();
    std::fs::write(fx.work.join("README.md"), "edited\n").expect("write");

    let outcome = run(&fx, fx.settings(Mode::Apply));
    assert_eq!(outcome.summary.reason, ReasonCode::DirtyWorktreeStashDisallowed);

    let mut settings = fx.settings(Mode::Apply);
    settings.policy.allow_stash = true;
    settings.policy.require_clean = true;
    let outcome = run(&fx, settings);
    assert_eq!(outcome.summary.reason, ReasonCode::DirtyWorktreeRequireClean);
    assert_eq!(fx.status(), " M README.md\n");
}

#[test]
fn invocation_outside_top_level_is_rejected() {
    if !git_available() {
        return;
    }
    let fx = Fixture::new();
    let sub = fx.work.join("sub");
    std::fs::create_dir(&sub).expect("mkdir");

    let mut settings = fx.settings(Mode::DryRun);
    settings.invocation_dir = sub.clone();
    assert_eq!(run(&fx, settings).summary.reason, ReasonCode::CwdNotRepoRoot);

    let mut settings = fx.settings(Mode::DryRun);
    settings.repo_root = sub;
    assert_eq!(run(&fx, settings).summary.reason, ReasonCode::RepoRootMismatch);

    let mut settings = fx.settings(Mode::DryRun);
    settings.repo_root = fx.tmp.path().to_path_buf();
    settings.invocation_dir = fx.tmp.path().to_path_buf();
    assert_eq!(run(&fx, settings).summary.reason, ReasonCode::NotARepository);
}

#[test]
fn restricted_directory_is_refused() {
    if !git_available() {
        return;
    }
    let fx = Fixture::new();
    let mut settings = fx.settings(Mode::DryRun);
    settings.restricted_dirs = vec![fx.tmp.path().to_path_buf()];
    let outcome = run(&fx, settings);
    assert_eq!(outcome.summary.reason, ReasonCode::RestrictedDirectory);
    assert_not_attempted(&outcome, &[Phase::Lock, Phase::Fetch]);
}

#[test]
fn missing_git_is_an_environment_failure() {
    let fx_root = tempfile::TempDir::new().expect("tempdir");
    let settings = syncward_core::RunSettings {
        repo_root: fx_root.path().to_path_buf(),
        evidence_root: fx_root.path().join("evidence"),
        invocation_dir: fx_root.path().to_path_buf(),
        mode: Mode::DryRun,
        policy: Default::default(),
        upstream: "origin/main".parse().expect("upstream"),
        expected_remote_url: None,
        git_program: Some(fx_root.path().join("bin/git")),
        restricted_dirs: Vec::new(),
        consistency_check: None,
    };
    let liveness = AssumeLiveness(true);
    let outcome = Engine::new(&liveness).run(settings);
    assert_eq!(outcome.summary.reason, ReasonCode::GitMissing);
    assert_eq!(outcome.summary.next_action, ReasonCode::GitMissing.operator_hint());
    assert!(outcome.finalize.is_complete());
}

#[test]
fn remote_url_mismatch_and_missing_pattern() {
    if !git_available() {
        return;
    }
    let fx = Fixture::new();
    let mut settings = fx.settings(Mode::DryRun);
    settings.expected_remote_url = Some(r"^https://github\.com/".to_string());
    assert_eq!(run(&fx, settings).summary.reason, ReasonCode::RemoteUrlMismatch);

    let mut settings = fx.settings(Mode::DryRun);
    settings.expected_remote_url = None;
    let outcome = run(&fx, settings);
    assert_eq!(outcome.summary.status, RunStatus::Pass);
    assert!(outcome
        .summary
        .warnings
        .iter()
        .any(|w| w.contains("no expected remote URL")));
}

#[test]
fn merge_in_progress_blocks_the_run() {
    if !git_available() {
        return;
    }
    let fx = Fixture::new();
    let head = fx.head(&fx.work);
    std::fs::write(fx.work.join(".git/MERGE_HEAD"), format!("{head}\n")).expect("write");

    let outcome = run(&fx, fx.settings(Mode::DryRun));
    assert_eq!(outcome.summary.reason, ReasonCode::BlockingOperation);
    assert_eq!(outcome.summary.detail.as_deref(), Some("merge in progress"));
}

#[test]
fn fetch_failure_points_at_stderr_and_releases_lock() {
    if !git_available() {
        return;
    }
    let fx = Fixture::new();
    let gone = fx.tmp.path().join("gone.git");
    git(&fx.work, &["remote", "set-url", "origin", gone.to_str().expect("utf8")]);

    let mut settings = fx.settings(Mode::Apply);
    settings.expected_remote_url = Some(r"gone\.git$".to_string());
    let outcome = run(&fx, settings);

    assert_eq!(outcome.summary.reason, ReasonCode::FetchFailed);
    assert!(outcome.summary.next_action.ends_with("stderr.log"));
    assert_not_attempted(&outcome, &[Phase::Pull, Phase::Postcheck]);
    assert!(lock_is_absent(&fx));
    let markers = fx.markers(&outcome);
    assert!(markers
        .iter()
        .any(|l| l.contains("|event=lock-release|") && l.contains("status=released")));
}

#[test]
fn stash_is_restored_on_failure_when_opted_in() {
    if !git_available() {
        return;
    }
    let fx = Fixture::new();
    std::fs::write(fx.work.join("README.md"), "precious\n").expect("write");
    let gone = fx.tmp.path().join("gone.git");
    git(&fx.work, &["remote", "set-url", "origin", gone.to_str().expect("utf8")]);

    let mut settings = fx.settings(Mode::Apply);
    settings.expected_remote_url = None;
    settings.policy.allow_stash = true;
    settings.policy.restore_stash_on_failure = true;
    let outcome = run(&fx, settings);

    assert_eq!(outcome.summary.reason, ReasonCode::FetchFailed);
    assert!(outcome.summary.warnings.iter().any(|w| w.contains("restored after failure")));
    assert_eq!(
        std::fs::read_to_string(fx.work.join("README.md")).expect("read"),
        "precious\n"
    );
    assert_eq!(git(&fx.work, &["stash", "list"]), "");
}

#[test]
fn stash_is_kept_on_failure_by_default() {
    if !git_available() {
        return;
    }
    let fx = Fixture::new();
    std::fs::write(fx.work.join("README.md"), "precious\n").expect("write");
    let gone = fx.tmp.path().join("gone.git");
    git(&fx.work, &["remote", "set-url", "origin", gone.to_str().expect("utf8")]);

    let mut settings = fx.settings(Mode::Apply);
    settings.expected_remote_url = None;
    settings.policy.allow_stash = true;
    let outcome = run(&fx, settings);

    assert_eq!(outcome.summary.reason, ReasonCode::FetchFailed);
    let stash = outcome.summary.stash.expect("stash recorded");
    assert_eq!(git(&fx.work, &["rev-parse", "refs/stash"]).trim(), stash.reference);
    assert_eq!(fx.status(), "");
}

#[cfg(unix)]
#[test]
fn failed_consistency_check_degrades_but_exits_zero() {
    if !git_available() {
        return;
    }
    let fx = Fixture::new();
    let mut settings = fx.settings(Mode::DryRun);
    settings.consistency_check = Some(ConsistencyCheck {
        command: vec![
            "sh".into(),
            "-c".into(),
            "echo 'CONSISTENCY|event=verify|status=FAIL'".into(),
        ],
        token_prefix: "CONSISTENCY".into(),
    });
    let outcome = run(&fx, settings);

    assert_eq!(outcome.summary.status, RunStatus::Degraded);
    assert_eq!(outcome.summary.reason, ReasonCode::ConsistencyCheckFailed);
    assert_eq!(outcome.exit_code(), 0);
    assert!(outcome.summary.warnings.iter().any(|w| w.contains("consistency")));
    assert!(fx
        .markers(&outcome)
        .iter()
        .any(|l| l.contains("|event=check-result|") && l.contains("status=FAIL")));
}

#[cfg(unix)]
#[test]
fn passing_consistency_check_keeps_pass() {
    if !git_available() {
        return;
    }
    let fx = Fixture::new();
    let mut settings = fx.settings(Mode::DryRun);
    settings.consistency_check = Some(ConsistencyCheck {
        command: vec![
            "sh".into(),
            "-c".into(),
            "test -d .git && echo 'CONSISTENCY|event=verify|status=PASS'".into(),
        ],
        token_prefix: "CONSISTENCY".into(),
    });
    let outcome = run(&fx, settings);
    assert_eq!(outcome.summary.status, RunStatus::Pass);
}

#[test]
fn evidence_inside_the_worktree_stays_invisible() {
    if !git_available() {
        return;
    }
    let fx = Fixture::new();
    let mut settings = fx.settings(Mode::DryRun);
    settings.evidence_root = fx.work.join(".syncward/evidence");

    let first = run_at(&settings);
    let second = run_at(&settings);

    assert_eq!(first.summary.status, RunStatus::Pass);
    assert_eq!(second.summary.status, RunStatus::Pass);
    assert_eq!(fx.status(), "");
}

fn run_at(settings: &syncward_core::RunSettings) -> RunOutcome {
    let liveness = AssumeLiveness(true);
    Engine::new(&liveness).run(settings.clone())
}

#[test]
fn divergence_revealed_by_fetch_is_not_merged() {
    if !git_available() {
        return;
    }
    let fx = Fixture::new();
    fx.local_commits(1);
    // Published after the work clone last fetched: precheck only sees ahead 1.
    fx.upstream_commits(2);
    let head_before = fx.head(&fx.work);

    let outcome = run(&fx, fx.settings(Mode::Apply));

    assert_eq!(outcome.summary.status, RunStatus::Fail);
    assert_eq!(outcome.summary.reason, ReasonCode::FfOnlyFailed);
    assert_eq!(
        outcome.summary.detail.as_deref(),
        Some("diverged after fetch: ahead 1, behind 2")
    );
    assert_eq!(phase_status(&outcome, Phase::Fetch).0, PhaseStatus::Ok);
    assert_eq!(
        phase_status(&outcome, Phase::Pull),
        (PhaseStatus::Fail, Some(ReasonCode::FfOnlyFailed))
    );
    assert_not_attempted(&outcome, &[Phase::Postcheck]);
    assert_eq!(fx.head(&fx.work), head_before);
    assert!(lock_is_absent(&fx));

    let trace: DecisionTrace = serde_json::from_str(
        &std::fs::read_to_string(outcome.summary.evidence_dir_abs.join(TRACE_FILE)).expect("trace"),
    )
    .expect("parse trace");
    let precheck = &trace.entries[0];
    assert_eq!((precheck.ahead, precheck.behind), (Some(1), Some(0)));
    let post_fetch = trace
        .entries
        .iter()
        .find(|e| e.checkpoint == "post-fetch")
        .expect("post-fetch entry");
    assert_eq!((post_fetch.ahead, post_fetch.behind), (Some(1), Some(2)));
    assert_eq!(post_fetch.diverged, Some(true));
}

#[test]
fn unmerged_paths_block_the_run() {
    if !git_available() {
        return;
    }
    let fx = Fixture::new();
    git(&fx.work, &["checkout", "-q", "-b", "side"]);
    std::fs::write(fx.work.join("README.md"), "side\n").expect("write");
    git(&fx.work, &["commit", "-q", "-am", "side"]);
    git(&fx.work, &["checkout", "-q", "main"]);
    std::fs::write(fx.work.join("README.md"), "main\n").expect("write");
    git(&fx.work, &["commit", "-q", "-am", "main"]);
    let merge = std::process::Command::new("git")
        .args(["merge", "-q", "side"])
        .current_dir(&fx.work)
        .output()
        .expect("spawn git");
    assert!(!merge.status.success(), "merge should conflict");
    // Leave the conflicted index without the in-progress merge state.
    for name in ["MERGE_HEAD", "MERGE_MSG", "MERGE_MODE"] {
        let _ = std::fs::remove_file(fx.work.join(".git").join(name));
    }

    let outcome = run(&fx, fx.settings(Mode::DryRun));

    assert_eq!(outcome.summary.reason, ReasonCode::UnmergedPaths);
    assert!(outcome
        .summary
        .detail
        .as_deref()
        .is_some_and(|d| d.contains("README.md")));
    assert_not_attempted(&outcome, &[Phase::Lock, Phase::Fetch, Phase::Pull]);
}

#[test]
fn missing_tracking_ref_is_reported() {
    if !git_available() {
        return;
    }
    let fx = Fixture::new();
    git(&fx.work, &["checkout", "-q", "-b", "release"]);

    let mut settings = fx.settings(Mode::DryRun);
    settings.upstream = "origin/release".parse().expect("upstream");
    let outcome = run(&fx, settings);

    assert_eq!(outcome.summary.reason, ReasonCode::UpstreamMissing);
    assert_eq!(
        outcome.summary.detail.as_deref(),
        Some("origin/release has no tracking ref refs/remotes/origin/release")
    );
    assert_not_attempted(&outcome, &[Phase::Lock, Phase::Fetch]);
}

#[cfg(unix)]
#[test]
fn dry_run_that_touches_the_worktree_fails_with_a_diff() {
    if !git_available() {
        return;
    }
    let fx = Fixture::new();
    let mut settings = fx.settings(Mode::DryRun);
    settings.git_program = Some(fx.git_wrapper(
        r#"if [ "$1" = fetch ]; then echo stray > stray.txt; fi"#,
    ));

    let outcome = run(&fx, settings);

    assert_eq!(outcome.summary.status, RunStatus::Fail);
    assert_eq!(outcome.summary.reason, ReasonCode::DryRunMutated);
    assert_eq!(
        phase_status(&outcome, Phase::Postcheck),
        (PhaseStatus::Fail, Some(ReasonCode::DryRunMutated))
    );
    assert!(outcome.summary.next_action.ends_with(STATUS_DIFF_FILE));
    let diff = std::fs::read_to_string(outcome.summary.evidence_dir_abs.join(STATUS_DIFF_FILE))
        .expect("status.diff");
    assert!(diff.contains("stray.txt"), "{diff}");
}

#[cfg(unix)]
#[test]
fn worktree_dirtied_by_pull_fails_postcheck() {
    if !git_available() {
        return;
    }
    let fx = Fixture::new();
    fx.upstream_commits(1);
    let mut settings = fx.settings(Mode::Apply);
    settings.git_program = Some(fx.git_wrapper(
        r#"if [ "$1" = pull ]; then git "$@" || exit $?; echo scribble >> README.md; exit 0; fi"#,
    ));

    let outcome = run(&fx, settings);

    assert_eq!(outcome.summary.reason, ReasonCode::DirtyAfterPull);
    assert_eq!(
        outcome.summary.detail.as_deref(),
        Some("1 tracked, 0 untracked path(s) after pull")
    );
    assert_eq!(
        phase_status(&outcome, Phase::Pull),
        (PhaseStatus::Ok, Some(ReasonCode::FastForward))
    );
    assert_eq!(fx.head(&fx.work), fx.remote_main());
    assert!(lock_is_absent(&fx));
}

#[cfg(unix)]
#[test]
fn pull_that_leaves_the_branch_behind_fails_postcheck() {
    if !git_available() {
        return;
    }
    let fx = Fixture::new();
    fx.upstream_commits(1);
    let head_before = fx.head(&fx.work);
    let mut settings = fx.settings(Mode::Apply);
    settings.git_program = Some(fx.git_wrapper(r#"if [ "$1" = pull ]; then exit 0; fi"#));

    let outcome = run(&fx, settings);

    assert_eq!(outcome.summary.reason, ReasonCode::StillBehindAfterPull);
    assert_eq!(
        outcome.summary.detail.as_deref(),
        Some("still 1 commit(s) behind origin/main")
    );
    assert_eq!(
        phase_status(&outcome, Phase::Pull),
        (PhaseStatus::Ok, Some(ReasonCode::UpToDate))
    );
    assert_eq!(fx.head(&fx.work), head_before);
}

#[cfg(unix)]
#[test]
fn refused_stash_stops_before_sync() {
    if !git_available() {
        return;
    }
    let fx = Fixture::new();
    fx.upstream_commits(1);
    std::fs::write(fx.work.join("README.md"), "local edit\n").expect("write");
    let head_before = fx.head(&fx.work);
    let mut settings = fx.settings(Mode::Apply);
    settings.policy.allow_stash = true;
    settings.git_program = Some(fx.git_wrapper(
        r#"if [ "$1" = stash ]; then echo "error: stash refused" >&2; exit 1; fi"#,
    ));

    let outcome = run(&fx, settings);

    assert_eq!(outcome.summary.reason, ReasonCode::StashFailed);
    assert_eq!(outcome.summary.detail.as_deref(), Some("error: stash refused"));
    assert_not_attempted(&outcome, &[Phase::Switch, Phase::Fetch, Phase::Pull, Phase::Postcheck]);
    assert!(outcome.summary.stash.is_none());
    assert_eq!(fx.status(), " M README.md\n");
    assert_eq!(fx.head(&fx.work), head_before);
    assert!(lock_is_absent(&fx));
}

#[test]
fn stash_from_another_branch_is_not_restored_after_a_switch() {
    if !git_available() {
        return;
    }
    let fx = Fixture::new();
    git(&fx.work, &["checkout", "-q", "-b", "feature/x"]);
    std::fs::write(fx.work.join("README.md"), "feature work\n").expect("write");
    let gone = fx.tmp.path().join("gone.git");
    git(&fx.work, &["remote", "set-url", "origin", gone.to_str().expect("utf8")]);

    let mut settings = fx.settings(Mode::Apply);
    settings.expected_remote_url = None;
    settings.policy.allow_stash = true;
    settings.policy.auto_switch = true;
    settings.policy.restore_stash_on_failure = true;
    let outcome = run(&fx, settings);

    assert_eq!(outcome.summary.reason, ReasonCode::FetchFailed);
    assert_eq!(phase_status(&outcome, Phase::Switch).0, PhaseStatus::Ok);
    let stash = outcome.summary.stash.as_ref().expect("stash recorded");
    assert_eq!(stash.branch.as_deref(), Some("feature/x"));
    assert!(outcome
        .summary
        .warnings
        .iter()
        .any(|w| w.contains("not restored") && w.contains("feature/x") && w.contains("main")));
    assert_eq!(git(&fx.work, &["symbolic-ref", "--short", "HEAD"]).trim(), "main");
    assert_eq!(git(&fx.work, &["rev-parse", "refs/stash"]).trim(), stash.reference);
    assert_eq!(fx.status(), "");
}
