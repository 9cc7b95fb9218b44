//! End-to-end rebase flows: clean preview and apply, conflict resolution,
//! and failed-validation gating.

use rebase_stack::git::{GitRepository, RebaseOutcome};
use rebase_stack::stack::{
    ConflictResolver, PreApplyGate, ResolutionStrategy, StackManager, StackState, TestRunner,
};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;
use tempfile::TempDir;

fn git(repo_path: &Path, args: &[&str]) {
    let output = Command::new("git")
        .args(args)
        .current_dir(repo_path)
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
}

fn commit_file(repo_path: &Path, filename: &str, content: &str, message: &str) {
    std::fs::write(repo_path.join(filename), content).unwrap();
    git(repo_path, &["add", filename]);
    git(repo_path, &["commit", "-m", message]);
}

fn create_test_repo() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let repo_path = temp_dir.path().join("repo");
    std::fs::create_dir(&repo_path).unwrap();

    git(&repo_path, &["init", "-b", "main"]);
    git(&repo_path, &["config", "user.name", "Test"]);
    git(&repo_path, &["config", "user.email", "test@test.com"]);
    commit_file(&repo_path, "README.md", "# Test\n", "Initial commit");

    (temp_dir, repo_path)
}

/// feature is two commits ahead of the merge base, main advanced without
/// overlapping edits
fn setup_clean_divergence(repo_path: &Path) {
    git(repo_path, &["checkout", "-b", "feature"]);
    commit_file(repo_path, "feature1.txt", "one\n", "Feature commit 1");
    commit_file(repo_path, "feature2.txt", "two\n", "Feature commit 2");
    git(repo_path, &["checkout", "main"]);
    commit_file(repo_path, "main.txt", "main\n", "Main commit");
}

/// feature and main both rewrite the same line of shared.txt
fn setup_conflicting_divergence(repo_path: &Path) {
    commit_file(repo_path, "shared.txt", "base\n", "Add shared file");
    git(repo_path, &["checkout", "-b", "feature"]);
    commit_file(repo_path, "shared.txt", "feature change\n", "Feature edit");
    git(repo_path, &["checkout", "main"]);
    commit_file(repo_path, "shared.txt", "main change\n", "Main edit");
}

#[test]
fn scenario_a_clean_rebase_and_apply() {
    let (_tmp, repo_path) = create_test_repo();
    setup_clean_divergence(&repo_path);
    let manager = StackManager::new(&repo_path).unwrap();

    let sandbox_path = manager.create_stack("feature", "main").unwrap();

    let outcome = manager.attempt_rebase("feature").unwrap();
    assert_eq!(outcome, RebaseOutcome::Completed);

    let info = manager.get_stack_info(&sandbox_path).unwrap().unwrap();
    assert_eq!(info.state, StackState::Resolved);
    assert!(info.conflicts.is_empty());
    assert_eq!(info.commits_applied, 2);

    let sandbox_head = GitRepository::open(&sandbox_path)
        .unwrap()
        .head_commit_id()
        .unwrap();

    let new_head = manager.apply_stack("feature", false).unwrap();
    assert_eq!(new_head, sandbox_head);

    // The real branch now points at the sandbox result
    let repo = GitRepository::open(&repo_path).unwrap();
    assert_eq!(repo.branch_head("feature").unwrap(), new_head);

    // Applied is terminal: the sandbox is never observable again
    assert!(!manager.stack_exists("feature").unwrap());
    assert!(manager.list_stacks().unwrap().is_empty());
}

#[test]
fn apply_updates_working_tree_when_branch_is_checked_out() {
    let (_tmp, repo_path) = create_test_repo();
    setup_clean_divergence(&repo_path);
    git(&repo_path, &["checkout", "feature"]);
    let manager = StackManager::new(&repo_path).unwrap();

    manager.create_stack("feature", "main").unwrap();
    assert_eq!(manager.attempt_rebase("feature").unwrap(), RebaseOutcome::Completed);

    manager.apply_stack("feature", false).unwrap();

    // The rebased-in main.txt arrived in the primary working tree
    assert!(repo_path.join("main.txt").exists());
    assert!(repo_path.join("feature1.txt").exists());
    let repo = GitRepository::open(&repo_path).unwrap();
    assert!(repo.is_clean().unwrap());
}

#[test]
fn scenario_b_conflict_then_resolve_theirs() {
    let (_tmp, repo_path) = create_test_repo();
    setup_conflicting_divergence(&repo_path);
    let manager = StackManager::new(&repo_path).unwrap();

    let sandbox_path = manager.create_stack("feature", "main").unwrap();

    let outcome = manager.attempt_rebase("feature").unwrap();
    let files = match outcome {
        RebaseOutcome::Conflicted(files) => files,
        other => panic!("Expected conflict, got {other:?}"),
    };
    assert_eq!(files, vec!["shared.txt"]);

    let info = manager.get_stack_info(&sandbox_path).unwrap().unwrap();
    assert_eq!(info.state, StackState::Conflicted);
    assert_eq!(info.conflicts, vec!["shared.txt"]);

    // During a rebase "theirs" is the replayed feature commit
    let sandbox = GitRepository::open(&sandbox_path).unwrap();
    let resolver = ConflictResolver::new();
    let resolution = resolver
        .resolve_file_with_strategy(&sandbox_path, "shared.txt", ResolutionStrategy::Theirs)
        .unwrap()
        .unwrap();
    resolver
        .apply_resolution(&sandbox_path, &sandbox, &resolution)
        .unwrap();

    let outcome = manager.continue_stack_rebase("feature").unwrap();
    assert_eq!(outcome, RebaseOutcome::Completed);

    let info = manager.get_stack_info(&sandbox_path).unwrap().unwrap();
    assert_eq!(info.state, StackState::Resolved);
    assert!(info.conflicts.is_empty());

    let resolved = std::fs::read_to_string(sandbox_path.join("shared.txt")).unwrap();
    assert_eq!(resolved, "feature change\n");
}

#[test]
fn unresolved_markers_are_never_staged() {
    let (_tmp, repo_path) = create_test_repo();
    setup_conflicting_divergence(&repo_path);
    let manager = StackManager::new(&repo_path).unwrap();

    let sandbox_path = manager.create_stack("feature", "main").unwrap();
    manager.attempt_rebase("feature").unwrap();

    let sandbox = GitRepository::open(&sandbox_path).unwrap();
    let resolver = ConflictResolver::new();

    // A manual resolution that left markers in place must be rejected
    let bogus = rebase_stack::stack::Resolution {
        file_path: "shared.txt".to_string(),
        strategy: ResolutionStrategy::Manual,
        resolved_content: None,
    };
    assert!(resolver
        .apply_resolution(&sandbox_path, &sandbox, &bogus)
        .is_err());
    assert_eq!(sandbox.conflicted_files().unwrap(), vec!["shared.txt"]);
}

#[test]
fn abort_discards_sandbox_and_leaves_branch_alone() {
    let (_tmp, repo_path) = create_test_repo();
    setup_conflicting_divergence(&repo_path);
    let manager = StackManager::new(&repo_path).unwrap();

    let repo = GitRepository::open(&repo_path).unwrap();
    let tip_before = repo.branch_head("feature").unwrap();

    manager.create_stack("feature", "main").unwrap();
    manager.attempt_rebase("feature").unwrap();
    manager.cleanup_stack("feature").unwrap();

    assert!(!manager.stack_exists("feature").unwrap());
    assert_eq!(repo.branch_head("feature").unwrap(), tip_before);
}

#[test]
fn scenario_c_failed_tests_block_apply_until_forced() {
    let (_tmp, repo_path) = create_test_repo();
    setup_clean_divergence(&repo_path);
    let manager = StackManager::new(&repo_path).unwrap();

    let sandbox_path = manager.create_stack("feature", "main").unwrap();
    assert_eq!(manager.attempt_rebase("feature").unwrap(), RebaseOutcome::Completed);

    let runner = TestRunner::new(Duration::from_secs(30));
    let result = runner
        .run_tests(&sandbox_path, Some("false".to_string()))
        .unwrap();
    assert!(!result.success);

    manager
        .update_stack_state(&sandbox_path, StackState::Failed)
        .unwrap();

    let err = manager.apply_stack("feature", false).unwrap_err();
    assert!(err.to_string().contains("validation-passed"));
    assert!(manager.stack_exists("feature").unwrap());

    // With the override the gate lets the apply through
    manager.apply_stack("feature", true).unwrap();
    assert!(!manager.stack_exists("feature").unwrap());
}

#[test]
fn apply_without_a_rebase_attempt_is_rejected() {
    let (_tmp, repo_path) = create_test_repo();
    setup_clean_divergence(&repo_path);
    let manager = StackManager::new(&repo_path).unwrap();

    manager.create_stack("feature", "main").unwrap();

    // Gate checks pass on a pristine sandbox, but Created cannot reach
    // Applied directly
    assert!(manager.apply_stack("feature", false).is_err());
    assert!(manager.stack_exists("feature").unwrap());
}

#[test]
fn gate_reports_every_failing_check_at_once() {
    let (_tmp, repo_path) = create_test_repo();
    setup_conflicting_divergence(&repo_path);
    let manager = StackManager::new(&repo_path).unwrap();

    let sandbox_path = manager.create_stack("feature", "main").unwrap();
    manager.attempt_rebase("feature").unwrap();

    // Mid-conflict: rebase in progress, conflicted files, dirty tree
    let sandbox = GitRepository::open(&sandbox_path).unwrap();
    let report =
        PreApplyGate::validate_before_apply(&sandbox, StackState::Conflicted, None, false).unwrap();

    assert!(!report.passed());
    let names: Vec<_> = report.failures().iter().map(|c| c.name).collect();
    assert!(names.contains(&"rebase-finished"));
    assert!(names.contains(&"no-conflicts"));
    assert!(names.contains(&"sandbox-clean"));
    assert_eq!(report.checks.len(), 5);
}

#[test]
fn validation_runner_detects_project_type_in_sandbox() {
    let (_tmp, repo_path) = create_test_repo();
    commit_file(
        &repo_path,
        "pytest.ini",
        "[pytest]\n",
        "Add pytest config",
    );
    git(&repo_path, &["branch", "feature"]);
    let manager = StackManager::new(&repo_path).unwrap();

    let sandbox_path = manager.create_stack("feature", "main").unwrap();
    assert_eq!(
        rebase_stack::stack::detect_test_command(&sandbox_path),
        Some("pytest".to_string())
    );
}
