//! Sandbox lifecycle properties: creation, existence, overwrite, teardown,
//! and listing behavior.

use rebase_stack::config::Settings;
use rebase_stack::stack::{StackManager, StackMetadata, StackState};
use std::path::{Path, PathBuf};
use std::process::Command;
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

fn create_test_repo() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let repo_path = temp_dir.path().join("repo");
    std::fs::create_dir(&repo_path).unwrap();

    git(&repo_path, &["init", "-b", "main"]);
    git(&repo_path, &["config", "user.name", "Test"]);
    git(&repo_path, &["config", "user.email", "test@test.com"]);
    std::fs::write(repo_path.join("README.md"), "# Test\n").unwrap();
    git(&repo_path, &["add", "."]);
    git(&repo_path, &["commit", "-m", "Initial commit"]);

    (temp_dir, repo_path)
}

#[test]
fn stack_exists_tracks_create_and_cleanup() {
    let (_tmp, repo_path) = create_test_repo();
    git(&repo_path, &["branch", "feature"]);
    let manager = StackManager::new(&repo_path).unwrap();

    assert!(!manager.stack_exists("feature").unwrap());

    manager.create_stack("feature", "main").unwrap();
    assert!(manager.stack_exists("feature").unwrap());

    manager.cleanup_stack("feature").unwrap();
    assert!(!manager.stack_exists("feature").unwrap());
}

#[test]
fn cleanup_without_sandbox_is_a_noop() {
    // Scenario D: cleanup on a branch with no sandbox returns without error
    let (_tmp, repo_path) = create_test_repo();
    let manager = StackManager::new(&repo_path).unwrap();

    manager.cleanup_stack("feature").unwrap();
    manager.cleanup_stack("never/existed").unwrap();
}

#[test]
fn create_twice_leaves_a_single_sandbox_with_second_calls_metadata() {
    let (_tmp, repo_path) = create_test_repo();
    git(&repo_path, &["branch", "feature"]);
    git(&repo_path, &["branch", "release"]);
    let manager = StackManager::new(&repo_path).unwrap();

    let first = manager.create_stack("feature", "main").unwrap();
    let first_meta = StackMetadata::load(&first).unwrap().unwrap();

    let second = manager.create_stack("feature", "release").unwrap();
    assert_eq!(first, second);

    let stacks = manager.list_stacks().unwrap();
    assert_eq!(stacks.len(), 1);
    assert_eq!(stacks[0].target_branch, "release");

    let second_meta = StackMetadata::load(&second).unwrap().unwrap();
    assert!(second_meta.created_at >= first_meta.created_at);
}

#[test]
fn sandbox_paths_are_deterministic_and_distinct_across_branches() {
    let (_tmp, repo_path) = create_test_repo();
    let manager = StackManager::new(&repo_path).unwrap();

    assert_eq!(
        manager.sandbox_path("feature/auth").unwrap(),
        manager.sandbox_path("feature/auth").unwrap()
    );
    assert_ne!(
        manager.sandbox_path("feature/auth").unwrap(),
        manager.sandbox_path("feature/api").unwrap()
    );
    // Sanitization collapses slashes, so only textually-equal sanitized
    // forms may collide
    assert_eq!(
        manager.sandbox_path("feature/auth").unwrap(),
        manager.sandbox_path("feature-auth").unwrap()
    );
}

#[test]
fn sandbox_lands_next_to_the_repository() {
    let (tmp, repo_path) = create_test_repo();
    git(&repo_path, &["branch", "feature"]);
    let manager = StackManager::new(&repo_path).unwrap();

    let path = manager.create_stack("feature", "main").unwrap();
    assert_eq!(
        path.parent().unwrap().canonicalize().unwrap(),
        tmp.path().canonicalize().unwrap()
    );
    assert_eq!(
        path.file_name().unwrap().to_str().unwrap(),
        ".rebase-stack-feature"
    );

    manager.cleanup_stack("feature").unwrap();
}

#[test]
fn configured_prefix_changes_sandbox_location() {
    let (_tmp, repo_path) = create_test_repo();
    git(&repo_path, &["branch", "feature"]);

    let settings = Settings {
        sandbox_prefix: "staging".to_string(),
        ..Settings::default()
    };
    let manager = StackManager::with_settings(&repo_path, settings).unwrap();

    let path = manager.create_stack("feature", "main").unwrap();
    assert_eq!(
        path.file_name().unwrap().to_str().unwrap(),
        ".staging-feature"
    );
    assert!(manager.stack_exists("feature").unwrap());
    manager.cleanup_stack("feature").unwrap();
}

#[test]
fn multiple_branches_get_independent_sandboxes() {
    let (_tmp, repo_path) = create_test_repo();
    git(&repo_path, &["branch", "feature-a"]);
    git(&repo_path, &["branch", "feature-b"]);
    let manager = StackManager::new(&repo_path).unwrap();

    manager.create_stack("feature-a", "main").unwrap();
    manager.create_stack("feature-b", "main").unwrap();

    let mut names: Vec<String> = manager
        .list_stacks()
        .unwrap()
        .into_iter()
        .map(|s| s.branch_name)
        .collect();
    names.sort();
    assert_eq!(names, vec!["feature-a", "feature-b"]);

    // Tearing one down leaves the other alone
    manager.cleanup_stack("feature-a").unwrap();
    let remaining = manager.list_stacks().unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].branch_name, "feature-b");
}

#[test]
fn listing_skips_sandboxes_without_metadata() {
    let (_tmp, repo_path) = create_test_repo();
    git(&repo_path, &["branch", "feature"]);
    let manager = StackManager::new(&repo_path).unwrap();

    let path = manager.create_stack("feature", "main").unwrap();
    StackMetadata::remove(&path).unwrap();

    assert!(manager.list_stacks().unwrap().is_empty());
}

#[test]
fn fresh_sandbox_reports_created_state_and_pending_commits() {
    let (_tmp, repo_path) = create_test_repo();
    git(&repo_path, &["checkout", "-b", "feature"]);
    std::fs::write(repo_path.join("one.txt"), "1\n").unwrap();
    git(&repo_path, &["add", "."]);
    git(&repo_path, &["commit", "-m", "one"]);
    std::fs::write(repo_path.join("two.txt"), "2\n").unwrap();
    git(&repo_path, &["add", "."]);
    git(&repo_path, &["commit", "-m", "two"]);
    git(&repo_path, &["checkout", "main"]);

    let manager = StackManager::new(&repo_path).unwrap();
    let path = manager.create_stack("feature", "main").unwrap();

    let info = manager.get_stack_info(&path).unwrap().unwrap();
    assert_eq!(info.state, StackState::Created);
    assert_eq!(info.commits_pending, 2);
    assert_eq!(info.commits_applied, 0);
    assert!(info.conflicts.is_empty());
}

#[test]
fn get_stack_info_for_missing_sandbox_is_none() {
    let (_tmp, repo_path) = create_test_repo();
    let manager = StackManager::new(&repo_path).unwrap();

    let path = manager.sandbox_path("feature").unwrap();
    assert!(manager.get_stack_info(&path).unwrap().is_none());
}
